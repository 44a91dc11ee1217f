//! Sandbox configuration (physics world, demo scene). Loaded from sandbox.ron at startup.

use physics::WorldConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persistent sandbox settings. Loaded from `sandbox.ron` in the current directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Everything the physics worker is started with.
    #[serde(default)]
    pub world: WorldConfig,
    /// Host frames to run before shutting down.
    #[serde(default = "default_frames")]
    pub frames: u64,
    /// Host frame rate in Hz.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// Number of spheres dropped onto the ground.
    #[serde(default = "default_spheres")]
    pub spheres: usize,
    /// Height-field resolution along each side.
    #[serde(default = "default_terrain_samples")]
    pub terrain_samples: usize,
    /// Log every decoded transform instead of a per-second summary.
    #[serde(default)]
    pub verbose: bool,
}

fn default_frames() -> u64 {
    300
}
fn default_frame_rate() -> f64 {
    engine_core::DEFAULT_FRAME_RATE
}
fn default_spheres() -> usize {
    4
}
fn default_terrain_samples() -> usize {
    32
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            frames: default_frames(),
            frame_rate: default_frame_rate(),
            spheres: default_spheres(),
            terrain_samples: default_terrain_samples(),
            verbose: false,
        }
    }
}

impl SandboxConfig {
    /// Load config from `sandbox.ron`. If the file is missing or invalid, returns default config.
    pub fn load() -> Self {
        let path = config_path();
        match std::fs::read_to_string(&path) {
            Ok(data) => Self::parse(&data).unwrap_or_else(|e| {
                log::warn!("Invalid config at {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            Err(_) => {
                log::info!("No config at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    pub fn parse(data: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(data)
    }

    /// Save current config to `sandbox.ron`. Logs on error.
    pub fn save(&self) {
        let path = config_path();
        match ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()) {
            Ok(s) => {
                if let Err(e) = std::fs::write(&path, s) {
                    log::warn!("Could not write config to {:?}: {}", path, e);
                }
            }
            Err(e) => log::warn!("Could not serialize config: {}", e),
        }
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("sandbox.ron")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_fill_in_defaults() {
        let config = SandboxConfig::parse("(frames: 10, world: (substeps: 4))").unwrap();
        assert_eq!(config.frames, 10);
        assert_eq!(config.world.substeps, 4);
        assert_eq!(config.world.max_bodies, 1000);
        assert_eq!(config.spheres, 4);
    }

    #[test]
    fn pretty_output_parses_back() {
        let config = SandboxConfig {
            verbose: true,
            ..Default::default()
        };
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        let parsed = SandboxConfig::parse(&text).unwrap();
        assert!(parsed.verbose);
        assert_eq!(parsed.world, config.world);
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(SandboxConfig::parse("(frames: \"lots\")").is_err());
    }
}
