//! Physics sandbox: a headless host driving the physics worker through the bridge.
//!
//! Builds a small scene (ground, falling spheres, a motorised hinge, a
//! kinematic paddle and a height-field), then runs a fixed-rate frame loop
//! that steps the worker, pushes decoded transforms into a logging scene
//! and reports contact results.

mod config;

use anyhow::{Context, Result};
use bridge::{BodyDescriptorExt, JointDescriptorExt, PhysicsBridge, SceneSink, StepDispatch};
use config::SandboxConfig;
use engine_core::FrameClock;
use glam::{Quat, Vec3};
use physics::{
    ContactGroupDescriptor, ForceCommand, ForceOp, JointDescriptor, JointKind, JointMotor, RigidBodyDescriptor,
    ShapeSpec, TerrainDescriptor, TransformOverride,
};
use std::collections::HashMap;
use std::time::Duration;

/// Stand-in for a render scene: remembers the last pose of every handle.
#[derive(Default)]
struct LogScene {
    poses: HashMap<String, (Vec3, Quat)>,
    contacts: Vec<u8>,
    verbose: bool,
}

impl SceneSink for LogScene {
    type Handle = String;

    fn apply_transform(&mut self, handle: &String, position: Vec3, rotation: Quat) {
        if self.verbose {
            log::debug!("{handle}: {position:.3} {rotation:.3}");
        }
        self.poses.insert(handle.clone(), (position, rotation));
    }

    fn on_contact_result(&mut self, slot: usize, value: u8) {
        if self.contacts.len() <= slot {
            self.contacts.resize(slot + 1, 0);
        }
        self.contacts[slot] = value;
    }

    fn on_terrain_ready(&mut self, name: &str) {
        log::info!("terrain `{name}` collision updated; rebuilding its mesh");
    }
}

fn ripple(samples: usize, phase: f32) -> Vec<f32> {
    let mut heights = Vec::with_capacity(samples * samples);
    for z in 0..samples {
        for x in 0..samples {
            let (fx, fz) = (x as f32 / samples as f32, z as f32 / samples as f32);
            heights.push(((fx * 6.0 + phase).sin() + (fz * 4.0).cos()) * 0.5);
        }
    }
    heights
}

fn build_scene(bridge: &mut PhysicsBridge<LogScene>, config: &SandboxConfig) -> Result<()> {
    let ground = bridge.add_entity(None, RigidBodyDescriptor::new(ShapeSpec::plane()).named("ground"))?;
    bridge.detach(ground);

    for i in 0..config.spheres {
        let name = format!("sphere{i}");
        let body = RigidBodyDescriptor::new(ShapeSpec::Sphere)
            .named(&name)
            .with_size(Vec3::splat(0.5))
            .density(1.0)
            .bounce(0.3)
            .at(Vec3::new(i as f32 * 1.5, 4.0 + i as f32, 0.0));
        let ticket = bridge.add_entity(Some(name), body)?;
        bridge.detach(ticket);
    }

    let post = RigidBodyDescriptor::new(ShapeSpec::Box)
        .named("post")
        .with_size(Vec3::new(0.2, 2.0, 0.2))
        .at(Vec3::new(-4.0, 1.0, 0.0))
        .kinematic();
    let ticket = bridge.add_entity(Some("post".to_string()), post)?;
    bridge.detach(ticket);
    let blade = RigidBodyDescriptor::new(ShapeSpec::Box)
        .named("blade")
        .with_size(Vec3::new(2.0, 0.1, 0.3))
        .density(2.0)
        .at(Vec3::new(-4.0, 2.2, 0.0))
        .rotated_degrees(Vec3::new(0.0, 0.0, 10.0));
    let ticket = bridge.add_entity(Some("blade".to_string()), blade)?;
    bridge.detach(ticket);
    let mut hinge = JointDescriptor::new(JointKind::hinge(Vec3::Y), "post", "blade")
        .named("spinner")
        .anchors(Vec3::new(0.0, 1.1, 0.0), Vec3::ZERO)
        .hinge_limit_degrees(-180.0, 180.0);
    if let JointKind::Hinge { motor, .. } = &mut hinge.kind {
        *motor = Some(JointMotor {
            target_velocity: 2.0,
            max_impulse: 50.0,
        });
    }
    let ticket = bridge.add_entity(None, hinge)?;
    bridge.wait(ticket).context("hinge rejected")?;

    let terrain = TerrainDescriptor {
        name: "hills".to_string(),
        size: Vec3::new(20.0, 4.0, 20.0),
        samples: [config.terrain_samples; 2],
        heights: ripple(config.terrain_samples, 0.0),
        position: Vec3::new(0.0, -1.0, 20.0),
        ..Default::default()
    };
    let ticket = bridge.add_entity(None, terrain)?;
    bridge.wait(ticket).context("terrain rejected")?;

    let landed = bridge.add_contact_group(
        ContactGroupDescriptor::pair("landed", "sphere0", "ground"),
        Some(Box::new(|hit| {
            if hit {
                log::trace!("sphere0 touching ground");
            }
        })),
    )?;
    let slot = bridge.wait(landed).context("contact group rejected")?;
    log::info!("contact group `landed` in slot {slot}");
    let blade_hits = bridge.add_contact_group(ContactGroupDescriptor::single("blade_hits", "blade"), None)?;
    bridge.detach(blade_hits);
    Ok(())
}

/// Per-frame host input: sweep the paddle, nudge the spheres, retune the motor.
fn drive(bridge: &mut PhysicsBridge<LogScene>, frame: u64, config: &SandboxConfig) -> Result<()> {
    let t = frame as f32 / config.frame_rate as f32;
    bridge.queue_transform(TransformOverride::to_position(
        "post",
        Vec3::new(-4.0, 1.0, t.sin() * 2.0),
    ))?;

    if frame % 120 == 60 {
        let kicks = (0..config.spheres)
            .map(|i| ForceCommand::new(format!("sphere{i}"), ForceOp::CentralImpulse(Vec3::new(0.0, 4.0, 1.0))))
            .collect();
        bridge.queue_forces(kicks)?;
        bridge.queue_force(ForceCommand::new(
            "spinner",
            ForceOp::Motor {
                target_velocity: -(frame as f32 / 60.0).min(6.0),
                max_impulse: 80.0,
            },
        ))?;
    }

    if frame == config.frames / 2 {
        let upload = bridge.upload_terrain("hills", ripple(config.terrain_samples, t))?;
        bridge.wait(upload).context("terrain upload failed")?;
    }
    Ok(())
}

fn report(bridge: &PhysicsBridge<LogScene>, frame: u64) {
    let scene = bridge.scene();
    let mut names: Vec<_> = scene.poses.keys().collect();
    names.sort();
    for name in names {
        let (position, _) = scene.poses[name];
        log::info!("frame {frame:4}: {name:>8} at {position:.2}");
    }
    log::info!("frame {frame:4}: contacts {:?}", scene.contacts);
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SandboxConfig::load();
    if std::env::args().any(|arg| arg == "--write-config") {
        config.save();
    }
    log::info!(
        "sandbox: {} frames at {} Hz, {} spheres",
        config.frames,
        config.frame_rate,
        config.spheres
    );

    let scene = LogScene {
        verbose: config.verbose,
        ..Default::default()
    };
    let mut bridge = PhysicsBridge::new(config.world.clone(), scene).context("starting physics worker")?;
    build_scene(&mut bridge, &config)?;

    let mut clock = FrameClock::new(config.frame_rate);
    let report_every = config.frame_rate.round().max(1.0) as u64;
    let mut skipped = 0u64;
    while clock.frame_count() < config.frames {
        clock.tick();
        bridge.poll()?;
        if !clock.take_frame() {
            std::thread::sleep(clock.until_next_frame().min(Duration::from_millis(2)));
            continue;
        }

        let frame = clock.frame_count();
        drive(&mut bridge, frame, &config)?;
        if let StepDispatch::Skipped = bridge.step_frame(clock.frame_seconds(), false)? {
            skipped += 1;
        }
        if frame % report_every == 0 {
            report(&bridge, frame);
        }
    }

    let down = bridge.ray_test(Vec3::new(0.0, 20.0, 20.0), Vec3::new(0.0, -20.0, 20.0))?;
    match bridge.wait(down)? {
        Some(hit) => log::info!(
            "ray hit {} at {:.2} (distance {:.2})",
            hit.name.as_deref().unwrap_or("<unnamed>"),
            hit.point,
            hit.distance
        ),
        None => log::info!("ray hit nothing"),
    }

    let removed = bridge.remove_many((0..config.spheres).map(|i| format!("sphere{i}")).collect())?;
    log::info!(
        "removed {} spheres; {} bodies and {} solids still mirrored; {skipped} frames banked",
        bridge.wait(removed)?,
        bridge.body_count(),
        bridge.solid_count()
    );
    Ok(())
}
