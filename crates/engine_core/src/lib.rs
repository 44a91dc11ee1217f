//! Core types shared by both sides of the physics bridge.
//!
//! This crate provides the foundational types used across the workspace:
//! - Transform and rotation helpers
//! - The fixed-stride result buffer codec
//! - Frame timing for the host loop

pub mod codec;
pub mod time;
pub mod transform;

pub use codec::*;
pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Quat, Vec3};
