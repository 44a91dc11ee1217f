//! Physics-side error taxonomy.
//!
//! Lookup failures inside per-frame queues never surface here; they are
//! dropped where they happen. These errors cover construction-time
//! precondition violations, which leave the world untouched.

use crate::descriptor::ShapeKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("no simulation world exists")]
    NoWorld,

    #[error("{context} references unknown body `{name}`")]
    UnresolvedBody { context: &'static str, name: String },

    #[error("cannot build {kind:?} shape: {reason}")]
    InvalidShape { kind: ShapeKind, reason: &'static str },

    #[error("axis-sweep broadphase is full ({capacity} handles)")]
    BroadphaseFull { capacity: usize },

    #[error("result buffer holds at most {capacity} {kind}")]
    ResultBufferFull { kind: &'static str, capacity: usize },

    #[error("no terrain named `{0}`")]
    UnknownTerrain(String),

    #[error("terrain `{name}` needs at least a 2x2 sample grid")]
    TerrainTooSmall { name: String },

    #[error("terrain `{name}` expects {expected} height samples, got {actual}")]
    HeightDataMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
