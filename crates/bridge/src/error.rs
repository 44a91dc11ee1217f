//! Host-side error types.

use crate::protocol::RequestId;
use physics::PhysicsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("physics worker has shut down")]
    Disconnected,

    #[error(transparent)]
    Physics(#[from] PhysicsError),

    #[error("request {id} got an unexpected {got} response")]
    UnexpectedResponse { id: RequestId, got: &'static str },

    #[error("failed to start physics worker: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
