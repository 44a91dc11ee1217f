//! Host-side bridge to the physics worker.
//!
//! The simulation runs on its own thread behind a request/reply channel.
//! [`PhysicsBridge`] is the host's proxy: it forwards descriptors and
//! commands, keeps the id mirror that maps result-buffer slots back to
//! render handles, and pushes decoded results into a [`SceneSink`].

pub mod error;
pub mod protocol;
pub mod proxy;
pub mod scene;
pub mod worker;

pub use error::{BridgeError, BridgeResult};
pub use protocol::{Command, FromResponse, Reply, Request, RequestId, Response, Ticket};
pub use proxy::{ContactCallback, PhysicsBridge, StepDispatch, FORCED_STEP};
pub use scene::{BodyDescriptorExt, JointDescriptorExt, SceneSink};
pub use worker::{execute, Worker};
