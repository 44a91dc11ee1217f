//! Messages exchanged with the physics worker.
//!
//! Every [`Request`] gets exactly one [`Reply`] carrying the same id, in
//! the order the requests were sent.

use crate::error::BridgeError;
use engine_core::ResultBuffer;
use glam::Vec3;
use physics::{
    ContactGroupDescriptor, EntityDescriptor, ForceCommand, FrameInput, Insertion, PhysicsError, RayHit,
    ResetOptions, StepOutcome, TransformOverride, WorldParameters,
};
use std::marker::PhantomData;

pub type RequestId = u64;

#[derive(Debug, Clone)]
pub enum Command {
    CreateWorld,
    DestroyWorld,
    SetGravity(Vec3),
    SetParameters(WorldParameters),
    Reset(ResetOptions),
    Add(EntityDescriptor),
    Remove(String),
    RemoveMany(Vec<String>),
    QueueForces(Vec<ForceCommand>),
    QueueTransforms(Vec<TransformOverride>),
    AddContactGroup(ContactGroupDescriptor),
    RemoveContactGroup(String),
    RemoveAllContactGroups,
    EnableContactGroup(String),
    DisableContactGroup(String),
    EnableAllContactGroups,
    DisableAllContactGroups,
    UploadTerrain { name: String, heights: Vec<f32> },
    RayTest { from: Vec3, to: Vec3 },
    /// Step once, returning the previously lent result buffer if the host
    /// still holds it.
    Step {
        input: FrameInput,
        buffer: Option<ResultBuffer>,
    },
    Shutdown,
}

#[derive(Debug)]
pub struct Request {
    pub id: RequestId,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ack,
    Flag(bool),
    Count(usize),
    Added(Result<Insertion, PhysicsError>),
    ContactSlot(Result<usize, PhysicsError>),
    Uploaded(Result<(), PhysicsError>),
    Ray(Option<RayHit>),
    Stepped(StepOutcome),
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Flag(_) => "flag",
            Self::Count(_) => "count",
            Self::Added(_) => "added",
            Self::ContactSlot(_) => "contact slot",
            Self::Uploaded(_) => "uploaded",
            Self::Ray(_) => "ray",
            Self::Stepped(_) => "stepped",
        }
    }
}

#[derive(Debug)]
pub struct Reply {
    pub id: RequestId,
    pub response: Response,
}

/// Conversion from a raw response into what the caller asked for.
pub trait FromResponse: Sized {
    fn from_response(id: RequestId, response: Response) -> Result<Self, BridgeError>;
}

fn unexpected<T>(id: RequestId, response: &Response) -> Result<T, BridgeError> {
    Err(BridgeError::UnexpectedResponse {
        id,
        got: response.kind(),
    })
}

impl FromResponse for () {
    fn from_response(id: RequestId, response: Response) -> Result<Self, BridgeError> {
        match response {
            Response::Ack => Ok(()),
            Response::Uploaded(result) => Ok(result?),
            other => unexpected(id, &other),
        }
    }
}

impl FromResponse for bool {
    fn from_response(id: RequestId, response: Response) -> Result<Self, BridgeError> {
        match response {
            Response::Flag(flag) => Ok(flag),
            other => unexpected(id, &other),
        }
    }
}

impl FromResponse for usize {
    fn from_response(id: RequestId, response: Response) -> Result<Self, BridgeError> {
        match response {
            Response::Count(n) => Ok(n),
            Response::ContactSlot(slot) => Ok(slot?),
            other => unexpected(id, &other),
        }
    }
}

impl FromResponse for Insertion {
    fn from_response(id: RequestId, response: Response) -> Result<Self, BridgeError> {
        match response {
            Response::Added(result) => Ok(result?),
            other => unexpected(id, &other),
        }
    }
}

impl FromResponse for Option<RayHit> {
    fn from_response(id: RequestId, response: Response) -> Result<Self, BridgeError> {
        match response {
            Response::Ray(hit) => Ok(hit),
            other => unexpected(id, &other),
        }
    }
}

impl FromResponse for StepOutcome {
    fn from_response(id: RequestId, response: Response) -> Result<Self, BridgeError> {
        match response {
            Response::Stepped(outcome) => Ok(outcome),
            other => unexpected(id, &other),
        }
    }
}

/// Claim on the reply to one request, typed by what it resolves to.
///
/// Hand it back through `wait`, `try_take` or `detach`; the reply to a
/// dropped ticket stays buffered in the bridge.
#[derive(Debug)]
#[must_use = "claim the reply with wait, try_take or detach"]
pub struct Ticket<T> {
    id: RequestId,
    _reply: PhantomData<fn() -> T>,
}

impl<T> Ticket<T> {
    pub(crate) fn new(id: RequestId) -> Self {
        Self {
            id,
            _reply: PhantomData,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }
}
