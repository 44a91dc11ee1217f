//! Host-side proxy for the physics worker.
//!
//! [`PhysicsBridge`] mirrors just enough of the physics registries to turn
//! result-buffer ids back into render handles: dynamic and kinematic
//! bodies in insertion order, static solids alongside, and contact groups
//! in slot order. Every change to the mirror (adds, removals, resets) is
//! applied when the worker's reply is handled, so the mirror moves in the
//! same order as the worker's registries: a rejected descriptor never
//! shifts the ids, and a step that was already queued before a removal is
//! still decoded against the layout it was encoded with.
//!
//! Stepping is single-flight: while a step is outstanding, further
//! unforced step requests are skipped and their frame time accumulates
//! into the next request.
//!
//! Every [`Ticket`] handed out must be claimed with [`PhysicsBridge::wait`],
//! [`PhysicsBridge::try_take`] or [`PhysicsBridge::detach`]. A reply for a
//! ticket that is simply dropped is kept until the bridge is dropped.

use crate::error::BridgeResult;
use crate::protocol::{Command, FromResponse, Reply, Request, RequestId, Response, Ticket};
use crate::scene::SceneSink;
use crate::worker::Worker;
use engine_core::{ResultBuffer, Transform};
use glam::Vec3;
use physics::{
    CollisionFlags, ContactGroupDescriptor, EntityDescriptor, ForceCommand, FrameInput, Insertion, MotionKind,
    RayHit, ResetOptions, RigidBodyDescriptor, StepOutcome, TransformOverride, WorldConfig, WorldParameters,
};
use std::collections::{HashMap, HashSet};

/// Frame time sent with a forced step.
pub const FORCED_STEP: f32 = 1.0 / 60.0;

/// Called with each step's result for one contact group.
pub type ContactCallback = Box<dyn FnMut(bool)>;

/// What a step request turned into.
#[derive(Debug)]
pub enum StepDispatch {
    Dispatched(Ticket<StepOutcome>),
    /// A step is still in flight; the frame time was banked.
    Skipped,
}

impl StepDispatch {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Which host list a mirrored entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MirrorKind {
    /// Decoded from the result buffer every step.
    Body,
    /// Never decoded.
    Solid,
    /// Known to the worker only; joints have no render handle.
    Detached,
}

fn classify(desc: &EntityDescriptor) -> MirrorKind {
    match desc {
        EntityDescriptor::Body(body) => {
            if body_motion(body).is_read_back() {
                MirrorKind::Body
            } else {
                MirrorKind::Solid
            }
        }
        EntityDescriptor::Terrain(_) => MirrorKind::Solid,
        EntityDescriptor::Joint(_) => MirrorKind::Detached,
    }
}

fn body_motion(body: &RigidBodyDescriptor) -> MotionKind {
    if body.flags.contains(CollisionFlags::KINEMATIC_OBJECT) {
        MotionKind::Kinematic
    } else if body.flags.contains(CollisionFlags::STATIC_OBJECT) {
        MotionKind::Static
    } else {
        body.motion()
    }
}

/// Mirror change waiting on the reply to its request.
enum Pending<H> {
    Add {
        name: Option<String>,
        kind: MirrorKind,
        handle: Option<H>,
    },
    Remove(Vec<String>),
    ContactGroup {
        name: String,
        callback: Option<ContactCallback>,
    },
    RemoveContactGroup(String),
    RemoveAllContactGroups,
    /// Reset or world teardown.
    Forget,
    Step,
}

struct Mirrored<H> {
    key: u64,
    handle: Option<H>,
}

pub struct PhysicsBridge<S: SceneSink> {
    worker: Worker,
    scene: S,
    next_id: RequestId,
    next_key: u64,
    bodies: Vec<Mirrored<S::Handle>>,
    solids: Vec<Mirrored<S::Handle>>,
    by_name: HashMap<String, (MirrorKind, u64)>,
    contact_groups: Vec<(String, Option<ContactCallback>)>,
    pending: HashMap<RequestId, Pending<S::Handle>>,
    tracked: HashSet<RequestId>,
    completed: HashMap<RequestId, Response>,
    steps_in_flight: usize,
    time_span: f32,
    input_flags: u32,
    buffer: Option<ResultBuffer>,
    last_contacts: Vec<u8>,
}

impl<S: SceneSink> PhysicsBridge<S> {
    /// Spawn a physics worker and attach `scene` to receive its results.
    pub fn new(config: WorldConfig, scene: S) -> BridgeResult<Self> {
        Ok(Self {
            worker: Worker::spawn(config)?,
            scene,
            next_id: 0,
            next_key: 0,
            bodies: Vec::new(),
            solids: Vec::new(),
            by_name: HashMap::new(),
            contact_groups: Vec::new(),
            pending: HashMap::new(),
            tracked: HashSet::new(),
            completed: HashMap::new(),
            steps_in_flight: 0,
            time_span: 0.0,
            input_flags: 0,
            buffer: None,
            last_contacts: Vec::new(),
        })
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    fn send(&mut self, command: Command) -> BridgeResult<RequestId> {
        let id = self.next_id;
        self.next_id += 1;
        self.worker.send(Request { id, command })?;
        Ok(id)
    }

    fn send_tracked<T>(&mut self, command: Command) -> BridgeResult<Ticket<T>> {
        let id = self.send(command)?;
        self.tracked.insert(id);
        Ok(Ticket::new(id))
    }

    fn send_pending<T>(&mut self, command: Command, pending: Pending<S::Handle>) -> BridgeResult<Ticket<T>> {
        let ticket = self.send_tracked(command)?;
        self.pending.insert(ticket.id(), pending);
        Ok(ticket)
    }

    // ---- world -----------------------------------------------------------

    pub fn create_world(&mut self) -> BridgeResult<Ticket<bool>> {
        self.send_tracked(Command::CreateWorld)
    }

    pub fn destroy_world(&mut self) -> BridgeResult<Ticket<()>> {
        self.send_pending(Command::DestroyWorld, Pending::Forget)
    }

    pub fn set_gravity(&mut self, gravity: Vec3) -> BridgeResult<()> {
        self.send(Command::SetGravity(gravity)).map(drop)
    }

    pub fn set_parameters(&mut self, params: WorldParameters) -> BridgeResult<()> {
        self.send(Command::SetParameters(params)).map(drop)
    }

    pub fn reset(&mut self, options: ResetOptions) -> BridgeResult<Ticket<()>> {
        self.send_pending(Command::Reset(options), Pending::Forget)
    }

    // ---- entities --------------------------------------------------------

    /// Forward a descriptor and, once the worker accepts it, track `handle`
    /// under the descriptor's name. The initial transform is applied to the
    /// handle straight away, since a body at rest is never re-encoded.
    pub fn add_entity(
        &mut self,
        handle: Option<S::Handle>,
        desc: impl Into<EntityDescriptor>,
    ) -> BridgeResult<Ticket<Insertion>> {
        let desc = desc.into();
        let kind = classify(&desc);
        if let (Some(handle), Some(initial)) = (&handle, initial_transform(&desc)) {
            self.scene.apply_transform(handle, initial.position, initial.rotation);
        }
        let name = desc.name().map(str::to_string);
        self.send_pending(Command::Add(desc), Pending::Add { name, kind, handle })
    }

    /// Remove `name` from the worker. The mirror entry stays until the
    /// reply arrives, so steps sent earlier still decode correctly.
    pub fn remove(&mut self, name: &str) -> BridgeResult<Ticket<bool>> {
        self.send_pending(Command::Remove(name.to_string()), Pending::Remove(vec![name.to_string()]))
    }

    pub fn remove_many(&mut self, names: Vec<String>) -> BridgeResult<Ticket<usize>> {
        let pending = Pending::Remove(names.clone());
        self.send_pending(Command::RemoveMany(names), pending)
    }

    fn forget_name(&mut self, name: &str) {
        match self.by_name.remove(name) {
            Some((MirrorKind::Body, key)) => self.bodies.retain(|m| m.key != key),
            Some((MirrorKind::Solid, key)) => self.solids.retain(|m| m.key != key),
            _ => {}
        }
    }

    pub fn queue_force(&mut self, command: ForceCommand) -> BridgeResult<()> {
        self.queue_forces(vec![command])
    }

    pub fn queue_forces(&mut self, commands: Vec<ForceCommand>) -> BridgeResult<()> {
        self.send(Command::QueueForces(commands)).map(drop)
    }

    pub fn queue_transform(&mut self, entry: TransformOverride) -> BridgeResult<()> {
        self.queue_transforms(vec![entry])
    }

    pub fn queue_transforms(&mut self, entries: Vec<TransformOverride>) -> BridgeResult<()> {
        self.send(Command::QueueTransforms(entries)).map(drop)
    }

    // ---- contacts --------------------------------------------------------

    /// Register a contact group; `callback` receives its value after every
    /// step once the worker has assigned it a slot.
    pub fn add_contact_group(
        &mut self,
        desc: ContactGroupDescriptor,
        callback: Option<ContactCallback>,
    ) -> BridgeResult<Ticket<usize>> {
        let name = desc.name.clone();
        self.send_pending(Command::AddContactGroup(desc), Pending::ContactGroup { name, callback })
    }

    pub fn remove_contact_group(&mut self, name: &str) -> BridgeResult<Ticket<bool>> {
        self.send_pending(
            Command::RemoveContactGroup(name.to_string()),
            Pending::RemoveContactGroup(name.to_string()),
        )
    }

    pub fn remove_all_contact_groups(&mut self) -> BridgeResult<()> {
        let id = self.send(Command::RemoveAllContactGroups)?;
        self.pending.insert(id, Pending::RemoveAllContactGroups);
        Ok(())
    }

    pub fn enable_contact_group(&mut self, name: &str) -> BridgeResult<Ticket<bool>> {
        self.send_tracked(Command::EnableContactGroup(name.to_string()))
    }

    pub fn disable_contact_group(&mut self, name: &str) -> BridgeResult<Ticket<bool>> {
        self.send_tracked(Command::DisableContactGroup(name.to_string()))
    }

    pub fn enable_all_contact_groups(&mut self) -> BridgeResult<()> {
        self.send(Command::EnableAllContactGroups).map(drop)
    }

    pub fn disable_all_contact_groups(&mut self) -> BridgeResult<()> {
        self.send(Command::DisableAllContactGroups).map(drop)
    }

    /// Contact values from the latest completed step, by slot.
    pub fn contact_results(&self) -> &[u8] {
        &self.last_contacts
    }

    // ---- terrain and queries ---------------------------------------------

    pub fn upload_terrain(&mut self, name: &str, heights: Vec<f32>) -> BridgeResult<Ticket<()>> {
        self.send_tracked(Command::UploadTerrain {
            name: name.to_string(),
            heights,
        })
    }

    pub fn ray_test(&mut self, from: Vec3, to: Vec3) -> BridgeResult<Ticket<Option<RayHit>>> {
        self.send_tracked(Command::RayTest { from, to })
    }

    // ---- stepping --------------------------------------------------------

    pub fn can_step(&self) -> bool {
        self.steps_in_flight == 0
    }

    /// Frame time banked for the next step.
    pub fn time_span(&self) -> f32 {
        self.time_span
    }

    pub fn set_input_flags(&mut self, flags: u32) {
        self.input_flags = flags;
    }

    /// Request a step covering `dt` plus any banked time. Unless `force` is
    /// set, nothing is sent while a previous step is outstanding. A forced
    /// step banks one fixed frame instead of `dt`.
    pub fn step_frame(&mut self, dt: f32, force: bool) -> BridgeResult<StepDispatch> {
        self.time_span += if force || dt <= 0.0 { FORCED_STEP } else { dt };
        if !force && !self.can_step() {
            log::trace!("step skipped; {:.4}s banked", self.time_span);
            return Ok(StepDispatch::Skipped);
        }

        let input = FrameInput {
            input_flags: self.input_flags,
            time_step: std::mem::take(&mut self.time_span),
        };
        let buffer = self.buffer.take();
        let id = self.send(Command::Step { input, buffer })?;
        self.steps_in_flight += 1;
        self.pending.insert(id, Pending::Step);
        self.tracked.insert(id);
        Ok(StepDispatch::Dispatched(Ticket::new(id)))
    }

    /// Process every reply that has already arrived. Returns how many.
    pub fn poll(&mut self) -> BridgeResult<usize> {
        let mut handled = 0;
        while let Some(reply) = self.worker.try_recv()? {
            self.handle_reply(reply);
            handled += 1;
        }
        Ok(handled)
    }

    /// Block until `ticket`'s reply arrives, processing everything before it.
    pub fn wait<T: FromResponse>(&mut self, ticket: Ticket<T>) -> BridgeResult<T> {
        let id = ticket.id();
        loop {
            if let Some(response) = self.completed.remove(&id) {
                self.tracked.remove(&id);
                return T::from_response(id, response);
            }
            let reply = self.worker.recv()?;
            self.handle_reply(reply);
        }
    }

    /// The reply for `ticket` if it has already been processed.
    pub fn try_take<T: FromResponse>(&mut self, ticket: &Ticket<T>) -> Option<BridgeResult<T>> {
        let response = self.completed.remove(&ticket.id())?;
        self.tracked.remove(&ticket.id());
        Some(T::from_response(ticket.id(), response))
    }

    /// Give up on `ticket`: its reply is still processed but not kept.
    pub fn detach<T>(&mut self, ticket: Ticket<T>) {
        self.tracked.remove(&ticket.id());
        self.completed.remove(&ticket.id());
    }

    /// Replies that arrived for tickets nobody has claimed yet.
    pub fn unclaimed_replies(&self) -> usize {
        self.completed.len()
    }

    fn handle_reply(&mut self, reply: Reply) {
        let Reply { id, mut response } = reply;
        match (self.pending.remove(&id), &mut response) {
            (Some(Pending::Add { name, kind, handle }), Response::Added(Ok(_))) => {
                self.commit_add(name, kind, handle);
            }
            (Some(Pending::ContactGroup { name, callback }), Response::ContactSlot(Ok(slot))) => {
                if *slot != self.contact_groups.len() {
                    log::warn!("contact group `{name}` got slot {slot}, expected {}", self.contact_groups.len());
                }
                self.contact_groups.push((name, callback));
            }
            (Some(Pending::Remove(names)), _) => {
                for name in &names {
                    self.forget_name(name);
                }
            }
            (Some(Pending::RemoveContactGroup(name)), _) => {
                self.contact_groups.retain(|(n, _)| *n != name);
            }
            (Some(Pending::RemoveAllContactGroups), _) => self.contact_groups.clear(),
            (Some(Pending::Forget), _) => {
                self.bodies.clear();
                self.solids.clear();
                self.by_name.clear();
                self.contact_groups.clear();
            }
            (Some(Pending::Step), Response::Stepped(outcome)) => {
                self.steps_in_flight = self.steps_in_flight.saturating_sub(1);
                self.apply_step(outcome);
            }
            (Some(Pending::Step), _) => {
                self.steps_in_flight = self.steps_in_flight.saturating_sub(1);
            }
            _ => {}
        }
        if self.tracked.contains(&id) {
            self.completed.insert(id, response);
        }
    }

    fn commit_add(&mut self, name: Option<String>, kind: MirrorKind, handle: Option<S::Handle>) {
        let key = self.next_key;
        self.next_key += 1;
        let mirrored = Mirrored { key, handle };
        match kind {
            MirrorKind::Body => self.bodies.push(mirrored),
            MirrorKind::Solid => self.solids.push(mirrored),
            MirrorKind::Detached => {}
        }
        if let Some(name) = name {
            self.by_name.insert(name, (kind, key));
        }
    }

    /// Decode transforms, fan out contacts and terrain notices, and keep
    /// the buffer for the next request.
    fn apply_step(&mut self, outcome: &mut StepOutcome) {
        if !outcome.status {
            return;
        }
        if let Some(buffer) = outcome.buffer.take() {
            for (id, mirrored) in self.bodies.iter().enumerate() {
                let (Some(handle), Some(t)) = (&mirrored.handle, buffer.decode_body(id)) else {
                    continue;
                };
                self.scene.apply_transform(handle, t.position, t.rotation);
            }
            self.buffer = Some(buffer);
        }

        for (slot, &value) in outcome.contacts.iter().enumerate() {
            self.scene.on_contact_result(slot, value);
            if let Some((_, Some(callback))) = self.contact_groups.get_mut(slot) {
                callback(value != 0);
            }
        }
        self.last_contacts.clone_from(&outcome.contacts);

        for name in &outcome.terrain_ready {
            self.scene.on_terrain_ready(name);
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn solid_count(&self) -> usize {
        self.solids.len()
    }

    pub fn contact_group_count(&self) -> usize {
        self.contact_groups.len()
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

fn initial_transform(desc: &EntityDescriptor) -> Option<Transform> {
    match desc {
        EntityDescriptor::Body(body) => Some(Transform::from_position_rotation(body.position, body.rotation)),
        EntityDescriptor::Terrain(terrain) => Some(Transform::from_position_rotation(terrain.position, terrain.rotation)),
        EntityDescriptor::Joint(_) => None,
    }
}
