//! The physics worker: a dedicated thread owning one [`SimulationSession`]
//! and serving requests strictly in arrival order.

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Command, Reply, Request, RequestId, Response};
use physics::{SimulationSession, WorldConfig};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

/// Host end of the worker channels.
pub struct Worker {
    tx: Sender<Request>,
    rx: Receiver<Reply>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the worker thread with a fresh session built from `config`.
    pub fn spawn(config: WorldConfig) -> BridgeResult<Self> {
        let (request_tx, request_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("physics".into())
            .spawn(move || serve(SimulationSession::new(config), request_rx, reply_tx))?;
        Ok(Self {
            tx: request_tx,
            rx: reply_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, request: Request) -> BridgeResult<()> {
        self.tx.send(request).map_err(|_| BridgeError::Disconnected)
    }

    /// Block until the next reply arrives.
    pub fn recv(&self) -> BridgeResult<Reply> {
        self.rx.recv().map_err(|_| BridgeError::Disconnected)
    }

    /// The next reply if one is already waiting.
    pub fn try_recv(&self) -> BridgeResult<Option<Reply>> {
        match self.rx.try_recv() {
            Ok(reply) => Ok(Some(reply)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BridgeError::Disconnected),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.tx.send(Request {
            id: RequestId::MAX,
            command: Command::Shutdown,
        });
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("physics worker panicked");
            }
        }
    }
}

fn serve(mut session: SimulationSession, requests: Receiver<Request>, replies: Sender<Reply>) {
    log::info!("physics worker started");
    for Request { id, command } in requests {
        let shutdown = matches!(command, Command::Shutdown);
        let response = execute(&mut session, command);
        if replies.send(Reply { id, response }).is_err() || shutdown {
            break;
        }
    }
    session.destroy_world();
    log::info!("physics worker stopped");
}

/// Run one command against the session.
pub fn execute(session: &mut SimulationSession, command: Command) -> Response {
    match command {
        Command::CreateWorld => Response::Flag(session.create_world()),
        Command::DestroyWorld => {
            session.destroy_world();
            Response::Ack
        }
        Command::SetGravity(gravity) => {
            session.set_gravity(gravity);
            Response::Ack
        }
        Command::SetParameters(params) => {
            session.set_parameters(params);
            Response::Ack
        }
        Command::Reset(options) => {
            session.reset(options);
            Response::Ack
        }
        Command::Add(desc) => {
            let name = desc.name().map(str::to_string);
            let result = session.add_entity(desc);
            if let Err(err) = &result {
                log::warn!("add {:?} failed: {err}", name.as_deref().unwrap_or("<unnamed>"));
            }
            Response::Added(result)
        }
        Command::Remove(name) => Response::Flag(session.remove_by_name(&name)),
        Command::RemoveMany(names) => Response::Count(session.remove_many(names.iter().map(String::as_str))),
        Command::QueueForces(forces) => {
            session.queue_forces(forces);
            Response::Ack
        }
        Command::QueueTransforms(transforms) => {
            session.queue_transforms(transforms);
            Response::Ack
        }
        Command::AddContactGroup(desc) => Response::ContactSlot(session.add_contact_group(&desc)),
        Command::RemoveContactGroup(name) => Response::Flag(session.remove_contact_group(&name)),
        Command::RemoveAllContactGroups => {
            session.remove_all_contact_groups();
            Response::Ack
        }
        Command::EnableContactGroup(name) => Response::Flag(session.enable_contact_group(&name)),
        Command::DisableContactGroup(name) => Response::Flag(session.disable_contact_group(&name)),
        Command::EnableAllContactGroups => {
            session.enable_all_contact_groups();
            Response::Ack
        }
        Command::DisableAllContactGroups => {
            session.disable_all_contact_groups();
            Response::Ack
        }
        Command::UploadTerrain { name, heights } => Response::Uploaded(session.upload_terrain_data(&name, heights)),
        Command::RayTest { from, to } => Response::Ray(session.ray_test(from, to)),
        Command::Step { input, buffer } => {
            if let Some(buffer) = buffer {
                session.recycle(buffer);
            }
            Response::Stepped(session.step(input))
        }
        Command::Shutdown => Response::Ack,
    }
}
