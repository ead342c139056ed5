// ============================
// parley-relay-lib/src/actor.rs
// ============================
//! Directory actor: a single task owns the [`Directory`] and drains a command
//! channel, so handlers never interleave on shared state. The only awaited
//! external work (room provisioning) happens on the caller's task between the
//! begin and complete phases, guarded by the event's creating marker.

use crate::directory::{Directory, SignalKind, StartCallGate};
use crate::error::RelayError;
use crate::provision::RoomProvisioner;
use crate::registry::ConnectionId;
use parley_common::{EventSnapshot, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Message sent *into* the actor
#[derive(Debug)]
pub enum DirectoryMsg {
    Register {
        tx: mpsc::UnboundedSender<ServerMessage>,
        resp_tx: mpsc::UnboundedSender<ConnectionId>,
    },
    Enter {
        conn_id: ConnectionId,
        event_id: String,
        event_name: Option<String>,
    },
    BeginStartCall {
        conn_id: ConnectionId,
        event_id: String,
        resp_tx: mpsc::UnboundedSender<StartCallGate>,
    },
    CompleteStartCall {
        conn_id: ConnectionId,
        event_id: String,
        room_id: String,
    },
    AbortStartCall {
        conn_id: ConnectionId,
        event_id: String,
    },
    JoinExisting {
        conn_id: ConnectionId,
        event_id: String,
    },
    JoinRandom {
        conn_id: ConnectionId,
    },
    LeaveCall {
        conn_id: ConnectionId,
    },
    Disconnect {
        conn_id: ConnectionId,
    },
    Relay {
        from: ConnectionId,
        kind: SignalKind,
        to: ConnectionId,
        payload: serde_json::Value,
    },
    Snapshot {
        resp_tx: mpsc::UnboundedSender<Vec<EventSnapshot>>,
    },
}

/// Handle that other components keep: the command channel plus the
/// provisioner used to mint rooms outside the actor's critical section.
#[derive(Clone)]
pub struct DirectoryHandle {
    cmd_tx: mpsc::UnboundedSender<DirectoryMsg>,
    rooms: Arc<dyn RoomProvisioner>,
}

impl DirectoryHandle {
    /// Register a new connection and receive its id
    pub async fn register(
        &self,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, RelayError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(DirectoryMsg::Register { tx, resp_tx })?;
        resp_rx.recv().await.ok_or(RelayError::DirectoryClosed)
    }

    pub fn enter(
        &self,
        conn_id: &str,
        event_id: &str,
        event_name: Option<String>,
    ) -> Result<(), RelayError> {
        self.cmd_tx.send(DirectoryMsg::Enter {
            conn_id: conn_id.to_string(),
            event_id: event_id.to_string(),
            event_name,
        })?;
        Ok(())
    }

    /// Run the full start-call protocol: gate, provision, complete or abort.
    ///
    /// The actor grants creation to the first caller and queues concurrent
    /// ones; provisioning is awaited here so the actor keeps serving other
    /// events while a room is minted.
    pub async fn start_call(&self, conn_id: &str, event_id: &str) -> Result<(), RelayError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(DirectoryMsg::BeginStartCall {
            conn_id: conn_id.to_string(),
            event_id: event_id.to_string(),
            resp_tx,
        })?;
        let gate = resp_rx.recv().await.ok_or(RelayError::DirectoryClosed)?;
        if gate != StartCallGate::Provision {
            return Ok(());
        }

        match self.rooms.provision(event_id).await {
            Ok(room_id) => {
                self.cmd_tx.send(DirectoryMsg::CompleteStartCall {
                    conn_id: conn_id.to_string(),
                    event_id: event_id.to_string(),
                    room_id,
                })?;
            },
            Err(e) => {
                // recoverable: roll the event back, the caller gets no ack
                warn!(event_id, error = %e, "room provisioning failed, rolling back");
                self.cmd_tx.send(DirectoryMsg::AbortStartCall {
                    conn_id: conn_id.to_string(),
                    event_id: event_id.to_string(),
                })?;
            },
        }
        Ok(())
    }

    pub fn join_existing(&self, conn_id: &str, event_id: &str) -> Result<(), RelayError> {
        self.cmd_tx.send(DirectoryMsg::JoinExisting {
            conn_id: conn_id.to_string(),
            event_id: event_id.to_string(),
        })?;
        Ok(())
    }

    pub fn join_random(&self, conn_id: &str) -> Result<(), RelayError> {
        self.cmd_tx.send(DirectoryMsg::JoinRandom {
            conn_id: conn_id.to_string(),
        })?;
        Ok(())
    }

    pub fn leave_call(&self, conn_id: &str) -> Result<(), RelayError> {
        self.cmd_tx.send(DirectoryMsg::LeaveCall {
            conn_id: conn_id.to_string(),
        })?;
        Ok(())
    }

    pub fn disconnect(&self, conn_id: &str) -> Result<(), RelayError> {
        self.cmd_tx.send(DirectoryMsg::Disconnect {
            conn_id: conn_id.to_string(),
        })?;
        Ok(())
    }

    pub fn relay(
        &self,
        from: &str,
        kind: SignalKind,
        to: &str,
        payload: serde_json::Value,
    ) -> Result<(), RelayError> {
        self.cmd_tx.send(DirectoryMsg::Relay {
            from: from.to_string(),
            kind,
            to: to.to_string(),
            payload,
        })?;
        Ok(())
    }

    /// Current directory snapshot. Also doubles as a barrier in tests: the
    /// response proves every previously sent command has been processed.
    pub async fn snapshot(&self) -> Result<Vec<EventSnapshot>, RelayError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx.send(DirectoryMsg::Snapshot { resp_tx })?;
        resp_rx.recv().await.ok_or(RelayError::DirectoryClosed)
    }
}

/// Spawn the directory actor and return its handle
pub fn spawn_directory(rooms: Arc<dyn RoomProvisioner>) -> DirectoryHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(Directory::new(), cmd_rx));
    DirectoryHandle { cmd_tx, rooms }
}

async fn run(mut directory: Directory, mut rx: mpsc::UnboundedReceiver<DirectoryMsg>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            DirectoryMsg::Register { tx, resp_tx } => {
                let id = directory.register(tx);
                let _ = resp_tx.send(id);
            },
            DirectoryMsg::Enter {
                conn_id,
                event_id,
                event_name,
            } => directory.enter(&conn_id, &event_id, event_name),
            DirectoryMsg::BeginStartCall {
                conn_id,
                event_id,
                resp_tx,
            } => {
                let gate = directory.begin_start_call(&conn_id, &event_id);
                let _ = resp_tx.send(gate);
            },
            DirectoryMsg::CompleteStartCall {
                conn_id,
                event_id,
                room_id,
            } => directory.complete_start_call(&conn_id, &event_id, room_id),
            DirectoryMsg::AbortStartCall { conn_id, event_id } => {
                directory.abort_start_call(&conn_id, &event_id);
            },
            DirectoryMsg::JoinExisting { conn_id, event_id } => {
                directory.join_existing(&conn_id, &event_id);
            },
            DirectoryMsg::JoinRandom { conn_id } => directory.join_random(&conn_id),
            DirectoryMsg::LeaveCall { conn_id } => directory.leave_call(&conn_id),
            DirectoryMsg::Disconnect { conn_id } => directory.disconnect(&conn_id),
            DirectoryMsg::Relay {
                from,
                kind,
                to,
                payload,
            } => directory.relay(&from, kind, &to, payload),
            DirectoryMsg::Snapshot { resp_tx } => {
                let _ = resp_tx.send(directory.snapshot());
            },
        }
    }
}
