// ============================
// parley-relay-lib/src/directory.rs
// ============================
//! Event directory and room lifecycle state machine.
//!
//! All shared state lives here and is owned by a single task (see
//! [`crate::actor`]). Every transition runs to completion before the next
//! command is processed, so multi-step updates need no further
//! synchronization. Directory broadcasts are emitted strictly after the
//! mutation they reflect.

use crate::registry::{CallState, Connection, ConnectionId, ConnectionRegistry};
use crate::telemetry;
use crate::validation;
use metrics::counter;
use parley_common::{EventSnapshot, PeerInfo, ServerMessage};
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use tracing::debug;

/// Per-event call state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCallState {
    /// No call running
    Idle,
    /// A room is being provisioned for `creator`. `waiters` asked to start
    /// while provisioning was in flight and join the room once it exists.
    Creating {
        creator: ConnectionId,
        waiters: Vec<ConnectionId>,
    },
    /// A call is running in `room_id`, started by `host`
    Active {
        room_id: String,
        host: ConnectionId,
    },
}

/// A named lobby participants enter before starting or joining a call
#[derive(Debug)]
pub struct Event {
    pub name: String,
    pub call: EventCallState,
    /// Insertion sequence; snapshots list events in first-`enter` order
    order: u64,
}

/// Outcome of [`Directory::begin_start_call`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartCallGate {
    /// Creation granted: provision a room, then complete or abort
    Provision,
    /// The event already had an active room; the caller joined it
    JoinedExisting,
    /// Another creation is in flight; the caller was queued
    Queued,
    /// Unknown event or connection; nothing happened
    Ignored,
}

/// Which kind of signaling payload to relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

struct LeaveOutcome {
    /// Event reset to Idle because its host departed
    ended_event: Option<String>,
}

enum StartDecision {
    Provision,
    Queued,
    Join(String),
    Ignored,
}

/// The single shared mutable structure: connection registry plus event
/// directory.
#[derive(Default)]
pub struct Directory {
    registry: ConnectionRegistry,
    events: HashMap<String, Event>,
    next_order: u64,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on transport connect; mints the connection id
    pub fn register(&mut self, tx: tokio::sync::mpsc::UnboundedSender<ServerMessage>) -> ConnectionId {
        let conn = Connection::new(tx);
        let id = conn.id.clone();
        self.registry.insert(conn);
        id
    }

    /// `enter`: announce the event this connection belongs to. Idempotent;
    /// creates the event lazily. The display name defaults to the event id.
    pub fn enter(&mut self, conn_id: &str, event_id: &str, event_name: Option<String>) {
        let display_name = validation::normalize_display_name(event_name.as_deref(), event_id);
        let Some(conn) = self.registry.get_mut(conn_id) else {
            return;
        };
        conn.event_id = Some(event_id.to_string());
        conn.display_name = Some(display_name.clone());

        // the event keeps the first name it was announced with
        if !self.events.contains_key(event_id) {
            self.events.insert(
                event_id.to_string(),
                Event {
                    name: display_name,
                    call: EventCallState::Idle,
                    order: self.next_order,
                },
            );
            self.next_order += 1;
        }

        self.broadcast_events();
    }

    /// First phase of `start-call`. Marks the event as creating when a new
    /// room is needed, so concurrent starters are queued instead of minting
    /// duplicate rooms while provisioning is in flight.
    pub fn begin_start_call(&mut self, conn_id: &str, event_id: &str) -> StartCallGate {
        if !self.registry.contains(conn_id) {
            return StartCallGate::Ignored;
        }
        let decision = match self.events.get_mut(event_id) {
            None => {
                debug!(event_id, "start-call for unknown event ignored");
                StartDecision::Ignored
            },
            Some(event) => match &mut event.call {
                EventCallState::Idle => {
                    event.call = EventCallState::Creating {
                        creator: conn_id.to_string(),
                        waiters: Vec::new(),
                    };
                    StartDecision::Provision
                },
                EventCallState::Creating { creator, waiters } => {
                    if *creator != conn_id && !waiters.iter().any(|w| w == conn_id) {
                        waiters.push(conn_id.to_string());
                    }
                    StartDecision::Queued
                },
                EventCallState::Active { room_id, .. } => StartDecision::Join(room_id.clone()),
            },
        };

        match decision {
            StartDecision::Provision => StartCallGate::Provision,
            StartDecision::Queued => StartCallGate::Queued,
            StartDecision::Ignored => StartCallGate::Ignored,
            StartDecision::Join(room_id) => {
                // a call is already running: the caller joins it instead of
                // superseding the host
                self.place_in_room(conn_id, &room_id);
                self.broadcast_events();
                StartCallGate::JoinedExisting
            },
        }
    }

    /// Second phase of `start-call`: the room exists, activate the event and
    /// seat the creator plus any queued starters.
    pub fn complete_start_call(&mut self, conn_id: &str, event_id: &str, room_id: String) {
        let Some(event) = self.events.get_mut(event_id) else {
            return;
        };
        let EventCallState::Creating { creator, waiters } = event.call.clone() else {
            debug!(event_id, "stale start-call completion ignored");
            return;
        };
        if creator != conn_id {
            return;
        }
        if !self.registry.contains(conn_id) {
            // the creator vanished while provisioning was in flight
            event.call = EventCallState::Idle;
            return;
        }

        event.call = EventCallState::Active {
            room_id: room_id.clone(),
            host: conn_id.to_string(),
        };
        counter!(telemetry::CALL_STARTED).increment(1);

        self.place_in_room(conn_id, &room_id);
        for waiter in waiters {
            self.place_in_room(&waiter, &room_id);
        }
        self.broadcast_events();
    }

    /// Roll back a failed `start-call`; queued starters receive no ack and
    /// recover by client-side timeout.
    pub fn abort_start_call(&mut self, conn_id: &str, event_id: &str) {
        if let Some(event) = self.events.get_mut(event_id) {
            if matches!(&event.call, EventCallState::Creating { creator, .. } if creator == conn_id)
            {
                event.call = EventCallState::Idle;
            }
        }
    }

    /// `join-existing`: join the active call of an event. Silent no-op when
    /// the event is unknown or has no running call (the client's directory
    /// may be stale).
    pub fn join_existing(&mut self, conn_id: &str, event_id: &str) {
        if !self.registry.contains(conn_id) {
            return;
        }
        let room_id = match self.events.get(event_id) {
            Some(Event {
                call: EventCallState::Active { room_id, .. },
                ..
            }) => room_id.clone(),
            Some(_) => {
                debug!(event_id, "join-existing without active call ignored");
                return;
            },
            None => {
                debug!(event_id, "join-existing for unknown event ignored");
                return;
            },
        };
        self.place_in_room(conn_id, &room_id);
        self.broadcast_events();
    }

    /// `join-random`: pick a uniformly random *other* event with an active
    /// call and join it.
    pub fn join_random(&mut self, conn_id: &str) {
        let Some(conn) = self.registry.get(conn_id) else {
            return;
        };
        let own_event = conn.event_id.clone();

        let candidates: Vec<String> = self
            .events
            .iter()
            .filter(|(id, event)| {
                matches!(event.call, EventCallState::Active { .. })
                    && own_event.as_deref() != Some(id.as_str())
            })
            .map(|(id, _)| id.clone())
            .collect();

        let Some(target) = candidates.choose(&mut rand::rng()).cloned() else {
            self.registry.send_to(conn_id, ServerMessage::NoRandomCalls);
            return;
        };
        self.join_existing(conn_id, &target);
    }

    /// `leave-call`: explicit leave. Always acked, even when the connection
    /// was not in a call.
    pub fn leave_call(&mut self, conn_id: &str) {
        if !self.registry.contains(conn_id) {
            return;
        }
        let outcome = self.run_leave(conn_id);
        self.registry.send_to(conn_id, ServerMessage::LeftCall);
        if outcome.is_some() {
            self.broadcast_events();
        }
    }

    /// Transport disconnect: implicit leave, then drop the record, then
    /// delete the announced event once nothing references it any more.
    pub fn disconnect(&mut self, conn_id: &str) {
        let outcome = self.run_leave(conn_id);
        let Some(conn) = self.registry.remove(conn_id) else {
            return;
        };

        if let Some(event_id) = conn.event_id.as_deref() {
            let hosted =
                outcome.as_ref().and_then(|o| o.ended_event.as_deref()) == Some(event_id);
            // a host's event survives idle; otherwise the event goes away
            // with its last referencing connection
            if !hosted
                && self.events.contains_key(event_id)
                && !self.registry.any_announced(event_id)
            {
                self.events.remove(event_id);
            }
        }

        // drop the connection from any pending-creation queues
        for event in self.events.values_mut() {
            if let EventCallState::Creating { waiters, .. } = &mut event.call {
                waiters.retain(|w| w != conn_id);
            }
        }

        if conn.event_id.is_some() || outcome.is_some() {
            self.broadcast_events();
        }
    }

    /// Forward an opaque signaling payload to one connection, tagged with
    /// the sender's identity. The sender is always the transport session,
    /// never client-supplied.
    pub fn relay(&self, from: &str, kind: SignalKind, to: &str, payload: serde_json::Value) {
        let Some(sender) = self.registry.get(from) else {
            return;
        };
        let from_name = sender.name().to_string();

        if !self.registry.contains(to) {
            // target raced a disconnect; the sender recovers via user-left
            debug!(from, to, "relay target gone, dropping");
            counter!(telemetry::SIGNAL_DROPPED).increment(1);
            return;
        }

        let from = from.to_string();
        let msg = match kind {
            SignalKind::Offer => ServerMessage::RelayOffer {
                payload,
                from,
                from_name,
            },
            SignalKind::Answer => ServerMessage::RelayAnswer {
                payload,
                from,
                from_name,
            },
            SignalKind::IceCandidate => ServerMessage::RelayIceCandidate {
                payload,
                from,
                from_name,
            },
        };
        self.registry.send_to(to, msg);
        counter!(telemetry::SIGNAL_RELAYED).increment(1);
    }

    /// Client-facing directory snapshot, in first-`enter` order. Participant
    /// counts are computed from live membership.
    pub fn snapshot(&self) -> Vec<EventSnapshot> {
        let mut entries: Vec<(&String, &Event)> = self.events.iter().collect();
        entries.sort_by_key(|(_, event)| event.order);
        entries
            .into_iter()
            .map(|(id, event)| {
                let (in_call, participants) = match &event.call {
                    EventCallState::Active { room_id, .. } => {
                        (true, self.registry.count_in_room(room_id))
                    },
                    _ => (false, 0),
                };
                EventSnapshot {
                    id: id.clone(),
                    name: event.name.clone(),
                    in_call,
                    participants,
                }
            })
            .collect()
    }

    /// Push the current snapshot to every connection
    pub fn broadcast_events(&self) {
        let events = self.snapshot();
        self.registry.broadcast(&ServerMessage::EventsUpdate { events });
    }

    /// Seat a connection in a room: leave the previous call, tell the
    /// existing members, ack the joiner with the mesh-bootstrap list.
    ///
    /// Offer direction is tie-broken per pair: the lexicographically smaller
    /// connection id initiates, so exactly one side of every pair is told to
    /// offer.
    fn place_in_room(&mut self, conn_id: &str, room_id: &str) {
        // a connection cannot be in two calls
        self.run_leave(conn_id);

        let Some(joiner) = self.registry.get(conn_id) else {
            return;
        };
        let joiner_id = joiner.id.clone();
        let joiner_name = joiner.name().to_string();

        let existing: Vec<(ConnectionId, String)> = self
            .registry
            .members_of_room(room_id)
            .map(|c| (c.id.clone(), c.name().to_string()))
            .collect();

        if let Some(conn) = self.registry.get_mut(conn_id) {
            conn.call = CallState::InCall {
                room_id: room_id.to_string(),
            };
        }

        for (peer_id, _) in &existing {
            self.registry.send_to(
                peer_id,
                ServerMessage::UserJoined {
                    connection_id: joiner_id.clone(),
                    name: joiner_name.clone(),
                    should_offer: *peer_id < joiner_id,
                },
            );
        }

        let existing_users = existing
            .into_iter()
            .map(|(id, name)| PeerInfo {
                should_offer: joiner_id < id,
                id,
                name,
            })
            .collect();
        self.registry.send_to(
            conn_id,
            ServerMessage::JoinCall {
                room_id: room_id.to_string(),
                existing_users,
            },
        );
        counter!(telemetry::CALL_JOINED).increment(1);
    }

    /// Remove a connection from its room, notifying the remaining members.
    /// When the departed connection hosted the room's event, the call ends
    /// for everyone and the event reverts to idle.
    fn run_leave(&mut self, conn_id: &str) -> Option<LeaveOutcome> {
        let conn = self.registry.get_mut(conn_id)?;
        let CallState::InCall { room_id } = conn.call.clone() else {
            return None;
        };
        conn.call = CallState::NotInCall;

        let remaining: Vec<ConnectionId> = self
            .registry
            .members_of_room(&room_id)
            .map(|c| c.id.clone())
            .collect();
        for id in &remaining {
            self.registry.send_to(
                id,
                ServerMessage::UserLeft {
                    connection_id: conn_id.to_string(),
                },
            );
        }

        // the host check binds to the event owning the room actually being
        // left; join-random can seat a connection in another event's room
        let owner = self.events.iter().find_map(|(id, event)| match &event.call {
            EventCallState::Active { room_id: r, host } if *r == room_id => {
                Some((id.clone(), host.clone()))
            },
            _ => None,
        });

        let mut ended_event = None;
        if let Some((event_id, host)) = owner {
            if host == conn_id {
                for id in &remaining {
                    self.registry.send_to(id, ServerMessage::CallEnded);
                    if let Some(member) = self.registry.get_mut(id) {
                        member.call = CallState::NotInCall;
                    }
                }
                if let Some(event) = self.events.get_mut(&event_id) {
                    event.call = EventCallState::Idle;
                }
                counter!(telemetry::CALL_ENDED).increment(1);
                ended_event = Some(event_id);
            }
        }

        Some(LeaveOutcome { ended_event })
    }
}
