// ============================
// parley-relay-lib/src/registry.rs
// ============================
//! Connection registry: one record per live transport session.

use parley_common::ServerMessage;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque connection identifier, assigned at connect time and stable for the
/// connection's lifetime.
pub type ConnectionId = String;

/// Whether a connection currently occupies a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    NotInCall,
    InCall { room_id: String },
}

/// One live transport session
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Event last announced via `enter`
    pub event_id: Option<String>,
    pub display_name: Option<String>,
    pub call: CallState,
    /// Outbound channel; a failed send means the socket is gone
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_id: None,
            display_name: None,
            call: CallState::NotInCall,
            tx,
        }
    }

    /// Room this connection currently occupies, if any
    pub fn room_id(&self) -> Option<&str> {
        match &self.call {
            CallState::InCall { room_id } => Some(room_id),
            CallState::NotInCall => None,
        }
    }

    /// Display name with the fallbacks clients expect
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.event_id.as_deref())
            .unwrap_or("Unknown")
    }
}

/// Registry of live connections. Membership queries iterate the live records,
/// so counts can never drift from missed increment/decrement pairs.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, conn: Connection) {
        self.connections.insert(conn.id.clone(), conn);
    }

    pub fn remove(&mut self, id: &str) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connections currently occupying `room_id`
    pub fn members_of_room<'a>(
        &'a self,
        room_id: &'a str,
    ) -> impl Iterator<Item = &'a Connection> {
        self.connections
            .values()
            .filter(move |c| c.room_id() == Some(room_id))
    }

    pub fn count_in_room(&self, room_id: &str) -> usize {
        self.members_of_room(room_id).count()
    }

    /// Whether any live connection has announced `event_id`
    pub fn any_announced(&self, event_id: &str) -> bool {
        self.connections
            .values()
            .any(|c| c.event_id.as_deref() == Some(event_id))
    }

    /// Deliver to one connection; silently dropped when the target is gone
    pub fn send_to(&self, id: &str, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(id) {
            let _ = conn.tx.send(msg);
        }
    }

    /// Deliver to every connection, best effort
    pub fn broadcast(&self, msg: &ServerMessage) {
        for conn in self.connections.values() {
            let _ = conn.tx.send(msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Connection, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(tx), rx)
    }

    #[test]
    fn test_insert_and_remove() {
        let mut registry = ConnectionRegistry::new();
        let (conn, _rx) = connection();
        let id = conn.id.clone();

        registry.insert(conn);
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_room_membership_is_computed_live() {
        let mut registry = ConnectionRegistry::new();
        let (mut a, _rx_a) = connection();
        let (mut b, _rx_b) = connection();
        let (c, _rx_c) = connection();
        a.call = CallState::InCall {
            room_id: "room-1".to_string(),
        };
        b.call = CallState::InCall {
            room_id: "room-1".to_string(),
        };
        let a_id = a.id.clone();
        registry.insert(a);
        registry.insert(b);
        registry.insert(c);

        assert_eq!(registry.count_in_room("room-1"), 2);
        assert_eq!(registry.count_in_room("room-2"), 0);

        registry.get_mut(&a_id).unwrap().call = CallState::NotInCall;
        assert_eq!(registry.count_in_room("room-1"), 1);
    }

    #[test]
    fn test_name_fallbacks() {
        let (mut conn, _rx) = connection();
        assert_eq!(conn.name(), "Unknown");

        conn.event_id = Some("spring-fair".to_string());
        assert_eq!(conn.name(), "spring-fair");

        conn.display_name = Some("Alice".to_string());
        assert_eq!(conn.name(), "Alice");
    }

    #[test]
    fn test_send_to_unknown_target_is_silent() {
        let registry = ConnectionRegistry::new();
        registry.send_to("nope", ServerMessage::CallEnded);
    }

    #[test]
    fn test_broadcast_reaches_all() {
        let mut registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connection();
        let (b, mut rx_b) = connection();
        registry.insert(a);
        registry.insert(b);

        registry.broadcast(&ServerMessage::NoRandomCalls);
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::NoRandomCalls);
        assert_eq!(rx_b.try_recv().unwrap(), ServerMessage::NoRandomCalls);
    }
}
