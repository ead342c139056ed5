// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between Parley clients and the relay server.
//! This module defines the WebSocket protocol messages and supporting types.

use serde::{Deserialize, Serialize};

/// Messages sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Announce the event this connection belongs to
    /// # Fields
    /// * `event_id` - Identifier of the event
    /// * `event_name` - Optional display name; the event id is used when absent
    Enter {
        event_id: String,
        event_name: Option<String>,
    },
    /// Start a new call for an event
    StartCall { event_id: String },
    /// Join the active call of an event
    JoinExisting { event_id: String },
    /// Join a uniformly random active call of another event
    JoinRandom,
    /// Leave the current call
    LeaveCall,
    /// Relay a session-description offer to another connection
    /// # Fields
    /// * `payload` - Opaque session description, forwarded verbatim
    /// * `to` - Target connection id
    RelayOffer {
        payload: serde_json::Value,
        to: String,
    },
    /// Relay a session-description answer to another connection
    RelayAnswer {
        payload: serde_json::Value,
        to: String,
    },
    /// Relay an ICE candidate to another connection
    RelayIceCandidate {
        payload: serde_json::Value,
        to: String,
    },
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Acknowledgment of start/join: the caller is now in the room
    /// # Fields
    /// * `room_id` - Token of the joined room
    /// * `existing_users` - Peers already present, for mesh bootstrap
    JoinCall {
        room_id: String,
        existing_users: Vec<PeerInfo>,
    },
    /// A new participant joined the recipient's room
    UserJoined {
        connection_id: String,
        name: String,
        should_offer: bool,
    },
    /// A participant left the recipient's room
    UserLeft { connection_id: String },
    /// The host departed; tear down the call
    CallEnded,
    /// Acknowledgment of an explicit leave
    LeftCall,
    /// No other event currently has an active call
    NoRandomCalls,
    /// Directory snapshot, pushed to every connection on change
    EventsUpdate { events: Vec<EventSnapshot> },
    /// Relayed session-description offer
    RelayOffer {
        payload: serde_json::Value,
        from: String,
        from_name: String,
    },
    /// Relayed session-description answer
    RelayAnswer {
        payload: serde_json::Value,
        from: String,
        from_name: String,
    },
    /// Relayed ICE candidate
    RelayIceCandidate {
        payload: serde_json::Value,
        from: String,
        from_name: String,
    },
    /// A frame could not be parsed or failed validation
    MalformedMessage { reason: String },
}

/// A room member as presented to a joiner (and vice versa).
///
/// `should_offer` is the glare tie-break: for every pair of peers exactly one
/// side is told to initiate the offer (the lexicographically smaller
/// connection id).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
    pub should_offer: bool,
}

/// One event in the directory snapshot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    /// Event identifier
    pub id: String,
    /// Display name, first value supplied by any `enter`
    pub name: String,
    /// Whether the event has an active call
    pub in_call: bool,
    /// Live count of connections in the active room
    pub participants: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let json = r#"{"type":"enter","eventId":"spring-fair","eventName":"Spring Fair"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Enter {
                event_id,
                event_name,
            } => {
                assert_eq!(event_id, "spring-fair");
                assert_eq!(event_name.as_deref(), Some("Spring Fair"));
            },
            other => panic!("Wrong variant: {other:?}"),
        }

        // eventName may be omitted entirely
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"enter","eventId":"spring-fair"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Enter { event_name: None, .. }));

        // payload-free messages carry only the tag
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join-random"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinRandom));
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"leave-call"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::LeaveCall));
    }

    #[test]
    fn test_relay_message_roundtrip() {
        let json = r#"{"type":"relay-offer","payload":{"sdp":"v=0"},"to":"abc"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        let ClientMessage::RelayOffer { payload, to } = msg else {
            panic!("Expected RelayOffer")
        };
        assert_eq!(payload["sdp"], "v=0");
        assert_eq!(to, "abc");

        let reply = ServerMessage::RelayOffer {
            payload,
            from: "def".to_string(),
            from_name: "Alice".to_string(),
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&reply).unwrap()).unwrap();
        assert_eq!(parsed["type"], "relay-offer");
        assert_eq!(parsed["from"], "def");
        assert_eq!(parsed["fromName"], "Alice");
        assert_eq!(parsed["payload"]["sdp"], "v=0");
    }

    #[test]
    fn test_server_message_wire_format() {
        let msg = ServerMessage::JoinCall {
            room_id: "room-1".to_string(),
            existing_users: vec![PeerInfo {
                id: "abc".to_string(),
                name: "Alice".to_string(),
                should_offer: true,
            }],
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(parsed["type"], "join-call");
        assert_eq!(parsed["roomId"], "room-1");
        assert_eq!(parsed["existingUsers"][0]["id"], "abc");
        assert_eq!(parsed["existingUsers"][0]["shouldOffer"], true);

        let msg = ServerMessage::EventsUpdate {
            events: vec![EventSnapshot {
                id: "spring-fair".to_string(),
                name: "Spring Fair".to_string(),
                in_call: true,
                participants: 2,
            }],
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(parsed["type"], "events-update");
        assert_eq!(parsed["events"][0]["inCall"], true);
        assert_eq!(parsed["events"][0]["participants"], 2);

        let msg = ServerMessage::CallEnded;
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"call-ended"}"#
        );
    }
}
