// ============================
// parley-relay-lib/src/provision.rs
// ============================
//! Room provisioning abstraction.
//!
//! The directory marks an event as creating before awaiting a provisioner and
//! rolls the event back if provisioning fails, so implementations may call
//! out to an external service.

use crate::error::RelayError;
use async_trait::async_trait;
use uuid::Uuid;

/// Trait for room-token providers
#[async_trait]
pub trait RoomProvisioner: Send + Sync {
    /// Mint a room token for a new call on `event_id`.
    ///
    /// Tokens are globally unique and never reused across calls, so stale
    /// signaling that references an old room can never match a new one.
    async fn provision(&self, event_id: &str) -> Result<String, RelayError>;
}

/// In-process provisioner backed by v4 UUIDs
#[derive(Debug, Default, Clone)]
pub struct LocalRooms;

#[async_trait]
impl RoomProvisioner for LocalRooms {
    async fn provision(&self, _event_id: &str) -> Result<String, RelayError> {
        Ok(Uuid::new_v4().to_string())
    }
}
