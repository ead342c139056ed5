// ============================
// parley-relay-lib/src/lib.rs
// ============================
//! Core functionality for the Parley signaling relay.
//!
//! The relay matches clients into calls and forwards WebRTC
//! session-establishment payloads between them; it never touches media.
//! All shared state is owned by a single directory actor (see [`actor`]).

pub mod actor;
pub mod config;
pub mod directory;
pub mod error;
pub mod provision;
pub mod registry;
pub mod telemetry;
pub mod validation;
pub mod ws_router;

use crate::actor::{spawn_directory, DirectoryHandle};
use crate::config::Settings;
use crate::provision::{LocalRooms, RoomProvisioner};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the directory actor
    pub directory: DirectoryHandle,
    /// Settings manager
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create application state with the in-process room provisioner
    pub fn new(settings: Settings) -> Self {
        Self::with_provisioner(settings, Arc::new(LocalRooms))
    }

    /// Create application state with a custom room provisioner
    pub fn with_provisioner(settings: Settings, rooms: Arc<dyn RoomProvisioner>) -> Self {
        Self {
            directory: spawn_directory(rooms),
            settings: Arc::new(settings),
        }
    }
}
