// ==============
// parley-relay-lib/src/telemetry.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const CALL_STARTED: &str = "call.started";
pub const CALL_JOINED: &str = "call.joined";
pub const CALL_ENDED: &str = "call.ended";
pub const SIGNAL_RELAYED: &str = "signal.relayed";
pub const SIGNAL_DROPPED: &str = "signal.dropped";
