//! Control/session wire protocol.
//!
//! JSON text frames, internally tagged by `type` with kebab-case names and
//! camelCase fields. Signaling payloads are opaque strings the coordinator
//! never parses.

mod client;
mod server;
mod types;

pub use client::ClientMessage;
pub use server::{ServerEventKind, ServerMessage};
pub use types::{
    Effects, FailureCode, HostPatch, HostSettings, LeaveReason, LocalPatch, LocalSettings,
    MicIdentity, MicSnapshot, MicStats, MicStatus, PeerConnectionState, QrPayload, Role,
    RoomSettings, RoomSummary,
};
