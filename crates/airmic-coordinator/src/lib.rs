//! airmic coordinator: rooms, signaling relay and control-state sync for
//! live multi-mic audio sessions.
//!
//! One host creates a room; mics join it by code. The coordinator keeps the
//! room registry, forwards media negotiation between host and mics, and
//! pushes control changes to whichever side needs them. Audio itself never
//! passes through it.

pub mod connection;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod peers;
pub mod qr;
pub mod relay;
pub mod store;
pub mod sync;

pub use connection::{serve_ws, ConnectionLimits};
pub use dispatch::Coordinator;
pub use http::{serve_http, HttpState};
