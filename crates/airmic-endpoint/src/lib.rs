//! airmic endpoint: the host and mic side of a room.
//!
//! The platform audio stack plugs in through two traits: [`LevelSource`]
//! meters a signal and [`DspGraph`] receives gain and effect parameters.
//! Everything else (the coordinator client, the noise gate, ducking, the
//! mixer and the session loops) lives here.

pub mod client;
pub mod dispatch;
pub mod dsp;
pub mod ducking;
pub mod gate;
pub mod level;
pub mod mixer;
pub mod poller;
pub mod session;

pub use client::{ClientOptions, CoordinatorClient, EventStream};
pub use dsp::{DspGraph, ParamWrite, Ramp, RecordingGraph};
pub use level::{LevelSource, ScriptedLevels, SharedLevel};
pub use session::{EndReason, HostSession, IncomingSignal, MicSession, SessionOptions};
