//! Host and mic session controllers.
//!
//! A session owns its coordinator client and runs two tasks: a level loop
//! (noise gate on mics, ducking detector on the host) and an event loop that
//! feeds server events through an [`EventTable`]. Both stop when the session
//! ends: kicked, room closed, left, connection lost, or dropped.

mod host;
mod mic;

pub use host::{HostSession, HostView, MicInfo};
pub use mic::{MicSession, MicView};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use airmic_common::protocol::{Effects, HostSettings, LocalSettings};
use airmic_common::{ClientMessage, ConnId};
use airmic_config::schema::{DuckingConfig, GateConfig};
use airmic_config::AirmicConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{CoordinatorClient, EventStream};
use crate::dispatch::{Dispatched, EventTable, Flow};

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// This endpoint left or closed the room.
    Left,
    /// The host removed this mic.
    Kicked(String),
    /// The room went away.
    RoomClosed(String),
    /// The coordinator connection dropped.
    Disconnected,
}

/// Negotiation payload from another endpoint, for the media layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingSignal {
    pub from: ConnId,
    pub signal: String,
}

/// Session timing and audio defaults.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    pub gate: GateConfig,
    pub ducking: DuckingConfig,
    /// Mics report their level to the host every this many polls.
    pub level_report_every: u32,
    pub default_volume: f32,
    pub default_effects: Effects,
    pub signal_queue: usize,
}

impl SessionOptions {
    pub fn from_config(config: &AirmicConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            gate: config.gate.clone(),
            ducking: config.ducking.clone(),
            level_report_every: config.endpoint.level_report_every,
            default_volume: config.audio.default_volume,
            default_effects: Effects::from(&config.audio.effects),
            signal_queue: config.endpoint.signal_queue.max(1) as usize,
        }
    }

    pub(crate) fn local_settings(&self) -> LocalSettings {
        LocalSettings::new(self.default_volume, self.default_effects)
    }

    pub(crate) fn host_settings(&self) -> HostSettings {
        HostSettings::new(self.default_volume, self.default_effects)
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&AirmicConfig::default())
    }
}

/// State an event loop drives.
pub(crate) trait SessionState: Send + 'static {
    /// Messages handlers queued for the coordinator.
    fn take_outbox(&mut self) -> Vec<ClientMessage>;

    /// Record the end of the session. Only the first reason sticks.
    fn end(&mut self, reason: EndReason);
}

pub(crate) fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drain server events into `state` until a handler stops the loop, the
/// connection drops, or `cancel` fires. Cancels `cancel` on the way out so
/// the level loop stops with it.
pub(crate) async fn run_events<C: SessionState>(
    mut events: EventStream,
    table: EventTable<C>,
    state: Arc<Mutex<C>>,
    client: Arc<CoordinatorClient>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = events.recv() => msg,
        };

        let Some(msg) = msg else {
            lock(&state).end(EndReason::Disconnected);
            break;
        };

        let (outcome, outbox) = {
            let mut st = lock(&state);
            let outcome = table.dispatch(&mut *st, &msg);
            (outcome, st.take_outbox())
        };
        for out in outbox {
            if client.send(out).await.is_err() {
                break;
            }
        }
        if outcome == Dispatched::Handled(Flow::Stop) {
            break;
        }
    }
    cancel.cancel();
}

/// Forward a negotiation payload to the media layer without blocking.
pub(crate) fn forward_signal(tx: &mpsc::Sender<IncomingSignal>, from: &ConnId, signal: &str) {
    let incoming = IncomingSignal {
        from: from.clone(),
        signal: signal.to_string(),
    };
    if let Err(e) = tx.try_send(incoming) {
        tracing::debug!(from = %from, error = %e, "Dropping negotiation signal");
    }
}

/// Clamp a user-supplied volume into 0.0..=1.0. Non-finite input is silence.
pub(crate) fn unit(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests;
