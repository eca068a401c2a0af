//! Configuration schema types for airmic.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod audio;
mod logging;
mod room;
mod server;

pub use audio::*;
pub use logging::*;
pub use room::*;
pub use server::*;

use std::time::Duration;

use airmic_common::protocol::{Effects, RoomSettings};
use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration shared by the coordinator and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct AirmicConfig {
    pub server: ServerConfig,
    pub room: RoomConfig,
    pub qr: QrConfig,
    pub audio: AudioConfig,
    pub gate: GateConfig,
    pub ducking: DuckingConfig,
    pub endpoint: EndpointConfig,
    pub logging: LoggingConfig,
}

impl From<&EffectsDefaults> for Effects {
    fn from(d: &EffectsDefaults) -> Self {
        Effects {
            reverb: d.reverb,
            echo: d.echo,
            eq_bass: d.eq_bass,
            eq_mid: d.eq_mid,
            eq_treble: d.eq_treble,
        }
    }
}

impl AirmicConfig {
    /// Settings every new room starts with.
    pub fn initial_room_settings(&self) -> RoomSettings {
        RoomSettings {
            max_mics: self.room.max_mics as usize,
            master_volume: self.audio.default_volume,
            global_effects: Effects::from(&self.audio.effects),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.endpoint.poll_interval_ms))
    }
}
