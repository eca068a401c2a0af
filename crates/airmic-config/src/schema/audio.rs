//! Audio defaults and level-driven control loop settings.

use serde::{Deserialize, Serialize};

/// Effect parameter defaults applied to new rooms and mics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct EffectsDefaults {
    pub reverb: f32,
    pub echo: f32,
    pub eq_bass: f32,
    pub eq_mid: f32,
    pub eq_treble: f32,
}

/// Volume and effect defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Initial volume for new mics and the room master (valid range: 0.0-1.0).
    pub default_volume: f32,
    pub effects: EffectsDefaults,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            effects: EffectsDefaults::default(),
        }
    }
}

/// Mic-side noise gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub enabled: bool,
    /// Open above this level, in dBFS (valid range: -100.0-0.0).
    pub threshold_db: f32,
    /// How long the level must stay below threshold before closing.
    pub hold_ms: u32,
    /// Opening time constant.
    pub attack_ms: u32,
    /// Closing time constant.
    pub release_ms: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_db: -50.0,
            hold_ms: 250,
            attack_ms: 10,
            release_ms: 120,
        }
    }
}

/// Host-triggered anti-echo ducking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckingConfig {
    pub enabled: bool,
    /// Host output level above which mics are ducked, in dBFS.
    pub threshold_db: f32,
    /// Gain mics ramp to while ducked (valid range: 0.0-1.0, exclusive of 1.0).
    pub attenuation: f32,
    pub attack_ms: u32,
    pub release_ms: u32,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_db: -35.0,
            attenuation: 0.3,
            attack_ms: 50,
            release_ms: 400,
        }
    }
}

/// Endpoint client and loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Level polling period (valid range: 10-200).
    pub poll_interval_ms: u32,
    pub connect_timeout_secs: u32,
    pub request_timeout_secs: u32,
    /// Mics report their level to the host every this many polls.
    pub level_report_every: u32,
    /// Negotiation payloads buffered for the media layer.
    pub signal_queue: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            connect_timeout_secs: 10,
            request_timeout_secs: 10,
            level_report_every: 4,
            signal_queue: 64,
        }
    }
}
