//! Noise gate for a mic's send path.
//!
//! The gate is sampled once per poll period. It opens as soon as the level
//! exceeds the threshold and closes only after the level has stayed at or
//! below the threshold for the whole hold time. Gain changes are ramped with
//! the attack (opening) and release (closing) time constants.

use std::time::Duration;

use airmic_config::schema::GateConfig;

use crate::dsp::{params, ParamWrite, Ramp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Closed,
    Open,
    /// Open, but the level dropped below threshold `quiet` samples ago.
    Holding { quiet: u32 },
}

/// An open/closed edge plus the gain write that goes with it.
#[derive(Debug, Clone, PartialEq)]
pub struct GateTransition {
    pub open: bool,
    pub gain: ParamWrite,
}

#[derive(Debug, Clone)]
pub struct NoiseGate {
    enabled: bool,
    threshold_db: f32,
    hold_samples: u32,
    attack: Ramp,
    release: Ramp,
    state: GateState,
}

impl NoiseGate {
    /// Build a gate sampled every `poll` from its configuration.
    pub fn new(config: &GateConfig, poll: Duration) -> Self {
        Self {
            enabled: config.enabled,
            threshold_db: config.threshold_db,
            hold_samples: hold_samples(Duration::from_millis(u64::from(config.hold_ms)), poll),
            attack: Ramp::from_millis(config.attack_ms),
            release: Ramp::from_millis(config.release_ms),
            state: GateState::Closed,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Whether audio passes. A disabled gate always passes.
    pub fn is_open(&self) -> bool {
        !self.enabled || self.state != GateState::Closed
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    /// Number of quiet samples the gate waits before closing.
    pub fn hold_samples(&self) -> u32 {
        self.hold_samples
    }

    /// Current gain target.
    pub fn gain(&self) -> f32 {
        if self.is_open() {
            1.0
        } else {
            0.0
        }
    }

    /// Feed one level reading. Returns a transition only when the gate
    /// opens or closes.
    pub fn sample(&mut self, level_db: f32) -> Option<GateTransition> {
        if !self.enabled {
            return None;
        }
        let loud = level_db > self.threshold_db;

        match (self.state, loud) {
            (GateState::Closed, true) => {
                self.state = GateState::Open;
                Some(self.transition(true, self.attack))
            }
            (GateState::Closed, false) => None,
            (GateState::Open, true) => None,
            (GateState::Holding { .. }, true) => {
                self.state = GateState::Open;
                None
            }
            (GateState::Open, false) => self.hold(0),
            (GateState::Holding { quiet }, false) => self.hold(quiet + 1),
        }
    }

    fn hold(&mut self, quiet: u32) -> Option<GateTransition> {
        if quiet >= self.hold_samples {
            self.state = GateState::Closed;
            Some(self.transition(false, self.release))
        } else {
            self.state = GateState::Holding { quiet };
            None
        }
    }

    pub fn set_threshold(&mut self, threshold_db: f32) {
        self.threshold_db = threshold_db;
    }

    /// Enable or disable the gate. Disabling forces unity gain; enabling
    /// starts from open so the next quiet stretch closes it through the
    /// normal hold.
    pub fn set_enabled(&mut self, enabled: bool) -> Option<GateTransition> {
        if enabled == self.enabled {
            return None;
        }
        let was_open = self.is_open();
        self.enabled = enabled;
        self.state = GateState::Open;
        if was_open {
            None
        } else {
            Some(self.transition(true, Ramp::Immediate))
        }
    }

    fn transition(&self, open: bool, ramp: Ramp) -> GateTransition {
        GateTransition {
            open,
            gain: ParamWrite::new(params::GATE_GAIN, if open { 1.0 } else { 0.0 }, ramp),
        }
    }
}

fn hold_samples(hold: Duration, poll: Duration) -> u32 {
    if poll.is_zero() {
        return 0;
    }
    let samples = hold.as_nanos().div_ceil(poll.as_nanos());
    u32::try_from(samples).unwrap_or(u32::MAX)
}
