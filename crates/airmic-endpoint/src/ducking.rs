//! Anti-echo ducking.
//!
//! The host watches its own output level with a [`DuckingDetector`] and
//! signals edges only. Each mic runs a [`DuckingFollower`] that turns those
//! edges into gain ramps: fast down to the attenuation factor, slow back up.

use airmic_config::schema::DuckingConfig;

use crate::dsp::{params, ParamWrite, Ramp};

/// Edge detector on the host's output level.
#[derive(Debug, Clone)]
pub struct DuckingDetector {
    enabled: bool,
    threshold_db: f32,
    active: bool,
}

impl DuckingDetector {
    pub fn new(config: &DuckingConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold_db: config.threshold_db,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed one level reading. Returns the new state on a crossing.
    pub fn sample(&mut self, level_db: f32) -> Option<bool> {
        if !self.enabled {
            return None;
        }
        let should_duck = level_db > self.threshold_db;
        if should_duck == self.active {
            return None;
        }
        self.active = should_duck;
        Some(should_duck)
    }

    pub fn set_threshold(&mut self, threshold_db: f32) {
        self.threshold_db = threshold_db;
    }

    /// Disabling while active releases the mics.
    pub fn set_enabled(&mut self, enabled: bool) -> Option<bool> {
        self.enabled = enabled;
        if !enabled && self.active {
            self.active = false;
            return Some(false);
        }
        None
    }
}

/// Turns ducking edges into gain ramps on a mic.
#[derive(Debug, Clone)]
pub struct DuckingFollower {
    attenuation: f32,
    attack: Ramp,
    release: Ramp,
    active: bool,
}

impl DuckingFollower {
    pub fn new(config: &DuckingConfig) -> Self {
        Self {
            attenuation: config.attenuation,
            attack: Ramp::from_millis(config.attack_ms),
            release: Ramp::from_millis(config.release_ms),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn gain(&self) -> f32 {
        if self.active {
            self.attenuation
        } else {
            1.0
        }
    }

    /// Apply a ducking edge. Repeats of the current state are ignored.
    pub fn apply(&mut self, active: bool) -> Option<ParamWrite> {
        if active == self.active {
            return None;
        }
        self.active = active;
        let ramp = if active { self.attack } else { self.release };
        Some(ParamWrite::new(params::DUCK_GAIN, self.gain(), ramp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn two_crossings_make_two_edges() {
        let mut detector = DuckingDetector::new(&DuckingConfig::default());
        let levels = [-60.0, -50.0, -20.0, -10.0, -15.0, -40.0, -55.0, -60.0];
        let edges: Vec<bool> = levels.iter().filter_map(|&db| detector.sample(db)).collect();
        assert_eq!(edges, vec![true, false]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut detector = DuckingDetector::new(&DuckingConfig::default());
        assert_eq!(detector.sample(-35.0), None);
        assert_eq!(detector.sample(-34.9), Some(true));
        assert_eq!(detector.sample(-35.0), Some(false));
    }

    #[test]
    fn disabled_detector_is_silent_and_releases() {
        let mut detector = DuckingDetector::new(&DuckingConfig::default());
        assert_eq!(detector.sample(-10.0), Some(true));
        assert_eq!(detector.set_enabled(false), Some(false));
        assert_eq!(detector.sample(-10.0), None);
        assert!(!detector.is_active());

        assert_eq!(detector.set_enabled(true), None);
        assert_eq!(detector.sample(-10.0), Some(true));
    }

    #[test]
    fn follower_attacks_fast_and_releases_slow() {
        let config = DuckingConfig::default();
        let mut follower = DuckingFollower::new(&config);
        assert_eq!(follower.gain(), 1.0);

        let down = follower.apply(true).unwrap();
        assert_eq!(down.name, params::DUCK_GAIN);
        assert_eq!(down.value, 0.3);
        assert_eq!(down.ramp, Ramp::TimeConstant(Duration::from_millis(50)));
        assert!(follower.apply(true).is_none());

        let up = follower.apply(false).unwrap();
        assert_eq!(up.value, 1.0);
        assert_eq!(up.ramp, Ramp::TimeConstant(Duration::from_millis(400)));
        assert!(follower.apply(false).is_none());
    }
}
