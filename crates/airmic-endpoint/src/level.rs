//! Level metering: RMS to dBFS, meter percentages, and level sources.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Floor of every meter. Anything quieter reads as this.
pub const SILENCE_DB: f32 = -60.0;

/// Anything that can be asked for the current level in dBFS.
///
/// Implementations wrap an analyser on the audio thread; the control loops
/// only ever read from it.
pub trait LevelSource: Send + 'static {
    fn level_db(&mut self) -> f32;
}

/// Root mean square of a block of normalized samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Convert an RMS amplitude (0.0..=1.0) to dBFS, floored at [`SILENCE_DB`].
pub fn rms_to_db(rms: f32) -> f32 {
    let db = 20.0 * (rms + 0.0001).log10();
    if db.is_finite() {
        db.max(SILENCE_DB)
    } else {
        SILENCE_DB
    }
}

/// Level of a block of samples in dBFS.
pub fn block_db(samples: &[f32]) -> f32 {
    rms_to_db(rms(samples))
}

/// Map dBFS onto a 0..=100 meter.
pub fn level_percent(db: f32) -> f32 {
    if !db.is_finite() {
        return 0.0;
    }
    ((db - SILENCE_DB) * (100.0 / -SILENCE_DB)).clamp(0.0, 100.0)
}

/// A level another task can set, e.g. a meter fed by the audio callback.
#[derive(Debug, Clone)]
pub struct SharedLevel(Arc<AtomicU32>);

impl SharedLevel {
    pub fn new(db: f32) -> Self {
        Self(Arc::new(AtomicU32::new(db.to_bits())))
    }

    pub fn set(&self, db: f32) {
        self.0.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl Default for SharedLevel {
    fn default() -> Self {
        Self::new(SILENCE_DB)
    }
}

impl LevelSource for SharedLevel {
    fn level_db(&mut self) -> f32 {
        self.get()
    }
}

/// Replays a fixed list of readings, then keeps returning the last one.
#[derive(Debug, Clone)]
pub struct ScriptedLevels {
    readings: Vec<f32>,
    next: usize,
}

impl ScriptedLevels {
    pub fn new(readings: impl Into<Vec<f32>>) -> Self {
        Self {
            readings: readings.into(),
            next: 0,
        }
    }
}

impl LevelSource for ScriptedLevels {
    fn level_db(&mut self) -> f32 {
        let reading = self
            .readings
            .get(self.next)
            .or_else(|| self.readings.last())
            .copied()
            .unwrap_or(SILENCE_DB);
        self.next = (self.next + 1).min(self.readings.len());
        reading
    }
}
