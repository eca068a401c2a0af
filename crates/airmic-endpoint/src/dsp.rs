//! The audio graph the control loops write into.
//!
//! The graph itself lives with the platform audio stack. Control code only
//! sets named parameters, each with a ramp so gain changes never click.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use airmic_common::protocol::Effects;
use airmic_common::ConnId;

/// Parameter names understood by the graph.
pub mod params {
    /// Noise gate gain on the mic's send path.
    pub const GATE_GAIN: &str = "gate.gain";
    /// Ducking gain on the mic's send path.
    pub const DUCK_GAIN: &str = "duck.gain";
    /// Mic send gain after local volume and mutes.
    pub const SEND_GAIN: &str = "send.gain";

    /// Per-mic channel gain on the host's mixer.
    pub fn channel_gain(mic: &str) -> String {
        format!("mic.{mic}.gain")
    }

    /// Per-mic effect parameter on the host's mixer.
    pub fn channel_effect(mic: &str, effect: &str) -> String {
        format!("mic.{mic}.{effect}")
    }

    /// Master bus effect parameter.
    pub fn master_effect(effect: &str) -> String {
        format!("master.{effect}")
    }
}

/// How a parameter reaches its new value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ramp {
    Immediate,
    /// Exponential approach with this time constant.
    TimeConstant(Duration),
}

impl Ramp {
    pub fn from_millis(ms: u32) -> Self {
        if ms == 0 {
            Ramp::Immediate
        } else {
            Ramp::TimeConstant(Duration::from_millis(u64::from(ms)))
        }
    }
}

/// A single parameter write.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamWrite {
    pub name: String,
    pub value: f32,
    pub ramp: Ramp,
}

impl ParamWrite {
    pub fn new(name: impl Into<String>, value: f32, ramp: Ramp) -> Self {
        Self {
            name: name.into(),
            value,
            ramp,
        }
    }
}

/// Parameter sink for a platform audio graph.
pub trait DspGraph: Send + 'static {
    fn set_param(&mut self, name: &str, value: f32, ramp: Ramp);

    fn apply(&mut self, write: &ParamWrite) {
        self.set_param(&write.name, write.value, write.ramp);
    }
}

/// One write per effect field, named by `name`.
pub(crate) fn effect_writes(effects: &Effects, name: impl Fn(&str) -> String) -> Vec<ParamWrite> {
    [
        ("reverb", effects.reverb),
        ("echo", effects.echo),
        ("eq_bass", effects.eq_bass),
        ("eq_mid", effects.eq_mid),
        ("eq_treble", effects.eq_treble),
    ]
    .into_iter()
    .map(|(effect, value)| ParamWrite::new(name(effect), value, Ramp::Immediate))
    .collect()
}

pub(crate) fn channel_effect_writes(mic: &ConnId, effects: &Effects) -> Vec<ParamWrite> {
    effect_writes(effects, |effect| params::channel_effect(mic.as_str(), effect))
}

/// Graph that records writes, for headless runs and inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingGraph {
    writes: Arc<Mutex<Vec<ParamWrite>>>,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, oldest first.
    pub fn writes(&self) -> Vec<ParamWrite> {
        self.writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Writes to one parameter, oldest first.
    pub fn writes_to(&self, name: &str) -> Vec<ParamWrite> {
        self.writes().into_iter().filter(|w| w.name == name).collect()
    }

    /// Most recent value written to `name`.
    pub fn last(&self, name: &str) -> Option<f32> {
        self.writes_to(name).last().map(|w| w.value)
    }
}

impl DspGraph for RecordingGraph {
    fn set_param(&mut self, name: &str, value: f32, ramp: Ramp) {
        let write = ParamWrite::new(name, value, ramp);
        match self.writes.lock() {
            Ok(mut writes) => writes.push(write),
            Err(poisoned) => poisoned.into_inner().push(write),
        }
    }
}
