//! Channel gains on the host, send gain on the mic.
//!
//! The solo rule lives here and nowhere else: while any channel is soloed,
//! only soloed channels are audible; otherwise mute applies.

use std::collections::HashMap;

use airmic_common::protocol::{Effects, HostSettings, LocalSettings};
use airmic_common::ConnId;

use crate::dsp::{self, params, ParamWrite, Ramp};

/// Whether a channel is heard given the room's solo state.
pub fn is_audible(settings: &HostSettings, any_solo: bool) -> bool {
    if any_solo {
        settings.solo
    } else {
        !settings.muted
    }
}

/// Gain a mic applies to what it sends. A host mute always wins over the
/// mic's own unmute. Host volume is applied by the host's mixer, not here.
pub fn send_gain(local: &LocalSettings, host: &HostSettings) -> f32 {
    if local.muted || host.muted {
        0.0
    } else {
        local.volume
    }
}

/// The host's view of every mic channel plus the master bus.
#[derive(Debug, Clone)]
pub struct Mixer {
    channels: HashMap<ConnId, HostSettings>,
    master_volume: f32,
    master_effects: Effects,
    default_channel: HostSettings,
}

impl Mixer {
    /// `default_channel` is what new channels start with.
    pub fn new(master_volume: f32, default_channel: HostSettings) -> Self {
        Self {
            channels: HashMap::new(),
            master_volume,
            master_effects: Effects::default(),
            default_channel,
        }
    }

    pub fn add_channel(&mut self, mic: ConnId) {
        self.channels
            .entry(mic)
            .or_insert_with(|| self.default_channel.clone());
    }

    pub fn remove_channel(&mut self, mic: &ConnId) -> Option<HostSettings> {
        self.channels.remove(mic)
    }

    pub fn channel(&self, mic: &ConnId) -> Option<&HostSettings> {
        self.channels.get(mic)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn master_effects(&self) -> Effects {
        self.master_effects
    }

    pub fn any_solo(&self) -> bool {
        self.channels.values().any(|c| c.solo)
    }

    /// Update one channel. Returns false for unknown mics.
    pub fn update(&mut self, mic: &ConnId, f: impl FnOnce(&mut HostSettings)) -> bool {
        match self.channels.get_mut(mic) {
            Some(channel) => {
                f(channel);
                true
            }
            None => false,
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume;
    }

    pub fn set_master_effects(&mut self, effects: Effects) {
        self.master_effects = effects;
    }

    /// Final gain for one channel, master volume included.
    pub fn effective_gain(&self, mic: &ConnId) -> f32 {
        let any_solo = self.any_solo();
        self.channels
            .get(mic)
            .map(|c| self.gain_of(c, any_solo))
            .unwrap_or(0.0)
    }

    fn gain_of(&self, channel: &HostSettings, any_solo: bool) -> f32 {
        if is_audible(channel, any_solo) {
            channel.volume * self.master_volume
        } else {
            0.0
        }
    }

    /// Gain writes for every channel. Solo on one channel changes the
    /// others, so every change rewrites all of them.
    pub fn gain_writes(&self, ramp: Ramp) -> Vec<ParamWrite> {
        let any_solo = self.any_solo();
        let mut writes: Vec<ParamWrite> = self
            .channels
            .iter()
            .map(|(mic, channel)| {
                ParamWrite::new(
                    params::channel_gain(mic.as_str()),
                    self.gain_of(channel, any_solo),
                    ramp,
                )
            })
            .collect();
        writes.sort_by(|a, b| a.name.cmp(&b.name));
        writes
    }

    /// Effect writes for one channel.
    pub fn effect_writes(&self, mic: &ConnId) -> Vec<ParamWrite> {
        self.channels
            .get(mic)
            .map(|c| dsp::channel_effect_writes(mic, &c.effects))
            .unwrap_or_default()
    }

    /// Effect writes for the master bus.
    pub fn master_effect_writes(&self) -> Vec<ParamWrite> {
        dsp::effect_writes(&self.master_effects, params::master_effect)
    }
}
