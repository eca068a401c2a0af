//! Payload types shared by client and server messages.

use serde::{Deserialize, Serialize};

use crate::id::{ConnId, RoomCode};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Effect parameters forwarded to the host's DSP graph.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Effects {
    pub reverb: f32,
    pub echo: f32,
    pub eq_bass: f32,
    pub eq_mid: f32,
    pub eq_treble: f32,
}

impl Effects {
    pub fn is_finite(&self) -> bool {
        [self.reverb, self.echo, self.eq_bass, self.eq_mid, self.eq_treble]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Settings a mic writes about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSettings {
    pub volume: f32,
    pub muted: bool,
    pub effects: Effects,
}

/// Settings the host writes about a mic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSettings {
    pub volume: f32,
    pub muted: bool,
    pub solo: bool,
    pub effects: Effects,
}

/// Partial update to [`LocalSettings`]. `None` fields are left alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalPatch {
    pub volume: Option<f32>,
    pub muted: Option<bool>,
    pub effects: Option<Effects>,
}

/// Partial update to [`HostSettings`]. `None` fields are left alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostPatch {
    pub volume: Option<f32>,
    pub muted: Option<bool>,
    pub solo: Option<bool>,
    pub effects: Option<Effects>,
}

impl LocalSettings {
    pub fn new(volume: f32, effects: Effects) -> Self {
        Self {
            volume,
            muted: false,
            effects,
        }
    }

    pub fn apply(&mut self, patch: &LocalPatch) {
        if let Some(volume) = patch.volume {
            self.volume = volume;
        }
        if let Some(muted) = patch.muted {
            self.muted = muted;
        }
        if let Some(effects) = patch.effects {
            self.effects = effects;
        }
    }
}

impl HostSettings {
    pub fn new(volume: f32, effects: Effects) -> Self {
        Self {
            volume,
            muted: false,
            solo: false,
            effects,
        }
    }

    pub fn apply(&mut self, patch: &HostPatch) {
        if let Some(volume) = patch.volume {
            self.volume = volume;
        }
        if let Some(muted) = patch.muted {
            self.muted = muted;
        }
        if let Some(solo) = patch.solo {
            self.solo = solo;
        }
        if let Some(effects) = patch.effects {
            self.effects = effects;
        }
    }
}

/// Room-wide settings. Only the host writes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub max_mics: usize,
    pub master_volume: f32,
    pub global_effects: Effects,
}

/// Live per-mic measurements reported by the mic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicStats {
    /// Round-trip estimate in milliseconds.
    pub latency: f64,
    /// Last reported level in dBFS.
    pub audio_level: f32,
}

impl Default for MicStats {
    fn default() -> Self {
        Self {
            latency: 0.0,
            audio_level: -60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Connection state reported by the media transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Where a mic is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicStatus {
    /// Joined the room, media not yet negotiated.
    Connecting,
    /// Host asked the mic to start media negotiation.
    Negotiating,
    Connected,
    /// Connected and reporting audio.
    Streaming,
    Error,
    /// Media transport dropped. The mic is still a member and may reconnect.
    Disconnected,
}

impl MicStatus {
    /// Host triggered negotiation with this mic.
    pub fn on_negotiation_started(self) -> Self {
        match self {
            MicStatus::Connecting | MicStatus::Error | MicStatus::Disconnected => {
                MicStatus::Negotiating
            }
            other => other,
        }
    }

    /// Media transport reported a new connection state.
    pub fn on_peer_state(self, state: PeerConnectionState) -> Self {
        match state {
            PeerConnectionState::New | PeerConnectionState::Connecting => match self {
                MicStatus::Connected | MicStatus::Streaming => self,
                _ => MicStatus::Negotiating,
            },
            PeerConnectionState::Connected => match self {
                MicStatus::Streaming => self,
                _ => MicStatus::Connected,
            },
            PeerConnectionState::Failed => MicStatus::Error,
            PeerConnectionState::Disconnected | PeerConnectionState::Closed => {
                MicStatus::Disconnected
            }
        }
    }

    /// Mic reported an audio level.
    pub fn on_audio(self) -> Self {
        match self {
            MicStatus::Connected => MicStatus::Streaming,
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Mic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomCode,
    pub room_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<RoomSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicIdentity {
    pub mic_id: ConnId,
    pub peer_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicSnapshot {
    pub mic_id: ConnId,
    pub name: String,
    pub status: MicStatus,
    pub host_settings: HostSettings,
}

/// Join link for a room, plus its QR rendering as a data URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub room_id: RoomCode,
    pub url: String,
    pub data_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCode {
    RoomNotFound,
    RoomFull,
    AlreadyInRoom,
    CollaboratorFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveReason {
    Kicked,
    Left,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_patch_only_touches_given_fields() {
        let mut settings = HostSettings::new(1.0, Effects::default());
        settings.apply(&HostPatch {
            solo: Some(true),
            ..Default::default()
        });
        assert!(settings.solo);
        assert!(!settings.muted);
        assert_eq!(settings.volume, 1.0);
    }

    #[test]
    fn local_patch_merges_effects() {
        let mut settings = LocalSettings::new(1.0, Effects::default());
        let effects = Effects {
            reverb: 0.4,
            ..Default::default()
        };
        settings.apply(&LocalPatch {
            volume: Some(0.5),
            effects: Some(effects),
            ..Default::default()
        });
        assert_eq!(settings.volume, 0.5);
        assert_eq!(settings.effects.reverb, 0.4);
    }

    #[test]
    fn effects_use_camel_case_on_the_wire() {
        let json = serde_json::to_value(Effects {
            eq_bass: 3.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json["eqBass"], 3.0);
        let partial: Effects = serde_json::from_str(r#"{"echo":0.2}"#).unwrap();
        assert_eq!(partial.echo, 0.2);
        assert_eq!(partial.reverb, 0.0);
    }

    #[test]
    fn non_finite_effects_are_detected() {
        let effects = Effects {
            echo: f32::NAN,
            ..Default::default()
        };
        assert!(!effects.is_finite());
        assert!(Effects::default().is_finite());
    }

    #[test]
    fn mic_status_happy_path() {
        let status = MicStatus::Connecting
            .on_negotiation_started()
            .on_peer_state(PeerConnectionState::Connecting)
            .on_peer_state(PeerConnectionState::Connected)
            .on_audio();
        assert_eq!(status, MicStatus::Streaming);
    }

    #[test]
    fn audio_before_connect_does_not_stream() {
        assert_eq!(MicStatus::Connecting.on_audio(), MicStatus::Connecting);
    }

    #[test]
    fn failure_then_retry() {
        let status = MicStatus::Connected.on_peer_state(PeerConnectionState::Failed);
        assert_eq!(status, MicStatus::Error);
        assert_eq!(status.on_negotiation_started(), MicStatus::Negotiating);
    }

    #[test]
    fn disconnected_recovers_on_reconnect() {
        let status = MicStatus::Streaming.on_peer_state(PeerConnectionState::Closed);
        assert_eq!(status, MicStatus::Disconnected);
        assert_eq!(status.on_audio(), MicStatus::Disconnected);
        assert_eq!(
            status.on_peer_state(PeerConnectionState::Connecting),
            MicStatus::Negotiating
        );
        assert_eq!(
            status.on_peer_state(PeerConnectionState::Connected),
            MicStatus::Connected
        );
        assert_eq!(status.on_negotiation_started(), MicStatus::Negotiating);
    }

    #[test]
    fn failure_code_wire_names() {
        assert_eq!(
            serde_json::to_string(&FailureCode::RoomNotFound).unwrap(),
            "\"room-not-found\""
        );
        assert_eq!(
            serde_json::to_string(&FailureCode::CollaboratorFailure).unwrap(),
            "\"collaborator-failure\""
        );
    }
}
