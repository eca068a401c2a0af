//! Messages the coordinator sends to endpoints.

use serde::{Deserialize, Serialize};

use crate::id::ConnId;

use super::types::{
    Effects, FailureCode, LeaveReason, LocalSettings, MicIdentity, MicSnapshot,
    PeerConnectionState, QrPayload, RoomSummary,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First frame on every connection.
    Welcome { conn_id: ConnId },

    // -- replies --
    RoomCreated {
        request_id: Option<u64>,
        room: RoomSummary,
        qr: QrPayload,
    },
    RoomJoined {
        request_id: Option<u64>,
        room: RoomSummary,
        mic: MicIdentity,
        host_id: ConnId,
    },
    RoomCheck {
        request_id: Option<u64>,
        exists: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mic_count: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_mics: Option<usize>,
    },
    RoomInfo {
        request_id: Option<u64>,
        room: RoomSummary,
        mics: Vec<MicSnapshot>,
    },
    RequestFailed {
        request_id: Option<u64>,
        code: FailureCode,
        message: String,
    },

    // -- membership --
    MicJoined {
        mic_id: ConnId,
        peer_id: String,
        name: String,
        settings: LocalSettings,
    },
    MicDisconnected {
        mic_id: ConnId,
        name: String,
    },
    MicLeft {
        mic_id: ConnId,
        name: String,
        reason: LeaveReason,
    },
    /// Terminal: this connection was removed from its room by the host.
    Kicked { reason: String },
    /// Terminal: the room no longer exists.
    RoomClosed { reason: String },

    // -- signaling --
    WebrtcSignal { from: ConnId, signal: String },
    MicWebrtcReady { mic_id: ConnId, peer_id: String },
    StartWebrtc { host_id: ConnId },
    MicWebrtcState {
        mic_id: ConnId,
        state: PeerConnectionState,
    },

    // -- host overrides, delivered to the affected mic --
    HostVolumeOverride { volume: f32 },
    HostMuteOverride { muted: bool },
    HostSoloOverride { solo: bool },
    EffectsUpdate { effects: Effects },
    MasterVolumeUpdate { volume: f32 },
    GlobalEffectsUpdate { effects: Effects },
    Ducking { active: bool },
    MicMutedByHost { mic_id: ConnId, muted: bool },
    MicSoloState { mic_id: ConnId, solo: bool },

    // -- mic status, delivered to the host --
    MicLocalVolume { mic_id: ConnId, volume: f32 },
    MicMuteState { mic_id: ConnId, muted: bool },
    MicEffectsPreference { mic_id: ConnId, effects: Effects },
    MicAudioLevel { mic_id: ConnId, level: f32 },
    MicLatency { mic_id: ConnId, latency: f64 },
}

/// Discriminant of [`ServerMessage`], used as a dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEventKind {
    Welcome,
    RoomCreated,
    RoomJoined,
    RoomCheck,
    RoomInfo,
    RequestFailed,
    MicJoined,
    MicDisconnected,
    MicLeft,
    Kicked,
    RoomClosed,
    WebrtcSignal,
    MicWebrtcReady,
    StartWebrtc,
    MicWebrtcState,
    HostVolumeOverride,
    HostMuteOverride,
    HostSoloOverride,
    EffectsUpdate,
    MasterVolumeUpdate,
    GlobalEffectsUpdate,
    Ducking,
    MicMutedByHost,
    MicSoloState,
    MicLocalVolume,
    MicMuteState,
    MicEffectsPreference,
    MicAudioLevel,
    MicLatency,
}

impl ServerMessage {
    pub fn kind(&self) -> ServerEventKind {
        use ServerEventKind as K;
        match self {
            ServerMessage::Welcome { .. } => K::Welcome,
            ServerMessage::RoomCreated { .. } => K::RoomCreated,
            ServerMessage::RoomJoined { .. } => K::RoomJoined,
            ServerMessage::RoomCheck { .. } => K::RoomCheck,
            ServerMessage::RoomInfo { .. } => K::RoomInfo,
            ServerMessage::RequestFailed { .. } => K::RequestFailed,
            ServerMessage::MicJoined { .. } => K::MicJoined,
            ServerMessage::MicDisconnected { .. } => K::MicDisconnected,
            ServerMessage::MicLeft { .. } => K::MicLeft,
            ServerMessage::Kicked { .. } => K::Kicked,
            ServerMessage::RoomClosed { .. } => K::RoomClosed,
            ServerMessage::WebrtcSignal { .. } => K::WebrtcSignal,
            ServerMessage::MicWebrtcReady { .. } => K::MicWebrtcReady,
            ServerMessage::StartWebrtc { .. } => K::StartWebrtc,
            ServerMessage::MicWebrtcState { .. } => K::MicWebrtcState,
            ServerMessage::HostVolumeOverride { .. } => K::HostVolumeOverride,
            ServerMessage::HostMuteOverride { .. } => K::HostMuteOverride,
            ServerMessage::HostSoloOverride { .. } => K::HostSoloOverride,
            ServerMessage::EffectsUpdate { .. } => K::EffectsUpdate,
            ServerMessage::MasterVolumeUpdate { .. } => K::MasterVolumeUpdate,
            ServerMessage::GlobalEffectsUpdate { .. } => K::GlobalEffectsUpdate,
            ServerMessage::Ducking { .. } => K::Ducking,
            ServerMessage::MicMutedByHost { .. } => K::MicMutedByHost,
            ServerMessage::MicSoloState { .. } => K::MicSoloState,
            ServerMessage::MicLocalVolume { .. } => K::MicLocalVolume,
            ServerMessage::MicMuteState { .. } => K::MicMuteState,
            ServerMessage::MicEffectsPreference { .. } => K::MicEffectsPreference,
            ServerMessage::MicAudioLevel { .. } => K::MicAudioLevel,
            ServerMessage::MicLatency { .. } => K::MicLatency,
        }
    }

    /// Request id if this is a reply to a request.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::RoomCreated { request_id, .. }
            | ServerMessage::RoomJoined { request_id, .. }
            | ServerMessage::RoomCheck { request_id, .. }
            | ServerMessage::RoomInfo { request_id, .. }
            | ServerMessage::RequestFailed { request_id, .. } => *request_id,
            _ => None,
        }
    }

    /// True for events after which the connection is no longer in a room.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerMessage::Kicked { .. } | ServerMessage::RoomClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_wire_format() {
        let json = serde_json::to_string(&ServerMessage::Welcome {
            conn_id: ConnId::from("c1"),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"welcome","connId":"c1"}"#);
    }

    #[test]
    fn signal_payload_round_trips_verbatim() {
        let payload = r#"{"sdp":"v=0\r\no=- 1 2 IN IP4 127.0.0.1","type":"offer"}"#;
        let msg = ServerMessage::WebrtcSignal {
            from: ConnId::from("host"),
            signal: payload.to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        match back {
            ServerMessage::WebrtcSignal { signal, .. } => assert_eq!(signal, payload),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn room_check_omits_absent_fields() {
        let json = serde_json::to_value(ServerMessage::RoomCheck {
            request_id: Some(3),
            exists: false,
            room_name: None,
            mic_count: None,
            max_mics: None,
        })
        .unwrap();
        assert_eq!(json["type"], "room-check");
        assert_eq!(json["requestId"], 3);
        assert!(json.get("micCount").is_none());
    }

    #[test]
    fn terminal_events() {
        assert!(ServerMessage::Kicked {
            reason: "bye".into()
        }
        .is_terminal());
        assert!(ServerMessage::RoomClosed {
            reason: "host left".into()
        }
        .is_terminal());
        assert!(!ServerMessage::Ducking { active: true }.is_terminal());
    }

    #[test]
    fn kind_and_request_id() {
        let msg = ServerMessage::RequestFailed {
            request_id: Some(9),
            code: FailureCode::RoomFull,
            message: "full".into(),
        };
        assert_eq!(msg.kind(), ServerEventKind::RequestFailed);
        assert_eq!(msg.request_id(), Some(9));
        assert_eq!(
            ServerMessage::Ducking { active: false }.kind(),
            ServerEventKind::Ducking
        );
    }
}
