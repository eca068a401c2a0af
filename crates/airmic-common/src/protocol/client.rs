//! Messages endpoints send to the coordinator.

use serde::{Deserialize, Serialize};

use crate::id::{ConnId, RoomCode};

use super::types::{Effects, PeerConnectionState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    // -- requests (answered with a reply carrying the same request id) --
    CreateRoom {
        #[serde(default)]
        request_id: Option<u64>,
        #[serde(default)]
        room_name: Option<String>,
    },
    JoinRoom {
        #[serde(default)]
        request_id: Option<u64>,
        room_id: RoomCode,
        #[serde(default)]
        mic_name: Option<String>,
    },
    CheckRoom {
        #[serde(default)]
        request_id: Option<u64>,
        room_id: RoomCode,
    },
    GetRoomInfo {
        #[serde(default)]
        request_id: Option<u64>,
        room_id: RoomCode,
    },

    // -- lifecycle --
    LeaveRoom {
        room_id: RoomCode,
    },
    KickMic {
        room_id: RoomCode,
        mic_id: ConnId,
    },

    // -- signaling --
    /// Opaque negotiation blob for another connection in the same room.
    WebrtcSignal {
        to: ConnId,
        #[serde(default)]
        room_id: Option<RoomCode>,
        signal: String,
    },
    WebrtcReady {
        room_id: RoomCode,
        peer_id: String,
    },
    InitiateWebrtc {
        room_id: RoomCode,
        mic_id: ConnId,
    },
    WebrtcState {
        room_id: RoomCode,
        state: PeerConnectionState,
    },

    // -- host-only controls --
    HostSetMicVolume {
        room_id: RoomCode,
        mic_id: ConnId,
        volume: f32,
    },
    HostMuteMic {
        room_id: RoomCode,
        mic_id: ConnId,
        muted: bool,
    },
    SoloMic {
        room_id: RoomCode,
        mic_id: ConnId,
        solo: bool,
    },
    MasterVolumeChange {
        room_id: RoomCode,
        volume: f32,
    },
    GlobalEffectsChange {
        room_id: RoomCode,
        effects: Effects,
    },
    MicEffectsChange {
        room_id: RoomCode,
        mic_id: ConnId,
        effects: Effects,
    },
    DuckingSignal {
        room_id: RoomCode,
        ducking: bool,
    },

    // -- mic-only reports --
    MicVolumeChange {
        room_id: RoomCode,
        volume: f32,
    },
    MicMuteToggle {
        room_id: RoomCode,
        muted: bool,
    },
    MicEffectsPreference {
        room_id: RoomCode,
        effects: Effects,
    },
    AudioLevel {
        room_id: RoomCode,
        level: f32,
    },
    LatencyReport {
        room_id: RoomCode,
        latency: f64,
    },
}

impl ClientMessage {
    /// Request id for request/response messages.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ClientMessage::CreateRoom { request_id, .. }
            | ClientMessage::JoinRoom { request_id, .. }
            | ClientMessage::CheckRoom { request_id, .. }
            | ClientMessage::GetRoomInfo { request_id, .. } => *request_id,
            _ => None,
        }
    }

    /// Stamp a request id onto a request message. No-op for other messages.
    pub fn with_request_id(mut self, id: u64) -> Self {
        match &mut self {
            ClientMessage::CreateRoom { request_id, .. }
            | ClientMessage::JoinRoom { request_id, .. }
            | ClientMessage::CheckRoom { request_id, .. }
            | ClientMessage::GetRoomInfo { request_id, .. } => *request_id = Some(id),
            _ => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_room_without_payload_fields() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"create-room"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                request_id: None,
                room_name: None
            }
        );
    }

    #[test]
    fn join_room_normalizes_code() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"join-room","requestId":7,"roomId":"abc234","micName":"Ana"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::JoinRoom {
                request_id,
                room_id,
                mic_name,
            } => {
                assert_eq!(request_id, Some(7));
                assert_eq!(room_id.as_str(), "ABC234");
                assert_eq!(mic_name.as_deref(), Some("Ana"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn host_control_field_names() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"host-set-mic-volume","roomId":"ABC234","micId":"m1","volume":0.5}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::HostSetMicVolume { ref mic_id, volume, .. }
                if mic_id.as_str() == "m1" && volume == 0.5
        ));
    }

    #[test]
    fn webrtc_state_parses_enum() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"webrtc-state","roomId":"ABC234","state":"connected"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::WebrtcState {
                state: PeerConnectionState::Connected,
                ..
            }
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"self-destruct"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn request_id_stamping() {
        let msg = ClientMessage::CheckRoom {
            request_id: None,
            room_id: RoomCode::from("ABC234"),
        }
        .with_request_id(42);
        assert_eq!(msg.request_id(), Some(42));

        let msg = ClientMessage::MicMuteToggle {
            room_id: RoomCode::from("ABC234"),
            muted: true,
        }
        .with_request_id(42);
        assert_eq!(msg.request_id(), None);
    }
}
