//! Routes decoded client messages to the component that owns them.
//!
//! Request messages always produce exactly one reply on the requester's own
//! queue. Everything else is fire-and-forget: rejected messages are logged at
//! debug and dropped, and the sender hears nothing back.

use airmic_common::{ClientMessage, ConnId, ServerMessage, SessionError};
use airmic_config::AirmicConfig;
use tracing::debug;

use crate::lifecycle::SessionLifecycle;
use crate::peers::PeerDirectory;
use crate::qr::QrService;
use crate::relay::SignalingRelay;
use crate::store::{RoomStore, StoreConfig};
use crate::sync::ControlSync;

/// Owns the registry and every component that works on it.
#[derive(Clone)]
pub struct Coordinator {
    pub store: RoomStore,
    pub peers: PeerDirectory,
    pub qr: QrService,
    pub relay: SignalingRelay,
    pub sync: ControlSync,
    pub lifecycle: SessionLifecycle,
}

impl Coordinator {
    pub fn new(store: RoomStore, peers: PeerDirectory, qr: QrService) -> Self {
        Self {
            relay: SignalingRelay::new(store.clone(), peers.clone()),
            sync: ControlSync::new(store.clone(), peers.clone()),
            lifecycle: SessionLifecycle::new(store.clone(), peers.clone(), qr.clone()),
            store,
            peers,
            qr,
        }
    }

    pub fn from_config(config: &AirmicConfig) -> Self {
        Self::new(
            RoomStore::new(StoreConfig::from_config(config)),
            PeerDirectory::new(),
            QrService::from_config(config),
        )
    }

    /// Handle one message from `conn`.
    pub async fn handle(&self, conn: &ConnId, msg: ClientMessage) {
        match msg {
            // -- requests --
            ClientMessage::CreateRoom {
                request_id,
                room_name,
            } => {
                let reply = match self.lifecycle.create_room(conn, room_name.as_deref()).await {
                    Ok((room, qr)) => ServerMessage::RoomCreated {
                        request_id,
                        room: room.summary(),
                        qr,
                    },
                    Err(e) => failure(request_id, &e),
                };
                self.reply(conn, reply).await;
            }
            ClientMessage::JoinRoom {
                request_id,
                room_id,
                mic_name,
            } => {
                let reply = match self
                    .lifecycle
                    .join_room(conn, &room_id, mic_name.as_deref())
                    .await
                {
                    Ok(joined) => ServerMessage::RoomJoined {
                        request_id,
                        room: joined.room,
                        mic: joined.mic.identity(),
                        host_id: joined.host,
                    },
                    Err(e) => failure(request_id, &e),
                };
                self.reply(conn, reply).await;
            }
            ClientMessage::CheckRoom {
                request_id,
                room_id,
            } => {
                let check = self.lifecycle.check_room(&room_id).await;
                self.reply(
                    conn,
                    ServerMessage::RoomCheck {
                        request_id,
                        exists: check.exists,
                        room_name: check.room_name,
                        mic_count: check.mic_count,
                        max_mics: check.max_mics,
                    },
                )
                .await;
            }
            ClientMessage::GetRoomInfo {
                request_id,
                room_id,
            } => {
                let reply = match self.lifecycle.room_info(&room_id).await {
                    Ok((room, mics)) => ServerMessage::RoomInfo {
                        request_id,
                        room,
                        mics,
                    },
                    Err(e) => failure(request_id, &e),
                };
                self.reply(conn, reply).await;
            }

            // -- lifecycle --
            ClientMessage::LeaveRoom { room_id } => {
                if !self.lifecycle.leave_room(conn, &room_id).await {
                    debug!(conn = %conn, room = %room_id, "Ignored leave-room");
                }
            }
            ClientMessage::KickMic { room_id, mic_id } => {
                log_ignored(conn, "kick-mic", self.sync.kick(conn, &room_id, &mic_id).await);
            }

            // -- signaling --
            ClientMessage::WebrtcSignal { to, room_id, signal } => {
                if let Err(e) = self.relay.relay(conn, &to, room_id.as_ref(), signal).await {
                    debug!(conn = %conn, to = %to, error = %e, "Dropped signal");
                }
            }
            ClientMessage::WebrtcReady { room_id, peer_id } => {
                log_ignored(conn, "webrtc-ready", self.relay.ready(conn, &room_id, peer_id).await);
            }
            ClientMessage::InitiateWebrtc { room_id, mic_id } => {
                log_ignored(
                    conn,
                    "initiate-webrtc",
                    self.relay.initiate(conn, &room_id, &mic_id).await,
                );
            }
            ClientMessage::WebrtcState { room_id, state } => {
                log_ignored(
                    conn,
                    "webrtc-state",
                    self.relay.report_state(conn, &room_id, state).await,
                );
            }

            // -- host controls --
            ClientMessage::HostSetMicVolume {
                room_id,
                mic_id,
                volume,
            } => {
                log_ignored(
                    conn,
                    "host-set-mic-volume",
                    self.sync.set_mic_volume(conn, &room_id, &mic_id, volume).await,
                );
            }
            ClientMessage::HostMuteMic {
                room_id,
                mic_id,
                muted,
            } => {
                log_ignored(
                    conn,
                    "host-mute-mic",
                    self.sync.mute_mic(conn, &room_id, &mic_id, muted).await,
                );
            }
            ClientMessage::SoloMic {
                room_id,
                mic_id,
                solo,
            } => {
                log_ignored(
                    conn,
                    "solo-mic",
                    self.sync.solo_mic(conn, &room_id, &mic_id, solo).await,
                );
            }
            ClientMessage::MasterVolumeChange { room_id, volume } => {
                log_ignored(
                    conn,
                    "master-volume-change",
                    self.sync.set_master_volume(conn, &room_id, volume).await,
                );
            }
            ClientMessage::GlobalEffectsChange { room_id, effects } => {
                log_ignored(
                    conn,
                    "global-effects-change",
                    self.sync.set_global_effects(conn, &room_id, effects).await,
                );
            }
            ClientMessage::MicEffectsChange {
                room_id,
                mic_id,
                effects,
            } => {
                log_ignored(
                    conn,
                    "mic-effects-change",
                    self.sync.set_mic_effects(conn, &room_id, &mic_id, effects).await,
                );
            }
            ClientMessage::DuckingSignal { room_id, ducking } => {
                log_ignored(
                    conn,
                    "ducking-signal",
                    self.sync.ducking(conn, &room_id, ducking).await,
                );
            }

            // -- mic reports --
            ClientMessage::MicVolumeChange { room_id, volume } => {
                log_ignored(
                    conn,
                    "mic-volume-change",
                    self.sync.local_volume(conn, &room_id, volume).await,
                );
            }
            ClientMessage::MicMuteToggle { room_id, muted } => {
                log_ignored(
                    conn,
                    "mic-mute-toggle",
                    self.sync.local_mute(conn, &room_id, muted).await,
                );
            }
            ClientMessage::MicEffectsPreference { room_id, effects } => {
                log_ignored(
                    conn,
                    "mic-effects-preference",
                    self.sync.local_effects(conn, &room_id, effects).await,
                );
            }
            ClientMessage::AudioLevel { room_id, level } => {
                log_ignored(
                    conn,
                    "audio-level",
                    self.sync.audio_level(conn, &room_id, level).await,
                );
            }
            ClientMessage::LatencyReport { room_id, latency } => {
                log_ignored(
                    conn,
                    "latency-report",
                    self.sync.latency(conn, &room_id, latency).await,
                );
            }
        }
    }

    /// The connection closed.
    pub async fn disconnect(&self, conn: &ConnId) {
        self.lifecycle.disconnect(conn).await;
        self.peers.unregister(conn).await;
    }

    async fn reply(&self, conn: &ConnId, msg: ServerMessage) {
        if let Err(e) = self.peers.send(conn, msg).await {
            debug!(conn = %conn, error = %e, "Reply not delivered");
        }
    }
}

fn failure(request_id: Option<u64>, err: &SessionError) -> ServerMessage {
    ServerMessage::RequestFailed {
        request_id,
        code: err.code(),
        message: err.to_string(),
    }
}

fn log_ignored<T, E: std::fmt::Display>(conn: &ConnId, what: &str, result: Result<T, E>) {
    if let Err(e) = result {
        debug!(conn = %conn, op = what, error = %e, "Ignored");
    }
}
