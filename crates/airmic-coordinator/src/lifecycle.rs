//! Session Lifecycle Manager: create, join, leave and disconnect.
//!
//! Room creation is create-or-fail: the code is reserved, the QR payload is
//! rendered, and only then is the room committed. If rendering fails the
//! reservation is dropped and nothing is left in the registry.

use airmic_common::protocol::{LeaveReason, MicSnapshot, QrPayload, Role, RoomSummary};
use airmic_common::{ConnId, RoomCode, ServerMessage, SessionError};
use tracing::{info, warn};

use crate::peers::PeerDirectory;
use crate::qr::QrService;
use crate::store::{JoinedMic, Room, RoomStore};

/// Reason carried by `room-closed` when the host's connection drops.
pub const HOST_DISCONNECTED: &str = "Host disconnected";
/// Reason carried by `room-closed` when the host leaves on purpose.
pub const HOST_LEFT: &str = "Host closed the room";

/// Answer to a `check-room` request.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomCheck {
    pub exists: bool,
    pub room_name: Option<String>,
    pub mic_count: Option<usize>,
    pub max_mics: Option<usize>,
}

#[derive(Clone)]
pub struct SessionLifecycle {
    store: RoomStore,
    peers: PeerDirectory,
    qr: QrService,
}

impl SessionLifecycle {
    pub fn new(store: RoomStore, peers: PeerDirectory, qr: QrService) -> Self {
        Self { store, peers, qr }
    }

    /// Create a room hosted by `host`.
    pub async fn create_room(
        &self,
        host: &ConnId,
        name: Option<&str>,
    ) -> Result<(Room, QrPayload), SessionError> {
        if let Some(existing) = self.store.find_by_conn(host).await {
            return Err(SessionError::AlreadyInRoom(existing.room.to_string()));
        }

        let reservation = self.store.reserve_code().await?;
        let qr = match self.qr.payload(reservation.code()).await {
            Ok(qr) => qr,
            Err(e) => {
                warn!(conn = %host, room = %reservation.code(), error = %e, "Room creation failed");
                self.store.release_code(reservation).await;
                return Err(e);
            }
        };

        let room = self.store.commit_room(reservation, host, name).await?;
        info!(room = %room.code, host = %host, name = %room.name, "Room created");
        Ok((room, qr))
    }

    /// Add `conn` to a room as a mic and tell the host.
    pub async fn join_room(
        &self,
        conn: &ConnId,
        code: &RoomCode,
        name: Option<&str>,
    ) -> Result<JoinedMic, SessionError> {
        let joined = self.store.add_mic(code, conn, name).await?;

        let _ = self
            .peers
            .send(
                &joined.host,
                ServerMessage::MicJoined {
                    mic_id: conn.clone(),
                    peer_id: joined.mic.peer_id.clone(),
                    name: joined.mic.name.clone(),
                    settings: joined.mic.local.clone(),
                },
            )
            .await;

        info!(room = %code, mic = %conn, name = %joined.mic.name, "Mic joined");
        Ok(joined)
    }

    /// Existence and occupancy, without side effects.
    pub async fn check_room(&self, code: &RoomCode) -> RoomCheck {
        match self.store.get_room(code).await {
            Some(room) => RoomCheck {
                exists: true,
                room_name: Some(room.name.clone()),
                mic_count: Some(room.mic_count()),
                max_mics: Some(room.settings.max_mics),
            },
            None => RoomCheck {
                exists: false,
                room_name: None,
                mic_count: None,
                max_mics: None,
            },
        }
    }

    pub async fn room_info(
        &self,
        code: &RoomCode,
    ) -> Result<(RoomSummary, Vec<MicSnapshot>), SessionError> {
        let room = self
            .store
            .get_room(code)
            .await
            .ok_or_else(|| SessionError::RoomNotFound(code.to_string()))?;
        let mics = room.mics_by_join().into_iter().map(|m| m.snapshot()).collect();
        Ok((room.summary(), mics))
    }

    /// Delete a room and send `room-closed` to each mic that was in it.
    /// Returns how many mics were notified.
    pub async fn close_room(&self, code: &RoomCode, reason: &str) -> usize {
        let Some(room) = self.store.delete_room(code).await else {
            return 0;
        };
        let msg = ServerMessage::RoomClosed {
            reason: reason.to_string(),
        };
        let notified = self.peers.broadcast(room.mics.keys(), &msg).await;
        info!(room = %code, mics = room.mic_count(), notified, reason, "Room closed");
        notified
    }

    /// Explicit `leave-room`. A host leaving closes its room; a mic leaving
    /// is removed and the rest of the room is told.
    pub async fn leave_room(&self, conn: &ConnId, code: &RoomCode) -> bool {
        let Some(membership) = self.store.find_by_conn(conn).await else {
            return false;
        };
        if &membership.room != code {
            return false;
        }

        match membership.role {
            Role::Host => {
                self.close_room(code, HOST_LEFT).await;
            }
            Role::Mic => {
                let Some(mic) = self.store.remove_mic(code, conn).await else {
                    return false;
                };
                if let Some(room) = self.store.get_room(code).await {
                    self.peers
                        .broadcast(
                            &room.member_ids(),
                            &ServerMessage::MicLeft {
                                mic_id: conn.clone(),
                                name: mic.name.clone(),
                                reason: LeaveReason::Left,
                            },
                        )
                        .await;
                }
                info!(room = %code, mic = %conn, name = %mic.name, "Mic left");
            }
        }
        true
    }

    /// The connection is gone. Tear down whatever it was part of.
    pub async fn disconnect(&self, conn: &ConnId) {
        let Some(membership) = self.store.find_by_conn(conn).await else {
            return;
        };

        match membership.role {
            Role::Host => {
                info!(room = %membership.room, host = %conn, "Host disconnected, closing room");
                self.close_room(&membership.room, HOST_DISCONNECTED).await;
            }
            Role::Mic => {
                let Some(mic) = self.store.remove_mic(&membership.room, conn).await else {
                    return;
                };
                let _ = self
                    .peers
                    .send(
                        &membership.host,
                        ServerMessage::MicDisconnected {
                            mic_id: conn.clone(),
                            name: mic.name.clone(),
                        },
                    )
                    .await;
                info!(room = %membership.room, mic = %conn, name = %mic.name, "Mic disconnected");
            }
        }
    }
}
