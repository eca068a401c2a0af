//! Signaling Relay: forwards media negotiation between a host and its mics.
//!
//! Payloads are opaque strings. The relay checks that sender and recipient
//! share a room, tags the payload with the sender's id and queues it for the
//! recipient untouched.

use airmic_common::protocol::PeerConnectionState;
use airmic_common::{ConnId, ControlError, RelayError, RoomCode, ServerMessage};
use tracing::debug;

use crate::peers::PeerDirectory;
use crate::store::RoomStore;

#[derive(Clone)]
pub struct SignalingRelay {
    store: RoomStore,
    peers: PeerDirectory,
}

impl SignalingRelay {
    pub fn new(store: RoomStore, peers: PeerDirectory) -> Self {
        Self { store, peers }
    }

    /// Forward `signal` from `sender` to `recipient`.
    ///
    /// `room` is the room the sender claims to be in; when given it must
    /// match the sender's actual room.
    pub async fn relay(
        &self,
        sender: &ConnId,
        recipient: &ConnId,
        room: Option<&RoomCode>,
        signal: String,
    ) -> Result<(), RelayError> {
        let from = self
            .store
            .find_by_conn(sender)
            .await
            .ok_or_else(|| RelayError::SenderUnresolved(sender.to_string()))?;
        let to = self
            .store
            .find_by_conn(recipient)
            .await
            .ok_or_else(|| RelayError::RecipientUnresolved(recipient.to_string()))?;

        if from.room != to.room || room.is_some_and(|claimed| claimed != &from.room) {
            return Err(RelayError::DifferentRooms);
        }

        self.peers
            .send(
                recipient,
                ServerMessage::WebrtcSignal {
                    from: sender.clone(),
                    signal,
                },
            )
            .await?;
        debug!(room = %from.room, from = %sender, to = %recipient, "Relayed signal");
        Ok(())
    }

    /// A mic announces it is ready to negotiate; tell the host.
    pub async fn ready(
        &self,
        mic: &ConnId,
        room: &RoomCode,
        peer_id: String,
    ) -> Result<(), ControlError> {
        let host = self
            .store
            .with_own_mic(room, mic, |host, _| host.clone())
            .await?;
        let _ = self
            .peers
            .send(
                &host,
                ServerMessage::MicWebrtcReady {
                    mic_id: mic.clone(),
                    peer_id,
                },
            )
            .await;
        debug!(room = %room, mic = %mic, "Mic ready for WebRTC");
        Ok(())
    }

    /// Host asks a mic to start negotiating. Host-only.
    pub async fn initiate(
        &self,
        host: &ConnId,
        room: &RoomCode,
        mic: &ConnId,
    ) -> Result<(), ControlError> {
        self.store
            .with_hosted_room(room, host, |r| {
                let record = r.mics.get_mut(mic).ok_or_else(|| ControlError::UnknownMic {
                    room_id: room.to_string(),
                    mic_id: mic.to_string(),
                })?;
                record.status = record.status.on_negotiation_started();
                Ok(())
            })
            .await?;

        let _ = self
            .peers
            .send(mic, ServerMessage::StartWebrtc { host_id: host.clone() })
            .await;
        debug!(room = %room, mic = %mic, "Host requested WebRTC");
        Ok(())
    }

    /// A mic reports its media connection state; record it and tell the host.
    pub async fn report_state(
        &self,
        mic: &ConnId,
        room: &RoomCode,
        state: PeerConnectionState,
    ) -> Result<(), ControlError> {
        let host = self
            .store
            .with_own_mic(room, mic, |host, record| {
                record.status = record.status.on_peer_state(state);
                host.clone()
            })
            .await?;
        let _ = self
            .peers
            .send(
                &host,
                ServerMessage::MicWebrtcState {
                    mic_id: mic.clone(),
                    state,
                },
            )
            .await;
        debug!(room = %room, mic = %mic, state = ?state, "WebRTC state");
        Ok(())
    }
}
