//! Control-State Synchronizer.
//!
//! Host writes land in a mic's `host` block and are pushed to that mic as
//! overrides; mic writes land in its own `local` block and are pushed to the
//! host as status. Writes from anyone else are rejected before they touch
//! the store.
//!
//! The synchronizer only stores the `solo` flag. What is audible when some
//! mics are soloed is decided by the host's mixer.

use airmic_common::protocol::{Effects, HostPatch, LeaveReason, LocalPatch};
use airmic_common::{ConnId, ControlError, RoomCode, ServerMessage};
use tracing::{debug, info};

use crate::peers::PeerDirectory;
use crate::store::{Mic, RoomSettingsPatch, RoomStore, SettingsPatch};

/// Reason string carried by the `kicked` event.
pub const KICK_REASON: &str = "Removed by host";

fn check_volume(volume: f32) -> Result<f32, ControlError> {
    if volume.is_finite() && (0.0..=1.0).contains(&volume) {
        Ok(volume)
    } else {
        Err(ControlError::InvalidValue { field: "volume" })
    }
}

fn check_effects(effects: Effects) -> Result<Effects, ControlError> {
    if effects.is_finite() {
        Ok(effects)
    } else {
        Err(ControlError::InvalidValue { field: "effects" })
    }
}

#[derive(Clone)]
pub struct ControlSync {
    store: RoomStore,
    peers: PeerDirectory,
}

impl ControlSync {
    pub fn new(store: RoomStore, peers: PeerDirectory) -> Self {
        Self { store, peers }
    }

    /// Apply a host patch to one mic, as the room's host.
    async fn host_write(
        &self,
        host: &ConnId,
        room: &RoomCode,
        mic: &ConnId,
        patch: HostPatch,
    ) -> Result<Mic, ControlError> {
        let (_, record) = self
            .store
            .update_mic_settings(room, host, mic, &SettingsPatch::Host(patch))
            .await?;
        Ok(record)
    }

    /// Apply a local patch to the acting mic. Returns the host to notify.
    async fn local_write(
        &self,
        mic: &ConnId,
        room: &RoomCode,
        patch: LocalPatch,
    ) -> Result<ConnId, ControlError> {
        let (host, _) = self
            .store
            .update_mic_settings(room, mic, mic, &SettingsPatch::Local(patch))
            .await?;
        Ok(host)
    }

    // -- host -> mic ------------------------------------------------------

    pub async fn set_mic_volume(
        &self,
        host: &ConnId,
        room: &RoomCode,
        mic: &ConnId,
        volume: f32,
    ) -> Result<(), ControlError> {
        let volume = check_volume(volume)?;
        let patch = HostPatch {
            volume: Some(volume),
            ..Default::default()
        };
        self.host_write(host, room, mic, patch).await?;
        let _ = self
            .peers
            .send(mic, ServerMessage::HostVolumeOverride { volume })
            .await;
        Ok(())
    }

    /// Mute override. The mic gets the override; the whole room gets a
    /// `mic-muted-by-host` notice for its UI.
    pub async fn mute_mic(
        &self,
        host: &ConnId,
        room: &RoomCode,
        mic: &ConnId,
        muted: bool,
    ) -> Result<(), ControlError> {
        let patch = HostPatch {
            muted: Some(muted),
            ..Default::default()
        };
        self.host_write(host, room, mic, patch).await?;
        let _ = self
            .peers
            .send(mic, ServerMessage::HostMuteOverride { muted })
            .await;

        if let Some(r) = self.store.get_room(room).await {
            self.peers
                .broadcast(
                    &r.member_ids(),
                    &ServerMessage::MicMutedByHost {
                        mic_id: mic.clone(),
                        muted,
                    },
                )
                .await;
        }
        Ok(())
    }

    pub async fn solo_mic(
        &self,
        host: &ConnId,
        room: &RoomCode,
        mic: &ConnId,
        solo: bool,
    ) -> Result<(), ControlError> {
        let patch = HostPatch {
            solo: Some(solo),
            ..Default::default()
        };
        self.host_write(host, room, mic, patch).await?;
        let _ = self
            .peers
            .send(mic, ServerMessage::HostSoloOverride { solo })
            .await;
        let _ = self
            .peers
            .send(
                host,
                ServerMessage::MicSoloState {
                    mic_id: mic.clone(),
                    solo,
                },
            )
            .await;
        Ok(())
    }

    pub async fn set_mic_effects(
        &self,
        host: &ConnId,
        room: &RoomCode,
        mic: &ConnId,
        effects: Effects,
    ) -> Result<(), ControlError> {
        let effects = check_effects(effects)?;
        let patch = HostPatch {
            effects: Some(effects),
            ..Default::default()
        };
        self.host_write(host, room, mic, patch).await?;
        let _ = self
            .peers
            .send(mic, ServerMessage::EffectsUpdate { effects })
            .await;
        Ok(())
    }

    /// Update room-wide settings and push the change to every mic.
    async fn room_write(
        &self,
        host: &ConnId,
        room: &RoomCode,
        patch: RoomSettingsPatch,
        notice: ServerMessage,
    ) -> Result<(), ControlError> {
        let (_, mics) = self.store.update_room_settings(room, host, &patch).await?;
        self.peers.broadcast(&mics, &notice).await;
        Ok(())
    }

    pub async fn set_master_volume(
        &self,
        host: &ConnId,
        room: &RoomCode,
        volume: f32,
    ) -> Result<(), ControlError> {
        let volume = check_volume(volume)?;
        let patch = RoomSettingsPatch {
            master_volume: Some(volume),
            ..Default::default()
        };
        self.room_write(host, room, patch, ServerMessage::MasterVolumeUpdate { volume })
            .await
    }

    pub async fn set_global_effects(
        &self,
        host: &ConnId,
        room: &RoomCode,
        effects: Effects,
    ) -> Result<(), ControlError> {
        let effects = check_effects(effects)?;
        let patch = RoomSettingsPatch {
            global_effects: Some(effects),
            ..Default::default()
        };
        self.room_write(host, room, patch, ServerMessage::GlobalEffectsUpdate { effects })
            .await
    }

    /// Fan a ducking edge out to every mic. Nothing is stored; the next edge
    /// corrects any mic that missed this one.
    pub async fn ducking(
        &self,
        host: &ConnId,
        room: &RoomCode,
        active: bool,
    ) -> Result<usize, ControlError> {
        let mics = self
            .store
            .with_hosted_room(room, host, |r| Ok(r.mic_ids()))
            .await?;
        let delivered = self
            .peers
            .broadcast(&mics, &ServerMessage::Ducking { active })
            .await;
        debug!(room = %room, active, delivered, "Ducking edge");
        Ok(delivered)
    }

    /// Remove a mic on the host's behalf.
    ///
    /// The mic is taken out of the room first, so it cannot also receive a
    /// `room-closed`; then it gets its `kicked` event and the remaining
    /// members are told it left.
    pub async fn kick(
        &self,
        host: &ConnId,
        room: &RoomCode,
        mic: &ConnId,
    ) -> Result<Mic, ControlError> {
        let (removed, members) = self
            .store
            .with_hosted_room(room, host, |r| {
                let removed = r.mics.remove(mic).ok_or_else(|| ControlError::UnknownMic {
                    room_id: room.to_string(),
                    mic_id: mic.to_string(),
                })?;
                Ok((removed, r.member_ids()))
            })
            .await?;

        let _ = self
            .peers
            .send(
                mic,
                ServerMessage::Kicked {
                    reason: KICK_REASON.to_string(),
                },
            )
            .await;
        self.peers
            .broadcast(
                &members,
                &ServerMessage::MicLeft {
                    mic_id: mic.clone(),
                    name: removed.name.clone(),
                    reason: LeaveReason::Kicked,
                },
            )
            .await;

        info!(room = %room, mic = %mic, name = %removed.name, "Mic kicked");
        Ok(removed)
    }

    // -- mic -> host ------------------------------------------------------

    pub async fn local_volume(
        &self,
        mic: &ConnId,
        room: &RoomCode,
        volume: f32,
    ) -> Result<(), ControlError> {
        let volume = check_volume(volume)?;
        let patch = LocalPatch {
            volume: Some(volume),
            ..Default::default()
        };
        let host = self.local_write(mic, room, patch).await?;
        let _ = self
            .peers
            .send(
                &host,
                ServerMessage::MicLocalVolume {
                    mic_id: mic.clone(),
                    volume,
                },
            )
            .await;
        Ok(())
    }

    pub async fn local_mute(
        &self,
        mic: &ConnId,
        room: &RoomCode,
        muted: bool,
    ) -> Result<(), ControlError> {
        let patch = LocalPatch {
            muted: Some(muted),
            ..Default::default()
        };
        let host = self.local_write(mic, room, patch).await?;
        let _ = self
            .peers
            .send(
                &host,
                ServerMessage::MicMuteState {
                    mic_id: mic.clone(),
                    muted,
                },
            )
            .await;
        Ok(())
    }

    pub async fn local_effects(
        &self,
        mic: &ConnId,
        room: &RoomCode,
        effects: Effects,
    ) -> Result<(), ControlError> {
        let effects = check_effects(effects)?;
        let patch = LocalPatch {
            effects: Some(effects),
            ..Default::default()
        };
        let host = self.local_write(mic, room, patch).await?;
        let _ = self
            .peers
            .send(
                &host,
                ServerMessage::MicEffectsPreference {
                    mic_id: mic.clone(),
                    effects,
                },
            )
            .await;
        Ok(())
    }

    /// Record a level report. The first report on a connected mic marks it
    /// as streaming.
    pub async fn audio_level(
        &self,
        mic: &ConnId,
        room: &RoomCode,
        level: f32,
    ) -> Result<(), ControlError> {
        if !level.is_finite() {
            return Err(ControlError::InvalidValue { field: "level" });
        }
        let host = self
            .store
            .with_own_mic(room, mic, |host, record| {
                record.stats.audio_level = level;
                record.status = record.status.on_audio();
                host.clone()
            })
            .await?;
        let _ = self
            .peers
            .send(
                &host,
                ServerMessage::MicAudioLevel {
                    mic_id: mic.clone(),
                    level,
                },
            )
            .await;
        Ok(())
    }

    pub async fn latency(
        &self,
        mic: &ConnId,
        room: &RoomCode,
        latency: f64,
    ) -> Result<(), ControlError> {
        if !latency.is_finite() || latency < 0.0 {
            return Err(ControlError::InvalidValue { field: "latency" });
        }
        let host = self
            .store
            .with_own_mic(room, mic, |host, record| {
                record.stats.latency = latency;
                host.clone()
            })
            .await?;
        let _ = self
            .peers
            .send(
                &host,
                ServerMessage::MicLatency {
                    mic_id: mic.clone(),
                    latency,
                },
            )
            .await;
        Ok(())
    }
}
