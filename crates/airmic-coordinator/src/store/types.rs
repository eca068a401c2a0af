//! Room and mic records held by the registry.

use std::collections::HashMap;

use airmic_common::protocol::{
    Effects, HostPatch, HostSettings, LocalPatch, LocalSettings, MicIdentity, MicSnapshot,
    MicStats, MicStatus, Role, RoomSettings, RoomSummary,
};
use airmic_common::{ConnId, RoomCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A live room: one host, up to `settings.max_mics` mics.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: RoomCode,
    pub name: String,
    /// Connection that created the room. Never changes.
    pub host: ConnId,
    pub created_at: DateTime<Utc>,
    pub settings: RoomSettings,
    pub mics: HashMap<ConnId, Mic>,
}

impl Room {
    pub fn mic_count(&self) -> usize {
        self.mics.len()
    }

    pub fn is_full(&self) -> bool {
        self.mics.len() >= self.settings.max_mics
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.code.clone(),
            room_name: self.name.clone(),
            settings: Some(self.settings.clone()),
        }
    }

    /// Mics in join order.
    pub fn mics_by_join(&self) -> Vec<&Mic> {
        let mut mics: Vec<&Mic> = self.mics.values().collect();
        mics.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.conn_id.cmp(&b.conn_id))
        });
        mics
    }

    pub fn mic_ids(&self) -> Vec<ConnId> {
        self.mics.keys().cloned().collect()
    }

    /// Host plus every mic.
    pub fn member_ids(&self) -> Vec<ConnId> {
        let mut ids = Vec::with_capacity(self.mics.len() + 1);
        ids.push(self.host.clone());
        ids.extend(self.mics.keys().cloned());
        ids
    }
}

/// One microphone endpoint inside a room.
#[derive(Debug, Clone)]
pub struct Mic {
    /// Control connection that owns this mic.
    pub conn_id: ConnId,
    /// Media-transport correlation id, opaque to the coordinator.
    pub peer_id: String,
    pub name: String,
    pub joined_at: DateTime<Utc>,
    pub status: MicStatus,
    /// Written only by the mic itself.
    pub local: LocalSettings,
    /// Written only by the room's host.
    pub host: HostSettings,
    pub stats: MicStats,
}

impl Mic {
    pub fn identity(&self) -> MicIdentity {
        MicIdentity {
            mic_id: self.conn_id.clone(),
            peer_id: self.peer_id.clone(),
            name: self.name.clone(),
        }
    }

    pub fn snapshot(&self) -> MicSnapshot {
        MicSnapshot {
            mic_id: self.conn_id.clone(),
            name: self.name.clone(),
            status: self.status,
            host_settings: self.host.clone(),
        }
    }
}

/// A settings write, tagged with the block it is allowed to touch.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsPatch {
    Host(HostPatch),
    Local(LocalPatch),
}

impl SettingsPatch {
    pub(super) fn apply_to(&self, mic: &mut Mic) {
        match self {
            SettingsPatch::Host(patch) => mic.host.apply(patch),
            SettingsPatch::Local(patch) => mic.local.apply(patch),
        }
    }
}

/// Partial update to [`RoomSettings`]. `max_mics` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomSettingsPatch {
    pub master_volume: Option<f32>,
    pub global_effects: Option<Effects>,
}

impl RoomSettingsPatch {
    pub(super) fn apply_to(&self, settings: &mut RoomSettings) {
        if let Some(volume) = self.master_volume {
            settings.master_volume = volume;
        }
        if let Some(effects) = self.global_effects {
            settings.global_effects = effects;
        }
    }
}

/// Result of resolving a connection to the room it belongs to.
#[derive(Debug, Clone)]
pub struct Membership {
    pub room: RoomCode,
    pub host: ConnId,
    pub role: Role,
    /// Present when `role` is [`Role::Mic`].
    pub mic: Option<Mic>,
}

/// Outcome of a successful join.
#[derive(Debug, Clone)]
pub struct JoinedMic {
    pub room: RoomSummary,
    pub host: ConnId,
    pub mic: Mic,
}

/// Occupancy snapshot of one room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStat {
    pub room_id: RoomCode,
    pub room_name: String,
    pub mic_count: usize,
}

/// Registry-wide occupancy snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_rooms: usize,
    pub rooms: Vec<RoomStat>,
}
