//! In-memory room registry.
//!
//! One `RwLock` guards every room; each public method takes the lock once,
//! so readers never observe a half-applied mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use airmic_common::protocol::{
    Effects, HostSettings, LocalSettings, MicStats, MicStatus, Role, RoomSettings,
};
use airmic_common::{new_id, ConnId, ControlError, RoomCode, SessionError};
use airmic_config::AirmicConfig;
use chrono::Utc;
use tokio::sync::RwLock;

use super::types::{
    JoinedMic, Membership, Mic, Room, RoomSettingsPatch, RoomStat, SettingsPatch, StoreStats,
};

/// Limits and defaults the registry applies to new rooms and mics.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub code_length: usize,
    pub max_code_attempts: u32,
    /// Rooms created without a name are called `"{default_name} {code}"`.
    pub default_name: String,
    pub room_settings: RoomSettings,
    pub mic_volume: f32,
    pub mic_effects: Effects,
}

impl StoreConfig {
    pub fn from_config(config: &AirmicConfig) -> Self {
        let room_settings = config.initial_room_settings();
        Self {
            code_length: config.room.code_length as usize,
            max_code_attempts: config.room.max_code_attempts,
            default_name: config.room.default_name.clone(),
            mic_volume: config.audio.default_volume,
            mic_effects: room_settings.global_effects,
            room_settings,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_config(&AirmicConfig::default())
    }
}

/// A room code held back from other creators while the room is being set up.
///
/// Reserved codes are not rooms: lookups, joins and stats do not see them.
/// Pass the reservation to [`RoomStore::commit_room`] or
/// [`RoomStore::release_code`].
#[derive(Debug)]
pub struct CodeReservation {
    code: RoomCode,
}

impl CodeReservation {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }
}

#[derive(Default)]
struct Registry {
    rooms: HashMap<RoomCode, Room>,
    reserved: HashSet<RoomCode>,
}

impl Registry {
    fn membership(&self, conn: &ConnId) -> Option<Membership> {
        self.rooms.values().find_map(|room| {
            if &room.host == conn {
                Some(Membership {
                    room: room.code.clone(),
                    host: room.host.clone(),
                    role: Role::Host,
                    mic: None,
                })
            } else {
                room.mics.get(conn).map(|mic| Membership {
                    room: room.code.clone(),
                    host: room.host.clone(),
                    role: Role::Mic,
                    mic: Some(mic.clone()),
                })
            }
        })
    }

    fn code_in_use(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code) || self.reserved.contains(code)
    }

    fn allocate_code(&self, len: usize, max_attempts: u32) -> Result<RoomCode, SessionError> {
        let mut rng = rand::thread_rng();
        for _ in 0..max_attempts {
            let code = RoomCode::generate(len, &mut rng);
            if !self.code_in_use(&code) {
                return Ok(code);
            }
        }
        Err(SessionError::RoomCodeExhausted(max_attempts))
    }
}

/// Shared handle to the room registry.
#[derive(Clone)]
pub struct RoomStore {
    inner: Arc<RwLock<Registry>>,
    config: Arc<StoreConfig>,
}

impl RoomStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Registry::default())),
            config: Arc::new(config),
        }
    }

    // -- creation ---------------------------------------------------------

    /// Pick a code no live or pending room uses, and hold it.
    pub async fn reserve_code(&self) -> Result<CodeReservation, SessionError> {
        let mut registry = self.inner.write().await;
        let code =
            registry.allocate_code(self.config.code_length, self.config.max_code_attempts)?;
        registry.reserved.insert(code.clone());
        Ok(CodeReservation { code })
    }

    /// Give a reserved code back without creating a room.
    pub async fn release_code(&self, reservation: CodeReservation) {
        self.inner.write().await.reserved.remove(&reservation.code);
    }

    /// Turn a reservation into a live room hosted by `host`.
    ///
    /// Fails with `AlreadyInRoom` if `host` joined or created another room
    /// since the reservation was taken; the code is released either way.
    pub async fn commit_room(
        &self,
        reservation: CodeReservation,
        host: &ConnId,
        name: Option<&str>,
    ) -> Result<Room, SessionError> {
        let mut registry = self.inner.write().await;
        let code = reservation.code;
        registry.reserved.remove(&code);

        if let Some(existing) = registry.membership(host) {
            return Err(SessionError::AlreadyInRoom(existing.room.to_string()));
        }

        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} {}", self.config.default_name, code),
        };

        let room = Room {
            code: code.clone(),
            name,
            host: host.clone(),
            created_at: Utc::now(),
            settings: self.config.room_settings.clone(),
            mics: HashMap::new(),
        };
        registry.rooms.insert(code, room.clone());
        Ok(room)
    }

    /// Create a room in one step.
    pub async fn create_room(
        &self,
        host: &ConnId,
        name: Option<&str>,
    ) -> Result<Room, SessionError> {
        let reservation = self.reserve_code().await?;
        self.commit_room(reservation, host, name).await
    }

    // -- membership -------------------------------------------------------

    /// Add `conn` to room `code` as a mic.
    pub async fn add_mic(
        &self,
        code: &RoomCode,
        conn: &ConnId,
        name: Option<&str>,
    ) -> Result<JoinedMic, SessionError> {
        let mut registry = self.inner.write().await;

        if let Some(existing) = registry.membership(conn) {
            return Err(SessionError::AlreadyInRoom(existing.room.to_string()));
        }

        let room = registry
            .rooms
            .get_mut(code)
            .ok_or_else(|| SessionError::RoomNotFound(code.to_string()))?;

        if room.is_full() {
            return Err(SessionError::RoomFull {
                room_id: code.to_string(),
                max_mics: room.settings.max_mics,
            });
        }

        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Mic {}", room.mics.len() + 1),
        };

        let mic = Mic {
            conn_id: conn.clone(),
            peer_id: new_id(),
            name,
            joined_at: Utc::now(),
            status: MicStatus::Connecting,
            local: LocalSettings::new(self.config.mic_volume, self.config.mic_effects),
            host: HostSettings::new(self.config.mic_volume, self.config.mic_effects),
            stats: MicStats::default(),
        };
        room.mics.insert(conn.clone(), mic.clone());

        Ok(JoinedMic {
            room: room.summary(),
            host: room.host.clone(),
            mic,
        })
    }

    /// Remove a mic. Returns the removed record, or `None` if it was not
    /// there. Calling it twice is harmless.
    pub async fn remove_mic(&self, code: &RoomCode, conn: &ConnId) -> Option<Mic> {
        let mut registry = self.inner.write().await;
        registry.rooms.get_mut(code)?.mics.remove(conn)
    }

    /// Remove a room and hand back its final state.
    pub async fn delete_room(&self, code: &RoomCode) -> Option<Room> {
        self.inner.write().await.rooms.remove(code)
    }

    // -- writes -----------------------------------------------------------

    /// Merge `patch` into `target`'s settings on behalf of `actor`.
    ///
    /// The patch variant picks both the block and who may write it: a host
    /// patch needs `actor` to host the room, a local patch needs `actor` to
    /// be `target`. The other block is never touched. Returns the room's
    /// host and the updated record.
    pub async fn update_mic_settings(
        &self,
        code: &RoomCode,
        actor: &ConnId,
        target: &ConnId,
        patch: &SettingsPatch,
    ) -> Result<(ConnId, Mic), ControlError> {
        let mut registry = self.inner.write().await;
        let room = registry
            .rooms
            .get_mut(code)
            .ok_or_else(|| ControlError::UnknownRoom(code.to_string()))?;

        let allowed = match patch {
            SettingsPatch::Host(_) => &room.host == actor,
            SettingsPatch::Local(_) => actor == target,
        };
        if !allowed {
            return Err(ControlError::Unauthorized(actor.to_string()));
        }

        let mic = room.mics.get_mut(target).ok_or_else(|| match patch {
            SettingsPatch::Host(_) => ControlError::UnknownMic {
                room_id: code.to_string(),
                mic_id: target.to_string(),
            },
            // The host has no mic record of its own to write.
            SettingsPatch::Local(_) => ControlError::Unauthorized(actor.to_string()),
        })?;
        patch.apply_to(mic);
        Ok((room.host.clone(), mic.clone()))
    }

    /// Merge `patch` into the room settings, as the room's host. Returns the
    /// new settings and the mics to tell about them.
    pub async fn update_room_settings(
        &self,
        code: &RoomCode,
        actor: &ConnId,
        patch: &RoomSettingsPatch,
    ) -> Result<(RoomSettings, Vec<ConnId>), ControlError> {
        let mut registry = self.inner.write().await;
        let room = registry
            .rooms
            .get_mut(code)
            .ok_or_else(|| ControlError::UnknownRoom(code.to_string()))?;
        if &room.host != actor {
            return Err(ControlError::Unauthorized(actor.to_string()));
        }
        patch.apply_to(&mut room.settings);
        Ok((room.settings.clone(), room.mic_ids()))
    }

    /// Run `f` against room `code` if `actor` is its host.
    pub async fn with_hosted_room<T>(
        &self,
        code: &RoomCode,
        actor: &ConnId,
        f: impl FnOnce(&mut Room) -> Result<T, ControlError>,
    ) -> Result<T, ControlError> {
        let mut registry = self.inner.write().await;
        let room = registry
            .rooms
            .get_mut(code)
            .ok_or_else(|| ControlError::UnknownRoom(code.to_string()))?;
        if &room.host != actor {
            return Err(ControlError::Unauthorized(actor.to_string()));
        }
        f(room)
    }

    /// Run `f` against `actor`'s own mic record in room `code`. The closure
    /// also gets the room's host id.
    pub async fn with_own_mic<T>(
        &self,
        code: &RoomCode,
        actor: &ConnId,
        f: impl FnOnce(&ConnId, &mut Mic) -> T,
    ) -> Result<T, ControlError> {
        let mut registry = self.inner.write().await;
        let room = registry
            .rooms
            .get_mut(code)
            .ok_or_else(|| ControlError::UnknownRoom(code.to_string()))?;
        let host = &room.host;
        let mic = room
            .mics
            .get_mut(actor)
            .ok_or_else(|| ControlError::Unauthorized(actor.to_string()))?;
        Ok(f(host, mic))
    }

    // -- reads ------------------------------------------------------------

    /// Which room `conn` belongs to and in what role. Linear in the number
    /// of rooms.
    pub async fn find_by_conn(&self, conn: &ConnId) -> Option<Membership> {
        self.inner.read().await.membership(conn)
    }

    pub async fn get_room(&self, code: &RoomCode) -> Option<Room> {
        self.inner.read().await.rooms.get(code).cloned()
    }

    pub async fn room_exists(&self, code: &RoomCode) -> bool {
        self.inner.read().await.rooms.contains_key(code)
    }

    pub async fn get_mic(&self, code: &RoomCode, conn: &ConnId) -> Option<Mic> {
        let registry = self.inner.read().await;
        registry.rooms.get(code)?.mics.get(conn).cloned()
    }

    /// Every mic in the room, in join order. Empty if the room is gone.
    pub async fn get_all_mics(&self, code: &RoomCode) -> Vec<Mic> {
        let registry = self.inner.read().await;
        registry
            .rooms
            .get(code)
            .map(|room| room.mics_by_join().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    pub async fn stats(&self) -> StoreStats {
        let registry = self.inner.read().await;
        let mut rooms: Vec<RoomStat> = registry
            .rooms
            .values()
            .map(|room| RoomStat {
                room_id: room.code.clone(),
                room_name: room.name.clone(),
                mic_count: room.mic_count(),
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        StoreStats {
            total_rooms: registry.rooms.len(),
            rooms,
        }
    }
}
