//! Tests for the room registry.

use std::collections::HashSet;

use airmic_common::protocol::{Effects, HostPatch, LocalPatch, MicStatus, Role};
use airmic_common::{ConnId, ControlError, RoomCode, SessionError};

use super::*;

fn store() -> RoomStore {
    RoomStore::new(StoreConfig::default())
}

fn store_with_max_mics(max_mics: usize) -> RoomStore {
    let mut config = StoreConfig::default();
    config.room_settings.max_mics = max_mics;
    RoomStore::new(config)
}

#[tokio::test]
async fn created_codes_are_unique_and_well_formed() {
    let store = store();
    let mut seen = HashSet::new();
    for i in 0..200 {
        let host = ConnId::from(format!("host-{i}"));
        let room = store.create_room(&host, None).await.unwrap();
        assert!(room.code.is_well_formed(6), "bad code {}", room.code);
        assert!(seen.insert(room.code.clone()), "duplicate {}", room.code);
    }
    assert_eq!(store.room_count().await, 200);
}

#[tokio::test]
async fn default_room_name_uses_code() {
    let store = store();
    let room = store.create_room(&ConnId::from("h"), None).await.unwrap();
    assert_eq!(room.name, format!("Room {}", room.code));

    let named = store
        .create_room(&ConnId::from("h2"), Some("  Choir  "))
        .await
        .unwrap();
    assert_eq!(named.name, "Choir");
}

#[tokio::test]
async fn code_space_exhaustion_is_an_error() {
    let mut config = StoreConfig::default();
    config.code_length = 1;
    config.max_code_attempts = 8;
    let store = RoomStore::new(config);

    let mut failures = 0;
    for i in 0..40 {
        match store.create_room(&ConnId::from(format!("h{i}")), None).await {
            Ok(_) => {}
            Err(SessionError::RoomCodeExhausted(8)) => failures += 1,
            Err(other) => panic!("unexpected {other}"),
        }
    }
    // 32 single-character codes exist, so at least 8 attempts must fail.
    assert!(failures >= 8);
    assert!(store.room_count().await <= 32);
}

#[tokio::test]
async fn reserved_code_is_invisible_until_committed() {
    let store = store();
    let reservation = store.reserve_code().await.unwrap();
    let code = reservation.code().clone();
    assert!(!store.room_exists(&code).await);
    assert_eq!(store.stats().await.total_rooms, 0);

    let room = store
        .commit_room(reservation, &ConnId::from("h"), None)
        .await
        .unwrap();
    assert_eq!(room.code, code);
    assert!(store.room_exists(&code).await);
}

#[tokio::test]
async fn released_code_leaves_no_trace() {
    let store = store();
    let reservation = store.reserve_code().await.unwrap();
    store.release_code(reservation).await;
    assert_eq!(store.room_count().await, 0);
    assert!(store.find_by_conn(&ConnId::from("h")).await.is_none());
}

#[tokio::test]
async fn host_cannot_own_two_rooms() {
    let store = store();
    let host = ConnId::from("h");
    store.create_room(&host, None).await.unwrap();
    let err = store.create_room(&host, None).await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyInRoom(_)));
    assert_eq!(store.room_count().await, 1);
}

#[tokio::test]
async fn join_fills_up_to_max_then_fails() {
    let store = store_with_max_mics(3);
    let room = store.create_room(&ConnId::from("h"), None).await.unwrap();

    for i in 0..2 {
        store
            .add_mic(&room.code, &ConnId::from(format!("m{i}")), None)
            .await
            .unwrap();
    }
    // maxMics - 1 mics present: one more fits.
    let joined = store
        .add_mic(&room.code, &ConnId::from("m2"), None)
        .await
        .unwrap();
    assert_eq!(joined.mic.name, "Mic 3");
    assert_eq!(store.get_all_mics(&room.code).await.len(), 3);

    // At maxMics: rejected.
    let err = store
        .add_mic(&room.code, &ConnId::from("m3"), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SessionError::RoomFull {
            room_id: room.code.to_string(),
            max_mics: 3
        }
    );
    assert_eq!(store.get_all_mics(&room.code).await.len(), 3);
}

#[tokio::test]
async fn join_unknown_room_fails() {
    let store = store();
    let err = store
        .add_mic(&RoomCode::from("ZZZZZZ"), &ConnId::from("m"), None)
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::RoomNotFound("ZZZZZZ".into()));
}

#[tokio::test]
async fn join_is_case_insensitive() {
    let store = store();
    let room = store.create_room(&ConnId::from("h"), None).await.unwrap();
    let lower = RoomCode::from(room.code.as_str().to_lowercase());
    assert!(store
        .add_mic(&lower, &ConnId::from("m"), Some("Ana"))
        .await
        .is_ok());
}

#[tokio::test]
async fn new_mic_starts_connecting_with_defaults() {
    let store = store();
    let room = store.create_room(&ConnId::from("h"), None).await.unwrap();
    let joined = store
        .add_mic(&room.code, &ConnId::from("m"), Some("Ana"))
        .await
        .unwrap();
    assert_eq!(joined.host, ConnId::from("h"));
    assert_eq!(joined.mic.status, MicStatus::Connecting);
    assert_eq!(joined.mic.local.volume, 1.0);
    assert!(!joined.mic.host.solo);
    assert_eq!(joined.mic.stats.audio_level, -60.0);
    assert!(!joined.mic.peer_id.is_empty());
}

#[tokio::test]
async fn remove_mic_is_idempotent() {
    let store = store();
    let room = store.create_room(&ConnId::from("h"), None).await.unwrap();
    let mic = ConnId::from("m");
    store.add_mic(&room.code, &mic, None).await.unwrap();

    assert!(store.remove_mic(&room.code, &mic).await.is_some());
    assert!(store.remove_mic(&room.code, &mic).await.is_none());
    assert!(store.get_all_mics(&room.code).await.is_empty());
}

#[tokio::test]
async fn settings_blocks_are_independent() {
    let store = store();
    let host = ConnId::from("h");
    let room = store.create_room(&host, None).await.unwrap();
    let mic = ConnId::from("m");
    store.add_mic(&room.code, &mic, None).await.unwrap();

    store
        .update_mic_settings(
            &room.code,
            &host,
            &mic,
            &SettingsPatch::Host(HostPatch {
                muted: Some(true),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    let (owner, updated) = store
        .update_mic_settings(
            &room.code,
            &mic,
            &mic,
            &SettingsPatch::Local(LocalPatch {
                volume: Some(0.4),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    assert_eq!(owner, host);
    assert!(updated.host.muted);
    assert!(!updated.local.muted);
    assert_eq!(updated.local.volume, 0.4);
    assert_eq!(updated.host.volume, 1.0);
}

#[tokio::test]
async fn settings_writes_need_the_matching_authority() {
    let store = store();
    let host = ConnId::from("h");
    let room = store.create_room(&host, None).await.unwrap();
    let mic = ConnId::from("m");
    let other = ConnId::from("m2");
    store.add_mic(&room.code, &mic, None).await.unwrap();
    store.add_mic(&room.code, &other, None).await.unwrap();

    let host_patch = SettingsPatch::Host(HostPatch {
        volume: Some(0.1),
        ..Default::default()
    });
    let local_patch = SettingsPatch::Local(LocalPatch {
        volume: Some(0.2),
        ..Default::default()
    });

    // A mic cannot write host overrides, not even on itself.
    assert_eq!(
        store
            .update_mic_settings(&room.code, &mic, &mic, &host_patch)
            .await
            .unwrap_err(),
        ControlError::Unauthorized("m".into())
    );
    // The host cannot write a mic's own preferences.
    assert_eq!(
        store
            .update_mic_settings(&room.code, &host, &mic, &local_patch)
            .await
            .unwrap_err(),
        ControlError::Unauthorized("h".into())
    );
    // Nor can another mic.
    assert_eq!(
        store
            .update_mic_settings(&room.code, &other, &mic, &local_patch)
            .await
            .unwrap_err(),
        ControlError::Unauthorized("m2".into())
    );

    let untouched = store.get_mic(&room.code, &mic).await.unwrap();
    assert_eq!(untouched.host.volume, 1.0);
    assert_eq!(untouched.local.volume, 1.0);
}

#[tokio::test]
async fn update_for_missing_mic_or_room_fails() {
    let store = store();
    let host = ConnId::from("h");
    let room = store.create_room(&host, None).await.unwrap();
    let ghost = ConnId::from("ghost");

    assert_eq!(
        store
            .update_mic_settings(
                &room.code,
                &host,
                &ghost,
                &SettingsPatch::Host(HostPatch::default())
            )
            .await
            .unwrap_err(),
        ControlError::UnknownMic {
            room_id: room.code.to_string(),
            mic_id: "ghost".into()
        }
    );
    assert_eq!(
        store
            .update_mic_settings(
                &room.code,
                &ghost,
                &ghost,
                &SettingsPatch::Local(LocalPatch::default())
            )
            .await
            .unwrap_err(),
        ControlError::Unauthorized("ghost".into())
    );
    assert_eq!(
        store
            .update_mic_settings(
                &RoomCode::from("NOPE22"),
                &host,
                &ghost,
                &SettingsPatch::Host(HostPatch::default())
            )
            .await
            .unwrap_err(),
        ControlError::UnknownRoom("NOPE22".into())
    );
}

#[tokio::test]
async fn room_settings_update() {
    let store = store();
    let host = ConnId::from("h");
    let room = store.create_room(&host, None).await.unwrap();
    store.add_mic(&room.code, &ConnId::from("m"), None).await.unwrap();
    let effects = Effects {
        reverb: 0.5,
        ..Default::default()
    };
    let patch = RoomSettingsPatch {
        master_volume: Some(0.7),
        global_effects: Some(effects),
    };

    assert_eq!(
        store
            .update_room_settings(&room.code, &ConnId::from("m"), &patch)
            .await
            .unwrap_err(),
        ControlError::Unauthorized("m".into())
    );

    let (settings, mics) = store
        .update_room_settings(&room.code, &host, &patch)
        .await
        .unwrap();
    assert_eq!(settings.master_volume, 0.7);
    assert_eq!(settings.global_effects.reverb, 0.5);
    assert_eq!(settings.max_mics, 15);
    assert_eq!(mics, vec![ConnId::from("m")]);
}

#[tokio::test]
async fn find_by_conn_resolves_role() {
    let store = store();
    let host = ConnId::from("h");
    let mic = ConnId::from("m");
    let room = store.create_room(&host, None).await.unwrap();
    store.add_mic(&room.code, &mic, Some("Ana")).await.unwrap();

    let as_host = store.find_by_conn(&host).await.unwrap();
    assert_eq!(as_host.role, Role::Host);
    assert!(as_host.mic.is_none());

    let as_mic = store.find_by_conn(&mic).await.unwrap();
    assert_eq!(as_mic.role, Role::Mic);
    assert_eq!(as_mic.room, room.code);
    assert_eq!(as_mic.host, host);
    assert_eq!(as_mic.mic.unwrap().name, "Ana");

    assert!(store.find_by_conn(&ConnId::from("stranger")).await.is_none());
}

#[tokio::test]
async fn mic_cannot_join_twice() {
    let store = store();
    let a = store.create_room(&ConnId::from("h1"), None).await.unwrap();
    let b = store.create_room(&ConnId::from("h2"), None).await.unwrap();
    let mic = ConnId::from("m");
    store.add_mic(&a.code, &mic, None).await.unwrap();
    let err = store.add_mic(&b.code, &mic, None).await.unwrap_err();
    assert_eq!(err, SessionError::AlreadyInRoom(a.code.to_string()));
}

#[tokio::test]
async fn hosted_room_access_checks_host() {
    let store = store();
    let room = store.create_room(&ConnId::from("h"), None).await.unwrap();

    let err = store
        .with_hosted_room(&room.code, &ConnId::from("intruder"), |_| Ok(()))
        .await
        .unwrap_err();
    assert_eq!(err, ControlError::Unauthorized("intruder".into()));

    let err = store
        .with_hosted_room(&RoomCode::from("NOPE22"), &ConnId::from("h"), |_| Ok(()))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::UnknownRoom(_)));

    let count = store
        .with_hosted_room(&room.code, &ConnId::from("h"), |room| Ok(room.mic_count()))
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn own_mic_access_rejects_host_and_strangers() {
    let store = store();
    let host = ConnId::from("h");
    let room = store.create_room(&host, None).await.unwrap();
    store.add_mic(&room.code, &ConnId::from("m"), None).await.unwrap();

    assert!(store
        .with_own_mic(&room.code, &host, |_, _| ())
        .await
        .is_err());
    let seen_host = store
        .with_own_mic(&room.code, &ConnId::from("m"), |host, _| host.clone())
        .await
        .unwrap();
    assert_eq!(seen_host, host);
}

#[tokio::test]
async fn delete_room_returns_final_state() {
    let store = store();
    let room = store.create_room(&ConnId::from("h"), None).await.unwrap();
    store.add_mic(&room.code, &ConnId::from("m1"), None).await.unwrap();
    store.add_mic(&room.code, &ConnId::from("m2"), None).await.unwrap();

    let deleted = store.delete_room(&room.code).await.unwrap();
    assert_eq!(deleted.mic_count(), 2);
    assert!(store.delete_room(&room.code).await.is_none());
    assert!(store.find_by_conn(&ConnId::from("m1")).await.is_none());
    assert_eq!(store.room_count().await, 0);
}

#[tokio::test]
async fn stats_report_occupancy() {
    let store = store();
    let room = store
        .create_room(&ConnId::from("h"), Some("Band"))
        .await
        .unwrap();
    store.add_mic(&room.code, &ConnId::from("m"), None).await.unwrap();
    store.create_room(&ConnId::from("h2"), None).await.unwrap();

    let stats = store.stats().await;
    assert_eq!(stats.total_rooms, 2);
    let band = stats.rooms.iter().find(|r| r.room_id == room.code).unwrap();
    assert_eq!(band.room_name, "Band");
    assert_eq!(band.mic_count, 1);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["totalRooms"], 2);
    assert!(json["rooms"][0]["micCount"].is_number());
}

#[tokio::test]
async fn get_all_mics_keeps_join_order() {
    let store = store();
    let room = store.create_room(&ConnId::from("h"), None).await.unwrap();
    for name in ["first", "second", "third"] {
        store
            .add_mic(&room.code, &ConnId::from(format!("id-{name}")), Some(name))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    let names: Vec<String> = store
        .get_all_mics(&room.code)
        .await
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, ["first", "second", "third"]);
}
