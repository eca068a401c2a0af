//! Sessions against a live coordinator on a loopback socket.

use std::time::{Duration, Instant};

use airmic_common::protocol::FailureCode;
use airmic_common::{ClientError, RoomCode};
use airmic_config::AirmicConfig;
use airmic_coordinator::lifecycle::{HOST_DISCONNECTED, HOST_LEFT};
use airmic_coordinator::sync::KICK_REASON;
use airmic_coordinator::{serve_ws, ConnectionLimits, Coordinator};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::client::ClientOptions;
use crate::dsp::{params, RecordingGraph};
use crate::level::SharedLevel;

struct Server {
    url: String,
    shutdown: CancellationToken,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start() -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(serve_ws(
        listener,
        Coordinator::from_config(&AirmicConfig::default()),
        ConnectionLimits {
            handshake_timeout: Duration::from_secs(5),
            outbound_queue: 64,
        },
        shutdown.clone(),
    ));
    Server {
        url: format!("ws://{addr}"),
        shutdown,
    }
}

fn options() -> SessionOptions {
    let mut options = SessionOptions::default();
    options.poll_interval = Duration::from_millis(10);
    options.gate.hold_ms = 30;
    options.level_report_every = 1;
    options
}

async fn connect(server: &Server) -> (CoordinatorClient, EventStream) {
    CoordinatorClient::connect(&server.url, ClientOptions::default())
        .await
        .unwrap()
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct Host {
    session: HostSession,
    graph: RecordingGraph,
    output: SharedLevel,
}

async fn host(server: &Server) -> Host {
    let (client, events) = connect(server).await;
    let graph = RecordingGraph::new();
    let output = SharedLevel::default();
    let session = HostSession::create(
        client,
        events,
        Some("Choir"),
        output.clone(),
        graph.clone(),
        options(),
    )
    .await
    .unwrap();
    Host {
        session,
        graph,
        output,
    }
}

struct Mic {
    session: MicSession,
    graph: RecordingGraph,
    level: SharedLevel,
}

async fn mic(server: &Server, code: &RoomCode, name: &str) -> Mic {
    let (client, events) = connect(server).await;
    let graph = RecordingGraph::new();
    let level = SharedLevel::default();
    let session = MicSession::join(
        client,
        events,
        code,
        Some(name),
        level.clone(),
        graph.clone(),
        options(),
    )
    .await
    .unwrap();
    Mic {
        session,
        graph,
        level,
    }
}

async fn room_with_mic(server: &Server) -> (Host, Mic) {
    let host = host(server).await;
    let mic = mic(server, host.session.room_id(), "Ana").await;
    let mic_id = mic.session.conn_id().clone();
    eventually("host to see the mic", || {
        host.session.view().mics.contains_key(&mic_id)
    })
    .await;
    (host, mic)
}

#[test]
fn options_read_the_endpoint_section() {
    let mut config = AirmicConfig::default();
    config.endpoint.level_report_every = 9;
    config.endpoint.signal_queue = 7;

    let options = SessionOptions::from_config(&config);
    assert_eq!(options.level_report_every, 9);
    assert_eq!(options.signal_queue, 7);

    let defaults = SessionOptions::from_config(&AirmicConfig::default());
    assert_eq!(defaults.level_report_every, 4);
    assert_eq!(defaults.signal_queue, 64);
}

#[tokio::test]
async fn joined_mic_gets_a_channel_and_negotiation() {
    let server = start().await;
    let (host, mic) = room_with_mic(&server).await;
    let mic_id = mic.session.conn_id().clone();

    let view = host.session.view();
    assert_eq!(view.room.room_name, "Choir");
    assert!(view.qr.url.ends_with(&format!("?room={}", view.room.room_id)));
    assert_eq!(view.mics[&mic_id].name, "Ana");
    assert_eq!(host.session.channel_gain(&mic_id), 1.0);
    assert_eq!(
        host.graph.last(&params::channel_gain(mic_id.as_str())),
        Some(1.0)
    );

    // The mic announces itself ready; the host answers with initiate.
    eventually("negotiation request", || {
        mic.session.view().negotiation_requested
    })
    .await;
    assert_eq!(mic.session.view().host_id, *host.session.conn_id());
}

#[tokio::test]
async fn unknown_room_is_rejected() {
    let server = start().await;
    let (client, events) = connect(&server).await;
    let err = MicSession::join(
        client,
        events,
        &RoomCode::from("ZZZZZZ"),
        None,
        SharedLevel::default(),
        RecordingGraph::new(),
        options(),
    )
    .await
    .err()
    .unwrap();
    assert!(
        matches!(
            err,
            ClientError::Rejected {
                code: FailureCode::RoomNotFound,
                ..
            }
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn host_mute_wins_over_local_unmute() {
    let server = start().await;
    let (host, mic) = room_with_mic(&server).await;
    let mic_id = mic.session.conn_id().clone();

    mic.session.set_volume(0.8).await.unwrap();
    eventually("host to see local volume", || {
        host.session.view().mics[&mic_id].local.volume == 0.8
    })
    .await;
    assert_eq!(mic.session.view().send_gain, 0.8);

    host.session.mute_mic(&mic_id, true).await.unwrap();
    assert_eq!(host.session.channel_gain(&mic_id), 0.0);
    eventually("mute override", || mic.session.view().host.muted).await;
    assert_eq!(mic.session.view().send_gain, 0.0);

    mic.session.set_muted(false).await.unwrap();
    assert_eq!(mic.session.view().send_gain, 0.0);
    assert_eq!(mic.graph.last(params::SEND_GAIN), Some(0.0));

    host.session.mute_mic(&mic_id, false).await.unwrap();
    eventually("unmute override", || !mic.session.view().host.muted).await;
    assert_eq!(mic.session.view().send_gain, 0.8);
}

#[tokio::test]
async fn solo_silences_other_channels() {
    let server = start().await;
    let (host, a) = room_with_mic(&server).await;
    let b = mic(&server, host.session.room_id(), "Ben").await;
    let a_id = a.session.conn_id().clone();
    let b_id = b.session.conn_id().clone();
    eventually("second mic", || host.session.view().mics.len() == 2).await;

    host.session.solo_mic(&a_id, true).await.unwrap();
    assert_eq!(host.session.channel_gain(&a_id), 1.0);
    assert_eq!(host.session.channel_gain(&b_id), 0.0);
    eventually("solo override", || a.session.view().host.solo).await;

    host.session.set_master_volume(0.5).await.unwrap();
    assert_eq!(host.session.channel_gain(&a_id), 0.5);
    eventually("master volume", || b.session.view().master_volume == 0.5).await;

    host.session.solo_mic(&a_id, false).await.unwrap();
    assert_eq!(host.session.channel_gain(&b_id), 0.5);
}

#[tokio::test]
async fn ducking_follows_host_output() {
    let server = start().await;
    let (host, mic) = room_with_mic(&server).await;

    host.output.set(-10.0);
    eventually("ducking on", || mic.session.view().ducked).await;
    assert!(host.session.view().ducking_active);
    assert_eq!(mic.graph.last(params::DUCK_GAIN), Some(0.3));

    host.output.set(-60.0);
    eventually("ducking off", || !mic.session.view().ducked).await;
    assert_eq!(mic.graph.last(params::DUCK_GAIN), Some(1.0));

    // Initial unity write plus one per edge.
    assert_eq!(mic.graph.writes_to(params::DUCK_GAIN).len(), 3);
}

#[tokio::test]
async fn gate_loop_opens_and_closes() {
    let server = start().await;
    let (host, mic) = room_with_mic(&server).await;
    let mic_id = mic.session.conn_id().clone();
    assert_eq!(mic.graph.last(params::GATE_GAIN), Some(0.0));

    mic.level.set(-20.0);
    eventually("gate open", || mic.session.view().gate_open).await;
    assert_eq!(mic.graph.last(params::GATE_GAIN), Some(1.0));
    eventually("level report", || {
        host.session.view().mics[&mic_id].level_db == -20.0
    })
    .await;

    mic.level.set(-70.0);
    eventually("gate closed", || !mic.session.view().gate_open).await;
    assert_eq!(mic.graph.last(params::GATE_GAIN), Some(0.0));

    mic.session.set_gate_enabled(false);
    assert!(mic.session.view().gate_open);
    assert_eq!(mic.graph.last(params::GATE_GAIN), Some(1.0));
}

#[tokio::test]
async fn kick_ends_the_mic_session() {
    let server = start().await;
    let (host, mic) = room_with_mic(&server).await;
    let mic_id = mic.session.conn_id().clone();

    host.session.kick(&mic_id).await.unwrap();
    let reason = tokio::time::timeout(Duration::from_secs(3), mic.session.ended())
        .await
        .unwrap();
    assert_eq!(reason, EndReason::Kicked(KICK_REASON.into()));
    assert!(!mic.session.is_active());
    assert_eq!(mic.graph.last(params::SEND_GAIN), Some(0.0));
    assert!(matches!(
        mic.session.set_volume(0.5).await,
        Err(ClientError::Closed)
    ));

    eventually("host to drop the mic", || {
        !host.session.view().mics.contains_key(&mic_id)
    })
    .await;
    assert_eq!(host.session.channel_gain(&mic_id), 0.0);
}

#[tokio::test]
async fn closing_the_room_ends_every_mic() {
    let server = start().await;
    let (host, mic) = room_with_mic(&server).await;

    host.session.close().await.unwrap();
    let reason = tokio::time::timeout(Duration::from_secs(3), mic.session.ended())
        .await
        .unwrap();
    assert_eq!(reason, EndReason::RoomClosed(HOST_LEFT.into()));
}

#[tokio::test]
async fn dropped_host_closes_the_room() {
    let server = start().await;
    let (host, mic) = room_with_mic(&server).await;

    drop(host);
    let reason = tokio::time::timeout(Duration::from_secs(3), mic.session.ended())
        .await
        .unwrap();
    assert_eq!(reason, EndReason::RoomClosed(HOST_DISCONNECTED.into()));
}

#[tokio::test]
async fn leaving_and_dropping_mics_update_the_host() {
    let server = start().await;
    let (host, a) = room_with_mic(&server).await;
    let b = mic(&server, host.session.room_id(), "Ben").await;
    eventually("second mic", || host.session.view().mics.len() == 2).await;

    a.session.leave().await.unwrap();
    eventually("first mic gone", || host.session.view().mics.len() == 1).await;

    drop(b);
    eventually("second mic gone", || host.session.view().mics.is_empty()).await;
    assert!(host.session.is_active());
}

#[tokio::test]
async fn signals_reach_the_other_side_verbatim() {
    let server = start().await;
    let (mut host, mic) = room_with_mic(&server).await;
    let mut signals = host.session.take_signals().unwrap();
    assert!(host.session.take_signals().is_none());

    let offer = r#"{"type":"offer","sdp":"v=0\r\n"}"#.to_string();
    mic.session.send_signal(offer.clone()).await.unwrap();

    let incoming = tokio::time::timeout(Duration::from_secs(3), signals.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&incoming.from, mic.session.conn_id());
    assert_eq!(incoming.signal, offer);
}
