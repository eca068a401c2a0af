use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

use airmic_common::protocol::{
    Effects, LocalSettings, MicStatus, PeerConnectionState, QrPayload, RoomSummary,
    ServerEventKind,
};
use airmic_common::{ClientError, ClientMessage, ConnId, RoomCode, ServerMessage};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use super::{
    forward_signal, lock, run_events, unit, EndReason, IncomingSignal, SessionOptions,
    SessionState,
};
use crate::client::{CoordinatorClient, EventStream};
use crate::dispatch::{DispatchError, EventTable, Flow};
use crate::dsp::{params, DspGraph, ParamWrite, Ramp};
use crate::ducking::DuckingDetector;
use crate::level::{LevelSource, SILENCE_DB};
use crate::mixer::Mixer;
use crate::poller::spawn_poller;

/// The host's record of one mic, built from its status reports.
#[derive(Debug, Clone, PartialEq)]
pub struct MicInfo {
    pub name: String,
    pub peer_id: String,
    pub status: MicStatus,
    /// What the mic reports about its own settings.
    pub local: LocalSettings,
    pub level_db: f32,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostView {
    pub room: RoomSummary,
    pub qr: QrPayload,
    pub mics: HashMap<ConnId, MicInfo>,
    pub ducking_active: bool,
    pub ended: Option<EndReason>,
}

struct HostState {
    view: HostView,
    mixer: Mixer,
    detector: DuckingDetector,
    graph: Box<dyn DspGraph>,
    outbox: Vec<ClientMessage>,
    signals: mpsc::Sender<IncomingSignal>,
}

impl HostState {
    fn room_id(&self) -> RoomCode {
        self.view.room.room_id.clone()
    }

    fn write_all(&mut self, writes: &[ParamWrite]) {
        for write in writes {
            self.graph.apply(write);
        }
    }

    /// Solo on one channel changes every other channel, so gains are
    /// always rewritten together.
    fn write_gains(&mut self) {
        let writes = self.mixer.gain_writes(Ramp::Immediate);
        self.write_all(&writes);
    }

    fn write_channel_effects(&mut self, mic: &ConnId) {
        let writes = self.mixer.effect_writes(mic);
        self.write_all(&writes);
    }

    fn write_master_effects(&mut self) {
        let writes = self.mixer.master_effect_writes();
        self.write_all(&writes);
    }

    fn drop_mic(&mut self, mic: &ConnId) {
        if self.view.mics.remove(mic).is_some() {
            self.mixer.remove_channel(mic);
            self.graph
                .set_param(&params::channel_gain(mic.as_str()), 0.0, Ramp::Immediate);
            self.write_gains();
        }
    }

    fn mic_mut(&mut self, mic: &ConnId) -> Option<&mut MicInfo> {
        self.view.mics.get_mut(mic)
    }
}

impl SessionState for HostState {
    fn take_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn end(&mut self, reason: EndReason) {
        if self.view.ended.is_some() {
            return;
        }
        info!(room = %self.view.room.room_id, reason = ?reason, "Host session ended");
        self.view.ended = Some(reason);
    }
}

// -- event handlers --

fn on_mic_joined(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicJoined {
        mic_id,
        peer_id,
        name,
        settings,
    } = msg
    {
        st.view.mics.insert(
            mic_id.clone(),
            MicInfo {
                name: name.clone(),
                peer_id: peer_id.clone(),
                status: MicStatus::Connecting,
                local: settings.clone(),
                level_db: SILENCE_DB,
                latency_ms: 0.0,
            },
        );
        st.mixer.add_channel(mic_id.clone());
        st.write_gains();
        st.write_channel_effects(mic_id);
        info!(room = %st.view.room.room_id, mic = %mic_id, name = %name, "Mic joined");
    }
    Flow::Continue
}

fn on_mic_disconnected(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicDisconnected { mic_id, .. } = msg {
        st.drop_mic(mic_id);
        info!(room = %st.view.room.room_id, mic = %mic_id, "Mic disconnected");
    }
    Flow::Continue
}

fn on_mic_left(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicLeft { mic_id, reason, .. } = msg {
        st.drop_mic(mic_id);
        info!(room = %st.view.room.room_id, mic = %mic_id, reason = ?reason, "Mic left");
    }
    Flow::Continue
}

/// A ready mic gets asked to negotiate straight away.
fn on_mic_ready(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicWebrtcReady { mic_id, .. } = msg {
        let room_id = st.room_id();
        if let Some(mic) = st.mic_mut(mic_id) {
            mic.status = mic.status.on_negotiation_started();
            st.outbox.push(ClientMessage::InitiateWebrtc {
                room_id,
                mic_id: mic_id.clone(),
            });
        }
    }
    Flow::Continue
}

fn on_mic_state(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicWebrtcState { mic_id, state } = msg {
        if let Some(mic) = st.mic_mut(mic_id) {
            mic.status = mic.status.on_peer_state(*state);
        }
    }
    Flow::Continue
}

fn on_signal(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::WebrtcSignal { from, signal } = msg {
        forward_signal(&st.signals, from, signal);
    }
    Flow::Continue
}

fn on_local_volume(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicLocalVolume { mic_id, volume } = msg {
        if let Some(mic) = st.mic_mut(mic_id) {
            mic.local.volume = *volume;
        }
    }
    Flow::Continue
}

fn on_mute_state(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicMuteState { mic_id, muted } = msg {
        if let Some(mic) = st.mic_mut(mic_id) {
            mic.local.muted = *muted;
        }
    }
    Flow::Continue
}

fn on_effects_preference(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicEffectsPreference { mic_id, effects } = msg {
        if let Some(mic) = st.mic_mut(mic_id) {
            mic.local.effects = *effects;
        }
    }
    Flow::Continue
}

fn on_audio_level(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicAudioLevel { mic_id, level } = msg {
        if let Some(mic) = st.mic_mut(mic_id) {
            mic.level_db = *level;
            mic.status = mic.status.on_audio();
        }
    }
    Flow::Continue
}

fn on_latency(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicLatency { mic_id, latency } = msg {
        if let Some(mic) = st.mic_mut(mic_id) {
            mic.latency_ms = *latency;
        }
    }
    Flow::Continue
}

/// Confirmation of this host's own mute write.
fn on_muted_by_host(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicMutedByHost { mic_id, muted } = msg {
        if st.mixer.update(mic_id, |c| c.muted = *muted) {
            st.write_gains();
        }
    }
    Flow::Continue
}

/// Confirmation of this host's own solo write.
fn on_solo_state(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MicSoloState { mic_id, solo } = msg {
        if st.mixer.update(mic_id, |c| c.solo = *solo) {
            st.write_gains();
        }
    }
    Flow::Continue
}

fn on_room_closed(st: &mut HostState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::RoomClosed { reason } = msg {
        st.end(EndReason::RoomClosed(reason.clone()));
    }
    Flow::Stop
}

fn host_table() -> Result<EventTable<HostState>, DispatchError> {
    use ServerEventKind as K;
    let mut table = EventTable::new();
    table.on(K::MicJoined, on_mic_joined)?;
    table.on(K::MicDisconnected, on_mic_disconnected)?;
    table.on(K::MicLeft, on_mic_left)?;
    table.on(K::MicWebrtcReady, on_mic_ready)?;
    table.on(K::MicWebrtcState, on_mic_state)?;
    table.on(K::WebrtcSignal, on_signal)?;
    table.on(K::MicLocalVolume, on_local_volume)?;
    table.on(K::MicMuteState, on_mute_state)?;
    table.on(K::MicEffectsPreference, on_effects_preference)?;
    table.on(K::MicAudioLevel, on_audio_level)?;
    table.on(K::MicLatency, on_latency)?;
    table.on(K::MicMutedByHost, on_muted_by_host)?;
    table.on(K::MicSoloState, on_solo_state)?;
    table.on(K::RoomClosed, on_room_closed)?;
    Ok(table)
}

/// A hosted room: mixer, ducking detector and control writes.
pub struct HostSession {
    client: Arc<CoordinatorClient>,
    state: Arc<Mutex<HostState>>,
    room_id: RoomCode,
    cancel: CancellationToken,
    signals: Option<mpsc::Receiver<IncomingSignal>>,
    _stop_on_drop: DropGuard,
}

impl HostSession {
    /// Create a room and start the session's loops. `output` meters what
    /// the host is playing; it drives ducking.
    pub async fn create(
        client: CoordinatorClient,
        events: EventStream,
        name: Option<&str>,
        output: impl LevelSource,
        graph: impl DspGraph,
        options: SessionOptions,
    ) -> Result<Self, ClientError> {
        let created = client.create_room(name).await?;
        let table = host_table()?;
        let room_id = created.room.room_id.clone();
        info!(room = %room_id, "Room created");

        let mut mixer = Mixer::new(options.default_volume, options.host_settings());
        if let Some(settings) = &created.room.settings {
            mixer.set_master_volume(settings.master_volume);
            mixer.set_master_effects(settings.global_effects);
        }

        let (signal_tx, signal_rx) = mpsc::channel(options.signal_queue);
        let mut state = HostState {
            view: HostView {
                room: created.room,
                qr: created.qr,
                mics: HashMap::new(),
                ducking_active: false,
                ended: None,
            },
            mixer,
            detector: DuckingDetector::new(&options.ducking),
            graph: Box::new(graph),
            outbox: Vec::new(),
            signals: signal_tx,
        };
        state.write_master_effects();
        let state = Arc::new(Mutex::new(state));

        let client = Arc::new(client);
        let cancel = CancellationToken::new();

        tokio::spawn(run_events(
            events,
            table,
            state.clone(),
            client.clone(),
            cancel.clone(),
        ));

        let mut output = output;
        let loop_state = state.clone();
        let loop_client = client.clone();
        let loop_room = room_id.clone();
        spawn_poller(options.poll_interval, cancel.clone(), move || {
            let db = output.level_db();
            let edge = {
                let mut st = lock(&loop_state);
                let edge = st.detector.sample(db);
                st.view.ducking_active = st.detector.is_active();
                edge
            };
            if let Some(active) = edge {
                debug!(room = %loop_room, active, level_db = db, "Ducking edge");
                let _ = loop_client.try_send(ClientMessage::DuckingSignal {
                    room_id: loop_room.clone(),
                    ducking: active,
                });
            }
            ControlFlow::Continue(())
        });

        Ok(Self {
            client,
            state,
            room_id,
            _stop_on_drop: cancel.clone().drop_guard(),
            cancel,
            signals: Some(signal_rx),
        })
    }

    pub fn room_id(&self) -> &RoomCode {
        &self.room_id
    }

    pub fn conn_id(&self) -> &ConnId {
        self.client.conn_id()
    }

    pub fn view(&self) -> HostView {
        lock(&self.state).view.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Wait for the session to end and say why.
    pub async fn ended(&self) -> EndReason {
        self.cancel.cancelled().await;
        lock(&self.state)
            .view
            .ended
            .clone()
            .unwrap_or(EndReason::Disconnected)
    }

    /// Gain the mixer currently applies to `mic`.
    pub fn channel_gain(&self, mic: &ConnId) -> f32 {
        lock(&self.state).mixer.effective_gain(mic)
    }

    pub fn master_volume(&self) -> f32 {
        lock(&self.state).mixer.master_volume()
    }

    /// Negotiation payloads from mics. Can be taken once.
    pub fn take_signals(&mut self) -> Option<mpsc::Receiver<IncomingSignal>> {
        self.signals.take()
    }

    fn ensure_active(&self) -> Result<(), ClientError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ClientError::Closed)
        }
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.client.send(msg).await
    }

    pub async fn set_mic_volume(&self, mic: &ConnId, volume: f32) -> Result<(), ClientError> {
        self.ensure_active()?;
        let volume = unit(volume);
        {
            let mut st = lock(&self.state);
            if st.mixer.update(mic, |c| c.volume = volume) {
                st.write_gains();
            }
        }
        self.send(ClientMessage::HostSetMicVolume {
            room_id: self.room_id.clone(),
            mic_id: mic.clone(),
            volume,
        })
        .await
    }

    pub async fn mute_mic(&self, mic: &ConnId, muted: bool) -> Result<(), ClientError> {
        self.ensure_active()?;
        {
            let mut st = lock(&self.state);
            if st.mixer.update(mic, |c| c.muted = muted) {
                st.write_gains();
            }
        }
        self.send(ClientMessage::HostMuteMic {
            room_id: self.room_id.clone(),
            mic_id: mic.clone(),
            muted,
        })
        .await
    }

    pub async fn solo_mic(&self, mic: &ConnId, solo: bool) -> Result<(), ClientError> {
        self.ensure_active()?;
        {
            let mut st = lock(&self.state);
            if st.mixer.update(mic, |c| c.solo = solo) {
                st.write_gains();
            }
        }
        self.send(ClientMessage::SoloMic {
            room_id: self.room_id.clone(),
            mic_id: mic.clone(),
            solo,
        })
        .await
    }

    pub async fn set_mic_effects(&self, mic: &ConnId, effects: Effects) -> Result<(), ClientError> {
        self.ensure_active()?;
        {
            let mut st = lock(&self.state);
            if st.mixer.update(mic, |c| c.effects = effects) {
                st.write_channel_effects(mic);
            }
        }
        self.send(ClientMessage::MicEffectsChange {
            room_id: self.room_id.clone(),
            mic_id: mic.clone(),
            effects,
        })
        .await
    }

    pub async fn set_master_volume(&self, volume: f32) -> Result<(), ClientError> {
        self.ensure_active()?;
        let volume = unit(volume);
        {
            let mut st = lock(&self.state);
            st.mixer.set_master_volume(volume);
            st.write_gains();
        }
        self.send(ClientMessage::MasterVolumeChange {
            room_id: self.room_id.clone(),
            volume,
        })
        .await
    }

    pub async fn set_global_effects(&self, effects: Effects) -> Result<(), ClientError> {
        self.ensure_active()?;
        {
            let mut st = lock(&self.state);
            st.mixer.set_master_effects(effects);
            st.write_master_effects();
        }
        self.send(ClientMessage::GlobalEffectsChange {
            room_id: self.room_id.clone(),
            effects,
        })
        .await
    }

    /// Remove a mic. The mixer drops it when the room confirms.
    pub async fn kick(&self, mic: &ConnId) -> Result<(), ClientError> {
        self.send(ClientMessage::KickMic {
            room_id: self.room_id.clone(),
            mic_id: mic.clone(),
        })
        .await
    }

    pub fn set_ducking_threshold(&self, threshold_db: f32) {
        lock(&self.state).detector.set_threshold(threshold_db);
    }

    /// Disabling while ducked releases the mics.
    pub async fn set_ducking_enabled(&self, enabled: bool) -> Result<(), ClientError> {
        let edge = {
            let mut st = lock(&self.state);
            let edge = st.detector.set_enabled(enabled);
            st.view.ducking_active = st.detector.is_active();
            edge
        };
        match edge {
            Some(active) => {
                self.send(ClientMessage::DuckingSignal {
                    room_id: self.room_id.clone(),
                    ducking: active,
                })
                .await
            }
            None => Ok(()),
        }
    }

    pub async fn send_signal(&self, to: &ConnId, signal: String) -> Result<(), ClientError> {
        self.send(ClientMessage::WebrtcSignal {
            to: to.clone(),
            room_id: Some(self.room_id.clone()),
            signal,
        })
        .await
    }

    /// Acknowledge a mic's media state change, e.g. after the media layer
    /// reports the peer connected.
    pub fn record_media_state(&self, mic: &ConnId, state: PeerConnectionState) {
        if let Some(info) = lock(&self.state).mic_mut(mic) {
            info.status = info.status.on_peer_state(state);
        }
    }

    /// Close the room for everyone and stop the loops.
    pub async fn close(self) -> Result<(), ClientError> {
        let sent = if self.is_active() {
            self.client
                .send(ClientMessage::LeaveRoom {
                    room_id: self.room_id.clone(),
                })
                .await
        } else {
            Ok(())
        };
        lock(&self.state).end(EndReason::Left);
        self.cancel.cancel();
        sent
    }
}
