use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use airmic_common::protocol::{
    Effects, HostSettings, LocalSettings, MicIdentity, PeerConnectionState, RoomSummary,
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
use crate::ducking::DuckingFollower;
use crate::gate::NoiseGate;
use crate::level::LevelSource;
use crate::mixer::send_gain;
use crate::poller::spawn_poller;

const SEND_RAMP: Ramp = Ramp::TimeConstant(Duration::from_millis(20));

/// What a mic knows about itself and its room.
#[derive(Debug, Clone, PartialEq)]
pub struct MicView {
    pub room: RoomSummary,
    pub mic: MicIdentity,
    pub host_id: ConnId,
    pub local: LocalSettings,
    /// Latest overrides from the host.
    pub host: HostSettings,
    pub master_volume: f32,
    pub global_effects: Effects,
    pub gate_open: bool,
    pub ducked: bool,
    pub send_gain: f32,
    /// Host asked this mic to start media negotiation.
    pub negotiation_requested: bool,
    pub ended: Option<EndReason>,
}

struct MicState {
    view: MicView,
    gate: NoiseGate,
    follower: DuckingFollower,
    graph: Box<dyn DspGraph>,
    outbox: Vec<ClientMessage>,
    signals: mpsc::Sender<IncomingSignal>,
    report_every: u32,
    polls: u32,
}

impl MicState {
    fn write_send_gain(&mut self) {
        let gain = send_gain(&self.view.local, &self.view.host);
        if gain != self.view.send_gain {
            self.view.send_gain = gain;
            self.graph.set_param(params::SEND_GAIN, gain, SEND_RAMP);
        }
    }

    fn write_initial(&mut self) {
        self.view.send_gain = send_gain(&self.view.local, &self.view.host);
        let writes = [
            ParamWrite::new(params::GATE_GAIN, self.gate.gain(), Ramp::Immediate),
            ParamWrite::new(params::DUCK_GAIN, self.follower.gain(), Ramp::Immediate),
            ParamWrite::new(params::SEND_GAIN, self.view.send_gain, Ramp::Immediate),
        ];
        for write in &writes {
            self.graph.apply(write);
        }
    }

    /// One poll of the gate loop. Returns the level to report, if due.
    fn on_level(&mut self, level_db: f32) -> Option<f32> {
        if self.view.ended.is_some() {
            return None;
        }
        if let Some(transition) = self.gate.sample(level_db) {
            self.graph.apply(&transition.gain);
            self.view.gate_open = transition.open;
            debug!(mic = %self.view.mic.mic_id, open = transition.open, "Noise gate");
        }
        self.polls = self.polls.wrapping_add(1);
        (self.report_every > 0 && self.polls % self.report_every == 0).then_some(level_db)
    }

    fn set_gate_enabled(&mut self, enabled: bool) {
        if let Some(transition) = self.gate.set_enabled(enabled) {
            self.graph.apply(&transition.gain);
        }
        self.view.gate_open = self.gate.is_open();
    }
}

impl SessionState for MicState {
    fn take_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn end(&mut self, reason: EndReason) {
        if self.view.ended.is_some() {
            return;
        }
        info!(
            mic = %self.view.mic.mic_id,
            room = %self.view.room.room_id,
            reason = ?reason,
            "Mic session ended"
        );
        self.view.ended = Some(reason);
        self.view.send_gain = 0.0;
        self.graph.set_param(params::SEND_GAIN, 0.0, Ramp::Immediate);
    }
}

// -- event handlers --

fn on_host_volume(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::HostVolumeOverride { volume } = msg {
        st.view.host.volume = *volume;
    }
    Flow::Continue
}

fn on_host_mute(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::HostMuteOverride { muted } = msg {
        st.view.host.muted = *muted;
        st.write_send_gain();
    }
    Flow::Continue
}

fn on_host_solo(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::HostSoloOverride { solo } = msg {
        st.view.host.solo = *solo;
    }
    Flow::Continue
}

fn on_effects(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::EffectsUpdate { effects } = msg {
        st.view.host.effects = *effects;
    }
    Flow::Continue
}

fn on_master_volume(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::MasterVolumeUpdate { volume } = msg {
        st.view.master_volume = *volume;
    }
    Flow::Continue
}

fn on_global_effects(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::GlobalEffectsUpdate { effects } = msg {
        st.view.global_effects = *effects;
    }
    Flow::Continue
}

fn on_ducking(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::Ducking { active } = msg {
        if let Some(write) = st.follower.apply(*active) {
            st.graph.apply(&write);
        }
        st.view.ducked = st.follower.is_active();
    }
    Flow::Continue
}

fn on_start_webrtc(st: &mut MicState, _msg: &ServerMessage) -> Flow {
    st.view.negotiation_requested = true;
    Flow::Continue
}

fn on_signal(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::WebrtcSignal { from, signal } = msg {
        forward_signal(&st.signals, from, signal);
    }
    Flow::Continue
}

fn on_kicked(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::Kicked { reason } = msg {
        st.end(EndReason::Kicked(reason.clone()));
    }
    Flow::Stop
}

fn on_room_closed(st: &mut MicState, msg: &ServerMessage) -> Flow {
    if let ServerMessage::RoomClosed { reason } = msg {
        st.end(EndReason::RoomClosed(reason.clone()));
    }
    Flow::Stop
}

fn mic_table() -> Result<EventTable<MicState>, DispatchError> {
    use ServerEventKind as K;
    let mut table = EventTable::new();
    table.on(K::HostVolumeOverride, on_host_volume)?;
    table.on(K::HostMuteOverride, on_host_mute)?;
    table.on(K::HostSoloOverride, on_host_solo)?;
    table.on(K::EffectsUpdate, on_effects)?;
    table.on(K::MasterVolumeUpdate, on_master_volume)?;
    table.on(K::GlobalEffectsUpdate, on_global_effects)?;
    table.on(K::Ducking, on_ducking)?;
    table.on(K::StartWebrtc, on_start_webrtc)?;
    table.on(K::WebrtcSignal, on_signal)?;
    table.on(K::Kicked, on_kicked)?;
    table.on(K::RoomClosed, on_room_closed)?;
    Ok(table)
}

/// A joined mic: gate loop, ducking follower and host overrides.
pub struct MicSession {
    client: Arc<CoordinatorClient>,
    state: Arc<Mutex<MicState>>,
    room_id: RoomCode,
    cancel: CancellationToken,
    signals: Option<mpsc::Receiver<IncomingSignal>>,
    _stop_on_drop: DropGuard,
}

impl MicSession {
    /// Join `code` and start the session's loops.
    pub async fn join(
        client: CoordinatorClient,
        events: EventStream,
        code: &RoomCode,
        name: Option<&str>,
        level: impl LevelSource,
        graph: impl DspGraph,
        options: SessionOptions,
    ) -> Result<Self, ClientError> {
        let joined = client.join_room(code, name).await?;
        let table = mic_table()?;
        let room_id = joined.room.room_id.clone();
        let peer_id = joined.mic.peer_id.clone();
        info!(room = %room_id, mic = %joined.mic.mic_id, "Joined room");

        let master_volume = joined
            .room
            .settings
            .as_ref()
            .map_or(options.default_volume, |s| s.master_volume);
        let global_effects = joined
            .room
            .settings
            .as_ref()
            .map_or(options.default_effects, |s| s.global_effects);

        let gate = NoiseGate::new(&options.gate, options.poll_interval);
        let (signal_tx, signal_rx) = mpsc::channel(options.signal_queue);
        let mut state = MicState {
            view: MicView {
                room: joined.room,
                mic: joined.mic,
                host_id: joined.host_id,
                local: options.local_settings(),
                host: options.host_settings(),
                master_volume,
                global_effects,
                gate_open: gate.is_open(),
                ducked: false,
                send_gain: 0.0,
                negotiation_requested: false,
                ended: None,
            },
            gate,
            follower: DuckingFollower::new(&options.ducking),
            graph: Box::new(graph),
            outbox: Vec::new(),
            signals: signal_tx,
            report_every: options.level_report_every,
            polls: 0,
        };
        state.write_initial();
        let state = Arc::new(Mutex::new(state));

        let client = Arc::new(client);
        let cancel = CancellationToken::new();

        client
            .send(ClientMessage::WebrtcReady {
                room_id: room_id.clone(),
                peer_id,
            })
            .await?;

        tokio::spawn(run_events(
            events,
            table,
            state.clone(),
            client.clone(),
            cancel.clone(),
        ));

        let mut level = level;
        let loop_state = state.clone();
        let loop_client = client.clone();
        let loop_room = room_id.clone();
        spawn_poller(options.poll_interval, cancel.clone(), move || {
            let db = level.level_db();
            if let Some(report) = lock(&loop_state).on_level(db) {
                let _ = loop_client.try_send(ClientMessage::AudioLevel {
                    room_id: loop_room.clone(),
                    level: report,
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

    pub fn view(&self) -> MicView {
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

    /// Negotiation payloads from the host. Can be taken once.
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

    pub async fn set_volume(&self, volume: f32) -> Result<(), ClientError> {
        self.ensure_active()?;
        let volume = unit(volume);
        {
            let mut st = lock(&self.state);
            st.view.local.volume = volume;
            st.write_send_gain();
        }
        self.client
            .send(ClientMessage::MicVolumeChange {
                room_id: self.room_id.clone(),
                volume,
            })
            .await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), ClientError> {
        self.ensure_active()?;
        {
            let mut st = lock(&self.state);
            st.view.local.muted = muted;
            st.write_send_gain();
        }
        self.client
            .send(ClientMessage::MicMuteToggle {
                room_id: self.room_id.clone(),
                muted,
            })
            .await
    }

    pub async fn set_effects(&self, effects: Effects) -> Result<(), ClientError> {
        self.ensure_active()?;
        lock(&self.state).view.local.effects = effects;
        self.client
            .send(ClientMessage::MicEffectsPreference {
                room_id: self.room_id.clone(),
                effects,
            })
            .await
    }

    pub fn set_gate_enabled(&self, enabled: bool) {
        lock(&self.state).set_gate_enabled(enabled);
    }

    pub fn set_gate_threshold(&self, threshold_db: f32) {
        lock(&self.state).gate.set_threshold(threshold_db);
    }

    pub async fn report_latency(&self, latency_ms: f64) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.client
            .send(ClientMessage::LatencyReport {
                room_id: self.room_id.clone(),
                latency: latency_ms,
            })
            .await
    }

    pub async fn report_media_state(&self, state: PeerConnectionState) -> Result<(), ClientError> {
        self.ensure_active()?;
        self.client
            .send(ClientMessage::WebrtcState {
                room_id: self.room_id.clone(),
                state,
            })
            .await
    }

    pub async fn send_signal(&self, signal: String) -> Result<(), ClientError> {
        self.ensure_active()?;
        let host_id = lock(&self.state).view.host_id.clone();
        self.client
            .send(ClientMessage::WebrtcSignal {
                to: host_id,
                room_id: Some(self.room_id.clone()),
                signal,
            })
            .await
    }

    /// Leave the room and stop the loops.
    pub async fn leave(self) -> Result<(), ClientError> {
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
