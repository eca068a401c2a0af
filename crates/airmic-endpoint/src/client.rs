//! WebSocket client for the coordinator.
//!
//! One background task owns the socket. Replies are matched to requests by
//! `requestId`; everything else lands, in arrival order, on the event stream
//! handed back by [`CoordinatorClient::connect`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use airmic_common::protocol::{MicIdentity, MicSnapshot, QrPayload, RoomSummary};
use airmic_common::{ClientError, ClientMessage, ConnId, RoomCode, ServerMessage};
use airmic_config::schema::EndpointConfig;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>>;

/// Server events that are not replies, in arrival order.
pub type EventStream = mpsc::Receiver<ServerMessage>;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on TCP connect, upgrade and the welcome frame together.
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub outbound_queue: usize,
    pub event_queue: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&EndpointConfig::default())
    }
}

impl ClientOptions {
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(u64::from(config.connect_timeout_secs)),
            request_timeout: Duration::from_secs(u64::from(config.request_timeout_secs)),
            outbound_queue: 64,
            event_queue: 256,
        }
    }
}

/// Reply to `create-room`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedRoom {
    pub room: RoomSummary,
    pub qr: QrPayload,
}

/// Reply to `join-room`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRoom {
    pub room: RoomSummary,
    pub mic: MicIdentity,
    pub host_id: ConnId,
}

/// Reply to `check-room`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomAvailability {
    pub exists: bool,
    pub room_name: Option<String>,
    pub mic_count: Option<usize>,
    pub max_mics: Option<usize>,
}

/// Reply to `get-room-info`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomDetails {
    pub room: RoomSummary,
    pub mics: Vec<MicSnapshot>,
}

pub struct CoordinatorClient {
    conn_id: ConnId,
    outbound: mpsc::Sender<ClientMessage>,
    pending: PendingMap,
    next_request: AtomicU64,
    request_timeout: Duration,
    shutdown: CancellationToken,
    io_task: JoinHandle<()>,
}

impl CoordinatorClient {
    /// Connect to `url` and wait for the welcome frame, all within
    /// `options.connect_timeout`.
    pub async fn connect(
        url: &str,
        options: ClientOptions,
    ) -> Result<(Self, EventStream), ClientError> {
        let (ws, conn_id) = tokio::time::timeout(options.connect_timeout, handshake(url))
            .await
            .map_err(|_| ClientError::Timeout(options.connect_timeout))??;
        info!(conn = %conn_id, "Connected to coordinator");

        let (sink, stream) = ws.split();
        let (out_tx, out_rx) = mpsc::channel(options.outbound_queue);
        let (event_tx, event_rx) = mpsc::channel(options.event_queue);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let io_task = tokio::spawn(io_loop(
            sink,
            stream,
            out_rx,
            event_tx,
            pending.clone(),
            shutdown.clone(),
        ));

        Ok((
            Self {
                conn_id,
                outbound: out_tx,
                pending,
                next_request: AtomicU64::new(1),
                request_timeout: options.request_timeout,
                shutdown,
                io_task,
            },
            event_rx,
        ))
    }

    /// Id the coordinator assigned to this connection.
    pub fn conn_id(&self) -> &ConnId {
        &self.conn_id
    }

    pub fn is_connected(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.io_task.is_finished()
    }

    /// Queue a fire-and-forget message.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.outbound.send(msg).await.map_err(|_| ClientError::Closed)
    }

    /// Queue a fire-and-forget message without waiting for queue space.
    pub fn try_send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.outbound.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(msg) => {
                warn!(msg = ?msg, "Outbound queue full, dropping message");
                ClientError::Protocol("outbound queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => ClientError::Closed,
        })
    }

    /// Send a request and wait for its reply. A `request-failed` reply
    /// becomes [`ClientError::Rejected`].
    pub async fn request(&self, msg: ClientMessage) -> Result<ServerMessage, ClientError> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::Closed);
        }
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let msg = msg.with_request_id(id);
        if msg.request_id().is_none() {
            return Err(ClientError::Protocol(format!(
                "{msg:?} does not expect a reply"
            )));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        // The io task cancels before it clears the pending map.
        if self.shutdown.is_cancelled() || self.outbound.send(msg).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::Closed);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(ServerMessage::RequestFailed { code, message, .. })) => {
                Err(ClientError::Rejected { code, message })
            }
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout(self.request_timeout))
            }
        }
    }

    pub async fn create_room(&self, name: Option<&str>) -> Result<CreatedRoom, ClientError> {
        let reply = self
            .request(ClientMessage::CreateRoom {
                request_id: None,
                room_name: name.map(str::to_string),
            })
            .await?;
        match reply {
            ServerMessage::RoomCreated { room, qr, .. } => Ok(CreatedRoom { room, qr }),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn join_room(
        &self,
        code: &RoomCode,
        name: Option<&str>,
    ) -> Result<JoinedRoom, ClientError> {
        let reply = self
            .request(ClientMessage::JoinRoom {
                request_id: None,
                room_id: code.clone(),
                mic_name: name.map(str::to_string),
            })
            .await?;
        match reply {
            ServerMessage::RoomJoined {
                room, mic, host_id, ..
            } => Ok(JoinedRoom { room, mic, host_id }),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn check_room(&self, code: &RoomCode) -> Result<RoomAvailability, ClientError> {
        let reply = self
            .request(ClientMessage::CheckRoom {
                request_id: None,
                room_id: code.clone(),
            })
            .await?;
        match reply {
            ServerMessage::RoomCheck {
                exists,
                room_name,
                mic_count,
                max_mics,
                ..
            } => Ok(RoomAvailability {
                exists,
                room_name,
                mic_count,
                max_mics,
            }),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn room_info(&self, code: &RoomCode) -> Result<RoomDetails, ClientError> {
        let reply = self
            .request(ClientMessage::GetRoomInfo {
                request_id: None,
                room_id: code.clone(),
            })
            .await?;
        match reply {
            ServerMessage::RoomInfo { room, mics, .. } => Ok(RoomDetails { room, mics }),
            other => Err(unexpected(&other)),
        }
    }

    /// Close the socket. Pending requests fail with [`ClientError::Closed`].
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for CoordinatorClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn unexpected(reply: &ServerMessage) -> ClientError {
    ClientError::Protocol(format!("unexpected reply {:?}", reply.kind()))
}

/// Open the socket and read the welcome frame.
async fn handshake(url: &str) -> Result<(WsStream, ConnId), ClientError> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;

    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::Welcome { conn_id }) => Ok((ws, conn_id)),
                    Ok(other) => Err(ClientError::Protocol(format!(
                        "expected welcome, got {:?}",
                        other.kind()
                    ))),
                    Err(e) => Err(ClientError::Protocol(e.to_string())),
                };
            }
            Some(Ok(WsMessage::Close(_))) | None => return Err(ClientError::Closed),
            Some(Err(e)) => return Err(ClientError::Connect(e.to_string())),
            Some(Ok(_)) => {}
        }
    }
}

async fn io_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut stream: SplitStream<WsStream>,
    mut outbound: mpsc::Receiver<ClientMessage>,
    events: mpsc::Sender<ServerMessage>,
    pending: PendingMap,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            // Queued messages go out before a requested close.
            biased;

            Some(msg) = outbound.recv() => {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
                    debug!(error = %e, "Send failed");
                    break;
                }
            }

            _ = shutdown.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }

            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => route(msg, &pending, &events).await,
                        Err(e) => debug!(error = %e, "Unparseable server message"),
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = sink.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Coordinator closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    shutdown.cancel();
    // Dropping the reply senders fails every waiting request.
    pending.lock().await.clear();
}

async fn route(msg: ServerMessage, pending: &PendingMap, events: &mpsc::Sender<ServerMessage>) {
    if let Some(id) = msg.request_id() {
        if let Some(reply) = pending.lock().await.remove(&id) {
            let _ = reply.send(msg);
            return;
        }
        debug!(request_id = id, "Reply for unknown or expired request");
        return;
    }
    // Nobody listening is fine; the client may only be making requests.
    let _ = events.send(msg).await;
}
