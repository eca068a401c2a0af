//! Per-connection handler: greet, then pump frames both ways until close.

use std::net::SocketAddr;
use std::time::Duration;

use airmic_common::{ClientMessage, ConnId, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::dispatch::Coordinator;

/// Settings for the WebSocket listener.
#[derive(Debug, Clone)]
pub struct ConnectionLimits {
    /// Time allowed for the WebSocket upgrade.
    pub handshake_timeout: Duration,
    /// Outbound queue depth per connection.
    pub outbound_queue: usize,
}

/// Accept control connections until `shutdown` fires.
pub async fn serve_ws(
    listener: TcpListener,
    coordinator: Coordinator,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let coordinator = coordinator.clone();
                let limits = limits.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(limits.handshake_timeout, accept_async(stream)).await
                    {
                        Ok(Ok(ws)) => {
                            handle_connection(ws, addr, coordinator, limits.outbound_queue, shutdown)
                                .await
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                        Err(_) => {
                            tracing::warn!(
                                peer = %addr,
                                timeout = ?limits.handshake_timeout,
                                "WS handshake timed out"
                            );
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
    tracing::info!("WebSocket listener stopped");
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    coordinator: Coordinator,
    outbound_queue: usize,
    shutdown: CancellationToken,
) {
    let (mut sink, mut stream) = ws.split();
    let conn = ConnId::new();

    // 1. Register our outbound queue under a fresh id.
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(outbound_queue);
    coordinator.peers.register(conn.clone(), tx).await;
    tracing::info!(peer = %addr, conn = %conn, "Client connected");

    // 2. Tell the client who it is.
    let welcome = ServerMessage::Welcome {
        conn_id: conn.clone(),
    };
    if send_message(&mut sink, &welcome).await.is_err() {
        coordinator.disconnect(&conn).await;
        return;
    }

    // 3. Pump until either side closes.
    loop {
        tokio::select! {
            // Queued events for this client -> its WebSocket
            Some(msg) = rx.recv() => {
                if send_message(&mut sink, &msg).await.is_err() {
                    break;
                }
            }

            // Frames from this client -> dispatcher
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => coordinator.handle(&conn, msg).await,
                            Err(e) => {
                                tracing::debug!(conn = %conn, error = %e, "Unparseable message");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(conn = %conn, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // 4. Cleanup: cascade room membership, then drop the queue.
    tracing::info!(peer = %addr, conn = %conn, "Client disconnected");
    coordinator.disconnect(&conn).await;
}

/// Send a ServerMessage as a JSON text frame.
async fn send_message(
    sink: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
    msg: &ServerMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(kind = ?msg.kind(), error = %e, "Failed to encode message");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}
