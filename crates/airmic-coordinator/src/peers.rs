//! Directory of open control connections.
//!
//! Maps each connection id to the sending half of its outbound queue. All
//! sends are non-blocking: a full or closed queue drops the message instead
//! of stalling the caller.

use std::collections::HashMap;
use std::sync::Arc;

use airmic_common::{ConnId, RelayError, ServerMessage};
use tokio::sync::{mpsc, RwLock};
use tokio::sync::mpsc::error::TrySendError;

/// Thread-safe connection directory.
#[derive(Clone, Default)]
pub struct PeerDirectory {
    peers: Arc<RwLock<HashMap<ConnId, mpsc::Sender<ServerMessage>>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, conn: ConnId, tx: mpsc::Sender<ServerMessage>) {
        self.peers.write().await.insert(conn, tx);
    }

    pub async fn unregister(&self, conn: &ConnId) {
        self.peers.write().await.remove(conn);
    }

    pub async fn is_connected(&self, conn: &ConnId) -> bool {
        self.peers.read().await.contains_key(conn)
    }

    pub async fn count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Queue `msg` for `conn`.
    pub async fn send(&self, conn: &ConnId, msg: ServerMessage) -> Result<(), RelayError> {
        let tx = self
            .peers
            .read()
            .await
            .get(conn)
            .cloned()
            .ok_or_else(|| RelayError::RecipientGone(conn.to_string()))?;

        match tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(conn = %conn, kind = ?msg.kind(), "Outbound queue full, dropping");
                Err(RelayError::RecipientGone(conn.to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(conn = %conn, "Outbound queue closed");
                Err(RelayError::RecipientGone(conn.to_string()))
            }
        }
    }

    /// Queue a copy of `msg` for every connection in `conns`. Returns how
    /// many accepted it.
    pub async fn broadcast<'a>(
        &self,
        conns: impl IntoIterator<Item = &'a ConnId>,
        msg: &ServerMessage,
    ) -> usize {
        let mut delivered = 0;
        for conn in conns {
            if self.send(conn, msg.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_reaches_registered_peer() {
        let peers = PeerDirectory::new();
        let (tx, mut rx) = mpsc::channel(4);
        peers.register(ConnId::from("a"), tx).await;

        peers
            .send(&ConnId::from("a"), ServerMessage::Ducking { active: true })
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(ServerMessage::Ducking { active: true }));
    }

    #[tokio::test]
    async fn send_to_unknown_peer_fails() {
        let peers = PeerDirectory::new();
        let err = peers
            .send(&ConnId::from("ghost"), ServerMessage::Ducking { active: true })
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::RecipientGone("ghost".into()));
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let peers = PeerDirectory::new();
        let (tx, mut rx) = mpsc::channel(1);
        peers.register(ConnId::from("a"), tx).await;

        let a = ConnId::from("a");
        assert!(peers.send(&a, ServerMessage::Ducking { active: true }).await.is_ok());
        assert!(peers.send(&a, ServerMessage::Ducking { active: false }).await.is_err());
        assert_eq!(rx.recv().await, Some(ServerMessage::Ducking { active: true }));
    }

    #[tokio::test]
    async fn order_is_preserved_per_recipient() {
        let peers = PeerDirectory::new();
        let (tx, mut rx) = mpsc::channel(16);
        peers.register(ConnId::from("a"), tx).await;

        let a = ConnId::from("a");
        for i in 0..10 {
            peers
                .send(&a, ServerMessage::HostVolumeOverride { volume: i as f32 })
                .await
                .unwrap();
        }
        for i in 0..10 {
            assert_eq!(
                rx.recv().await,
                Some(ServerMessage::HostVolumeOverride { volume: i as f32 })
            );
        }
    }

    #[tokio::test]
    async fn broadcast_counts_deliveries() {
        let peers = PeerDirectory::new();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, rx_b) = mpsc::channel(4);
        peers.register(ConnId::from("a"), tx_a).await;
        peers.register(ConnId::from("b"), tx_b).await;
        drop(rx_b);

        let targets = [ConnId::from("a"), ConnId::from("b"), ConnId::from("c")];
        let delivered = peers
            .broadcast(&targets, &ServerMessage::Ducking { active: true })
            .await;
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn unregister_removes_peer() {
        let peers = PeerDirectory::new();
        let (tx, _rx) = mpsc::channel(1);
        peers.register(ConnId::from("a"), tx).await;
        assert_eq!(peers.count().await, 1);
        peers.unregister(&ConnId::from("a")).await;
        assert!(!peers.is_connected(&ConnId::from("a")).await);
    }
}
