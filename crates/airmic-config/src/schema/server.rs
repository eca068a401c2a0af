//! Network listener and public URL settings.

use serde::{Deserialize, Serialize};

/// Coordinator listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind both listeners on.
    pub host: String,
    /// WebSocket control-channel port.
    pub ws_port: u16,
    /// HTTP API port (health, stats, room lookup, QR).
    pub http_port: u16,
    /// Public base URL used to build join links.
    pub base_url: String,
    /// Seconds a new socket has to finish the WebSocket handshake.
    pub handshake_timeout_secs: u32,
    /// Per-connection outbound queue depth.
    pub outbound_queue: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            ws_port: 3001,
            http_port: 3000,
            base_url: "http://localhost:3000".into(),
            handshake_timeout_secs: 10,
            outbound_queue: 256,
        }
    }
}

impl ServerConfig {
    /// `base_url` with a scheme. Bare hostnames get `https://`.
    pub fn public_base_url(&self) -> String {
        let url = self.base_url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        }
    }
}
