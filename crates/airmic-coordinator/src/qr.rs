//! Join links and their QR renderings.

use std::sync::Arc;
use std::time::Duration;

use airmic_common::protocol::QrPayload;
use airmic_common::{RoomCode, SessionError};
use airmic_config::AirmicConfig;
use base64::Engine;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

/// Turns a URL into an SVG document.
pub trait QrEncoder: Send + Sync + 'static {
    fn encode_svg(&self, data: &str) -> Result<String, String>;
}

/// [`QrEncoder`] backed by the `qrcode` crate.
#[derive(Debug, Clone)]
pub struct SvgEncoder {
    pub min_dimension: u32,
    pub quiet_zone: bool,
}

impl QrEncoder for SvgEncoder {
    fn encode_svg(&self, data: &str) -> Result<String, String> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
            .map_err(|e| e.to_string())?;
        Ok(code
            .render::<svg::Color>()
            .min_dimensions(self.min_dimension, self.min_dimension)
            .quiet_zone(self.quiet_zone)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build())
    }
}

/// Builds join links and renders them off the async workers.
#[derive(Clone)]
pub struct QrService {
    base_url: String,
    path: String,
    timeout: Duration,
    encoder: Arc<dyn QrEncoder>,
}

impl QrService {
    pub fn new(
        base_url: impl Into<String>,
        path: impl Into<String>,
        timeout: Duration,
        encoder: Arc<dyn QrEncoder>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            timeout,
            encoder,
        }
    }

    pub fn from_config(config: &AirmicConfig) -> Self {
        Self::new(
            config.server.public_base_url(),
            config.qr.path.clone(),
            Duration::from_millis(u64::from(config.qr.timeout_ms)),
            Arc::new(SvgEncoder {
                min_dimension: config.qr.min_dimension,
                quiet_zone: config.qr.quiet_zone,
            }),
        )
    }

    /// `{base_url}{path}?room={CODE}`
    pub fn join_url(&self, code: &RoomCode) -> String {
        format!("{}{}?room={}", self.base_url, self.path, code)
    }

    /// Render the join link as SVG on the blocking pool, bounded by the
    /// configured timeout.
    pub async fn svg(&self, code: &RoomCode) -> Result<String, SessionError> {
        let url = self.join_url(code);
        let encoder = self.encoder.clone();
        let task = tokio::task::spawn_blocking(move || encoder.encode_svg(&url));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(svg))) => Ok(svg),
            Ok(Ok(Err(e))) => Err(SessionError::Collaborator(format!("qr encoding failed: {e}"))),
            Ok(Err(e)) => Err(SessionError::Collaborator(format!("qr task failed: {e}"))),
            Err(_) => Err(SessionError::Collaborator(format!(
                "qr encoding timed out after {:?}",
                self.timeout
            ))),
        }
    }

    /// Join link plus its SVG as a `data:` URL.
    pub async fn payload(&self, code: &RoomCode) -> Result<QrPayload, SessionError> {
        let svg = self.svg(code).await?;
        Ok(QrPayload {
            room_id: code.clone(),
            url: self.join_url(code),
            data_url: svg_data_url(&svg),
        })
    }
}

pub fn svg_data_url(svg: &str) -> String {
    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encoder that always fails.
    pub(crate) struct BrokenEncoder;

    impl QrEncoder for BrokenEncoder {
        fn encode_svg(&self, _data: &str) -> Result<String, String> {
            Err("encoder offline".into())
        }
    }

    /// Encoder that blocks longer than any sane timeout.
    pub(crate) struct StuckEncoder(pub Duration);

    impl QrEncoder for StuckEncoder {
        fn encode_svg(&self, _data: &str) -> Result<String, String> {
            std::thread::sleep(self.0);
            Ok("<svg/>".into())
        }
    }

    fn service(encoder: Arc<dyn QrEncoder>) -> QrService {
        QrService::new(
            "https://mics.example.org",
            "/mic",
            Duration::from_millis(200),
            encoder,
        )
    }

    fn real() -> QrService {
        QrService::from_config(&AirmicConfig::default())
    }

    #[test]
    fn join_url_carries_code_as_query() {
        let qr = service(Arc::new(BrokenEncoder));
        assert_eq!(
            qr.join_url(&RoomCode::from("abc234")),
            "https://mics.example.org/mic?room=ABC234"
        );
    }

    #[test]
    fn bare_base_url_gets_https() {
        let mut config = AirmicConfig::default();
        config.server.base_url = "mics.example.org".into();
        let qr = QrService::from_config(&config);
        assert!(qr
            .join_url(&RoomCode::from("ABC234"))
            .starts_with("https://mics.example.org/mic?room="));
    }

    #[tokio::test]
    async fn renders_svg() {
        let svg = real().svg(&RoomCode::from("ABC234")).await.unwrap();
        assert!(svg.contains("<svg"));
    }

    #[tokio::test]
    async fn payload_is_data_url() {
        let code = RoomCode::from("ABC234");
        let payload = real().payload(&code).await.unwrap();
        assert_eq!(payload.room_id, code);
        assert_eq!(payload.url, "http://localhost:3000/mic?room=ABC234");
        assert!(payload.data_url.starts_with("data:image/svg+xml;base64,"));

        let encoded = payload
            .data_url
            .trim_start_matches("data:image/svg+xml;base64,");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert!(String::from_utf8(decoded).unwrap().contains("<svg"));
    }

    #[tokio::test]
    async fn encoder_failure_is_collaborator_error() {
        let err = service(Arc::new(BrokenEncoder))
            .payload(&RoomCode::from("ABC234"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Collaborator(ref msg) if msg.contains("offline")));
    }

    #[tokio::test]
    async fn slow_encoder_times_out() {
        let err = service(Arc::new(StuckEncoder(Duration::from_secs(2))))
            .svg(&RoomCode::from("ABC234"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Collaborator(ref msg) if msg.contains("timed out")));
    }
}
