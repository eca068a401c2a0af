//! HTTP API: health, stats, room lookup and join QR codes.
//!
//! - GET /health
//! - GET /api/health
//! - GET /api/version
//! - GET /api/stats
//! - GET /api/room/:room_id
//! - GET /api/room/:room_id/qr[?format=svg]

use airmic_common::protocol::QrPayload;
use airmic_common::RoomCode;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::qr::{svg_data_url, QrService};
use crate::store::{RoomStore, StoreStats};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// State shared across handlers.
#[derive(Clone)]
pub struct HttpState {
    pub store: RoomStore,
    pub qr: QrService,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub room_id: RoomCode,
    pub room_name: String,
    pub mic_count: usize,
    pub max_mics: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct QrQuery {
    pub format: Option<String>,
}

/// Build the router with all endpoints.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/api/version", get(version_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/room/:room_id", get(room_handler))
        .route("/api/room/:room_id/qr", get(qr_handler))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::cors::CorsLayer::permissive()),
        )
}

/// Serve the API until `shutdown` fires.
pub async fn serve_http(
    listener: TcpListener,
    state: HttpState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

fn not_found(code: &RoomCode) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Room {code} not found"),
        }),
    )
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now(),
        version: VERSION.into(),
    })
}

async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: VERSION.into(),
    })
}

async fn stats_handler(State(state): State<HttpState>) -> Json<StoreStats> {
    Json(state.store.stats().await)
}

async fn room_handler(
    State(state): State<HttpState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>, (StatusCode, Json<ErrorResponse>)> {
    let code = RoomCode::from(room_id);
    let room = state.store.get_room(&code).await.ok_or_else(|| not_found(&code))?;
    Ok(Json(RoomResponse {
        room_id: room.code.clone(),
        room_name: room.name.clone(),
        mic_count: room.mic_count(),
        max_mics: room.settings.max_mics,
        created_at: room.created_at,
    }))
}

async fn qr_handler(
    State(state): State<HttpState>,
    Path(room_id): Path<String>,
    Query(query): Query<QrQuery>,
) -> Response {
    let code = RoomCode::from(room_id);
    if !state.store.room_exists(&code).await {
        return not_found(&code).into_response();
    }

    let svg = match state.qr.svg(&code).await {
        Ok(svg) => svg,
        Err(e) => {
            tracing::warn!(room = %code, error = %e, "QR generation failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "QR generation failed".into(),
                }),
            )
                .into_response();
        }
    };

    if query.format.as_deref() == Some("svg") {
        ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()
    } else {
        Json(QrPayload {
            room_id: code.clone(),
            url: state.qr.join_url(&code),
            data_url: svg_data_url(&svg),
        })
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;
    use airmic_common::ConnId;
    use airmic_config::AirmicConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> HttpState {
        HttpState {
            store: RoomStore::new(StoreConfig::default()),
            qr: QrService::from_config(&AirmicConfig::default()),
        }
    }

    async fn get(state: &HttpState, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = get(&state(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], VERSION);

        let (status, _) = get(&state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_count_rooms() {
        let state = state();
        let room = state.store.create_room(&ConnId::from("h"), None).await.unwrap();
        state.store.add_mic(&room.code, &ConnId::from("m"), None).await.unwrap();

        let (status, body) = get(&state, "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["totalRooms"], 1);
        assert_eq!(json["rooms"][0]["roomId"], room.code.as_str());
        assert_eq!(json["rooms"][0]["micCount"], 1);
    }

    #[tokio::test]
    async fn missing_room_is_404() {
        let (status, body) = get(&state(), "/api/room/ZZZZZZ").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(json.error.contains("ZZZZZZ"));

        let (status, _) = get(&state(), "/api/room/ZZZZZZ/qr").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn room_lookup_is_case_insensitive() {
        let state = state();
        let room = state
            .store
            .create_room(&ConnId::from("h"), Some("Band"))
            .await
            .unwrap();
        let uri = format!("/api/room/{}", room.code.as_str().to_lowercase());
        let (status, body) = get(&state, &uri).await;
        assert_eq!(status, StatusCode::OK);
        let json: RoomResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.room_id, room.code);
        assert_eq!(json.room_name, "Band");
        assert_eq!(json.max_mics, 15);
    }

    #[tokio::test]
    async fn qr_formats() {
        let state = state();
        let room = state.store.create_room(&ConnId::from("h"), None).await.unwrap();

        let (status, body) = get(&state, &format!("/api/room/{}/qr", room.code)).await;
        assert_eq!(status, StatusCode::OK);
        let payload: QrPayload = serde_json::from_slice(&body).unwrap();
        assert!(payload.data_url.starts_with("data:image/svg+xml;base64,"));
        assert!(payload.url.ends_with(&format!("/mic?room={}", room.code)));

        let (status, body) = get(&state, &format!("/api/room/{}/qr?format=svg", room.code)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("<svg"));
    }
}
