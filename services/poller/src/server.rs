//! HTTP server for poller status and metrics.
//!
//! Provides endpoints for:
//! - Liveness
//! - The last ingest cycle summary
//! - Persisted per-sensor watermarks
//! - Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use storage::WatermarkStore;
use zephyr_common::{IngestError, WatermarkState};

use crate::scheduler::PollerStatus;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    #[serde(flatten)]
    pub poller: PollerStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorsResponse {
    pub listed: usize,
    pub unlisted: usize,
    pub sensors: Vec<WatermarkState>,
}

// ============================================================================
// Shared State
// ============================================================================

pub struct ServerState {
    pub status: Arc<RwLock<PollerStatus>>,
    pub store: Arc<dyn WatermarkStore>,
    pub prometheus: Option<PrometheusHandle>,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
}

// ============================================================================
// Router
// ============================================================================

/// Create the status API router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status_handler))
        .route("/sensors", get(sensors_handler))
        .route("/sensors/:sensor_id", get(sensor_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(Extension(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /status - Poller status and the last cycle summary
async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let poller = state.status.read().await.clone();

    let status = match (&poller.last_summary, &poller.last_error) {
        (None, None) => "starting",
        (None, Some(_)) => "degraded",
        (Some(summary), Some(last)) if last.at > summary.finished_at => "degraded",
        (Some(summary), _) if !summary.failures.is_empty() => "partial",
        _ => "ok",
    };

    Json(StatusResponse {
        service: "zephyr-poller".to_string(),
        status: status.to_string(),
        started_at: state.started_at,
        dry_run: state.dry_run,
        poller,
    })
}

/// GET /sensors - Persisted watermark state of every known Zephyr
async fn sensors_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    match state.store.list().await {
        Ok(sensors) => {
            let listed = sensors.iter().filter(|s| s.still_listed).count();
            Json(SensorsResponse {
                listed,
                unlisted: sensors.len() - listed,
                sensors,
            })
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET /sensors/:sensor_id - One Zephyr's watermark state
async fn sensor_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(sensor_id): Path<u32>,
) -> impl IntoResponse {
    match state.store.load(sensor_id).await {
        Ok(sensor) => Json(sensor).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /metrics - Prometheus exposition
async fn metrics_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET /health - Health check
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn error_response(e: &IngestError) -> axum::response::Response {
    let code = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({ "error": e.message, "kind": e.kind });
    (code, Json(body)).into_response()
}

/// Run the status server.
pub async fn run_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting poller status server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use storage::MemoryWatermarkStore;
    use tower::ServiceExt;
    use zephyr_common::Granularity;

    fn state(states: Vec<WatermarkState>) -> Arc<ServerState> {
        Arc::new(ServerState {
            status: Arc::new(RwLock::new(PollerStatus::default())),
            store: Arc::new(MemoryWatermarkStore::with_states(states)),
            prometheus: None,
            started_at: Utc::now(),
            dry_run: true,
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let resp = create_router(state(vec![]))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_before_first_cycle() {
        let (code, body) = get_json(create_router(state(vec![])), "/status").await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["service"], "zephyr-poller");
        assert_eq!(body["status"], "starting");
        assert_eq!(body["dry_run"], true);
        assert_eq!(body["cycles_completed"], 0);
        assert!(body["last_summary"].is_null());
    }

    #[tokio::test]
    async fn test_sensors_lists_watermarks() {
        let mut listed = WatermarkState::new_sensor(469);
        listed.advance(
            Granularity::FifteenMinute,
            DateTime::parse_from_rfc3339("2020-08-27T13:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let mut gone = WatermarkState::new_sensor(362);
        gone.still_listed = false;

        let (code, body) = get_json(create_router(state(vec![listed, gone])), "/sensors").await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["listed"], 1);
        assert_eq!(body["unlisted"], 1);
        assert_eq!(body["sensors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_sensor_is_404() {
        let (code, body) = get_json(create_router(state(vec![])), "/sensors/9999").await;

        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "SensorNotFound");
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let resp = create_router(state(vec![]))
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
