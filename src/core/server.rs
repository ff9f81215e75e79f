//! HTTP endpoint serving the cached metrics.
//!
//! * `GET /metrics`: every registered metric in the Prometheus text format.
//!   Scrapes only read cached values and never run queries.
//! * `GET /ready`: `200` once the first refresh cycle completed, `503`
//!   before that and after shutdown started.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{collectors::exposition::PrometheusExposition, readiness::Readiness};

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub exposition: Arc<PrometheusExposition>,
    pub readiness: Readiness,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/ready", get(ready))
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.exposition.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn ready(State(state): State<AppState>) -> Response {
    let current = state.readiness.current_state();
    let status = if current.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, current.as_str()).into_response()
}

/// Serves `router` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Serving metrics on http://{}/metrics", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::core::{
        collectors::{
            collector::{fake::ScriptedRunner, QueryCollector},
            exposition::Exposition,
            types::MetricKind,
        },
        readiness::ReadinessState,
    };

    fn state() -> AppState {
        AppState {
            exposition: Arc::new(PrometheusExposition::default()),
            readiness: Readiness::new(),
        }
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn metrics_serves_cached_values() {
        let state = state();
        let collector = Arc::new(
            QueryCollector::new(
                "warehouse_rows",
                MetricKind::Gauge,
                "SELECT 1;",
                Arc::new(ScriptedRunner::new(17.0)),
            )
            .unwrap(),
        );
        collector.update().await.unwrap();
        state.exposition.register(collector).unwrap();

        let response = router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_string();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/plain; version=0.0.4");
        assert!(body.contains("# TYPE warehouse_rows gauge"));
        assert!(body.contains("warehouse_rows 17"));
    }

    #[tokio::test]
    async fn ready_follows_readiness() {
        let state = state();

        let (status, body) = get_body(router(state.clone()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "starting");

        state.readiness.set_state(ReadinessState::Ready);
        let (status, body) = get_body(router(state), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ready");
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, state(), cancel.clone()));

        cancel.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("server should stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
