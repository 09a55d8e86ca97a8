use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;

pub(crate) fn with_conversation_routes(conversation: axum::Router) -> axum::Router {
    conversation
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "message": "loan orchestrator is running" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum_prometheus::PrometheusMetricLayer;
    use metrics_exporter_prometheus::PrometheusHandle;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, OnceLock};
    use tower::ServiceExt;

    // The prometheus recorder is process-global, so tests share one handle.
    fn metrics_handle() -> Arc<PrometheusHandle> {
        static HANDLE: OnceLock<Arc<PrometheusHandle>> = OnceLock::new();
        HANDLE
            .get_or_init(|| {
                let (_layer, handle) = PrometheusMetricLayer::pair();
                Arc::new(handle)
            })
            .clone()
    }

    fn ops_router(ready: bool) -> axum::Router {
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: metrics_handle(),
        };
        with_conversation_routes(axum::Router::new()).layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str) -> axum::response::Response {
        app.oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("call succeeds")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let response = get(ops_router(true), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("body is JSON");
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let response = get(ops_router(true), "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(ops_router(false), "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_render_as_prometheus_text() {
        let response = get(ops_router(true), "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .expect("content type set"),
            "text/plain; version=0.0.4"
        );
    }
}
