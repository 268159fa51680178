//! Status HTTP surface (Axum router).

use std::sync::Arc;

use axum::{Extension, Json, Router, routing::get};
use serde_json::{Value, json};
use tower::ServiceBuilder;

use fitcheck_infra::{ProcessorStats, StatsSnapshot};

/// Build the status router served next to the processor loop.
pub fn build_router(stats: Arc<ProcessorStats>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats_snapshot))
        .layer(ServiceBuilder::new().layer(Extension(stats)))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn stats_snapshot(Extension(stats): Extension<Arc<ProcessorStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = get_json(build_router(Arc::new(ProcessorStats::new())), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn stats_starts_at_zero() {
        let (status, body) = get_json(build_router(Arc::new(ProcessorStats::new())), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["runs"], 0);
        assert_eq!(body["requeue_dropped"], 0);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_router(Arc::new(ProcessorStats::new()));
        let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
