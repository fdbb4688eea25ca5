//! Axum router construction.
//!
//! The [`app`] function wires the health, metrics, and catch-all
//! redirect routes and returns a ready-to-serve [`axum::Router`].
//! Every path outside the fixed routes is answered by the
//! permanent-redirect endpoint.

use axum::{
    extract::State,
    http::{HeaderMap, Method, Uri},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::http::{Endpoint, PermanentRedirect, RequestContext};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::services::ServiceCategory;
use crate::ServiceContext;

/// Build the axum [`Router`] over a bootstrapped context.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<ServiceContext>) -> Router {
    let redirect: Arc<dyn Endpoint> = Arc::new(PermanentRedirect::new(
        &state.config.server.public_url,
        &state.config.server.redirect_path,
    ));

    Router::new()
        // Health check endpoint.
        .route("/health", get(health_check))
        // Prometheus metrics endpoint.
        .route("/metrics", get(metrics_handler))
        // Everything else answers with the permanent redirect.
        .fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            let redirect = redirect.clone();
            async move {
                let req = RequestContext {
                    method,
                    path: uri.path().to_string(),
                    headers,
                    body,
                };
                debug!("Redirecting {} {}", req.method, req.path);
                redirect.handle(&req)
            }
        })
        // Application state shared across all handlers.
        .with_state(state)
        // Request tracing inner, metrics outermost so it captures the
        // full request lifecycle.
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
}

/// `GET /health` -- liveness plus the per-category bootstrap picture.
async fn health_check(State(state): State<Arc<ServiceContext>>) -> impl IntoResponse {
    let provider_of = |category: ServiceCategory| -> serde_json::Value {
        let handle = match category {
            ServiceCategory::Database => state.database.as_ref().map(|h| h.provider()),
            ServiceCategory::FileStorage => state.file_storage.as_ref().map(|h| h.provider()),
            ServiceCategory::Logging => state.logging.as_ref().map(|h| h.provider()),
            ServiceCategory::PubSub => state.pubsub.as_ref().map(|h| h.provider()),
            ServiceCategory::Tracing => state.tracing.as_ref().map(|h| h.provider()),
            ServiceCategory::Vm => state.vm.as_ref().map(|h| h.provider()),
        };
        match handle {
            Some(provider) => serde_json::json!(provider),
            None => serde_json::Value::Null,
        }
    };

    let mut services = serde_json::Map::new();
    for category in ServiceCategory::BOOTSTRAP_ORDER {
        services.insert(category.as_str().to_string(), provider_of(category));
    }

    axum::Json(serde_json::json!({
        "status": "ok",
        "program": state.config.program,
        "services": services,
    }))
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::Config;

    fn test_state() -> Arc<ServiceContext> {
        let mut config = Config::default();
        config.server.public_url = "https://api.example.com".to_string();
        config.server.redirect_path = "/docs".to_string();
        Arc::new(ServiceContext::empty(config))
    }

    #[tokio::test]
    async fn test_health_reports_empty_categories() {
        let app = app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["services"]["database"].is_null());
        assert!(json["services"]["logging"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_path_redirects_permanently() {
        let app = app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/no/such/route")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://api.example.com/docs"
        );
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("https://api.example.com/docs"));
    }
}
