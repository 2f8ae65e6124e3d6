//! Route modules for the PDF worker service

pub mod contexts;
pub mod health;
pub mod tasks;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Headroom for the JSON envelope around the base64 document
const BODY_OVERHEAD: usize = 64 * 1024;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    // Base64 inflates the document by 4/3
    let body_limit = state.config().worker.max_document_bytes / 3 * 4 + BODY_OVERHEAD;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/health", health::router())
        .nest("/api/v1/tasks", tasks::router())
        .nest("/api/v1/contexts", contexts::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::pdf::synthesizer::create;

    fn test_state() -> AppState {
        AppState::new(Config::default())
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(app(test_state()), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["contexts"], json!(0));
    }

    #[tokio::test]
    async fn test_extract_task_round_trip() {
        let content = STANDARD.encode(create("over http"));
        let (status, body) = call(
            app(test_state()),
            Method::POST,
            "/api/v1/tasks",
            Some(json!({"kind": "extract", "content": content})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["result"]["pageCount"], json!(1));
        assert_eq!(body["result"]["pages"][0]["text"], json!("over http"));
        assert!(body["correlationId"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_search_task_returns_geometry() {
        let content = STANDARD.encode(create("Hello\nWorld"));
        let (status, body) = call(
            app(test_state()),
            Method::POST,
            "/api/v1/tasks",
            Some(json!({
                "kind": "search",
                "content": content,
                "options": {"searchText": "world", "matchCase": false},
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let matches = body["result"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["pageNumber"], json!(1));
        assert_eq!(matches[0]["quadPoints"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_create_task_returns_base64_document() {
        let (status, body) = call(
            app(test_state()),
            Method::POST,
            "/api/v1/tasks",
            Some(json!({"kind": "create", "options": {"text": "fresh"}})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let encoded = body["result"]["content"].as_str().unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));
    }

    #[tokio::test]
    async fn test_task_failure_is_an_envelope() {
        let (status, body) = call(
            app(test_state()),
            Method::POST,
            "/api/v1/tasks",
            Some(json!({"kind": "frobnicate", "content": ""})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["kind"], json!("invalidArgument"));
    }

    #[tokio::test]
    async fn test_bad_base64_is_bad_request() {
        let (status, body) = call(
            app(test_state()),
            Method::POST,
            "/api/v1/tasks",
            Some(json!({"kind": "extract", "content": "***"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("bad_request"));
    }

    #[tokio::test]
    async fn test_oversized_document_is_rejected() {
        let mut config = Config::default();
        config.worker.max_document_bytes = 16;
        let state = AppState::new(config);
        let content = STANDARD.encode([0u8; 32]);

        let (status, _) = call(
            app(state),
            Method::POST,
            "/api/v1/tasks",
            Some(json!({"kind": "extract", "content": content})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_contexts_listing_and_termination() {
        let state = test_state();
        let content = STANDARD.encode(create("ctx"));
        call(
            app(state.clone()),
            Method::POST,
            "/api/v1/tasks",
            Some(json!({"kind": "extract", "content": content})),
        )
        .await;

        let (status, body) = call(app(state.clone()), Method::GET, "/api/v1/contexts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["contexts"][0]["family"], json!("text"));
        assert_eq!(body["contexts"][0]["completed"], json!(1));

        let (status, body) = call(app(state.clone()), Method::DELETE, "/api/v1/contexts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["terminated"], json!(1));
        assert!(state.manager().is_empty());
    }
}
