//! Integration tests for middleware
//!
//! These tests verify:
//! - CORS headers are correctly set
//! - Gateway identity headers pass preflight
//! - Wildcard origins combine with credentials

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower::ServiceExt;

use twin_server::{config::CorsConfig, middleware};

fn create_test_app_with_cors(cors_config: CorsConfig) -> Router {
    async fn health() -> impl IntoResponse {
        Json(json!({ "status": "ok" }))
    }

    Router::new()
        .route("/health", get(health))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&cors_config))
}

fn local_cors() -> CorsConfig {
    CorsConfig {
        allowed_origins: vec!["http://localhost:3000".to_string()],
        allow_credentials: true,
    }
}

#[tokio::test]
async fn test_cors_headers_with_specific_origin() {
    let app = create_test_app_with_cors(local_cors());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
}

#[tokio::test]
async fn test_cors_preflight_request() {
    let app = create_test_app_with_cors(local_cors());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "3600");
}

#[tokio::test]
async fn test_cors_allows_identity_headers() {
    let app = create_test_app_with_cors(local_cors());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-user-id,x-user-roles")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let allowed = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .unwrap()
        .to_str()
        .unwrap()
        .to_lowercase();
    assert!(allowed.contains("x-user-id"));
    assert!(allowed.contains("x-user-roles"));
}

#[tokio::test]
async fn test_wildcard_origin_with_credentials_mirrors_request() {
    let app = create_test_app_with_cors(CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allow_credentials: true,
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://viewer.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://viewer.example.com"
    );
}
