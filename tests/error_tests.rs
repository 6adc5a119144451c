use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
};
use event_gateway::{GatewayError, error::handle_panic};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_typed_failures_render_status_and_safe_message() {
    let cases = [
        (GatewayError::CorsRejected, 403, "Origin not allowed"),
        (GatewayError::AuthenticationRequired, 401, "Authentication required"),
        (GatewayError::InvalidOrExpiredToken, 401, "Invalid or expired token"),
        (GatewayError::RouteNotFound, 404, "Route not found"),
        (GatewayError::UpstreamUnavailable, 502, "Upstream service unavailable"),
    ];

    for (error, status, message) in cases {
        let response = error.into_response();
        assert_eq!(response.status().as_u16(), status);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "message": message })
        );
    }
}

#[tokio::test]
async fn test_internal_error_never_leaks_detail() {
    let error = GatewayError::internal("connect to postgres://admin:hunter2@db failed at src/x.rs:12");
    let response = error.into_response();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text, r#"{"success":false,"message":"Internal server error"}"#);
    assert!(!text.contains("hunter2"));
}

#[tokio::test]
async fn test_panicking_handler_becomes_generic_500() {
    async fn explode() -> &'static str {
        panic!("index out of bounds in /srv/gateway/src/secret.rs")
    }

    let app = Router::new()
        .route("/boom", get(explode))
        .layer(CatchPanicLayer::custom(handle_panic));

    let response = app
        .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({ "success": false, "message": "Internal server error" })
    );
}
