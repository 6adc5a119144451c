use std::any::Any;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// GatewayError
///
/// Every way a request can terminate inside the gateway. Responses generated from these
/// carry only a fixed, safe message; upstream bodies, connection errors and internal
/// detail never reach the caller.
///
/// Errors returned *by* an upstream (its own 4xx/5xx) are not represented here: those are
/// relayed unchanged by the forwarder.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request's `Origin` is not the configured allowed origin.
    #[error("Origin not allowed")]
    CorsRejected,

    /// No usable `Bearer` credential was presented on a protected route.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// A credential was presented but failed signature, payload or expiry checks.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Route not found")]
    RouteNotFound,

    /// The upstream could not be reached or did not answer within the timeout.
    #[error("Upstream service unavailable")]
    UpstreamUnavailable,

    /// Anything unexpected. The detail is logged, never rendered.
    #[error("internal error: {0}")]
    Internal(String),
}

/// ErrorBody
///
/// The uniform JSON error envelope: `{"success":false,"message":"..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: &'static str,
}

impl GatewayError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::CorsRejected => StatusCode::FORBIDDEN,
            GatewayError::AuthenticationRequired | GatewayError::InvalidOrExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to callers. `Internal` always reports the same generic text.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::CorsRejected => "Origin not allowed",
            GatewayError::AuthenticationRequired => "Authentication required",
            GatewayError::InvalidOrExpiredToken => "Invalid or expired token",
            GatewayError::RouteNotFound => "Route not found",
            GatewayError::UpstreamUnavailable => "Upstream service unavailable",
            GatewayError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Internal(detail) = &self {
            tracing::error!(error = %detail, "request failed with an internal error");
        }

        let body = ErrorBody {
            success: false,
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// handle_panic
///
/// Response factory for `CatchPanicLayer`. A panic anywhere below the layer becomes the
/// same generic 500 as any other internal fault; the payload only goes to the logs.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    GatewayError::Internal(format!("handler panicked: {detail}")).into_response()
}
