use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::GatewayError;

/// OriginPolicy
///
/// One allowed browser origin, compared byte-for-byte against the `Origin` header.
/// Requests without an `Origin` (server-to-server, same-origin tools) are allowed.
#[derive(Clone, Debug)]
pub struct OriginPolicy {
    allowed: HeaderValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginDecision {
    Allow,
    Reject,
}

impl OriginPolicy {
    pub fn new(allowed: HeaderValue) -> Self {
        Self { allowed }
    }

    pub fn check(&self, origin: Option<&HeaderValue>) -> OriginDecision {
        match origin {
            None => OriginDecision::Allow,
            Some(origin) if origin == self.allowed => OriginDecision::Allow,
            Some(_) => OriginDecision::Reject,
        }
    }

    /// cors_layer
    ///
    /// Decorates allowed traffic with credentialed CORS headers and answers preflights.
    /// Only ever sees requests `enforce_origin` already let through, so echoing the
    /// configured origin is the same as echoing the request's.
    pub fn cors_layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(self.allowed.clone()))
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    }
}

/// enforce_origin
///
/// First stage of the pipeline. A foreign `Origin` terminates the request with 403 before
/// routing, authentication or CORS decoration run, for preflights and normal requests alike.
/// The rejection carries no `Access-Control-*` headers.
pub async fn enforce_origin(
    State(policy): State<OriginPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN);

    if policy.check(origin) == OriginDecision::Reject {
        tracing::debug!(
            origin = ?origin,
            method = %request.method(),
            "rejected request from disallowed origin"
        );
        return GatewayError::CorsRejected.into_response();
    }

    next.run(request).await
}
