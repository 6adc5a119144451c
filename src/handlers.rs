use axum::{
    Json,
    extract::{Request, State},
    http::header,
    response::Response,
};
use serde_json::{Value, json};

use crate::{AppState, error::GatewayError};

/// health
///
/// Liveness probe. Answers locally and never touches an upstream.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// dispatch
///
/// The gateway's request pipeline for everything that is not `/health`. Runs once the
/// origin check has already passed, then each stage either continues or ends the request:
///
/// 1. Route lookup: no matching prefix is `RouteNotFound` (404).
/// 2. Auth policy: protected sub-paths need a verified bearer token (401 otherwise).
///    Verified claims are stored on the request until it completes.
/// 3. Forward: the request goes to the upstream with the prefix stripped; connectivity
///    failures become `UpstreamUnavailable` (502).
///
/// Nothing is retried.
pub async fn dispatch(
    State(state): State<AppState>,
    mut request: Request,
) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_owned();
    let query = request.uri().query().map(str::to_owned);

    let matched = state
        .registry
        .resolve(&path)
        .ok_or(GatewayError::RouteNotFound)?;

    if matched.requires_auth() {
        let claims = state
            .verifier
            .verify_header(request.headers().get(header::AUTHORIZATION))
            .inspect_err(|e| {
                tracing::debug!(
                    prefix = %matched.route.prefix,
                    expired = e.is_expired(),
                    "rejected unauthenticated request: {e}"
                )
            })?;
        request.extensions_mut().insert(claims);
    }

    let target = matched.target_url(query.as_deref())?;

    state
        .forwarder
        .forward(matched.route, target, request)
        .await
}

/// not_found
///
/// Router fallback for local routes with the wrong method (e.g. `POST /health`).
pub async fn not_found() -> GatewayError {
    GatewayError::RouteNotFound
}
