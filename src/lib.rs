use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod routes;

// --- Public Re-exports ---

pub use auth::{Claims, TokenVerifier};
pub use config::GatewayConfig;
pub use cors::OriginPolicy;
pub use error::GatewayError;
pub use proxy::Forwarder;
pub use routes::{AuthPolicy, RouteDescriptor, RouteRegistry};

/// AppState
///
/// Everything a request needs, constructed once before serving and shared read-only.
/// Nothing in here is mutated after startup, so concurrent requests need no locking.
/// Tests build it with their own registry to point routes at mock upstreams.
#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub origin_policy: OriginPolicy,
    pub registry: Arc<RouteRegistry>,
    pub verifier: Arc<TokenVerifier>,
    pub forwarder: Forwarder,
}

impl AppState {
    /// Builds the standard route table and collaborators from `config`.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let registry = RouteRegistry::from_config(&config);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(
        config: GatewayConfig,
        registry: RouteRegistry,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            origin_policy: OriginPolicy::new(config.allowed_origin.clone()),
            verifier: Arc::new(TokenVerifier::new(&config.jwt_secret)),
            forwarder: Forwarder::new(config.upstream_timeout)?,
            registry: Arc::new(registry),
            config,
        })
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for OriginPolicy {
    fn from_ref(app_state: &AppState) -> OriginPolicy {
        app_state.origin_policy.clone()
    }
}

/// create_router
///
/// Assembles the gateway. Layer order, outermost first:
///
/// 1. Request id + tracing, so every log line (rejections included) is correlated.
/// 2. Panic catcher: any fault below becomes the generic JSON 500.
/// 3. Origin enforcement: foreign origins stop here with 403 and no CORS headers.
/// 4. CORS decoration and preflight answers for allowed traffic.
/// 5. Routes: `/health` locally, everything else through the dispatcher.
pub fn create_router(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");
    let cors = state.origin_policy.cors_layer();

    Router::new()
        .route("/health", get(handlers::health).fallback(handlers::not_found))
        .fallback(handlers::dispatch)
        .layer(cors)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cors::enforce_origin,
        ))
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
}

/// trace_span_logger
///
/// One span per request carrying method, URI and the `x-request-id` stamped above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
