use event_gateway::{
    AppState,
    config::{Env, GatewayConfig},
    create_router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Boots the gateway: configuration, logging, shared state, then the listener.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = GatewayConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise debug for the gateway itself and per-request lines from tower_http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "event_gateway=debug,tower_http=info".into());

    // 3. Human-readable logs locally, JSON lines in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    // 4. Shared state: route table, token verifier and the upstream HTTP client.
    let app_state =
        AppState::new(config).expect("FATAL: Failed to build the upstream HTTP client.");
    let addr = SocketAddr::from(([0, 0, 0, 0], app_state.config.port));

    tracing::info!(
        upstream_timeout_ms = app_state.config.upstream_timeout.as_millis() as u64,
        "Gateway starting in {:?} mode",
        app_state.config.env
    );

    for route in app_state.registry.routes() {
        tracing::info!(
            prefix = %route.prefix,
            upstream = %route.upstream,
            policy = ?route.auth_policy,
            "mounted route"
        );
    }

    // 5. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {addr}: {e}"));

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");

    tracing::info!("HTTP server closed");
}

/// Resolves on SIGINT or SIGTERM so in-flight requests can drain before exit.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received: closing HTTP server"),
        _ = terminate => tracing::info!("SIGTERM received: closing HTTP server"),
    }
}
