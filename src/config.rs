use axum::http::HeaderValue;
use reqwest::Url;
use std::{env, time::Duration};

/// GatewayConfig
///
/// Holds the gateway's entire configuration state. Loaded once before the listener starts
/// and never mutated afterwards; every request reads the same values through `AppState`.
/// There is no hot reload: changing a value means restarting the process.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    // Runtime environment marker. Controls which variables are mandatory.
    pub env: Env,
    // The single browser origin allowed to call the gateway with credentials.
    pub allowed_origin: HeaderValue,
    // Shared HS256 secret used to verify bearer tokens issued by the auth service.
    pub jwt_secret: String,
    // Base URLs of the four backends.
    pub auth_service_url: Url,
    pub event_service_url: Url,
    pub attendance_service_url: Url,
    pub venue_service_url: Url,
    // TCP port the listener binds on 0.0.0.0.
    pub port: u16,
    // Upper bound on how long the gateway waits for an upstream to start responding.
    pub upstream_timeout: Duration,
}

/// Env
///
/// Local runs get development fallbacks for every value; production refuses to start
/// with anything missing.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const LOCAL_ALLOWED_ORIGIN: &str = "http://localhost:5173";
const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;

impl Default for GatewayConfig {
    /// default
    ///
    /// Non-panicking configuration for tests: every backend points at the local
    /// development ports and the secret is the local fallback.
    fn default() -> Self {
        Self {
            env: Env::Local,
            allowed_origin: HeaderValue::from_static(LOCAL_ALLOWED_ORIGIN),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            auth_service_url: local_url(3001),
            event_service_url: local_url(3002),
            attendance_service_url: local_url(3003),
            venue_service_url: local_url(3004),
            port: DEFAULT_PORT,
            upstream_timeout: Duration::from_millis(DEFAULT_UPSTREAM_TIMEOUT_MS),
        }
    }
}

impl GatewayConfig {
    /// load
    ///
    /// Reads every parameter from the environment and implements the **fail-fast** principle.
    ///
    /// # Panics
    /// Panics if a variable required in the current environment is missing, or if any
    /// provided value (URL, origin, port, timeout) does not parse. A gateway with a broken
    /// route table or secret must never start serving.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let allowed_origin = required_or(env, "ALLOWED_ORIGIN", LOCAL_ALLOWED_ORIGIN);
        let allowed_origin = HeaderValue::from_str(&allowed_origin)
            .unwrap_or_else(|_| panic!("FATAL: ALLOWED_ORIGIN is not a valid header value."));

        let jwt_secret = required_or(env, "JWT_SECRET", LOCAL_JWT_SECRET);
        if jwt_secret.is_empty() {
            panic!("FATAL: JWT_SECRET must not be empty.");
        }

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .unwrap_or_else(|_| panic!("FATAL: PORT must be a valid port number, got {raw:?}.")),
            Err(_) => DEFAULT_PORT,
        };

        let timeout_ms = match env::var("UPSTREAM_TIMEOUT_MS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                panic!("FATAL: UPSTREAM_TIMEOUT_MS must be a number of milliseconds, got {raw:?}.")
            }),
            Err(_) => DEFAULT_UPSTREAM_TIMEOUT_MS,
        };

        Self {
            env,
            allowed_origin,
            jwt_secret,
            auth_service_url: service_url(env, "AUTH_SERVICE_URL", 3001),
            event_service_url: service_url(env, "EVENT_SERVICE_URL", 3002),
            attendance_service_url: service_url(env, "ATTENDANCE_SERVICE_URL", 3003),
            venue_service_url: service_url(env, "VENUE_SERVICE_URL", 3004),
            port,
            upstream_timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// Returns the variable, the local fallback when running locally, or panics in production.
fn required_or(env: Env, name: &str, local_fallback: &str) -> String {
    match (env::var(name), env) {
        (Ok(value), _) => value,
        (Err(_), Env::Local) => local_fallback.to_string(),
        (Err(_), Env::Production) => panic!("FATAL: {name} must be set in production."),
    }
}

fn service_url(env: Env, name: &str, local_port: u16) -> Url {
    let raw = required_or(env, name, &format!("http://localhost:{local_port}"));
    let url = Url::parse(&raw).unwrap_or_else(|e| panic!("FATAL: {name} is not a valid URL: {e}"));
    if !matches!(url.scheme(), "http" | "https") {
        panic!("FATAL: {name} must be an http(s) URL.");
    }
    url
}

fn local_url(port: u16) -> Url {
    Url::parse(&format!("http://localhost:{port}")).expect("static local URL is valid")
}
