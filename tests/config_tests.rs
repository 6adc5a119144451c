use event_gateway::{GatewayConfig, config::Env};
use serial_test::serial;
use std::{env, panic, time::Duration};

const GATEWAY_VARS: [&str; 9] = [
    "APP_ENV",
    "ALLOWED_ORIGIN",
    "JWT_SECRET",
    "AUTH_SERVICE_URL",
    "EVENT_SERVICE_URL",
    "ATTENDANCE_SERVICE_URL",
    "VENUE_SERVICE_URL",
    "PORT",
    "UPSTREAM_TIMEOUT_MS",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with exactly `vars` set (every other gateway variable cleared), then
/// restores the original environment, even if the test panicked.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> std::thread::Result<R>
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> = GATEWAY_VARS
        .iter()
        .map(|&var| (var, env::var(var).ok()))
        .collect();

    unsafe {
        for var in GATEWAY_VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    for (key, original_value) in originals {
        unsafe {
            match original_value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }

    result
}

const PRODUCTION_VARS: [(&str, &str); 7] = [
    ("APP_ENV", "production"),
    ("ALLOWED_ORIGIN", "https://events.example.test"),
    ("JWT_SECRET", "prod-secret"),
    ("AUTH_SERVICE_URL", "http://auth-service:3001"),
    ("EVENT_SERVICE_URL", "http://event-service:3002"),
    ("ATTENDANCE_SERVICE_URL", "http://attendance-service:3003"),
    ("VENUE_SERVICE_URL", "http://venue-service:3004"),
];

// --- Tests ---

#[test]
#[serial]
fn test_local_env_defaults() {
    let config = run_with_env(&[], GatewayConfig::load).expect("local config loads");

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.allowed_origin, "http://localhost:5173");
    assert_eq!(config.jwt_secret, "super-secure-test-secret-value-local");
    assert_eq!(config.auth_service_url.as_str(), "http://localhost:3001/");
    assert_eq!(config.venue_service_url.as_str(), "http://localhost:3004/");
    assert_eq!(config.port, 3000);
    assert_eq!(config.upstream_timeout, Duration::from_secs(30));
}

#[test]
#[serial]
fn test_production_loads_all_values() {
    let mut vars = PRODUCTION_VARS.to_vec();
    vars.push(("PORT", "8080"));
    vars.push(("UPSTREAM_TIMEOUT_MS", "1500"));

    let config = run_with_env(&vars, GatewayConfig::load).expect("production config loads");

    assert_eq!(config.env, Env::Production);
    assert_eq!(config.allowed_origin, "https://events.example.test");
    assert_eq!(config.jwt_secret, "prod-secret");
    assert_eq!(config.event_service_url.host_str(), Some("event-service"));
    assert_eq!(config.attendance_service_url.port(), Some(3003));
    assert_eq!(config.port, 8080);
    assert_eq!(config.upstream_timeout, Duration::from_millis(1500));
}

#[test]
#[serial]
fn test_production_fail_fast_on_each_missing_value() {
    for missing in PRODUCTION_VARS.iter().skip(1).map(|(key, _)| *key) {
        let vars: Vec<(&str, &str)> = PRODUCTION_VARS
            .iter()
            .copied()
            .filter(|(key, _)| *key != missing)
            .collect();

        let result = run_with_env(&vars, GatewayConfig::load);

        assert!(
            result.is_err(),
            "Production config loading should panic without {missing}"
        );
    }
}

#[test]
#[serial]
fn test_invalid_values_fail_fast_even_locally() {
    let invalid: [(&str, &str); 5] = [
        ("EVENT_SERVICE_URL", "not a url"),
        ("VENUE_SERVICE_URL", "ftp://venue:21"),
        ("PORT", "eighty"),
        ("UPSTREAM_TIMEOUT_MS", "-1"),
        ("ALLOWED_ORIGIN", "http://bad\norigin"),
    ];

    for (key, value) in invalid {
        let result = run_with_env(&[(key, value)], GatewayConfig::load);
        assert!(result.is_err(), "{key}={value:?} should be rejected");
    }
}

#[test]
fn test_default_config_is_local() {
    let config = GatewayConfig::default();

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.event_service_url.as_str(), "http://localhost:3002/");
    assert!(!config.jwt_secret.is_empty());
}
