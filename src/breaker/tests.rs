use super::*;
use crate::model::CircuitBreakerConfig;

fn config(threshold: u32, window_s: f64, recovery_s: f64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: threshold,
        recovery_timeout_s: recovery_s,
        failure_window_s: window_s,
        excluded_error_kinds: vec!["bad_request".into(), "auth".into(), "validation_failed".into(), "human_review_required".into()],
    }
}

#[test]
fn trips_open_after_threshold_failures() {
    let registry = BreakerRegistry::new();
    let cfg = config(3, 60.0, 30.0);
    for _ in 0..3 {
        assert!(matches!(registry.admit("http", &cfg), Admission::Allow));
        registry.on_failure("http", ErrorKind::ProviderUnavailable, &cfg);
    }
    assert!(matches!(registry.state_of("http"), BreakerState::Open));
    assert!(matches!(registry.admit("http", &cfg), Admission::Refuse));
}

#[test]
fn excluded_kinds_do_not_trip_breaker() {
    let registry = BreakerRegistry::new();
    let cfg = config(2, 60.0, 30.0);
    for _ in 0..10 {
        registry.on_failure("http", ErrorKind::ValidationFailed, &cfg);
    }
    assert!(matches!(registry.state_of("http"), BreakerState::Closed));
}

#[test]
fn half_open_probe_success_closes_breaker() {
    let registry = BreakerRegistry::new();
    let cfg = config(1, 60.0, 0.0); // recovery_timeout_s=0 so it's immediately eligible
    registry.on_failure("http", ErrorKind::Timeout, &cfg);
    assert!(matches!(registry.state_of("http"), BreakerState::Open));

    // Recovery timeout already elapsed (0s) — next admit should be a probe.
    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(matches!(registry.admit("http", &cfg), Admission::AllowProbe));
    registry.on_success("http");
    assert!(matches!(registry.state_of("http"), BreakerState::Closed));
    assert!(matches!(registry.admit("http", &cfg), Admission::Allow));
}

#[test]
fn half_open_probe_failure_reopens() {
    let registry = BreakerRegistry::new();
    let cfg = config(1, 60.0, 0.0);
    registry.on_failure("http", ErrorKind::Timeout, &cfg);
    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(matches!(registry.admit("http", &cfg), Admission::AllowProbe));
    registry.on_failure("http", ErrorKind::Timeout, &cfg);
    assert!(matches!(registry.state_of("http"), BreakerState::Open));
}

#[test]
fn independent_bindings_do_not_share_state() {
    let registry = BreakerRegistry::new();
    let cfg = config(1, 60.0, 30.0);
    registry.on_failure("cli_proxy", ErrorKind::Timeout, &cfg);
    assert!(matches!(registry.state_of("cli_proxy"), BreakerState::Open));
    assert!(matches!(registry.state_of("http_provider"), BreakerState::Closed));
}
