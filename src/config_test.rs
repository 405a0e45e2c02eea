use super::*;

/// # Safety
/// Env-mutating tests share one lock so they never race each other.
unsafe fn clear_courier_env() {
    unsafe {
        for key in [
            "COURIER_API_URL",
            "COURIER_SOCKET_URL",
            "COURIER_SESSION_FILE",
            "COURIER_RECONNECT",
            "COURIER_RECONNECT_DELAY_MS",
            "COURIER_RECONNECT_DELAY_MAX_MS",
            "COURIER_RECONNECT_ATTEMPTS",
            "COURIER_RECONNECT_JITTER",
            "COURIER_CONNECT_TIMEOUT_MS",
            "COURIER_REQUEST_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }
}

static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[test]
fn socket_url_strips_api_suffix() {
    assert_eq!(socket_url_from_api("http://localhost:5000/api"), "http://localhost:5000");
    assert_eq!(socket_url_from_api("https://courier.test/api/"), "https://courier.test");
    assert_eq!(socket_url_from_api("https://courier.test"), "https://courier.test");
}

#[test]
fn default_policy_matches_stock_reconnection() {
    let policy = ReconnectPolicy::default();
    assert!(policy.enabled);
    assert_eq!(policy.delay, Duration::from_millis(1_000));
    assert_eq!(policy.delay_max, Duration::from_millis(5_000));
    assert_eq!(policy.attempts, 5);
}

#[test]
fn from_env_defaults() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe { clear_courier_env() };

    let cfg = ClientConfig::from_env();
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.socket_url, "http://localhost:5000");
    assert_eq!(cfg.session_file, Some(PathBuf::from(DEFAULT_SESSION_FILE)));
    assert_eq!(cfg.reconnect, ReconnectPolicy::default());
    assert_eq!(cfg.connect_timeout, Duration::from_secs(20));
    assert_eq!(cfg.request_timeout, Duration::from_secs(30));
}

#[test]
fn from_env_parses_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe {
        clear_courier_env();
        std::env::set_var("COURIER_API_URL", "https://courier.test/api/");
        std::env::set_var("COURIER_SOCKET_URL", "https://rt.courier.test/");
        std::env::set_var("COURIER_SESSION_FILE", "");
        std::env::set_var("COURIER_RECONNECT", "false");
        std::env::set_var("COURIER_RECONNECT_DELAY_MS", "250");
        std::env::set_var("COURIER_RECONNECT_DELAY_MAX_MS", "750");
        std::env::set_var("COURIER_RECONNECT_ATTEMPTS", "9");
        std::env::set_var("COURIER_RECONNECT_JITTER", "3.5");
        std::env::set_var("COURIER_REQUEST_TIMEOUT_SECS", "7");
    }

    let cfg = ClientConfig::from_env();
    assert_eq!(cfg.api_url, "https://courier.test/api");
    assert_eq!(cfg.socket_url, "https://rt.courier.test");
    assert_eq!(cfg.session_file, None);
    assert!(!cfg.reconnect.enabled);
    assert_eq!(cfg.reconnect.delay, Duration::from_millis(250));
    assert_eq!(cfg.reconnect.delay_max, Duration::from_millis(750));
    assert_eq!(cfg.reconnect.attempts, 9);
    assert!((cfg.reconnect.randomization - 1.0).abs() < f64::EPSILON);
    assert_eq!(cfg.request_timeout, Duration::from_secs(7));

    unsafe { clear_courier_env() };
}

#[test]
fn from_env_ignores_unparseable_numbers() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe {
        clear_courier_env();
        std::env::set_var("COURIER_RECONNECT_ATTEMPTS", "many");
        std::env::set_var("COURIER_RECONNECT_JITTER", "NaN");
    }

    let cfg = ClientConfig::from_env();
    assert_eq!(cfg.reconnect.attempts, DEFAULT_RECONNECT_ATTEMPTS);
    assert!((cfg.reconnect.randomization - DEFAULT_RECONNECT_JITTER).abs() < f64::EPSILON);

    unsafe { clear_courier_env() };
}
