//! Client configuration parsed from environment variables.
//!
//! Every knob has a default, so an empty environment yields a config that
//! talks to a backend on `localhost:5000` with the stock reconnection policy.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_SESSION_FILE: &str = ".courierhub-session.json";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5_000;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_JITTER: f64 = 0.5;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How the realtime connection retries after losing its transport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// Whether to reconnect at all.
    pub enabled: bool,
    /// Delay before the first reconnection attempt.
    pub delay: Duration,
    /// Upper bound for the exponentially growing delay.
    pub delay_max: Duration,
    /// Attempts before giving up; counter resets after a successful connect.
    pub attempts: u32,
    /// Jitter factor in `[0, 1]` applied to each delay.
    pub randomization: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            delay_max: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MAX_MS),
            attempts: DEFAULT_RECONNECT_ATTEMPTS,
            randomization: DEFAULT_RECONNECT_JITTER,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// REST base URL including the `/api` prefix.
    pub api_url: String,
    /// Realtime origin; the API URL without its `/api` suffix unless overridden.
    pub socket_url: String,
    /// Where the session (token + user) is persisted between runs.
    pub session_file: Option<PathBuf>,
    pub reconnect: ReconnectPolicy,
    /// Deadline for the transport handshake and namespace acknowledgement.
    pub connect_timeout: Duration,
    /// Per-request deadline for REST calls.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_api_url(DEFAULT_API_URL)
    }
}

impl ClientConfig {
    /// Defaults pointed at a specific API URL.
    #[must_use]
    pub fn for_api_url(api_url: &str) -> Self {
        let api_url = api_url.trim_end_matches('/').to_owned();
        Self {
            socket_url: socket_url_from_api(&api_url),
            api_url,
            session_file: Some(PathBuf::from(DEFAULT_SESSION_FILE)),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `COURIER_API_URL`: default `http://localhost:5000/api`
    /// - `COURIER_SOCKET_URL`: default is the API URL minus `/api`
    /// - `COURIER_SESSION_FILE`: default `.courierhub-session.json`; empty disables persistence
    /// - `COURIER_RECONNECT`: `false` disables reconnection
    /// - `COURIER_RECONNECT_DELAY_MS`: default 1000
    /// - `COURIER_RECONNECT_DELAY_MAX_MS`: default 5000
    /// - `COURIER_RECONNECT_ATTEMPTS`: default 5
    /// - `COURIER_RECONNECT_JITTER`: default 0.5, clamped to `[0, 1]`
    /// - `COURIER_CONNECT_TIMEOUT_MS`: default 20000
    /// - `COURIER_REQUEST_TIMEOUT_SECS`: default 30
    #[must_use]
    pub fn from_env() -> Self {
        let api_url = std::env::var("COURIER_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let mut config = Self::for_api_url(&api_url);

        if let Some(socket_url) = env_non_empty("COURIER_SOCKET_URL") {
            config.socket_url = socket_url.trim_end_matches('/').to_owned();
        }
        config.session_file = match std::env::var("COURIER_SESSION_FILE") {
            Ok(path) if path.is_empty() => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => Some(PathBuf::from(DEFAULT_SESSION_FILE)),
        };
        config.reconnect = ReconnectPolicy {
            enabled: env_parse_bool("COURIER_RECONNECT", true),
            delay: Duration::from_millis(env_parse_u64("COURIER_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS)),
            delay_max: Duration::from_millis(env_parse_u64(
                "COURIER_RECONNECT_DELAY_MAX_MS",
                DEFAULT_RECONNECT_DELAY_MAX_MS,
            )),
            attempts: env_parse_u32("COURIER_RECONNECT_ATTEMPTS", DEFAULT_RECONNECT_ATTEMPTS),
            randomization: env_parse_f64("COURIER_RECONNECT_JITTER", DEFAULT_RECONNECT_JITTER).clamp(0.0, 1.0),
        };
        config.connect_timeout =
            Duration::from_millis(env_parse_u64("COURIER_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS));
        config.request_timeout =
            Duration::from_secs(env_parse_u64("COURIER_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS));
        config
    }
}

/// Strip a trailing `/api` segment to get the realtime origin.
#[must_use]
pub fn socket_url_from_api(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    trimmed.strip_suffix("/api").unwrap_or(trimmed).to_owned()
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_parse_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_parse_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("1" | "true" | "yes") => true,
        Some("0" | "false" | "no") => false,
        _ => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
