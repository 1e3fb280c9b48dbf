use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Gateway-wide configuration, sourced from environment variables per the
/// table in spec §6. Unlike the project-scoped TOML config this crate's
/// ancestor loaded from `.csa/config.toml`, the gateway is a long-running
/// daemon configured once at process start, so every field is read from
/// `std::env` with a typed default rather than from a file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_session_timeout")]
    pub session_idle_secs: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup_timeout_secs: u64,
    #[serde(default = "default_max_buffer_size")]
    pub max_session_backlog_bytes: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub history_backend_url: Option<String>,
    #[serde(default)]
    pub hooks_config: Option<PathBuf>,
}

fn default_port() -> u16 {
    8003
}
fn default_max_sessions() -> usize {
    100
}
fn default_session_timeout() -> u64 {
    3600
}
fn default_stream_timeout() -> u64 {
    600
}
fn default_cleanup_timeout() -> u64 {
    10
}
fn default_max_buffer_size() -> usize {
    8 * 1024 * 1024
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_sessions: default_max_sessions(),
            session_idle_secs: default_session_timeout(),
            stream_timeout_secs: default_stream_timeout(),
            cleanup_timeout_secs: default_cleanup_timeout(),
            max_session_backlog_bytes: default_max_buffer_size(),
            log_level: default_log_level(),
            history_backend_url: None,
            hooks_config: None,
        }
    }
}

impl GatewayConfig {
    /// Build configuration by layering environment variables over defaults.
    /// Mirrors the `#[serde(default = "fn_name")]`-driven defaulting idiom
    /// this workspace already uses for TOML config, sourced from `std::env`
    /// instead.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parsed("PORT").unwrap_or(defaults.port),
            max_sessions: env_parsed("MAX_SESSIONS").unwrap_or(defaults.max_sessions),
            session_idle_secs: env_parsed("SESSION_TIMEOUT").unwrap_or(defaults.session_idle_secs),
            stream_timeout_secs: env_parsed("STREAM_TIMEOUT").unwrap_or(defaults.stream_timeout_secs),
            cleanup_timeout_secs: env_parsed("CLEANUP_TIMEOUT")
                .unwrap_or(defaults.cleanup_timeout_secs),
            max_session_backlog_bytes: env_parsed("MAX_BUFFER_SIZE")
                .unwrap_or(defaults.max_session_backlog_bytes),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            history_backend_url: std::env::var("HISTORY_BACKEND_URL").ok(),
            hooks_config: std::env::var("HOOKS_CONFIG").ok().map(PathBuf::from),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable access is process-global; serialize tests that
    // touch it so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "PORT",
            "MAX_SESSIONS",
            "SESSION_TIMEOUT",
            "STREAM_TIMEOUT",
            "CLEANUP_TIMEOUT",
            "MAX_BUFFER_SIZE",
            "LOG_LEVEL",
            "HISTORY_BACKEND_URL",
            "HOOKS_CONFIG",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn defaults_match_spec_table() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let cfg = GatewayConfig::from_env();
        assert_eq!(cfg.port, 8003);
        assert_eq!(cfg.max_sessions, 100);
        assert_eq!(cfg.session_idle_secs, 3600);
        assert_eq!(cfg.stream_timeout_secs, 600);
        assert_eq!(cfg.cleanup_timeout_secs, 10);
        assert_eq!(cfg.max_session_backlog_bytes, 8_388_608);
        assert_eq!(cfg.log_level, "INFO");
        assert!(cfg.history_backend_url.is_none());
    }

    #[test]
    fn env_overrides_are_applied() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("PORT", "9100");
            std::env::set_var("MAX_SESSIONS", "7");
            std::env::set_var("HISTORY_BACKEND_URL", "https://history.internal");
        }
        let cfg = GatewayConfig::from_env();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.max_sessions, 7);
        assert_eq!(
            cfg.history_backend_url.as_deref(),
            Some("https://history.internal")
        );
        clear_env();
    }

    #[test]
    fn malformed_env_value_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("PORT", "not-a-port") };
        let cfg = GatewayConfig::from_env();
        assert_eq!(cfg.port, 8003);
        clear_env();
    }
}
