use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete entity-watch configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Subscription engine tuning
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How often the expiration sweeper runs (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Changes retained per subscription for pull queries
    #[serde(default = "default_change_log_capacity")]
    pub change_log_capacity: usize,
    /// Upper bound on one callback delivery (milliseconds)
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_ms: u64,
    /// Pending deliveries per callback before new ones are dropped
    #[serde(default = "default_callback_queue_capacity")]
    pub callback_queue_capacity: usize,
    /// Window of the global recent-changes view (seconds)
    #[serde(default = "default_recent_window")]
    pub recent_window_seconds: u64,
    /// Maximum changes held by the global recent-changes view
    #[serde(default = "default_recent_buffer_capacity")]
    pub recent_buffer_capacity: usize,
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_change_log_capacity() -> usize {
    100
}

fn default_delivery_timeout() -> u64 {
    5000
}

fn default_callback_queue_capacity() -> usize {
    256
}

fn default_recent_window() -> u64 {
    300
}

fn default_recent_buffer_capacity() -> usize {
    1000
}

impl EngineConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
            change_log_capacity: default_change_log_capacity(),
            delivery_timeout_ms: default_delivery_timeout(),
            callback_queue_capacity: default_callback_queue_capacity(),
            recent_window_seconds: default_recent_window(),
            recent_buffer_capacity: default_recent_buffer_capacity(),
        }
    }
}

/// Home Assistant connection
#[derive(Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL, e.g. "http://homeassistant.local:8123"
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Long-lived access token
    #[serde(default = "default_upstream_token")]
    pub token: String,
    /// Initial reconnect delay (seconds), doubled up to `max_backoff_seconds`
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_seconds: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
}

fn default_upstream_url() -> String {
    std::env::var("HASS_URL").unwrap_or_else(|_| "http://localhost:8123".to_string())
}

fn default_upstream_token() -> String {
    std::env::var("HASS_TOKEN").unwrap_or_default()
}

fn default_initial_backoff() -> u64 {
    1
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            token: default_upstream_token(),
            initial_backoff_seconds: default_initial_backoff(),
            max_backoff_seconds: default_max_backoff(),
        }
    }
}

// Token stays out of logs
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("initial_backoff_seconds", &self.initial_backoff_seconds)
            .field("max_backoff_seconds", &self.max_backoff_seconds)
            .finish()
    }
}

/// HTTP tool surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Buffered notifications per callback WebSocket stream
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_stream_capacity() -> usize {
    256
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            stream_capacity: default_stream_capacity(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<WatchConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: WatchConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(config)
}

/// Load from `ENTITY_WATCH_CONFIG` if set, otherwise defaults
pub fn load_from_env() -> Result<WatchConfig> {
    match std::env::var("ENTITY_WATCH_CONFIG") {
        Ok(path) => load_config(&path),
        Err(_) => Ok(WatchConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = WatchConfig::default();
        assert_eq!(config.engine.sweep_interval_seconds, 30);
        assert_eq!(config.engine.delivery_timeout(), Duration::from_secs(5));
        assert_eq!(config.engine.change_log_capacity, 100);
        assert_eq!(config.api.bind_address, "0.0.0.0:3000");
        assert_eq!(config.upstream.max_backoff_seconds, 60);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [engine]
            sweep_interval_seconds = 10
            change_log_capacity = 50
            delivery_timeout_ms = 2000
            callback_queue_capacity = 32
            recent_window_seconds = 60
            recent_buffer_capacity = 200

            [upstream]
            url = "http://ha.example.com:8123"
            token = "secret"

            [api]
            bind_address = "127.0.0.1:8080"
        "#;

        let config: WatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.sweep_interval(), Duration::from_secs(10));
        assert_eq!(config.engine.change_log_capacity, 50);
        assert_eq!(config.engine.recent_window_seconds, 60);
        assert_eq!(config.upstream.url, "http://ha.example.com:8123");
        assert_eq!(config.upstream.token, "secret");
        assert_eq!(config.upstream.initial_backoff_seconds, 1); // Default
        assert_eq!(config.api.bind_address, "127.0.0.1:8080");
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [engine]
            sweep_interval_seconds = 5
        "#;

        let config: WatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.sweep_interval_seconds, 5);
        assert_eq!(config.engine.delivery_timeout_ms, 5000); // Default
        assert_eq!(config.api.stream_capacity, 256); // Default
    }

    #[test]
    fn test_token_redacted_in_debug() {
        let config = UpstreamConfig {
            token: "super-secret".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nchange_log_capacity = 7").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.engine.change_log_capacity, 7);
    }

    #[test]
    fn test_load_config_missing_file_fails() {
        assert!(load_config("/nonexistent/entity-watch.toml").is_err());
    }
}
