use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tasksync_engine::SyncSettings;
use tasksync_logging::sync_info;

pub const DEFAULT_CONFIG_FILENAME: &str = "tasksync.ron";

/// On-disk settings. Durations are milliseconds; anything missing keeps the
/// engine default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub api_base: Option<String>,
    pub ws_base: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    pub first_event_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub poll_retry_delay_ms: Option<u64>,
    pub poll_ceiling_ms: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
    pub reconnect_base_delay_ms: Option<u64>,
}

/// Endpoint overrides from flags or environment; both beat the file.
#[derive(Debug, Clone, Default)]
pub struct EndpointOverrides {
    pub api_base: Option<String>,
    pub ws_base: Option<String>,
}

/// Reads the config file.
///
/// An explicit path must exist. Without one, `./tasksync.ron` is used when
/// present and defaults otherwise.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILENAME);
            if !fallback.exists() {
                return Ok(FileConfig::default());
            }
            fallback
        }
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = parse(&content).with_context(|| format!("invalid config file {}", path.display()))?;
    sync_info!("Loaded settings from {:?}", path);
    Ok(config)
}

pub fn parse(content: &str) -> Result<FileConfig> {
    Ok(ron::from_str(content)?)
}

pub fn resolve(file: &FileConfig, overrides: &EndpointOverrides) -> SyncSettings {
    let defaults = SyncSettings::default();
    let ms = |value: Option<u64>, fallback: Duration| value.map(Duration::from_millis).unwrap_or(fallback);

    let mut reconnect = defaults.reconnect;
    if let Some(max_attempts) = file.reconnect_max_attempts {
        reconnect.max_attempts = max_attempts;
    }
    reconnect.base_delay = ms(file.reconnect_base_delay_ms, reconnect.base_delay);

    SyncSettings {
        api_base: overrides
            .api_base
            .clone()
            .or_else(|| file.api_base.clone())
            .unwrap_or(defaults.api_base),
        ws_base: overrides
            .ws_base
            .clone()
            .or_else(|| file.ws_base.clone())
            .unwrap_or(defaults.ws_base),
        connect_timeout: ms(file.connect_timeout_ms, defaults.connect_timeout),
        request_timeout: ms(file.request_timeout_ms, defaults.request_timeout),
        heartbeat_interval: ms(file.heartbeat_interval_ms, defaults.heartbeat_interval),
        first_event_timeout: ms(file.first_event_timeout_ms, defaults.first_event_timeout),
        poll_interval: ms(file.poll_interval_ms, defaults.poll_interval),
        poll_retry_delay: ms(file.poll_retry_delay_ms, defaults.poll_retry_delay),
        poll_ceiling: file.poll_ceiling_ms.map(Duration::from_millis).or(defaults.poll_ceiling),
        reconnect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_keeps_defaults() {
        let config = parse("()").unwrap();
        assert_eq!(resolve(&config, &EndpointOverrides::default()), SyncSettings::default());
    }

    #[test]
    fn file_values_are_milliseconds() {
        let config = parse(
            r#"(
                api_base: Some("http://tasks.local:9000"),
                poll_interval_ms: Some(500),
                poll_ceiling_ms: Some(60000),
                reconnect_max_attempts: Some(2),
                reconnect_base_delay_ms: Some(100),
            )"#,
        )
        .unwrap();
        let settings = resolve(&config, &EndpointOverrides::default());

        assert_eq!(settings.api_base, "http://tasks.local:9000");
        assert_eq!(settings.ws_base, "ws://localhost:8000");
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.poll_ceiling, Some(Duration::from_secs(60)));
        assert_eq!(settings.reconnect.max_attempts, 2);
        assert_eq!(settings.reconnect.base_delay, Duration::from_millis(100));
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn overrides_beat_the_file() {
        let config = FileConfig {
            api_base: Some("http://from-file".to_string()),
            ws_base: Some("ws://from-file".to_string()),
            ..FileConfig::default()
        };
        let overrides = EndpointOverrides {
            api_base: Some("http://from-flag".to_string()),
            ws_base: None,
        };
        let settings = resolve(&config, &overrides);
        assert_eq!(settings.api_base, "http://from-flag");
        assert_eq!(settings.ws_base, "ws://from-file");
    }

    #[test]
    fn explicit_path_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(ws_base: Some(\"wss://push.example\"))").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.ws_base.as_deref(), Some("wss://push.example"));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("absent.ron"))).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(parse("(poll_interval_ms: \"soon\")").is_err());
    }
}
