use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientSettings {
    /// Applies command-line overrides with the same validation as the file and environment layers.
    pub fn with_overrides(
        mut self,
        api_url: Option<&str>,
        poll_interval_ms: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = api_url {
            self.api_url = normalize_api_url(v)?;
        }
        if let Some(v) = poll_interval_ms {
            self.poll_interval = poll_interval_from_millis("poll_interval_ms", v)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// Loads settings from `path` (or `./client.toml` when present) and the process environment.
pub fn load_settings(path: Option<&Path>) -> Result<ClientSettings, ConfigError> {
    let raw = match path {
        Some(path) => Some(fs::read_to_string(path).map_err(|err| ConfigError::File {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?),
        None => fs::read_to_string(DEFAULT_SETTINGS_FILE).ok(),
    };
    let source = path
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| DEFAULT_SETTINGS_FILE.to_string());

    load_settings_from(raw.as_deref(), &source, |key| std::env::var(key).ok())
}

/// Layers defaults, then the TOML file contents, then environment overrides.
pub fn load_settings_from(
    file_contents: Option<&str>,
    source: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings, ConfigError> {
    let mut settings = ClientSettings::default();

    if let Some(raw) = file_contents {
        let file_cfg = toml::from_str::<FileSettings>(raw).map_err(|err| ConfigError::File {
            path: source.to_string(),
            reason: err.to_string(),
        })?;
        if let Some(v) = file_cfg.api_url {
            settings.api_url = v;
        }
        if let Some(v) = file_cfg.poll_interval_ms {
            settings.poll_interval = poll_interval_from_millis("poll_interval_ms", v)?;
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            settings.request_timeout = Duration::from_secs(v);
        }
    }

    if let Some(v) = env("API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        let millis = parse_u64("APP__POLL_INTERVAL_MS", &v)?;
        settings.poll_interval = poll_interval_from_millis("APP__POLL_INTERVAL_MS", millis)?;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout =
            Duration::from_secs(parse_u64("APP__REQUEST_TIMEOUT_SECS", &v)?);
    }

    settings.api_url = normalize_api_url(&settings.api_url)?;
    Ok(settings)
}

fn normalize_api_url(raw_api_url: &str) -> Result<String, ConfigError> {
    let raw_api_url = raw_api_url.trim();
    if raw_api_url.is_empty() {
        return Ok(DEFAULT_API_URL.to_string());
    }

    let parsed = Url::parse(raw_api_url).map_err(|err| ConfigError::InvalidValue {
        key: "api_url".into(),
        reason: format!("{raw_api_url}: {err}"),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: "api_url".into(),
            reason: format!("{raw_api_url}: scheme must be http or https"),
        });
    }

    Ok(raw_api_url.trim_end_matches('/').to_string())
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key: key.into(),
            reason: format!("{raw}: {err}"),
        })
}

fn poll_interval_from_millis(key: &str, millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            reason: "poll interval must be greater than zero".into(),
        });
    }
    Ok(Duration::from_millis(millis))
}
