//! Client configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! then `BARB__*` environment variables (`__` separates nested keys, e.g.
//! `BARB__LOGGING__LEVEL=debug`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

pub const APP_NAME: &str = "barb";

const ENV_PREFIX: &str = "BARB";

/// Settings shared by the API client, stream client and session controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server base URL, without a trailing slash.
    pub api_url: String,

    /// Bearer token. Usually supplied per invocation rather than stored.
    pub token: Option<String>,

    /// Instrument used when the first send has to create a conversation.
    pub instrument: String,

    /// Whole-request timeout. Unset by default because event streams are
    /// long-lived; stalled streams are then bounded only by the connection.
    pub request_timeout_secs: Option<u64>,

    pub connect_timeout_secs: u64,

    /// Number of conversations whose history is kept in memory.
    pub history_cache_capacity: usize,

    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            token: None,
            instrument: "NQ".to_string(),
            request_timeout_secs: None,
            connect_timeout_secs: 10,
            history_cache_capacity: crate::session::DEFAULT_CACHE_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// `$XDG_CONFIG_HOME/barb/config.toml` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
    }

    /// Load from `path` (or the default path) layered with the environment.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> ClientResult<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("api_url", defaults.api_url.as_str())?
            .set_default("instrument", defaults.instrument.as_str())?
            .set_default("connect_timeout_secs", defaults.connect_timeout_secs as i64)?
            .set_default("history_cache_capacity", defaults.history_cache_capacity as i64)?
            .set_default("logging.level", defaults.logging.level.as_str())?;

        if let Some(path) = path {
            log::debug!("loading config from {}", path.display());
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let built = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let mut config: ClientConfig = built.try_deserialize()?;
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Build the HTTP client every request goes through.
    pub fn http_client(&self) -> ClientResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .user_agent(concat!("barb-client/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.instrument, "NQ");
        assert_eq!(config.history_cache_capacity, 10);
        assert_eq!(config.request_timeout_secs, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
api_url = "https://barb.example.com/"
instrument = "ES"
request_timeout_secs = 120

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.api_url, "https://barb.example.com");
        assert_eq!(config.instrument, "ES");
        assert_eq!(config.request_timeout_secs, Some(120));
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.history_cache_capacity, 10);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_http_client_builds() {
        assert!(ClientConfig::default().http_client().is_ok());
    }
}
