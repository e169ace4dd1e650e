//! Runtime configuration.
//!
//! All fields have defaults matching the production digi.me deployment, so an
//! empty JSON object is a valid configuration.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Scheme prefix of links the digi.me app sends back; the host registers `<prefix><app id>`.
pub const RECEIVER_SCHEME_PREFIX: &str = "digime-ca-";
/// Scheme the digi.me app listens on.
pub const SENDER_SCHEME: &str = "digime-ca-master";
pub const DEFAULT_BASE_URL: &str = "https://api.digi.me/v1/";
pub const DEFAULT_KEY_IDENTIFIER: &str = "me.digi.digime.pa.rsa-private-key";
/// Longest accepted handoff timeout, in seconds.
pub const MAX_HANDOFF_TIMEOUT: u64 = i32::MAX as u64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub base_url: Url,
    pub receiver_scheme_prefix: String,
    pub sender_scheme: String,
    /// Per request timeout in seconds.
    pub request_timeout: u64,
    /// Maximum number of files fetched at the same time.
    pub download_concurrency: usize,
    /// Seconds to wait for the digi.me app to return before the pull fails. `None` waits forever.
    pub handoff_timeout: Option<u64>,
    /// Identifier of the private key in the secret store.
    pub key_identifier: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            receiver_scheme_prefix: RECEIVER_SCHEME_PREFIX.to_string(),
            sender_scheme: SENDER_SCHEME.to_string(),
            request_timeout: 30,
            download_concurrency: 4,
            handoff_timeout: None,
            key_identifier: DEFAULT_KEY_IDENTIFIER.to_string(),
        }
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "{} cannot be used as a base url",
                self.base_url
            )));
        }
        if self.receiver_scheme_prefix.is_empty() || self.sender_scheme.is_empty() {
            return Err(ConfigError::Invalid("url schemes must not be empty".into()));
        }
        if self.download_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "download concurrency must be at least 1".into(),
            ));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Invalid("request timeout must not be 0".into()));
        }
        if let Some(timeout) = self.handoff_timeout.filter(|t| *t > MAX_HANDOFF_TIMEOUT) {
            return Err(ConfigError::Invalid(format!(
                "handoff timeout of {timeout}s exceeds {MAX_HANDOFF_TIMEOUT}s"
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn handoff_timeout(&self) -> Option<Duration> {
        self.handoff_timeout.map(Duration::from_secs)
    }

    /// The scheme the host app registers to receive the digi.me app's response.
    pub fn callback_scheme(&self, app_id: &str) -> String {
        format!("{}{}", self.receiver_scheme_prefix, app_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        assert_eq!(Config::from_json_str("{}").unwrap(), Config::default());
    }

    #[test]
    fn overrides() {
        let config = Config::from_json_str(
            r#"{"baseUrl":"http://localhost:8080/api/","downloadConcurrency":1,"handoffTimeout":120}"#,
        )
        .unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:8080/api/");
        assert_eq!(config.download_concurrency, 1);
        assert_eq!(config.handoff_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.callback_scheme("myapp"), "digime-ca-myapp");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Config::from_json_str(r#"{"downloadConcurrency":0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{"baseUrl":"mailto:someone@example.com"}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{"handoffTimeout":10000000000000}"#),
            Err(ConfigError::Invalid(_))
        ));
        let longest = format!(r#"{{"handoffTimeout":{MAX_HANDOFF_TIMEOUT}}}"#);
        assert!(Config::from_json_str(&longest).is_ok());
        assert!(matches!(
            Config::from_json_str("[]"),
            Err(ConfigError::Parse(_))
        ));
    }
}
