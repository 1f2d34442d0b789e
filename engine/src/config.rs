//! Sync configuration loaded from environment variables.

use crate::sync::SessionOptions;
use std::env;
use std::time::Duration;

/// Remote endpoint and session defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// WebSocket URL of the sync server
    pub remote: Option<String>,
    /// Deadline applied to every push and pull session
    pub session_timeout: Option<Duration>,
}

impl SyncConfig {
    /// Load configuration from `SYNCDB_REMOTE` and
    /// `SYNCDB_SESSION_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let remote = lookup("SYNCDB_REMOTE").filter(|url| !url.trim().is_empty());

        let session_timeout = match lookup("SYNCDB_SESSION_TIMEOUT_MS") {
            Some(raw) => {
                let millis: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
                if millis == 0 {
                    return Err(ConfigError::InvalidTimeout(raw));
                }
                Some(Duration::from_millis(millis))
            }
            None => None,
        };

        Ok(Self {
            remote,
            session_timeout,
        })
    }

    /// Session options carrying the configured timeout.
    pub fn session_options(&self) -> SessionOptions {
        match self.session_timeout {
            Some(timeout) => SessionOptions::new().with_timeout(timeout),
            None => SessionOptions::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid SYNCDB_SESSION_TIMEOUT_MS value: {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert!(config.session_options().timeout.is_none());
    }

    #[test]
    fn full_environment() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("SYNCDB_REMOTE", "ws://localhost:3000/sync"),
            ("SYNCDB_SESSION_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();

        assert_eq!(config.remote.as_deref(), Some("ws://localhost:3000/sync"));
        assert_eq!(config.session_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(
            config.session_options().timeout,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn blank_remote_is_ignored() {
        let config = SyncConfig::from_lookup(lookup(&[("SYNCDB_REMOTE", "  ")])).unwrap();
        assert!(config.remote.is_none());
    }

    #[test]
    fn invalid_timeout() {
        for raw in ["soon", "-5", "0"] {
            let result = SyncConfig::from_lookup(lookup(&[("SYNCDB_SESSION_TIMEOUT_MS", raw)]));
            assert!(matches!(result, Err(ConfigError::InvalidTimeout(_))));
        }
    }
}
