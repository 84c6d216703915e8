use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::reconciler::FailedSendPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_url: String,
    /// `None` means requests may wait forever.
    pub request_timeout: Option<Duration>,
    pub failed_send: FailedSendPolicy,
    pub access_token: Option<String>,
    pub id_token: Option<String>,
}

impl Config {
    /// Reads the process environment. Call `dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url =
            lookup("MESSAGES_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = match lookup("MESSAGES_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().with_context(|| {
                format!("MESSAGES_REQUEST_TIMEOUT_SECS is not a number: {:?}", raw)
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let request_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let failed_send = match lookup("MESSAGES_FAILED_SEND").as_deref().map(str::trim) {
            None | Some("") | Some("keep") => FailedSendPolicy::Keep,
            Some("rollback") => FailedSendPolicy::Rollback,
            Some(other) => bail!(
                "MESSAGES_FAILED_SEND must be 'keep' or 'rollback', got {:?}",
                other
            ),
        };

        Ok(Config {
            base_url,
            request_timeout,
            failed_send,
            access_token: lookup("MESSAGES_ACCESS_TOKEN").filter(|t| !t.is_empty()),
            id_token: lookup("MESSAGES_ID_TOKEN").filter(|t| !t.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
        assert_eq!(cfg.failed_send, FailedSendPolicy::Keep);
        assert_eq!(cfg.access_token, None);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("MESSAGES_API_BASE_URL", "https://api.example.com"),
            ("MESSAGES_REQUEST_TIMEOUT_SECS", "0"),
            ("MESSAGES_FAILED_SEND", "rollback"),
            ("MESSAGES_ACCESS_TOKEN", "abc"),
        ])
        .unwrap();
        assert_eq!(cfg.base_url, "https://api.example.com");
        assert_eq!(cfg.request_timeout, None);
        assert_eq!(cfg.failed_send, FailedSendPolicy::Rollback);
        assert_eq!(cfg.access_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_bad_values_are_errors() {
        assert!(config(&[("MESSAGES_REQUEST_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config(&[("MESSAGES_FAILED_SEND", "retry")]).is_err());
    }
}
