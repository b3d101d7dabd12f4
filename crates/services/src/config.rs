use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MUTATION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STALE_SECS: u64 = 30;

/// Connection and timing settings for the progress API.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    /// Bound for read requests and the access ping.
    pub request_timeout: Duration,
    /// Bound for the progress write, kept below `request_timeout`.
    pub mutation_timeout: Duration,
    /// How long a cached query counts as fresh.
    pub stale_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            mutation_timeout: Duration::from_secs(DEFAULT_MUTATION_TIMEOUT_SECS),
            stale_time: Duration::from_secs(DEFAULT_STALE_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl ApiConfig {
    /// Read settings from `LMS_*` environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |key: &str, default: u64| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map_or(Duration::from_secs(default), Duration::from_secs)
        };

        Self {
            base_url: lookup("LMS_API_BASE_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            auth_token: lookup("LMS_API_TOKEN").filter(|token| !token.trim().is_empty()),
            request_timeout: secs("LMS_API_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            mutation_timeout: secs("LMS_PROGRESS_TIMEOUT_SECS", DEFAULT_MUTATION_TIMEOUT_SECS),
            stale_time: secs("LMS_PROGRESS_STALE_SECS", DEFAULT_STALE_SECS),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Absolute URL for an API path such as `progress/module/{id}`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ApiConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ApiConfig::default());
        assert!(config.mutation_timeout < config.request_timeout);
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("LMS_API_BASE_URL", "https://lms.example.com/api/"),
            ("LMS_API_TOKEN", "secret"),
            ("LMS_PROGRESS_TIMEOUT_SECS", "5"),
            ("LMS_API_TIMEOUT_SECS", "soon"),
            ("LMS_PROGRESS_STALE_SECS", "0"),
        ]));

        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.mutation_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.stale_time, Duration::from_secs(30));
        assert_eq!(
            config.endpoint("/progress"),
            "https://lms.example.com/api/progress"
        );
    }
}
