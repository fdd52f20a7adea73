use crate::core::{EntityKind, Result, StoreError};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// What a failed fetch does to the kind's current collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep showing the last good collection.
    #[default]
    #[serde(alias = "retain")]
    RetainStale,
    /// Empty the collection; the snapshot is still kept for diffing.
    #[serde(alias = "clear")]
    ClearOnFailure,
}

impl FailurePolicy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "retain" | "retain_stale" | "retain-stale" => Ok(Self::RetainStale),
            "clear" | "clear_on_failure" | "clear-on-failure" => Ok(Self::ClearOnFailure),
            other => Err(StoreError::Config(format!(
                "unknown failure policy '{}' (expected 'retain' or 'clear')",
                other
            ))),
        }
    }
}

/// Store configuration
///
/// Built with chained setters, read from `AGROVIEW_*` environment variables,
/// or deserialised from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Applied uniformly to every kind
    pub failure_policy: FailurePolicy,

    /// Interval between scheduler ticks; zero means a single initial load
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Buffer of the change broadcast channel
    pub change_capacity: usize,

    /// Base URL of the platform API, e.g. `http://localhost:5000/api`
    pub api_base_url: Option<String>,

    /// Bearer token sent with every request
    pub api_token: Option<String>,

    #[serde(with = "millis")]
    pub request_timeout: Duration,

    /// Replaces a kind's tracked fields
    pub tracked_overrides: HashMap<EntityKind, Vec<String>>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            failure_policy: FailurePolicy::RetainStale,
            poll_interval: Duration::from_secs(30),
            change_capacity: 64,
            api_base_url: None,
            api_token: None,
            request_timeout: Duration::from_secs(10),
            tracked_overrides: HashMap::new(),
        }
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn change_capacity(mut self, capacity: usize) -> Self {
        self.change_capacity = capacity;
        self
    }

    pub fn api_base_url(mut self, url: &str) -> Self {
        self.api_base_url = Some(url.to_string());
        self
    }

    pub fn api_token(mut self, token: &str) -> Self {
        self.api_token = Some(token.to_string());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn track(mut self, kind: EntityKind, fields: &[&str]) -> Self {
        self.tracked_overrides
            .insert(kind, fields.iter().map(|field| field.to_string()).collect());
        self
    }

    /// Tracked fields for `kind`, honouring overrides.
    pub fn tracked_fields(&self, kind: EntityKind) -> Vec<String> {
        match self.tracked_overrides.get(&kind) {
            Some(fields) => fields.clone(),
            None => kind
                .schema()
                .tracked
                .iter()
                .map(|field| field.to_string())
                .collect(),
        }
    }

    /// Read `AGROVIEW_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup("AGROVIEW_POLL_INTERVAL_MS") {
            let millis = raw.trim().parse::<u64>().map_err(|_| {
                StoreError::Config(format!("AGROVIEW_POLL_INTERVAL_MS is not a number: {}", raw))
            })?;
            config.poll_interval = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("AGROVIEW_FAILURE_POLICY") {
            config.failure_policy = FailurePolicy::parse(&raw)?;
        }

        if let Some(raw) = lookup("AGROVIEW_CHANGE_CAPACITY") {
            config.change_capacity = raw.trim().parse::<usize>().map_err(|_| {
                StoreError::Config(format!("AGROVIEW_CHANGE_CAPACITY is not a number: {}", raw))
            })?;
        }

        if let Some(url) = lookup("AGROVIEW_API_URL").filter(|url| !url.trim().is_empty()) {
            config.api_base_url = Some(url.trim().to_string());
        }

        if let Some(token) = lookup("AGROVIEW_API_TOKEN").filter(|token| !token.is_empty()) {
            config.api_token = Some(token);
        }

        if let Some(raw) = lookup("AGROVIEW_REQUEST_TIMEOUT_MS") {
            let millis = raw.trim().parse::<u64>().map_err(|_| {
                StoreError::Config(format!("AGROVIEW_REQUEST_TIMEOUT_MS is not a number: {}", raw))
            })?;
            config.request_timeout = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| StoreError::Config(format!("invalid config file: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.change_capacity == 0 {
            return Err(StoreError::Config("change_capacity must be > 0".to_string()));
        }

        if self.request_timeout.is_zero() {
            return Err(StoreError::Config("request_timeout must be > 0".to_string()));
        }

        if let Some(url) = &self.api_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(StoreError::Config(format!(
                    "api_base_url must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }

        for (kind, fields) in &self.tracked_overrides {
            if fields.iter().any(|field| field.trim().is_empty()) {
                return Err(StoreError::Config(format!(
                    "tracked fields for {} cannot be empty",
                    kind
                )));
            }
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
