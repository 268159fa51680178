//! Processor configuration.
//!
//! Every tunable has a default matching the production deployment and can be
//! overridden from the environment (see [`ProcessorConfig::from_env`]).

use std::time::Duration;

use fitcheck_core::RateLimitPolicy;

pub const ENV_RATE_LIMIT: &str = "RATE_LIMIT";
pub const ENV_WINDOW_DURATION_MS: &str = "WINDOW_DURATION_MS";
pub const ENV_QUEUE_NAME: &str = "QUEUE_NAME";
pub const ENV_REQUEUE_DELAY_SECONDS: &str = "REQUEUE_DELAY_SECONDS";
pub const ENV_API_NAME: &str = "RATE_LIMIT_API_NAME";
pub const ENV_POP_TIMEOUT_MS: &str = "POP_TIMEOUT_MS";
pub const ENV_TICK_INTERVAL_MS: &str = "TICK_INTERVAL_MS";
pub const ENV_SHUTDOWN_GRACE_MS: &str = "SHUTDOWN_GRACE_MS";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Queue processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Max requests per window
    pub rate_limit: u32,
    /// Fixed window size
    pub window: Duration,
    /// Queue drained by the processor
    pub queue_name: String,
    /// Ledger key of the rate-limited external API
    pub api_name: String,
    /// Delay applied to requeued jobs
    pub requeue_delay: Duration,
    /// Upper bound for a single queue pop
    pub pop_timeout: Duration,
    /// Scheduler period between `run_once` calls
    pub tick_interval: Duration,
    /// How long shutdown waits for dispatched jobs before cancelling and requeueing them
    pub shutdown_grace: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            rate_limit: 5,
            window: Duration::from_secs(60),
            queue_name: "image_generation".to_string(),
            api_name: "openai_image_generation".to_string(),
            requeue_delay: Duration::from_secs(10),
            pop_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ProcessorConfig {
    pub fn with_rate_limit(mut self, limit: u32) -> Self {
        self.rate_limit = limit;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(self.rate_limit, self.window)
    }

    /// Load from process environment, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(limit) = parse_number::<u32, _>(&lookup, ENV_RATE_LIMIT)? {
            config.rate_limit = limit;
        }
        if let Some(ms) = parse_number::<u64, _>(&lookup, ENV_WINDOW_DURATION_MS)? {
            if ms == 0 {
                return Err(invalid(ENV_WINDOW_DURATION_MS, "0", "window must be positive"));
            }
            config.window = Duration::from_millis(ms);
        }
        if let Some(name) = non_blank(&lookup, ENV_QUEUE_NAME)? {
            config.queue_name = name;
        }
        if let Some(name) = non_blank(&lookup, ENV_API_NAME)? {
            config.api_name = name;
        }
        if let Some(secs) = parse_number::<u64, _>(&lookup, ENV_REQUEUE_DELAY_SECONDS)? {
            config.requeue_delay = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_number::<u64, _>(&lookup, ENV_POP_TIMEOUT_MS)? {
            if ms == 0 {
                return Err(invalid(ENV_POP_TIMEOUT_MS, "0", "timeout must be positive"));
            }
            config.pop_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_number::<u64, _>(&lookup, ENV_TICK_INTERVAL_MS)? {
            if ms == 0 {
                return Err(invalid(ENV_TICK_INTERVAL_MS, "0", "interval must be positive"));
            }
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_number::<u64, _>(&lookup, ENV_SHUTDOWN_GRACE_MS)? {
            config.shutdown_grace = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &raw, e.to_string())),
    }
}

fn non_blank<F>(lookup: &F, key: &'static str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Err(invalid(key, &raw, "must not be blank")),
        Some(raw) => Ok(Some(raw.trim().to_string())),
    }
}
