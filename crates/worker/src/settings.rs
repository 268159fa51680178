//! Binary-level settings: connection strings, credentials and the bind address.

use std::net::SocketAddr;
use std::time::Duration;

use fitcheck_infra::{ConfigError, ProcessorConfig};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_STORAGE_BUCKET: &str = "STORAGE_BUCKET";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_HTTP_TIMEOUT_MS: &str = "HTTP_TIMEOUT_MS";

const DEFAULT_BUCKET: &str = "wardrobe";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub database_url: String,
    pub openai_api_key: String,
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub storage_bucket: String,
    pub bind_addr: SocketAddr,
    /// Request timeout for the image API and storage clients.
    pub http_timeout: Duration,
    pub processor: ProcessorConfig,
}

impl WorkerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = optional(&lookup, ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            key: ENV_BIND_ADDR,
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        let http_timeout = match optional(&lookup, ENV_HTTP_TIMEOUT_MS) {
            None => DEFAULT_HTTP_TIMEOUT,
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        key: ENV_HTTP_TIMEOUT_MS,
                        value: raw,
                        reason: "timeout must be positive".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: ENV_HTTP_TIMEOUT_MS,
                        reason: e.to_string(),
                        value: raw,
                    });
                }
            },
        };

        Ok(Self {
            database_url: required(&lookup, ENV_DATABASE_URL)?,
            openai_api_key: required(&lookup, ENV_OPENAI_API_KEY)?,
            supabase_url: required(&lookup, ENV_SUPABASE_URL)?,
            supabase_service_key: required(&lookup, ENV_SUPABASE_SERVICE_ROLE_KEY)?,
            storage_bucket: optional(&lookup, ENV_STORAGE_BUCKET).unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            bind_addr,
            http_timeout,
            processor: ProcessorConfig::from_lookup(&lookup)?,
        })
    }
}

fn optional<F>(lookup: &F, key: &'static str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        (ENV_DATABASE_URL, "postgres://localhost/fitcheck"),
        (ENV_OPENAI_API_KEY, "sk-test"),
        (ENV_SUPABASE_URL, "https://project.supabase.co"),
        (ENV_SUPABASE_SERVICE_ROLE_KEY, "service-role"),
    ];

    #[test]
    fn fills_defaults_around_required_keys() {
        let settings = WorkerSettings::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(settings.storage_bucket, "wardrobe");
        assert_eq!(settings.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(settings.http_timeout, Duration::from_secs(120));
        assert_eq!(settings.processor.rate_limit, 5);
    }

    #[test]
    fn missing_credentials_are_reported_by_key() {
        let err = WorkerSettings::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_SUPABASE_SERVICE_ROLE_KEY));

        let mut blank = REQUIRED.to_vec();
        blank[1] = (ENV_OPENAI_API_KEY, "  ");
        let err = WorkerSettings::from_lookup(lookup(&blank)).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_OPENAI_API_KEY));
    }

    #[test]
    fn rejects_bad_bind_addr_and_timeout() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((ENV_BIND_ADDR, "localhost"));
        assert!(matches!(
            WorkerSettings::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: ENV_BIND_ADDR, .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push((ENV_HTTP_TIMEOUT_MS, "0"));
        assert!(matches!(
            WorkerSettings::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: ENV_HTTP_TIMEOUT_MS, .. })
        ));
    }

    #[test]
    fn processor_tunables_flow_through() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RATE_LIMIT", "2"));
        pairs.push((ENV_STORAGE_BUCKET, "closet"));
        let settings = WorkerSettings::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(settings.processor.rate_limit, 2);
        assert_eq!(settings.storage_bucket, "closet");
    }
}
