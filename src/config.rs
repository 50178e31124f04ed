use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MetaError, Result};
use crate::utils::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_REDIS_URL};


/// Which lifecycle event a record's TTL counts from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpirationPolicy {
    /// Expire `expire_in` seconds after the job finishes; unfinished records never expire.
    #[default]
    FromFinish,
    /// Expire `expire_in` seconds after the job was enqueued, whatever its state.
    FromEnqueue,
}

impl FromStr for ExpirationPolicy {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "finish" | "finished" | "from_finish" => Ok(Self::FromFinish),
            "enqueue" | "enqueued" | "from_enqueue" => Ok(Self::FromEnqueue),
            other => Err(MetaError::Config(format!("unknown expiration policy '{other}'"))),
        }
    }
}


#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub name: String,
    pub concurrency: usize,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, concurrency: usize) -> Self {
        Self {
            name: name.into(),
            concurrency,
        }
    }

    pub fn from_configs(configs: Vec<(&str, usize)>) -> Vec<Self> {
        configs
            .into_iter()
            .map(|(name, concurrency)| Self::new(name, concurrency))
            .collect()
    }
}


#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub redis_url: String,
    pub expiration: ExpirationPolicy,
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            expiration: ExpirationPolicy::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl TrackerConfig {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ..Self::default()
        }
    }

    pub fn with_expiration(mut self, expiration: ExpirationPolicy) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Reads `QRUSH_REDIS_URL`, `QRUSH_META_EXPIRE_FROM` and
    /// `QRUSH_POLL_INTERVAL_MS`, falling back to defaults for unset vars.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("QRUSH_REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(policy) = env::var("QRUSH_META_EXPIRE_FROM") {
            config.expiration = policy.parse()?;
        }
        if let Ok(ms) = env::var("QRUSH_POLL_INTERVAL_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| MetaError::Config(format!("invalid QRUSH_POLL_INTERVAL_MS '{ms}'")))?;
            config.poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("finish".parse::<ExpirationPolicy>().unwrap(), ExpirationPolicy::FromFinish);
        assert_eq!("Enqueue".parse::<ExpirationPolicy>().unwrap(), ExpirationPolicy::FromEnqueue);
        assert!(matches!(
            "never".parse::<ExpirationPolicy>(),
            Err(MetaError::Config(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.expiration, ExpirationPolicy::FromFinish);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_queue_configs() {
        let queues = QueueConfig::from_configs(vec![("default", 5), ("mailers", 2)]);
        assert_eq!(queues.len(), 2);
        assert_eq!(queues[1].name, "mailers");
        assert_eq!(queues[1].concurrency, 2);
    }
}
