use std::path::PathBuf;

use crate::engine::{FetchPolicy, SchedulerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Process settings, read once from `ROOMSLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_path: PathBuf,
    pub fetch_policy: FetchPolicy,
    pub suggest_attempts: u32,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            data_path: PathBuf::from("./data/roomslot.json"),
            fetch_policy: scheduler.fetch_policy,
            suggest_attempts: scheduler.suggest_attempts,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take defaults; a set key with a
    /// bad fetch policy is an error, since guessing would change conflict
    /// semantics.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_path = lookup("ROOMSLOT_DATA").map(PathBuf::from).unwrap_or(defaults.data_path);
        let fetch_policy = match lookup("ROOMSLOT_FETCH_POLICY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "ROOMSLOT_FETCH_POLICY",
                reason,
            })?,
            None => defaults.fetch_policy,
        };
        let suggest_attempts = lookup("ROOMSLOT_SUGGEST_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(defaults.suggest_attempts);
        let metrics_port = lookup("ROOMSLOT_METRICS_PORT").and_then(|s| s.parse().ok());

        Ok(Self {
            data_path,
            fetch_policy,
            suggest_attempts,
            metrics_port,
        })
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            fetch_policy: self.fetch_policy,
            suggest_attempts: self.suggest_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.fetch_policy, FetchPolicy::FailClosed);
        assert_eq!(config.suggest_attempts, 3);
    }

    #[test]
    fn values_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("ROOMSLOT_DATA", "/tmp/rooms.json"),
            ("ROOMSLOT_FETCH_POLICY", "open"),
            ("ROOMSLOT_SUGGEST_ATTEMPTS", "5"),
            ("ROOMSLOT_METRICS_PORT", "9100"),
        ]))
        .unwrap();
        assert_eq!(config.data_path, PathBuf::from("/tmp/rooms.json"));
        assert_eq!(config.fetch_policy, FetchPolicy::FailOpen);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.scheduler().suggest_attempts, 5);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("ROOMSLOT_SUGGEST_ATTEMPTS", "0"),
            ("ROOMSLOT_METRICS_PORT", "not-a-port"),
        ]))
        .unwrap();
        assert_eq!(config.suggest_attempts, 3);
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn bad_fetch_policy_is_rejected() {
        let err = Config::from_lookup(lookup(&[("ROOMSLOT_FETCH_POLICY", "maybe")])).unwrap_err();
        assert!(err.to_string().starts_with("ROOMSLOT_FETCH_POLICY"));
    }
}
