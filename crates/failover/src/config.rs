//! Failover configuration loaded from JSON with environment overrides.
//!
//! ```json
//! {
//!   "aggregate": { "deadline_ms": 15000, "max_concurrency": 4 },
//!   "domains": [
//!     {
//!       "name": "news",
//!       "min_available": 2,
//!       "sources": [
//!         { "name": "cryptopanic", "priority": 1, "credential_env": "CRYPTOPANIC_API_KEY" },
//!         { "name": "coindesk", "priority": 2, "cooldown_policy": { "kind": "exponential", "factor": 2, "max_secs": 3600 } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::aggregator::{AggregateOptions, MAX_DEADLINE};
use crate::dispatcher::DispatchOptions;
use crate::errors::ConfigurationError;
use crate::health::{CooldownPolicy, HealthPolicy, DEFAULT_MAX_FAILURES, MAX_COOLDOWN};
use crate::registry::MAX_TIMEOUT;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "COINPULSE_FAILOVER_CONFIG";
/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/failover.json";
pub const DEADLINE_ENV: &str = "COINPULSE_AGGREGATE_DEADLINE_MS";
pub const MAX_CONCURRENCY_ENV: &str = "COINPULSE_AGGREGATE_MAX_CONCURRENCY";

fn default_max_failures() -> u32 {
    DEFAULT_MAX_FAILURES
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_min_available() -> usize {
    1
}

fn default_deadline_ms() -> u64 {
    15_000
}

fn default_max_concurrency() -> usize {
    4
}

/// One configured source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub name: String,
    pub priority: i32,
    /// Adapter key; defaults to the source name.
    #[serde(default)]
    pub adapter: Option<String>,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variable that must be set for the source to be enabled.
    #[serde(default)]
    pub credential_env: Option<String>,
    #[serde(default)]
    pub cooldown_policy: CooldownPolicy,
}

impl SourceSettings {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            adapter: None,
            max_failures: default_max_failures(),
            cooldown_secs: default_cooldown_secs(),
            timeout_ms: default_timeout_ms(),
            credential_env: None,
            cooldown_policy: CooldownPolicy::Fixed,
        }
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.as_deref().unwrap_or(&self.name)
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy::new(self.max_failures, Duration::from_secs(self.cooldown_secs))
            .with_cooldown_policy(self.cooldown_policy)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One data domain and its sources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSettings {
    pub name: String,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default = "default_min_available")]
    pub min_available: usize,
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
}

impl DomainSettings {
    pub fn new(name: impl Into<String>, sources: Vec<SourceSettings>) -> Self {
        Self {
            name: name.into(),
            fallback_enabled: true,
            min_available: default_min_available(),
            sources,
        }
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            fallback_enabled: self.fallback_enabled,
            min_available: self.min_available,
        }
    }
}

/// Fan-out limits for aggregate requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSettings {
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl AggregateSettings {
    pub fn options(&self) -> AggregateOptions {
        AggregateOptions {
            deadline: Duration::from_millis(self.deadline_ms),
            max_concurrency: self.max_concurrency,
        }
    }
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Complete failover configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverConfig {
    #[serde(default)]
    pub aggregate: AggregateSettings,
    #[serde(default)]
    pub domains: Vec<DomainSettings>,
}

impl FailoverConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Load(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&contents)?;
        info!(
            "Loaded failover config from {} ({} domains)",
            path.display(),
            config.domains.len()
        );
        Ok(config)
    }

    /// Loads the file named by `COINPULSE_FAILOVER_CONFIG` and applies
    /// `COINPULSE_AGGREGATE_*` overrides. A `.env` file is honoured.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        dotenvy::dotenv().ok();
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_path(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies aggregate overrides from `lookup` and re-validates.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigurationError> {
        if let Some(value) = lookup(DEADLINE_ENV) {
            self.aggregate.deadline_ms = parse_override(DEADLINE_ENV, &value)?;
            debug!("Aggregate deadline overridden to {}ms", self.aggregate.deadline_ms);
        }
        if let Some(value) = lookup(MAX_CONCURRENCY_ENV) {
            self.aggregate.max_concurrency = parse_override(MAX_CONCURRENCY_ENV, &value)?;
            debug!(
                "Aggregate concurrency overridden to {}",
                self.aggregate.max_concurrency
            );
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.aggregate.deadline_ms == 0 {
            return Err(invalid("aggregate.deadline_ms", "must be greater than zero"));
        }
        if self.aggregate.deadline_ms > millis(MAX_DEADLINE) {
            return Err(invalid(
                "aggregate.deadline_ms",
                &format!("must not exceed {}", millis(MAX_DEADLINE)),
            ));
        }
        if self.aggregate.max_concurrency == 0 {
            return Err(invalid("aggregate.max_concurrency", "must be greater than zero"));
        }

        let mut domains = HashSet::new();
        let mut sources = HashSet::new();
        for domain in &self.domains {
            if domain.name.trim().is_empty() {
                return Err(invalid("domains.name", "must not be empty"));
            }
            if !domains.insert(domain.name.as_str()) {
                return Err(ConfigurationError::DuplicateDomain(domain.name.clone()));
            }

            for source in &domain.sources {
                if source.name.trim().is_empty() {
                    return Err(invalid(
                        &format!("{}.sources.name", domain.name),
                        "must not be empty",
                    ));
                }
                if !sources.insert(source.name.as_str()) {
                    return Err(ConfigurationError::DuplicateSource(source.name.clone()));
                }
                if source.max_failures == 0 {
                    return Err(invalid(
                        &format!("{}.max_failures", source.name),
                        "must be greater than zero",
                    ));
                }
                if source.timeout_ms == 0 {
                    return Err(invalid(
                        &format!("{}.timeout_ms", source.name),
                        "must be greater than zero",
                    ));
                }
                if source.timeout_ms > millis(MAX_TIMEOUT) {
                    return Err(invalid(
                        &format!("{}.timeout_ms", source.name),
                        &format!("must not exceed {}", millis(MAX_TIMEOUT)),
                    ));
                }
                if source.cooldown_secs > MAX_COOLDOWN.as_secs() {
                    return Err(invalid(
                        &format!("{}.cooldown_secs", source.name),
                        &format!("must not exceed {}", MAX_COOLDOWN.as_secs()),
                    ));
                }
                if let CooldownPolicy::Exponential { factor, max_secs } = source.cooldown_policy {
                    if max_secs > MAX_COOLDOWN.as_secs() {
                        return Err(invalid(
                            &format!("{}.cooldown_policy.max_secs", source.name),
                            &format!("must not exceed {}", MAX_COOLDOWN.as_secs()),
                        ));
                    }
                    if factor == 0 {
                        return Err(invalid(
                            &format!("{}.cooldown_policy.factor", source.name),
                            "must be greater than zero",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn domain(&self, name: &str) -> Option<&DomainSettings> {
        self.domains.iter().find(|d| d.name == name)
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn invalid(name: &str, message: &str) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigurationError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(name, &format!("'{}': {}", value, e)))
}
