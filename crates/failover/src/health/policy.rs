//! Failure thresholds and cooldown lengths.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of consecutive failures before cooling a source.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Default cooldown after reaching the failure threshold.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Longest cooldown a source can be given: 30 days.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How long successive cooldowns last.
///
/// A source that fails right after its cooldown elapses re-enters
/// `Cooling` immediately; this policy decides for how long.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// Every cooldown lasts the configured duration.
    #[default]
    Fixed,
    /// The n-th consecutive cooldown since the last success lasts
    /// `cooldown * factor^n`, capped at `max_secs`.
    Exponential { factor: u32, max_secs: u64 },
}

impl CooldownPolicy {
    /// Length of the cooldown given how many cooldowns preceded it since
    /// the last success.
    pub fn cooldown_for(&self, base: Duration, prior_cooldowns: u32) -> Duration {
        match *self {
            Self::Fixed => base,
            Self::Exponential { factor, max_secs } => {
                let multiplier = factor.max(1).saturating_pow(prior_cooldowns);
                base.saturating_mul(multiplier)
                    .min(Duration::from_secs(max_secs).max(base))
            }
        }
    }
}

/// Per-source failure policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Consecutive failures that trigger a cooldown.
    pub max_failures: u32,
    /// Base cooldown duration.
    pub cooldown: Duration,
    /// Escalation between successive cooldowns.
    pub cooldown_policy: CooldownPolicy,
}

impl HealthPolicy {
    pub fn new(max_failures: u32, cooldown: Duration) -> Self {
        Self {
            max_failures,
            cooldown,
            cooldown_policy: CooldownPolicy::Fixed,
        }
    }

    pub fn with_cooldown_policy(mut self, policy: CooldownPolicy) -> Self {
        self.cooldown_policy = policy;
        self
    }

    /// Whether `consecutive_failures` has reached the threshold.
    pub fn threshold_reached(&self, consecutive_failures: u32) -> bool {
        consecutive_failures >= self.max_failures.max(1)
    }

    /// Cooldown length, never longer than [`MAX_COOLDOWN`].
    pub fn cooldown_for(&self, prior_cooldowns: u32) -> Duration {
        self.cooldown_policy
            .cooldown_for(self.cooldown, prior_cooldowns)
            .min(MAX_COOLDOWN)
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILURES, DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_cooldown_never_grows() {
        let policy = HealthPolicy::new(3, Duration::from_secs(300));
        assert_eq!(policy.cooldown_for(0), Duration::from_secs(300));
        assert_eq!(policy.cooldown_for(5), Duration::from_secs(300));
    }

    #[test]
    fn test_exponential_cooldown_is_capped() {
        let policy = HealthPolicy::new(3, Duration::from_secs(60)).with_cooldown_policy(
            CooldownPolicy::Exponential {
                factor: 2,
                max_secs: 600,
            },
        );
        assert_eq!(policy.cooldown_for(0), Duration::from_secs(60));
        assert_eq!(policy.cooldown_for(1), Duration::from_secs(120));
        assert_eq!(policy.cooldown_for(2), Duration::from_secs(240));
        assert_eq!(policy.cooldown_for(4), Duration::from_secs(600));
        assert_eq!(policy.cooldown_for(40), Duration::from_secs(600));
    }

    #[test]
    fn test_cooldown_is_capped_at_maximum() {
        let fixed = HealthPolicy::new(1, Duration::from_secs(u64::MAX));
        assert_eq!(fixed.cooldown_for(0), MAX_COOLDOWN);

        let exp = HealthPolicy::new(1, Duration::from_secs(60)).with_cooldown_policy(
            CooldownPolicy::Exponential {
                factor: 10,
                max_secs: u64::MAX,
            },
        );
        assert_eq!(exp.cooldown_for(30), MAX_COOLDOWN);
    }

    #[test]
    fn test_threshold() {
        let policy = HealthPolicy::new(3, Duration::from_secs(60));
        assert!(!policy.threshold_reached(2));
        assert!(policy.threshold_reached(3));
        assert!(policy.threshold_reached(4));
    }

    #[test]
    fn test_cooldown_policy_deserializes() {
        let fixed: CooldownPolicy = serde_json::from_str(r#"{"kind":"fixed"}"#).unwrap();
        assert_eq!(fixed, CooldownPolicy::Fixed);

        let exp: CooldownPolicy =
            serde_json::from_str(r#"{"kind":"exponential","factor":2,"max_secs":3600}"#).unwrap();
        assert_eq!(
            exp,
            CooldownPolicy::Exponential {
                factor: 2,
                max_secs: 3600
            }
        );
    }
}
