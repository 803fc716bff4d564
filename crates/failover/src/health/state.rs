//! Source status state machine.
//!
//! ```text
//! Healthy --failure--> Degraded --threshold reached--> Cooling
//!    ^                    |  ^                            |
//!    +------success-------+  +-----cooldown elapsed-------+
//! ```
//!
//! `Disabled` is entered only through an explicit administrative event and
//! nothing but another administrative action leaves it.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Health status of a source.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Last observed attempt succeeded (or no attempt yet).
    Healthy,
    /// Failing, or back from a cooldown and not yet proven.
    Degraded,
    /// Excluded from rotation until its cooldown deadline.
    Cooling,
    /// Permanently excluded, e.g. missing credentials at startup.
    Disabled,
}

impl SourceStatus {
    /// Whether a source in this status may be attempted.
    pub fn is_admissible(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Cooling => "cooling",
            Self::Disabled => "disabled",
        }
    }
}

impl Display for SourceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to the status state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HealthEvent {
    /// An attempt completed with a usable payload.
    Success,
    /// An attempt failed; `threshold_reached` when the streak hit `max_failures`.
    Failure { threshold_reached: bool },
    /// The cooldown deadline has passed.
    CooldownElapsed,
    /// Administrative exclusion.
    Disable,
    /// Administrative reset of health history.
    Reset,
}

/// Pure transition function of the status state machine.
///
/// `Reset` zeroes health history but keeps a disabled source disabled;
/// disabling is configuration, not history.
pub fn transition(status: SourceStatus, event: HealthEvent) -> SourceStatus {
    use HealthEvent::*;
    use SourceStatus::*;

    match (status, event) {
        (_, Disable) => Disabled,
        (Disabled, _) => Disabled,
        (_, Reset) => Healthy,
        (_, Success) => Healthy,
        (_, Failure { threshold_reached: true }) => Cooling,
        (Cooling, Failure { threshold_reached: false }) => Cooling,
        (_, Failure { threshold_reached: false }) => Degraded,
        (Cooling, CooldownElapsed) => Degraded,
        (other, CooldownElapsed) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_failure_degrades() {
        let next = transition(
            SourceStatus::Healthy,
            HealthEvent::Failure {
                threshold_reached: false,
            },
        );
        assert_eq!(next, SourceStatus::Degraded);
    }

    #[test]
    fn test_threshold_opens_cooldown() {
        for status in [SourceStatus::Healthy, SourceStatus::Degraded] {
            let next = transition(
                status,
                HealthEvent::Failure {
                    threshold_reached: true,
                },
            );
            assert_eq!(next, SourceStatus::Cooling);
        }
    }

    #[test]
    fn test_cooldown_elapsed_degrades() {
        assert_eq!(
            transition(SourceStatus::Cooling, HealthEvent::CooldownElapsed),
            SourceStatus::Degraded
        );
        assert_eq!(
            transition(SourceStatus::Healthy, HealthEvent::CooldownElapsed),
            SourceStatus::Healthy
        );
    }

    #[test]
    fn test_success_heals() {
        for status in [
            SourceStatus::Healthy,
            SourceStatus::Degraded,
            SourceStatus::Cooling,
        ] {
            assert_eq!(
                transition(status, HealthEvent::Success),
                SourceStatus::Healthy
            );
        }
    }

    #[test]
    fn test_disabled_is_sticky() {
        for event in [
            HealthEvent::Success,
            HealthEvent::Failure {
                threshold_reached: true,
            },
            HealthEvent::CooldownElapsed,
            HealthEvent::Reset,
        ] {
            assert_eq!(
                transition(SourceStatus::Disabled, event),
                SourceStatus::Disabled
            );
        }
    }

    #[test]
    fn test_reset_returns_to_healthy() {
        assert_eq!(
            transition(SourceStatus::Cooling, HealthEvent::Reset),
            SourceStatus::Healthy
        );
    }

    #[test]
    fn test_admissible_states() {
        assert!(SourceStatus::Healthy.is_admissible());
        assert!(SourceStatus::Degraded.is_admissible());
        assert!(!SourceStatus::Cooling.is_admissible());
        assert!(!SourceStatus::Disabled.is_admissible());
    }
}
