//! Per-source health tracker.
//!
//! Tracks failure streaks, attempt totals and cooldown deadlines for every
//! registered source. Each source has its own lock, so concurrent attempts
//! against different sources never contend, and updates to one source are
//! never lost under concurrent recording.
//!
//! Health is in-memory and starts fresh on every process start.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::policy::{HealthPolicy, MAX_COOLDOWN};
use super::state::{transition, HealthEvent, SourceStatus};
use crate::errors::{ConfigurationError, ErrorKind, FailoverError, SourceDiagnostic};
use crate::models::{SourceName, SourceSnapshot};

/// Mutable health record of one source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceHealth {
    pub status: SourceStatus,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    pub total_attempts: u64,
    pub total_successes: u64,
    /// Set only while cooling.
    pub cooldown_until: Option<Instant>,
    /// Cooldowns entered since the last success, drives escalation.
    pub cooldowns_since_success: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorKind>,
    pub disabled_reason: Option<String>,
}

impl SourceHealth {
    pub fn new() -> Self {
        Self {
            status: SourceStatus::Healthy,
            consecutive_failures: 0,
            total_attempts: 0,
            total_successes: 0,
            cooldown_until: None,
            cooldowns_since_success: 0,
            last_success: None,
            last_failure: None,
            last_error: None,
            disabled_reason: None,
        }
    }

    /// Fraction of attempts that succeeded, `0.0` before the first attempt.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.total_successes as f64 / self.total_attempts as f64
        }
    }

    /// Time left in the current cooldown.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        match (self.status, self.cooldown_until) {
            (SourceStatus::Cooling, Some(until)) => Some(until.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// Moves an expired cooldown to `Degraded`. Returns true on transition.
    ///
    /// The failure streak is kept, so the next failure re-arms the cooldown.
    pub fn refresh(&mut self, now: Instant) -> bool {
        if self.status != SourceStatus::Cooling {
            return false;
        }
        let expired = !matches!(self.cooldown_until, Some(until) if now < until);
        if expired {
            self.status = transition(self.status, HealthEvent::CooldownElapsed);
            self.cooldown_until = None;
        }
        expired
    }

    /// Whether the source may be attempted at `now`. Boundary inclusive.
    pub fn is_available(&mut self, now: Instant) -> bool {
        self.refresh(now);
        self.status.is_admissible()
    }

    pub fn apply_success(&mut self) {
        self.total_attempts += 1;
        self.total_successes += 1;
        self.consecutive_failures = 0;
        self.cooldowns_since_success = 0;
        self.cooldown_until = None;
        self.last_success = Some(Utc::now());
        self.status = transition(self.status, HealthEvent::Success);
    }

    /// Records a failure. Returns the cooldown length when one was armed.
    pub fn apply_failure(
        &mut self,
        kind: ErrorKind,
        policy: &HealthPolicy,
        now: Instant,
    ) -> Option<Duration> {
        self.refresh(now);
        self.total_attempts += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(Utc::now());
        self.last_error = Some(kind);

        // An attempt that started before the cooldown landed does not extend it.
        if matches!(self.status, SourceStatus::Cooling | SourceStatus::Disabled) {
            return None;
        }

        let threshold_reached = policy.threshold_reached(self.consecutive_failures);
        self.status = transition(self.status, HealthEvent::Failure { threshold_reached });
        if self.status != SourceStatus::Cooling {
            return None;
        }

        let cooldown = policy.cooldown_for(self.cooldowns_since_success);
        self.cooldown_until = Some(cooldown_deadline(now, cooldown));
        self.cooldowns_since_success = self.cooldowns_since_success.saturating_add(1);
        Some(cooldown)
    }

    pub fn apply_disable(&mut self, reason: String) {
        self.status = transition(self.status, HealthEvent::Disable);
        self.cooldown_until = None;
        self.disabled_reason = Some(reason);
    }

    /// Zeroes history. A disabled source stays disabled.
    pub fn apply_reset(&mut self) {
        let status = transition(self.status, HealthEvent::Reset);
        let disabled_reason = self.disabled_reason.take();
        *self = Self::new();
        self.status = status;
        if status == SourceStatus::Disabled {
            self.disabled_reason = disabled_reason;
        }
    }
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct TrackedSource {
    policy: HealthPolicy,
    health: SourceHealth,
}

/// Thread-safe health tracker shared by every dispatcher.
#[derive(Debug)]
pub struct HealthTracker {
    sources: RwLock<HashMap<String, Arc<Mutex<TrackedSource>>>>,
    clock: Arc<dyn Clock>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Current time according to the tracker's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    fn read_sources(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Mutex<TrackedSource>>>> {
        self.sources.read().unwrap_or_else(|poisoned| {
            warn!("Health tracker map lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_sources(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Mutex<TrackedSource>>>> {
        self.sources.write().unwrap_or_else(|poisoned| {
            warn!("Health tracker map lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_source(entry: &Mutex<TrackedSource>) -> MutexGuard<'_, TrackedSource> {
        entry.lock().unwrap_or_else(|poisoned| {
            warn!("Source health mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Runs `f` on one source's record. The map lock is released first.
    fn with_source<R>(&self, name: &str, f: impl FnOnce(&mut TrackedSource) -> R) -> Option<R> {
        let entry = self.read_sources().get(name).cloned()?;
        let mut tracked = Self::lock_source(&entry);
        Some(f(&mut tracked))
    }

    /// Starts tracking a source with a fresh Healthy record.
    pub fn track(&self, name: &str, policy: HealthPolicy) -> Result<(), ConfigurationError> {
        let mut sources = self.write_sources();
        if sources.contains_key(name) {
            return Err(ConfigurationError::DuplicateSource(name.to_string()));
        }
        sources.insert(
            name.to_string(),
            Arc::new(Mutex::new(TrackedSource {
                policy,
                health: SourceHealth::new(),
            })),
        );
        debug!("Health tracker: tracking '{}' ({:?})", name, policy);
        Ok(())
    }

    /// Stops tracking a source. Returns false if it was unknown.
    pub fn untrack(&self, name: &str) -> bool {
        self.write_sources().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_sources().contains_key(name)
    }

    pub fn policy(&self, name: &str) -> Option<HealthPolicy> {
        self.with_source(name, |t| t.policy)
    }

    pub fn record_success(&self, name: &str) {
        let recovered = self.with_source(name, |t| {
            let previous = t.health.status;
            t.health.apply_success();
            (previous, t.health.total_attempts)
        });

        match recovered {
            Some((SourceStatus::Healthy, _)) => {
                debug!("Health tracker: success for '{}'", name);
            }
            Some((previous, attempts)) => {
                info!(
                    "Source '{}' recovered ({} -> healthy, {} attempts so far)",
                    name, previous, attempts
                );
            }
            None => debug!("Health tracker: success for untracked source '{}'", name),
        }
    }

    pub fn record_failure(&self, name: &str, kind: ErrorKind) {
        let now = self.now();
        let outcome = self.with_source(name, |t| {
            refresh_logged(name, &mut t.health, now);
            let armed = t.health.apply_failure(kind, &t.policy, now);
            (armed, t.health.consecutive_failures, t.health.cooldowns_since_success)
        });

        match outcome {
            Some((Some(cooldown), failures, cooldowns)) if cooldowns > 1 => {
                warn!(
                    "Source '{}' re-entered cooldown for {:?} after {} consecutive failures (last error: {})",
                    name, cooldown, failures, kind
                );
            }
            Some((Some(cooldown), failures, _)) => {
                warn!(
                    "Source '{}' cooling down for {:?} after {} consecutive failures (last error: {})",
                    name, cooldown, failures, kind
                );
            }
            Some((None, failures, _)) => {
                debug!(
                    "Health tracker: failure for '{}' ({}), {} consecutive",
                    name, kind, failures
                );
            }
            None => debug!("Health tracker: failure for untracked source '{}'", name),
        }
    }

    /// Whether the source may be attempted at `now`.
    ///
    /// Advances an expired cooldown to `Degraded` as a side effect.
    /// Unknown sources are never available.
    pub fn is_available(&self, name: &str, now: Instant) -> bool {
        self.with_source(name, |t| {
            refresh_logged(name, &mut t.health, now);
            t.health.status.is_admissible()
        })
        .unwrap_or(false)
    }

    pub fn is_available_now(&self, name: &str) -> bool {
        self.is_available(name, self.now())
    }

    pub fn status(&self, name: &str) -> Option<SourceStatus> {
        let now = self.now();
        self.with_source(name, |t| {
            refresh_logged(name, &mut t.health, now);
            t.health.status
        })
    }

    /// Success rate of a source, `0.0` when unknown or never attempted.
    pub fn success_rate(&self, name: &str) -> f64 {
        self.with_source(name, |t| t.health.success_rate())
            .unwrap_or(0.0)
    }

    pub fn cooldown_remaining(&self, name: &str) -> Option<Duration> {
        let now = self.now();
        self.with_source(name, |t| {
            refresh_logged(name, &mut t.health, now);
            t.health.cooldown_remaining(now)
        })
        .flatten()
    }

    /// Copy of a source's health record.
    pub fn health(&self, name: &str) -> Option<SourceHealth> {
        let now = self.now();
        self.with_source(name, |t| {
            refresh_logged(name, &mut t.health, now);
            t.health.clone()
        })
    }

    /// Permanently excludes a source from rotation.
    pub fn disable(&self, name: &str, reason: impl Into<String>) -> crate::errors::Result<()> {
        let reason = reason.into();
        self.with_source(name, |t| t.health.apply_disable(reason.clone()))
            .ok_or_else(|| FailoverError::UnknownSource(name.to_string()))?;
        warn!("Source '{}' disabled: {}", name, reason);
        Ok(())
    }

    /// Returns a source to its initial state.
    pub fn reset(&self, name: &str) -> crate::errors::Result<()> {
        let status = self
            .with_source(name, |t| {
                t.health.apply_reset();
                t.health.status
            })
            .ok_or_else(|| FailoverError::UnknownSource(name.to_string()))?;
        info!("Source '{}' health reset (status: {})", name, status);
        Ok(())
    }

    pub fn reset_all(&self) {
        let entries: Vec<_> = self.read_sources().values().cloned().collect();
        for entry in &entries {
            Self::lock_source(entry).health.apply_reset();
        }
        info!("Health reset for all {} sources", entries.len());
    }

    pub fn snapshot(&self, name: &str) -> Option<SourceSnapshot> {
        let now = self.now();
        self.with_source(name, |t| {
            refresh_logged(name, &mut t.health, now);
            build_snapshot(name, &t.health, now)
        })
    }

    /// Snapshots of every tracked source, sorted by name.
    pub fn snapshots(&self) -> Vec<SourceSnapshot> {
        let mut names: Vec<String> = self.read_sources().keys().cloned().collect();
        names.sort();
        names.iter().filter_map(|name| self.snapshot(name)).collect()
    }

    /// Exhaustion diagnostic for a source.
    pub fn diagnostic(&self, name: &str, priority: i32) -> Option<SourceDiagnostic> {
        let now = self.now();
        self.with_source(name, |t| {
            refresh_logged(name, &mut t.health, now);
            SourceDiagnostic {
                name: SourceName::Owned(name.to_string()),
                priority,
                status: t.health.status,
                consecutive_failures: t.health.consecutive_failures,
                cooldown_remaining: t.health.cooldown_remaining(now),
                last_error: t.health.last_error,
            }
        })
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Deadline of a cooldown starting at `now`, clamped where `Instant` cannot
/// represent it.
fn cooldown_deadline(now: Instant, cooldown: Duration) -> Instant {
    now.checked_add(cooldown)
        .or_else(|| now.checked_add(MAX_COOLDOWN))
        .unwrap_or(now)
}

/// Expires a finished cooldown and logs the transition once.
fn refresh_logged(name: &str, health: &mut SourceHealth, now: Instant) {
    if health.refresh(now) {
        info!(
            "Source '{}' cooldown elapsed, admitting as degraded ({} consecutive failures)",
            name, health.consecutive_failures
        );
    }
}

fn build_snapshot(name: &str, health: &SourceHealth, now: Instant) -> SourceSnapshot {
    SourceSnapshot {
        name: SourceName::Owned(name.to_string()),
        status: health.status,
        consecutive_failures: health.consecutive_failures,
        total_attempts: health.total_attempts,
        total_successes: health.total_successes,
        success_rate: health.success_rate(),
        cooldown_remaining: health.cooldown_remaining(now),
        last_success: health.last_success,
        last_failure: health.last_failure,
        last_error: health.last_error,
        disabled_reason: health.disabled_reason.clone(),
    }
}
