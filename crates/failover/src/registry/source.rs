use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::health::{CooldownPolicy, HealthPolicy};
use crate::models::SourceName;
use crate::provider::FetchCapability;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest per-call timeout a source can be given.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// One configured provider: identity, priority, capability and failure policy.
///
/// Lower priority values are tried first. A source is immutable once
/// registered; reconfiguring means removing and registering again.
pub struct Source<P> {
    name: SourceName,
    priority: i32,
    capability: Arc<dyn FetchCapability<P>>,
    policy: HealthPolicy,
    timeout: Duration,
}

impl<P> Source<P> {
    pub fn new(
        name: impl Into<SourceName>,
        priority: i32,
        capability: Arc<dyn FetchCapability<P>>,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            capability,
            policy: HealthPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.policy.max_failures = max_failures;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.policy.cooldown = cooldown;
        self
    }

    pub fn with_cooldown_policy(mut self, policy: CooldownPolicy) -> Self {
        self.policy.cooldown_policy = policy;
        self
    }

    pub fn with_policy(mut self, policy: HealthPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Per-call timeout, capped at [`MAX_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_TIMEOUT);
        self
    }

    pub fn name(&self) -> &SourceName {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn capability(&self) -> &Arc<dyn FetchCapability<P>> {
        &self.capability
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<P> fmt::Debug for Source<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
