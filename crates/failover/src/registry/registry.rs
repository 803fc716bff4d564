//! Priority-ordered source registry with a lazily filtered availability view.

use std::sync::Arc;

use log::debug;

use super::diagnostics::SkipReason;
use super::source::Source;
use crate::errors::{ConfigurationError, SourceDiagnostic};
use crate::health::{HealthTracker, SourceStatus};
use crate::models::{SourceName, SourceSnapshot};

/// Sources of one domain, sorted by ascending priority.
///
/// Registration keeps the shared [`HealthTracker`] in sync; sources with
/// equal priority keep their registration order.
pub struct SourceRegistry<P> {
    sources: Vec<Source<P>>,
    tracker: Arc<HealthTracker>,
}

impl<P> SourceRegistry<P> {
    pub fn new(tracker: Arc<HealthTracker>) -> Self {
        Self {
            sources: Vec::new(),
            tracker,
        }
    }

    /// Adds a source in priority order and starts tracking its health.
    pub fn register(&mut self, source: Source<P>) -> Result<(), ConfigurationError> {
        if self.get(source.name()).is_some() {
            return Err(ConfigurationError::DuplicateSource(source.name().to_string()));
        }
        self.tracker.track(source.name(), *source.policy())?;

        let index = self
            .sources
            .partition_point(|s| s.priority() <= source.priority());
        debug!(
            "Registered source '{}' (priority {}, position {})",
            source.name(),
            source.priority(),
            index
        );
        self.sources.insert(index, source);
        Ok(())
    }

    /// Removes a source and forgets its health.
    pub fn remove(&mut self, name: &str) -> Option<Source<P>> {
        let index = self.sources.iter().position(|s| s.name() == name)?;
        self.tracker.untrack(name);
        debug!("Removed source '{}'", name);
        Some(self.sources.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Source<P>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// All sources in priority order, regardless of health.
    pub fn sources(&self) -> &[Source<P>] {
        &self.sources
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| &**s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn tracker(&self) -> &Arc<HealthTracker> {
        &self.tracker
    }

    /// Lazily filtered view of admissible sources in priority order.
    ///
    /// Health is checked as the iterator advances, so a cooldown that
    /// expires while earlier sources are being tried is honoured.
    pub fn available(&self) -> AvailableSources<'_, P> {
        AvailableSources {
            registry: self,
            position: 0,
            skipped: Vec::new(),
        }
    }

    pub fn available_count(&self) -> usize {
        let now = self.tracker.now();
        self.sources
            .iter()
            .filter(|s| self.tracker.is_available(s.name(), now))
            .count()
    }

    /// Exhaustion diagnostics for every source, in priority order.
    pub fn diagnostics(&self) -> Vec<SourceDiagnostic> {
        self.sources
            .iter()
            .filter_map(|s| self.tracker.diagnostic(s.name(), s.priority()))
            .collect()
    }

    /// Health snapshots for every source, in priority order.
    pub fn snapshots(&self) -> Vec<SourceSnapshot> {
        self.sources
            .iter()
            .filter_map(|s| self.tracker.snapshot(s.name()))
            .collect()
    }
}

/// Iterator over the admissible sources of a registry.
pub struct AvailableSources<'a, P> {
    registry: &'a SourceRegistry<P>,
    position: usize,
    skipped: Vec<(SourceName, SkipReason)>,
}

impl<P> AvailableSources<'_, P> {
    /// Sources passed over since the last call, with the reason.
    pub fn take_skipped(&mut self) -> Vec<(SourceName, SkipReason)> {
        std::mem::take(&mut self.skipped)
    }
}

impl<'a, P> Iterator for AvailableSources<'a, P> {
    type Item = &'a Source<P>;

    fn next(&mut self) -> Option<Self::Item> {
        let registry = self.registry;
        let tracker = &registry.tracker;

        while let Some(source) = registry.sources.get(self.position) {
            self.position += 1;
            let name = source.name();

            if tracker.is_available(name, tracker.now()) {
                return Some(source);
            }

            let reason = match tracker.status(name) {
                Some(SourceStatus::Cooling) => SkipReason::CoolingDown {
                    remaining: tracker.cooldown_remaining(name).unwrap_or_default(),
                },
                _ => SkipReason::Disabled,
            };
            debug!("Skipping source '{}' ({})", name, reason);
            self.skipped.push((name.clone(), reason));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::errors::{ErrorKind, FetchError};
    use crate::health::ManualClock;
    use crate::models::FetchParams;
    use crate::provider::FetchCapability;

    struct Static;

    #[async_trait]
    impl FetchCapability<String> for Static {
        async fn fetch(&self, _: &FetchParams, _: Instant) -> Result<String, FetchError> {
            Ok("ok".to_string())
        }
    }

    fn source(name: &'static str, priority: i32) -> Source<String> {
        let capability: Arc<dyn FetchCapability<String>> = Arc::new(Static);
        Source::new(name, priority, capability)
    }

    fn registry() -> (SourceRegistry<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let tracker = Arc::new(HealthTracker::with_clock(clock.clone()));
        (SourceRegistry::new(tracker), clock)
    }

    #[test]
    fn test_sources_sorted_by_priority() {
        let (mut registry, _) = registry();
        registry.register(source("coindesk", 3)).unwrap();
        registry.register(source("cryptopanic", 1)).unwrap();
        registry.register(source("cointelegraph", 2)).unwrap();

        assert_eq!(
            registry.names(),
            vec!["cryptopanic", "cointelegraph", "coindesk"]
        );
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let (mut registry, _) = registry();
        registry.register(source("b", 1)).unwrap();
        registry.register(source("a", 1)).unwrap();
        registry.register(source("z", 0)).unwrap();

        assert_eq!(registry.names(), vec!["z", "b", "a"]);
    }

    #[test]
    fn test_duplicate_register_is_rejected() {
        let (mut registry, _) = registry();
        registry.register(source("coingecko", 1)).unwrap();
        assert!(registry.register(source("coingecko", 2)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_available_skips_cooling_and_disabled() {
        let (mut registry, _) = registry();
        registry
            .register(source("s1", 1).with_max_failures(1))
            .unwrap();
        registry.register(source("s2", 2)).unwrap();
        registry.register(source("s3", 3)).unwrap();

        registry.tracker().record_failure("s1", ErrorKind::Timeout);
        registry.tracker().disable("s2", "no key").unwrap();

        let mut view = registry.available();
        let first = view.next().map(|s| s.name().to_string());
        assert_eq!(first.as_deref(), Some("s3"));

        let skipped = view.take_skipped();
        assert_eq!(skipped.len(), 2);
        assert!(matches!(skipped[0].1, SkipReason::CoolingDown { .. }));
        assert_eq!(skipped[1].1, SkipReason::Disabled);
        assert!(view.next().is_none());
    }

    #[test]
    fn test_available_rechecks_health_while_iterating() {
        let (mut registry, clock) = registry();
        registry.register(source("s1", 1)).unwrap();
        registry
            .register(
                source("s2", 2)
                    .with_max_failures(1)
                    .with_cooldown(Duration::from_secs(30)),
            )
            .unwrap();
        registry.tracker().record_failure("s2", ErrorKind::Transport);

        let mut view = registry.available();
        assert_eq!(view.next().map(|s| s.priority()), Some(1));

        // The cooldown of s2 expires while s1 is being tried.
        clock.advance(Duration::from_secs(30));
        assert_eq!(view.next().map(|s| s.priority()), Some(2));
    }

    #[test]
    fn test_remove_untracks() {
        let (mut registry, _) = registry();
        registry.register(source("coingecko", 1)).unwrap();
        let removed = registry.remove("coingecko").unwrap();

        assert_eq!(removed.name(), "coingecko");
        assert!(!registry.tracker().contains("coingecko"));
        assert!(registry.remove("coingecko").is_none());
    }

    #[test]
    fn test_diagnostics_cover_every_source() {
        let (mut registry, _) = registry();
        registry
            .register(source("s1", 1).with_max_failures(1))
            .unwrap();
        registry.register(source("s2", 2)).unwrap();
        registry.tracker().record_failure("s1", ErrorKind::Timeout);

        let diagnostics = registry.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].status, SourceStatus::Cooling);
        assert_eq!(diagnostics[0].last_error, Some(ErrorKind::Timeout));
        assert_eq!(diagnostics[1].status, SourceStatus::Healthy);
        assert_eq!(registry.available_count(), 1);
    }
}
