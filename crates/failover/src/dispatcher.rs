//! Priority-ordered failover for one domain.
//!
//! The dispatcher walks the registry's available sources in priority
//! order:
//! 1. Invoke the fetch capability under the source's timeout
//! 2. Validate the payload (empty payloads are failures)
//! 3. On success record it and return immediately
//! 4. On failure record it and move on to the next source
//!
//! When nothing is left it returns an [`ExhaustionError`] describing every
//! configured source.

use log::{debug, warn};
use tokio::time::Instant;

use crate::errors::{ExhaustionError, FetchError};
use crate::models::{Domain, FetchParams, FetchResult};
use crate::provider::Payload;
use crate::registry::{DispatchDiagnostics, Source, SourceRegistry};

/// Per-domain dispatch behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Try lower-priority sources after a failure. When false only the
    /// first available source is attempted.
    pub fallback_enabled: bool,
    /// Log a warning when fewer sources than this are available.
    pub min_available: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            min_available: 1,
        }
    }
}

/// Failover dispatcher owning one domain's registry.
pub struct Dispatcher<P> {
    domain: Domain,
    registry: SourceRegistry<P>,
    options: DispatchOptions,
}

impl<P: Payload> Dispatcher<P> {
    pub fn new(domain: impl Into<Domain>, registry: SourceRegistry<P>) -> Self {
        Self::with_options(domain, registry, DispatchOptions::default())
    }

    pub fn with_options(
        domain: impl Into<Domain>,
        registry: SourceRegistry<P>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            domain: domain.into(),
            registry,
            options,
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn registry(&self) -> &SourceRegistry<P> {
        &self.registry
    }

    /// Registry access for configuration reload between dispatches.
    pub fn registry_mut(&mut self) -> &mut SourceRegistry<P> {
        &mut self.registry
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Fetch from the first source that succeeds.
    ///
    /// Health is recorded only once an attempt is observed to complete;
    /// dropping the returned future mid-fetch records nothing.
    pub async fn dispatch(&self, params: &FetchParams) -> Result<FetchResult<P>, ExhaustionError> {
        let mut diagnostics = DispatchDiagnostics::new();
        self.warn_if_below_minimum();

        let mut candidates = self.registry.available();
        let mut attempted = 0usize;

        loop {
            if attempted > 0 && !self.options.fallback_enabled {
                debug!(
                    "Fallback disabled for domain '{}', stopping after first attempt",
                    self.domain
                );
                break;
            }

            let Some(source) = candidates.next() else {
                break;
            };
            for (name, reason) in candidates.take_skipped() {
                diagnostics.record_skip(name, reason);
            }
            attempted += 1;

            let started = Instant::now();
            let outcome = self.attempt(source, params).await;
            let latency = started.elapsed();
            let tracker = self.registry.tracker();

            match outcome {
                Ok(payload) => {
                    tracker.record_success(source.name());
                    let result = FetchResult::success(source.name().clone(), payload, latency);
                    diagnostics.record_result(&result, None);
                    debug!(
                        "Domain '{}' served by '{}' in {:?}",
                        self.domain,
                        source.name(),
                        latency
                    );
                    return Ok(result);
                }
                Err(error) => {
                    let failed: FetchResult<P> =
                        FetchResult::failure(source.name().clone(), error.kind(), latency);
                    tracker.record_failure(source.name(), error.kind());
                    diagnostics.record_result(&failed, Some(error.to_string()));
                    debug!(
                        "Source '{}' failed for domain '{}': {}, trying next",
                        source.name(),
                        self.domain,
                        error
                    );
                }
            }
        }

        for (name, reason) in candidates.take_skipped() {
            diagnostics.record_skip(name, reason);
        }

        let error = ExhaustionError::new(
            self.domain.clone(),
            self.registry.diagnostics(),
            diagnostics,
        );
        warn!("{} ({})", error, error.diagnostics().summary());
        Err(error)
    }

    /// One attempt under the source's timeout, independent of whether the
    /// capability honours its deadline.
    async fn attempt(&self, source: &Source<P>, params: &FetchParams) -> Result<P, FetchError> {
        let deadline = Instant::now() + source.timeout();
        match tokio::time::timeout_at(deadline, source.capability().fetch(params, deadline)).await {
            Ok(Ok(payload)) => payload.validate().map(|()| payload),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(FetchError::Timeout {
                after: source.timeout(),
            }),
        }
    }

    fn warn_if_below_minimum(&self) {
        let available = self.registry.available_count();
        if available < self.options.min_available {
            warn!(
                "Domain '{}' has {} available sources (minimum {}): {}",
                self.domain,
                available,
                self.options.min_available,
                self.registry
                    .snapshots()
                    .iter()
                    .map(|s| format!("{}={}", s.name, s.status))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::errors::ErrorKind;
    use crate::health::{HealthTracker, ManualClock, SourceStatus};
    use crate::provider::FetchCapability;

    enum Behavior {
        Succeed(&'static str),
        Fail,
        Empty,
        Hang,
    }

    struct MockSource {
        behavior: Behavior,
        call_count: AtomicUsize,
    }

    impl MockSource {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                call_count: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FetchCapability<Vec<String>> for MockSource {
        async fn fetch(&self, _: &FetchParams, _: Instant) -> Result<Vec<String>, FetchError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed(item) => Ok(vec![item.to_string()]),
                Behavior::Fail => Err(FetchError::transport("503 Service Unavailable")),
                Behavior::Empty => Ok(Vec::new()),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(vec!["late".to_string()])
                }
            }
        }
    }

    fn dispatcher(
        sources: &[(&'static str, Arc<MockSource>)],
        options: DispatchOptions,
    ) -> Dispatcher<Vec<String>> {
        let tracker = Arc::new(HealthTracker::with_clock(Arc::new(ManualClock::new())));
        let mut registry = SourceRegistry::new(tracker);
        for (i, (name, mock)) in sources.iter().enumerate() {
            let capability: Arc<dyn FetchCapability<Vec<String>>> = mock.clone();
            registry
                .register(
                    Source::new(*name, i as i32 + 1, capability)
                        .with_timeout(Duration::from_secs(5)),
                )
                .unwrap();
        }
        Dispatcher::with_options("news", registry, options)
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let s1 = MockSource::new(Behavior::Succeed("first"));
        let s2 = MockSource::new(Behavior::Succeed("second"));
        let dispatcher = dispatcher(
            &[("s1", s1.clone()), ("s2", s2.clone())],
            DispatchOptions::default(),
        );

        let result = dispatcher.dispatch(&FetchParams::new()).await.unwrap();

        assert_eq!(result.source_name(), "s1");
        assert_eq!(result.payload(), Some(&vec!["first".to_string()]));
        assert_eq!(s1.calls(), 1);
        assert_eq!(s2.calls(), 0);
    }

    #[tokio::test]
    async fn test_fails_over_to_next_source() {
        let s1 = MockSource::new(Behavior::Fail);
        let s2 = MockSource::new(Behavior::Succeed("second"));
        let dispatcher = dispatcher(
            &[("s1", s1.clone()), ("s2", s2.clone())],
            DispatchOptions::default(),
        );

        let result = dispatcher.dispatch(&FetchParams::new()).await.unwrap();

        assert_eq!(result.source_name(), "s2");
        let tracker = dispatcher.registry().tracker();
        assert_eq!(tracker.status("s1"), Some(SourceStatus::Degraded));
        assert_eq!(tracker.health("s1").unwrap().last_error, Some(ErrorKind::Transport));
    }

    #[tokio::test]
    async fn test_empty_payload_is_a_failure() {
        let s1 = MockSource::new(Behavior::Empty);
        let s2 = MockSource::new(Behavior::Succeed("headline"));
        let dispatcher = dispatcher(
            &[("s1", s1.clone()), ("s2", s2.clone())],
            DispatchOptions::default(),
        );

        let result = dispatcher.dispatch(&FetchParams::new()).await.unwrap();

        assert_eq!(result.source_name(), "s2");
        let health = dispatcher.registry().tracker().health("s1").unwrap();
        assert_eq!(health.consecutive_failures, 1);
        assert_eq!(health.total_successes, 0);
        assert_eq!(health.last_error, Some(ErrorKind::InvalidPayload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_source_times_out() {
        let s1 = MockSource::new(Behavior::Hang);
        let s2 = MockSource::new(Behavior::Succeed("second"));
        let dispatcher = dispatcher(
            &[("s1", s1.clone()), ("s2", s2.clone())],
            DispatchOptions::default(),
        );

        let result = dispatcher.dispatch(&FetchParams::new()).await.unwrap();

        assert_eq!(result.source_name(), "s2");
        let health = dispatcher.registry().tracker().health("s1").unwrap();
        assert_eq!(health.last_error, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_all_failing_exhausts() {
        let s1 = MockSource::new(Behavior::Fail);
        let s2 = MockSource::new(Behavior::Empty);
        let dispatcher = dispatcher(
            &[("s1", s1.clone()), ("s2", s2.clone())],
            DispatchOptions::default(),
        );

        let err = dispatcher.dispatch(&FetchParams::new()).await.unwrap_err();

        assert_eq!(err.domain(), "news");
        assert_eq!(err.sources().len(), 2);
        assert_eq!(err.last_error_kind(), ErrorKind::InvalidPayload);
        assert_eq!(err.diagnostics().attempted_sources().len(), 2);
        let errors = err.diagnostics().errors();
        assert_eq!(errors[0].1, ErrorKind::Transport);
        assert_eq!(errors[0].2, "Transport error: 503 Service Unavailable");
        assert_eq!(errors[1].2, "Invalid payload: empty payload");
    }

    #[tokio::test]
    async fn test_fallback_disabled_stops_after_first_attempt() {
        let s1 = MockSource::new(Behavior::Fail);
        let s2 = MockSource::new(Behavior::Succeed("second"));
        let dispatcher = dispatcher(
            &[("s1", s1.clone()), ("s2", s2.clone())],
            DispatchOptions {
                fallback_enabled: false,
                min_available: 1,
            },
        );

        let err = dispatcher.dispatch(&FetchParams::new()).await.unwrap_err();

        assert_eq!(err.last_error_kind(), ErrorKind::Transport);
        assert_eq!(s1.calls(), 1);
        assert_eq!(s2.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_sources_exhausts_without_attempts() {
        let dispatcher = dispatcher(&[], DispatchOptions::default());

        let err = dispatcher.dispatch(&FetchParams::new()).await.unwrap_err();

        assert!(err.nothing_attempted());
        assert_eq!(err.last_error_kind(), ErrorKind::Exhausted);
        assert!(err.to_string().contains("no sources configured"));
    }
}
