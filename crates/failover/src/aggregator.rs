//! Concurrent fan-out across data domains.
//!
//! Each domain runs its own dispatcher in a separate task. Results are
//! merged as they complete; whatever is still running at the aggregate
//! deadline is aborted and reported missing. One exhausted domain never
//! fails the whole request.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::dispatcher::Dispatcher;
use crate::errors::{ConfigurationError, FailoverError, Result};
use crate::health::HealthTracker;
use crate::models::{
    AggregateReport, Domain, FetchParams, FetchResult, HealthReport, MissingDomain, SourceSnapshot,
};
use crate::provider::Payload;

/// Default overall deadline of an aggregate request.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);

/// Default number of domains dispatched at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Longest overall deadline an aggregate request can be given.
pub const MAX_DEADLINE: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Overall deadline; in-flight domains are cancelled when it passes.
    pub deadline: Duration,
    /// Upper bound on concurrently running domain dispatches.
    pub max_concurrency: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Entry point of the failover layer: per-domain dispatch, multi-domain
/// aggregation and health administration over one shared tracker.
pub struct Aggregator<P> {
    dispatchers: BTreeMap<Domain, Arc<Dispatcher<P>>>,
    tracker: Arc<HealthTracker>,
    options: AggregateOptions,
    startup_errors: Vec<ConfigurationError>,
}

impl<P: Payload> Aggregator<P> {
    pub fn new(tracker: Arc<HealthTracker>, options: AggregateOptions) -> Self {
        Self {
            dispatchers: BTreeMap::new(),
            tracker,
            options,
            startup_errors: Vec::new(),
        }
    }

    /// Adds a domain. Its registry must share this aggregator's tracker.
    pub fn add_domain(&mut self, dispatcher: Dispatcher<P>) -> std::result::Result<(), ConfigurationError> {
        let domain = dispatcher.domain().clone();
        if self.dispatchers.contains_key(&domain) {
            return Err(ConfigurationError::DuplicateDomain(domain.to_string()));
        }
        if !Arc::ptr_eq(dispatcher.registry().tracker(), &self.tracker) {
            return Err(ConfigurationError::InvalidSetting {
                name: domain.to_string(),
                message: "registry uses a different health tracker".to_string(),
            });
        }
        debug!(
            "Aggregator: added domain '{}' with sources {:?}",
            domain,
            dispatcher.registry().names()
        );
        self.dispatchers.insert(domain, Arc::new(dispatcher));
        Ok(())
    }

    pub(crate) fn push_startup_error(&mut self, error: ConfigurationError) {
        self.startup_errors.push(error);
    }

    /// Configuration problems found at startup, one per affected source.
    pub fn startup_errors(&self) -> &[ConfigurationError] {
        &self.startup_errors
    }

    pub fn domains(&self) -> Vec<&str> {
        self.dispatchers.keys().map(|d| &**d).collect()
    }

    pub fn dispatcher(&self, domain: &str) -> Option<&Dispatcher<P>> {
        self.dispatchers.get(domain).map(Arc::as_ref)
    }

    /// Mutable access for configuration reload. `None` while an aggregate
    /// request still holds the dispatcher.
    pub fn dispatcher_mut(&mut self, domain: &str) -> Option<&mut Dispatcher<P>> {
        self.dispatchers.get_mut(domain).and_then(Arc::get_mut)
    }

    pub fn tracker(&self) -> &Arc<HealthTracker> {
        &self.tracker
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    /// Fetch one domain with failover.
    pub async fn dispatch(&self, domain: &str, params: &FetchParams) -> Result<FetchResult<P>> {
        let dispatcher = self
            .dispatchers
            .get(domain)
            .ok_or_else(|| FailoverError::UnknownDomain(domain.to_string()))?;
        Ok(dispatcher.dispatch(params).await?)
    }

    /// Fetch every domain concurrently.
    pub async fn aggregate(&self, params: &FetchParams) -> AggregateReport<P> {
        let targets = self
            .dispatchers
            .iter()
            .map(|(domain, dispatcher)| (domain.clone(), dispatcher.clone()))
            .collect();
        self.fan_out(targets, params).await
    }

    /// Fetch the named domains concurrently.
    pub async fn aggregate_domains(
        &self,
        domains: &[&str],
        params: &FetchParams,
    ) -> Result<AggregateReport<P>> {
        let mut targets = Vec::with_capacity(domains.len());
        for name in domains {
            let (domain, dispatcher) = self
                .dispatchers
                .get_key_value(*name)
                .ok_or_else(|| FailoverError::UnknownDomain(name.to_string()))?;
            targets.push((domain.clone(), dispatcher.clone()));
        }
        Ok(self.fan_out(targets, params).await)
    }

    async fn fan_out(
        &self,
        targets: Vec<(Domain, Arc<Dispatcher<P>>)>,
        params: &FetchParams,
    ) -> AggregateReport<P> {
        let started = Instant::now();
        let deadline = started + self.options.deadline.min(MAX_DEADLINE);
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));

        let mut report = AggregateReport::new();
        let mut pending: BTreeSet<Domain> = BTreeSet::new();
        let mut tasks = JoinSet::new();

        for (domain, dispatcher) in targets {
            if !pending.insert(domain.clone()) {
                continue;
            }
            let semaphore = semaphore.clone();
            let params = params.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = dispatcher.dispatch(&params).await;
                (domain, outcome)
            });
        }

        let mut deadline_hit = false;
        loop {
            tokio::select! {
                biased;

                joined = tasks.join_next() => match joined {
                    Some(Ok((domain, outcome))) => {
                        pending.remove(&domain);
                        match outcome {
                            Ok(result) => report.insert_served(domain, result),
                            Err(exhausted) => {
                                report.insert_missing(domain, MissingDomain::exhausted(exhausted))
                            }
                        }
                    }
                    Some(Err(e)) => warn!("Aggregate task ended without a result: {}", e),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        if deadline_hit {
            tasks.abort_all();
            warn!(
                "Aggregate deadline of {:?} passed with {} domain(s) in flight: {:?}",
                self.options.deadline,
                pending.len(),
                pending
            );
        }

        for domain in pending {
            let missing = if deadline_hit {
                MissingDomain::deadline_exceeded()
            } else {
                MissingDomain::aborted()
            };
            report.insert_missing(domain, missing);
        }

        report.finish(started.elapsed(), deadline_hit);
        debug!(
            "Aggregate finished in {:?}: {} served, {} missing",
            report.elapsed(),
            report.served().len(),
            report.missing().len()
        );
        report
    }

    /// Health of every source, grouped by domain in priority order.
    pub fn health_snapshot(&self) -> Vec<SourceSnapshot> {
        self.dispatchers
            .values()
            .flat_map(|d| d.registry().snapshots())
            .collect()
    }

    pub fn health_report(&self) -> HealthReport {
        HealthReport::new(self.health_snapshot())
    }

    pub fn reset(&self, name: &str) -> Result<()> {
        self.tracker.reset(name)
    }

    pub fn reset_all(&self) {
        self.tracker.reset_all();
        info!("All source health reset by administrator");
    }
}
