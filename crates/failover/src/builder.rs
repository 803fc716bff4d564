//! Startup wiring from configuration to a ready [`Aggregator`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::time::Instant;

use crate::aggregator::Aggregator;
use crate::config::{FailoverConfig, SourceSettings};
use crate::dispatcher::Dispatcher;
use crate::errors::{ConfigurationError, FetchError};
use crate::health::{Clock, HealthTracker};
use crate::models::FetchParams;
use crate::provider::{FetchCapability, Payload};
use crate::registry::{Source, SourceRegistry};

type CredentialLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Stand-in capability for a source with no adapter. The source is
/// disabled at startup, so this is never dispatched to.
struct Unconfigured;

#[async_trait]
impl<P: Payload> FetchCapability<P> for Unconfigured {
    async fn fetch(&self, _: &FetchParams, _: Instant) -> Result<P, FetchError> {
        Err(FetchError::transport("no adapter configured"))
    }
}

/// Builds an [`Aggregator`] from a [`FailoverConfig`] and a set of adapters.
///
/// Sources whose adapter is missing, or whose `credential_env` is unset,
/// are still registered but disabled; the problem is logged once and kept
/// in [`Aggregator::startup_errors`].
pub struct AggregatorBuilder<P> {
    config: FailoverConfig,
    adapters: HashMap<String, Arc<dyn FetchCapability<P>>>,
    credentials: CredentialLookup,
    clock: Option<Arc<dyn Clock>>,
}

impl<P: Payload> AggregatorBuilder<P> {
    pub fn new(config: FailoverConfig) -> Self {
        Self {
            config,
            adapters: HashMap::new(),
            credentials: Box::new(|var| std::env::var(var).ok()),
            clock: None,
        }
    }

    /// Registers the adapter used by sources named (or aliased) `name`.
    pub fn adapter(mut self, name: impl Into<String>, capability: Arc<dyn FetchCapability<P>>) -> Self {
        self.adapters.insert(name.into(), capability);
        self
    }

    /// Replaces the environment as the source of credentials.
    pub fn credentials(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.credentials = Box::new(lookup);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Aggregator<P>, ConfigurationError> {
        self.config.validate()?;

        let tracker = Arc::new(match &self.clock {
            Some(clock) => HealthTracker::with_clock(clock.clone()),
            None => HealthTracker::new(),
        });
        let mut aggregator = Aggregator::new(tracker.clone(), self.config.aggregate.options());
        let mut source_count = 0usize;

        for domain in &self.config.domains {
            let mut registry = SourceRegistry::new(tracker.clone());

            for settings in &domain.sources {
                let (capability, problem) = match self.adapters.get(settings.adapter_name()) {
                    Some(capability) => (capability.clone(), self.check_credential(settings)),
                    None => {
                        let capability: Arc<dyn FetchCapability<P>> = Arc::new(Unconfigured);
                        let problem = ConfigurationError::MissingAdapter {
                            source_name: settings.name.clone(),
                        };
                        (capability, Some(problem))
                    }
                };

                registry.register(
                    Source::new(settings.name.clone(), settings.priority, capability)
                        .with_policy(settings.health_policy())
                        .with_timeout(settings.timeout()),
                )?;
                source_count += 1;

                if let Some(problem) = problem {
                    // Registered just above, so the source is known.
                    if tracker.disable(&settings.name, problem.to_string()).is_ok() {
                        aggregator.push_startup_error(problem);
                    }
                }
            }

            debug!(
                "Domain '{}' wired with sources {:?}",
                domain.name,
                registry.names()
            );
            aggregator.add_domain(Dispatcher::with_options(
                domain.name.clone(),
                registry,
                domain.dispatch_options(),
            ))?;
        }

        info!(
            "Failover layer ready: {} domains, {} sources, {} disabled at startup",
            self.config.domains.len(),
            source_count,
            aggregator.startup_errors().len()
        );
        Ok(aggregator)
    }

    fn check_credential(&self, settings: &SourceSettings) -> Option<ConfigurationError> {
        let variable = settings.credential_env.as_ref()?;
        match (self.credentials)(variable) {
            Some(value) if !value.trim().is_empty() => None,
            _ => Some(ConfigurationError::MissingCredential {
                source_name: settings.name.clone(),
                variable: variable.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::DomainSettings;
    use crate::health::SourceStatus;

    struct Counting {
        calls: AtomicUsize,
        payload: &'static str,
    }

    #[async_trait]
    impl FetchCapability<String> for Counting {
        async fn fetch(&self, _: &FetchParams, _: Instant) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.to_string())
        }
    }

    fn counting(payload: &'static str) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            payload,
        })
    }

    fn news_config() -> FailoverConfig {
        let mut cryptopanic = SourceSettings::new("cryptopanic", 1);
        cryptopanic.credential_env = Some("CRYPTOPANIC_API_KEY".to_string());
        let coindesk = SourceSettings::new("coindesk", 2);
        let mut cointelegraph = SourceSettings::new("cointelegraph", 3);
        cointelegraph.adapter = Some("rss".to_string());

        FailoverConfig {
            domains: vec![DomainSettings::new(
                "news",
                vec![cryptopanic, coindesk, cointelegraph],
            )],
            ..FailoverConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_credential_disables_source() {
        let cryptopanic = counting("panic headline");
        let coindesk = counting("desk headline");
        let rss = counting("rss headline");

        let aggregator = AggregatorBuilder::<String>::new(news_config())
            .adapter("cryptopanic", cryptopanic.clone())
            .adapter("coindesk", coindesk.clone())
            .adapter("rss", rss.clone())
            .credentials(|_| None)
            .build()
            .unwrap();

        assert_eq!(aggregator.startup_errors().len(), 1);
        assert!(matches!(
            &aggregator.startup_errors()[0],
            ConfigurationError::MissingCredential { source_name, .. } if source_name == "cryptopanic"
        ));
        assert_eq!(
            aggregator.tracker().status("cryptopanic"),
            Some(SourceStatus::Disabled)
        );

        let result = aggregator.dispatch("news", &FetchParams::new()).await.unwrap();
        assert_eq!(result.source_name(), "coindesk");
        assert_eq!(cryptopanic.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_credential_present_enables_source() {
        let cryptopanic = counting("panic headline");
        let aggregator = AggregatorBuilder::<String>::new(news_config())
            .adapter("cryptopanic", cryptopanic.clone())
            .adapter("coindesk", counting("desk"))
            .adapter("rss", counting("rss"))
            .credentials(|var| (var == "CRYPTOPANIC_API_KEY").then(|| "secret".to_string()))
            .build()
            .unwrap();

        assert!(aggregator.startup_errors().is_empty());
        let result = aggregator.dispatch("news", &FetchParams::new()).await.unwrap();
        assert_eq!(result.into_payload().as_deref(), Some("panic headline"));
    }

    #[tokio::test]
    async fn test_missing_adapter_disables_source() {
        let aggregator = AggregatorBuilder::<String>::new(news_config())
            .adapter("coindesk", counting("desk"))
            .credentials(|_| Some("secret".to_string()))
            .build()
            .unwrap();

        let errors = aggregator.startup_errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(ConfigurationError::disables_source));

        let report = aggregator.health_report();
        assert_eq!(report.total_sources, 3);
        assert_eq!(report.available_sources, 1);
        assert_eq!(aggregator.domains(), vec!["news"]);
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let mut config = news_config();
        config.aggregate.max_concurrency = 0;

        let result = AggregatorBuilder::<String>::new(config).build();
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidSetting { .. })
        ));
    }
}
