use std::collections::BTreeMap;
use std::time::Duration;

use super::fetch_result::FetchResult;
use super::types::Domain;
use crate::errors::{ErrorKind, ExhaustionError};

/// Why a domain is absent from an aggregate report.
#[derive(Clone, Debug)]
pub struct MissingDomain {
    /// Last error kind observed for the domain
    pub error_kind: ErrorKind,
    /// Per-source diagnostics when the domain exhausted its sources
    pub exhaustion: Option<ExhaustionError>,
}

impl MissingDomain {
    pub fn exhausted(error: ExhaustionError) -> Self {
        Self {
            error_kind: error.last_error_kind(),
            exhaustion: Some(error),
        }
    }

    pub fn deadline_exceeded() -> Self {
        Self {
            error_kind: ErrorKind::DeadlineExceeded,
            exhaustion: None,
        }
    }

    pub fn aborted() -> Self {
        Self {
            error_kind: ErrorKind::Aborted,
            exhaustion: None,
        }
    }
}

/// Result of fanning out one request across several domains.
///
/// A report can be complete, partial or empty; a missing domain is always
/// listed explicitly and never replaced by default data.
#[derive(Clone, Debug)]
pub struct AggregateReport<P> {
    served: BTreeMap<Domain, FetchResult<P>>,
    missing: BTreeMap<Domain, MissingDomain>,
    elapsed: Duration,
    deadline_hit: bool,
}

impl<P> Default for AggregateReport<P> {
    fn default() -> Self {
        Self {
            served: BTreeMap::new(),
            missing: BTreeMap::new(),
            elapsed: Duration::ZERO,
            deadline_hit: false,
        }
    }
}

impl<P> AggregateReport<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_served(&mut self, domain: Domain, result: FetchResult<P>) {
        self.missing.remove(&domain);
        self.served.insert(domain, result);
    }

    pub(crate) fn insert_missing(&mut self, domain: Domain, missing: MissingDomain) {
        if !self.served.contains_key(&domain) {
            self.missing.insert(domain, missing);
        }
    }

    pub(crate) fn finish(&mut self, elapsed: Duration, deadline_hit: bool) {
        self.elapsed = elapsed;
        self.deadline_hit = deadline_hit;
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.served.contains_key(domain) || self.missing.contains_key(domain)
    }

    /// Successful results keyed by domain.
    pub fn served(&self) -> &BTreeMap<Domain, FetchResult<P>> {
        &self.served
    }

    /// Missing domains with their last error kind.
    pub fn missing(&self) -> &BTreeMap<Domain, MissingDomain> {
        &self.missing
    }

    pub fn payload(&self, domain: &str) -> Option<&P> {
        self.served.get(domain).and_then(|r| r.payload())
    }

    pub fn served_by(&self, domain: &str) -> Option<&str> {
        self.served.get(domain).map(|r| r.source_name())
    }

    pub fn missing_kind(&self, domain: &str) -> Option<ErrorKind> {
        self.missing.get(domain).map(|m| m.error_kind)
    }

    /// Every requested domain was served.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Some domains were served and some are missing.
    pub fn is_partial(&self) -> bool {
        !self.served.is_empty() && !self.missing.is_empty()
    }

    /// Nothing was served.
    pub fn is_empty(&self) -> bool {
        self.served.is_empty()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether the aggregate deadline cut off in-flight domains.
    pub fn deadline_hit(&self) -> bool {
        self.deadline_hit
    }

    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<Domain, FetchResult<P>>,
        BTreeMap<Domain, MissingDomain>,
    ) {
        (self.served, self.missing)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn test_partial_report() {
        let mut report: AggregateReport<String> = AggregateReport::new();
        report.insert_served(
            Cow::Borrowed("price"),
            FetchResult::success(
                Cow::Borrowed("coingecko"),
                "BTC 97000".to_string(),
                Duration::from_millis(90),
            ),
        );
        report.insert_missing(Cow::Borrowed("sentiment"), MissingDomain::deadline_exceeded());

        assert!(report.is_partial());
        assert!(!report.is_complete());
        assert_eq!(report.served_by("price"), Some("coingecko"));
        assert_eq!(report.payload("price").map(String::as_str), Some("BTC 97000"));
        assert_eq!(
            report.missing_kind("sentiment"),
            Some(ErrorKind::DeadlineExceeded)
        );
    }

    #[test]
    fn test_served_domain_is_never_marked_missing() {
        let mut report: AggregateReport<String> = AggregateReport::new();
        report.insert_served(
            Cow::Borrowed("price"),
            FetchResult::success(Cow::Borrowed("coingecko"), "x".to_string(), Duration::ZERO),
        );
        report.insert_missing(Cow::Borrowed("price"), MissingDomain::aborted());

        assert!(report.is_complete());
        assert!(report.missing_kind("price").is_none());
    }

    #[test]
    fn test_empty_report() {
        let mut report: AggregateReport<String> = AggregateReport::new();
        report.insert_missing(Cow::Borrowed("news"), MissingDomain::aborted());
        assert!(report.is_empty());
        assert!(!report.is_partial());
        assert!(report.has_domain("news"));
    }
}
