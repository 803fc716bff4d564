use std::time::Duration;

use chrono::{DateTime, Utc};

use super::types::SourceName;
use crate::errors::ErrorKind;

/// Outcome of a single source attempt.
///
/// A successful result carries the payload exactly as the capability
/// returned it; a failed one carries only the error classification.
#[derive(Clone, Debug)]
pub struct FetchResult<P> {
    /// Source that produced this result
    pub source: SourceName,
    /// Payload on success, error kind on failure
    pub outcome: Result<P, ErrorKind>,
    /// Wall time spent on the attempt
    pub latency: Duration,
    /// When the attempt completed
    pub timestamp: DateTime<Utc>,
}

impl<P> FetchResult<P> {
    pub fn success(source: SourceName, payload: P, latency: Duration) -> Self {
        Self {
            source,
            outcome: Ok(payload),
            latency,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(source: SourceName, kind: ErrorKind, latency: Duration) -> Self {
        Self {
            source,
            outcome: Err(kind),
            latency,
            timestamp: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn source_name(&self) -> &str {
        &self.source
    }

    pub fn payload(&self) -> Option<&P> {
        self.outcome.as_ref().ok()
    }

    pub fn into_payload(self) -> Option<P> {
        self.outcome.ok()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.outcome.as_ref().err().copied()
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn test_success_result() {
        let result = FetchResult::success(
            Cow::Borrowed("coingecko"),
            vec![42_u32],
            Duration::from_millis(120),
        );
        assert!(result.succeeded());
        assert_eq!(result.source_name(), "coingecko");
        assert_eq!(result.payload(), Some(&vec![42]));
        assert!(result.error_kind().is_none());
    }

    #[test]
    fn test_failure_result() {
        let result: FetchResult<Vec<u32>> = FetchResult::failure(
            Cow::Borrowed("binance"),
            ErrorKind::Timeout,
            Duration::from_secs(10),
        );
        assert!(!result.succeeded());
        assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
        assert!(result.into_payload().is_none());
    }
}
