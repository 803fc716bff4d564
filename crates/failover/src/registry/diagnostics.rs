//! Per-dispatch attempt chain.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::errors::ErrorKind;
use crate::models::{FetchResult, SourceName};

/// Why a source was not attempted during a dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Source is inside its cooldown window.
    CoolingDown { remaining: Duration },

    /// Source was administratively disabled.
    Disabled,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CoolingDown { remaining } => write!(f, "cooling, {}s left", remaining.as_secs()),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Failure observed for an attempted source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Record of a single source during a dispatch.
#[derive(Clone, Debug)]
pub struct SourceAttempt {
    pub source: SourceName,
    pub skipped: Option<SkipReason>,
    pub error: Option<AttemptError>,
    pub success: bool,
    pub latency: Option<Duration>,
}

/// Ordered chain of skips and attempts made by one dispatch call.
#[derive(Clone, Debug, Default)]
pub struct DispatchDiagnostics {
    pub attempts: Vec<SourceAttempt>,
}

impl DispatchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, source: SourceName, reason: SkipReason) {
        self.attempts.push(SourceAttempt {
            source,
            skipped: Some(reason),
            error: None,
            success: false,
            latency: None,
        });
    }

    pub fn record_error(
        &mut self,
        source: SourceName,
        kind: ErrorKind,
        message: String,
        latency: Duration,
    ) {
        self.attempts.push(SourceAttempt {
            source,
            skipped: None,
            error: Some(AttemptError { kind, message }),
            success: false,
            latency: Some(latency),
        });
    }

    pub fn record_success(&mut self, source: SourceName, latency: Duration) {
        self.attempts.push(SourceAttempt {
            source,
            skipped: None,
            error: None,
            success: true,
            latency: Some(latency),
        });
    }

    /// Records a completed attempt. `message` describes a failure and
    /// defaults to the error kind.
    pub fn record_result<P>(&mut self, result: &FetchResult<P>, message: Option<String>) {
        match result.error_kind() {
            None => self.record_success(result.source.clone(), result.latency),
            Some(kind) => self.record_error(
                result.source.clone(),
                kind,
                message.unwrap_or_else(|| kind.to_string()),
                result.latency,
            ),
        }
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no sources".to_string();
        }
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.source)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({})", a.source, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({})", a.source, err.message)
                } else {
                    format!("{}: UNKNOWN", a.source)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    pub fn skip_reasons(&self) -> Vec<(&SourceName, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.as_ref().map(|s| (&a.source, s)))
            .collect()
    }

    pub fn errors(&self) -> Vec<(&SourceName, ErrorKind, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| {
                a.error
                    .as_ref()
                    .map(|e| (&a.source, e.kind, e.message.as_str()))
            })
            .collect()
    }

    /// Sources that were actually invoked, in order.
    pub fn attempted_sources(&self) -> Vec<&SourceName> {
        self.attempts
            .iter()
            .filter(|a| a.skipped.is_none())
            .map(|a| &a.source)
            .collect()
    }
}
