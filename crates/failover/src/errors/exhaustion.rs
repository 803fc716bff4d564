//! Exhaustion error with per-source diagnostics.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::Serialize;

use super::ErrorKind;
use crate::health::SourceStatus;
use crate::models::{Domain, SourceName};
use crate::registry::DispatchDiagnostics;

/// State of one configured source at the moment a dispatch gave up.
#[derive(Clone, Debug, Serialize)]
pub struct SourceDiagnostic {
    pub name: SourceName,
    pub priority: i32,
    pub status: SourceStatus,
    pub consecutive_failures: u32,
    pub cooldown_remaining: Option<Duration>,
    pub last_error: Option<ErrorKind>,
}

impl Display for SourceDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}", self.name, self.status)?;
        if let Some(remaining) = self.cooldown_remaining {
            write!(f, ", {}s left", remaining.as_secs())?;
        }
        if let Some(kind) = self.last_error {
            write!(f, ", last error: {kind}")?;
        }
        write!(f, "]")
    }
}

/// Every source of a domain was unavailable or failed within one dispatch.
///
/// Carries one [`SourceDiagnostic`] per configured source (attempted or
/// not) plus the attempt chain of the call, so the caller can explain the
/// outage instead of serving empty data.
#[derive(Clone, Debug)]
pub struct ExhaustionError {
    domain: Domain,
    sources: Vec<SourceDiagnostic>,
    diagnostics: DispatchDiagnostics,
}

impl ExhaustionError {
    pub fn new(
        domain: Domain,
        sources: Vec<SourceDiagnostic>,
        diagnostics: DispatchDiagnostics,
    ) -> Self {
        Self {
            domain,
            sources,
            diagnostics,
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Diagnostics for every configured source, in priority order.
    pub fn sources(&self) -> &[SourceDiagnostic] {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&SourceDiagnostic> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// The attempt chain of the failed dispatch.
    pub fn diagnostics(&self) -> &DispatchDiagnostics {
        &self.diagnostics
    }

    /// Kind of the last attempted failure, or `Exhausted` if no source
    /// could be attempted at all.
    pub fn last_error_kind(&self) -> ErrorKind {
        self.diagnostics
            .errors()
            .last()
            .map(|(_, kind, _)| *kind)
            .unwrap_or(ErrorKind::Exhausted)
    }

    /// Whether nothing was attempted because every source was cooling or disabled.
    pub fn nothing_attempted(&self) -> bool {
        self.diagnostics.attempted_sources().is_empty()
    }
}

impl Display for ExhaustionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "All sources exhausted for domain '{}'", self.domain)?;
        if self.sources.is_empty() {
            return write!(f, " (no sources configured)");
        }
        write!(f, ": ")?;
        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExhaustionError {}
