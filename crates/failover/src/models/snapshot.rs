use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::SourceName;
use crate::errors::ErrorKind;
use crate::health::SourceStatus;

/// Point-in-time health view of one source, for admin commands and logs.
#[derive(Clone, Debug, Serialize)]
pub struct SourceSnapshot {
    pub name: SourceName,
    pub status: SourceStatus,
    pub consecutive_failures: u32,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub success_rate: f64,
    pub cooldown_remaining: Option<Duration>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

impl SourceSnapshot {
    pub fn is_available(&self) -> bool {
        self.status.is_admissible()
    }
}

impl Display for SourceSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} | success rate: {:.1}% | consecutive failures: {}",
            self.name,
            self.status,
            self.success_rate * 100.0,
            self.consecutive_failures
        )?;
        if let Some(remaining) = self.cooldown_remaining {
            write!(f, " (cooling: {}s)", remaining.as_secs())?;
        }
        if let Some(reason) = &self.disabled_reason {
            write!(f, " (disabled: {reason})")?;
        }
        Ok(())
    }
}

/// Health of every tracked source.
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub total_sources: usize,
    pub available_sources: usize,
    pub sources: Vec<SourceSnapshot>,
}

impl HealthReport {
    pub fn new(sources: Vec<SourceSnapshot>) -> Self {
        Self {
            generated_at: Utc::now(),
            total_sources: sources.len(),
            available_sources: sources.iter().filter(|s| s.is_available()).count(),
            sources,
        }
    }

    pub fn source(&self, name: &str) -> Option<&SourceSnapshot> {
        self.sources.iter().find(|s| s.name == name)
    }
}

impl Display for HealthReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{}/{} sources available",
            self.available_sources, self.total_sources
        )?;
        for source in &self.sources {
            writeln!(f, "  {source}")?;
        }
        Ok(())
    }
}
