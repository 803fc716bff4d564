//! Source registry.
//!
//! This module provides:
//! - [`Source`]: one configured provider with its failure policy
//! - [`SourceRegistry`]: priority-ordered sources of a domain
//! - [`DispatchDiagnostics`]: the attempt chain of a dispatch call

mod diagnostics;
#[allow(clippy::module_inception)]
mod registry;
mod source;

pub use diagnostics::{AttemptError, DispatchDiagnostics, SkipReason, SourceAttempt};
pub use registry::{AvailableSources, SourceRegistry};
pub use source::{Source, DEFAULT_TIMEOUT, MAX_TIMEOUT};
