//! Source health tracking.
//!
//! This module provides:
//! - [`SourceStatus`] and the pure [`transition`] function of the status machine
//! - [`HealthPolicy`] / [`CooldownPolicy`]: thresholds and cooldown lengths
//! - [`Clock`]: injectable time source
//! - [`HealthTracker`]: thread-safe per-source health records

mod clock;
mod policy;
mod state;
mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use policy::{CooldownPolicy, HealthPolicy, DEFAULT_COOLDOWN, DEFAULT_MAX_FAILURES, MAX_COOLDOWN};
pub use state::{transition, HealthEvent, SourceStatus};
pub use tracker::{HealthTracker, SourceHealth};
