//! Coinpulse Failover Crate
//!
//! Fault-tolerant source failover for the coinpulse market/news bot.
//!
//! # Overview
//!
//! Market prices, sentiment and news come from several unreliable
//! providers. This crate:
//! - Tries a domain's sources in priority order until one succeeds
//! - Tracks per-source health and cools failing sources down
//! - Treats empty payloads as failures, never as data
//! - Fans out several domains concurrently under one deadline
//! - Returns an explicit, diagnosable error when nothing can serve a domain
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |    Aggregator    |  (fan-out across domains, overall deadline)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |    Dispatcher    | --> |  HealthTracker   |  (shared, per-source locks)
//! +------------------+     +------------------+
//!          |                        ^
//!          v                        |
//! +------------------+              |
//! |  SourceRegistry  | -------------+  (priority order, lazy availability)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! | FetchCapability  |  (provider adapters, supplied by the application)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Aggregator`] - `dispatch`, `aggregate`, health snapshot and resets
//! - [`Dispatcher`] - first-success-wins failover for one domain
//! - [`SourceRegistry`] / [`Source`] - configured providers of a domain
//! - [`HealthTracker`] - status, failure streaks and cooldowns
//! - [`FetchCapability`] / [`Payload`] - the adapter seam
//! - [`AggregateReport`] - partial-tolerant multi-domain result
//! - [`ExhaustionError`] - every source of a domain unavailable or failed

pub mod aggregator;
pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod models;
pub mod provider;
pub mod registry;

pub use models::{
    AggregateReport, Domain, FetchParams, FetchResult, HealthReport, MissingDomain, SourceName,
    SourceSnapshot,
};

pub use errors::{
    ConfigurationError, ErrorKind, ExhaustionError, FailoverError, FetchError, Result,
    SourceDiagnostic,
};

pub use health::{
    transition, Clock, CooldownPolicy, HealthEvent, HealthPolicy, HealthTracker, ManualClock,
    SourceHealth, SourceStatus, SystemClock, MAX_COOLDOWN,
};

pub use provider::{FetchCapability, Payload};

pub use registry::{DispatchDiagnostics, SkipReason, Source, SourceRegistry};

pub use aggregator::{AggregateOptions, Aggregator};
pub use builder::AggregatorBuilder;
pub use config::{AggregateSettings, DomainSettings, FailoverConfig, SourceSettings};
pub use dispatcher::{DispatchOptions, Dispatcher};
