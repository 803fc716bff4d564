//! Failover data models
//!
//! - `types` - Identifier aliases (SourceName, Domain)
//! - `params` - Opaque request parameters handed to fetch capabilities
//! - `fetch_result` - Outcome of one source attempt (FetchResult)
//! - `report` - Partial-tolerant aggregation result (AggregateReport, MissingDomain)
//! - `snapshot` - Health observability views (SourceSnapshot, HealthReport)

mod fetch_result;
mod params;
mod report;
mod snapshot;
mod types;

pub use fetch_result::FetchResult;
pub use params::FetchParams;
pub use report::{AggregateReport, MissingDomain};
pub use snapshot::{HealthReport, SourceSnapshot};
pub use types::{Domain, SourceName};
