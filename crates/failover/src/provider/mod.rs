//! Fetch capability abstraction.
//!
//! Provider adapters implement [`FetchCapability`]; the dispatcher owns
//! timeouts, validation and health bookkeeping around them.

mod traits;

pub use traits::{FetchCapability, Payload};
