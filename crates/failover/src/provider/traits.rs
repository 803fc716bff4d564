//! Fetch capability and payload trait definitions.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::errors::FetchError;
use crate::models::FetchParams;

/// One provider's fetch operation.
///
/// Implement this trait once per provider adapter. HTTP, authentication
/// and response parsing live in the adapter; the failover layer only sees
/// a payload or a [`FetchError`].
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use coinpulse_failover::{FetchCapability, FetchError, FetchParams};
///
/// struct CoinGecko {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl FetchCapability<serde_json::Value> for CoinGecko {
///     async fn fetch(
///         &self,
///         params: &FetchParams,
///         deadline: tokio::time::Instant,
///     ) -> Result<serde_json::Value, FetchError> {
///         // ... call the API, map errors to FetchError
///     }
/// }
/// ```
#[async_trait]
pub trait FetchCapability<P>: Send + Sync {
    /// Attempt one fetch.
    ///
    /// `deadline` is when the dispatcher will stop waiting. Adapters may
    /// pass it on to their HTTP client; the dispatcher enforces it either way.
    async fn fetch(&self, params: &FetchParams, deadline: Instant) -> Result<P, FetchError>;
}

/// Opaque payload produced by a fetch capability.
///
/// A structurally empty payload is never a success: an API answering
/// 200 with no data is treated as failing.
pub trait Payload: Send + 'static {
    /// Whether the payload carries no data.
    fn is_empty(&self) -> bool;

    /// Rejects unusable payloads. Rejects empty payloads by default.
    fn validate(&self) -> Result<(), FetchError> {
        if self.is_empty() {
            Err(FetchError::invalid_payload("empty payload"))
        } else {
            Ok(())
        }
    }
}

impl<T: Send + 'static> Payload for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl Payload for String {
    fn is_empty(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<K: Send + 'static, V: Send + 'static, S: Send + 'static> Payload for HashMap<K, V, S> {
    fn is_empty(&self) -> bool {
        HashMap::is_empty(self)
    }
}

impl<K: Send + 'static, V: Send + 'static> Payload for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

impl<T: Payload> Payload for Option<T> {
    fn is_empty(&self) -> bool {
        match self {
            Some(inner) => Payload::is_empty(inner),
            None => true,
        }
    }

    fn validate(&self) -> Result<(), FetchError> {
        match self {
            Some(inner) => inner.validate(),
            None => Err(FetchError::invalid_payload("no payload")),
        }
    }
}

impl Payload for serde_json::Value {
    fn is_empty(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => false,
        }
    }
}
