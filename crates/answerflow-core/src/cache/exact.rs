//! Exact-key response cache.
//!
//! Wraps an async call so that repeated invocations with the same identity
//! and arguments are served from the key-value store. The key is a
//! canonical, order-independent encoding of the call:
//!
//! ```text
//! {prefix}:{environment}:{module}:{function}:{args}:{kwargs}
//! ```
//!
//! Arguments are serialized through `serde_json::Value`, whose object maps
//! are key-ordered, so two calls differing only in mapping insertion order
//! produce the same key. A store outage degrades the wrapper to a no-op:
//! the wrapped call runs directly and the failure is logged, never raised.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use answerflow_traits::KvStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::ExactCacheConfig;
use crate::error::Result;

/// Static identity of a wrapped call, the Rust stand-in for the original
/// module path + qualified function name. The receiver never participates
/// in the key.
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    pub module: &'static str,
    pub function: &'static str,
}

impl CallSite {
    pub const fn new(module: &'static str, function: &'static str) -> Self {
        Self { module, function }
    }
}

/// Validates a serialized result before it is persisted. A failed
/// validation marks the result uncacheable; it is still returned to the
/// caller.
pub trait ResponseValidator: Send + Sync {
    fn validate(&self, value: &serde_json::Value) -> bool;
}

/// Validator that accepts a payload iff it deserializes as `T`.
pub struct TypedValidator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedValidator<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + Sync> ResponseValidator for TypedValidator<T> {
    fn validate(&self, value: &serde_json::Value) -> bool {
        serde_json::from_value::<T>(value.clone()).is_ok()
    }
}

/// Exact-key caching strategy over a [`KvStore`].
#[derive(Clone)]
pub struct ExactCache {
    store: Arc<dyn KvStore>,
    config: ExactCacheConfig,
}

impl ExactCache {
    pub fn new(store: Arc<dyn KvStore>, config: ExactCacheConfig) -> Self {
        Self { store, config }
    }

    /// Canonical order-independent encoding of a serializable value.
    fn canonical<V: Serialize>(value: &V) -> Result<String> {
        Ok(serde_json::to_value(value)?.to_string())
    }

    /// Compute the cache key for a call.
    pub fn compute_key<A, K>(&self, site: CallSite, args: &A, kwargs: &K) -> Result<String>
    where
        A: Serialize,
        K: Serialize,
    {
        Ok(format!(
            "{}:{}:{}:{}:{}:{}",
            self.config.prefix,
            self.config.environment,
            site.module,
            site.function,
            Self::canonical(args)?,
            Self::canonical(kwargs)?,
        ))
    }

    /// Run `f` through the cache with the configured TTL.
    ///
    /// Hit: the stored payload is deserialized and returned without
    /// invoking `f`. Miss: `f` runs, its result is validated when a
    /// validator is supplied, persisted when cacheable, and returned
    /// either way.
    pub async fn wrap<A, K, T, F, Fut>(
        &self,
        site: CallSite,
        args: &A,
        kwargs: &K,
        validator: Option<&dyn ResponseValidator>,
        f: F,
    ) -> Result<T>
    where
        A: Serialize,
        K: Serialize,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.compute_key(site, args, kwargs)?;
        debug!(%key, "cache key computed");

        let cached = match self.store.get(&key).await {
            Ok(value) => value,
            Err(error) => {
                warn!(%key, %error, "store unavailable, calling through");
                return f().await;
            }
        };

        if let Some(payload) = cached {
            match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    info!(%key, "cache hit");
                    return Ok(value);
                }
                Err(error) => {
                    warn!(%key, %error, "stored payload undecodable, treating as miss");
                }
            }
        } else {
            info!(%key, "cache miss");
        }

        let result = f().await?;
        let serialized = serde_json::to_string(&result)?;

        if let Some(validator) = validator {
            let value = serde_json::from_str::<serde_json::Value>(&serialized)?;
            if !validator.validate(&value) {
                warn!(%key, "validation failed, result not cached");
                return Ok(result);
            }
        }

        match self.store.set(&key, serialized, self.config.ttl()).await {
            Ok(()) => info!(%key, "cache stored"),
            Err(error) => warn!(%key, %error, "cache store failed"),
        }
        Ok(result)
    }

    /// Remove one entry.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.delete(key).await?;
        Ok(())
    }

    /// List entries under this cache's prefix and environment.
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let pattern = format!("{}:{}:*", self.config.prefix, self.config.environment);
        Ok(self.store.keys(&pattern).await?)
    }

    /// TTL applied to stored entries.
    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }
}
