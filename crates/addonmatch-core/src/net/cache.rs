//! TTL response cache with in-flight request collapsing
//!
//! `get_or_fetch` returns an unexpired cached value when there is one.
//! Otherwise it joins the in-flight call for the same key, or starts one.
//! Only successful, cacheable values are stored. Failures are handed to
//! every waiter of that call and then forgotten.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use super::{HttpMethod, NetworkError};

/// Values the cache can hold.
pub trait CacheValue: Clone + Send + Sync + 'static {
    /// Empty responses are returned to the caller but never stored.
    fn is_cacheable(&self) -> bool {
        true
    }
}

impl CacheValue for serde_json::Value {
    fn is_cacheable(&self) -> bool {
        !self.is_null()
    }
}

impl CacheValue for String {
    fn is_cacheable(&self) -> bool {
        !self.trim().is_empty()
    }
}

/// Cache key for a request: method, url and a digest of the body.
pub fn request_key(method: HttpMethod, url: &str, body: Option<&serde_json::Value>) -> String {
    match body {
        Some(body) => {
            let digest = blake3::hash(body.to_string().as_bytes());
            format!("{method} {url}#{}", digest.to_hex())
        }
        None => format!("{method} {url}"),
    }
}

type InFlight<V> = Shared<BoxFuture<'static, Result<V, NetworkError>>>;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct CacheInner<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    in_flight: Mutex<HashMap<String, InFlight<V>>>,
}

impl<V: CacheValue> CacheInner<V> {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight<V>>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert `value` and drop every expired entry, so keys that are never
    /// asked for again do not accumulate.
    fn store(&self, key: String, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Store the result (if cacheable) and retire the in-flight call.
    ///
    /// Both happen under the in-flight lock so a caller can never miss the
    /// cache and the in-flight map at the same time.
    fn complete(&self, key: &str, result: &Result<V, NetworkError>, ttl: Duration) {
        let mut in_flight = self.in_flight();
        match result {
            Ok(value) if value.is_cacheable() => self.store(key.to_string(), value.clone(), ttl),
            Ok(_) => tracing::debug!(key, "not caching empty response"),
            Err(err) => tracing::debug!(key, error = %err, "not caching failed response"),
        }
        in_flight.remove(key);
    }
}

pub struct ResponseCache<V> {
    inner: Arc<CacheInner<V>>,
    default_ttl: Duration,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            default_ttl: self.default_ttl,
        }
    }
}

impl<V> fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl<V: CacheValue> ResponseCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lookup(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if !value.is_cacheable() {
            return;
        }
        self.inner.store(key.into(), value, ttl);
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.entries().remove(key);
    }

    /// Number of stored entries that have not expired.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight().len()
    }

    /// Return the cached value for `key`, or run `fetch` once for all
    /// concurrent callers asking for the same key.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<V, NetworkError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, NetworkError>> + Send + 'static,
    {
        if let Some(hit) = self.inner.lookup(key) {
            tracing::debug!(key, "cache hit");
            return Ok(hit);
        }

        // Check-then-insert stays inside one lock scope: no await between.
        let call = {
            let mut in_flight = self.inner.in_flight();
            if let Some(existing) = in_flight.get(key) {
                tracing::debug!(key, "joining in-flight request");
                existing.clone()
            } else {
                if let Some(hit) = self.inner.lookup(key) {
                    return Ok(hit);
                }
                let inner = Arc::clone(&self.inner);
                let owned_key = key.to_string();
                let request = fetch();
                let call = async move {
                    let result = request.await;
                    inner.complete(&owned_key, &result, ttl);
                    result
                }
                .boxed()
                .shared();
                in_flight.insert(key.to_string(), call.clone());
                call
            }
        };

        call.await
    }
}
