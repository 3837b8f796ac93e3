//! Catalog client: cache, circuit breaker and transport for one upstream.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    BreakerConfig, CircuitBreaker, HttpMethod, HttpRequest, NetworkError, ResponseCache,
    Transport, request_key,
};

/// Timeouts, breaker thresholds and cache lifetime for one upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub http_timeout: Duration,
    pub reset_timeout: Duration,
    pub failure_threshold: u32,
    pub cache_ttl: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(30),
            failure_threshold: 5,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

impl NetworkConfig {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
        }
    }
}

/// One per provider. Clones share the same breaker and caches.
#[derive(Clone)]
pub struct CatalogClient {
    name: String,
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    json_cache: ResponseCache<Value>,
    text_cache: ResponseCache<String>,
    default_headers: Vec<(String, String)>,
    config: NetworkConfig,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("name", &self.name)
            .field("breaker", &self.breaker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>, config: NetworkConfig) -> Self {
        let name = name.into();
        Self {
            breaker: Arc::new(CircuitBreaker::new(name.clone(), config.breaker_config())),
            json_cache: ResponseCache::new(config.cache_ttl),
            text_cache: ResponseCache::new(config.cache_ttl),
            default_headers: Vec::new(),
            name,
            transport,
            config,
        }
    }

    /// Attach a header sent with every request (API keys and the like).
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> NetworkConfig {
        self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn json_cache(&self) -> &ResponseCache<Value> {
        &self.json_cache
    }

    /// False while the breaker would reject a call.
    pub fn is_available(&self) -> bool {
        self.breaker.allows_requests()
    }

    /// GET and decode as `T`. A body that is JSON but not a `T` counts as a
    /// failed call and is never cached.
    pub async fn get_json<T: DeserializeOwned + 'static>(&self, url: &str) -> Result<T, NetworkError> {
        let request = self.request(HttpRequest::get(url, self.config.http_timeout));
        let key = request_key(HttpMethod::Get, url, None);
        let fetch = self.send_json::<T>(request);
        let value = self
            .json_cache
            .get_or_fetch(&key, self.config.cache_ttl, move || fetch)
            .await?;
        self.decode_cached(&key, url, value)
    }

    /// POST a JSON body. Only cached when `cache` is set, keyed by a
    /// digest of the body.
    pub async fn post_json<T: DeserializeOwned + 'static>(
        &self,
        url: &str,
        body: Value,
        cache: bool,
    ) -> Result<T, NetworkError> {
        let key = request_key(HttpMethod::Post, url, Some(&body));
        let request = self.request(HttpRequest::post(url, body, self.config.http_timeout));
        let fetch = self.send_json::<T>(request);
        if !cache {
            return decode(url, fetch.await?);
        }
        let value = self
            .json_cache
            .get_or_fetch(&key, self.config.cache_ttl, move || fetch)
            .await?;
        self.decode_cached(&key, url, value)
    }

    /// Decode a value that may have come from the cache. The entry was
    /// checked against the type of the call that stored it; a caller asking
    /// for a different shape drops it rather than reading it for the TTL.
    fn decode_cached<T: DeserializeOwned>(
        &self,
        key: &str,
        url: &str,
        value: Value,
    ) -> Result<T, NetworkError> {
        decode(url, value).inspect_err(|e| {
            tracing::debug!(key, error = %e, "cached response has the wrong shape, evicting");
            self.json_cache.invalidate(key);
        })
    }

    pub async fn get_text(&self, url: &str) -> Result<String, NetworkError> {
        let request = self.request(HttpRequest::get(url, self.config.http_timeout));
        let key = request_key(HttpMethod::Get, url, None);
        let fetch = self.send_text(request);
        self.text_cache
            .get_or_fetch(&key, self.config.cache_ttl, move || fetch)
            .await
    }

    fn request(&self, mut request: HttpRequest) -> HttpRequest {
        request.headers.extend(self.default_headers.iter().cloned());
        request
    }

    fn send_text(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<String, NetworkError>> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let breaker = Arc::clone(&self.breaker);
        async move {
            breaker
                .call(move || async move { execute_with_timeout(transport.as_ref(), request).await })
                .await
        }
    }

    /// Fetch and parse inside the breaker. The body must decode as `T`, so
    /// a wrong-shaped response is a breaker failure and never reaches the
    /// cache.
    fn send_json<T: DeserializeOwned + 'static>(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<Value, NetworkError>> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let breaker = Arc::clone(&self.breaker);
        async move {
            breaker
                .call(move || async move {
                    let url = request.url.clone();
                    let text = execute_with_timeout(transport.as_ref(), request).await?;
                    let value = if text.trim().is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_str::<Value>(&text).map_err(|e| NetworkError::Decode {
                            url: url.clone(),
                            message: e.to_string(),
                        })?
                    };
                    decode::<T>(&url, value.clone())?;
                    Ok(value)
                })
                .await
        }
    }
}

async fn execute_with_timeout(
    transport: &dyn Transport,
    request: HttpRequest,
) -> Result<String, NetworkError> {
    let url = request.url.clone();
    let timeout = request.timeout;
    match tokio::time::timeout(timeout, transport.execute(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(url = %url, ?timeout, "request timed out");
            Err(NetworkError::Timeout { url })
        }
    }
}

fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T, NetworkError> {
    serde_json::from_value(value).map_err(|e| NetworkError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
