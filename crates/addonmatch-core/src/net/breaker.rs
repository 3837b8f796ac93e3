//! Per-upstream circuit breaker
//!
//! States move `Closed -> Open -> HalfOpen -> Closed` (or back to `Open`).
//! While open, calls fail immediately with [`NetworkError::CircuitOpen`]
//! and never reach the transport. Once the reset timeout elapses a single
//! trial call is admitted; every other caller keeps failing fast until the
//! trial settles.

use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use super::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

/// A state transition, delivered to listeners in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerEvent {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

type Listener = Box<dyn Fn(&BreakerEvent) + Send + Sync>;

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    listeners: Mutex<Vec<Listener>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    /// Current recorded state. An `Open` breaker whose timeout has elapsed
    /// is still reported as `Open` until the next call promotes it.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Whether a call issued now would be admitted.
    pub fn allows_requests(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.reset_elapsed(&inner),
            CircuitState::HalfOpen => !inner.trial_in_flight,
        }
    }

    /// Register a listener for state transitions.
    ///
    /// Listeners run synchronously on the task that caused the transition,
    /// in registration order. They must not register further listeners.
    pub fn on_state_change<F>(&self, listener: F)
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(listener));
    }

    /// Run `f` through the breaker.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, NetworkError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, NetworkError>>,
    {
        let mut permit = self.acquire()?;
        let result = f().await;
        match &result {
            Ok(_) => permit.succeed(),
            Err(err) if counts_as_failure(err) => permit.fail(),
            Err(_) => permit.succeed(),
        }
        result
    }

    fn acquire(&self) -> Result<Permit<'_>, NetworkError> {
        let mut transition = None;
        let trial = {
            let mut inner = self.lock();
            let state = inner.state;
            match state {
                CircuitState::Closed => false,
                CircuitState::Open if self.reset_elapsed(&inner) => {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                    true
                }
                CircuitState::HalfOpen if !inner.trial_in_flight => {
                    inner.trial_in_flight = true;
                    true
                }
                CircuitState::Open | CircuitState::HalfOpen => {
                    tracing::debug!(breaker = %self.name, "rejecting call, circuit open");
                    return Err(NetworkError::CircuitOpen {
                        name: self.name.clone(),
                    });
                }
            }
        };
        if let Some((from, to)) = transition {
            self.emit(from, to);
        }
        Ok(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn record_success(&self) {
        let previous = {
            let mut inner = self.lock();
            let previous = inner.state;
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.trial_in_flight = false;
            previous
        };
        if previous != CircuitState::Closed {
            self.emit(previous, CircuitState::Closed);
        }
    }

    fn record_failure(&self) {
        let previous = {
            let mut inner = self.lock();
            let previous = inner.state;
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            inner.trial_in_flight = false;
            let should_open = match previous {
                CircuitState::HalfOpen => true,
                CircuitState::Closed => {
                    inner.consecutive_failures >= self.config.failure_threshold
                }
                CircuitState::Open => false,
            };
            if !should_open {
                return;
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            previous
        };
        self.emit(previous, CircuitState::Open);
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn reset_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .opened_at
            .is_none_or(|opened| opened.elapsed() >= self.config.reset_timeout)
    }

    fn emit(&self, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Open => tracing::warn!(breaker = %self.name, "circuit breaker open"),
            CircuitState::Closed => tracing::info!(breaker = %self.name, "circuit breaker closed"),
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "circuit breaker half-open, admitting trial")
            }
        }
        let event = BreakerEvent {
            name: self.name.clone(),
            from,
            to,
        };
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            listener(&event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Client errors (4xx) describe the request, not the upstream's health.
fn counts_as_failure(err: &NetworkError) -> bool {
    match err {
        NetworkError::Status { status, .. } => !(400..500).contains(status),
        NetworkError::CircuitOpen { .. } => false,
        _ => true,
    }
}

/// Admission for one call. Dropping an unsettled trial permit (the caller
/// was cancelled) frees the trial slot without changing state.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    fn succeed(&mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn fail(&mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(10),
            },
        )
    }

    fn server_error() -> NetworkError {
        NetworkError::Status {
            status: 503,
            url: "http://example.test".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold() {
        let breaker = breaker(2);
        for _ in 0..2 {
            let result: Result<(), _> = breaker.call(|| async { Err(server_error()) }).await;
            assert!(result.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allows_requests());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let breaker = breaker(2);
        let _: Result<(), _> = breaker.call(|| async { Err(server_error()) }).await;
        breaker.call(|| async { Ok(()) }).await.unwrap();
        let _: Result<(), _> = breaker.call(|| async { Err(server_error()) }).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_do_not_trip() {
        let breaker = breaker(1);
        let result: Result<(), _> = breaker
            .call(|| async {
                Err(NetworkError::Status {
                    status: 404,
                    url: "http://example.test/missing".to_string(),
                })
            })
            .await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_with_fresh_timeout() {
        let breaker = breaker(1);
        let _: Result<(), _> = breaker.call(|| async { Err(server_error()) }).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let _: Result<(), _> = breaker.call(|| async { Err(server_error()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!breaker.allows_requests());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(breaker.allows_requests());
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_see_transitions_in_order() {
        let breaker = breaker(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        breaker.on_state_change(move |event| {
            sink.lock().unwrap().push((event.from, event.to));
        });

        let _: Result<(), _> = breaker.call(|| async { Err(server_error()) }).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        breaker.call(|| async { Ok(()) }).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_trial_frees_the_slot() {
        let breaker = breaker(1);
        let calls = AtomicUsize::new(0);
        let _: Result<(), _> = breaker.call(|| async { Err(server_error()) }).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        {
            let pending = breaker.call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Result<(), NetworkError>>().await
            });
            let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
            assert!(timed_out.is_err());
        }

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allows_requests());
        breaker.call(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
