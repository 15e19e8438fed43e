use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::clients::{RemoteError, RemoteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failure detected, failing fast
    HalfOpen, // Probing whether the service is back
}

/// Per-collaborator breaker. When open, calls fail immediately with
/// `RemoteError::CircuitOpen` instead of reaching the remote service.
pub struct CircuitBreaker {
    name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Runs `call` unless the breaker is open. Only failures that indicate a
    /// sick remote (see `RemoteError::is_remote_fault`) count towards tripping.
    pub async fn call<T, F, Fut>(&self, call: F) -> RemoteResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        if !self.check().await {
            return Err(RemoteError::CircuitOpen(self.name.clone()));
        }

        match call().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                if e.is_remote_fault() {
                    self.record_failure().await;
                }
                Err(e)
            }
        }
    }

    async fn check(&self) -> bool {
        let state = *self.state.read().await;
        if state != CircuitState::Open {
            return true;
        }

        let last_fail = *self.last_failure.read().await;
        if let Some(instant) = last_fail {
            if instant.elapsed() >= self.reset_timeout {
                let mut s = self.state.write().await;
                *s = CircuitState::HalfOpen;
                tracing::info!("Circuit Breaker [{}] moving to Half-Open", self.name);
                return true;
            }
        }
        false
    }

    async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
        }
        self.failure_count.store(0, Ordering::SeqCst);
    }

    async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            let mut last = self.last_failure.write().await;
            *last = Some(Instant::now());
            tracing::error!("Circuit Breaker [{}] TRIPPED to Open. Failures: {}", self.name, count);
        }
    }
}
