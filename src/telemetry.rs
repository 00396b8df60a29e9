//! Telemetry for shared rate limiters.
//!
//! Every `try_acquire` outcome is reported as a [`LimiterEvent`] to a
//! [`TelemetrySink`], a `tower::Service<LimiterEvent>`. Sinks can log, count,
//! or forward events; emission is best effort and never affects the decision.
//!
//! ```rust
//! use fleetlimit::telemetry::LimiterEvent;
//! use std::time::Duration;
//!
//! let denied = LimiterEvent::Denied {
//!     key: "checkout".into(),
//!     permits: 1,
//!     retry_after: Duration::from_millis(100),
//! };
//! assert_eq!(denied.key(), "checkout");
//! ```

use crate::config::OnStoreError;
use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// A telemetry sink that consumes limiter events.
pub trait TelemetrySink:
    tower::Service<LimiterEvent, Response = (), Error = Self::SinkError> + Clone + Send + Sync + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: LimiterEvent)
where
    S: tower::Service<LimiterEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// Outcome of a single acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterEvent {
    /// The shared store admitted the request.
    Admitted {
        /// Bucket key
        key: String,
        /// Permits consumed
        permits: u64,
        /// Whole permits left in the bucket
        stored_permits: u64,
    },
    /// The shared store denied the request.
    Denied {
        /// Bucket key
        key: String,
        /// Permits requested
        permits: u64,
        /// Time until the request is expected to succeed
        retry_after: Duration,
    },
    /// A cached denial answered the request without contacting the store.
    FailFast {
        /// Bucket key
        key: String,
        /// Permits requested
        permits: u64,
        /// Time until the cached denial expires
        retry_after: Duration,
    },
    /// The shared store failed and the configured policy decided the outcome.
    StoreFailed {
        /// Bucket key
        key: String,
        /// Policy applied
        policy: OnStoreError,
        /// Rendered store error
        error: String,
    },
}

impl LimiterEvent {
    /// Bucket key the event refers to.
    pub fn key(&self) -> &str {
        match self {
            LimiterEvent::Admitted { key, .. }
            | LimiterEvent::Denied { key, .. }
            | LimiterEvent::FailFast { key, .. }
            | LimiterEvent::StoreFailed { key, .. } => key,
        }
    }
}

impl fmt::Display for LimiterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterEvent::Admitted { key, permits, stored_permits } => {
                write!(f, "Admitted({}, permits={}, stored={})", key, permits, stored_permits)
            }
            LimiterEvent::Denied { key, permits, retry_after } => {
                write!(f, "Denied({}, permits={}, retry_after={:?})", key, permits, retry_after)
            }
            LimiterEvent::FailFast { key, permits, retry_after } => {
                write!(f, "FailFast({}, permits={}, retry_after={:?})", key, permits, retry_after)
            }
            LimiterEvent::StoreFailed { key, policy, error } => {
                write!(f, "StoreFailed({}, policy={:?}, error={})", key, policy, error)
            }
        }
    }
}

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<LimiterEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: LimiterEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events at INFO level using `tracing`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<LimiterEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: LimiterEvent) -> Self::Future {
        tracing::info!(key = event.key(), event = %event, "limiter_event");
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A bounded in-memory sink, mostly for tests. Oldest events are evicted first.
///
/// ```rust
/// use fleetlimit::telemetry::{LimiterEvent, MemorySink};
/// use tower::Service;
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut sink = MemorySink::with_capacity(1);
/// for permits in 1..=2 {
///     let event = LimiterEvent::Admitted { key: "k".into(), permits, stored_permits: 0 };
///     sink.call(event).await.unwrap();
/// }
/// assert_eq!(sink.len(), 1);
/// assert_eq!(sink.evicted(), 1);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LimiterEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Creates a bounded memory sink (default cap: 10,000).
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Creates a bounded memory sink with explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<LimiterEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of all events received so far.
    pub fn events(&self) -> Vec<LimiterEvent> {
        self.guard().clone()
    }

    /// Clears all stored events.
    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Returns the number of events stored.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Returns true if no events are stored.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Returns the number of evicted events.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<LimiterEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: LimiterEvent) -> Self::Future {
        let mut guard = self.guard();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_compact() {
        let event = LimiterEvent::FailFast {
            key: "api".into(),
            permits: 2,
            retry_after: Duration::from_millis(5),
        };
        assert_eq!(event.to_string(), "FailFast(api, permits=2, retry_after=5ms)");

        let failed = LimiterEvent::StoreFailed {
            key: "api".into(),
            policy: OnStoreError::Allow,
            error: "boom".into(),
        };
        assert_eq!(failed.to_string(), "StoreFailed(api, policy=Allow, error=boom)");
    }

    #[tokio::test]
    async fn emit_best_effort_reaches_memory_sink() {
        let sink = MemorySink::new();
        let event = LimiterEvent::Admitted { key: "k".into(), permits: 1, stored_permits: 4 };
        emit_best_effort(sink.clone(), event.clone()).await;
        assert_eq!(sink.events(), vec![event]);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn null_and_log_sinks_accept_events() {
        let event = LimiterEvent::Denied {
            key: "k".into(),
            permits: 1,
            retry_after: Duration::from_secs(1),
        };
        emit_best_effort(NullSink, event.clone()).await;
        emit_best_effort(LogSink, event).await;
    }
}
