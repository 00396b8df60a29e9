use crate::bucket::{BucketArgs, Decision, TOKEN_BUCKET_SCRIPT};
use crate::clock::{Clock, SystemClock};
use crate::config::{OnStoreError, RateLimiterConfig};
use crate::error::RateLimiterError;
use crate::rate_limit::store::BucketStore;
use crate::rate_limit::RateLimiter;
use crate::telemetry::{emit_best_effort, LimiterEvent, NullSink, TelemetrySink};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A token bucket shared by every process that uses the same key and store.
///
/// The bucket itself lives in the [`BucketStore`]; this handle only keeps the
/// last [`Decision`] it saw. While that decision is a denial whose ticket time
/// has not arrived, calls are denied locally without contacting the store.
/// Otherwise the call takes a per-handle lock, checks the cached decision
/// again, and runs the bucket procedure remotely.
///
/// The cached ticket time was computed for the permit count of the call that
/// produced it, so a smaller request may be denied locally even though the
/// store would have admitted it. The store stays the only source of admits.
///
/// # Examples
/// ```
/// use fleetlimit::{InMemoryBucketStore, ManualClock, SharedRateLimiter};
///
/// # #[tokio::main]
/// # async fn main() {
/// let clock = ManualClock::new(1_000_000);
/// let limiter = SharedRateLimiter::new(InMemoryBucketStore::new(), "search", 2.0)
///     .unwrap()
///     .with_clock(clock.clone());
///
/// assert!(limiter.try_acquire().await.unwrap());
/// assert!(limiter.try_acquire().await.unwrap());
/// assert!(!limiter.try_acquire().await.unwrap());
///
/// clock.advance(500_000);
/// assert!(limiter.try_acquire().await.unwrap());
/// # }
/// ```
pub struct SharedRateLimiter<S, T = NullSink> {
    config: RateLimiterConfig,
    stable_interval_micros: f64,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    sink: T,
    cached: ArcSwapOption<Decision>,
    refresh: tokio::sync::Mutex<()>,
}

impl<S, T> std::fmt::Debug for SharedRateLimiter<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRateLimiter")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("cached", &self.last_decision())
            .finish_non_exhaustive()
    }
}

impl<S> SharedRateLimiter<S, NullSink>
where
    S: BucketStore,
{
    /// Limit `key` to `permits_per_second` with a one second burst.
    pub fn new(
        store: S,
        key: impl Into<String>,
        permits_per_second: f64,
    ) -> Result<Self, RateLimiterError> {
        Ok(Self::from_config(store, RateLimiterConfig::new(key, permits_per_second)?))
    }

    /// Limit `key` to `permits_per_second` with a burst of `max_permits`.
    pub fn with_max_permits(
        store: S,
        key: impl Into<String>,
        permits_per_second: f64,
        max_permits: f64,
    ) -> Result<Self, RateLimiterError> {
        let config = RateLimiterConfig::with_max_permits(key, permits_per_second, max_permits)?;
        Ok(Self::from_config(store, config))
    }

    /// Build from an already validated config.
    pub fn from_config(store: S, config: RateLimiterConfig) -> Self {
        Self {
            stable_interval_micros: config.stable_interval_micros(),
            config,
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            sink: NullSink,
            cached: ArcSwapOption::empty(),
            refresh: tokio::sync::Mutex::new(()),
        }
    }
}

impl<S, T> SharedRateLimiter<S, T> {
    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Report every outcome to `sink`.
    pub fn with_sink<U: TelemetrySink>(self, sink: U) -> SharedRateLimiter<S, U> {
        SharedRateLimiter {
            config: self.config,
            stable_interval_micros: self.stable_interval_micros,
            store: self.store,
            clock: self.clock,
            sink,
            cached: self.cached,
            refresh: self.refresh,
        }
    }

    /// Bucket configuration.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Last decision returned by the store, if any call reached it.
    pub fn last_decision(&self) -> Option<Decision> {
        self.cached.load_full().map(|d| *d)
    }

    /// Time left on a cached denial, if one still applies at `now_micros`.
    fn cached_denial(&self, now_micros: u64) -> Option<Duration> {
        let cached = self.cached.load();
        match cached.as_deref() {
            Some(d) if !d.allowed && now_micros < d.next_free_ticket_micros => {
                Some(d.retry_after(now_micros))
            }
            _ => None,
        }
    }
}

impl<S, T> SharedRateLimiter<S, T>
where
    S: BucketStore,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    /// Try to take one permit. Never waits for capacity.
    pub async fn try_acquire(&self) -> Result<bool, RateLimiterError> {
        self.try_acquire_permits(1).await
    }

    /// Try to take `permits` permits at once. Never waits for capacity.
    ///
    /// # Errors
    /// [`RateLimiterError::Validation`] if `permits` is zero.
    /// [`RateLimiterError::Execution`] if the store fails and the config's
    /// [`OnStoreError`] policy is `Propagate`.
    pub async fn try_acquire_permits(&self, permits: u64) -> Result<bool, RateLimiterError> {
        if permits == 0 {
            return Err(RateLimiterError::Validation { permits });
        }
        let now = self.clock.now_micros();

        if let Some(retry_after) = self.cached_denial(now) {
            return Ok(self.fail_fast(permits, retry_after).await);
        }

        let guard = self.refresh.lock().await;
        if let Some(retry_after) = self.cached_denial(now) {
            drop(guard);
            return Ok(self.fail_fast(permits, retry_after).await);
        }
        let outcome = self.call_store(now, permits).await;
        if let Ok(decision) = &outcome {
            self.cached.store(Some(Arc::new(*decision)));
        }
        drop(guard);

        match outcome {
            Ok(decision) => {
                self.record(now, permits, &decision).await;
                Ok(decision.allowed)
            }
            Err(err) => self.store_failed(err).await,
        }
    }

    async fn call_store(&self, now_micros: u64, permits: u64) -> Result<Decision, RateLimiterError> {
        let key = self.config.key();
        let args = BucketArgs {
            stable_interval_micros: self.stable_interval_micros,
            max_permits: self.config.max_permits(),
            now_micros,
            requested_permits: permits,
        }
        .encode();
        let reply = self
            .store
            .execute(TOKEN_BUCKET_SCRIPT, key, &args)
            .await
            .map_err(|e| RateLimiterError::execution(key, e))?;
        Decision::from_reply(&reply).map_err(|e| RateLimiterError::execution(key, e))
    }

    async fn fail_fast(&self, permits: u64, retry_after: Duration) -> bool {
        tracing::trace!(key = self.config.key(), permits, ?retry_after, "denied from cached decision");
        self.emit(LimiterEvent::FailFast { key: self.config.key().to_string(), permits, retry_after })
            .await;
        false
    }

    async fn record(&self, now_micros: u64, permits: u64, decision: &Decision) {
        let key = self.config.key().to_string();
        let event = if decision.allowed {
            tracing::trace!(key = %key, permits, stored = decision.stored_permits, "admitted");
            LimiterEvent::Admitted { key, permits, stored_permits: decision.stored_permits }
        } else {
            let retry_after = decision.retry_after(now_micros);
            tracing::debug!(key = %key, permits, ?retry_after, "denied by shared store");
            LimiterEvent::Denied { key, permits, retry_after }
        };
        self.emit(event).await;
    }

    async fn store_failed(&self, err: RateLimiterError) -> Result<bool, RateLimiterError> {
        let policy = self.config.store_error_policy();
        tracing::warn!(key = self.config.key(), error = %err, ?policy, "shared store call failed");
        self.emit(LimiterEvent::StoreFailed {
            key: self.config.key().to_string(),
            policy,
            error: err.to_string(),
        })
        .await;
        match policy {
            OnStoreError::Propagate => Err(err),
            OnStoreError::Allow => Ok(true),
            OnStoreError::Deny => Ok(false),
        }
    }

    async fn emit(&self, event: LimiterEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }
}

#[async_trait]
impl<S, T> RateLimiter for SharedRateLimiter<S, T>
where
    S: BucketStore + 'static,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    async fn acquire(&self, permits: u64) -> Result<bool, RateLimiterError> {
        self.try_acquire_permits(permits).await
    }
}
