use crate::error::RateLimiterError;
use crate::rate_limit::RateLimiter;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Error returned by [`RateLimitService`].
#[derive(Debug)]
pub enum GuardError<E> {
    /// The limiter denied the request; the inner service was not called.
    RateLimited,
    /// The limiter itself failed (e.g. the shared store is down).
    Limiter(RateLimiterError),
    /// The inner service failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for GuardError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limit exceeded"),
            Self::Limiter(e) => write!(f, "rate limiter failed: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for GuardError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Limiter(e) => Some(e),
            Self::Inner(e) => Some(e),
            Self::RateLimited => None,
        }
    }
}

impl<E> GuardError<E> {
    /// Check if the request was denied by the limiter.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// A layer that enforces rate limits using a [`RateLimiter`].
#[derive(Debug)]
pub struct RateLimitLayer<L> {
    limiter: Arc<L>,
}

impl<L> Clone for RateLimitLayer<L> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone() }
    }
}

impl<L> RateLimitLayer<L> {
    /// Create a new rate limit layer.
    pub fn new(limiter: L) -> Self {
        Self { limiter: Arc::new(limiter) }
    }

    /// Share an existing limiter with other call sites.
    pub fn from_shared(limiter: Arc<L>) -> Self {
        Self { limiter }
    }
}

impl<S, L> Layer<S> for RateLimitLayer<L>
where
    L: RateLimiter + 'static,
{
    type Service = RateLimitService<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, limiter: self.limiter.clone() }
    }
}

/// Middleware service that takes one permit per request.
#[derive(Debug)]
pub struct RateLimitService<S, L> {
    inner: S,
    limiter: Arc<L>,
}

impl<S: Clone, L> Clone for RateLimitService<S, L> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), limiter: self.limiter.clone() }
    }
}

impl<S, L, Req> Service<Req> for RateLimitService<S, L>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    L: RateLimiter + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = GuardError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(GuardError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match limiter.acquire(1).await {
                Ok(true) => inner.call(req).await.map_err(GuardError::Inner),
                Ok(false) => Err(GuardError::RateLimited),
                Err(e) => Err(GuardError::Limiter(e)),
            }
        })
    }
}
