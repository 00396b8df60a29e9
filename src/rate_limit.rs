//! Rate limiting primitives.
//!
//! - [`RateLimiter`]: the acquisition interface the middleware depends on.
//! - [`SharedRateLimiter`]: token bucket kept in a [`BucketStore`] and shared
//!   by every process using the same key.
//! - [`RateLimitLayer`]: Tower middleware that enforces a limiter.
//!
//! # Architecture
//!
//! - **Middleware**: `RateLimitLayer` wraps your service. It doesn't know *how*
//!   limiting works, only that it should ask a `RateLimiter`.
//! - **Client**: `SharedRateLimiter` caches the last decision and skips the
//!   store while a cached denial still holds.
//! - **Storage**: `BucketStore` runs the bucket procedure atomically, either
//!   in-process ([`InMemoryBucketStore`]) or in a shared server (Redis).

use crate::error::RateLimiterError;

pub mod middleware;
pub mod shared;
pub mod store;
pub use middleware::{GuardError, RateLimitLayer, RateLimitService};
pub use shared::SharedRateLimiter;
pub use store::{BucketStore, InMemoryBucketStore, InMemoryStoreError};

/// Core interface for rate limiting logic.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Attempt to acquire `permits` permits. `Ok(false)` means denied.
    async fn acquire(&self, permits: u64) -> Result<bool, RateLimiterError>;
}
