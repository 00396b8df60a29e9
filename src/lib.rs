#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # fleetlimit
//!
//! One global rate limit, enforced by many processes at once.
//!
//! A token bucket (requests per second with a bounded burst) is kept in an
//! external store that runs the refill-and-consume step atomically. Every
//! process holding a [`SharedRateLimiter`] for the same key draws from the
//! same bucket. Each call returns an immediate admit/deny answer; nothing
//! waits for capacity.
//!
//! ## Features
//!
//! - **Atomic bucket procedure** as native Rust ([`bucket::refill_and_consume`])
//!   and as a Lua script ([`TOKEN_BUCKET_SCRIPT`]) for Redis-like stores
//! - **Fail-fast cache**: a cached denial short-circuits calls locally until
//!   its ticket time passes, so denied bursts don't hammer the store
//! - **Explicit failure policy** ([`OnStoreError`]): propagate, fail open or fail closed
//! - **Telemetry** through `tower::Service` sinks, logging through `tracing`
//! - **Tower middleware** ([`RateLimitLayer`]) to guard any service
//!
//! ## Quick Start
//!
//! ```rust
//! use fleetlimit::{InMemoryBucketStore, SharedRateLimiter};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Swap in `fleetlimit_redis::RedisBucketStore` to share across machines.
//!     let store = InMemoryBucketStore::new();
//!     let limiter = SharedRateLimiter::with_max_permits(store, "outbound-api", 100.0, 20.0)
//!         .expect("valid config");
//!
//!     if limiter.try_acquire().await.expect("store reachable") {
//!         // do the work
//!     }
//! }
//! ```

pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod telemetry;

// Re-exports
pub use bucket::{BucketArgs, BucketState, Decision, TOKEN_BUCKET_SCRIPT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OnStoreError, RateLimiterConfig};
pub use error::{ArgumentError, BoxError, ConfigError, RateLimiterError, ReplyError};
pub use rate_limit::{
    BucketStore, GuardError, InMemoryBucketStore, InMemoryStoreError, RateLimitLayer,
    RateLimitService, RateLimiter, SharedRateLimiter,
};
