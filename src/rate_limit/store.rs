use crate::bucket::{refill_and_consume, BucketArgs, BucketState};
use crate::error::ArgumentError;
use async_trait::async_trait;

/// The shared store that runs the bucket procedure atomically.
///
/// Implementations receive the procedure source, the bucket key and the
/// ordered arguments from [`BucketArgs::encode`], and answer with the three
/// integers read by [`Decision::from_reply`](crate::Decision::from_reply).
/// Every call must be linearizable per key across all clients; the limiter
/// relies on this and never read-modify-writes bucket state itself.
///
/// Connection handling, timeouts and cancellation belong to the implementation.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run `script` against `key` with `args`.
    async fn execute(&self, script: &str, key: &str, args: &[String])
        -> Result<Vec<i64>, Self::Error>;
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Errors from [`InMemoryBucketStore`].
#[derive(Debug, thiserror::Error)]
pub enum InMemoryStoreError {
    /// The encoded arguments were rejected.
    #[error("malformed bucket arguments: {0}")]
    MalformedArguments(#[from] ArgumentError),
}

/// Process-local bucket store.
///
/// Runs the native form of the bucket procedure under a mutex, so it is
/// atomic for every limiter in this process. It ignores the script source.
#[derive(Default, Clone, Debug)]
pub struct InMemoryBucketStore {
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl InMemoryBucketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the state stored under `key`.
    pub fn state(&self, key: &str) -> Option<BucketState> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).get(key).copied()
    }

    /// Number of buckets created so far.
    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when no bucket exists yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every bucket; the next call per key starts full again.
    pub fn clear(&self) {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    type Error = InMemoryStoreError;

    async fn execute(
        &self,
        _script: &str,
        key: &str,
        args: &[String],
    ) -> Result<Vec<i64>, Self::Error> {
        let args = BucketArgs::decode(args)?;
        let mut guard = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let (state, decision) = refill_and_consume(guard.get(key).copied(), &args);
        guard.insert(key.to_string(), state);
        Ok(decision.to_reply().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::TOKEN_BUCKET_SCRIPT;

    fn encoded(interval: f64, max: f64, now: u64, permits: u64) -> [String; 4] {
        BucketArgs {
            stable_interval_micros: interval,
            max_permits: max,
            now_micros: now,
            requested_permits: permits,
        }
        .encode()
    }

    #[tokio::test]
    async fn persists_state_per_key() {
        let store = InMemoryBucketStore::new();
        assert!(store.is_empty());

        let reply = store.execute(TOKEN_BUCKET_SCRIPT, "a", &encoded(100.0, 2.0, 10, 2)).await.unwrap();
        assert_eq!(reply, vec![1, 10, 0]);
        let reply = store.execute(TOKEN_BUCKET_SCRIPT, "a", &encoded(100.0, 2.0, 10, 1)).await.unwrap();
        assert_eq!(reply, vec![0, 110, 0]);
        let reply = store.execute(TOKEN_BUCKET_SCRIPT, "b", &encoded(100.0, 2.0, 10, 1)).await.unwrap();
        assert_eq!(reply, vec![1, 10, 1]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.state("a"), Some(BucketState { stored_permits: 0.0, last_refill_micros: 10 }));
        store.clear();
        assert!(store.state("a").is_none());
    }

    #[tokio::test]
    async fn rejects_malformed_arguments_without_touching_state() {
        let store = InMemoryBucketStore::new();
        let err = store.execute(TOKEN_BUCKET_SCRIPT, "a", &["1".to_string()]).await.unwrap_err();
        assert!(matches!(err, InMemoryStoreError::MalformedArguments(ArgumentError::Arity(1))));
        assert!(store.is_empty());
    }
}
