#![allow(dead_code)]

use async_trait::async_trait;
use fleetlimit::{BucketStore, InMemoryBucketStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const T0: u64 = 1_700_000_000_000_000;

/// Wraps a store and counts `execute` calls.
#[derive(Clone, Default)]
pub struct CountingStore<S = InMemoryBucketStore> {
    inner: S,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, calls: Arc::new(AtomicUsize::new(0)), delay: None }
    }

    /// Hold every call for `delay` before reaching the inner store.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: BucketStore> BucketStore for CountingStore<S> {
    type Error = S::Error;

    async fn execute(&self, script: &str, key: &str, args: &[String]) -> Result<Vec<i64>, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.execute(script, key, args).await
    }
}

/// Always fails like an unreachable server.
#[derive(Clone, Default)]
pub struct FailingStore {
    calls: Arc<AtomicUsize>,
}

impl FailingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BucketStore for FailingStore {
    type Error = std::io::Error;

    async fn execute(&self, _: &str, _: &str, _: &[String]) -> Result<Vec<i64>, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"))
    }
}

/// Answers with a fixed reply regardless of input.
#[derive(Clone)]
pub struct FixedReplyStore(pub Vec<i64>);

#[async_trait]
impl BucketStore for FixedReplyStore {
    type Error = std::convert::Infallible;

    async fn execute(&self, _: &str, _: &str, _: &[String]) -> Result<Vec<i64>, Self::Error> {
        Ok(self.0.clone())
    }
}
