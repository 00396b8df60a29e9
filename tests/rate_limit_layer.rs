mod common;

use common::{CountingStore, FailingStore, T0};
use fleetlimit::{GuardError, InMemoryBucketStore, ManualClock, RateLimitLayer, SharedRateLimiter};
use std::convert::Infallible;
use std::sync::Arc;
use tower::{service_fn, Layer, ServiceExt};

#[tokio::test]
async fn layer_admits_until_bucket_is_empty() {
    let limiter = SharedRateLimiter::new(InMemoryBucketStore::new(), "svc", 2.0)
        .unwrap()
        .with_clock(ManualClock::new(T0));
    let layer = RateLimitLayer::new(limiter);
    let svc = layer.layer(service_fn(|req: u32| async move { Ok::<_, Infallible>(req * 2) }));

    assert_eq!(svc.clone().oneshot(1).await.unwrap(), 2);
    assert_eq!(svc.clone().oneshot(2).await.unwrap(), 4);
    let err = svc.clone().oneshot(3).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.to_string(), "rate limit exceeded");
}

#[tokio::test]
async fn shared_layers_draw_from_one_cache() {
    let store = CountingStore::new(InMemoryBucketStore::new());
    let limiter = Arc::new(
        SharedRateLimiter::new(store.clone(), "svc", 2.0)
            .unwrap()
            .with_clock(ManualClock::new(T0)),
    );
    let reads = RateLimitLayer::from_shared(limiter.clone())
        .layer(service_fn(|_: ()| async { Ok::<_, Infallible>("read") }));
    let writes = RateLimitLayer::from_shared(limiter.clone())
        .layer(service_fn(|_: ()| async { Ok::<_, Infallible>("write") }));

    assert_eq!(reads.clone().oneshot(()).await.unwrap(), "read");
    assert_eq!(writes.clone().oneshot(()).await.unwrap(), "write");
    assert!(reads.clone().oneshot(()).await.unwrap_err().is_rate_limited());
    assert_eq!(store.calls(), 3);

    // The denial cached through one layer short-circuits the other.
    assert!(writes.clone().oneshot(()).await.unwrap_err().is_rate_limited());
    assert_eq!(store.calls(), 3);
    assert!(!limiter.last_decision().unwrap().allowed);
}

#[tokio::test]
async fn layer_surfaces_limiter_failures() {
    let limiter = SharedRateLimiter::new(FailingStore::default(), "svc", 2.0).unwrap();
    let svc = RateLimitLayer::new(limiter)
        .layer(service_fn(|_: ()| async { Ok::<_, Infallible>("unreachable") }));

    match svc.oneshot(()).await {
        Err(GuardError::Limiter(e)) => assert!(e.is_execution()),
        other => panic!("expected limiter failure, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn inner_errors_pass_through() {
    let limiter = SharedRateLimiter::new(InMemoryBucketStore::new(), "svc", 2.0).unwrap();
    let svc = RateLimitLayer::new(limiter).layer(service_fn(|_: ()| async {
        Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "inner boom"))
    }));

    let err = svc.oneshot(()).await.unwrap_err();
    assert!(!err.is_rate_limited());
    assert_eq!(err.into_inner().unwrap().to_string(), "inner boom");
}
