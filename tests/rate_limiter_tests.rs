use quickr::middleware::rate_limit::IpRateLimiter;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_sixty_per_minute_burst_then_refill() {
    let limiter = IpRateLimiter::new(60);

    for i in 0..60 {
        assert!(limiter.allow("10.0.0.1"), "request {} should pass", i + 1);
    }
    assert!(!limiter.allow("10.0.0.1"));

    // Other clients keep their own bucket
    assert!(limiter.allow("10.0.0.2"));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(limiter.allow("10.0.0.1"));
}

#[tokio::test]
async fn test_concurrent_callers_never_exceed_capacity() {
    let limiter = Arc::new(IpRateLimiter::new(20));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move { limiter.allow("shared") }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }

    // A little refill may sneak in while the tasks run
    assert!((20..=21).contains(&allowed), "allowed {}", allowed);
}
