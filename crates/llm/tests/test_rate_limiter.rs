use llm::{RateLimiter, RateLimits};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_no_more_than_rpm_admissions_per_rolling_minute() {
    let limiter = RateLimiter::new(RateLimits::new(Some(5), None));
    let admissions = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..12 {
        let limiter = limiter.clone();
        let admissions = Arc::clone(&admissions);
        handles.push(tokio::spawn(async move {
            let reservation = limiter.acquire(10).await;
            admissions.lock().push(Instant::now());
            reservation.commit(10);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let times = admissions.lock().clone();
    assert_eq!(times.len(), 12);
    for (i, t) in times.iter().enumerate() {
        let in_window = times
            .iter()
            .filter(|other| **other >= *t && **other < *t + Duration::from_secs(60))
            .count();
        assert!(in_window <= 5, "admission {i} saw {in_window} in its window");
    }
    assert!(start.elapsed() >= Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_tpm_budget_delays_large_requests() {
    let limiter = RateLimiter::new(RateLimits::new(None, Some(1_000)));
    limiter.acquire(800).await.commit(800);

    let start = Instant::now();
    limiter.acquire(300).await.commit(300);
    assert!(start.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_commit_with_smaller_usage_frees_tokens() {
    let limiter = RateLimiter::new(RateLimits::new(None, Some(1_000)));
    limiter.acquire(900).await.commit(100);

    let start = Instant::now();
    limiter.acquire(800).await.commit(800);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_does_not_consume_budget() {
    let limiter = RateLimiter::new(RateLimits::new(Some(1), None));
    limiter.acquire(1).await.commit(1);

    let waiting = {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let _r = limiter.acquire(1).await;
        })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    waiting.abort();
    let _ = waiting.await;

    assert_eq!(limiter.requests_in_window(), 1);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(limiter.try_acquire(1).is_ok());
}
