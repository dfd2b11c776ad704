use std::sync::Arc;
use std::time::Duration;

use super::*;

#[test]
fn test_cap_is_enforced_within_window() {
    let limiter = RateLimiter::new(Duration::from_secs(60));
    let admitted = (0..5).filter(|_| limiter.try_acquire("w1", 2)).count();
    assert_eq!(admitted, 2);
}

#[test]
fn test_zero_cap_never_fires() {
    let limiter = RateLimiter::new(Duration::from_secs(60));
    assert!(!limiter.try_acquire("w1", 0));
    assert_eq!(limiter.len(), 0);
}

#[test]
fn test_windows_are_per_watcher() {
    let limiter = RateLimiter::new(Duration::from_secs(60));
    assert!(limiter.try_acquire("w1", 1));
    assert!(!limiter.try_acquire("w1", 1));
    assert!(limiter.try_acquire("w2", 1));
}

#[test]
fn test_release_returns_one_fire() {
    let limiter = RateLimiter::new(Duration::from_secs(60));
    assert!(limiter.try_acquire("w1", 1));
    limiter.release("w1");
    assert!(limiter.try_acquire("w1", 1));
    assert!(!limiter.try_acquire("w1", 1));

    limiter.release("unknown");
    assert_eq!(limiter.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_window_resets_after_expiry() {
    let limiter = RateLimiter::new(Duration::from_secs(60));
    assert!(limiter.try_acquire("w1", 1));
    assert!(!limiter.try_acquire("w1", 1));

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(!limiter.try_acquire("w1", 1));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(limiter.try_acquire("w1", 1));
}

#[test]
fn test_retain_prunes_removed_watchers() {
    let limiter = RateLimiter::new(Duration::from_secs(60));
    limiter.try_acquire("w1", 1);
    limiter.try_acquire("w2", 1);
    limiter.retain(|id| id == "w2");
    assert_eq!(limiter.len(), 1);
    assert!(limiter.try_acquire("w1", 1));
}

#[test]
fn test_concurrent_burst_does_not_over_fire() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            std::thread::spawn(move || (0..50).filter(|_| limiter.try_acquire("w1", 10)).count())
        })
        .collect();
    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 10);
}
