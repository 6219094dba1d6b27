// ==============================
// tests/unit/rate_limit_tests.rs
// ==============================
//! This test suite validates the per-bucket `RateLimiter`
use vplan_backend_lib::config::{BucketLimit, RateLimitSettings};
use vplan_backend_lib::middleware::{Bucket, RateLimiter};

fn limiter(max_requests: u32) -> RateLimiter {
    let limit = BucketLimit::new(60, max_requests);
    RateLimiter::new(RateLimitSettings {
        authenticate: limit,
        logout: limit,
        get_vplan: limit,
        trust_proxy_headers: false,
    })
}

#[test]
fn test_rate_limiter_allows_initial_attempts() {
    let rate_limiter = limiter(3);
    assert!(rate_limiter.check(Bucket::Authenticate, "127.0.0.1"));
}

#[test]
fn test_rate_limiter_blocks_after_budget() {
    let rate_limiter = limiter(3);
    for _ in 0..3 {
        assert!(rate_limiter.check(Bucket::Authenticate, "127.0.0.2"));
    }
    assert!(!rate_limiter.check(Bucket::Authenticate, "127.0.0.2"));
}

#[test]
fn test_clients_and_buckets_are_independent() {
    let rate_limiter = limiter(1);
    assert!(rate_limiter.check(Bucket::Authenticate, "10.0.0.1"));
    assert!(!rate_limiter.check(Bucket::Authenticate, "10.0.0.1"));

    // different client
    assert!(rate_limiter.check(Bucket::Authenticate, "10.0.0.2"));
    // different bucket
    assert!(rate_limiter.check(Bucket::Logout, "10.0.0.1"));
    assert!(rate_limiter.check(Bucket::GetVPlan, "10.0.0.1"));
    assert_eq!(rate_limiter.tracked(), 4);
}

#[test]
fn test_cleanup_keeps_live_windows() {
    let rate_limiter = limiter(5);
    rate_limiter.check(Bucket::Logout, "10.0.0.3");
    rate_limiter.cleanup();
    assert_eq!(rate_limiter.tracked(), 1);
}
