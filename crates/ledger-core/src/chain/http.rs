//! Shared HTTP client construction for chain adapters.
//!
//! Mirrors `HttpRpcClient::new` in the teacher crate: a `reqwest::Client`
//! tuned for many small JSON requests to one host, plus an optional
//! `governor` rate limiter enforcing a provider's documented requests/sec
//! quota.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{Quota, RateLimiter};

pub type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

pub fn build_client(pool_max_idle_per_host: usize) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .tcp_nodelay(true)
        .build()
        .expect("static reqwest client configuration must be valid")
}

pub fn build_limiter(requests_per_second: u32) -> Option<DirectRateLimiter> {
    NonZeroU32::new(requests_per_second)
        .map(|n| RateLimiter::direct(Quota::per_second(n)))
}
