//! Shared request pacing using governor (GCRA).
//!
//! One [`Pacer`] is created per rate-limited service and shared, via `Arc`,
//! by every client that talks to it, so the pace holds across clients and
//! threads rather than per connection.

use crate::Result;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Minimum spacing of NCBI E-utilities calls with an API key.
pub const NCBI_PERIOD_WITH_KEY: Duration = Duration::from_millis(200);

/// Minimum spacing of NCBI E-utilities calls without an API key.
pub const NCBI_PERIOD_ANONYMOUS: Duration = Duration::from_millis(500);

/// Allows one call per `period`, with no burst.
pub struct Pacer {
    limiter: DefaultDirectRateLimiter,
    period: Duration,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
        Self {
            limiter: RateLimiter::direct(quota),
            period,
        }
    }

    /// Pacing for the NCBI taxonomy service.
    pub fn for_ncbi(has_api_key: bool) -> Self {
        if has_api_key {
            Self::new(NCBI_PERIOD_WITH_KEY)
        } else {
            Self::new(NCBI_PERIOD_ANONYMOUS)
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait until the next call is allowed.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// Transport that waits on a shared [`Pacer`] before every call, retries
/// included.
pub struct PacedTransport<T> {
    inner: T,
    pacer: Arc<Pacer>,
}

impl<T: Transport> PacedTransport<T> {
    pub fn new(inner: T, pacer: Arc<Pacer>) -> Self {
        Self { inner, pacer }
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }
}

#[async_trait]
impl<T: Transport> Transport for PacedTransport<T> {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.pacer.wait().await;
        self.inner.execute(request).await
    }
}
