//! Retry loop with exponential backoff for throttled requests.

use super::{ApiRequest, ApiResponse, Telemetry, Transport};
use crate::error::abbreviate;
use crate::{Error, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Number of request characters quoted in a fatal error.
const REQUEST_EXCERPT: usize = 100;

/// Retry configuration for one request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first throttled (429) response.
    pub initial_backoff: Duration,
    /// Ceiling for the doubling backoff.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the `throttled`-th 429 response (0-based).
    pub fn backoff(&self, throttled: u32) -> Duration {
        let factor = 1u32 << throttled.min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Send `request`, retrying error statuses and transient failures.
///
/// - 403 fails at once.
/// - 429 sleeps with doubling backoff, then retries.
/// - Any other status >= 400 and any local I/O or timeout failure retries
///   immediately.
///
/// After `max_attempts` the last failure is returned with an excerpt of the
/// request body.
pub async fn send_with_retry<T: Transport + ?Sized>(
    transport: &T,
    policy: &RetryPolicy,
    telemetry: &Telemetry,
    request: &ApiRequest,
) -> Result<ApiResponse> {
    let mut attempt = 0;
    let mut throttled = 0;

    loop {
        attempt += 1;
        telemetry.record_request();

        match transport.execute(request).await {
            Ok(response) => {
                telemetry.record_response(response.body.len());
                if !response.is_error() {
                    if attempt > 1 {
                        debug!(attempt, "request succeeded after retry");
                    }
                    return Ok(response);
                }
                if response.status == 403 {
                    return Err(Error::Forbidden {
                        reason: response.reason,
                        request: abbreviate(request.describe(), REQUEST_EXCERPT),
                    });
                }
                if attempt >= policy.max_attempts {
                    warn!(attempt, status = response.status, "all retry attempts exhausted");
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        status: response.status,
                        reason: response.reason,
                        request: abbreviate(request.describe(), REQUEST_EXCERPT),
                    });
                }
                if response.status == 429 {
                    let delay = policy.backoff(throttled);
                    throttled += 1;
                    warn!(
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        "request throttled by server, backing off"
                    );
                    sleep(delay).await;
                } else {
                    warn!(
                        attempt,
                        status = response.status,
                        "request failed ({}), retrying",
                        response.reason
                    );
                }
            }
            Err(err) if err.is_transient() => {
                if attempt >= policy.max_attempts {
                    warn!(attempt, "all retry attempts exhausted");
                    return Err(Error::Transport(format!(
                        "{} (after {} attempts)",
                        err, attempt
                    )));
                }
                warn!(attempt, "request error: {}, retrying", err);
            }
            Err(err) => return Err(err),
        }

        telemetry.record_retry();
    }
}
