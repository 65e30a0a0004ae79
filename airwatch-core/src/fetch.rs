//! Deadline-bounded network calls.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

/// Standard deadline for air-quality requests.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the IP geolocation lookup.
pub const IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(6);

/// Run `request` against a deadline of `timeout`.
///
/// Whichever finishes first decides the result. When the deadline wins the
/// request future is dropped, which cancels the in-flight call, and the result
/// is [`FetchError::Timeout`]. The deadline timer is dropped with this future,
/// so an early completion leaves nothing armed.
pub async fn fetch_bounded<F, T, E>(request: F, timeout: Duration) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<FetchError>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "request deadline expired");
            Err(FetchError::Timeout)
        }
    }
}
