use serde::Serialize;
use thiserror::Error;

pub const TIMEOUT_MESSAGE: &str =
    "Request timed out. The API may be blocked in your network or region. Try using a VPN.";

pub const NETWORK_MESSAGE: &str = "Network error. Please check your connection.";

pub const GENERIC_API_MESSAGE: &str = "Unable to fetch air quality data";

/// Coarse classification of a failed fetch, surfaced to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    Timeout,
    Network,
    ApiError,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::ApiError => "api error",
        })
    }
}

/// A failed fetch. `Display` is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{}", TIMEOUT_MESSAGE)]
    Timeout,

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Api(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout => FailureKind::Timeout,
            FetchError::Network(_) => FailureKind::Network,
            FetchError::Api(_) => FailureKind::ApiError,
        }
    }

    pub fn network(detail: impl std::fmt::Display) -> Self {
        FetchError::Network(format!("{NETWORK_MESSAGE} ({detail})"))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::network(err)
        }
    }
}

/// Why the platform could not supply a position. Never shown to the user;
/// the resolver turns every variant into a fallback step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("location permission denied")]
    Denied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("location request timed out")]
    TimedOut,
}
