//! Location resolution: platform geolocation, then IP geolocation, then a
//! fixed default place. Always terminates with a descriptor.

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::{
    Config,
    error::{FetchError, GeolocationError},
    fetch::{IP_LOOKUP_TIMEOUT, fetch_bounded},
    model::{Coordinates, LocationDescriptor, LocationMethod},
};

pub mod ipapi;

use ipapi::IpApiLocator;

/// Place searched when neither geolocation stage yields a position.
pub const DEFAULT_PLACE_NAME: &str = "Coimbatore";

/// Options passed to the platform geolocation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeolocationOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached position the platform may return.
    pub max_cached_age: Duration,
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            max_cached_age: Duration::from_secs(5 * 60),
        }
    }
}

/// Platform position sensor.
#[async_trait]
pub trait GeolocationSource: Send + Sync + Debug {
    async fn current_position(
        &self,
        options: &GeolocationOptions,
    ) -> Result<Coordinates, GeolocationError>;
}

/// Lookup of an approximate position from the caller's public IP.
#[async_trait]
pub trait IpLocator: Send + Sync + Debug {
    async fn locate(&self) -> Result<Coordinates, FetchError>;
}

/// A platform without a position sensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeolocation;

#[async_trait]
impl GeolocationSource for NoGeolocation {
    async fn current_position(
        &self,
        _options: &GeolocationOptions,
    ) -> Result<Coordinates, GeolocationError> {
        Err(GeolocationError::Unavailable("no location capability on this platform".into()))
    }
}

/// A sensor that always reports the same position (from config or flags).
#[derive(Debug, Clone, Copy)]
pub struct FixedGeolocation(pub Coordinates);

#[async_trait]
impl GeolocationSource for FixedGeolocation {
    async fn current_position(
        &self,
        _options: &GeolocationOptions,
    ) -> Result<Coordinates, GeolocationError> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Detecting,
    ResolvedGps,
    ResolvingIp,
    ResolvedIp,
    /// Both stages failed; the default place name was emitted.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub location: LocationDescriptor,
    pub method: LocationMethod,
    /// Terminal resolver state.
    pub state: ResolverState,
}

/// Runs the fallback chain. Stages are strictly sequential and each is bounded
/// by its own timeout, so `resolve` finishes within their sum. No retries.
#[derive(Debug, Clone)]
pub struct LocationResolver {
    geolocation: Arc<dyn GeolocationSource>,
    ip_locator: Arc<dyn IpLocator>,
    default_place: String,
    options: GeolocationOptions,
    ip_timeout: Duration,
}

impl LocationResolver {
    pub fn new(
        geolocation: Arc<dyn GeolocationSource>,
        ip_locator: Arc<dyn IpLocator>,
        default_place: impl Into<String>,
    ) -> Self {
        Self {
            geolocation,
            ip_locator,
            default_place: default_place.into(),
            options: GeolocationOptions::default(),
            ip_timeout: IP_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_options(mut self, options: GeolocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_ip_timeout(mut self, timeout: Duration) -> Self {
        self.ip_timeout = timeout;
        self
    }

    pub fn default_place(&self) -> &str {
        &self.default_place
    }

    pub async fn resolve(&self) -> Resolution {
        tracing::debug!(state = ?ResolverState::Detecting, "resolving location");

        match self.detect().await {
            Ok(coords) => {
                tracing::info!(lat = coords.lat, lon = coords.lon, "location from platform geolocation");
                return Resolution {
                    location: LocationDescriptor::Coordinates(coords),
                    method: LocationMethod::Gps,
                    state: ResolverState::ResolvedGps,
                };
            }
            Err(err) => {
                tracing::info!(reason = %err, "platform geolocation failed, trying IP lookup");
            }
        }

        tracing::debug!(state = ?ResolverState::ResolvingIp, "resolving location");

        match fetch_bounded(self.ip_locator.locate(), self.ip_timeout).await {
            Ok(coords) => {
                tracing::info!(lat = coords.lat, lon = coords.lon, "location from IP geolocation");
                Resolution {
                    location: LocationDescriptor::Coordinates(coords),
                    method: LocationMethod::Ip,
                    state: ResolverState::ResolvedIp,
                }
            }
            Err(err) => {
                tracing::warn!(
                    reason = %err,
                    default = %self.default_place,
                    "IP geolocation failed, using default place"
                );
                Resolution {
                    location: LocationDescriptor::PlaceName(self.default_place.clone()),
                    method: LocationMethod::Fallback,
                    state: ResolverState::Failed,
                }
            }
        }
    }

    async fn detect(&self) -> Result<Coordinates, GeolocationError> {
        tokio::time::timeout(self.options.timeout, self.geolocation.current_position(&self.options))
            .await
            .unwrap_or(Err(GeolocationError::TimedOut))
    }
}

/// Build the resolver described by `config`. `position` (e.g. from command-line
/// flags) takes precedence over a position in the config file.
pub fn resolver_from_config(config: &Config, position: Option<Coordinates>) -> LocationResolver {
    let geolocation: Arc<dyn GeolocationSource> = match position.or(config.fixed_position()) {
        Some(coords) => Arc::new(FixedGeolocation(coords)),
        None => Arc::new(NoGeolocation),
    };

    LocationResolver::new(
        geolocation,
        Arc::new(IpApiLocator::new(config.ip_geolocation_url())),
        config.default_city(),
    )
}
