//! Core library for the `airwatch` CLI.
//!
//! This crate defines:
//! - Configuration handling
//! - Location resolution (platform position, IP lookup, default city)
//! - The air-quality provider abstraction and the WAQI client
//! - AQI classification and pollutant extraction
//! - The session state machine that ties them together
//!
//! It is used by `airwatch-cli`, but can also be reused by other binaries or services.

pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod location;
pub mod model;
pub mod provider;
pub mod session;

pub use classify::{
    EnvironmentalConditions, Pollutant, PollutantInfo, SeverityLevel, SeverityTier,
    classify_severity, extract_conditions, extract_pollutants, recommendations,
};
pub use config::Config;
pub use error::{FailureKind, FetchError};
pub use location::{LocationResolver, Resolution, resolver_from_config};
pub use model::{Coordinates, FetchOutcome, LocationDescriptor, LocationMethod, Reading};
pub use provider::{AirQualityProvider, provider_from_config};
pub use session::{Session, SessionError, SessionState, SessionView, refresh_periodically};

use std::sync::Arc;

/// Wire a session from configuration.
pub fn session_from_config(
    config: &Config,
    position: Option<Coordinates>,
) -> anyhow::Result<Session> {
    let provider: Arc<dyn AirQualityProvider> = Arc::from(provider_from_config(config)?);
    Ok(Session::new(provider, resolver_from_config(config, position)))
}
