use crate::{
    Config,
    error::FetchError,
    model::{Coordinates, FetchOutcome, LocationDescriptor},
    provider::waqi::WaqiProvider,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod waqi;

/// Source of air-quality readings.
///
/// Implementations are stateless between calls: they return an outcome and
/// never touch session state.
#[async_trait]
pub trait AirQualityProvider: Send + Sync + Debug {
    async fn fetch_by_coordinates(&self, coords: Coordinates) -> FetchOutcome;

    /// Returns `None` without making a request when `text` is blank.
    async fn fetch_by_place_name(&self, text: &str) -> Option<FetchOutcome>;

    /// Dispatch on the descriptor's shape.
    async fn fetch(&self, location: &LocationDescriptor) -> Option<FetchOutcome> {
        match location {
            LocationDescriptor::Coordinates(coords) => Some(self.fetch_by_coordinates(*coords).await),
            LocationDescriptor::PlaceName(text) => self.fetch_by_place_name(text).await,
        }
    }
}

/// Trimmed search text, or `None` if there is nothing to search for.
pub fn normalize_place_query(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Failure message for a place name the provider could not match.
pub fn place_not_found(text: &str, detail: Option<&str>) -> FetchError {
    let detail = detail.map(|d| format!(" ({d})")).unwrap_or_default();
    FetchError::Api(format!(
        "No air quality data found for \"{text}\"{detail}. \
         Try the \"City, Country\" format, e.g. \"Chennai, India\"."
    ))
}

/// Construct the provider described by `config`.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn AirQualityProvider>> {
    let provider = WaqiProvider::new(config.waqi_base_url(), config.token())?;
    Ok(Box::new(provider))
}
