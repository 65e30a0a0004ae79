use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Where to fetch air quality for: a position or a free-text place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocationDescriptor {
    Coordinates(Coordinates),
    PlaceName(String),
}

impl std::fmt::Display for LocationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationDescriptor::Coordinates(c) => write!(f, "{:.4}, {:.4}", c.lat, c.lon),
            LocationDescriptor::PlaceName(text) => f.write_str(text),
        }
    }
}

/// How the current location was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMethod {
    #[default]
    Detecting,
    Gps,
    Ip,
    /// Both automatic stages failed and the configured default city is used.
    Fallback,
    Manual,
}

impl LocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationMethod::Detecting => "detecting",
            LocationMethod::Gps => "gps",
            LocationMethod::Ip => "ip",
            LocationMethod::Fallback => "default city",
            LocationMethod::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
}

/// A successful, normalized air-quality observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub aqi: i32,
    pub station_name: String,
    /// Keyed by provider code: `pm25`, `pm10`, `o3`, `no2`, `so2`, `co`, `t`, `h`, `p`, `w`.
    pub measurements: HashMap<String, Measurement>,
    /// Time the fetch completed, not the station's own timestamp.
    pub observed_at: DateTime<Utc>,
}

pub type FetchOutcome = Result<Reading, FetchError>;
