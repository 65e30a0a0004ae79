//! Pure mappings from a reading to what gets presented: severity tier,
//! pollutant breakdown, environmental conditions and health advice.

use serde::Serialize;
use std::collections::HashMap;

use crate::model::Measurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SeverityLevel {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeverityTier {
    pub level: SeverityLevel,
    pub label: &'static str,
    /// Hex color token, e.g. `#00e400`.
    pub color: &'static str,
    pub emoji: &'static str,
    pub advisory: &'static str,
}

const GOOD: SeverityTier = SeverityTier {
    level: SeverityLevel::Good,
    label: "Good",
    color: "#00e400",
    emoji: "😊",
    advisory: "Air quality is excellent. Perfect for outdoor activities!",
};

const MODERATE: SeverityTier = SeverityTier {
    level: SeverityLevel::Moderate,
    label: "Moderate",
    color: "#ffff00",
    emoji: "😐",
    advisory: "Air quality is acceptable. Sensitive individuals should limit prolonged outdoor exertion.",
};

const SENSITIVE: SeverityTier = SeverityTier {
    level: SeverityLevel::UnhealthyForSensitiveGroups,
    label: "Unhealthy for Sensitive Groups",
    color: "#ff7e00",
    emoji: "😷",
    advisory: "People with respiratory conditions should reduce prolonged outdoor activities.",
};

const UNHEALTHY: SeverityTier = SeverityTier {
    level: SeverityLevel::Unhealthy,
    label: "Unhealthy",
    color: "#ff0000",
    emoji: "😨",
    advisory: "Everyone should reduce outdoor activities. Wear a mask if going outside.",
};

const VERY_UNHEALTHY: SeverityTier = SeverityTier {
    level: SeverityLevel::VeryUnhealthy,
    label: "Very Unhealthy",
    color: "#8f3f97",
    emoji: "🚨",
    advisory: "Avoid all outdoor activities. Stay indoors with air purifier.",
};

const HAZARDOUS: SeverityTier = SeverityTier {
    level: SeverityLevel::Hazardous,
    label: "Hazardous",
    color: "#7e0023",
    emoji: "☠️",
    advisory: "Health emergency! Stay indoors. Seal windows and doors.",
};

/// Map an AQI to its band. Bands are upper-inclusive; negative values land in
/// the Good band.
pub fn classify_severity(aqi: i32) -> SeverityTier {
    match aqi {
        i32::MIN..=50 => GOOD,
        51..=100 => MODERATE,
        101..=150 => SENSITIVE,
        151..=200 => UNHEALTHY,
        201..=300 => VERY_UNHEALTHY,
        _ => HAZARDOUS,
    }
}

/// Fixed health recommendations for a severity level.
pub fn recommendations(level: SeverityLevel) -> &'static [&'static str] {
    match level {
        SeverityLevel::Good => &[
            "✅ Great day for outdoor exercise",
            "✅ Perfect for children to play outside",
            "✅ Open windows for fresh air",
        ],
        SeverityLevel::Moderate => &[
            "⚠️ Limit prolonged outdoor exertion",
            "✅ Generally safe for most people",
            "⚠️ Sensitive individuals should be cautious",
        ],
        SeverityLevel::UnhealthyForSensitiveGroups => &[
            "🚨 Wear a mask outdoors",
            "⚠️ Reduce outdoor activities",
            "⚠️ Use air purifier indoors",
        ],
        SeverityLevel::Unhealthy | SeverityLevel::VeryUnhealthy | SeverityLevel::Hazardous => &[
            "🚨 Avoid outdoor activities",
            "🚨 Stay indoors with air purifier",
            "🚨 Keep windows and doors closed",
            "🚨 Consider relocating if possible",
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Pollutant {
    Pm25,
    Pm10,
    Ozone,
    No2,
    So2,
    Co,
}

impl Pollutant {
    /// Presentation order.
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::Ozone,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    /// Key in the provider's measurement bag.
    pub fn code(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::Ozone => "o3",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::Ozone => "Ozone",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::Co => "CO",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "Fine particles that penetrate deep into lungs",
            Pollutant::Pm10 => "Coarse particles from dust and smoke",
            Pollutant::Ozone => "Ground-level ozone from vehicle emissions",
            Pollutant::No2 => "Nitrogen dioxide from combustion",
            Pollutant::So2 => "Sulfur dioxide from burning fossil fuels",
            Pollutant::Co => "Carbon monoxide from incomplete combustion",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollutantInfo {
    pub pollutant: Pollutant,
    pub name: &'static str,
    pub value: f64,
    pub description: &'static str,
}

/// Pollutants present in `measurements`, always in [`Pollutant::ALL`] order.
pub fn extract_pollutants(measurements: &HashMap<String, Measurement>) -> Vec<PollutantInfo> {
    Pollutant::ALL
        .iter()
        .filter_map(|p| {
            measurements.get(p.code()).map(|m| PollutantInfo {
                pollutant: *p,
                name: p.name(),
                value: m.value,
                description: p.description(),
            })
        })
        .collect()
}

/// Weather extras some stations report next to pollutants.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EnvironmentalConditions {
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub wind: Option<f64>,
}

impl EnvironmentalConditions {
    pub fn is_empty(&self) -> bool {
        self.temperature_c.is_none()
            && self.humidity_pct.is_none()
            && self.pressure_hpa.is_none()
            && self.wind.is_none()
    }
}

pub fn extract_conditions(measurements: &HashMap<String, Measurement>) -> EnvironmentalConditions {
    let value = |code: &str| measurements.get(code).map(|m| m.value);

    EnvironmentalConditions {
        temperature_c: value("t"),
        humidity_pct: value("h"),
        pressure_hpa: value("p"),
        wind: value("w"),
    }
}
