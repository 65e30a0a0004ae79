use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::{
    location::{DEFAULT_PLACE_NAME, ipapi::DEFAULT_IP_GEOLOCATION_URL},
    model::Coordinates,
    provider::waqi::{DEFAULT_BASE_URL, DEMO_TOKEN},
};

pub const DEFAULT_REFRESH_MINUTES: u64 = 15;

/// Longest refresh interval accepted, one day.
pub const MAX_REFRESH_MINUTES: u64 = 24 * 60;

/// A fixed position, used in place of a platform location sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
}

/// Overrides for the remote services' addresses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    pub waqi_base_url: Option<String>,
    pub ip_geolocation_url: Option<String>,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// token = "..."
/// default_city = "Chennai, India"
/// refresh_minutes = 15
///
/// [location]
/// latitude = 11.0
/// longitude = 77.0
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// WAQI access token; the public demo token when absent.
    pub token: Option<String>,

    /// Place searched when no position can be determined.
    pub default_city: Option<String>,

    pub refresh_minutes: Option<u64>,

    pub location: Option<LocationConfig>,

    #[serde(default, skip_serializing_if = "is_default")]
    pub endpoints: EndpointsConfig,
}

fn is_default(endpoints: &EndpointsConfig) -> bool {
    *endpoints == EndpointsConfig::default()
}

impl Config {
    pub fn token(&self) -> &str {
        self.token.as_deref().filter(|t| !t.trim().is_empty()).unwrap_or(DEMO_TOKEN)
    }

    pub fn default_city(&self) -> &str {
        self.default_city
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_PLACE_NAME)
    }

    pub fn refresh_interval(&self) -> Duration {
        let minutes = self
            .refresh_minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_REFRESH_MINUTES)
            .min(MAX_REFRESH_MINUTES);
        Duration::from_secs(minutes * 60)
    }

    pub fn fixed_position(&self) -> Option<Coordinates> {
        self.location.map(|l| Coordinates::new(l.latitude, l.longitude))
    }

    pub fn waqi_base_url(&self) -> &str {
        self.endpoints.waqi_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn ip_geolocation_url(&self) -> &str {
        self.endpoints
            .ip_geolocation_url
            .as_deref()
            .unwrap_or(DEFAULT_IP_GEOLOCATION_URL)
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(minutes) = self.refresh_minutes.filter(|m| *m > MAX_REFRESH_MINUTES) {
            return Err(anyhow!(
                "Refresh interval of {minutes} minutes is too long.\n\
                 Hint: refresh_minutes must be at most {MAX_REFRESH_MINUTES}."
            ));
        }

        if let Some(loc) = self.location {
            if !(-90.0..=90.0).contains(&loc.latitude) || !(-180.0..=180.0).contains(&loc.longitude) {
                return Err(anyhow!(
                    "Configured location ({}, {}) is out of range.\n\
                     Hint: latitude must be within -90..90 and longitude within -180..180.",
                    loc.latitude,
                    loc.longitude
                ));
            }
        }

        Ok(())
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "airwatch", "airwatch")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::default();

        assert_eq!(cfg.token(), DEMO_TOKEN);
        assert_eq!(cfg.default_city(), DEFAULT_PLACE_NAME);
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(15 * 60));
        assert_eq!(cfg.waqi_base_url(), DEFAULT_BASE_URL);
        assert_eq!(cfg.ip_geolocation_url(), DEFAULT_IP_GEOLOCATION_URL);
        assert!(cfg.fixed_position().is_none());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = Config {
            token: Some("  ".into()),
            default_city: Some(String::new()),
            refresh_minutes: Some(0),
            ..Config::default()
        };

        assert_eq!(cfg.token(), DEMO_TOKEN);
        assert_eq!(cfg.default_city(), DEFAULT_PLACE_NAME);
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(15 * 60));
    }

    #[test]
    fn huge_refresh_interval_is_capped() {
        let cfg = Config { refresh_minutes: Some(u64::MAX), ..Config::default() };
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(MAX_REFRESH_MINUTES * 60));

        let err = Config::from_toml(&format!("refresh_minutes = {}\n", i64::MAX)).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn parses_full_file() {
        let cfg = Config::from_toml(
            r#"
            token = "SECRET"
            default_city = "Chennai, India"
            refresh_minutes = 5

            [location]
            latitude = 11.0
            longitude = 77.0

            [endpoints]
            waqi_base_url = "http://localhost:9000"
            "#,
        )
        .expect("config should parse");

        assert_eq!(cfg.token(), "SECRET");
        assert_eq!(cfg.default_city(), "Chennai, India");
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(300));
        assert_eq!(cfg.fixed_position(), Some(Coordinates::new(11.0, 77.0)));
        assert_eq!(cfg.waqi_base_url(), "http://localhost:9000");
        assert_eq!(cfg.ip_geolocation_url(), DEFAULT_IP_GEOLOCATION_URL);
    }

    #[test]
    fn rejects_out_of_range_location() {
        let err = Config::from_toml("[location]\nlatitude = 123.0\nlongitude = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn toml_roundtrip_preserves_values() {
        let cfg = Config {
            token: Some("KEY".into()),
            location: Some(LocationConfig { latitude: 1.5, longitude: -2.5 }),
            ..Config::default()
        };

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        assert!(!text.contains("endpoints"));
        assert_eq!(Config::from_toml(&text).expect("parse"), cfg);
    }
}
