use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    error::FetchError,
    fetch::{IP_LOOKUP_TIMEOUT, fetch_bounded},
    model::Coordinates,
};

use super::IpLocator;

pub const DEFAULT_IP_GEOLOCATION_URL: &str = "https://ipapi.co/json/";

/// IP geolocation via an ipapi.co-style JSON endpoint.
#[derive(Debug, Clone)]
pub struct IpApiLocator {
    url: String,
    http: Client,
    timeout: Duration,
}

impl IpApiLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: Client::new(),
            timeout: IP_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// Either field may be absent, e.g. `{"error": true, "reason": "RateLimited"}`.
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[async_trait]
impl IpLocator for IpApiLocator {
    async fn locate(&self) -> Result<Coordinates, FetchError> {
        let body = fetch_bounded(
            async {
                let res = self.http.get(&self.url).send().await?.error_for_status()?;
                Ok::<_, reqwest::Error>(res.text().await?)
            },
            self.timeout,
        )
        .await?;

        let parsed: IpApiResponse = serde_json::from_str(&body)
            .map_err(|err| FetchError::Api(format!("malformed IP geolocation response: {err}")))?;

        match (parsed.latitude, parsed.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Ok(Coordinates::new(lat, lon))
            }
            _ => Err(FetchError::Api(
                "IP geolocation response has no latitude/longitude".to_string(),
            )),
        }
    }
}
