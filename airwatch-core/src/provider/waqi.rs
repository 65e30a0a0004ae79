use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashMap, time::Duration};

use crate::{
    error::{FetchError, GENERIC_API_MESSAGE},
    fetch::{FETCH_TIMEOUT, fetch_bounded},
    model::{Coordinates, FetchOutcome, Measurement, Reading},
    provider::{normalize_place_query, place_not_found},
};

use super::AirQualityProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.waqi.info";

/// Public token accepted by the World Air Quality Index API.
pub const DEMO_TOKEN: &str = "demo";

/// Client for the World Air Quality Index feed API.
#[derive(Debug, Clone)]
pub struct WaqiProvider {
    base_url: Url,
    token: String,
    http: Client,
    timeout: Duration,
}

/// Why a feed request did not produce a reading.
#[derive(Debug)]
enum FeedError {
    Fetch(FetchError),
    /// The envelope carried a non-"ok" status, with the provider's text if any.
    Status(Option<String>),
}

impl From<FetchError> for FeedError {
    fn from(err: FetchError) -> Self {
        FeedError::Fetch(err)
    }
}

impl WaqiProvider {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid air quality API base URL: {base_url}"))?;

        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Invalid air quality API base URL: {base_url}"));
        }

        Ok(Self {
            base_url,
            token: token.into(),
            http: Client::new(),
            timeout: FETCH_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `{base}/feed/{station}/?token=...`, with `station` percent-encoded as a
    /// single path segment.
    fn feed_url(&self, station: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("feed").push(station).push("");
        }
        url.query_pairs_mut().append_pair("token", &self.token);
        url
    }

    async fn fetch_feed(&self, station: &str) -> Result<Reading, FeedError> {
        let url = self.feed_url(station);

        let (status, body) = fetch_bounded(
            async {
                let res = self.http.get(url).send().await?;
                let status = res.status();
                let body = res.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            },
            self.timeout,
        )
        .await?;

        let envelope: WaqiEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => {
                tracing::debug!(error = %err, body = %truncate_body(&body), "unreadable WAQI response");
                return Err(FetchError::network("unreadable response from the air quality service").into());
            }
            Err(_) => {
                return Err(FetchError::Api(format!(
                    "{GENERIC_API_MESSAGE} (HTTP {status})"
                ))
                .into());
            }
        };

        if envelope.status != "ok" {
            let detail = envelope.data.as_str().map(str::to_owned);
            tracing::debug!(status = %envelope.status, detail = ?detail, "WAQI returned an error status");
            return Err(FeedError::Status(detail));
        }

        let feed: WaqiFeed = serde_json::from_value(envelope.data).map_err(|err| {
            tracing::debug!(error = %err, "WAQI payload did not match the expected shape");
            FetchError::Api(format!("{GENERIC_API_MESSAGE}: incomplete station data"))
        })?;

        let aqi = parse_aqi(&feed.aqi).ok_or_else(|| {
            FetchError::Api(format!(
                "{} is not reporting an air quality index right now",
                feed.city.name
            ))
        })?;

        if aqi < 0 {
            tracing::warn!(aqi, station = %feed.city.name, "negative AQI reported, clamping to 0");
        }

        let measurements = feed
            .iaqi
            .into_iter()
            .map(|(code, m)| (code, Measurement { value: m.v }))
            .collect();

        Ok(Reading {
            aqi: aqi.max(0),
            station_name: feed.city.name,
            measurements,
            observed_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WaqiEnvelope {
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct WaqiCity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WaqiValue {
    v: f64,
}

#[derive(Debug, Deserialize)]
struct WaqiFeed {
    // Number for reporting stations, "-" for stations without a current index.
    aqi: Value,
    city: WaqiCity,
    #[serde(default)]
    iaqi: HashMap<String, WaqiValue>,
}

#[async_trait]
impl AirQualityProvider for WaqiProvider {
    async fn fetch_by_coordinates(&self, coords: Coordinates) -> FetchOutcome {
        let station = format!("geo:{};{}", coords.lat, coords.lon);

        self.fetch_feed(&station).await.map_err(|err| match err {
            FeedError::Fetch(err) => err,
            FeedError::Status(detail) => {
                FetchError::Api(detail.unwrap_or_else(|| GENERIC_API_MESSAGE.to_string()))
            }
        })
    }

    async fn fetch_by_place_name(&self, text: &str) -> Option<FetchOutcome> {
        let query = normalize_place_query(text)?;

        let outcome = self.fetch_feed(query).await.map_err(|err| match err {
            FeedError::Fetch(err) => err,
            FeedError::Status(detail) => place_not_found(query, detail.as_deref()),
        });

        Some(outcome)
    }
}

fn parse_aqi(raw: &Value) -> Option<i32> {
    let value = match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;

    i32::try_from(value).ok()
}

fn truncate_body(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
