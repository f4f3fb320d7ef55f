//! External weather feed client.
//!
//! Supplies the extreme-weather boolean consumed by emergency pricing.
//! Strictly best-effort: callers degrade to "not extreme" when the feed
//! is unreachable.

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("HTTP request to weather feed failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct ConditionsResponse {
    extreme: bool,
}

/// Client for the external weather conditions feed.
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
}

impl WeatherClient {
    pub fn new(base_url: &str) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Whether extreme weather is active at the given coordinate.
    pub async fn is_extreme(&self, lat: f64, lng: f64) -> Result<bool, WeatherError> {
        let url = format!("{}/v1/conditions", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("lat", lat), ("lng", lng)])
            .send()
            .await?
            .error_for_status()?
            .json::<ConditionsResponse>()
            .await?;

        Ok(response.extreme)
    }
}

/// Best-effort lookup: any failure logs a warning and reports false.
pub async fn extreme_weather_or_default(
    client: Option<&WeatherClient>,
    lat: f64,
    lng: f64,
) -> bool {
    match client {
        Some(client) => match client.is_extreme(lat, lng).await {
            Ok(extreme) => extreme,
            Err(e) => {
                tracing::warn!(error = %e, "weather feed unavailable, assuming not extreme");
                false
            }
        },
        None => false,
    }
}
