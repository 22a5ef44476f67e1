use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    Config,
    error::{MeteoError, Result},
    model::{Coordinates, HourlyForecast, HourlyUnits, LocationCandidate},
};

use super::{ForecastProvider, GeocodingProvider};

/// Metrics requested for every forecast.
const HOURLY_METRICS: &str =
    "temperature_2m,relativehumidity_2m,windspeed_10m,precipitation,cloud_cover";

#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    forecast_base_url: String,
    geocoding_base_url: String,
    http: Client,
}

impl OpenMeteoClient {
    pub fn new(http: Client, forecast_base_url: &str, geocoding_base_url: &str) -> Self {
        Self {
            forecast_base_url: forecast_base_url.trim_end_matches('/').to_string(),
            geocoding_base_url: geocoding_base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::new(http, &config.forecast_base_url, &config.geocoding_base_url))
    }

    pub fn forecast_url(&self) -> String {
        format!("{}/v1/forecast", self.forecast_base_url)
    }

    pub fn search_url(&self) -> String {
        format!("{}/v1/search", self.geocoding_base_url)
    }

    async fn get_body(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let res = request.send().await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(MeteoError::Http { status: status.as_u16(), body: truncate_body(&body) });
        }

        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct OmHourly {
    time: Vec<String>,
    temperature_2m: Vec<f64>,
    relativehumidity_2m: Vec<f64>,
    windspeed_10m: Vec<f64>,
    precipitation: Vec<f64>,
    cloud_cover: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OmHourlyUnits {
    #[serde(default)]
    temperature_2m: String,
    #[serde(default)]
    relativehumidity_2m: String,
    #[serde(default)]
    windspeed_10m: String,
    #[serde(default)]
    precipitation: String,
    #[serde(default)]
    cloud_cover: String,
}

#[derive(Debug, Deserialize)]
struct OmForecastResponse {
    hourly: OmHourly,
    #[serde(default)]
    hourly_units: OmHourlyUnits,
}

impl From<OmForecastResponse> for HourlyForecast {
    fn from(res: OmForecastResponse) -> Self {
        HourlyForecast {
            times: res.hourly.time,
            temperatures: res.hourly.temperature_2m,
            precipitation: res.hourly.precipitation,
            cloud_cover: res.hourly.cloud_cover,
            humidity: res.hourly.relativehumidity_2m,
            wind_speed: res.hourly.windspeed_10m,
            units: HourlyUnits {
                temperature: res.hourly_units.temperature_2m,
                wind_speed: res.hourly_units.windspeed_10m,
                humidity: res.hourly_units.relativehumidity_2m,
                precipitation: res.hourly_units.precipitation,
                cloud_cover: res.hourly_units.cloud_cover,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct OmSearchResponse {
    #[serde(default)]
    results: Option<Vec<LocationCandidate>>,
}

#[async_trait]
impl ForecastProvider for OpenMeteoClient {
    #[instrument(skip(self), fields(lat = %coordinates.latitude, lon = %coordinates.longitude))]
    async fn forecast(&self, coordinates: Coordinates) -> Result<HourlyForecast> {
        let url = self.forecast_url();
        debug!(url = %url, "Fetching hourly forecast");

        let request = self.http.get(&url).query(&[
            ("latitude", coordinates.latitude.to_string()),
            ("longitude", coordinates.longitude.to_string()),
            ("hourly", HOURLY_METRICS.to_string()),
            ("timezone", "auto".to_string()),
        ]);
        let body = self.get_body(request).await?;

        let parsed: OmForecastResponse = serde_json::from_str(&body)
            .map_err(|e| MeteoError::MalformedForecast(e.to_string()))?;

        Ok(parsed.into())
    }
}

#[async_trait]
impl GeocodingProvider for OpenMeteoClient {
    #[instrument(skip(self))]
    async fn search(&self, name: &str) -> Result<Vec<LocationCandidate>> {
        let url = self.search_url();
        debug!(url = %url, "Searching city");

        let body = self.get_body(self.http.get(&url).query(&[("name", name)])).await?;

        let parsed: OmSearchResponse = serde_json::from_str(&body)
            .map_err(|e| MeteoError::MalformedResponse(e.to_string()))?;

        Ok(parsed.results.unwrap_or_default())
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
