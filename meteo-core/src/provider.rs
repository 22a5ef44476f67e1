use crate::{
    Config,
    error::Result,
    model::{Coordinates, HourlyForecast, LocationCandidate},
    provider::openmeteo::OpenMeteoClient,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod openmeteo;

/// Source of hourly forecasts.
#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn forecast(&self, coordinates: Coordinates) -> Result<HourlyForecast>;
}

/// City name lookup. An empty vector means "no city found".
#[async_trait]
pub trait GeocodingProvider: Send + Sync + Debug {
    async fn search(&self, name: &str) -> Result<Vec<LocationCandidate>>;
}

/// Construct the Open-Meteo client from config, shared by both roles.
pub fn open_meteo_from_config(config: &Config) -> Result<Arc<OpenMeteoClient>> {
    Ok(Arc::new(OpenMeteoClient::from_config(config)?))
}
