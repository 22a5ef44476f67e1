//! Core library for the `meteo` client.
//!
//! This crate defines:
//! - Classification of hourly forecasts into a "current weather" snapshot
//! - The ordered favorites list with the current location pinned first
//! - Persistence of favorites in a key-value slot
//! - Open-Meteo forecast and geocoding providers
//! - The aggregation service tying them together
//!
//! It is used by `meteo-cli`, but any front end can drive [`AggregationService`].

pub mod classify;
pub mod config;
pub mod error;
pub mod model;
pub mod persistence;
pub mod provider;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::MeteoError;
pub use model::{
    Coordinates, CurrentConditions, FavoriteEntry, ForecastDetail, HourlyForecast, HourlyUnits,
    LocationCandidate, SearchOutcome, WeatherCategory,
};
pub use persistence::{FavoritesCodec, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use provider::{ForecastProvider, GeocodingProvider, openmeteo::OpenMeteoClient};
pub use service::{AggregationService, CURRENT_LOCATION_LABEL, FetchState, RefreshReport};
pub use store::{FavoritesStore, MergeOutcome};
