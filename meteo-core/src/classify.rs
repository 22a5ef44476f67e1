//! Reduction of an hourly forecast to a single "now" snapshot.

use chrono::{Local, NaiveDateTime, Timelike};

use crate::{
    error::{MeteoError, Result},
    model::{Coordinates, CurrentConditions, ForecastDetail, HourlyForecast, WeatherCategory},
};

/// Hours used for the daily min/max in the detail view.
const DAY_WINDOW: usize = 24;

/// Local wall-clock hour, 0..=23.
pub fn now_hour() -> u32 {
    Local::now().hour()
}

fn parse_hour(timestamp: &str) -> Option<u32> {
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(timestamp, fmt).ok())
        .map(|dt| dt.hour())
}

/// First index whose hour-of-day equals `now_hour`, or 0 when none does.
pub fn resolve_hour_index(times: &[String], now_hour: u32) -> usize {
    times.iter().position(|t| parse_hour(t) == Some(now_hour)).unwrap_or(0)
}

/// Classify the hour matching `now_hour`.
///
/// Fails with [`MeteoError::IndexOutOfRange`] when a series is shorter than
/// the resolved index (an empty forecast always fails this way).
pub fn classify(
    forecast: &HourlyForecast,
    now_hour: u32,
    label: impl Into<String>,
    coordinates: Coordinates,
    is_current_location: bool,
) -> Result<CurrentConditions> {
    let index = resolve_hour_index(&forecast.times, now_hour);

    let precipitation = HourlyForecast::sample("precipitation", &forecast.precipitation, index)?;
    let cloud_cover = HourlyForecast::sample("cloud_cover", &forecast.cloud_cover, index)?;
    let temperature = HourlyForecast::sample("temperature", &forecast.temperatures, index)?;

    Ok(CurrentConditions {
        label: label.into(),
        temperature: format!("{temperature}{}", forecast.units.temperature),
        category: WeatherCategory::from_sample(precipitation, cloud_cover),
        is_current_location,
        coordinates,
    })
}

/// Build the detail view for the hour matching `now_hour`.
pub fn detail(
    forecast: &HourlyForecast,
    now_hour: u32,
    label: impl Into<String>,
    coordinates: Coordinates,
) -> Result<ForecastDetail> {
    let conditions = classify(forecast, now_hour, label, coordinates, false)?;
    let index = resolve_hour_index(&forecast.times, now_hour);
    let wind = HourlyForecast::sample("wind_speed", &forecast.wind_speed, index)?;

    let day = &forecast.temperatures[..forecast.temperatures.len().min(DAY_WINDOW)];
    let (min, max) = day
        .iter()
        .fold(None, |acc: Option<(f64, f64)>, &t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
        .ok_or_else(|| MeteoError::MalformedForecast("no temperature samples".into()))?;

    Ok(ForecastDetail {
        label: conditions.label,
        temperature: conditions.temperature,
        min_temperature: min,
        max_temperature: max,
        wind: format!("{wind} {}", forecast.units.wind_speed),
        category: conditions.category,
        coordinates,
    })
}
