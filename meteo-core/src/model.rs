use serde::{Deserialize, Serialize};

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Unit labels attached to a forecast. Display only, never converted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyUnits {
    pub temperature: String,
    pub wind_speed: String,
    pub humidity: String,
    pub precipitation: String,
    pub cloud_cover: String,
}

/// Hourly time series for one location.
///
/// Every series is index-aligned with `times`: index `i` in any of them
/// describes the hour `times[i]`. The provider is not trusted to keep the
/// lengths equal, so readers go through [`HourlyForecast::sample`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub times: Vec<String>,
    pub temperatures: Vec<f64>,
    pub precipitation: Vec<f64>,
    pub cloud_cover: Vec<f64>,
    pub humidity: Vec<f64>,
    pub wind_speed: Vec<f64>,
    pub units: HourlyUnits,
}

impl HourlyForecast {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Read `series[index]`, reporting which series was too short.
    pub fn sample(
        series_name: &'static str,
        series: &[f64],
        index: usize,
    ) -> crate::error::Result<f64> {
        series.get(index).copied().ok_or(crate::MeteoError::IndexOutOfRange {
            series: series_name,
            index,
            len: series.len(),
        })
    }
}

/// Coarse weather category shown next to each favorite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCategory {
    Sunny,
    Cloudy,
    Rainy,
}

impl WeatherCategory {
    /// Precipitation is checked before cloud cover.
    pub fn from_sample(precipitation: f64, cloud_cover: f64) -> Self {
        if precipitation > 0.1 {
            Self::Rainy
        } else if cloud_cover > 60.0 {
            Self::Cloudy
        } else {
            Self::Sunny
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Sunny => "Sunny",
            Self::Cloudy => "Cloudy",
            Self::Rainy => "Rainy",
        }
    }

    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Sunny => "day_clear",
            Self::Cloudy => "day_cloudy",
            Self::Rainy => "day_rain",
        }
    }
}

impl std::fmt::Display for WeatherCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Snapshot of "now" for one location, rebuilt on every fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub label: String,
    /// Sample value followed by the unit label, e.g. `"12.5°C"`.
    pub temperature: String,
    pub category: WeatherCategory,
    pub is_current_location: bool,
    pub coordinates: Coordinates,
}

impl CurrentConditions {
    /// Reduce to the persisted shape.
    pub fn to_entry(&self) -> FavoriteEntry {
        FavoriteEntry {
            name: self.label.clone(),
            latitude: self.coordinates.latitude,
            longitude: self.coordinates.longitude,
            is_current_location: self.is_current_location,
        }
    }
}

/// A tracked location as written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub is_current_location: bool,
}

impl FavoriteEntry {
    pub fn new(name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            name: name.into(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            is_current_location: false,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// One geocoding match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCandidate {
    pub name: String,
    #[serde(default)]
    pub admin1: Option<String>,
    #[serde(default)]
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub population: Option<u64>,
}

impl LocationCandidate {
    /// `"City, Region, Country"`, leaving out the region when it is empty.
    pub fn display_label(&self) -> String {
        let mut label = self.name.clone();
        if let Some(admin1) = self.admin1.as_deref().filter(|a| !a.is_empty()) {
            label.push_str(", ");
            label.push_str(admin1);
        }
        label.push_str(", ");
        label.push_str(&self.country);
        label
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Outcome of a city search. An empty match set is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<LocationCandidate>),
    NoMatch,
}

impl SearchOutcome {
    pub fn from_candidates(candidates: Vec<LocationCandidate>) -> Self {
        if candidates.is_empty() { Self::NoMatch } else { Self::Found(candidates) }
    }

    pub fn candidates(&self) -> &[LocationCandidate] {
        match self {
            Self::Found(c) => c,
            Self::NoMatch => &[],
        }
    }
}

/// Detail view for a single location.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDetail {
    pub label: String,
    pub temperature: String,
    /// Over the first 24 hourly samples.
    pub min_temperature: f64,
    pub max_temperature: f64,
    /// Wind value and unit separated by a space, e.g. `"14.2 km/h"`.
    pub wind: String,
    pub category: WeatherCategory,
    pub coordinates: Coordinates,
}
