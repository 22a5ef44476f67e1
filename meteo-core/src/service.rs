//! Orchestration of fetch → classify → merge → persist.

use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    Config,
    classify::{self, now_hour},
    error::Result,
    model::{
        Coordinates, CurrentConditions, FavoriteEntry, ForecastDetail, LocationCandidate,
        SearchOutcome,
    },
    persistence::{FAVORITES_NAMESPACE, FavoritesCodec, FileKeyValueStore},
    provider::{ForecastProvider, GeocodingProvider, open_meteo_from_config},
    store::{FavoritesStore, MergeOutcome, RefreshTicket},
};

/// Name given to the device's own position.
pub const CURRENT_LOCATION_LABEL: &str = "Current Location";

/// Returns the wall-clock hour used for classification.
pub type HourSource = Arc<dyn Fn() -> u32 + Send + Sync>;

/// Weather lifecycle of a single location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Unfetched,
    Fetching,
    Classified,
    FetchFailed,
}

/// Result of refreshing one saved favorite.
#[derive(Debug)]
pub struct RefreshReport {
    pub name: String,
    pub result: Result<CurrentConditions>,
}

pub struct AggregationService {
    forecasts: Arc<dyn ForecastProvider>,
    geocoder: Arc<dyn GeocodingProvider>,
    codec: FavoritesCodec,
    hour_source: HourSource,
    store: Mutex<FavoritesStore>,
    coordinates: Mutex<HashMap<String, Coordinates>>,
    states: Mutex<HashMap<String, FetchState>>,
}

impl std::fmt::Debug for AggregationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationService")
            .field("forecasts", &self.forecasts)
            .field("geocoder", &self.geocoder)
            .field("codec", &self.codec)
            .field("store", &*self.store.lock())
            .finish_non_exhaustive()
    }
}

impl AggregationService {
    pub fn new(
        forecasts: Arc<dyn ForecastProvider>,
        geocoder: Arc<dyn GeocodingProvider>,
        codec: FavoritesCodec,
    ) -> Self {
        Self {
            forecasts,
            geocoder,
            codec,
            hour_source: Arc::new(now_hour),
            store: Mutex::new(FavoritesStore::new()),
            coordinates: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Open-Meteo for both roles, favorites in the configured data directory.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = open_meteo_from_config(config)?;
        let dir = config.favorites_dir()?;
        let codec = FavoritesCodec::new(Arc::new(FileKeyValueStore::new(&dir, FAVORITES_NAMESPACE)));
        Ok(Self::new(client.clone(), client, codec))
    }

    pub fn with_hour_source(mut self, hour_source: HourSource) -> Self {
        self.hour_source = hour_source;
        self
    }

    pub fn codec(&self) -> &FavoritesCodec {
        &self.codec
    }

    /// Fetch and pin the device's own position. The result lives only in the
    /// in-memory list; it is not written to the favorites store.
    pub async fn refresh_current_location(
        &self,
        coordinates: Coordinates,
    ) -> Result<CurrentConditions> {
        self.fetch_and_merge(CURRENT_LOCATION_LABEL, coordinates, true).await
    }

    /// Refresh every persisted favorite concurrently.
    ///
    /// Each entry succeeds or fails on its own. Successful results are merged
    /// in persisted order once all fetches have settled.
    pub async fn refresh_saved_favorites(&self) -> Vec<RefreshReport> {
        let entries = self.codec.load();
        debug!(count = entries.len(), "Refreshing saved favorites");

        let fetches = entries.iter().map(|entry| {
            let ticket = self.begin(&entry.name);
            async move {
                let result = self
                    .fetch_conditions(&entry.name, entry.coordinates(), entry.is_current_location)
                    .await;
                (ticket, result)
            }
        });
        let settled = join_all(fetches).await;

        settled
            .into_iter()
            .map(|(ticket, result)| {
                let name = ticket.name().to_string();
                RefreshReport { name, result: self.settle(ticket, result) }
            })
            .collect()
    }

    pub async fn search_city(&self, query: &str) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchOutcome::NoMatch);
        }

        let candidates = self.geocoder.search(query).await?;
        debug!(query, count = candidates.len(), "City search finished");
        Ok(SearchOutcome::from_candidates(candidates))
    }

    pub async fn select_candidate_and_fetch(
        &self,
        candidate: &LocationCandidate,
    ) -> Result<CurrentConditions> {
        self.fetch_and_merge(&candidate.display_label(), candidate.coordinates(), false).await
    }

    /// Detail view for a location; does not touch the favorites list.
    pub async fn forecast_detail(
        &self,
        name: &str,
        coordinates: Coordinates,
    ) -> Result<ForecastDetail> {
        let forecast = self.forecasts.forecast(coordinates).await?;
        classify::detail(&forecast, (self.hour_source)(), name, coordinates)
    }

    /// Save `name` and, when the list does not show it yet, fetch its
    /// conditions so it appears in [`favorites`](Self::favorites) right away.
    /// A failed fetch leaves the entry saved and marks it `FetchFailed`.
    pub async fn add_favorite(&self, name: &str, coordinates: Coordinates) -> Result<bool> {
        let added = self.codec.add(FavoriteEntry::new(name, coordinates))?;
        self.coordinates.lock().insert(name.to_string(), coordinates);
        if !added {
            return Ok(false);
        }
        info!(name, "Added favorite");

        let listed = self.store.lock().contains(name);
        if !listed {
            // Failure is already logged and recorded in the fetch state.
            let _ = self.fetch_and_merge(name, coordinates, false).await;
        }
        Ok(true)
    }

    /// Remove `name` from the list and from storage. The current location is
    /// never removed.
    pub fn remove_favorite(&self, name: &str) -> Result<bool> {
        let removed = {
            let mut store = self.store.lock();
            if store.get(name).is_some_and(|c| c.is_current_location) {
                debug!(name, "Ignoring removal of current location");
                return Ok(false);
            }
            store.remove_by_name(name)
        };

        let persisted = self.codec.remove(name)?;
        self.coordinates.lock().remove(name);
        self.states.lock().remove(name);

        if removed || persisted {
            info!(name, "Removed favorite");
        }
        Ok(removed || persisted)
    }

    /// Returns whether `name` is a favorite afterwards.
    pub async fn toggle_favorite(&self, name: &str, coordinates: Coordinates) -> Result<bool> {
        if self.is_favorite(name)? {
            self.remove_favorite(name)?;
            self.is_favorite(name)
        } else {
            self.add_favorite(name, coordinates).await?;
            Ok(true)
        }
    }

    pub fn is_favorite(&self, name: &str) -> Result<bool> {
        self.codec.contains(name)
    }

    /// Snapshot of the list in display order.
    pub fn favorites(&self) -> Vec<CurrentConditions> {
        self.store.lock().to_ordered_list()
    }

    pub fn coordinates_for(&self, name: &str) -> Option<Coordinates> {
        self.coordinates.lock().get(name).copied()
    }

    pub fn fetch_state(&self, name: &str) -> FetchState {
        self.states.lock().get(name).copied().unwrap_or(FetchState::Unfetched)
    }

    async fn fetch_and_merge(
        &self,
        name: &str,
        coordinates: Coordinates,
        is_current_location: bool,
    ) -> Result<CurrentConditions> {
        let ticket = self.begin(name);
        let result = self.fetch_conditions(name, coordinates, is_current_location).await;
        self.settle(ticket, result)
    }

    fn begin(&self, name: &str) -> RefreshTicket {
        self.states.lock().insert(name.to_string(), FetchState::Fetching);
        self.store.lock().ticket(name)
    }

    async fn fetch_conditions(
        &self,
        name: &str,
        coordinates: Coordinates,
        is_current_location: bool,
    ) -> Result<CurrentConditions> {
        let result = match self.forecasts.forecast(coordinates).await {
            Ok(forecast) => classify::classify(
                &forecast,
                (self.hour_source)(),
                name,
                coordinates,
                is_current_location,
            ),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            warn!(name, error = %err, "Weather unavailable");
            self.states.lock().insert(name.to_string(), FetchState::FetchFailed);
        }
        result
    }

    fn settle(
        &self,
        ticket: RefreshTicket,
        result: Result<CurrentConditions>,
    ) -> Result<CurrentConditions> {
        match result {
            Ok(conditions) => {
                self.commit(conditions.clone(), ticket);
                Ok(conditions)
            }
            Err(err) => {
                self.store.lock().release(ticket);
                Err(err)
            }
        }
    }

    fn commit(&self, conditions: CurrentConditions, ticket: RefreshTicket) {
        let name = conditions.label.clone();
        let coordinates = conditions.coordinates;

        let outcome = self.store.lock().merge_with_ticket(conditions, ticket);
        if outcome == MergeOutcome::Stale {
            debug!(name = %name, "Dropping result for a removed location");
            return;
        }

        debug!(name = %name, ?outcome, "Merged conditions");
        self.coordinates.lock().insert(name.clone(), coordinates);
        self.states.lock().insert(name, FetchState::Classified);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        MeteoError,
        model::{HourlyForecast, HourlyUnits, WeatherCategory},
    };
    use async_trait::async_trait;
    use futures::channel::oneshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(c: Coordinates) -> String {
        format!("{},{}", c.latitude, c.longitude)
    }

    fn one_hour(temperature: f64, precipitation: f64, cloud_cover: f64) -> HourlyForecast {
        HourlyForecast {
            times: vec!["2026-10-17T12:00".into()],
            temperatures: vec![temperature],
            precipitation: vec![precipitation],
            cloud_cover: vec![cloud_cover],
            humidity: vec![60.0],
            wind_speed: vec![9.0],
            units: HourlyUnits {
                temperature: "°C".into(),
                wind_speed: "km/h".into(),
                ..HourlyUnits::default()
            },
        }
    }

    #[derive(Debug, Default)]
    struct FakeForecasts {
        by_location: Mutex<HashMap<String, HourlyForecast>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        calls: AtomicUsize,
    }

    impl FakeForecasts {
        fn with(self, coordinates: Coordinates, forecast: HourlyForecast) -> Self {
            self.by_location.lock().insert(key(coordinates), forecast);
            self
        }

        fn forget(&self, coordinates: Coordinates) {
            self.by_location.lock().remove(&key(coordinates));
        }
    }

    #[async_trait]
    impl ForecastProvider for FakeForecasts {
        async fn forecast(&self, coordinates: Coordinates) -> Result<HourlyForecast> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.by_location
                .lock()
                .get(&key(coordinates))
                .cloned()
                .ok_or_else(|| MeteoError::Network("connection refused".into()))
        }
    }

    #[derive(Debug, Default)]
    struct FakeGeocoder {
        results: Vec<LocationCandidate>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeocodingProvider for FakeGeocoder {
        async fn search(&self, _name: &str) -> Result<Vec<LocationCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MeteoError::Http { status: 502, body: "bad gateway".into() });
            }
            Ok(self.results.clone())
        }
    }

    const PARIS: Coordinates = Coordinates { latitude: 48.85, longitude: 2.35 };
    const HERE: Coordinates = Coordinates { latitude: 45.0, longitude: 5.0 };
    const OSLO: Coordinates = Coordinates { latitude: 59.91, longitude: 10.75 };

    fn paris_candidate() -> LocationCandidate {
        LocationCandidate {
            name: "Paris".into(),
            admin1: Some("Île-de-France".into()),
            country: "France".into(),
            latitude: PARIS.latitude,
            longitude: PARIS.longitude,
            country_code: Some("FR".into()),
            timezone: Some("Europe/Paris".into()),
            population: Some(2_138_551),
        }
    }

    fn service(forecasts: Arc<FakeForecasts>, geocoder: FakeGeocoder) -> AggregationService {
        AggregationService::new(forecasts, Arc::new(geocoder), FavoritesCodec::in_memory())
            .with_hour_source(Arc::new(|| 12u32))
    }

    fn labels(svc: &AggregationService) -> Vec<String> {
        svc.favorites().into_iter().map(|c| c.label).collect()
    }

    fn default_forecasts() -> FakeForecasts {
        FakeForecasts::default()
            .with(PARIS, one_hour(14.5, 0.0, 10.0))
            .with(HERE, one_hour(9.0, 0.4, 90.0))
            .with(OSLO, one_hour(3.0, 0.0, 75.0))
    }

    #[tokio::test]
    async fn current_location_is_listed_before_selected_city() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());

        let paris = svc.select_candidate_and_fetch(&paris_candidate()).await.expect("paris");
        assert_eq!(paris.category, WeatherCategory::Sunny);
        assert_eq!(paris.temperature, "14.5°C");

        let here = svc.refresh_current_location(HERE).await.expect("here");
        assert_eq!(here.category, WeatherCategory::Rainy);

        assert_eq!(labels(&svc), vec![CURRENT_LOCATION_LABEL, "Paris, Île-de-France, France"]);
        assert_eq!(svc.coordinates_for("Paris, Île-de-France, France"), Some(PARIS));
    }

    #[tokio::test]
    async fn current_location_is_not_persisted() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());
        svc.refresh_current_location(HERE).await.expect("here");

        assert!(svc.codec().load().is_empty());
        assert_eq!(svc.coordinates_for(CURRENT_LOCATION_LABEL), Some(HERE));
    }

    #[tokio::test]
    async fn saved_favorites_fail_independently_and_keep_order() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());
        svc.add_favorite("Paris", PARIS).await.expect("add");
        svc.add_favorite("Nowhere", Coordinates::new(0.0, 0.0)).await.expect("add");
        svc.add_favorite("Oslo", OSLO).await.expect("add");

        let reports = svc.refresh_saved_favorites().await;

        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Paris", "Nowhere", "Oslo"]);
        assert!(reports[0].result.is_ok());
        assert!(matches!(reports[1].result, Err(MeteoError::Network(_))));
        assert!(reports[2].result.is_ok());

        assert_eq!(labels(&svc), vec!["Paris", "Oslo"]);
        assert_eq!(svc.fetch_state("Nowhere"), FetchState::FetchFailed);
        assert_eq!(svc.fetch_state("Oslo"), FetchState::Classified);
    }

    #[tokio::test]
    async fn malformed_forecast_skips_only_that_entry() {
        let forecasts = default_forecasts().with(OSLO, HourlyForecast::default());
        let svc = service(Arc::new(forecasts), FakeGeocoder::default());
        svc.add_favorite("Oslo", OSLO).await.expect("add");
        svc.add_favorite("Paris", PARIS).await.expect("add");

        let reports = svc.refresh_saved_favorites().await;

        assert!(matches!(reports[0].result, Err(MeteoError::IndexOutOfRange { .. })));
        assert_eq!(labels(&svc), vec!["Paris"]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_known_entry() {
        let forecasts = Arc::new(default_forecasts());
        let svc = service(forecasts.clone(), FakeGeocoder::default());
        svc.refresh_current_location(HERE).await.expect("first fetch");

        forecasts.forget(HERE);
        assert!(svc.refresh_current_location(HERE).await.is_err());

        let list = svc.favorites();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].temperature, "9°C");
        assert_eq!(svc.fetch_state(CURRENT_LOCATION_LABEL), FetchState::FetchFailed);
    }

    #[tokio::test]
    async fn repeated_polling_does_not_duplicate() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());
        svc.add_favorite("Oslo", OSLO).await.expect("add");

        svc.refresh_saved_favorites().await;
        svc.refresh_saved_favorites().await;
        svc.refresh_current_location(HERE).await.expect("here");
        svc.refresh_current_location(HERE).await.expect("here");

        assert_eq!(labels(&svc), vec![CURRENT_LOCATION_LABEL, "Oslo"]);
    }

    #[tokio::test]
    async fn concurrent_current_location_refreshes_leave_one_pin() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());
        svc.select_candidate_and_fetch(&paris_candidate()).await.expect("paris");

        let (a, b) = futures::join!(
            svc.refresh_current_location(HERE),
            svc.refresh_current_location(HERE)
        );
        assert!(a.is_ok() && b.is_ok());

        let list = svc.favorites();
        assert!(list[0].is_current_location);
        assert_eq!(list.iter().filter(|c| c.is_current_location).count(), 1);
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn late_result_for_removed_city_is_dropped() {
        let (tx, rx) = oneshot::channel();
        let forecasts = Arc::new(default_forecasts());
        *forecasts.gate.lock() = Some(rx);
        let svc = service(forecasts, FakeGeocoder::default());
        let label = paris_candidate().display_label();

        let candidate = paris_candidate();
        let fetch = svc.select_candidate_and_fetch(&candidate);
        let remove = async {
            let removed = svc.remove_favorite(&label).expect("remove");
            let _ = tx.send(());
            removed
        };
        let (fetched, removed) = futures::join!(fetch, remove);

        assert!(fetched.is_ok());
        assert!(!removed);
        assert!(svc.favorites().is_empty());
    }

    #[tokio::test]
    async fn current_location_cannot_be_removed() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());
        svc.refresh_current_location(HERE).await.expect("here");

        assert!(!svc.remove_favorite(CURRENT_LOCATION_LABEL).expect("remove"));
        assert_eq!(labels(&svc), vec![CURRENT_LOCATION_LABEL]);
    }

    #[tokio::test]
    async fn remove_favorite_clears_list_and_storage() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());
        svc.add_favorite("Oslo", OSLO).await.expect("add");
        svc.refresh_saved_favorites().await;

        assert!(svc.remove_favorite("Oslo").expect("remove"));
        assert!(svc.favorites().is_empty());
        assert!(!svc.is_favorite("Oslo").expect("read"));
        assert_eq!(svc.coordinates_for("Oslo"), None);
        assert_eq!(svc.fetch_state("Oslo"), FetchState::Unfetched);
    }

    #[tokio::test]
    async fn search_distinguishes_no_match_from_failure() {
        let empty = service(Arc::new(FakeForecasts::default()), FakeGeocoder::default());
        assert_eq!(empty.search_city("Atlantis").await.expect("search"), SearchOutcome::NoMatch);

        let found = service(
            Arc::new(FakeForecasts::default()),
            FakeGeocoder { results: vec![paris_candidate()], ..FakeGeocoder::default() },
        );
        let outcome = found.search_city("Paris").await.expect("search");
        assert_eq!(outcome.candidates().len(), 1);

        let broken = service(
            Arc::new(FakeForecasts::default()),
            FakeGeocoder { fail: true, ..FakeGeocoder::default() },
        );
        assert!(matches!(broken.search_city("Paris").await, Err(MeteoError::Http { status: 502, .. })));
    }

    #[tokio::test]
    async fn blank_search_skips_the_geocoder() {
        let geocoder = FakeGeocoder { results: vec![paris_candidate()], ..FakeGeocoder::default() };
        let geocoder = Arc::new(geocoder);
        let svc = AggregationService::new(
            Arc::new(FakeForecasts::default()),
            geocoder.clone(),
            FavoritesCodec::in_memory(),
        );

        assert_eq!(svc.search_city("   ").await.expect("search"), SearchOutcome::NoMatch);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_state_starts_unfetched() {
        let forecasts = Arc::new(default_forecasts());
        let svc = service(forecasts.clone(), FakeGeocoder::default());
        assert_eq!(svc.fetch_state("Oslo"), FetchState::Unfetched);

        svc.add_favorite("Oslo", OSLO).await.expect("add");
        assert_eq!(svc.fetch_state("Oslo"), FetchState::Classified);
        assert_eq!(forecasts.calls.load(Ordering::SeqCst), 1);

        svc.refresh_saved_favorites().await;
        assert_eq!(forecasts.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn added_favorite_is_listed_immediately() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());
        svc.refresh_current_location(HERE).await.expect("here");

        assert!(svc.add_favorite("Oslo", OSLO).await.expect("add"));

        assert_eq!(labels(&svc), vec![CURRENT_LOCATION_LABEL, "Oslo"]);
        assert_eq!(svc.favorites()[1].temperature, "3°C");
        assert_eq!(svc.codec().load().len(), 1);
    }

    #[tokio::test]
    async fn added_favorite_is_saved_even_if_fetch_fails() {
        let svc = service(Arc::new(FakeForecasts::default()), FakeGeocoder::default());

        assert!(svc.add_favorite("Oslo", OSLO).await.expect("add"));

        assert!(svc.favorites().is_empty());
        assert!(svc.is_favorite("Oslo").expect("read"));
        assert_eq!(svc.fetch_state("Oslo"), FetchState::FetchFailed);
    }

    #[tokio::test]
    async fn adding_a_searched_city_does_not_refetch() {
        let forecasts = Arc::new(default_forecasts());
        let svc = service(forecasts.clone(), FakeGeocoder::default());
        let paris = svc.select_candidate_and_fetch(&paris_candidate()).await.expect("paris");

        svc.add_favorite(&paris.label, paris.coordinates).await.expect("add");

        assert_eq!(forecasts.calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.favorites().len(), 1);
    }

    #[tokio::test]
    async fn toggle_favorite_adds_then_removes() {
        let svc = service(Arc::new(FakeForecasts::default()), FakeGeocoder::default());

        assert!(svc.toggle_favorite("Oslo", OSLO).await.expect("on"));
        assert!(svc.is_favorite("Oslo").expect("read"));
        assert!(!svc.toggle_favorite("Oslo", OSLO).await.expect("off"));
        assert!(!svc.is_favorite("Oslo").expect("read"));
    }

    #[tokio::test]
    async fn detail_uses_injected_hour() {
        let svc = service(Arc::new(default_forecasts()), FakeGeocoder::default());
        let detail = svc.forecast_detail("Oslo", OSLO).await.expect("detail");

        assert_eq!(detail.temperature, "3°C");
        assert_eq!(detail.wind, "9 km/h");
        assert_eq!(detail.category, WeatherCategory::Cloudy);
        assert!(svc.favorites().is_empty());
    }
}
