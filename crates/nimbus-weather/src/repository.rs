//! Cache-first weather repository.
//!
//! Every fetch emits Loading followed by one terminal Success or Error.
//! A cached snapshot younger than the freshness window is served without
//! touching the network; a stale one is preferred over a failed refresh.

use chrono::Utc;
use nimbus_core::{DatabaseError, FetchState};
use tokio::sync::{mpsc, watch};

use crate::cache::WeatherStore;
use crate::client::WeatherClient;
use crate::types::WeatherSnapshot;

/// Cached snapshots younger than this are served without a network call.
const FRESHNESS_WINDOW_MS: i64 = 30 * 60 * 1000;

#[derive(Clone)]
pub struct WeatherRepository {
    client: WeatherClient,
    store: WeatherStore,
}

impl WeatherRepository {
    pub fn new(client: WeatherClient, store: WeatherStore) -> Self {
        Self { client, store }
    }

    /// Fetch current weather for a city.
    ///
    /// The returned channel yields `Loading` immediately, then exactly one
    /// terminal state. With `force_refresh` the freshness check is skipped
    /// and the network is always consulted; the cache fallback on failure
    /// still applies.
    pub fn fetch_by_city(
        &self,
        city: &str,
        force_refresh: bool,
    ) -> mpsc::Receiver<FetchState<WeatherSnapshot>> {
        let (tx, rx) = mpsc::channel(2);
        let repo = self.clone();
        let city = city.to_string();
        tokio::spawn(async move {
            repo.run_city_fetch(&city, force_refresh, tx).await;
        });
        rx
    }

    async fn run_city_fetch(
        &self,
        city: &str,
        force_refresh: bool,
        tx: mpsc::Sender<FetchState<WeatherSnapshot>>,
    ) {
        let _ = tx.send(FetchState::Loading).await;

        // Serve a fresh cached snapshot without a network call
        if !force_refresh {
            if let Some(cached) = self.cached_snapshot(city) {
                if !is_expired(cached.updated_at, Utc::now().timestamp_millis()) {
                    let _ = tx.send(FetchState::Success(cached)).await;
                    return;
                }
            }
        }

        match self.client.current_by_city(city).await {
            Ok(conditions) => {
                let snapshot = conditions.into_snapshot(Utc::now().timestamp_millis());
                if let Err(e) = self.store.put(&snapshot) {
                    tracing::warn!("Failed to cache weather for {}: {}", snapshot.city_name, e);
                }
                let _ = tx.send(FetchState::Success(snapshot)).await;
            }
            Err(e) => {
                // Stale data beats no data; the error is swallowed when a
                // fallback exists.
                tracing::warn!("Weather fetch for {} failed: {}", city, e);
                match self.cached_snapshot(city) {
                    Some(cached) => {
                        let _ = tx.send(FetchState::Success(cached)).await;
                    }
                    None => {
                        let _ = tx.send(FetchState::Error(e.user_message())).await;
                    }
                }
            }
        }
    }

    /// Fetch current weather by coordinates.
    ///
    /// The result is cached under the resolved city name. There is no cache
    /// fallback on this path; failures surface directly.
    pub fn fetch_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> mpsc::Receiver<FetchState<WeatherSnapshot>> {
        let (tx, rx) = mpsc::channel(2);
        let repo = self.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchState::Loading).await;

            match repo.client.current_by_coordinates(lat, lon).await {
                Ok(conditions) => {
                    let snapshot = conditions.into_snapshot(Utc::now().timestamp_millis());
                    if let Err(e) = repo.store.put(&snapshot) {
                        tracing::warn!(
                            "Failed to cache weather for {}: {}",
                            snapshot.city_name,
                            e
                        );
                    }
                    let _ = tx.send(FetchState::Success(snapshot)).await;
                }
                Err(e) => {
                    tracing::warn!("Weather fetch for {},{} failed: {}", lat, lon, e);
                    let _ = tx.send(FetchState::Error(e.user_message())).await;
                }
            }
        });
        rx
    }

    /// Live view of one city's cached snapshot.
    pub fn cached(&self, city: &str) -> watch::Receiver<Option<WeatherSnapshot>> {
        self.store.watch_city(city)
    }

    /// Live view of all cached snapshots.
    pub fn all_cached(&self) -> watch::Receiver<Vec<WeatherSnapshot>> {
        self.store.watch_all()
    }

    /// Clear all cached snapshots.
    pub fn clear_cache(&self) -> Result<(), DatabaseError> {
        self.store.delete_all()
    }

    /// Delete snapshots last updated before the given epoch-millis timestamp.
    pub fn purge_older_than(&self, timestamp_ms: i64) -> Result<u32, DatabaseError> {
        self.store.delete_older_than(timestamp_ms)
    }

    /// A cache read error is treated as a miss, not a failure.
    fn cached_snapshot(&self, city: &str) -> Option<WeatherSnapshot> {
        match self.store.get(city) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Cache read for {} failed: {}", city, e);
                None
            }
        }
    }
}

fn is_expired(updated_at_ms: i64, now_ms: i64) -> bool {
    now_ms - updated_at_ms > FRESHNESS_WINDOW_MS
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::types::Units;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_snapshot(city: &str, temp: f64, updated_at: i64) -> WeatherSnapshot {
        WeatherSnapshot {
            city_name: city.to_string(),
            country: "GB".to_string(),
            temperature: temp,
            feels_like: temp - 1.0,
            temp_min: temp - 3.0,
            temp_max: temp + 3.0,
            humidity: 65,
            pressure: 1013,
            description: "broken clouds".to_string(),
            icon_url: String::new(),
            wind_speed: 5.5,
            sunrise: 1_705_039_200,
            sunset: 1_705_071_600,
            updated_at,
        }
    }

    fn weather_payload(city: &str, temp: f64) -> serde_json::Value {
        serde_json::json!({
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
            "main": {
                "temp": temp,
                "feels_like": temp - 1.0,
                "temp_min": temp - 3.0,
                "temp_max": temp + 3.0,
                "pressure": 1013,
                "humidity": 65
            },
            "wind": {"speed": 5.5, "deg": 200},
            "sys": {"country": "GB", "sunrise": 1705039200i64, "sunset": 1705071600i64},
            "name": city
        })
    }

    fn repository(base_url: &str, store: WeatherStore) -> WeatherRepository {
        let client = WeatherClient::new("test_key", Units::Metric, Duration::from_secs(5))
            .unwrap()
            .with_base_url(base_url);
        WeatherRepository::new(client, store)
    }

    async fn collect(
        mut rx: mpsc::Receiver<FetchState<WeatherSnapshot>>,
    ) -> Vec<FetchState<WeatherSnapshot>> {
        let mut states = Vec::new();
        while let Some(state) = rx.recv().await {
            states.push(state);
        }
        states
    }

    #[tokio::test]
    async fn fresh_cache_skips_network() {
        let mock_server = MockServer::start().await;
        // Any request here would violate the freshness contract
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        let now = Utc::now().timestamp_millis();
        store
            .put(&test_snapshot("London", 15.0, now - 10 * 60 * 1000))
            .unwrap();

        let repo = repository(&mock_server.uri(), store);
        let states = collect(repo.fetch_by_city("London", false)).await;

        assert_eq!(states.len(), 2);
        assert!(states[0].is_loading());
        let snapshot = states[1].clone().success().unwrap();
        assert_eq!(snapshot.temperature, 15.0);
    }

    #[tokio::test]
    async fn stale_cache_triggers_single_network_call() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("q", "London"))
            .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload("London", 20.0)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        let now = Utc::now().timestamp_millis();
        store
            .put(&test_snapshot("London", 15.0, now - 40 * 60 * 1000))
            .unwrap();

        let repo = repository(&mock_server.uri(), store.clone());
        let before_fetch = Utc::now().timestamp_millis();
        let states = collect(repo.fetch_by_city("London", false)).await;

        assert!(states[0].is_loading());
        let snapshot = states[1].clone().success().unwrap();
        assert_eq!(snapshot.temperature, 20.0);

        // Cache was replaced, not appended, and stamped at fetch time
        assert_eq!(store.count().unwrap(), 1);
        let cached = store.get("London").unwrap().unwrap();
        assert_eq!(cached.temperature, 20.0);
        assert!(cached.updated_at >= before_fetch);
    }

    #[tokio::test]
    async fn cache_miss_fetches_from_network() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload("Paris", 18.0)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        let repo = repository(&mock_server.uri(), store.clone());
        let states = collect(repo.fetch_by_city("Paris", false)).await;

        let snapshot = states[1].clone().success().unwrap();
        assert_eq!(snapshot.city_name, "Paris");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_fresh_cache() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload("London", 22.0)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        let now = Utc::now().timestamp_millis();
        store
            .put(&test_snapshot("London", 15.0, now - 60 * 1000))
            .unwrap();

        let repo = repository(&mock_server.uri(), store);
        let states = collect(repo.fetch_by_city("London", true)).await;

        let snapshot = states[1].clone().success().unwrap();
        assert_eq!(snapshot.temperature, 22.0);
    }

    #[tokio::test]
    async fn failure_falls_back_to_stale_cache() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        let now = Utc::now().timestamp_millis();
        // Hours old, well past the freshness window
        store
            .put(&test_snapshot("London", 15.0, now - 5 * 60 * 60 * 1000))
            .unwrap();

        let repo = repository(&mock_server.uri(), store);
        let states = collect(repo.fetch_by_city("London", false)).await;

        assert!(states[0].is_loading());
        let snapshot = states[1].clone().success().unwrap();
        assert_eq!(snapshot.temperature, 15.0);
    }

    #[tokio::test]
    async fn force_refresh_failure_still_falls_back() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        let now = Utc::now().timestamp_millis();
        store
            .put(&test_snapshot("London", 15.0, now - 60 * 1000))
            .unwrap();

        let repo = repository(&mock_server.uri(), store);
        let states = collect(repo.fetch_by_city("London", true)).await;

        let snapshot = states[1].clone().success().unwrap();
        assert_eq!(snapshot.temperature, 15.0);
    }

    #[tokio::test]
    async fn failure_with_empty_cache_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        let repo = repository(&mock_server.uri(), store.clone());
        let states = collect(repo.fetch_by_city("London", false)).await;

        assert_eq!(states.len(), 2);
        assert!(states[0].is_loading());
        assert!(states[1].is_error());
        // No cache write on failure
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn coordinates_fetch_caches_by_resolved_name() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("lat", "51.51"))
            .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload("London", 17.0)))
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        let repo = repository(&mock_server.uri(), store.clone());
        let states = collect(repo.fetch_by_coordinates(51.51, -0.13)).await;

        let snapshot = states[1].clone().success().unwrap();
        assert_eq!(snapshot.city_name, "London");
        assert!(store.get("London").unwrap().is_some());
    }

    #[tokio::test]
    async fn coordinates_failure_has_no_fallback() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let store = WeatherStore::in_memory().unwrap();
        // A cached row exists, but the coordinate path never consults it
        store
            .put(&test_snapshot("London", 15.0, Utc::now().timestamp_millis()))
            .unwrap();

        let repo = repository(&mock_server.uri(), store);
        let states = collect(repo.fetch_by_coordinates(51.51, -0.13)).await;

        assert!(states[1].is_error());
    }

    #[tokio::test]
    async fn clear_cache_removes_everything() {
        let store = WeatherStore::in_memory().unwrap();
        store
            .put(&test_snapshot("London", 15.0, 1_000))
            .unwrap();

        let mock_server = MockServer::start().await;
        let repo = repository(&mock_server.uri(), store.clone());
        repo.clear_cache().unwrap();

        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn expiry_boundary() {
        // Exactly at the window is still fresh; one past is stale
        assert!(!is_expired(0, FRESHNESS_WINDOW_MS));
        assert!(is_expired(0, FRESHNESS_WINDOW_MS + 1));
    }
}
