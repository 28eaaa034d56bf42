//! SQLite-backed snapshot cache, one row per city.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use nimbus_core::{DatabaseError, RusqliteErrorExt};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tokio::sync::watch;

use crate::types::WeatherSnapshot;

/// Snapshot cache keyed by city name. Last write wins per city.
///
/// Cloning shares the underlying connection and watch channels.
#[derive(Clone)]
pub struct WeatherStore {
    conn: Arc<Mutex<Connection>>,
    city_watchers: Arc<Mutex<HashMap<String, watch::Sender<Option<WeatherSnapshot>>>>>,
    all_watcher: Arc<watch::Sender<Vec<WeatherSnapshot>>>,
}

impl WeatherStore {
    /// Open (or create) the cache at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory cache (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let (all_tx, _) = watch::channel(Vec::new());
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            city_watchers: Arc::new(Mutex::new(HashMap::new())),
            all_watcher: Arc::new(all_tx),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS weather_cache (
                    city_name TEXT PRIMARY KEY,
                    temperature REAL NOT NULL,
                    feels_like REAL NOT NULL,
                    temp_min REAL NOT NULL,
                    temp_max REAL NOT NULL,
                    humidity INTEGER NOT NULL,
                    pressure INTEGER NOT NULL,
                    description TEXT NOT NULL,
                    icon_url TEXT NOT NULL,
                    wind_speed REAL NOT NULL,
                    country TEXT NOT NULL,
                    sunrise INTEGER NOT NULL,
                    sunset INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_weather_updated ON weather_cache(updated_at);
                "#,
            )
            .map_err(|e| e.into_database_error())
    }

    /// Insert or replace the snapshot for its city.
    pub fn put(&self, snapshot: &WeatherSnapshot) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute(
                r#"
                INSERT OR REPLACE INTO weather_cache
                (city_name, temperature, feels_like, temp_min, temp_max, humidity, pressure,
                 description, icon_url, wind_speed, country, sunrise, sunset, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    snapshot.city_name,
                    snapshot.temperature,
                    snapshot.feels_like,
                    snapshot.temp_min,
                    snapshot.temp_max,
                    snapshot.humidity,
                    snapshot.pressure,
                    snapshot.description,
                    snapshot.icon_url,
                    snapshot.wind_speed,
                    snapshot.country,
                    snapshot.sunrise,
                    snapshot.sunset,
                    snapshot.updated_at,
                ],
            )
            .map_err(|e| e.into_database_error())?;
        self.publish();
        Ok(())
    }

    /// Get the snapshot for a city, if cached.
    pub fn get(&self, city: &str) -> Result<Option<WeatherSnapshot>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT city_name, temperature, feels_like, temp_min, temp_max, humidity, pressure, \
                 description, icon_url, wind_speed, country, sunrise, sunset, updated_at \
                 FROM weather_cache WHERE city_name = ?1",
            )
            .map_err(|e| e.into_database_error())?;

        let mut rows = stmt
            .query(params![city])
            .map_err(|e| e.into_database_error())?;
        match rows.next().map_err(|e| e.into_database_error())? {
            Some(row) => Ok(Some(
                Self::row_to_snapshot(row).map_err(|e| e.into_database_error())?,
            )),
            None => Ok(None),
        }
    }

    /// All cached snapshots, most recently updated first.
    pub fn get_all(&self) -> Result<Vec<WeatherSnapshot>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT city_name, temperature, feels_like, temp_min, temp_max, humidity, pressure, \
                 description, icon_url, wind_speed, country, sunrise, sunset, updated_at \
                 FROM weather_cache ORDER BY updated_at DESC",
            )
            .map_err(|e| e.into_database_error())?;

        let rows = stmt
            .query_map([], Self::row_to_snapshot)
            .map_err(|e| e.into_database_error())?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.into_database_error())
    }

    /// Delete the snapshot for a city.
    pub fn delete(&self, city: &str) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute("DELETE FROM weather_cache WHERE city_name = ?1", params![city])
            .map_err(|e| e.into_database_error())?;
        self.publish();
        Ok(())
    }

    /// Clear all cached snapshots.
    pub fn delete_all(&self) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute("DELETE FROM weather_cache", [])
            .map_err(|e| e.into_database_error())?;
        self.publish();
        Ok(())
    }

    /// Delete snapshots last updated before the given epoch-millis timestamp.
    /// Returns the number of rows removed.
    pub fn delete_older_than(&self, timestamp_ms: i64) -> Result<u32, DatabaseError> {
        let count = self
            .conn
            .lock()
            .execute(
                "DELETE FROM weather_cache WHERE updated_at < ?1",
                params![timestamp_ms],
            )
            .map_err(|e| e.into_database_error())?;
        if count > 0 {
            self.publish();
        }
        Ok(count as u32)
    }

    /// Number of cached snapshots.
    pub fn count(&self) -> Result<u32, DatabaseError> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM weather_cache", [], |row| row.get(0))
            .map_err(|e| e.into_database_error())
    }

    /// Live view of one city's snapshot. The receiver observes the current
    /// value immediately and every mutation thereafter.
    pub fn watch_city(&self, city: &str) -> watch::Receiver<Option<WeatherSnapshot>> {
        let mut watchers = self.city_watchers.lock();
        if let Some(tx) = watchers.get(city) {
            return tx.subscribe();
        }
        let current = self.get(city).ok().flatten();
        let (tx, rx) = watch::channel(current);
        watchers.insert(city.to_string(), tx);
        rx
    }

    /// Live view of all cached snapshots, most recent first.
    pub fn watch_all(&self) -> watch::Receiver<Vec<WeatherSnapshot>> {
        // Seed with the current contents so new subscribers don't start empty.
        let all = self.get_all().unwrap_or_default();
        self.all_watcher.send_replace(all);
        self.all_watcher.subscribe()
    }

    /// Push current values to every registered watcher.
    fn publish(&self) {
        let mut watchers = self.city_watchers.lock();
        watchers.retain(|_, tx| !tx.is_closed());
        for (city, tx) in watchers.iter() {
            let snapshot = self.get(city).ok().flatten();
            tx.send_replace(snapshot);
        }
        let all = self.get_all().unwrap_or_default();
        self.all_watcher.send_replace(all);
    }

    fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<WeatherSnapshot> {
        Ok(WeatherSnapshot {
            city_name: row.get(0)?,
            temperature: row.get(1)?,
            feels_like: row.get(2)?,
            temp_min: row.get(3)?,
            temp_max: row.get(4)?,
            humidity: row.get(5)?,
            pressure: row.get(6)?,
            description: row.get(7)?,
            icon_url: row.get(8)?,
            wind_speed: row.get(9)?,
            country: row.get(10)?,
            sunrise: row.get(11)?,
            sunset: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}
