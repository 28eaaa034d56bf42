//! Weather domain types.

use serde::{Deserialize, Serialize};

/// Measurement system sent to the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Standard,
    #[default]
    Metric,
    Imperial,
}

impl Units {
    /// Value of the `units` query parameter.
    pub fn as_query_param(&self) -> &'static str {
        match self {
            Units::Standard => "standard",
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    /// Temperature symbol for display.
    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Standard => "K",
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }
}

/// One stored weather record for a city at a point in time.
///
/// At most one snapshot exists per `city_name`; a newer fetch for the same
/// city replaces the prior snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city_name: String,
    pub country: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u32,
    pub pressure: u32,
    pub description: String,
    pub icon_url: String,
    pub wind_speed: f64,
    /// Epoch seconds.
    pub sunrise: i64,
    /// Epoch seconds.
    pub sunset: i64,
    /// Epoch milliseconds at fetch time.
    pub updated_at: i64,
}

impl WeatherSnapshot {
    /// Age of this snapshot relative to `now_ms`, in milliseconds.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.updated_at
    }

    /// Formatted temperature string, e.g. "15°C".
    pub fn formatted_temperature(&self) -> String {
        format!("{}°C", self.temperature as i64)
    }

    /// Formatted feels-like temperature string.
    pub fn formatted_feels_like(&self) -> String {
        format!("{}°C", self.feels_like as i64)
    }

    /// Formatted temperature range string, e.g. "H:18°C L:12°C".
    pub fn formatted_temp_range(&self) -> String {
        format!(
            "H:{}°C L:{}°C",
            self.temp_max as i64, self.temp_min as i64
        )
    }

    /// Formatted humidity string, e.g. "65%".
    pub fn formatted_humidity(&self) -> String {
        format!("{}%", self.humidity)
    }

    /// Formatted wind speed string, e.g. "5.5 m/s".
    pub fn formatted_wind_speed(&self) -> String {
        format!("{} m/s", self.wind_speed)
    }
}
