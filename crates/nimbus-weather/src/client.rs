//! OpenWeatherMap current-weather API client.
//! Documentation: https://openweathermap.org/current

use nimbus_core::ReqwestErrorExt;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use crate::error::WeatherFetchError;
use crate::types::{Units, WeatherSnapshot};

const OPENWEATHER_API_BASE: &str = "https://api.openweathermap.org/data/2.5";
const ICON_URL_BASE: &str = "https://openweathermap.org/img/wn";

#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    api_key: String,
    units: Units,
    base_url: String,
}

impl WeatherClient {
    /// Create a client with the given API key and measurement units.
    pub fn new(
        api_key: &str,
        units: Units,
        timeout: Duration,
    ) -> Result<Self, WeatherFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherFetchError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            units,
            base_url: OPENWEATHER_API_BASE.to_string(),
        })
    }

    /// Point the client at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch current conditions by city name.
    #[instrument(skip(self), level = "info")]
    pub async fn current_by_city(
        &self,
        city: &str,
    ) -> Result<CurrentConditions, WeatherFetchError> {
        let url = format!(
            "{}/weather?q={}&appid={}&units={}",
            self.base_url,
            urlencoding::encode(city),
            self.api_key,
            self.units.as_query_param(),
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WeatherFetchError::Network(e.into_network_error()))?;

        self.handle_response(response, city).await
    }

    /// Fetch current conditions by geographic coordinates.
    #[instrument(skip(self), level = "info")]
    pub async fn current_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<CurrentConditions, WeatherFetchError> {
        let url = format!(
            "{}/weather?lat={}&lon={}&appid={}&units={}",
            self.base_url,
            lat,
            lon,
            self.api_key,
            self.units.as_query_param(),
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WeatherFetchError::Network(e.into_network_error()))?;

        self.handle_response(response, &format!("{},{}", lat, lon))
            .await
    }

    /// Map API responses and error statuses to our types.
    async fn handle_response(
        &self,
        response: reqwest::Response,
        query: &str,
    ) -> Result<CurrentConditions, WeatherFetchError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| WeatherFetchError::Decode(e.to_string()))
        } else if status.as_u16() == 401 {
            Err(WeatherFetchError::InvalidApiKey)
        } else if status.as_u16() == 404 {
            Err(WeatherFetchError::CityNotFound(query.to_string()))
        } else if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            Err(WeatherFetchError::RateLimited(retry_after))
        } else if status.is_server_error() {
            Err(WeatherFetchError::ServiceUnavailable)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(WeatherFetchError::Api(format!("{}: {}", status, text)))
        }
    }
}

// Raw payload shapes from the /weather endpoint. Every field is optional;
// the API omits blocks freely depending on the station.

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentConditions {
    pub coord: Option<Coord>,
    #[serde(default)]
    pub weather: Vec<Condition>,
    pub main: Option<Readings>,
    pub wind: Option<Wind>,
    pub sys: Option<Sys>,
    pub dt: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coord {
    pub lon: Option<f64>,
    pub lat: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub id: Option<i64>,
    pub main: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Readings {
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub pressure: Option<u32>,
    pub humidity: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Wind {
    pub speed: Option<f64>,
    pub deg: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sys {
    pub country: Option<String>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

impl CurrentConditions {
    /// Convert the raw payload into a snapshot stamped at `now_ms`.
    pub fn into_snapshot(self, now_ms: i64) -> WeatherSnapshot {
        let main = self.main.unwrap_or_default();
        let condition = self.weather.into_iter().next();
        let sys = self.sys.unwrap_or_default();

        WeatherSnapshot {
            city_name: self.name.unwrap_or_default(),
            country: sys.country.unwrap_or_default(),
            temperature: main.temp.unwrap_or_default(),
            feels_like: main.feels_like.unwrap_or_default(),
            temp_min: main.temp_min.unwrap_or_default(),
            temp_max: main.temp_max.unwrap_or_default(),
            humidity: main.humidity.unwrap_or_default(),
            pressure: main.pressure.unwrap_or_default(),
            description: condition
                .as_ref()
                .and_then(|c| c.description.clone())
                .unwrap_or_default(),
            icon_url: condition
                .as_ref()
                .and_then(|c| c.icon.as_deref())
                .map(|icon| format!("{}/{}@2x.png", ICON_URL_BASE, icon))
                .unwrap_or_default(),
            wind_speed: self.wind.and_then(|w| w.speed).unwrap_or_default(),
            sunrise: sys.sunrise.unwrap_or_default(),
            sunset: sys.sunset.unwrap_or_default(),
            updated_at: now_ms,
        }
    }
}
