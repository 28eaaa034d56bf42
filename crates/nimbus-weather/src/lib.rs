//! Weather data service for Nimbus.
//!
//! Provides the OpenWeatherMap client, SQLite-backed snapshot cache,
//! preference store, and the cache-first repository that ties them together.

pub mod cache;
pub mod client;
pub mod controller;
pub mod error;
pub mod prefs;
pub mod repository;
pub mod types;

pub use cache::WeatherStore;
pub use client::{CurrentConditions, WeatherClient};
pub use controller::{WeatherController, WeatherEffect, WeatherEvent, WeatherState};
pub use error::WeatherFetchError;
pub use prefs::Preferences;
pub use repository::WeatherRepository;
pub use types::{Units, WeatherSnapshot};
