use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nimbus_core::Config;
use nimbus_weather::{
    Preferences, WeatherClient, WeatherController, WeatherEvent, WeatherRepository, WeatherStore,
};

/// Usage: nimbus [CITY] [--refresh]
#[tokio::main]
async fn main() -> Result<()> {
    nimbus_core::init()?;

    let mut city_arg: Option<String> = None;
    let mut force_refresh = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--refresh" | "-r" => force_refresh = true,
            other => city_arg = Some(other.to_string()),
        }
    }

    let (config, _validation) = Config::load_validated()?;
    if !config.weather.has_api_key() {
        anyhow::bail!(
            "No weather API key configured. Set OPENWEATHER_API_KEY or weather.api_key in config.toml"
        );
    }
    let api_key = config
        .weather
        .api_key
        .clone()
        .context("Weather API key missing")?;

    std::fs::create_dir_all(&config.config_dir).context("Failed to create config directory")?;

    let store = WeatherStore::open(config.config_dir.join("weather_cache.db"))?;
    if config.cache.purge_after_hours > 0 {
        let cutoff = chrono::Utc::now().timestamp_millis()
            - i64::from(config.cache.purge_after_hours) * 3_600_000;
        let removed = store.delete_older_than(cutoff)?;
        if removed > 0 {
            tracing::info!("Purged {} stale cache entries", removed);
        }
    }

    let prefs = Arc::new(Preferences::load(&config.config_dir)?);
    if let Some(city) = city_arg {
        if city != prefs.default_city() {
            prefs.set_default_city(&city)?;
        }
    }

    let client = WeatherClient::new(
        &api_key,
        prefs.units(),
        Duration::from_secs(config.weather.request_timeout_secs),
    )?
    .with_base_url(config.weather.api_base_url.clone());

    let repository = WeatherRepository::new(client, store);
    let controller = WeatherController::spawn(repository, Arc::clone(&prefs));

    let mut state = controller.state();
    state
        .wait_for(|s| !s.loading && (s.snapshot.is_some() || s.error.is_some()))
        .await?;

    if force_refresh {
        controller.send(WeatherEvent::Refresh).await;
        state.changed().await?;
        state.wait_for(|s| !s.loading).await?;
    }

    let current = state.borrow().clone();
    match (current.snapshot, current.error) {
        (Some(snapshot), _) => {
            println!("{}, {}", snapshot.city_name, snapshot.country);
            println!("  {}", snapshot.description);
            println!(
                "  {} (feels like {})",
                snapshot.formatted_temperature(),
                snapshot.formatted_feels_like()
            );
            println!("  {}", snapshot.formatted_temp_range());
            println!(
                "  Humidity {}  Wind {}",
                snapshot.formatted_humidity(),
                snapshot.formatted_wind_speed()
            );
            Ok(())
        }
        (None, Some(message)) => anyhow::bail!("{}", message),
        (None, None) => anyhow::bail!("No weather data available"),
    }
}
