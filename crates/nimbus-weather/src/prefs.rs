//! User preferences persisted as TOML under the config directory.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use crate::types::Units;

const PREFS_FILE: &str = "preferences.toml";

fn default_city() -> String {
    "London".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PrefData {
    #[serde(default = "default_city")]
    default_city: String,

    #[serde(default)]
    units: Units,

    #[serde(default = "default_true")]
    notifications_enabled: bool,

    /// Epoch millis of the last successful weather update, if any.
    #[serde(default)]
    last_updated: Option<i64>,
}

impl Default for PrefData {
    fn default() -> Self {
        Self {
            default_city: default_city(),
            units: Units::default(),
            notifications_enabled: true,
            last_updated: None,
        }
    }
}

/// Key-value preference store. Setters persist immediately.
pub struct Preferences {
    path: PathBuf,
    data: RwLock<PrefData>,
    default_city_tx: watch::Sender<String>,
}

impl Preferences {
    /// Load preferences from `dir/preferences.toml`, creating defaults on
    /// first run.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(PREFS_FILE);

        let data = if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read preferences file")?;
            toml::from_str(&contents).context("Failed to parse preferences file")?
        } else {
            let data = PrefData::default();
            Self::persist(&path, &data)?;
            data
        };

        let (default_city_tx, _) = watch::channel(data.default_city.clone());

        Ok(Self {
            path,
            data: RwLock::new(data),
            default_city_tx,
        })
    }

    /// The city loaded on startup when none is specified.
    pub fn default_city(&self) -> String {
        self.data.read().default_city.clone()
    }

    /// Set and persist the default city.
    pub fn set_default_city(&self, city: &str) -> Result<()> {
        {
            let mut data = self.data.write();
            data.default_city = city.to_string();
            Self::persist(&self.path, &data)?;
        }
        self.default_city_tx.send_replace(city.to_string());
        Ok(())
    }

    /// Live view of the default city.
    pub fn watch_default_city(&self) -> watch::Receiver<String> {
        self.default_city_tx.subscribe()
    }

    /// Measurement units for API requests and display.
    pub fn units(&self) -> Units {
        self.data.read().units
    }

    /// Set and persist the measurement units.
    pub fn set_units(&self, units: Units) -> Result<()> {
        let mut data = self.data.write();
        data.units = units;
        Self::persist(&self.path, &data)
    }

    pub fn notifications_enabled(&self) -> bool {
        self.data.read().notifications_enabled
    }

    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        let mut data = self.data.write();
        data.notifications_enabled = enabled;
        Self::persist(&self.path, &data)
    }

    /// Epoch millis of the last successful weather update, if any.
    pub fn last_updated(&self) -> Option<i64> {
        self.data.read().last_updated
    }

    pub fn set_last_updated(&self, timestamp_ms: i64) -> Result<()> {
        let mut data = self.data.write();
        data.last_updated = Some(timestamp_ms);
        Self::persist(&self.path, &data)
    }

    /// Reset every preference to its default and persist.
    pub fn reset(&self) -> Result<()> {
        let defaults = PrefData::default();
        {
            let mut data = self.data.write();
            *data = defaults.clone();
            Self::persist(&self.path, &data)?;
        }
        self.default_city_tx.send_replace(defaults.default_city);
        Ok(())
    }

    fn persist(path: &Path, data: &PrefData) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create preferences directory")?;
        }
        let contents = toml::to_string_pretty(data).context("Failed to serialize preferences")?;
        std::fs::write(path, contents).context("Failed to write preferences file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_defaults_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();

        assert_eq!(prefs.default_city(), "London");
        assert_eq!(prefs.units(), Units::Metric);
        assert!(prefs.notifications_enabled());
        assert!(prefs.last_updated().is_none());
        // First run writes the defaults to disk
        assert!(dir.path().join(PREFS_FILE).exists());
    }

    #[test]
    fn test_set_default_city_persists() {
        let dir = tempfile::tempdir().unwrap();

        {
            let prefs = Preferences::load(dir.path()).unwrap();
            prefs.set_default_city("Paris").unwrap();
        }

        let prefs = Preferences::load(dir.path()).unwrap();
        assert_eq!(prefs.default_city(), "Paris");
    }

    #[test]
    fn test_set_units_persists() {
        let dir = tempfile::tempdir().unwrap();

        {
            let prefs = Preferences::load(dir.path()).unwrap();
            prefs.set_units(Units::Imperial).unwrap();
        }

        let prefs = Preferences::load(dir.path()).unwrap();
        assert_eq!(prefs.units(), Units::Imperial);
    }

    #[test]
    fn test_watch_default_city() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();

        let rx = prefs.watch_default_city();
        assert_eq!(*rx.borrow(), "London");

        prefs.set_default_city("Oslo").unwrap();
        assert_eq!(*rx.borrow(), "Oslo");
    }

    #[test]
    fn test_last_updated_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();

        prefs.set_last_updated(1_705_050_000_000).unwrap();
        assert_eq!(prefs.last_updated(), Some(1_705_050_000_000));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();

        prefs.set_default_city("Tokyo").unwrap();
        prefs.set_units(Units::Standard).unwrap();
        prefs.set_notifications_enabled(false).unwrap();

        prefs.reset().unwrap();
        assert_eq!(prefs.default_city(), "London");
        assert_eq!(prefs.units(), Units::Metric);
        assert!(prefs.notifications_enabled());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PREFS_FILE), "not [valid toml").unwrap();

        assert!(Preferences::load(dir.path()).is_err());
    }
}
