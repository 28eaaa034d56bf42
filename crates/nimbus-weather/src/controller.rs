//! Event-driven weather controller.
//!
//! Consumers send [`WeatherEvent`]s in, observe the folded [`WeatherState`]
//! through a watch channel, and drain one-shot [`WeatherEffect`]s from a
//! queue. State always reflects the latest fetch; effects fire once each.

use std::sync::Arc;

use nimbus_core::FetchState;
use tokio::sync::{mpsc, watch};

use crate::prefs::Preferences;
use crate::repository::WeatherRepository;
use crate::types::WeatherSnapshot;

/// Snapshot of the controller's view state.
#[derive(Debug, Clone, Default)]
pub struct WeatherState {
    pub city: String,
    pub loading: bool,
    pub snapshot: Option<WeatherSnapshot>,
    pub error: Option<String>,
}

/// Inputs the controller reacts to.
#[derive(Debug)]
pub enum WeatherEvent {
    /// Fetch weather for a city.
    Load { city: String, force_refresh: bool },
    /// Switch to a new city, persist it as the default, and fetch.
    UpdateCity(String),
    /// Re-fetch the current city, bypassing the cache freshness check.
    Refresh,
}

/// One-shot side effects for the consumer.
#[derive(Debug, PartialEq)]
pub enum WeatherEffect {
    ShowError(String),
}

pub struct WeatherController {
    events: mpsc::Sender<WeatherEvent>,
    state: watch::Receiver<WeatherState>,
    effects: mpsc::Receiver<WeatherEffect>,
}

impl WeatherController {
    /// Start the controller loop. The default city is loaded immediately.
    pub fn spawn(repository: WeatherRepository, prefs: Arc<Preferences>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (effect_tx, effect_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(WeatherState {
            city: prefs.default_city(),
            ..WeatherState::default()
        });

        tokio::spawn(run_loop(repository, prefs, event_rx, state_tx, effect_tx));

        Self {
            events: event_tx,
            state: state_rx,
            effects: effect_rx,
        }
    }

    pub async fn send(&self, event: WeatherEvent) {
        let _ = self.events.send(event).await;
    }

    pub fn state(&self) -> watch::Receiver<WeatherState> {
        self.state.clone()
    }

    pub async fn next_effect(&mut self) -> Option<WeatherEffect> {
        self.effects.recv().await
    }
}

async fn run_loop(
    repository: WeatherRepository,
    prefs: Arc<Preferences>,
    mut events: mpsc::Receiver<WeatherEvent>,
    state: watch::Sender<WeatherState>,
    effects: mpsc::Sender<WeatherEffect>,
) {
    let startup_city = state.borrow().city.clone();
    load(&repository, &prefs, &state, &effects, &startup_city, false).await;

    while let Some(event) = events.recv().await {
        match event {
            WeatherEvent::Load {
                city,
                force_refresh,
            } => {
                state.send_modify(|s| s.city = city.clone());
                load(&repository, &prefs, &state, &effects, &city, force_refresh).await;
            }
            WeatherEvent::UpdateCity(city) => {
                state.send_modify(|s| s.city = city.clone());
                if let Err(e) = prefs.set_default_city(&city) {
                    tracing::warn!("Failed to persist default city: {}", e);
                }
                load(&repository, &prefs, &state, &effects, &city, true).await;
            }
            WeatherEvent::Refresh => {
                let city = state.borrow().city.clone();
                load(&repository, &prefs, &state, &effects, &city, true).await;
            }
        }
    }
}

async fn load(
    repository: &WeatherRepository,
    prefs: &Preferences,
    state: &watch::Sender<WeatherState>,
    effects: &mpsc::Sender<WeatherEffect>,
    city: &str,
    force_refresh: bool,
) {
    let mut rx = repository.fetch_by_city(city, force_refresh);
    while let Some(fetch) = rx.recv().await {
        match fetch {
            FetchState::Loading => {
                state.send_modify(|s| {
                    s.loading = true;
                    s.error = None;
                });
            }
            FetchState::Success(snapshot) => {
                if let Err(e) = prefs.set_last_updated(snapshot.updated_at) {
                    tracing::warn!("Failed to record update time: {}", e);
                }
                state.send_modify(|s| {
                    s.loading = false;
                    s.snapshot = Some(snapshot);
                    s.error = None;
                });
            }
            FetchState::Error(message) => {
                state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(message.clone());
                });
                let _ = effects.send(WeatherEffect::ShowError(message)).await;
            }
        }
    }
}
