use std::collections::{BTreeMap, BTreeSet};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{KeyValueStore, PresetParams};

pub const DEFAULT_CYCLE_INTERVAL_MS: u64 = 10_000;

/// Selection and preference state owned by the playback controller.
///
/// Everything but `is_paused` is persisted as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackState {
    pub active_preset_id: Option<String>,
    pub params_by_id: BTreeMap<String, PresetParams>,
    pub favorites: BTreeSet<String>,
    pub cycle_enabled: bool,
    #[serde(rename = "cycleInterval")]
    pub cycle_interval_ms: u64,
    #[serde(skip)]
    pub is_paused: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::with_cycle_interval(DEFAULT_CYCLE_INTERVAL_MS)
    }
}

/// Decodes one persisted field, treating `null` like an absent key.
fn field<T: DeserializeOwned>(fields: &Map<String, Value>, name: &str) -> Option<T> {
    let value = fields.get(name).filter(|value| !value.is_null())?;
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(%err, field = name, "ignoring malformed playback field");
            None
        }
    }
}

impl PlaybackState {
    pub fn with_cycle_interval(cycle_interval_ms: u64) -> Self {
        Self {
            active_preset_id: None,
            params_by_id: BTreeMap::new(),
            favorites: BTreeSet::new(),
            cycle_enabled: false,
            cycle_interval_ms: cycle_interval_ms.max(1),
            is_paused: false,
        }
    }

    /// Parses a persisted document. Each field falls back to its default on
    /// its own when absent, `null` or malformed, and a non-positive interval
    /// becomes `default_interval_ms`. Only a non-object document is an error.
    pub fn from_json(document: &str, default_interval_ms: u64) -> serde_json::Result<Self> {
        let fields: Map<String, Value> = serde_json::from_str(document)?;
        let mut state = Self::with_cycle_interval(default_interval_ms);

        state.active_preset_id = field(&fields, "activePresetId");
        if let Some(params) = field::<Map<String, Value>>(&fields, "paramsById") {
            state.params_by_id = params
                .into_iter()
                .filter_map(|(id, value)| match PresetParams::deserialize(&value) {
                    Ok(params) => Some((id, params)),
                    Err(err) => {
                        tracing::warn!(%err, id = %id, "dropping malformed preset params");
                        None
                    }
                })
                .collect();
        }
        if let Some(favorites) = field(&fields, "favorites") {
            state.favorites = favorites;
        }
        if let Some(enabled) = field(&fields, "cycleEnabled") {
            state.cycle_enabled = enabled;
        }
        if let Some(ms) = field::<f64>(&fields, "cycleInterval")
            .filter(|ms| ms.is_finite() && *ms >= 1.0)
        {
            state.cycle_interval_ms = ms.round() as u64;
        }
        Ok(state)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Loads the state stored under `key`. Missing, unreadable and corrupt
    /// entries all yield defaults; failures are logged, never returned.
    pub fn restore(store: &dyn KeyValueStore, key: &str, default_interval_ms: u64) -> Self {
        let document = match store.get(key) {
            Ok(Some(document)) => document,
            Ok(None) => return Self::with_cycle_interval(default_interval_ms),
            Err(err) => {
                tracing::error!(%err, key, "failed to load playback state");
                return Self::with_cycle_interval(default_interval_ms);
            }
        };

        match Self::from_json(&document, default_interval_ms) {
            Ok(state) => state,
            Err(err) => {
                tracing::error!(%err, key, "discarding corrupt playback state");
                Self::with_cycle_interval(default_interval_ms)
            }
        }
    }

    /// Writes the state under `key`, logging and swallowing failures.
    pub fn persist(&self, store: &mut dyn KeyValueStore, key: &str) {
        let document = match self.to_json() {
            Ok(document) => document,
            Err(err) => {
                tracing::error!(%err, "failed to serialize playback state");
                return;
            }
        };
        if let Err(err) = store.set(key, &document) {
            tracing::error!(%err, key, "failed to save playback state");
        }
    }
}
