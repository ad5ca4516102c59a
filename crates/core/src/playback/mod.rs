//! Active-preset selection, favorites, auto-cycle and pause.

mod state;

pub use state::{PlaybackState, DEFAULT_CYCLE_INTERVAL_MS};

use std::{
    fmt,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    KeyValueStore, PlaybackConfig, PresetParams, PresetRegistry, Renderer, Result, SpectraError,
    VisualPreset,
};

/// Change notification sent to subscribers after each mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    PresetRegistered(String),
    ActivePresetChanged(Option<String>),
    ParamsUpdated(String),
    FavoriteToggled { id: String, favorite: bool },
    CycleChanged { enabled: bool, interval_ms: u64 },
    PauseChanged(bool),
}

/// Advances the playlist every interval while auto-cycle is on. The first
/// poll after enabling anchors the interval.
#[derive(Debug, Default)]
struct CycleTimer {
    anchor: Option<Instant>,
}

impl CycleTimer {
    fn reset(&mut self) {
        self.anchor = None;
    }

    fn fire(&mut self, now: Instant, interval: Duration) -> bool {
        match self.anchor {
            None => {
                self.anchor = Some(now);
                false
            }
            Some(anchor) if now.saturating_duration_since(anchor) >= interval => {
                self.anchor = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

/// Owns the preset registry and [`PlaybackState`], and is the only place
/// either is mutated. Every mutation is persisted synchronously and then
/// announced to subscribers.
pub struct PlaybackController {
    registry: PresetRegistry,
    state: PlaybackState,
    store: Box<dyn KeyValueStore>,
    storage_key: String,
    default_interval_ms: u64,
    cycle: CycleTimer,
    rng: fastrand::Rng,
    subscribers: Vec<Sender<PlaybackEvent>>,
}

impl PlaybackController {
    /// Restores persisted state from `store`, falling back to defaults.
    pub fn new(store: Box<dyn KeyValueStore>, config: &PlaybackConfig) -> Self {
        let state =
            PlaybackState::restore(store.as_ref(), &config.storage_key, config.default_cycle_interval_ms);
        Self {
            registry: PresetRegistry::new(),
            state,
            store,
            storage_key: config.storage_key.clone(),
            default_interval_ms: config.default_cycle_interval_ms,
            cycle: CycleTimer::default(),
            rng: fastrand::Rng::new(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn registry(&self) -> &PresetRegistry {
        &self.registry
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn active_preset_id(&self) -> Option<&str> {
        self.state.active_preset_id.as_deref()
    }

    /// The active preset, provided it is registered.
    pub fn active_preset(&self) -> Option<&VisualPreset> {
        self.active_preset_id().and_then(|id| self.registry.get(id))
    }

    /// Stored parameters of the active preset, else its defaults, else empty.
    pub fn active_params(&self) -> PresetParams {
        let Some(id) = self.active_preset_id() else {
            return PresetParams::new();
        };
        self.state
            .params_by_id
            .get(id)
            .or_else(|| self.registry.get(id).map(VisualPreset::defaults))
            .cloned()
            .unwrap_or_default()
    }

    pub fn params(&self, id: &str) -> Option<&PresetParams> {
        self.state.params_by_id.get(id)
    }

    /// Renderer of the active preset together with the parameters to draw it
    /// with.
    pub fn active_parts_mut(&mut self) -> Option<(&mut dyn Renderer, &PresetParams)> {
        let id = self.state.active_preset_id.as_deref()?;
        let (renderer, defaults) = self.registry.get_mut(id)?.parts_mut();
        let params = self.state.params_by_id.get(id).unwrap_or(defaults);
        Some((renderer, params))
    }

    pub fn favorites(&self) -> impl Iterator<Item = &str> {
        self.state.favorites.iter().map(String::as_str)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.state.favorites.contains(id)
    }

    /// Favorite presets in registry order.
    pub fn favorite_presets(&self) -> impl Iterator<Item = &VisualPreset> {
        self.registry
            .iter()
            .filter(|preset| self.state.favorites.contains(preset.id()))
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused
    }

    pub fn cycle_enabled(&self) -> bool {
        self.state.cycle_enabled
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.state.cycle_interval_ms)
    }

    /// Returns a channel that receives every subsequent change.
    pub fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Appends a preset unless its id is taken. Restored overrides for the
    /// id are kept; otherwise its defaults seed the stored parameters.
    pub fn register(&mut self, preset: VisualPreset) -> bool {
        let id = preset.id().to_string();
        let defaults = preset.defaults().clone();
        if !self.registry.register(preset) {
            return false;
        }
        self.state.params_by_id.entry(id.clone()).or_insert(defaults);
        self.commit(PlaybackEvent::PresetRegistered(id));
        true
    }

    /// Activates `id`, seeding its parameters if none are stored. Unknown
    /// ids are rejected and leave the state untouched.
    pub fn set_active_preset(&mut self, id: &str) -> Result<()> {
        let preset = self
            .registry
            .get(id)
            .ok_or_else(|| SpectraError::UnknownPreset(id.to_string()))?;
        let defaults = preset.defaults().clone();
        self.state
            .params_by_id
            .entry(id.to_string())
            .or_insert(defaults);

        if self.state.active_preset_id.as_deref() != Some(id) {
            tracing::info!(preset = id, "active preset changed");
        }
        self.state.active_preset_id = Some(id.to_string());
        self.commit(PlaybackEvent::ActivePresetChanged(Some(id.to_string())));
        Ok(())
    }

    /// Makes sure a registered preset is active: a missing or stale id is
    /// replaced by the first registered preset.
    pub fn ensure_active(&mut self) {
        if self.active_preset().is_some() {
            return;
        }
        let stale = self.state.active_preset_id.take();
        if let Some(stale) = &stale {
            tracing::warn!(preset = %stale, "restored preset is not registered");
        }
        match self.registry.first().map(|preset| preset.id().to_string()) {
            Some(first) => self.activate_index_of(&first),
            None if stale.is_some() => self.commit(PlaybackEvent::ActivePresetChanged(None)),
            None => {}
        }
    }

    pub fn next_preset(&mut self) {
        let len = self.registry.len();
        if len == 0 {
            return;
        }
        let next = match self.current_index() {
            Some(index) => (index + 1) % len,
            None => 0,
        };
        self.activate_index(next);
    }

    pub fn previous_preset(&mut self) {
        let len = self.registry.len();
        if len == 0 {
            return;
        }
        let previous = match self.current_index() {
            Some(0) | None => len - 1,
            Some(index) => index - 1,
        };
        self.activate_index(previous);
    }

    /// Activates a preset chosen uniformly among all registered ones.
    pub fn random_preset(&mut self) {
        let len = self.registry.len();
        if len == 0 {
            return;
        }
        let index = self.rng.usize(..len);
        self.activate_index(index);
    }

    /// Merges `params` into the stored parameters of `id`, creating the
    /// entry if needed.
    pub fn update_params(&mut self, id: &str, params: PresetParams) {
        self.state
            .params_by_id
            .entry(id.to_string())
            .or_default()
            .extend(params);
        self.commit(PlaybackEvent::ParamsUpdated(id.to_string()));
    }

    /// Flips membership of `id` in the favorites. Returns the new membership.
    pub fn toggle_favorite(&mut self, id: &str) -> bool {
        let favorite = if self.state.favorites.remove(id) {
            false
        } else {
            self.state.favorites.insert(id.to_string());
            true
        };
        self.commit(PlaybackEvent::FavoriteToggled {
            id: id.to_string(),
            favorite,
        });
        favorite
    }

    pub fn toggle_cycle(&mut self) {
        self.state.cycle_enabled = !self.state.cycle_enabled;
        self.cycle.reset();
        self.commit(self.cycle_event());
    }

    pub fn set_cycle_interval(&mut self, interval_ms: u64) -> Result<()> {
        if interval_ms == 0 {
            return Err(SpectraError::InvalidInput(
                "cycle interval must be positive",
            ));
        }
        self.state.cycle_interval_ms = interval_ms;
        self.cycle.reset();
        self.commit(self.cycle_event());
        Ok(())
    }

    /// Pausing only gates the render loop; navigation keeps working.
    pub fn toggle_pause(&mut self) {
        self.state.is_paused = !self.state.is_paused;
        self.commit(PlaybackEvent::PauseChanged(self.state.is_paused));
    }

    /// Drives the auto-cycle timer. Advances to the next preset when the
    /// interval has elapsed and returns whether it did.
    pub fn poll_cycle(&mut self, now: Instant) -> bool {
        if !self.state.cycle_enabled {
            self.cycle.reset();
            return false;
        }
        if !self.cycle.fire(now, self.cycle_interval()) {
            return false;
        }
        tracing::debug!("auto-cycle advancing");
        self.next_preset();
        true
    }

    fn current_index(&self) -> Option<usize> {
        self.active_preset_id()
            .and_then(|id| self.registry.position(id))
    }

    fn activate_index(&mut self, index: usize) {
        if let Some(id) = self.registry.by_index(index).map(|preset| preset.id().to_string()) {
            self.activate_index_of(&id);
        }
    }

    fn activate_index_of(&mut self, id: &str) {
        if let Err(err) = self.set_active_preset(id) {
            tracing::warn!(%err, "cannot activate preset");
        }
    }

    fn cycle_event(&self) -> PlaybackEvent {
        PlaybackEvent::CycleChanged {
            enabled: self.state.cycle_enabled,
            interval_ms: self.state.cycle_interval_ms,
        }
    }

    fn commit(&mut self, event: PlaybackEvent) {
        self.state.persist(self.store.as_mut(), &self.storage_key);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("presets", &self.registry.len())
            .field("state", &self.state)
            .field("storage_key", &self.storage_key)
            .field("default_interval_ms", &self.default_interval_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::preset::testing::preset;
    use crate::MemoryStore;

    /// Store whose contents stay observable after it is boxed.
    #[derive(Clone, Default)]
    struct SharedStore(std::rc::Rc<std::cell::RefCell<MemoryStore>>);

    impl KeyValueStore for SharedStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.borrow().get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<()> {
            self.0.borrow_mut().set(key, value)
        }
    }

    fn controller_with(store: SharedStore, ids: &[&str]) -> PlaybackController {
        let mut controller = PlaybackController::new(Box::new(store), &PlaybackConfig::default())
            .with_rng(fastrand::Rng::with_seed(7));
        for id in ids {
            controller.register(preset(id));
        }
        controller
    }

    fn controller(ids: &[&str]) -> PlaybackController {
        controller_with(SharedStore::default(), ids)
    }

    #[test]
    fn registering_twice_changes_nothing() {
        let mut controller = controller(&[]);
        assert!(controller.register(preset("wave").with_default("speed", 1)));
        controller.update_params("wave", PresetParams::from([("speed".into(), json!(4))]));

        assert!(!controller.register(preset("wave").with_default("speed", 9)));
        assert_eq!(controller.registry().len(), 1);
        assert_eq!(controller.params("wave").unwrap()["speed"], json!(4));
    }

    #[test]
    fn next_and_previous_wrap_and_invert() {
        let mut controller = controller(&["a", "b", "c"]);
        controller.set_active_preset("a").unwrap();

        controller.previous_preset();
        assert_eq!(controller.active_preset_id(), Some("c"));
        controller.next_preset();
        assert_eq!(controller.active_preset_id(), Some("a"));

        for start in ["a", "b", "c"] {
            controller.set_active_preset(start).unwrap();
            controller.next_preset();
            controller.previous_preset();
            assert_eq!(controller.active_preset_id(), Some(start));
            for _ in 0..controller.registry().len() {
                controller.next_preset();
            }
            assert_eq!(controller.active_preset_id(), Some(start));
        }
    }

    #[test]
    fn navigation_without_selection_starts_at_the_ends() {
        let mut controller = controller(&["a", "b", "c"]);
        controller.next_preset();
        assert_eq!(controller.active_preset_id(), Some("a"));

        let mut controller = controller_with(SharedStore::default(), &["a", "b", "c"]);
        controller.previous_preset();
        assert_eq!(controller.active_preset_id(), Some("c"));

        let mut empty = controller_with(SharedStore::default(), &[]);
        empty.next_preset();
        empty.previous_preset();
        empty.random_preset();
        assert_eq!(empty.active_preset_id(), None);
    }

    #[test]
    fn random_selection_is_roughly_uniform() {
        let ids = ["a", "b", "c", "d"];
        let mut controller = controller(&ids);
        let mut counts: HashMap<String, usize> = HashMap::new();
        let trials = 4_000;
        for _ in 0..trials {
            controller.random_preset();
            let id = controller.active_preset_id().unwrap().to_string();
            assert!(controller.registry().contains(&id));
            *counts.entry(id).or_default() += 1;
        }
        for id in ids {
            let share = counts[id] as f64 / trials as f64;
            assert!((share - 0.25).abs() < 0.05, "{id} picked {share}");
        }
    }

    #[test]
    fn activation_seeds_without_overwriting() {
        let mut controller = controller(&[]);
        controller.register(preset("wave").with_default("speed", 1).with_default("hue", 0.5));
        controller.update_params("wave", PresetParams::from([("speed".into(), json!(3))]));
        controller.set_active_preset("wave").unwrap();

        let params = controller.active_params();
        assert_eq!(params["speed"], json!(3));
        assert_eq!(params["hue"], json!(0.5));
        assert!(controller.set_active_preset("missing").is_err());
        assert_eq!(controller.active_preset_id(), Some("wave"));
    }

    #[test]
    fn favorites_toggle_and_follow_registry_order() {
        let mut controller = controller(&["a", "b", "c"]);
        assert!(controller.toggle_favorite("c"));
        assert!(controller.toggle_favorite("a"));
        assert!(!controller.toggle_favorite("c"));
        assert!(controller.toggle_favorite("b"));

        let favorites: Vec<_> = controller.favorite_presets().map(VisualPreset::id).collect();
        assert_eq!(favorites, ["a", "b"]);
        assert!(controller.is_favorite("a"));
        assert!(!controller.is_favorite("c"));
    }

    #[test]
    fn pause_does_not_block_navigation() {
        let mut controller = controller(&["a", "b"]);
        controller.set_active_preset("a").unwrap();
        controller.toggle_pause();
        assert!(controller.is_paused());
        controller.next_preset();
        assert_eq!(controller.active_preset_id(), Some("b"));
        controller.toggle_pause();
        assert!(!controller.is_paused());
    }

    #[test]
    fn auto_cycle_advances_each_interval() {
        let mut controller = controller(&["a", "b", "c"]);
        controller.set_active_preset("a").unwrap();
        controller.set_cycle_interval(1_000).unwrap();
        let start = Instant::now();

        assert!(!controller.poll_cycle(start));
        controller.toggle_cycle();
        assert!(!controller.poll_cycle(start));
        assert!(!controller.poll_cycle(start + Duration::from_millis(999)));
        assert!(controller.poll_cycle(start + Duration::from_millis(1_000)));
        assert_eq!(controller.active_preset_id(), Some("b"));

        // Pause does not stop the playlist.
        controller.toggle_pause();
        assert!(controller.poll_cycle(start + Duration::from_millis(2_000)));
        assert_eq!(controller.active_preset_id(), Some("c"));

        controller.toggle_cycle();
        assert!(!controller.poll_cycle(start + Duration::from_millis(9_000)));
        assert!(controller.set_cycle_interval(0).is_err());
    }

    #[test]
    fn state_survives_a_restart() {
        let store = SharedStore::default();
        let mut controller = controller_with(store.clone(), &["a", "b"]);
        controller.set_active_preset("b").unwrap();
        controller.update_params("b", PresetParams::from([("gain".into(), json!(2.5))]));
        controller.toggle_favorite("a");
        controller.toggle_cycle();
        controller.set_cycle_interval(4_000).unwrap();
        controller.toggle_pause();
        let before = controller.state().clone();
        drop(controller);

        let restored = controller_with(store, &["a", "b"]);
        let after = restored.state();
        assert_eq!(after.active_preset_id, before.active_preset_id);
        assert_eq!(after.params_by_id, before.params_by_id);
        assert_eq!(after.favorites, before.favorites);
        assert!(after.cycle_enabled);
        assert_eq!(after.cycle_interval_ms, 4_000);
        assert!(!after.is_paused);
    }

    #[test]
    fn stale_restored_selection_is_replaced() {
        let store = SharedStore::default();
        store
            .0
            .borrow_mut()
            .set("spectra-preset", r#"{"activePresetId":"gone"}"#)
            .unwrap();
        let mut controller = controller_with(store, &["a", "b"]);
        assert!(controller.active_preset().is_none());

        controller.ensure_active();
        assert_eq!(controller.active_preset_id(), Some("a"));
    }

    #[test]
    fn subscribers_hear_every_mutation() {
        let mut controller = controller(&["a", "b"]);
        let events = controller.subscribe();
        controller.set_active_preset("b").unwrap();
        controller.toggle_pause();
        controller.toggle_cycle();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            [
                PlaybackEvent::ActivePresetChanged(Some("b".into())),
                PlaybackEvent::PauseChanged(true),
                PlaybackEvent::CycleChanged {
                    enabled: true,
                    interval_ms: DEFAULT_CYCLE_INTERVAL_MS
                },
            ]
        );

        drop(events);
        controller.toggle_pause();
        assert!(controller.subscribers.is_empty());
    }

    #[test]
    fn active_parts_expose_renderer_and_params() {
        let mut controller = controller(&[]);
        controller.register(preset("wave").with_default("speed", 2));
        assert!(controller.active_parts_mut().is_none());

        controller.ensure_active();
        let (_, params) = controller.active_parts_mut().unwrap();
        assert_eq!(params["speed"], json!(2));
    }
}
