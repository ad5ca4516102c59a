//! Keyboard actions of the live view.

use spectra_core::{CaptureSession, PlaybackController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ToggleFullscreen,
    TogglePause,
    NextPreset,
    PreviousPreset,
    RandomPreset,
    ToggleCycle,
    ToggleUi,
}

impl Action {
    /// Parses a key name as typed on the command line.
    pub fn from_key(key: &str) -> Option<Self> {
        let action = match key.trim_matches(['\r', '\n', '\t']).to_lowercase().as_str() {
            "f" => Self::ToggleFullscreen,
            " " | "space" => Self::TogglePause,
            "arrowright" | "right" | "n" => Self::NextPreset,
            "arrowleft" | "left" | "p" => Self::PreviousPreset,
            "r" => Self::RandomPreset,
            "c" => Self::ToggleCycle,
            "h" => Self::ToggleUi,
            _ => return None,
        };
        Some(action)
    }
}

/// App-level view flags plus the dispatch of actions onto the controller.
#[derive(Debug, Default)]
pub struct ActionDispatcher {
    fullscreen: bool,
    ui_hidden: bool,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// The status line is drawn unless hidden or fullscreen.
    pub fn shows_hud(&self) -> bool {
        !self.ui_hidden && !self.fullscreen
    }

    /// Applies `action` while a visualisation is on screen. Returns a short
    /// status line, or `None` when the action was ignored.
    pub fn dispatch(
        &mut self,
        action: Action,
        session: &CaptureSession,
        controller: &mut PlaybackController,
    ) -> Option<String> {
        if !session.is_capturing() || controller.active_preset().is_none() {
            tracing::debug!(?action, "ignoring action without an active visualisation");
            return None;
        }

        let status = match action {
            Action::ToggleFullscreen => {
                self.fullscreen = !self.fullscreen;
                format!("fullscreen {}", on_off(self.fullscreen))
            }
            Action::ToggleUi => {
                self.ui_hidden = !self.ui_hidden;
                format!("controls {}", if self.ui_hidden { "hidden" } else { "shown" })
            }
            Action::TogglePause => {
                controller.toggle_pause();
                let state = if controller.is_paused() { "paused" } else { "playing" };
                state.to_string()
            }
            Action::ToggleCycle => {
                controller.toggle_cycle();
                format!("auto-cycle {}", on_off(controller.cycle_enabled()))
            }
            Action::NextPreset | Action::PreviousPreset | Action::RandomPreset => {
                match action {
                    Action::NextPreset => controller.next_preset(),
                    Action::PreviousPreset => controller.previous_preset(),
                    _ => controller.random_preset(),
                }
                let name = controller.active_preset().map(|p| p.name()).unwrap_or("-");
                format!("preset: {name}")
            }
        };
        Some(status)
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use spectra_core::{
        AnalyserOptions, CaptureBackend, CaptureFailure, CaptureSource, FeedTrack, MediaStream,
        MediaTrack, MemoryStore, PlaybackConfig, SampleFeed, SoftwareAudioBackend,
    };

    use super::*;
    use crate::renderers::{catalog, Surface};

    struct FeedCapture;

    impl CaptureBackend for FeedCapture {
        fn supports(&self, _source: CaptureSource) -> bool {
            true
        }

        fn request_stream(&mut self, _source: CaptureSource) -> Result<MediaStream, CaptureFailure> {
            let track: Box<dyn MediaTrack> =
                Box::new(FeedTrack::audio("feed", SampleFeed::new(2048, 44_100)));
            Ok(MediaStream::new(vec![track]))
        }
    }

    fn live_view() -> (CaptureSession, PlaybackController) {
        let session = CaptureSession::new(
            Box::new(FeedCapture),
            Box::new(SoftwareAudioBackend::default()),
            AnalyserOptions::default(),
        );
        let mut controller =
            PlaybackController::new(Box::new(MemoryStore::new()), &PlaybackConfig::default());
        for preset in catalog(&Surface::default()) {
            controller.register(preset);
        }
        controller.ensure_active();
        (session, controller)
    }

    #[test]
    fn actions_need_a_running_visualisation() {
        let (mut session, mut controller) = live_view();
        let mut dispatcher = ActionDispatcher::new();
        assert_eq!(
            dispatcher.dispatch(Action::NextPreset, &session, &mut controller),
            None
        );
        assert_eq!(controller.active_preset_id(), Some("equalizer-2d"));

        session.start(CaptureSource::Microphone).unwrap();
        let status = dispatcher.dispatch(Action::NextPreset, &session, &mut controller);
        assert_eq!(status.as_deref(), Some("preset: Audio Sphere"));
        dispatcher.dispatch(Action::ToggleFullscreen, &session, &mut controller);
        dispatcher.dispatch(Action::TogglePause, &session, &mut controller);
        assert!(dispatcher.is_fullscreen());
        assert!(!dispatcher.shows_hud());
        assert!(controller.is_paused());

        dispatcher.dispatch(Action::ToggleFullscreen, &session, &mut controller);
        assert!(dispatcher.shows_hud());
        dispatcher.dispatch(Action::ToggleUi, &session, &mut controller);
        assert!(!dispatcher.shows_hud());
    }

    #[test]
    fn parses_key_names() {
        assert_eq!(Action::from_key("ArrowRight"), Some(Action::NextPreset));
        assert_eq!(Action::from_key(" "), Some(Action::TogglePause));
        assert_eq!(Action::from_key("space"), Some(Action::TogglePause));
        assert_eq!(Action::from_key("h"), Some(Action::ToggleUi));
        assert_eq!(Action::from_key("x"), None);
    }
}
