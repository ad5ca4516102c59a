//! Per-frame driver: samples the analyser, reduces it to levels and hands them
//! to the active preset's renderer.

mod scheduler;

pub use scheduler::{FrameScheduler, FrameTick, IntervalScheduler, ManualScheduler};

use std::ops::ControlFlow;

use crate::{
    compute_levels, AnalyserAdapter, AudioLevels, CaptureSession, PlaybackController,
    RenderConfig, ResizeCoordinator, Viewport,
};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    Paused,
    /// No capture in progress.
    Idle,
    NoPreset,
}

/// Everything a per-frame hook may touch before the frame renders.
pub struct FrameContext<'a> {
    pub tick: FrameTick,
    /// Levels of the previous frame.
    pub levels: AudioLevels,
    pub session: &'a mut CaptureSession,
    pub controller: &'a mut PlaybackController,
    pub resize: &'a mut ResizeCoordinator,
}

#[derive(Debug)]
pub struct RenderLoop {
    adapter: AnalyserAdapter,
    resize: ResizeCoordinator,
    levels: AudioLevels,
    fallback_sample_rate: f32,
    sized_preset: Option<String>,
}

impl RenderLoop {
    pub fn new(config: &RenderConfig, fallback_sample_rate: f32) -> Self {
        Self {
            adapter: AnalyserAdapter::new(),
            resize: ResizeCoordinator::new(config.resize_quiet_period()),
            levels: AudioLevels::ZERO,
            fallback_sample_rate,
            sized_preset: None,
        }
    }

    /// Levels computed by the last rendered frame.
    pub fn levels(&self) -> AudioLevels {
        self.levels
    }

    pub fn resize_mut(&mut self) -> &mut ResizeCoordinator {
        &mut self.resize
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.resize.current()
    }

    /// Runs one frame.
    ///
    /// Timers and the session's ended signal are serviced first, then a
    /// settled viewport is delivered. The render step itself only runs while
    /// unpaused, capturing and with an active preset.
    pub fn tick(
        &mut self,
        tick: &FrameTick,
        session: &mut CaptureSession,
        controller: &mut PlaybackController,
    ) -> TickOutcome {
        controller.poll_cycle(tick.instant);
        session.poll_track_ended();
        if self.resize.on_frame(tick.instant).is_some() {
            self.sized_preset = None;
        }
        self.deliver_viewport(controller);

        if controller.is_paused() {
            return TickOutcome::Paused;
        }
        if !session.is_capturing() {
            self.levels = AudioLevels::ZERO;
            return TickOutcome::Idle;
        }
        if controller.active_preset().is_none() {
            return TickOutcome::NoPreset;
        }

        let sample_rate = session.sample_rate().unwrap_or(self.fallback_sample_rate);
        self.levels = compute_levels(self.adapter.frequency_data(session), sample_rate);

        match controller.active_parts_mut() {
            Some((renderer, params)) => {
                renderer.render(&self.levels, params, tick.timestamp);
                TickOutcome::Rendered
            }
            None => TickOutcome::NoPreset,
        }
    }

    /// Drives frames from `scheduler` until it runs dry or `hook` breaks.
    /// The hook runs before each frame. Returns the number of frames ticked.
    pub fn run<S, F>(
        &mut self,
        scheduler: &mut S,
        session: &mut CaptureSession,
        controller: &mut PlaybackController,
        mut hook: F,
    ) -> u64
    where
        S: FrameScheduler + ?Sized,
        F: FnMut(&mut FrameContext<'_>) -> ControlFlow<()>,
    {
        let mut frames = 0;
        while let Some(tick) = scheduler.next_frame() {
            let mut cx = FrameContext {
                tick,
                levels: self.levels,
                session: &mut *session,
                controller: &mut *controller,
                resize: &mut self.resize,
            };
            if hook(&mut cx).is_break() {
                break;
            }
            self.tick(&tick, session, controller);
            frames += 1;
        }
        tracing::debug!(frames, "render loop finished");
        frames
    }

    /// Hands the settled viewport to an active preset that has not seen it.
    fn deliver_viewport(&mut self, controller: &mut PlaybackController) {
        let Some(viewport) = self.resize.current() else {
            return;
        };
        let Some(id) = controller.active_preset_id() else {
            return;
        };
        if self.sized_preset.as_deref() == Some(id) {
            return;
        }
        let id = id.to_string();
        if let Some((renderer, _)) = controller.active_parts_mut() {
            renderer.resize(viewport);
            self.sized_preset = Some(id);
        }
    }
}
