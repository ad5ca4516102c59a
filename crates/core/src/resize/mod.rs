//! Debounced viewport resizes aligned to render frames.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Drawable area in pixels (or cells for terminal renderers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Collapses bursts of raw resize signals into one re-layout.
///
/// Every [`signal`](Self::signal) restarts the quiet period. Once it expires
/// the latest viewport is armed, replacing anything armed earlier, and the
/// next [`on_frame`](Self::on_frame) hands it out exactly once.
#[derive(Debug, Clone)]
pub struct ResizeCoordinator {
    quiet_period: Duration,
    deadline: Option<Instant>,
    pending: Option<Viewport>,
    armed: Option<Viewport>,
    current: Option<Viewport>,
}

impl ResizeCoordinator {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            deadline: None,
            pending: None,
            armed: None,
            current: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Last viewport delivered to a frame.
    pub fn current(&self) -> Option<Viewport> {
        self.current
    }

    pub fn is_settling(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn signal(&mut self, now: Instant, viewport: Viewport) {
        self.pending = Some(viewport);
        self.deadline = Some(now + self.quiet_period);
    }

    /// Arms the pending viewport once the quiet period has elapsed. Returns
    /// whether it armed one.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.armed = self.pending.take();
                self.armed.is_some()
            }
            _ => false,
        }
    }

    /// Frame-aligned delivery: returns the armed viewport, if any.
    pub fn on_frame(&mut self, now: Instant) -> Option<Viewport> {
        self.poll(now);
        let viewport = self.armed.take()?;
        tracing::debug!(width = viewport.width, height = viewport.height, "viewport settled");
        self.current = Some(viewport);
        Some(viewport)
    }

    /// Drops any pending or armed resize.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending = None;
        self.armed = None;
    }
}

impl Default for ResizeCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_millis(150))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Runs frames every 16ms until `until`, collecting deliveries.
    fn frames(
        coordinator: &mut ResizeCoordinator,
        start: Instant,
        from: u64,
        until: u64,
    ) -> Vec<Viewport> {
        (from..until)
            .step_by(16)
            .filter_map(|t| coordinator.on_frame(start + ms(t)))
            .collect()
    }

    #[test]
    fn a_burst_yields_one_alignment() {
        let start = Instant::now();
        let mut coordinator = ResizeCoordinator::default();
        let mut delivered = Vec::new();

        for i in 0..10u32 {
            let t = u64::from(i) * 15;
            coordinator.signal(start + ms(t), Viewport::new(800 + i, 600));
            delivered.extend(coordinator.on_frame(start + ms(t)));
        }
        delivered.extend(frames(&mut coordinator, start, 136, 1_000));

        assert_eq!(delivered, [Viewport::new(809, 600)]);
        assert_eq!(coordinator.current(), Some(Viewport::new(809, 600)));
    }

    #[test]
    fn separate_bursts_align_separately() {
        let start = Instant::now();
        let mut coordinator = ResizeCoordinator::default();

        coordinator.signal(start, Viewport::new(100, 100));
        let first = frames(&mut coordinator, start, 0, 400);
        coordinator.signal(start + ms(400), Viewport::new(200, 100));
        let second = frames(&mut coordinator, start, 400, 800);

        assert_eq!(first, [Viewport::new(100, 100)]);
        assert_eq!(second, [Viewport::new(200, 100)]);
    }

    #[test]
    fn rearming_replaces_the_unfired_alignment() {
        let start = Instant::now();
        let mut coordinator = ResizeCoordinator::default();

        coordinator.signal(start, Viewport::new(1, 1));
        assert!(coordinator.poll(start + ms(150)));
        coordinator.signal(start + ms(151), Viewport::new(2, 2));
        assert!(coordinator.poll(start + ms(301)));

        assert_eq!(coordinator.on_frame(start + ms(302)), Some(Viewport::new(2, 2)));
        assert_eq!(coordinator.on_frame(start + ms(318)), None);
    }

    #[test]
    fn nothing_fires_before_the_quiet_period() {
        let start = Instant::now();
        let mut coordinator = ResizeCoordinator::new(ms(150));
        coordinator.signal(start, Viewport::new(4, 3));
        assert!(coordinator.is_settling());
        assert_eq!(coordinator.on_frame(start + ms(149)), None);

        coordinator.cancel();
        assert_eq!(coordinator.on_frame(start + ms(500)), None);
        assert!((Viewport::new(4, 3).aspect() - 4.0 / 3.0).abs() < f32::EPSILON);
    }
}
