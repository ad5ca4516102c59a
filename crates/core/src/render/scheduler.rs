use std::{
    collections::VecDeque,
    thread,
    time::{Duration, Instant},
};

/// One scheduled frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub instant: Instant,
    /// Milliseconds since the scheduler's origin.
    pub timestamp: f64,
    pub frame: u64,
}

/// Source of frame ticks. `next_frame` blocks until the next frame is due and
/// returns `None` once the scheduler is exhausted.
pub trait FrameScheduler {
    fn next_frame(&mut self) -> Option<FrameTick>;
}

/// Paces frames at a fixed interval on the calling thread.
///
/// A frame that overruns its slot never produces a backlog: the next deadline
/// is re-anchored to the first slot after the late frame.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval: Duration,
    origin: Instant,
    deadline: Instant,
    frame: u64,
    max_frames: Option<u64>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        let origin = Instant::now();
        Self {
            interval: interval.max(Duration::from_micros(100)),
            origin,
            deadline: origin,
            frame: 0,
            max_frames: None,
        }
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl FrameScheduler for IntervalScheduler {
    fn next_frame(&mut self) -> Option<FrameTick> {
        if self.max_frames.is_some_and(|max| self.frame >= max) {
            return None;
        }

        let now = Instant::now();
        if now < self.deadline {
            thread::sleep(self.deadline - now);
        }
        let instant = Instant::now();
        self.deadline = next_deadline(self.deadline, self.interval, instant);

        let tick = FrameTick {
            instant,
            timestamp: millis_between(self.origin, instant),
            frame: self.frame,
        };
        self.frame += 1;
        Some(tick)
    }
}

/// Deadline following `deadline`, skipping every slot that `now` has already
/// passed.
pub(crate) fn next_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next > now {
        return next;
    }
    let behind = now.duration_since(next).as_nanos();
    let skipped = behind / interval.as_nanos().max(1) + 1;
    next + interval * u32::try_from(skipped).unwrap_or(u32::MAX)
}

/// Replays a fixed list of frame instants without sleeping.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    origin: Instant,
    pending: VecDeque<Instant>,
    frame: u64,
}

impl ManualScheduler {
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            pending: VecDeque::new(),
            frame: 0,
        }
    }

    /// Frames at the given offsets from `origin`.
    pub fn from_offsets<I>(origin: Instant, offsets: I) -> Self
    where
        I: IntoIterator<Item = Duration>,
    {
        let mut scheduler = Self::new(origin);
        scheduler
            .pending
            .extend(offsets.into_iter().map(|offset| origin + offset));
        scheduler
    }

    /// `count` frames spaced `interval` apart, the first at `origin`.
    pub fn uniform(origin: Instant, interval: Duration, count: u32) -> Self {
        Self::from_offsets(origin, (0..count).map(|i| interval * i))
    }

    pub fn push(&mut self, instant: Instant) {
        self.pending.push_back(instant);
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameScheduler for ManualScheduler {
    fn next_frame(&mut self) -> Option<FrameTick> {
        let instant = self.pending.pop_front()?;
        let tick = FrameTick {
            instant,
            timestamp: millis_between(self.origin, instant),
            frame: self.frame,
        };
        self.frame += 1;
        Some(tick)
    }
}

fn millis_between(origin: Instant, instant: Instant) -> f64 {
    instant.saturating_duration_since(origin).as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overruns_skip_missed_slots() {
        let start = Instant::now();
        let interval = Duration::from_millis(16);

        assert_eq!(
            next_deadline(start, interval, start + Duration::from_millis(3)),
            start + interval
        );
        // 50ms late: slots at 16, 32 and 48 are gone.
        assert_eq!(
            next_deadline(start, interval, start + Duration::from_millis(50)),
            start + Duration::from_millis(64)
        );
        assert_eq!(
            next_deadline(start, interval, start + interval),
            start + Duration::from_millis(32)
        );
    }

    #[test]
    fn interval_scheduler_stops_after_max_frames() {
        let mut scheduler =
            IntervalScheduler::new(Duration::from_millis(1)).with_max_frames(Some(3));
        let ticks: Vec<_> = std::iter::from_fn(|| scheduler.next_frame()).collect();

        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks.iter().map(|t| t.frame).collect::<Vec<_>>(), [0, 1, 2]);
        assert!(ticks.windows(2).all(|w| w[1].instant >= w[0].instant));
        assert!(ticks[2].timestamp >= 2.0);
    }

    #[test]
    fn manual_scheduler_reports_offsets() {
        let origin = Instant::now();
        let mut scheduler = ManualScheduler::uniform(origin, Duration::from_millis(20), 2);
        assert_eq!(scheduler.remaining(), 2);

        let first = scheduler.next_frame().unwrap();
        let second = scheduler.next_frame().unwrap();
        assert_eq!(first.timestamp, 0.0);
        assert!((second.timestamp - 20.0).abs() < 1e-9);
        assert_eq!(second.frame, 1);
        assert!(scheduler.next_frame().is_none());
    }
}
