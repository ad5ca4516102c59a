use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

/// Bounded window of the most recent mono samples of a capture track.
///
/// The capture thread pushes, the analysis node copies out the tail. Old
/// samples are discarded once the capacity is reached.
#[derive(Clone)]
pub struct SampleFeed {
    shared: Arc<Mutex<FeedInner>>,
}

struct FeedInner {
    samples: VecDeque<f32>,
    capacity: usize,
    sample_rate: u32,
}

impl SampleFeed {
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Mutex::new(FeedInner {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                sample_rate,
            })),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, samples: &[f32]) {
        let mut inner = self.lock();
        inner.extend(samples.iter().copied());
    }

    /// Downmixes interleaved frames to mono before storing them.
    pub fn push_interleaved(&self, data: &[f32], channels: usize) {
        if channels <= 1 {
            self.push(data);
            return;
        }

        let mut inner = self.lock();
        let scale = 1.0 / channels as f32;
        inner.extend(
            data.chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() * scale),
        );
    }

    /// Copies the newest samples into `out`, right-aligned. Missing history is
    /// zero-filled. Returns how many real samples were copied.
    pub fn copy_latest(&self, out: &mut [f32]) -> usize {
        let inner = self.lock();
        let available = inner.samples.len().min(out.len());
        let pad = out.len() - available;
        out[..pad].fill(0.0);

        let skip = inner.samples.len() - available;
        for (slot, sample) in out[pad..].iter_mut().zip(inner.samples.iter().skip(skip)) {
            *slot = *sample;
        }
        available
    }

    pub fn clear(&self) {
        self.lock().samples.clear();
    }

    // The feed only holds plain samples, so a panic elsewhere cannot leave it
    // inconsistent; keep serving data after poisoning.
    fn lock(&self) -> MutexGuard<'_, FeedInner> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FeedInner {
    fn extend(&mut self, samples: impl Iterator<Item = f32>) {
        for sample in samples {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }
}

impl fmt::Debug for SampleFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("SampleFeed")
            .field("len", &inner.samples.len())
            .field("capacity", &inner.capacity)
            .field("sample_rate", &inner.sample_rate)
            .finish()
    }
}
