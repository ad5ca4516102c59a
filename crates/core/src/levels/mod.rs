//! Reduction of a frequency snapshot into coarse energy levels.

use serde::{Deserialize, Serialize};

/// Upper edge of the bass band in Hz.
pub const BASS_CUTOFF_HZ: f32 = 250.0;
/// Upper edge of the mid band in Hz.
pub const MID_CUTOFF_HZ: f32 = 4_000.0;

const MAX_MAGNITUDE: f32 = 255.0;

/// Normalised energy per band plus the wideband average, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioLevels {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub rms: f32,
}

impl AudioLevels {
    pub const ZERO: Self = Self {
        bass: 0.0,
        mid: 0.0,
        treble: 0.0,
        rms: 0.0,
    };
}

/// Bin boundaries for a given snapshot length and sample rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandLayout {
    pub bin_width: f32,
    /// Exclusive end of the bass band.
    pub bass_end: usize,
    /// Exclusive end of the mid band; treble covers the rest.
    pub mid_end: usize,
    pub bin_count: usize,
}

impl BandLayout {
    pub fn new(bin_count: usize, sample_rate: f32) -> Self {
        let bin_width = sample_rate / 2.0 / bin_count.max(1) as f32;
        Self {
            bin_width,
            bass_end: (BASS_CUTOFF_HZ / bin_width).floor() as usize,
            mid_end: (MID_CUTOFF_HZ / bin_width).floor() as usize,
            bin_count,
        }
    }

    fn bass_count(&self) -> usize {
        self.bass_end.max(1)
    }

    fn mid_count(&self) -> usize {
        self.mid_end.saturating_sub(self.bass_end).max(1)
    }

    fn treble_count(&self) -> usize {
        self.bin_count.saturating_sub(self.mid_end).max(1)
    }
}

/// Per-band magnitude sums, kept separate so callers can check that the
/// bands partition the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandSums {
    pub bass: u64,
    pub mid: u64,
    pub treble: u64,
    pub total: u64,
}

pub fn band_sums(data: &[u8], layout: &BandLayout) -> BandSums {
    let mut sums = BandSums::default();
    for (index, &value) in data.iter().enumerate() {
        let value = u64::from(value);
        sums.total += value;
        if index < layout.bass_end {
            sums.bass += value;
        } else if index < layout.mid_end {
            sums.mid += value;
        } else {
            sums.treble += value;
        }
    }
    sums
}

/// Computes the levels for a snapshot. `None` or an empty snapshot yields
/// all-zero levels.
pub fn compute_levels(snapshot: Option<&[u8]>, sample_rate: f32) -> AudioLevels {
    let data = match snapshot {
        Some(data) if !data.is_empty() => data,
        _ => return AudioLevels::ZERO,
    };

    let layout = BandLayout::new(data.len(), sample_rate);
    let sums = band_sums(data, &layout);

    // Bands can extend past the snapshot on tiny inputs, so clamp to keep the
    // output inside [0, 1].
    let level = |sum: u64, count: usize| (sum as f32 / count as f32 / MAX_MAGNITUDE).clamp(0.0, 1.0);

    AudioLevels {
        bass: level(sums.bass, layout.bass_count()),
        mid: level(sums.mid, layout.mid_count()),
        treble: level(sums.treble, layout.treble_count()),
        rms: level(sums.total, layout.bin_count),
    }
}
