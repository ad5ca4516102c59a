use std::{fs, io::ErrorKind, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, SpectraError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Loads a JSON configuration file. A missing or empty file yields the
    /// defaults; fields absent from the file keep their default values.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_json::from_str(&content)?;
        config.audio.validate()?;
        Ok(config)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Transform size of the analysis node; the bin count is half of it.
    pub fft_size: usize,
    /// Exponential averaging factor applied between consecutive snapshots.
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Sample rate assumed when no audio context reports one.
    pub fallback_sample_rate: u32,
    /// Number of mono samples kept between the capture thread and the analyser.
    pub feed_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            fallback_sample_rate: 48_000,
            feed_capacity: 8192,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(SpectraError::InvalidInput(
                "fft size must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(SpectraError::InvalidInput(
                "smoothing time constant must lie in [0, 1]",
            ));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(SpectraError::InvalidInput(
                "min decibels must be below max decibels",
            ));
        }
        if self.feed_capacity < self.fft_size {
            return Err(SpectraError::InvalidInput(
                "feed capacity must hold at least one transform window",
            ));
        }
        Ok(())
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Key under which the playback state document is persisted.
    pub storage_key: String,
    pub default_cycle_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            storage_key: "spectra-preset".to_string(),
            default_cycle_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub target_fps: u32,
    pub resize_quiet_period_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            resize_quiet_period_ms: 150,
        }
    }
}

impl RenderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }

    pub fn resize_quiet_period(&self) -> Duration {
        Duration::from_millis(self.resize_quiet_period_ms)
    }
}
