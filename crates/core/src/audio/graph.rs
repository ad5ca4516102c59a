//! Contracts for the capture and audio-processing collaborators.
//!
//! The capture session only talks to these traits, so hosts plug in their own
//! device layer while tests script every failure path.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use crate::{AudioConfig, CaptureFailure, Result, SampleFeed};

/// Which kind of stream a capture attempt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureSource {
    /// Audio of a shared surface such as the system output mix.
    SharedSurface,
    Microphone,
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedSurface => f.write_str("shared-surface"),
            Self::Microphone => f.write_str("microphone"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Flag raised by a track when the underlying hardware stops delivering data.
#[derive(Debug, Clone, Default)]
pub struct EndedSignal(Arc<AtomicBool>);

impl EndedSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait MediaTrack {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    /// Releases the device behind the track. Must be safe to call repeatedly.
    fn stop(&mut self);

    fn ended_signal(&self) -> EndedSignal;

    /// Samples delivered by the track, for audio tracks only.
    fn sample_feed(&self) -> Option<SampleFeed>;
}

/// A granted capture stream and the tracks it carries.
#[derive(Default)]
pub struct MediaStream {
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> impl Iterator<Item = &dyn MediaTrack> {
        self.tracks.iter().map(|track| &**track)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &dyn MediaTrack> {
        self.tracks().filter(|track| track.kind() == TrackKind::Audio)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }

    pub fn first_audio_track(&self) -> Option<&dyn MediaTrack> {
        self.audio_tracks().next()
    }

    /// Feed of the first audio track, which is the one the graph binds to.
    pub fn sample_feed(&self) -> Option<SampleFeed> {
        self.first_audio_track().and_then(|track| track.sample_feed())
    }

    pub fn stop_all(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tracks().map(|track| (track.kind(), track.label().to_string())))
            .finish()
    }
}

/// Acquires media streams from the host.
pub trait CaptureBackend {
    /// Whether the host offers this kind of capture at all.
    fn supports(&self, source: CaptureSource) -> bool;

    /// Requests a stream, suspending until the host grants or rejects it.
    fn request_stream(
        &mut self,
        source: CaptureSource,
    ) -> std::result::Result<MediaStream, CaptureFailure>;
}

/// Settings applied to every analysis node a session creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserOptions {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

impl From<&AudioConfig> for AnalyserOptions {
    fn from(config: &AudioConfig) -> Self {
        Self {
            fft_size: config.fft_size,
            smoothing_time_constant: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }
}

/// Node exposing byte snapshots of whatever is connected to its input.
pub trait AnalysisNode {
    fn frequency_bin_count(&self) -> usize;

    fn fft_size(&self) -> usize;

    fn connect_input(&mut self, feed: SampleFeed);

    /// Fills `out` with magnitudes in 0..=255, one per bin.
    fn byte_frequency_data(&mut self, out: &mut [u8]);

    /// Fills `out` with waveform samples centred on 128.
    fn byte_time_domain_data(&mut self, out: &mut [u8]);

    fn disconnect(&mut self);
}

/// Node bound to a media stream.
pub trait SourceNode {
    fn connect(&mut self, analyser: &mut dyn AnalysisNode) -> Result<()>;

    fn disconnect(&mut self);
}

pub trait AudioContext {
    /// Effective sample rate of the processing engine in Hz.
    fn sample_rate(&self) -> f32;

    fn create_source(&mut self, stream: &MediaStream) -> Result<Box<dyn SourceNode>>;

    fn create_analyser(&mut self, options: AnalyserOptions) -> Result<Box<dyn AnalysisNode>>;

    /// Tears the engine down. Callers swallow failures.
    fn close(&mut self) -> Result<()>;
}

/// Factory for processing contexts.
pub trait AudioBackend {
    fn create_context(&mut self) -> Result<Box<dyn AudioContext>>;
}
