//! Core library for the Spectra audio visualiser.
//!
//! Each module owns one subsystem: audio capture and the analysis graph,
//! level extraction, the preset registry and playback state, persistence,
//! resize debouncing and the per-frame render loop. Hosts plug in their own
//! capture devices, storage and renderers through the traits exported here.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod levels;
pub mod playback;
pub mod preset;
pub mod render;
pub mod resize;
pub mod storage;

pub use analysis::{AnalyserAdapter, AnalyserShape, SoftwareAnalyser};
pub use audio::{
    AnalyserOptions, AnalysisNode, AudioBackend, AudioContext, CaptureBackend, CaptureSession,
    CaptureSource, CaptureState, EndedSignal, FeedTrack, MediaStream, MediaTrack, SampleFeed,
    SoftwareAudioBackend, SourceNode, TrackKind,
};
pub use config::{AppConfig, AudioConfig, PlaybackConfig, RenderConfig};
pub use error::{CaptureFailure, Result, SpectraError};
pub use levels::{band_sums, compute_levels, AudioLevels, BandLayout, BandSums};
pub use playback::{PlaybackController, PlaybackEvent, PlaybackState};
pub use preset::{
    ParamValue, PresetDescriptor, PresetKind, PresetParams, PresetRegistry, Renderer, VisualPreset,
};
pub use render::{
    FrameContext, FrameScheduler, FrameTick, IntervalScheduler, ManualScheduler, RenderLoop,
    TickOutcome,
};
pub use resize::{ResizeCoordinator, Viewport};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
