//! In-process audio graph: the processing context runs entirely in software on
//! top of [`SampleFeed`]s delivered by capture tracks.

use crate::{
    AnalyserOptions, AnalysisNode, AudioBackend, AudioContext, EndedSignal, MediaStream,
    MediaTrack, Result, SampleFeed, SoftwareAnalyser, SourceNode, SpectraError, TrackKind,
};

/// Builds [`SoftwareContext`]s.
#[derive(Debug, Clone)]
pub struct SoftwareAudioBackend {
    fallback_sample_rate: u32,
}

impl SoftwareAudioBackend {
    pub fn new(fallback_sample_rate: u32) -> Self {
        Self {
            fallback_sample_rate,
        }
    }
}

impl Default for SoftwareAudioBackend {
    fn default() -> Self {
        Self::new(48_000)
    }
}

impl AudioBackend for SoftwareAudioBackend {
    fn create_context(&mut self) -> Result<Box<dyn AudioContext>> {
        Ok(Box::new(SoftwareContext {
            sample_rate: self.fallback_sample_rate as f32,
            closed: false,
        }))
    }
}

/// Processing context whose sample rate follows the stream bound to it.
#[derive(Debug)]
pub struct SoftwareContext {
    sample_rate: f32,
    closed: bool,
}

impl SoftwareContext {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SpectraError::msg("audio context is closed"))
        } else {
            Ok(())
        }
    }
}

impl AudioContext for SoftwareContext {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn create_source(&mut self, stream: &MediaStream) -> Result<Box<dyn SourceNode>> {
        self.ensure_open()?;
        let feed = stream
            .sample_feed()
            .ok_or_else(|| SpectraError::msg("stream has no audio track to bind"))?;
        self.sample_rate = feed.sample_rate() as f32;
        Ok(Box::new(StreamSource {
            feed,
            connected: false,
        }))
    }

    fn create_analyser(&mut self, options: AnalyserOptions) -> Result<Box<dyn AnalysisNode>> {
        self.ensure_open()?;
        Ok(Box::new(SoftwareAnalyser::new(options)?))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(SpectraError::msg("audio context already closed"));
        }
        self.closed = true;
        Ok(())
    }
}

/// Source node that forwards a stream's feed to whatever it is connected to.
#[derive(Debug)]
pub struct StreamSource {
    feed: SampleFeed,
    connected: bool,
}

impl SourceNode for StreamSource {
    fn connect(&mut self, analyser: &mut dyn AnalysisNode) -> Result<()> {
        analyser.connect_input(self.feed.clone());
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

/// Track backed by a [`SampleFeed`] that something else fills, e.g. a device
/// callback or a test.
#[derive(Debug)]
pub struct FeedTrack {
    kind: TrackKind,
    label: String,
    feed: Option<SampleFeed>,
    ended: EndedSignal,
    live: bool,
}

impl FeedTrack {
    pub fn audio(label: impl Into<String>, feed: SampleFeed) -> Self {
        Self {
            kind: TrackKind::Audio,
            label: label.into(),
            feed: Some(feed),
            ended: EndedSignal::new(),
            live: true,
        }
    }

    pub fn video(label: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Video,
            label: label.into(),
            feed: None,
            ended: EndedSignal::new(),
            live: true,
        }
    }

    pub fn with_ended_signal(mut self, ended: EndedSignal) -> Self {
        self.ended = ended;
        self
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}

impl MediaTrack for FeedTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        self.live = false;
    }

    fn ended_signal(&self) -> EndedSignal {
        self.ended.clone()
    }

    fn sample_feed(&self) -> Option<SampleFeed> {
        self.feed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_adopts_the_stream_rate() {
        let mut backend = SoftwareAudioBackend::default();
        let mut context = backend.create_context().unwrap();
        assert_eq!(context.sample_rate(), 48_000.0);

        let stream = MediaStream::new(vec![Box::new(FeedTrack::audio(
            "line-in",
            SampleFeed::new(2048, 44_100),
        ))]);
        context.create_source(&stream).unwrap();
        assert_eq!(context.sample_rate(), 44_100.0);
    }

    #[test]
    fn video_only_streams_cannot_be_bound() {
        let mut context = SoftwareAudioBackend::default().create_context().unwrap();
        let stream = MediaStream::new(vec![Box::new(FeedTrack::video("screen"))]);
        assert!(context.create_source(&stream).is_err());
    }

    #[test]
    fn closed_contexts_refuse_new_nodes() {
        let mut context = SoftwareAudioBackend::default().create_context().unwrap();
        context.close().unwrap();
        assert!(context.close().is_err());
        assert!(context.create_analyser(AnalyserOptions::default()).is_err());
    }
}
