mod feed;
mod graph;
mod software;

pub use feed::SampleFeed;
pub use graph::{
    AnalyserOptions, AnalysisNode, AudioBackend, AudioContext, CaptureBackend, CaptureSource,
    EndedSignal, MediaStream, MediaTrack, SourceNode, TrackKind,
};
pub use software::{FeedTrack, SoftwareAudioBackend, SoftwareContext, StreamSource};

use std::fmt;

use serde::Serialize;

use crate::{AnalyserShape, CaptureFailure, Result, SpectraError};

/// Lifecycle of a [`CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Capturing,
    Error,
}

/// Fully wired graph. Only ever published as a whole.
struct AudioGraph {
    stream: MediaStream,
    context: Box<dyn AudioContext>,
    source: Box<dyn SourceNode>,
    analyser: Box<dyn AnalysisNode>,
    ended: EndedSignal,
    sample_rate: f32,
}

/// Owns the audio graph (stream, source node, analysis node, context) and the
/// idle/capturing/error state machine around it.
///
/// Setup is all-or-nothing: a failure at any step stops acquired tracks,
/// releases the context and leaves no handle behind.
pub struct CaptureSession {
    capture: Box<dyn CaptureBackend>,
    audio: Box<dyn AudioBackend>,
    options: AnalyserOptions,
    state: CaptureState,
    graph: Option<AudioGraph>,
    input_method: Option<CaptureSource>,
    error: Option<String>,
    generation: u64,
}

impl CaptureSession {
    pub fn new(
        capture: Box<dyn CaptureBackend>,
        audio: Box<dyn AudioBackend>,
        options: AnalyserOptions,
    ) -> Self {
        Self {
            capture,
            audio,
            options,
            state: CaptureState::Idle,
            graph: None,
            input_method: None,
            error: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    pub fn has_error(&self) -> bool {
        self.state == CaptureState::Error
    }

    /// User-displayable message of the last failed attempt.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn input_method(&self) -> Option<CaptureSource> {
        self.input_method
    }

    pub fn supports(&self, source: CaptureSource) -> bool {
        self.capture.supports(source)
    }

    /// Effective sample rate of the running context.
    pub fn sample_rate(&self) -> Option<f32> {
        self.graph.as_ref().map(|graph| graph.sample_rate)
    }

    /// Number of graphs wired so far; identifies the current analysis node.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn analyser_shape(&self) -> Option<AnalyserShape> {
        self.graph.as_ref().map(|graph| AnalyserShape {
            generation: self.generation,
            frequency_bin_count: graph.analyser.frequency_bin_count(),
            fft_size: graph.analyser.fft_size(),
        })
    }

    pub fn analyser_mut(&mut self) -> Option<&mut (dyn AnalysisNode + 'static)> {
        self.graph.as_mut().map(|graph| graph.analyser.as_mut())
    }

    /// Starts capturing from `source`. Any running graph is torn down first,
    /// so retrying from `capturing`, `idle` or `error` always begins clean.
    ///
    /// On failure the session is left in `error` with a classified message and
    /// the failure is returned.
    pub fn start(&mut self, source: CaptureSource) -> Result<()> {
        if self.graph.is_some() {
            self.stop();
        }
        self.error = None;
        self.input_method = Some(source);

        match self.build_graph(source) {
            Ok(graph) => {
                tracing::info!(
                    %source,
                    sample_rate = graph.sample_rate,
                    bins = graph.analyser.frequency_bin_count(),
                    "audio capture started"
                );
                self.graph = Some(graph);
                self.generation += 1;
                self.state = CaptureState::Capturing;
                Ok(())
            }
            Err(failure) => {
                let message = failure.user_message(source);
                tracing::error!(%source, kind = failure.kind(), %message, "audio capture failed");
                self.input_method = None;
                self.error = Some(message);
                self.state = CaptureState::Error;
                Err(SpectraError::Capture(failure))
            }
        }
    }

    /// Tears the graph down and returns to `idle`. Safe to call in any state;
    /// from `idle` it changes nothing.
    pub fn stop(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.stream.stop_all();
            graph.analyser.disconnect();
            graph.source.disconnect();
            release_context(graph.context.as_mut());
            tracing::info!("audio capture stopped");
        }
        self.input_method = None;
        self.error = None;
        self.state = CaptureState::Idle;
    }

    /// Stops the session if the captured track reported that it ended.
    /// Returns whether that happened.
    pub fn poll_track_ended(&mut self) -> bool {
        let ended = self
            .graph
            .as_ref()
            .map(|graph| graph.ended.is_raised())
            .unwrap_or(false);
        if ended {
            tracing::info!("capture track ended");
            self.stop();
        }
        ended
    }

    fn build_graph(
        &mut self,
        source: CaptureSource,
    ) -> std::result::Result<AudioGraph, CaptureFailure> {
        if !self.capture.supports(source) {
            return Err(CaptureFailure::Unsupported(source));
        }

        let mut stream = self.capture.request_stream(source)?;

        let ended = match stream.first_audio_track() {
            Some(track) => track.ended_signal(),
            None => {
                // Surface captures may hand back video alone; release it too.
                stream.stop_all();
                return Err(CaptureFailure::NoAudioTrack);
            }
        };

        let mut context = match self.audio.create_context() {
            Ok(context) => context,
            Err(err) => {
                stream.stop_all();
                return Err(CaptureFailure::Generic(err.to_string()));
            }
        };

        match wire_nodes(context.as_mut(), &stream, self.options) {
            Ok((source, analyser)) => Ok(AudioGraph {
                sample_rate: context.sample_rate(),
                stream,
                context,
                source,
                analyser,
                ended,
            }),
            Err(err) => {
                stream.stop_all();
                release_context(context.as_mut());
                Err(CaptureFailure::Generic(err.to_string()))
            }
        }
    }
}

fn wire_nodes(
    context: &mut dyn AudioContext,
    stream: &MediaStream,
    options: AnalyserOptions,
) -> Result<(Box<dyn SourceNode>, Box<dyn AnalysisNode>)> {
    let mut source = context.create_source(stream)?;
    let mut analyser = match context.create_analyser(options) {
        Ok(analyser) => analyser,
        Err(err) => {
            source.disconnect();
            return Err(err);
        }
    };
    if let Err(err) = source.connect(analyser.as_mut()) {
        analyser.disconnect();
        source.disconnect();
        return Err(err);
    }
    Ok((source, analyser))
}

fn release_context(context: &mut dyn AudioContext) {
    if let Err(err) = context.close() {
        tracing::warn!(%err, "failed to close audio context");
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state)
            .field("input_method", &self.input_method)
            .field("error", &self.error)
            .field("generation", &self.generation)
            .field("sample_rate", &self.sample_rate())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    /// What a scripted capture backend does on the next request.
    #[derive(Clone)]
    pub(crate) enum Script {
        Grant { video: bool, audio: bool },
        Reject(CaptureFailure),
    }

    /// Capture collaborator whose answers and track lifecycle tests control.
    pub(crate) struct ScriptedCapture {
        pub script: Rc<RefCell<Script>>,
        pub supported: bool,
        pub feed: SampleFeed,
        pub ended: EndedSignal,
        pub stopped: Rc<RefCell<Vec<String>>>,
    }

    impl ScriptedCapture {
        pub fn audio(sample_rate: u32) -> Self {
            Self {
                script: Rc::new(RefCell::new(Script::Grant {
                    video: false,
                    audio: true,
                })),
                supported: true,
                feed: SampleFeed::new(4096, sample_rate),
                ended: EndedSignal::new(),
                stopped: Rc::default(),
            }
        }
    }

    struct RecordingTrack {
        inner: FeedTrack,
        stopped: Rc<RefCell<Vec<String>>>,
    }

    impl MediaTrack for RecordingTrack {
        fn kind(&self) -> TrackKind {
            self.inner.kind()
        }

        fn label(&self) -> &str {
            self.inner.label()
        }

        fn stop(&mut self) {
            if self.inner.is_live() {
                self.stopped.borrow_mut().push(self.inner.label().to_string());
            }
            self.inner.stop();
        }

        fn ended_signal(&self) -> EndedSignal {
            self.inner.ended_signal()
        }

        fn sample_feed(&self) -> Option<SampleFeed> {
            self.inner.sample_feed()
        }
    }

    impl CaptureBackend for ScriptedCapture {
        fn supports(&self, _source: CaptureSource) -> bool {
            self.supported
        }

        fn request_stream(
            &mut self,
            _source: CaptureSource,
        ) -> std::result::Result<MediaStream, CaptureFailure> {
            let script = self.script.borrow().clone();
            match script {
                Script::Reject(failure) => Err(failure),
                Script::Grant { video, audio } => {
                    let mut tracks: Vec<Box<dyn MediaTrack>> = Vec::new();
                    if video {
                        tracks.push(Box::new(RecordingTrack {
                            inner: FeedTrack::video("video"),
                            stopped: self.stopped.clone(),
                        }));
                    }
                    if audio {
                        tracks.push(Box::new(RecordingTrack {
                            inner: FeedTrack::audio("audio", self.feed.clone())
                                .with_ended_signal(self.ended.clone()),
                            stopped: self.stopped.clone(),
                        }));
                    }
                    Ok(MediaStream::new(tracks))
                }
            }
        }
    }

    /// Counters shared between a [`FaultyAudio`] backend and the test.
    #[derive(Default)]
    pub(crate) struct AudioLog {
        pub contexts_created: usize,
        pub contexts_closed: usize,
    }

    /// Software backend that can be told to fail at a given wiring step.
    pub(crate) struct FaultyAudio {
        pub fail_analyser: bool,
        pub fail_close: bool,
        pub log: Rc<RefCell<AudioLog>>,
    }

    struct FaultyContext {
        inner: Box<dyn AudioContext>,
        fail_analyser: bool,
        fail_close: bool,
        log: Rc<RefCell<AudioLog>>,
    }

    impl AudioBackend for FaultyAudio {
        fn create_context(&mut self) -> Result<Box<dyn AudioContext>> {
            self.log.borrow_mut().contexts_created += 1;
            Ok(Box::new(FaultyContext {
                inner: SoftwareAudioBackend::default().create_context()?,
                fail_analyser: self.fail_analyser,
                fail_close: self.fail_close,
                log: self.log.clone(),
            }))
        }
    }

    impl AudioContext for FaultyContext {
        fn sample_rate(&self) -> f32 {
            self.inner.sample_rate()
        }

        fn create_source(&mut self, stream: &MediaStream) -> Result<Box<dyn SourceNode>> {
            self.inner.create_source(stream)
        }

        fn create_analyser(&mut self, options: AnalyserOptions) -> Result<Box<dyn AnalysisNode>> {
            if self.fail_analyser {
                return Err(SpectraError::msg("analyser construction failed"));
            }
            self.inner.create_analyser(options)
        }

        fn close(&mut self) -> Result<()> {
            self.log.borrow_mut().contexts_closed += 1;
            if self.fail_close {
                return Err(SpectraError::msg("engine teardown failed"));
            }
            self.inner.close()
        }
    }

    pub(crate) fn scripted_session(capture: ScriptedCapture) -> (CaptureSession, SampleFeed) {
        let feed = capture.feed.clone();
        let session = CaptureSession::new(
            Box::new(capture),
            Box::new(SoftwareAudioBackend::default()),
            AnalyserOptions::default(),
        );
        (session, feed)
    }
}
