use std::fmt;

use crate::audio::CaptureSource;

/// Result alias that carries the custom [`SpectraError`] type.
pub type Result<T> = std::result::Result<T, SpectraError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SpectraError {
    /// Free-form failure that does not warrant its own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed or unserialisable JSON documents.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Classified failure raised while setting up audio capture.
    #[error("{0}")]
    Capture(CaptureFailure),
    /// Durable key-value storage could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
    #[error("fft error: {0}")]
    Fft(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("unknown preset `{0}`")]
    UnknownPreset(String),
}

impl SpectraError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SpectraError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SpectraError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<realfft::FftError> for SpectraError {
    fn from(value: realfft::FftError) -> Self {
        Self::Fft(value.to_string())
    }
}

impl From<CaptureFailure> for SpectraError {
    fn from(value: CaptureFailure) -> Self {
        Self::Capture(value)
    }
}

/// Why a capture attempt was rejected.
///
/// The classification drives the message shown to the user; none of these are
/// fatal and the session can be started again from `idle` or `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    /// The host offers no way to acquire this kind of stream.
    Unsupported(CaptureSource),
    /// A stream was granted but carried no audio.
    NoAudioTrack,
    PermissionDenied,
    DeviceNotFound,
    /// Any other rejection, carrying the collaborator's own description.
    Generic(String),
}

impl CaptureFailure {
    /// Short stable identifier, suitable for logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "unsupported-browser",
            Self::NoAudioTrack => "no-audio-track",
            Self::PermissionDenied => "permission-denied",
            Self::DeviceNotFound => "device-not-found",
            Self::Generic(_) => "generic",
        }
    }

    /// User-displayable message for a failure that happened while capturing
    /// from `source`.
    pub fn user_message(&self, source: CaptureSource) -> String {
        match (self, source) {
            (Self::Unsupported(CaptureSource::SharedSurface), _) => {
                "Your system does not support capturing shared audio. Use a host with an output monitor device.".to_string()
            }
            (Self::Unsupported(CaptureSource::Microphone), _) => {
                "Your system does not support microphone access.".to_string()
            }
            (Self::NoAudioTrack, _) => {
                "No audio track found. Make sure audio sharing is enabled for the captured surface.".to_string()
            }
            (Self::PermissionDenied, CaptureSource::Microphone) => {
                "Microphone access denied. Please allow microphone access and try again.".to_string()
            }
            (Self::PermissionDenied, CaptureSource::SharedSurface) => {
                "Audio capture was denied. Please allow sharing and try again.".to_string()
            }
            (Self::DeviceNotFound, CaptureSource::Microphone) => {
                "No microphone found. Please connect a microphone and try again.".to_string()
            }
            (Self::DeviceNotFound, CaptureSource::SharedSurface) => {
                "No shareable audio source found.".to_string()
            }
            (Self::Generic(detail), CaptureSource::Microphone) if detail.is_empty() => {
                "Failed to access microphone".to_string()
            }
            (Self::Generic(detail), CaptureSource::SharedSurface) if detail.is_empty() => {
                "Failed to capture audio".to_string()
            }
            (Self::Generic(detail), _) => detail.clone(),
        }
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(detail) if !detail.is_empty() => write!(f, "{}: {detail}", self.kind()),
            _ => f.write_str(self.kind()),
        }
    }
}
