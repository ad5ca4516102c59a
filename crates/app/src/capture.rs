//! cpal-backed capture: the default input device stands in for the
//! microphone and a loopback "monitor" input for shared-surface audio.

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BuildStreamError, Device, FromSample, Host, Sample, SampleFormat, SizedSample, Stream,
    StreamConfig, StreamError,
};
use spectra_core::{
    CaptureBackend, CaptureFailure, CaptureSource, EndedSignal, MediaStream, MediaTrack,
    SampleFeed, SpectraError, TrackKind,
};

/// Substring identifying loopback inputs (PulseAudio/PipeWire monitors).
const MONITOR_HINT: &str = "monitor";

pub struct CpalCaptureBackend {
    host: Host,
    feed_capacity: usize,
    device_name: Option<String>,
}

impl CpalCaptureBackend {
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            host: cpal::default_host(),
            feed_capacity,
            device_name: None,
        }
    }

    /// Pins capture to the first input whose name contains `name`.
    pub fn with_device(mut self, name: Option<String>) -> Self {
        self.device_name = name;
        self
    }

    fn find_input(&self, needle: &str) -> Result<Option<Device>, CaptureFailure> {
        let devices = self
            .host
            .input_devices()
            .map_err(|err| classify_message(err.to_string()))?;
        let needle = needle.to_lowercase();
        Ok(devices.into_iter().find(|device| {
            device
                .name()
                .map(|name| name.to_lowercase().contains(&needle))
                .unwrap_or(false)
        }))
    }

    fn select_device(&self, source: CaptureSource) -> Result<Device, CaptureFailure> {
        if let Some(name) = &self.device_name {
            return self.find_input(name)?.ok_or(CaptureFailure::DeviceNotFound);
        }
        match source {
            CaptureSource::Microphone => self
                .host
                .default_input_device()
                .ok_or(CaptureFailure::DeviceNotFound),
            // A surface without a loopback input has no audio to share.
            CaptureSource::SharedSurface => self
                .find_input(MONITOR_HINT)?
                .ok_or(CaptureFailure::NoAudioTrack),
        }
    }

    fn open(&self, device: &Device) -> Result<CpalTrack, CaptureFailure> {
        let supported = device.default_input_config().map_err(|err| match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureFailure::DeviceNotFound,
            other => classify_message(other.to_string()),
        })?;
        let label = device.name().unwrap_or_else(|_| "input".to_string());
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let feed = SampleFeed::new(self.feed_capacity, config.sample_rate.0);
        let ended = EndedSignal::new();

        tracing::info!(
            device = %label,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            ?format,
            "opening input stream"
        );

        let stream = match format {
            SampleFormat::F32 => build::<f32>(device, &config, &feed, &ended),
            SampleFormat::I16 => build::<i16>(device, &config, &feed, &ended),
            SampleFormat::U16 => build::<u16>(device, &config, &feed, &ended),
            other => {
                return Err(CaptureFailure::Generic(format!(
                    "unsupported sample format {other}"
                )))
            }
        }
        .map_err(classify_build)?;

        stream
            .play()
            .map_err(|err| classify_message(err.to_string()))?;

        Ok(CpalTrack {
            label,
            stream: Some(stream),
            feed,
            ended,
        })
    }
}

impl CaptureBackend for CpalCaptureBackend {
    fn supports(&self, source: CaptureSource) -> bool {
        match source {
            CaptureSource::Microphone => true,
            CaptureSource::SharedSurface => cfg!(target_os = "linux"),
        }
    }

    fn request_stream(&mut self, source: CaptureSource) -> Result<MediaStream, CaptureFailure> {
        let device = self.select_device(source)?;
        let track = self.open(&device)?;
        Ok(MediaStream::new(vec![Box::new(track) as Box<dyn MediaTrack>]))
    }
}

fn build<T>(
    device: &Device,
    config: &StreamConfig,
    feed: &SampleFeed,
    ended: &EndedSignal,
) -> Result<Stream, BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let data_feed = feed.clone();
    let error_ended = ended.clone();
    let mut scratch: Vec<f32> = Vec::new();

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|&sample| f32::from_sample(sample)));
            data_feed.push_interleaved(&scratch, channels);
        },
        move |err: StreamError| {
            tracing::error!(%err, "input stream error");
            if matches!(err, StreamError::DeviceNotAvailable) {
                error_ended.raise();
            }
        },
        None,
    )
}

fn classify_build(err: BuildStreamError) -> CaptureFailure {
    match err {
        BuildStreamError::DeviceNotAvailable => CaptureFailure::DeviceNotFound,
        other => classify_message(other.to_string()),
    }
}

/// Maps a backend's free-form error text to a capture failure.
pub fn classify_message(detail: String) -> CaptureFailure {
    let lower = detail.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        CaptureFailure::PermissionDenied
    } else if lower.contains("no such device") || lower.contains("not available") {
        CaptureFailure::DeviceNotFound
    } else {
        CaptureFailure::Generic(detail)
    }
}

/// One live cpal input stream.
pub struct CpalTrack {
    label: String,
    stream: Option<Stream>,
    feed: SampleFeed,
    ended: EndedSignal,
}

impl MediaTrack for CpalTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                tracing::debug!(%err, "pausing input stream failed");
            }
            drop(stream);
            self.feed.clear();
        }
    }

    fn ended_signal(&self) -> EndedSignal {
        self.ended.clone()
    }

    fn sample_feed(&self) -> Option<SampleFeed> {
        Some(self.feed.clone())
    }
}

/// An input device as listed by `spectra devices`.
#[derive(Debug, Clone)]
pub struct InputDevice {
    pub name: String,
    pub is_default: bool,
    pub is_monitor: bool,
}

pub fn list_input_devices() -> spectra_core::Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|device| device.name().ok());
    let devices = host
        .input_devices()
        .map_err(|err| SpectraError::msg(format!("failed to enumerate input devices: {err}")))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| InputDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            is_monitor: name.to_lowercase().contains(MONITOR_HINT),
            name,
        })
        .collect())
}
