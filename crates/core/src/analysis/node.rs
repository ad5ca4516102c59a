use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{AnalyserOptions, AnalysisNode, Result, SampleFeed, SpectraError};

const BLACKMAN_ALPHA: f32 = 0.16;

/// Analysis node computed in software from a [`SampleFeed`].
///
/// Frequency bytes follow the usual analyser pipeline: Blackman window over the
/// newest `fft_size` samples, real FFT, magnitude scaled by `1 / fft_size`,
/// exponential smoothing across snapshots, then decibels mapped linearly from
/// `[min_decibels, max_decibels]` onto `0..=255`.
pub struct SoftwareAnalyser {
    options: AnalyserOptions,
    input: Option<SampleFeed>,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    fft_input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
}

impl SoftwareAnalyser {
    pub fn new(options: AnalyserOptions) -> Result<Self> {
        let size = options.fft_size;
        if !size.is_power_of_two() || size < 32 {
            return Err(SpectraError::InvalidInput(
                "analyser fft size must be a power of two of at least 32",
            ));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let fft_input = plan.make_input_vec();

        Ok(Self {
            options,
            input: None,
            window: (0..size).map(|index| blackman_value(index, size)).collect(),
            samples: vec![0.0; size],
            fft_input,
            spectrum,
            scratch,
            smoothed: vec![0.0; size / 2],
            plan,
        })
    }

    pub fn options(&self) -> &AnalyserOptions {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        self.input.is_some()
    }

    fn refresh_samples(&mut self) {
        match &self.input {
            Some(feed) => {
                feed.copy_latest(&mut self.samples);
            }
            None => self.samples.fill(0.0),
        }
    }

    fn update_spectrum(&mut self) -> Result<()> {
        self.refresh_samples();
        for ((slot, sample), weight) in self
            .fft_input
            .iter_mut()
            .zip(&self.samples)
            .zip(&self.window)
        {
            *slot = sample * weight;
        }

        self.plan
            .process_with_scratch(&mut self.fft_input, &mut self.spectrum, &mut self.scratch)?;

        let scale = 1.0 / self.options.fft_size as f32;
        let tau = self.options.smoothing_time_constant;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.spectrum) {
            let magnitude = bin.norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }
        Ok(())
    }

    fn magnitude_to_byte(&self, magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let min = self.options.min_decibels;
        let range = self.options.max_decibels - min;
        let decibels = 20.0 * magnitude.log10();
        let scaled = (255.0 / range * (decibels - min)).floor();
        scaled.clamp(0.0, 255.0) as u8
    }
}

impl AnalysisNode for SoftwareAnalyser {
    fn frequency_bin_count(&self) -> usize {
        self.options.fft_size / 2
    }

    fn fft_size(&self) -> usize {
        self.options.fft_size
    }

    fn connect_input(&mut self, feed: SampleFeed) {
        self.input = Some(feed);
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        if let Err(err) = self.update_spectrum() {
            tracing::warn!(%err, "frequency snapshot failed");
            out.fill(0);
            return;
        }

        for (slot, &magnitude) in out.iter_mut().zip(&self.smoothed) {
            *slot = self.magnitude_to_byte(magnitude);
        }
    }

    fn byte_time_domain_data(&mut self, out: &mut [u8]) {
        self.refresh_samples();
        for (slot, sample) in out.iter_mut().zip(&self.samples) {
            *slot = (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8;
        }
    }

    fn disconnect(&mut self) {
        self.input = None;
        self.smoothed.fill(0.0);
    }
}

impl fmt::Debug for SoftwareAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareAnalyser")
            .field("options", &self.options)
            .field("connected", &self.input.is_some())
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    let a0 = 0.5 * (1.0 - BLACKMAN_ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * BLACKMAN_ALPHA;
    let x = index as f32 / len as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser(smoothing: f32) -> SoftwareAnalyser {
        SoftwareAnalyser::new(AnalyserOptions {
            smoothing_time_constant: smoothing,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let mut node = analyser(0.8);
        node.connect_input(SampleFeed::new(2048, 48_000));

        let mut freq = vec![7_u8; node.frequency_bin_count()];
        node.byte_frequency_data(&mut freq);
        assert!(freq.iter().all(|&b| b == 0));

        let mut wave = vec![0_u8; node.fft_size()];
        node.byte_time_domain_data(&mut wave);
        assert!(wave.iter().all(|&b| b == 128));
    }

    #[test]
    fn sine_peaks_in_its_bin() {
        let sample_rate = 48_000.0;
        let mut node = analyser(0.0);
        let feed = SampleFeed::new(2048, sample_rate as u32);
        let bin = 64;
        let freq = bin as f32 * sample_rate / 1024.0;
        let tone: Vec<f32> = (0..1024)
            .map(|n| (2.0 * PI * freq * n as f32 / sample_rate).sin())
            .collect();
        feed.push(&tone);
        node.connect_input(feed);

        let mut bytes = vec![0_u8; node.frequency_bin_count()];
        node.byte_frequency_data(&mut bytes);

        assert_eq!(bytes[bin], 255);
        assert!(bytes[..bin - 4].iter().all(|&b| b < bytes[bin]));
        assert!(bytes[bin + 4..].iter().all(|&b| b < bytes[bin]));
    }

    #[test]
    fn smoothing_decays_between_snapshots() {
        let mut node = analyser(0.8);
        let feed = SampleFeed::new(1024, 48_000);
        feed.push(&vec![0.001; 1024]);
        node.connect_input(feed.clone());

        let mut first = vec![0_u8; 512];
        node.byte_frequency_data(&mut first);

        feed.push(&vec![0.0; 1024]);
        let mut second = vec![0_u8; 512];
        node.byte_frequency_data(&mut second);

        assert!(first[0] > 0 && first[0] < 255);
        assert!(second[0] > 0, "smoothing keeps some energy");
        assert!(second[0] < first[0]);
    }

    #[test]
    fn rejects_invalid_sizes() {
        let options = AnalyserOptions {
            fft_size: 100,
            ..Default::default()
        };
        assert!(SoftwareAnalyser::new(options).is_err());
    }
}
