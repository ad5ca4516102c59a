//! Per-frame snapshots of the capture session's analysis node.

mod node;

pub use node::SoftwareAnalyser;

use crate::CaptureSession;

/// Identity and buffer sizes of the analysis node currently published by a
/// capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyserShape {
    /// Bumped by the session every time it wires a new graph.
    pub generation: u64,
    pub frequency_bin_count: usize,
    pub fft_size: usize,
}

/// Reusable snapshot buffers sized from the session's analysis node.
///
/// The buffers are allocated once per session and refreshed in place on every
/// call; they are rebuilt when the session wires a new node and dropped when
/// the node goes away.
#[derive(Debug, Default)]
pub struct AnalyserAdapter {
    frequency: Vec<u8>,
    time_domain: Vec<u8>,
    attached: Option<AnalyserShape>,
}

impl AnalyserAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shape the buffers are currently sized for, if any node is attached.
    pub fn attached(&self) -> Option<AnalyserShape> {
        self.attached
    }

    /// Aligns the buffers with the session's current node. Returns whether a
    /// node is attached.
    pub fn sync(&mut self, session: &CaptureSession) -> bool {
        match session.analyser_shape() {
            Some(shape) if self.attached == Some(shape) => true,
            Some(shape) => {
                tracing::debug!(
                    generation = shape.generation,
                    bins = shape.frequency_bin_count,
                    "sizing analyser buffers"
                );
                self.frequency = vec![0; shape.frequency_bin_count];
                self.time_domain = vec![0; shape.fft_size];
                self.attached = Some(shape);
                true
            }
            None => {
                if self.attached.take().is_some() {
                    self.frequency = Vec::new();
                    self.time_domain = Vec::new();
                }
                false
            }
        }
    }

    /// Refreshes and returns the frequency snapshot, or `None` when the
    /// session has no analysis node.
    pub fn frequency_data(&mut self, session: &mut CaptureSession) -> Option<&[u8]> {
        if !self.sync(session) {
            return None;
        }
        let node = session.analyser_mut()?;
        node.byte_frequency_data(&mut self.frequency);
        Some(&self.frequency)
    }

    /// Refreshes and returns the time-domain snapshot, or `None` when the
    /// session has no analysis node.
    pub fn time_domain_data(&mut self, session: &mut CaptureSession) -> Option<&[u8]> {
        if !self.sync(session) {
            return None;
        }
        let node = session.analyser_mut()?;
        node.byte_time_domain_data(&mut self.time_domain);
        Some(&self.time_domain)
    }
}
