//! Passive estimation of the offset between the local clock and a session clock

use std::collections::VecDeque;

/// Offset estimator fed with `(local, remote)` clock reading pairs.
///
/// The estimate is the median of the recent `remote - local` samples, so a
/// single delayed reply cannot drag the session clock around.
#[derive(Clone, Debug)]
pub struct ClockOffsetEstimator {
    /// Recent offset samples (remote - local), seconds
    samples: VecDeque<f64>,
    /// Maximum samples to keep
    max_samples: usize,
    /// Current estimate, if any sample was seen
    offset: Option<f64>,
    /// Largest deviation of a kept sample from the estimate
    jitter_envelope: f64,
}

impl ClockOffsetEstimator {
    pub fn new() -> Self {
        Self::with_window(64)
    }

    pub fn with_window(max_samples: usize) -> Self {
        ClockOffsetEstimator {
            samples: VecDeque::with_capacity(max_samples.max(1)),
            max_samples: max_samples.max(1),
            offset: None,
            jitter_envelope: 0.0,
        }
    }

    /// Record one timing sample. Non-finite readings are dropped.
    pub fn observe(&mut self, local_time: f64, remote_time: f64) {
        let sample = remote_time - local_time;
        if !sample.is_finite() {
            return;
        }

        self.samples.push_back(sample);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }

        let offset = Self::median(&self.samples);
        self.jitter_envelope = self
            .samples
            .iter()
            .map(|s| (s - offset).abs())
            .fold(0.0, f64::max);
        self.offset = Some(offset);
    }

    /// Estimated `remote - local` offset in seconds
    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    pub fn jitter_envelope(&self) -> f64 {
        self.jitter_envelope
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.offset = None;
        self.jitter_envelope = 0.0;
    }

    fn median(values: &VecDeque<f64>) -> f64 {
        let mut sorted: Vec<f64> = values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}

impl Default for ClockOffsetEstimator {
    fn default() -> Self {
        Self::new()
    }
}
