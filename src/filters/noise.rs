//! Per-frame outlier clipping and per-sensor smoothing.
//!
//! The outlier pass works *across the sensor values within one frame*, not
//! across time, and always runs before any time-domain smoothing, so a single
//! spike corrupts only its own frame, never the smoothing window of
//! subsequent frames.

use std::collections::VecDeque;

/// Smoothing mode for [`NoiseFilterBank::smooth`]. The two modes are mutually
/// exclusive per call and keep separate buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingMode {
    /// Arithmetic mean over the buffer contents.
    MovingAverage,
    /// Median over the buffer contents.
    Median,
}

/// Noise filter bank with per-sensor ring buffers, owned by one session.
#[derive(Debug)]
pub struct NoiseFilterBank {
    window_size: usize,
    threshold: f64,
    avg_buffers: Vec<VecDeque<f64>>,
    median_buffers: Vec<VecDeque<f64>>,
}

impl NoiseFilterBank {
    /// Create a bank with the given smoothing window and z-score threshold.
    pub fn new(window_size: usize, threshold: f64) -> Self {
        Self {
            window_size,
            threshold,
            avg_buffers: Vec::new(),
            median_buffers: Vec::new(),
        }
    }

    /// Replace per-frame outliers with the frame mean.
    ///
    /// Computes the mean and sample standard deviation of `values`; any value
    /// whose z-score exceeds the configured threshold is replaced with the
    /// mean. Frames with fewer than 2 values or zero deviation are returned
    /// unchanged; degenerate statistics are a no-op, never an error.
    pub fn outlier_pass(&self, values: &mut [f64]) {
        if values.len() < 2 {
            return;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (values.len() - 1) as f64;
        let std = variance.sqrt();
        if std == 0.0 {
            return;
        }
        for value in values.iter_mut() {
            let z = ((*value - mean) / std).abs();
            if z > self.threshold {
                tracing::debug!(outlier = *value, replacement = mean, "outlier replaced");
                *value = mean;
            }
        }
    }

    /// Append `value` to the sensor's ring buffer and return the smoothed
    /// value under the requested mode.
    ///
    /// There is no warm-up branch: an under-full buffer is averaged or
    /// medianed over whatever it currently holds, including the value just
    /// appended.
    pub fn smooth(&mut self, value: f64, sensor: usize, mode: SmoothingMode) -> f64 {
        let window = self.window_size;
        let buffer = match mode {
            SmoothingMode::MovingAverage => ensure_buffer(&mut self.avg_buffers, sensor, window),
            SmoothingMode::Median => ensure_buffer(&mut self.median_buffers, sensor, window),
        };
        if buffer.len() == window {
            buffer.pop_front();
        }
        buffer.push_back(value);
        match mode {
            SmoothingMode::MovingAverage => buffer.iter().sum::<f64>() / buffer.len() as f64,
            SmoothingMode::Median => median(buffer),
        }
    }

    /// Drop all buffered history. Invoked between independent sessions.
    pub fn reset(&mut self) {
        self.avg_buffers.clear();
        self.median_buffers.clear();
    }
}

fn ensure_buffer(
    buffers: &mut Vec<VecDeque<f64>>,
    sensor: usize,
    window: usize,
) -> &mut VecDeque<f64> {
    while buffers.len() <= sensor {
        buffers.push(VecDeque::with_capacity(window));
    }
    &mut buffers[sensor]
}

fn median(buffer: &VecDeque<f64>) -> f64 {
    let mut sorted: Vec<f64> = buffer.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
