//! Multi-algorithm adaptive regularization.
//!
//! Three per-sensor scalar filters (a one-dimensional Kalman smoother, a
//! positionally weighted moving average, and exponential smoothing) plus a
//! variance-driven adaptive blend that weights all three per frame. Filter
//! state is keyed by `(algorithm, sensor index)` through fixed per-algorithm
//! arrays, so the three algorithms never share history even when run over the
//! same sensor in one call.

use std::collections::VecDeque;

/// The regularization algorithms available per sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Scalar Kalman smoother.
    Kalman,
    /// Positionally weighted moving average.
    Weighted,
    /// Exponential smoothing.
    Exponential,
}

impl Algorithm {
    /// Parse a batch-path method name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kalman" => Some(Algorithm::Kalman),
            "weighted" => Some(Algorithm::Weighted),
            "exponential" => Some(Algorithm::Exponential),
            _ => None,
        }
    }
}

/// Blend weights over the three algorithms. Renormalized before use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    /// Weight of the Kalman output.
    pub kalman: f64,
    /// Weight of the weighted-moving-average output.
    pub weighted: f64,
    /// Weight of the exponential output.
    pub exponential: f64,
}

impl BlendWeights {
    fn normalized(self) -> Self {
        let total = self.kalman + self.weighted + self.exponential;
        Self {
            kalman: self.kalman / total,
            weighted: self.weighted / total,
            exponential: self.exponential / total,
        }
    }
}

#[derive(Debug, Clone)]
struct KalmanState {
    estimate: f64,
    error: f64,
}

/// Per-session regularization engine.
///
/// All state lives in per-algorithm arrays indexed by sensor; the engine is
/// owned by exactly one session and [`reset`](Self::reset) between
/// independent sessions.
#[derive(Debug)]
pub struct RegularizationEngine {
    window_size: usize,
    alpha: f64,
    process_noise: f64,
    measurement_noise: f64,
    kalman_states: Vec<Option<KalmanState>>,
    wma_buffers: Vec<VecDeque<f64>>,
    exp_states: Vec<Option<f64>>,
}

impl RegularizationEngine {
    /// Create an engine with the given window, EMA coefficient, and Kalman
    /// noise parameters.
    pub fn new(window_size: usize, alpha: f64, process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            window_size,
            alpha,
            process_noise,
            measurement_noise,
            kalman_states: Vec::new(),
            wma_buffers: Vec::new(),
            exp_states: Vec::new(),
        }
    }

    /// Scalar Kalman smoother for one sensor.
    ///
    /// The first call seeds `estimate = measurement`, `error = 1.0` and
    /// returns the measurement unchanged.
    pub fn kalman(&mut self, measurement: f64, sensor: usize) -> f64 {
        ensure_len(&mut self.kalman_states, sensor);
        match &mut self.kalman_states[sensor] {
            None => {
                self.kalman_states[sensor] = Some(KalmanState {
                    estimate: measurement,
                    error: 1.0,
                });
                measurement
            }
            Some(state) => {
                let predicted_error = state.error + self.process_noise;
                let gain = predicted_error / (predicted_error + self.measurement_noise);
                state.estimate += gain * (measurement - state.estimate);
                state.error = (1.0 - gain) * predicted_error;
                state.estimate
            }
        }
    }

    /// Weighted moving average for one sensor.
    ///
    /// The i-th buffered sample (1-indexed, oldest first) carries weight `i`,
    /// so the newest sample dominates. A buffer of length 1 returns the raw
    /// measurement.
    pub fn weighted_moving_average(&mut self, measurement: f64, sensor: usize) -> f64 {
        while self.wma_buffers.len() <= sensor {
            self.wma_buffers.push(VecDeque::with_capacity(self.window_size));
        }
        let buffer = &mut self.wma_buffers[sensor];
        if buffer.len() == self.window_size {
            buffer.pop_front();
        }
        buffer.push_back(measurement);
        if buffer.len() == 1 {
            return measurement;
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (i, sample) in buffer.iter().enumerate() {
            let weight = (i + 1) as f64;
            weighted_sum += sample * weight;
            weight_total += weight;
        }
        weighted_sum / weight_total
    }

    /// Exponential smoothing for one sensor, seeded on first call.
    pub fn exponential(&mut self, measurement: f64, sensor: usize) -> f64 {
        self.exponential_with_alpha(measurement, sensor, self.alpha)
    }

    /// Exponential smoothing with an explicit coefficient.
    pub fn exponential_with_alpha(&mut self, measurement: f64, sensor: usize, alpha: f64) -> f64 {
        ensure_len(&mut self.exp_states, sensor);
        match &mut self.exp_states[sensor] {
            None => {
                self.exp_states[sensor] = Some(measurement);
                measurement
            }
            Some(state) => {
                *state = alpha * measurement + (1.0 - alpha) * *state;
                *state
            }
        }
    }

    /// Apply one algorithm across a whole frame.
    pub fn single(&mut self, values: &[f64], algorithm: Algorithm) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| match algorithm {
                Algorithm::Kalman => self.kalman(v, i),
                Algorithm::Weighted => self.weighted_moving_average(v, i),
                Algorithm::Exponential => self.exponential(v, i),
            })
            .collect()
    }

    /// Blend all three algorithms per sensor under explicit weights.
    ///
    /// Each sensor runs all three filters against their own independently
    /// keyed state, and the result is the weighted linear combination.
    pub fn combined(&mut self, values: &[f64], weights: BlendWeights) -> Vec<f64> {
        let weights = weights.normalized();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let kalman = self.kalman(v, i);
                let weighted = self.weighted_moving_average(v, i);
                let exponential = self.exponential(v, i);
                weights.kalman * kalman
                    + weights.weighted * weighted
                    + weights.exponential * exponential
            })
            .collect()
    }

    /// Variance-driven adaptive blend.
    ///
    /// Requires at least 3 values, otherwise the input is returned unchanged.
    /// The population variance of the frame selects the blend: noisy frames
    /// lean on the Kalman output, stable frames on exponential smoothing.
    pub fn adaptive(&mut self, values: &[f64]) -> Vec<f64> {
        if values.len() < 3 {
            return values.to_vec();
        }
        let variance = population_variance(values);
        let weights = Self::adaptive_weights(variance);
        self.combined(values, weights)
    }

    /// Blend weights for a given frame variance.
    pub fn adaptive_weights(variance: f64) -> BlendWeights {
        if variance > 1.0 {
            BlendWeights {
                kalman: 0.7,
                weighted: 0.2,
                exponential: 0.1,
            }
        } else if variance > 0.1 {
            BlendWeights {
                kalman: 0.3,
                weighted: 0.5,
                exponential: 0.2,
            }
        } else {
            BlendWeights {
                kalman: 0.2,
                weighted: 0.3,
                exponential: 0.5,
            }
        }
    }

    /// Clear all keyed state. Invoked at the start of each independent
    /// session or batch file.
    pub fn reset(&mut self) {
        self.kalman_states.clear();
        self.wma_buffers.clear();
        self.exp_states.clear();
        tracing::debug!("regularization state reset");
    }
}

fn ensure_len<T>(states: &mut Vec<Option<T>>, sensor: usize) {
    while states.len() <= sensor {
        states.push(None);
    }
}

fn population_variance(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
