//! IMU orientation estimation and gyroscope calibration.
//!
//! Roll and pitch come from the accelerometer, yaw from integrating the
//! gyroscope z-axis. Angles are exponentially smoothed and normalized to
//! `[-1, 1]`. Gyroscope axes are z-score normalized against statistics
//! collected during a one-shot calibration phase at the start of a session.

use std::f64::consts::PI;

/// Per-axis gyroscope statistics captured at calibration time.
#[derive(Debug, Clone, Copy)]
pub struct AxisStats {
    /// Mean of the calibration samples.
    pub mean: f64,
    /// Sample standard deviation, floored at 1.0 when degenerate.
    pub std: f64,
    /// Minimum calibration sample.
    pub min: f64,
    /// Maximum calibration sample.
    pub max: f64,
}

impl Default for AxisStats {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std: 1.0,
            min: -500.0,
            max: 500.0,
        }
    }
}

/// One-shot gyroscope calibration.
///
/// Accumulates raw samples until `samples_needed` is reached, then computes
/// per-axis statistics and flips `calibrated` exactly once. The flag never
/// reverts except through [`reset`](Self::reset).
#[derive(Debug)]
pub struct GyroCalibration {
    samples: Vec<[f64; 3]>,
    samples_needed: usize,
    stats: [AxisStats; 3],
    calibrated: bool,
}

impl GyroCalibration {
    /// Create a calibration that completes after `samples_needed` samples.
    pub fn new(samples_needed: usize) -> Self {
        Self {
            samples: Vec::with_capacity(samples_needed),
            samples_needed,
            stats: [AxisStats::default(); 3],
            calibrated: false,
        }
    }

    /// Accumulate one raw sample. A no-op once calibrated.
    pub fn accumulate(&mut self, gx: f64, gy: f64, gz: f64) {
        if self.calibrated {
            return;
        }
        self.samples.push([gx, gy, gz]);
        if self.samples.len() >= self.samples_needed {
            for axis in 0..3 {
                self.stats[axis] = axis_stats(&self.samples, axis);
            }
            self.calibrated = true;
            tracing::info!(
                samples = self.samples.len(),
                "gyroscope calibration complete"
            );
            self.samples.clear();
        }
    }

    /// Whether calibration has completed.
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Samples accumulated so far (0 once calibrated).
    pub fn samples_seen(&self) -> usize {
        if self.calibrated {
            self.samples_needed
        } else {
            self.samples.len()
        }
    }

    /// Samples required to complete.
    pub fn samples_needed(&self) -> usize {
        self.samples_needed
    }

    /// Z-score normalize a gyroscope reading. Identity until calibrated.
    pub fn normalize(&self, gx: f64, gy: f64, gz: f64) -> [f64; 3] {
        if !self.calibrated {
            return [gx, gy, gz];
        }
        [
            (gx - self.stats[0].mean) / self.stats[0].std,
            (gy - self.stats[1].mean) / self.stats[1].std,
            (gz - self.stats[2].mean) / self.stats[2].std,
        ]
    }

    /// Discard all samples and statistics, returning to the uncalibrated
    /// state.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.stats = [AxisStats::default(); 3];
        self.calibrated = false;
    }
}

fn axis_stats(samples: &[[f64; 3]], axis: usize) -> AxisStats {
    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s[axis]).sum::<f64>() / n;
    let variance = if samples.len() < 2 {
        0.0
    } else {
        samples
            .iter()
            .map(|s| (s[axis] - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0)
    };
    let std = variance.sqrt();
    let std = if std == 0.0 { 1.0 } else { std };
    let min = samples.iter().map(|s| s[axis]).fold(f64::INFINITY, f64::min);
    let max = samples
        .iter()
        .map(|s| s[axis])
        .fold(f64::NEG_INFINITY, f64::max);
    AxisStats {
        mean,
        std,
        min,
        max,
    }
}

/// Orientation estimator owned by one session.
#[derive(Debug)]
pub struct ImuOrientationEstimator {
    alpha: f64,
    dt: f64,
    yaw_accumulator: f64,
    smoothed: Option<[f64; 3]>,
    calibration: GyroCalibration,
}

impl ImuOrientationEstimator {
    /// Create an estimator with the given EMA coefficient, yaw integration
    /// step, and calibration sample count.
    pub fn new(alpha: f64, dt: f64, calibration_samples: usize) -> Self {
        Self {
            alpha,
            dt,
            yaw_accumulator: 0.0,
            smoothed: None,
            calibration: GyroCalibration::new(calibration_samples),
        }
    }

    /// Roll and pitch in degrees from accelerometer axes.
    pub fn roll_pitch(ax: f64, ay: f64, az: f64) -> (f64, f64) {
        let roll = ay.atan2(az) * 180.0 / PI;
        let pitch = (-ax).atan2((ay * ay + az * az).sqrt()) * 180.0 / PI;
        (roll, pitch)
    }

    /// Yaw in degrees by integrating the gyro z-axis: `yaw += gz * dt`.
    pub fn yaw(&mut self, gz: f64) -> f64 {
        self.yaw_accumulator += gz * self.dt;
        self.yaw_accumulator
    }

    /// Per-channel exponential smoothing, all channels seeded on first call.
    pub fn smooth(&mut self, roll: f64, pitch: f64, yaw: f64) -> [f64; 3] {
        match &mut self.smoothed {
            None => {
                self.smoothed = Some([roll, pitch, yaw]);
                [roll, pitch, yaw]
            }
            Some(state) => {
                state[0] = self.alpha * roll + (1.0 - self.alpha) * state[0];
                state[1] = self.alpha * pitch + (1.0 - self.alpha) * state[1];
                state[2] = self.alpha * yaw + (1.0 - self.alpha) * state[2];
                *state
            }
        }
    }

    /// Clamp each angle to `[-180, 180]` and scale into `[-1, 1]`.
    pub fn normalize(roll: f64, pitch: f64, yaw: f64) -> [f64; 3] {
        [
            roll.clamp(-180.0, 180.0) / 180.0,
            pitch.clamp(-180.0, 180.0) / 180.0,
            yaw.clamp(-180.0, 180.0) / 180.0,
        ]
    }

    /// Full pipeline: compute, smooth, normalize.
    pub fn process(&mut self, ax: f64, ay: f64, az: f64, gz: f64) -> [f64; 3] {
        let (roll, pitch) = Self::roll_pitch(ax, ay, az);
        let yaw = self.yaw(gz);
        let [roll, pitch, yaw] = self.smooth(roll, pitch, yaw);
        Self::normalize(roll, pitch, yaw)
    }

    /// Feed one raw gyro sample into calibration.
    pub fn calibrate_gyro(&mut self, gx: f64, gy: f64, gz: f64) {
        self.calibration.accumulate(gx, gy, gz);
    }

    /// Normalize a gyro reading against calibration statistics. Identity
    /// until calibration completes.
    pub fn normalize_gyro(&self, gx: f64, gy: f64, gz: f64) -> [f64; 3] {
        self.calibration.normalize(gx, gy, gz)
    }

    /// Calibration bookkeeping for status reporting.
    pub fn calibration(&self) -> &GyroCalibration {
        &self.calibration
    }

    /// Reset orientation state and calibration for a fresh session.
    pub fn reset(&mut self) {
        self.yaw_accumulator = 0.0;
        self.smoothed = None;
        self.calibration.reset();
    }
}
