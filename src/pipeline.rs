//! Per-session composition of the filter stages.
//!
//! A [`SessionPipeline`] owns one noise filter bank, one regularization
//! engine, and one IMU estimator, and folds raw frames into
//! [`ProcessedFrame`]s. Each connection (and each hand of a dual-hand
//! session) gets its own pipeline; state is never shared across sessions.
//!
//! Calibration policy: the streaming path does not gate on calibration.
//! Gyro normalization is the identity until the calibration sample count is
//! reached, and progress is surfaced to the client through status envelopes.
//! The batch path gates (see [`crate::batch`]).

use crate::config::PipelineConfig;
use crate::filters::noise::SmoothingMode;
use crate::filters::{ImuOrientationEstimator, NoiseFilterBank, RegularizationEngine};
use crate::frame::{ProcessedFrame, RawSensorFrame, VALUES_PER_HAND};

// Engine sensor indices 0..5 carry flex state; 8..11 carry the post-
// normalization angle EMA so they never collide with the flex filters.
const ANGLE_SENSOR_BASE: usize = 8;

/// Calibration progress snapshot for status envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationProgress {
    /// Samples accumulated so far.
    pub seen: usize,
    /// Samples required.
    pub needed: usize,
    /// Whether calibration has completed.
    pub calibrated: bool,
}

/// One session's filter state: noise bank + regularization + IMU.
#[derive(Debug)]
pub struct SessionPipeline {
    config: PipelineConfig,
    noise: NoiseFilterBank,
    engine: RegularizationEngine,
    imu: ImuOrientationEstimator,
}

impl SessionPipeline {
    /// Build a fresh pipeline from configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
            noise: NoiseFilterBank::new(config.window_size, config.outlier_threshold),
            engine: RegularizationEngine::new(
                config.window_size,
                config.smoothing_alpha,
                config.process_noise,
                config.measurement_noise,
            ),
            imu: ImuOrientationEstimator::new(
                config.smoothing_alpha,
                config.yaw_dt,
                config.calibration_samples_needed,
            ),
        }
    }

    /// Fold one raw frame into the session's filter state and return the
    /// fused, normalized frame.
    pub fn process(&mut self, frame: &RawSensorFrame) -> ProcessedFrame {
        let mut values = frame.values();
        if self.config.apply_outlier {
            self.noise.outlier_pass(&mut values);
        }

        // Flex channels: time-domain smoothing, adaptive regularization,
        // then scale into [0, 1].
        let mut flex: Vec<f64> = values[..5].to_vec();
        if self.config.apply_moving_avg {
            for (i, v) in flex.iter_mut().enumerate() {
                *v = self.noise.smooth(*v, i, SmoothingMode::MovingAverage);
            }
        } else if self.config.apply_median {
            for (i, v) in flex.iter_mut().enumerate() {
                *v = self.noise.smooth(*v, i, SmoothingMode::Median);
            }
        }
        let regularized = self.engine.adaptive(&flex);
        let mut flex_out = [0.0; 5];
        for (out, v) in flex_out.iter_mut().zip(regularized.iter()) {
            *out = (v / self.config.flex_max).clamp(0.0, 1.0);
        }

        // Orientation from the outlier-passed accel/gyro values, with an
        // extra EMA pass over the normalized angles.
        let (ax, ay, az) = (values[5], values[6], values[7]);
        let (gx, gy, gz) = (values[8], values[9], values[10]);
        let [roll, pitch, yaw] = self.imu.process(ax, ay, az, gz);
        let roll = self.engine.exponential(roll, ANGLE_SENSOR_BASE);
        let pitch = self.engine.exponential(pitch, ANGLE_SENSOR_BASE + 1);
        let yaw = self.engine.exponential(yaw, ANGLE_SENSOR_BASE + 2);

        // Gyro: accumulate calibration from raw readings, then normalize
        // (identity until calibrated).
        self.imu.calibrate_gyro(frame.gyro[0], frame.gyro[1], frame.gyro[2]);
        let gyro = self.imu.normalize_gyro(gx, gy, gz);

        ProcessedFrame {
            flex: flex_out,
            roll,
            pitch,
            yaw,
            gyro,
            timestamp: frame.timestamp,
            hand: frame.hand,
        }
    }

    /// Calibration bookkeeping for status envelopes.
    pub fn calibration_progress(&self) -> CalibrationProgress {
        let cal = self.imu.calibration();
        CalibrationProgress {
            seen: cal.samples_seen(),
            needed: cal.samples_needed(),
            calibrated: cal.is_calibrated(),
        }
    }

    /// Clear all filter state for a fresh session. State must be reset, not
    /// reused, between independent sessions.
    pub fn reset(&mut self) {
        self.noise.reset();
        self.engine.reset();
        self.imu.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Hand;

    fn config() -> PipelineConfig {
        PipelineConfig {
            calibration_samples_needed: 3,
            ..PipelineConfig::default()
        }
    }

    fn frame(flex: f64, ts: f64) -> RawSensorFrame {
        RawSensorFrame {
            flex: [flex; 5],
            accel: [0.0, 0.0, 1.0],
            gyro: [1.0, 2.0, 3.0],
            timestamp: ts,
            hand: Hand::Right,
        }
    }

    #[test]
    fn output_vector_has_expected_length_and_bounds() {
        let cfg = config();
        let mut pipeline = SessionPipeline::new(&cfg);
        let out = pipeline.process(&frame(2000.0, 1.0));
        assert_eq!(out.features().len(), VALUES_PER_HAND);
        for v in out.flex {
            assert!((0.0..=1.0).contains(&v));
        }
        for v in [out.roll, out.pitch, out.yaw] {
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn gyro_passthrough_until_calibrated() {
        let cfg = config();
        let mut pipeline = SessionPipeline::new(&cfg);
        // First frames: calibration incomplete, gyro passes through raw
        // (modulo the outlier pass, which leaves these values alone).
        let out = pipeline.process(&frame(2000.0, 1.0));
        assert_eq!(out.gyro, [1.0, 2.0, 3.0]);
        assert!(!pipeline.calibration_progress().calibrated);

        pipeline.process(&frame(2000.0, 2.0));
        pipeline.process(&frame(2000.0, 3.0));
        assert!(pipeline.calibration_progress().calibrated);

        // Constant calibration samples degenerate to std = 1.0, so the
        // normalized reading is now centered at zero.
        let out = pipeline.process(&frame(2000.0, 4.0));
        assert_eq!(out.gyro, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn reset_returns_to_uncalibrated_state() {
        let cfg = config();
        let mut pipeline = SessionPipeline::new(&cfg);
        for i in 0..3 {
            pipeline.process(&frame(2000.0, i as f64));
        }
        assert!(pipeline.calibration_progress().calibrated);
        pipeline.reset();
        let progress = pipeline.calibration_progress();
        assert!(!progress.calibrated);
        assert_eq!(progress.seen, 0);
    }

    #[test]
    fn sessions_do_not_share_state() {
        let cfg = config();
        let mut a = SessionPipeline::new(&cfg);
        let mut b = SessionPipeline::new(&cfg);
        for i in 0..3 {
            a.process(&frame(2000.0, i as f64));
        }
        assert!(a.calibration_progress().calibrated);
        assert!(!b.calibration_progress().calibrated);
        // b's first frame seeds fresh filters, unaffected by a's history.
        let out = b.process(&frame(1000.0, 0.0));
        assert!((out.flex[0] - 1000.0 / 4095.0).abs() < 1e-9);
    }
}
