//! The sensor filter bank.
//!
//! Three stages, applied in order by [`crate::pipeline::SessionPipeline`]:
//!
//! 1. [`noise`]: per-frame outlier clipping and per-sensor smoothing;
//! 2. [`regularize`]: Kalman / weighted-moving-average / exponential filters
//!    with variance-driven adaptive blending;
//! 3. [`imu`]: accelerometer/gyro fusion into smoothed, normalized
//!    orientation angles, with one-shot gyroscope calibration.
//!
//! All filter state is owned by the stage structs. Each session or connection
//! constructs its own instances; nothing here is shared process-wide, so
//! concurrent sessions can never corrupt each other's filter history.

pub mod imu;
pub mod noise;
pub mod regularize;

pub use imu::ImuOrientationEstimator;
pub use noise::NoiseFilterBank;
pub use regularize::{Algorithm, RegularizationEngine};
