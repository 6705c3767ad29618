//! # glove-stream
//!
//! Sensor regularization and real-time streaming inference for wearable
//! glove gesture recognition. The crate ingests frames of glove sensor
//! readings (5 flex sensors, 3-axis accelerometer, 3-axis gyroscope, one or
//! two hands), cleans and fuses them into a stable normalized feature
//! vector, and serves that vector to a gesture classifier over a persistent
//! WebSocket connection.
//!
//! ## Crate Structure
//!
//! - **`frame`**: decoding inbound JSON into typed sensor frames, and the
//!   `ProcessedFrame` handed to the classifier.
//! - **`filters`**: the numerical core: per-frame outlier clipping,
//!   per-sensor smoothing, Kalman / weighted / exponential regularization
//!   with adaptive blending, and IMU orientation estimation with one-shot
//!   gyroscope calibration.
//! - **`pipeline`**: per-session composition of the filter stages. Filter
//!   state is partitioned per session; nothing is shared process-wide.
//! - **`classifier`**: the opaque scoring seam and a deterministic mock.
//! - **`stream`**: the streaming coordinator (per-client single-slot
//!   mailboxes, rate limiting, inference worker pool) and the axum WebSocket
//!   endpoint.
//! - **`batch`**: offline CSV reprocessing with the same filter bank.
//! - **`config`**: figment-based configuration with fail-fast validation.
//! - **`error`**: the `GloveError` type and recovery policy.
//! - **`telemetry`**: tracing subscriber setup.

pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod filters;
pub mod frame;
pub mod pipeline;
pub mod stream;
pub mod telemetry;
