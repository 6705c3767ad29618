//! Offline CSV reprocessing.
//!
//! Reads recorded sensor rows, runs the same regularization and IMU fusion
//! as the streaming path, and writes cleaned rows rounded to 3 decimals.
//!
//! Input layout (13 columns):
//! `session_id,label,flex1..5,accel_x,accel_y,accel_z,gyro_x,gyro_y,gyro_z`;
//! dual-hand files double the 11 sensor columns with `left_`/`right_`
//! prefixes (24 columns, left first).
//!
//! Unlike the streaming path, the batch path gates on calibration: the first
//! `calibration_samples_needed` usable rows feed the gyroscope calibration
//! and are withheld from the output. Rows with wrong arity or non-numeric
//! values are skipped. Filter state is reset per file by construction: each
//! call builds fresh hand state.

use crate::config::PipelineConfig;
use crate::error::{AppResult, GloveError};
use crate::filters::regularize::BlendWeights;
use crate::filters::{Algorithm, ImuOrientationEstimator, RegularizationEngine};
use std::path::Path;

/// Default blend for the `combined` method.
const COMBINED_WEIGHTS: BlendWeights = BlendWeights {
    kalman: 0.5,
    weighted: 0.3,
    exponential: 0.2,
};

// Engine indices 8..11 carry the angle EMA, clear of the flex filters.
const ANGLE_SENSOR_BASE: usize = 8;

/// Regularization method for the batch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMethod {
    /// Variance-driven adaptive blend.
    Adaptive,
    /// Fixed-weight blend of all three algorithms.
    Combined,
    /// One algorithm across the frame.
    Single(Algorithm),
}

impl BatchMethod {
    /// Parse a CLI method name.
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "adaptive" => Ok(BatchMethod::Adaptive),
            "combined" => Ok(BatchMethod::Combined),
            other => Algorithm::parse(other).map(BatchMethod::Single).ok_or_else(|| {
                GloveError::Configuration(format!(
                    "Unknown method '{other}'. Must be one of: adaptive, combined, kalman, weighted, exponential"
                ))
            }),
        }
    }
}

/// Per-hand filter state for one file.
struct HandState {
    engine: RegularizationEngine,
    imu: ImuOrientationEstimator,
}

impl HandState {
    fn new(config: &PipelineConfig) -> Self {
        Self {
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

    /// Process one 11-value row; `None` while the row is consumed by
    /// calibration.
    fn process(&mut self, values: &[f64], method: BatchMethod) -> Option<[f64; 11]> {
        let (gx, gy, gz) = (values[8], values[9], values[10]);
        if !self.imu.calibration().is_calibrated() {
            self.imu.calibrate_gyro(gx, gy, gz);
            return None;
        }

        let flex = &values[..5];
        let regularized = match method {
            BatchMethod::Adaptive => self.engine.adaptive(flex),
            BatchMethod::Combined => self.engine.combined(flex, COMBINED_WEIGHTS),
            BatchMethod::Single(algorithm) => self.engine.single(flex, algorithm),
        };

        let (ax, ay, az) = (values[5], values[6], values[7]);
        let [roll, pitch, yaw] = self.imu.process(ax, ay, az, gz);
        let roll = self.engine.exponential(roll, ANGLE_SENSOR_BASE);
        let pitch = self.engine.exponential(pitch, ANGLE_SENSOR_BASE + 1);
        let yaw = self.engine.exponential(yaw, ANGLE_SENSOR_BASE + 2);
        let gyro = self.imu.normalize_gyro(gx, gy, gz);

        let mut out = [0.0; 11];
        out[..5].copy_from_slice(&regularized);
        out[5] = roll;
        out[6] = pitch;
        out[7] = yaw;
        out[8..11].copy_from_slice(&gyro);
        Some(out)
    }
}

const OUT_COLUMNS: [&str; 11] = [
    "f1", "f2", "f3", "f4", "f5", "roll", "pitch", "yaw", "gx", "gy", "gz",
];

/// Reprocess a recorded CSV file; returns the number of rows written.
pub fn process_csv(
    input: &Path,
    output: &Path,
    method: BatchMethod,
    config: &PipelineConfig,
) -> AppResult<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(input)?;
    let mut writer = csv::Writer::from_path(output)?;

    let dual = reader.headers()?.len() >= 24;

    let mut header: Vec<String> = vec!["session_id".into(), "label".into()];
    if dual {
        header.extend(OUT_COLUMNS.iter().map(|c| format!("left_{c}")));
        header.extend(OUT_COLUMNS.iter().map(|c| format!("right_{c}")));
    } else {
        header.extend(OUT_COLUMNS.iter().map(|c| c.to_string()));
    }
    writer.write_record(&header)?;

    let mut right = HandState::new(config);
    let mut left = dual.then(|| HandState::new(config));

    let sensor_columns = if dual { 22 } else { 11 };
    let mut rows_written = 0usize;

    for record in reader.records() {
        let record = record?;
        if record.len() < 2 + sensor_columns {
            tracing::debug!(fields = record.len(), "row skipped: wrong arity");
            continue;
        }
        let session_id = &record[0];
        let label = &record[1];
        let values: Option<Vec<f64>> = record
            .iter()
            .skip(2)
            .take(sensor_columns)
            .map(|field| field.trim().parse::<f64>().ok())
            .collect();
        let Some(values) = values else {
            tracing::debug!("row skipped: non-numeric value");
            continue;
        };

        let mut out_row: Vec<String> = vec![session_id.to_string(), label.to_string()];
        if dual {
            let left_state = match left.as_mut() {
                Some(state) => state,
                None => continue,
            };
            let left_out = left_state.process(&values[..11], method);
            let right_out = right.process(&values[11..22], method);
            let (Some(left_out), Some(right_out)) = (left_out, right_out) else {
                continue; // calibration rows are withheld
            };
            out_row.extend(left_out.iter().map(|v| format!("{v:.3}")));
            out_row.extend(right_out.iter().map(|v| format!("{v:.3}")));
        } else {
            let Some(out) = right.process(&values, method) else {
                continue;
            };
            out_row.extend(out.iter().map(|v| format!("{v:.3}")));
        }
        writer.write_record(&out_row)?;
        rows_written += 1;
    }

    writer.flush()?;
    tracing::info!(
        rows = rows_written,
        input = %input.display(),
        output = %output.display(),
        "batch reprocessing complete"
    );
    Ok(rows_written)
}
