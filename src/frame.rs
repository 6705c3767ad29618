//! Frame decoding and the typed sensor frame model.
//!
//! An inbound WebSocket message is one of two JSON shapes:
//!
//! ```json
//! {"right": [11 floats], "timestamp": 12.5}
//! {"left": [11 floats], "right": [11 floats], "language": "en", "timestamp": 12.5}
//! ```
//!
//! The 11 values per hand are laid out as `flex[0..5]`, `accel[5..8]`,
//! `gyro[8..11]`. Anything else (wrong arity, missing `right`, malformed
//! JSON) is a [`GloveError::MalformedFrame`], which callers turn into an
//! error envelope while keeping the connection open.

use crate::error::{AppResult, GloveError};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of sensor values per hand: 5 flex + 3 accel + 3 gyro.
pub const VALUES_PER_HAND: usize = 11;

/// Number of flex sensors per hand.
pub const FLEX_SENSORS: usize = 5;

/// Which hand a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    /// Left-hand glove.
    Left,
    /// Right-hand glove.
    Right,
}

/// One synchronized snapshot of all sensor readings for one hand.
///
/// Transient: created per inbound message, folded into filter state, then
/// discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSensorFrame {
    /// Raw flex readings, ADC range (0–4095 by default).
    pub flex: [f64; 5],
    /// Raw accelerometer axes.
    pub accel: [f64; 3],
    /// Raw gyroscope axes.
    pub gyro: [f64; 3],
    /// Sender-supplied timestamp, seconds.
    pub timestamp: f64,
    /// Which hand produced this frame.
    pub hand: Hand,
}

impl RawSensorFrame {
    /// Build a frame from an 11-value slice laid out as flex/accel/gyro.
    pub fn from_values(values: &[f64], timestamp: f64, hand: Hand) -> AppResult<Self> {
        if values.len() != VALUES_PER_HAND {
            return Err(GloveError::MalformedFrame(format!(
                "expected {VALUES_PER_HAND} values per hand, got {}",
                values.len()
            )));
        }
        let mut flex = [0.0; 5];
        flex.copy_from_slice(&values[..5]);
        let mut accel = [0.0; 3];
        accel.copy_from_slice(&values[5..8]);
        let mut gyro = [0.0; 3];
        gyro.copy_from_slice(&values[8..11]);
        Ok(Self {
            flex,
            accel,
            gyro,
            timestamp,
            hand,
        })
    }

    /// The 11 raw values in wire order.
    pub fn values(&self) -> [f64; VALUES_PER_HAND] {
        let mut out = [0.0; VALUES_PER_HAND];
        out[..5].copy_from_slice(&self.flex);
        out[5..8].copy_from_slice(&self.accel);
        out[8..11].copy_from_slice(&self.gyro);
        out
    }
}

/// A decoded inbound message: one or two raw frames sharing a timestamp.
#[derive(Debug, Clone)]
pub struct GloveMessage {
    /// Left-hand frame, present only for dual-hand messages.
    pub left: Option<RawSensorFrame>,
    /// Right-hand frame, always present.
    pub right: RawSensorFrame,
    /// Optional language tag from dual-hand messages.
    pub language: Option<String>,
    /// Shared timestamp, seconds.
    pub timestamp: f64,
}

impl GloveMessage {
    /// Whether this message carries both hands.
    pub fn is_dual(&self) -> bool {
        self.left.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    left: Option<Vec<f64>>,
    right: Option<Vec<f64>>,
    language: Option<String>,
    timestamp: Option<f64>,
}

/// Parse an inbound text message into a typed [`GloveMessage`].
pub fn decode(text: &str) -> AppResult<GloveMessage> {
    let payload: WirePayload = serde_json::from_str(text)
        .map_err(|e| GloveError::MalformedFrame(format!("invalid JSON: {e}")))?;

    let right_values = payload
        .right
        .ok_or_else(|| GloveError::MalformedFrame("missing 'right' sensor array".to_string()))?;

    let timestamp = payload.timestamp.unwrap_or_else(now_secs);

    let right = RawSensorFrame::from_values(&right_values, timestamp, Hand::Right)?;
    let left = payload
        .left
        .map(|values| RawSensorFrame::from_values(&values, timestamp, Hand::Left))
        .transpose()?;

    Ok(GloveMessage {
        left,
        right,
        language: payload.language,
        timestamp,
    })
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A fully filtered, fused, and normalized frame ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFrame {
    /// Filtered flex channels in `[0, 1]`.
    pub flex: [f64; 5],
    /// Smoothed roll in `[-1, 1]`.
    pub roll: f64,
    /// Smoothed pitch in `[-1, 1]`.
    pub pitch: f64,
    /// Smoothed yaw in `[-1, 1]`.
    pub yaw: f64,
    /// Normalized gyroscope axes (z-score once calibrated).
    pub gyro: [f64; 3],
    /// Timestamp carried over from the raw frame.
    pub timestamp: f64,
    /// Which hand produced this frame.
    pub hand: Hand,
}

impl ProcessedFrame {
    /// The 11-element feature vector handed to the classifier.
    pub fn features(&self) -> [f64; VALUES_PER_HAND] {
        let mut out = [0.0; VALUES_PER_HAND];
        out[..5].copy_from_slice(&self.flex);
        out[5] = self.roll;
        out[6] = self.pitch;
        out[7] = self.yaw;
        out[8..11].copy_from_slice(&self.gyro);
        out
    }
}
