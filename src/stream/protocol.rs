//! Outbound JSON envelope types.
//!
//! Wire shapes:
//!
//! ```json
//! {"timestamp": 1.0, "prediction": "Hello", "confidence": 0.93}
//! {"timestamp": 1.0, "left_prediction": "We", "left_confidence": 0.8,
//!  "right_prediction": "Are", "right_confidence": 0.7}
//! {"status": "calibrating", "progress": 42, "needed": 100}
//! {"status": "ready"}
//! {"error": "Malformed frame: expected 11 values per hand, got 9"}
//! ```

use crate::classifier::Prediction;
use serde::Serialize;

/// An outbound message to one client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Single-hand prediction.
    Single {
        /// Timestamp carried over from the scored frame.
        timestamp: f64,
        /// Predicted gesture label.
        prediction: String,
        /// Softmax confidence.
        confidence: f64,
    },
    /// Dual-hand prediction.
    Dual {
        /// Timestamp carried over from the scored frames.
        timestamp: f64,
        /// Left-hand label.
        left_prediction: String,
        /// Left-hand confidence.
        left_confidence: f64,
        /// Right-hand label.
        right_prediction: String,
        /// Right-hand confidence.
        right_confidence: f64,
    },
    /// Calibration status.
    Status {
        /// `"calibrating"` or `"ready"`.
        status: String,
        /// Samples accumulated so far, omitted once ready.
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<usize>,
        /// Samples required, omitted once ready.
        #[serde(skip_serializing_if = "Option::is_none")]
        needed: Option<usize>,
    },
    /// Recoverable per-connection error.
    Error {
        /// Human-readable description.
        error: String,
    },
}

impl Envelope {
    /// Single-hand success envelope.
    pub fn single(timestamp: f64, prediction: Prediction) -> Self {
        Envelope::Single {
            timestamp,
            prediction: prediction.label,
            confidence: prediction.confidence,
        }
    }

    /// Dual-hand success envelope.
    pub fn dual(timestamp: f64, left: Prediction, right: Prediction) -> Self {
        Envelope::Dual {
            timestamp,
            left_prediction: left.label,
            left_confidence: left.confidence,
            right_prediction: right.label,
            right_confidence: right.confidence,
        }
    }

    /// Calibration-in-progress envelope.
    pub fn calibrating(progress: usize, needed: usize) -> Self {
        Envelope::Status {
            status: "calibrating".to_string(),
            progress: Some(progress),
            needed: Some(needed),
        }
    }

    /// Calibration-complete envelope.
    pub fn ready() -> Self {
        Envelope::Status {
            status: "ready".to_string(),
            progress: None,
            needed: None,
        }
    }

    /// Error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error {
            error: message.into(),
        }
    }
}
