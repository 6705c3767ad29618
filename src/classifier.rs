//! The classifier seam.
//!
//! The gesture model is an external collaborator: feature vector in, label
//! and confidence out. The pipeline only depends on the [`Classifier`] trait;
//! invocations happen on the blocking thread pool, never on the event loop,
//! because real model runtimes are expensive and not assumed thread-safe.
//!
//! [`MockClassifier`] is the in-crate implementation used by the binary and
//! the tests: a deterministic softmax over fixed per-label projections of the
//! feature vector.

use crate::error::{AppResult, GloveError};
use serde::Serialize;

/// A scored gesture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Gesture label.
    pub label: String,
    /// Softmax confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Opaque scoring function: 11-element feature vector in, prediction out.
pub trait Classifier: Send + Sync {
    /// Score one feature vector.
    fn score(&self, features: &[f64]) -> AppResult<Prediction>;
}

/// Default gesture label set.
pub const DEFAULT_LABELS: [&str; 7] = ["Hello", "Yes", "No", "We", "Are", "Students", "Rest"];

/// Deterministic stand-in for the real gesture model.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    labels: Vec<String>,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

impl MockClassifier {
    /// Create a mock over a custom label set.
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

impl Classifier for MockClassifier {
    fn score(&self, features: &[f64]) -> AppResult<Prediction> {
        if features.is_empty() || self.labels.is_empty() {
            return Err(GloveError::Classifier(
                "empty feature vector or label set".to_string(),
            ));
        }
        // Fixed pseudo-projection per label; deterministic across runs so
        // tests can rely on stable outputs.
        let logits: Vec<f64> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, _)| {
                features
                    .iter()
                    .enumerate()
                    .map(|(j, &v)| v * (((i + 1) * (j + 2)) as f64).sin())
                    .sum()
            })
            .collect();

        let max_logit = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max_logit).exp()).collect();
        let total: f64 = exps.iter().sum();

        let (best, _) = logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .ok_or_else(|| GloveError::Classifier("no logits".to_string()))?;

        Ok(Prediction {
            label: self.labels[best].clone(),
            confidence: exps[best] / total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_deterministic() {
        let clf = MockClassifier::default();
        let features = [0.5; 11];
        let a = clf.score(&features).unwrap();
        let b = clf.score(&features).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_is_a_probability() {
        let clf = MockClassifier::default();
        let p = clf
            .score(&[0.1, 0.9, 0.3, 0.2, 0.5, -0.1, 0.0, 0.4, 1.2, -0.7, 0.3])
            .unwrap();
        assert!(!p.label.is_empty());
        assert!((0.0..=1.0).contains(&p.confidence));
    }

    #[test]
    fn empty_features_fail() {
        let clf = MockClassifier::default();
        assert!(matches!(
            clf.score(&[]),
            Err(GloveError::Classifier(_))
        ));
    }
}
