//! Classifier predictions

use super::reading::{BiometricReading, EegReading};
use apm_common::events::Modality;
use serde::{Deserialize, Serialize};

/// One label's confidence (0-100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub label: String,
    pub confidence: f64,
}

impl ConfidenceScore {
    /// Create a score, clamping confidence into [0, 100]
    ///
    /// Non-finite confidences are recorded as 0.
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Reading a prediction was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality", content = "reading", rename_all = "lowercase")]
pub enum SourceReading {
    Eeg(EegReading),
    Biometric(BiometricReading),
}

impl SourceReading {
    pub fn modality(&self) -> Modality {
        match self {
            SourceReading::Eeg(_) => Modality::Eeg,
            SourceReading::Biometric(_) => Modality::Biometric,
        }
    }
}

/// A classifier's label plus confidence distribution
///
/// Immutable once received; fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    label: String,
    confidence_distribution: Vec<ConfidenceScore>,
    source_reading: SourceReading,
}

impl Prediction {
    pub fn new(
        label: impl Into<String>,
        confidence_distribution: Vec<ConfidenceScore>,
        source_reading: SourceReading,
    ) -> Self {
        Self {
            label: label.into(),
            confidence_distribution,
            source_reading,
        }
    }

    /// Label reported by the classifier
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn distribution(&self) -> &[ConfidenceScore] {
        &self.confidence_distribution
    }

    pub fn source_reading(&self) -> &SourceReading {
        &self.source_reading
    }

    pub fn modality(&self) -> Modality {
        self.source_reading.modality()
    }

    /// The classifier's own top label
    ///
    /// Falls back to the highest-confidence entry when the reported label is blank.
    pub fn top_label(&self) -> Option<&str> {
        let reported = self.label.trim();
        if !reported.is_empty() {
            return Some(reported);
        }
        self.confidence_distribution
            .iter()
            .fold(None::<&ConfidenceScore>, |best, score| match best {
                Some(b) if b.confidence >= score.confidence => Some(b),
                _ => Some(score),
            })
            .map(|s| s.label.as_str())
    }

    /// Confidence for an exact label, if present
    pub fn confidence_for(&self, label: &str) -> Option<f64> {
        self.confidence_distribution
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.confidence)
    }
}
