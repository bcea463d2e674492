//! Combined (fused) report types

use serde::{Deserialize, Serialize};

/// Per-modality fusion weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub eeg: f64,
    pub biometric: f64,
}

/// One label's fused confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedScore {
    pub label: String,
    /// `round2(eeg * w_eeg + biometric * w_biometric)`
    pub combined_confidence: f64,
    /// 0 when the EEG distribution lacks the label
    pub eeg_confidence: f64,
    /// 0 when the biometric distribution lacks the label
    pub biometric_confidence: f64,
}

/// Conflict severity between the two classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Top two fused scores are close together
    High,
    Moderate,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::High => write!(f, "high"),
            Severity::Moderate => write!(f, "moderate"),
        }
    }
}

/// Disagreement between the classifiers' own top labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAnalysis {
    pub exists: bool,
    pub severity: Severity,
    pub recommendation: String,
}

/// Arbitrated result of fusing the EEG and biometric predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedReport {
    pub primary_label: String,
    /// Sorted descending by `combined_confidence`
    pub fused_distribution: Vec<FusedScore>,
    /// `None` when both classifiers agree
    pub conflict: Option<ConflictAnalysis>,
    pub weights: FusionWeights,
}

impl CombinedReport {
    pub fn has_conflict(&self) -> bool {
        self.conflict.as_ref().map(|c| c.exists).unwrap_or(false)
    }
}
