//! Prediction fusion engine
//!
//! Combines the EEG and biometric predictions into one arbitrated report using a
//! weighted sum per label, then flags disagreement between the two classifiers'
//! own top labels. Pure and synchronous: no I/O, no clock.

use crate::models::{
    CombinedReport, ConflictAnalysis, FusedScore, FusionWeights, Prediction, Severity,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Default EEG weight
pub const DEFAULT_EEG_WEIGHT: f64 = 0.7;

/// Default biometric weight
pub const DEFAULT_BIOMETRIC_WEIGHT: f64 = 0.3;

/// Gap (confidence points) between the top two fused entries below which a
/// conflict is rated `high`
pub const DEFAULT_CONFLICT_GAP_THRESHOLD: f64 = 10.0;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Fusion parameter errors
#[derive(Debug, Error, PartialEq)]
pub enum FusionError {
    #[error("Weight {0} must be within [0, 1]")]
    WeightOutOfRange(f64),

    #[error("Weights must sum to 1, got {0}")]
    WeightsDoNotSumToOne(f64),

    #[error("Conflict gap threshold must be a non-negative number, got {0}")]
    InvalidThreshold(f64),
}

/// Validated fusion parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    weights: FusionWeights,
    conflict_gap_threshold: f64,
}

impl FusionParams {
    pub fn new(
        eeg_weight: f64,
        biometric_weight: f64,
        conflict_gap_threshold: f64,
    ) -> Result<Self, FusionError> {
        for w in [eeg_weight, biometric_weight] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(FusionError::WeightOutOfRange(w));
            }
        }
        let sum = eeg_weight + biometric_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(FusionError::WeightsDoNotSumToOne(sum));
        }
        if !conflict_gap_threshold.is_finite() || conflict_gap_threshold < 0.0 {
            return Err(FusionError::InvalidThreshold(conflict_gap_threshold));
        }
        Ok(Self {
            weights: FusionWeights {
                eeg: eeg_weight,
                biometric: biometric_weight,
            },
            conflict_gap_threshold,
        })
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    pub fn conflict_gap_threshold(&self) -> f64 {
        self.conflict_gap_threshold
    }
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            weights: FusionWeights {
                eeg: DEFAULT_EEG_WEIGHT,
                biometric: DEFAULT_BIOMETRIC_WEIGHT,
            },
            conflict_gap_threshold: DEFAULT_CONFLICT_GAP_THRESHOLD,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fuse two predictions into a combined report
///
/// # Algorithm
/// 1. Union of labels, EEG labels first, then biometric-only labels (discovery order)
/// 2. `combined = round2(e * w_eeg + b * w_biometric)`, missing confidences count as 0
/// 3. Stable sort descending by `combined`
/// 4. Primary label is the top entry
/// 5. Conflict when the classifiers' own top labels differ (case-insensitive)
pub fn fuse_predictions(
    eeg: &Prediction,
    biometric: &Prediction,
    params: &FusionParams,
) -> CombinedReport {
    let weights = params.weights();

    let mut labels: Vec<&str> = Vec::new();
    for score in eeg.distribution().iter().chain(biometric.distribution()) {
        if !labels.contains(&score.label.as_str()) {
            labels.push(score.label.as_str());
        }
    }

    let mut fused: Vec<FusedScore> = labels
        .into_iter()
        .map(|label| {
            let e = eeg.confidence_for(label).unwrap_or(0.0);
            let b = biometric.confidence_for(label).unwrap_or(0.0);
            FusedScore {
                label: label.to_string(),
                combined_confidence: round2(e * weights.eeg + b * weights.biometric),
                eeg_confidence: e,
                biometric_confidence: b,
            }
        })
        .collect();

    // Vec::sort_by is stable: ties keep discovery order
    fused.sort_by(|a, b| {
        b.combined_confidence
            .partial_cmp(&a.combined_confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let primary_label = match fused.first() {
        Some(top) => top.label.clone(),
        None => {
            warn!("Both confidence distributions are empty, falling back to classifier labels");
            eeg.top_label()
                .or_else(|| biometric.top_label())
                .unwrap_or_default()
                .to_string()
        }
    };

    let conflict = detect_conflict(eeg, biometric, &fused, params);

    debug!(
        primary = %primary_label,
        labels = fused.len(),
        conflict = conflict.is_some(),
        "Fusion complete"
    );

    CombinedReport {
        primary_label,
        fused_distribution: fused,
        conflict,
        weights,
    }
}

fn detect_conflict(
    eeg: &Prediction,
    biometric: &Prediction,
    fused: &[FusedScore],
    params: &FusionParams,
) -> Option<ConflictAnalysis> {
    let eeg_top = eeg.top_label()?;
    let biometric_top = biometric.top_label()?;

    if eeg_top.trim().to_lowercase() == biometric_top.trim().to_lowercase() {
        return None;
    }

    let first = fused.first().map(|s| s.combined_confidence).unwrap_or(0.0);
    let second = fused.get(1).map(|s| s.combined_confidence).unwrap_or(0.0);
    let gap = first - second;

    let severity = if gap < params.conflict_gap_threshold() {
        Severity::High
    } else {
        Severity::Moderate
    };

    let weights = params.weights();
    let recommendation = format!(
        "EEG analysis indicates '{}' while biometric analysis indicates '{}'. \
         The combined result weights EEG at {:.0}% and biometric at {:.0}%; \
         a clinical follow-up is recommended to resolve the disagreement.",
        eeg_top,
        biometric_top,
        weights.eeg * 100.0,
        weights.biometric * 100.0
    );

    warn!(
        eeg = %eeg_top,
        biometric = %biometric_top,
        gap = gap,
        severity = %severity,
        "Classifier disagreement"
    );

    Some(ConflictAnalysis {
        exists: true,
        severity,
        recommendation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BiometricReading, ConfidenceScore, EegReading, SourceReading};

    fn eeg(label: &str, scores: &[(&str, f64)]) -> Prediction {
        Prediction::new(
            label,
            scores.iter().map(|(l, c)| ConfidenceScore::new(*l, *c)).collect(),
            SourceReading::Eeg(EegReading::new(1.0, 2.0, 3.0, 4.0, 5.0)),
        )
    }

    fn bio(label: &str, scores: &[(&str, f64)]) -> Prediction {
        Prediction::new(
            label,
            scores.iter().map(|(l, c)| ConfidenceScore::new(*l, *c)).collect(),
            SourceReading::Biometric(BiometricReading::new(0.29, 97.0)),
        )
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_weighted_fusion_with_moderate_conflict() {
        let report = fuse_predictions(
            &eeg("A", &[("A", 80.0), ("B", 20.0)]),
            &bio("B", &[("A", 30.0), ("B", 70.0)]),
            &FusionParams::default(),
        );

        assert_eq!(report.primary_label, "A");
        let labels: Vec<_> = report.fused_distribution.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B"]);
        assert!(approx(report.fused_distribution[0].combined_confidence, 65.0));
        assert!(approx(report.fused_distribution[1].combined_confidence, 35.0));

        let conflict = report.conflict.expect("conflict expected");
        assert!(conflict.exists);
        assert_eq!(conflict.severity, Severity::Moderate);
        assert!(conflict.recommendation.contains("'A'"));
        assert!(conflict.recommendation.contains("'B'"));
        assert!(conflict.recommendation.contains("70%"));
        assert!(conflict.recommendation.contains("30%"));
    }

    #[test]
    fn test_disjoint_labels() {
        let report = fuse_predictions(
            &eeg("A", &[("A", 100.0)]),
            &bio("B", &[("B", 100.0)]),
            &FusionParams::default(),
        );

        assert_eq!(report.primary_label, "A");
        assert!(approx(report.fused_distribution[0].combined_confidence, 70.0));
        assert!(approx(report.fused_distribution[1].combined_confidence, 30.0));
        assert_eq!(report.fused_distribution[1].eeg_confidence, 0.0);
        assert_eq!(report.fused_distribution[0].biometric_confidence, 0.0);

        let conflict = report.conflict.unwrap();
        assert_eq!(conflict.severity, Severity::Moderate);
    }

    #[test]
    fn test_close_scores_give_high_severity() {
        let report = fuse_predictions(
            &eeg("A", &[("A", 55.0), ("B", 45.0)]),
            &bio("B", &[("A", 40.0), ("B", 60.0)]),
            &FusionParams::default(),
        );
        // A = 38.5 + 12 = 50.5, B = 31.5 + 18 = 49.5
        assert_eq!(report.primary_label, "A");
        assert_eq!(report.conflict.unwrap().severity, Severity::High);
    }

    #[test]
    fn test_agreement_is_case_insensitive() {
        let report = fuse_predictions(
            &eeg("Panic Disorder", &[("panic disorder", 60.0)]),
            &bio("panic disorder", &[("panic disorder", 80.0)]),
            &FusionParams::default(),
        );
        assert!(report.conflict.is_none());
        assert!(!report.has_conflict());
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let report = fuse_predictions(
            &eeg("X", &[("X", 50.0), ("Y", 50.0)]),
            &bio("X", &[("Z", 0.0), ("Y", 50.0), ("X", 50.0)]),
            &FusionParams::default(),
        );
        let labels: Vec<_> = report.fused_distribution.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_combined_rounds_to_two_decimals() {
        let report = fuse_predictions(
            &eeg("A", &[("A", 33.333)]),
            &bio("A", &[("A", 66.667)]),
            &FusionParams::default(),
        );
        // 23.3331 + 20.0001 = 43.3332
        assert!(approx(report.fused_distribution[0].combined_confidence, 43.33));
    }

    #[test]
    fn test_empty_distributions_fall_back_to_labels() {
        let report = fuse_predictions(&eeg("", &[]), &bio("healthy control", &[]), &FusionParams::default());
        assert_eq!(report.primary_label, "healthy control");
        assert!(report.fused_distribution.is_empty());
        assert!(report.conflict.is_none());
    }

    #[test]
    fn test_custom_weights_and_threshold() {
        let params = FusionParams::new(0.5, 0.5, 50.0).unwrap();
        let report = fuse_predictions(
            &eeg("A", &[("A", 80.0), ("B", 20.0)]),
            &bio("B", &[("A", 30.0), ("B", 70.0)]),
            &params,
        );
        assert!(approx(report.fused_distribution[0].combined_confidence, 55.0));
        assert_eq!(report.weights, FusionWeights { eeg: 0.5, biometric: 0.5 });
        assert_eq!(report.conflict.unwrap().severity, Severity::High);
    }

    #[test]
    fn test_params_validation() {
        assert!(FusionParams::new(0.7, 0.3, 10.0).is_ok());
        assert_eq!(
            FusionParams::new(0.7, 0.7, 10.0),
            Err(FusionError::WeightsDoNotSumToOne(1.4))
        );
        assert_eq!(FusionParams::new(1.2, -0.2, 10.0), Err(FusionError::WeightOutOfRange(1.2)));
        assert_eq!(FusionParams::new(0.5, 0.5, -1.0), Err(FusionError::InvalidThreshold(-1.0)));
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let e = eeg("A", &[("A", 80.0), ("B", 20.0)]);
        let b = bio("B", &[("A", 30.0), ("B", 70.0)]);
        let params = FusionParams::default();
        assert_eq!(fuse_predictions(&e, &b, &params), fuse_predictions(&e, &b, &params));
    }
}
