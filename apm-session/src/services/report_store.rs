//! Report persistence
//!
//! Submits a finished assessment to `POST {base}/save_report`. The save runs
//! in the background after the report is already visible; its outcome only
//! ever changes the session's `save_status`.

use crate::models::{
    BiometricReading, CombinedReport, ConflictAnalysis, EegReading, FusionWeights,
    PersistenceStatus, Prediction, Session,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Bound on a single save attempt
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Store answered `success: false`
    #[error("Report rejected: {0}")]
    Rejected(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One `{disorder, confidence}` entry on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePayload {
    pub disorder: String,
    pub confidence: f64,
}

/// A single classifier's prediction on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPayload {
    pub primary_prediction: String,
    pub confidence_scores: Vec<ScorePayload>,
}

impl From<&Prediction> for PredictionPayload {
    fn from(prediction: &Prediction) -> Self {
        Self {
            primary_prediction: prediction.top_label().unwrap_or_default().to_string(),
            confidence_scores: prediction
                .distribution()
                .iter()
                .map(|s| ScorePayload {
                    disorder: s.label.clone(),
                    confidence: s.confidence,
                })
                .collect(),
        }
    }
}

/// Fused entry on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedScorePayload {
    pub disorder: String,
    pub confidence: f64,
    pub eeg_confidence: f64,
    pub biometric_confidence: f64,
}

/// Combined report on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedPayload {
    pub primary_prediction: String,
    pub confidence_scores: Vec<FusedScorePayload>,
    pub conflict_analysis: Option<ConflictAnalysis>,
}

impl From<&CombinedReport> for CombinedPayload {
    fn from(report: &CombinedReport) -> Self {
        Self {
            primary_prediction: report.primary_label.clone(),
            confidence_scores: report
                .fused_distribution
                .iter()
                .map(|s| FusedScorePayload {
                    disorder: s.label.clone(),
                    confidence: s.combined_confidence,
                    eeg_confidence: s.eeg_confidence,
                    biometric_confidence: s.biometric_confidence,
                })
                .collect(),
            conflict_analysis: report.conflict.clone(),
        }
    }
}

/// Body of `POST {base}/save_report`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveReportRequest {
    pub patient_id: String,
    pub patient_name: String,
    pub patient_age: u32,
    pub doctor_id: Option<String>,
    pub eeg_data: EegReading,
    pub biometric_data: BiometricReading,
    pub eeg_prediction: PredictionPayload,
    pub biometric_prediction: PredictionPayload,
    pub combined_prediction: CombinedPayload,
    pub weights: FusionWeights,
    pub save: bool,
}

impl SaveReportRequest {
    /// Assemble from a session and its freshly built report
    ///
    /// `None` unless identity, both readings and both predictions are present.
    pub fn from_session(session: &Session, report: &CombinedReport) -> Option<Self> {
        let identity = session.identity()?;
        Some(Self {
            patient_id: identity.patient_id,
            patient_name: identity.name,
            patient_age: identity.age,
            doctor_id: identity.doctor_id,
            eeg_data: session.eeg_reading?,
            biometric_data: session.biometric_reading?,
            eeg_prediction: session.eeg_prediction.as_ref()?.into(),
            biometric_prediction: session.biometric_prediction.as_ref()?.into(),
            combined_prediction: report.into(),
            weights: report.weights,
            save: true,
        })
    }
}

/// Body returned by the store
#[derive(Debug, Clone, Deserialize)]
pub struct SaveReportResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub report_id: Option<String>,
}

/// Durable report storage
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Store one report, returning the store's report id if it sent one
    async fn save_report(&self, request: &SaveReportRequest) -> Result<Option<String>, StoreError>;
}

/// HTTP report store
pub struct HttpReportStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpReportStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        // Overall bound is applied by persist_report
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ReportStore for HttpReportStore {
    async fn save_report(&self, request: &SaveReportRequest) -> Result<Option<String>, StoreError> {
        let url = format!("{}/save_report", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StoreError::Api(status.as_u16(), error_text));
        }

        let body: SaveReportResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        if !body.success {
            return Err(StoreError::Rejected(
                body.message.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        Ok(body.report_id)
    }
}

/// Run one bounded save attempt and map the outcome to a terminal status
///
/// Never retries. The caller owns publishing the status change.
pub async fn persist_report(
    store: &dyn ReportStore,
    request: &SaveReportRequest,
    timeout: Duration,
) -> PersistenceStatus {
    match tokio::time::timeout(timeout, store.save_report(request)).await {
        Ok(Ok(report_id)) => {
            info!(
                patient_id = %request.patient_id,
                report_id = ?report_id,
                "Report saved"
            );
            PersistenceStatus::Saved
        }
        Ok(Err(e)) => {
            warn!(patient_id = %request.patient_id, error = %e, "Report save failed");
            PersistenceStatus::Error
        }
        Err(_) => {
            warn!(
                patient_id = %request.patient_id,
                timeout_ms = timeout.as_millis() as u64,
                "Report save timed out"
            );
            PersistenceStatus::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConfidenceScore, FusedScore, Severity, SourceReading};

    /// Store that accepts or rejects every report
    struct FixedStore {
        accept: bool,
    }

    #[async_trait]
    impl ReportStore for FixedStore {
        async fn save_report(&self, _: &SaveReportRequest) -> Result<Option<String>, StoreError> {
            if self.accept {
                Ok(Some("r-1".to_string()))
            } else {
                Err(StoreError::Rejected("duplicate".to_string()))
            }
        }
    }

    struct SlowStore;

    #[async_trait]
    impl ReportStore for SlowStore {
        async fn save_report(&self, _: &SaveReportRequest) -> Result<Option<String>, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
    }

    fn report() -> CombinedReport {
        CombinedReport {
            primary_label: "A".to_string(),
            fused_distribution: vec![FusedScore {
                label: "A".to_string(),
                combined_confidence: 65.0,
                eeg_confidence: 80.0,
                biometric_confidence: 30.0,
            }],
            conflict: Some(ConflictAnalysis {
                exists: true,
                severity: Severity::Moderate,
                recommendation: "review".to_string(),
            }),
            weights: FusionWeights {
                eeg: 0.7,
                biometric: 0.3,
            },
        }
    }

    fn complete_session() -> Session {
        let eeg = EegReading::new(1.0, 2.0, 3.0, 4.0, 5.0);
        let bio = BiometricReading::new(0.3, 97.0);
        let mut session = Session::new(Some("dr-1".to_string()));
        session.patient_id = Some("P-9".to_string());
        session.patient_name = Some("Ravi".to_string());
        session.patient_age = Some(41);
        session.eeg_reading = Some(eeg);
        session.biometric_reading = Some(bio);
        session.eeg_prediction = Some(Prediction::new(
            "A",
            vec![ConfidenceScore::new("A", 80.0)],
            SourceReading::Eeg(eeg),
        ));
        session.biometric_prediction = Some(Prediction::new(
            "B",
            vec![ConfidenceScore::new("B", 70.0)],
            SourceReading::Biometric(bio),
        ));
        session
    }

    fn request() -> SaveReportRequest {
        SaveReportRequest::from_session(&complete_session(), &report()).unwrap()
    }

    #[test]
    fn test_request_from_session() {
        let req = request();
        assert_eq!(req.patient_id, "P-9");
        assert_eq!(req.doctor_id.as_deref(), Some("dr-1"));
        assert_eq!(req.biometric_prediction.primary_prediction, "B");
        assert_eq!(req.combined_prediction.confidence_scores[0].confidence, 65.0);
        assert!(req.save);

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["combined_prediction"]["conflict_analysis"]["severity"], "moderate");
        assert_eq!(json["weights"]["eeg"], 0.7);
    }

    #[test]
    fn test_request_requires_complete_session() {
        let mut session = complete_session();
        session.biometric_prediction = None;
        assert!(SaveReportRequest::from_session(&session, &report()).is_none());
    }

    #[tokio::test]
    async fn test_persist_maps_outcomes() {
        let ok = FixedStore { accept: true };
        assert_eq!(persist_report(&ok, &request(), DEFAULT_SAVE_TIMEOUT).await, PersistenceStatus::Saved);

        let rejected = FixedStore { accept: false };
        assert_eq!(persist_report(&rejected, &request(), DEFAULT_SAVE_TIMEOUT).await, PersistenceStatus::Error);
    }

    #[tokio::test]
    async fn test_persist_times_out() {
        let status = persist_report(&SlowStore, &request(), Duration::from_millis(100)).await;
        assert_eq!(status, PersistenceStatus::Error);
    }
}
