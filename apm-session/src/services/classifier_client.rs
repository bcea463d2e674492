//! Remote classifier client
//!
//! EEG readings go to `POST {base}/predict_eeg`, biometric readings to
//! `POST {base}/predict_combined`. Both answer with
//! `{primary_prediction, confidence_scores: [{disorder, confidence, ...}], error?}`.
//! The "latest average" endpoints return arbitrary JSON which is handed to the
//! reading normalizer untouched.

use crate::models::{BiometricReading, ConfidenceScore, EegReading, Prediction, SourceReading};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default per-request timeout for classifier calls
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Classifier client errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Service unreachable or connection dropped
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// Non-2xx response
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// 2xx response carrying an `error` field
    #[error("Classifier error: {0}")]
    Service(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ClassifierError {
    /// Message shown to the user when a submission fails
    pub fn user_message(&self) -> String {
        match self {
            ClassifierError::Network(_) | ClassifierError::Timeout => {
                "Could not reach the analysis server. Check that it is running and try again."
                    .to_string()
            }
            ClassifierError::Api(_, message) | ClassifierError::Service(message) => {
                format!("Analysis failed: {}", message)
            }
            ClassifierError::Parse(_) => {
                "The analysis server returned an unexpected response.".to_string()
            }
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClassifierError::Timeout
        } else if e.is_decode() {
            ClassifierError::Parse(e.to_string())
        } else {
            ClassifierError::Network(e.to_string())
        }
    }
}

/// Remote classification and "latest average" access
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify_eeg(&self, reading: EegReading) -> Result<Prediction, ClassifierError>;

    async fn classify_biometric(
        &self,
        reading: BiometricReading,
    ) -> Result<Prediction, ClassifierError>;

    /// Raw payload of `GET {base}/latest_avg_eeg`
    async fn latest_eeg_payload(&self) -> Result<Value, ClassifierError>;

    /// Raw payload of `GET {base}/latest_avg_biometric`
    async fn latest_biometric_payload(&self) -> Result<Value, ClassifierError>;
}

/// Wire format of one confidence entry
#[derive(Debug, Deserialize)]
struct WireScore {
    #[serde(alias = "label")]
    disorder: String,
    confidence: Value,
}

/// Wire format of a classifier response
#[derive(Debug, Deserialize)]
struct WirePrediction {
    #[serde(default)]
    primary_prediction: Option<String>,
    #[serde(default)]
    confidence_scores: Vec<WireScore>,
    #[serde(default)]
    error: Option<String>,
}

/// Request body for `/predict_eeg`
#[derive(Debug, Serialize)]
struct EegRequest {
    delta: f64,
    theta: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
}

/// Confidence as sent by the service: a number or a numeric string, optionally with `%`
fn parse_confidence(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

/// Convert a decoded classifier body into a Prediction
fn into_prediction(
    wire: WirePrediction,
    source: SourceReading,
) -> Result<Prediction, ClassifierError> {
    if let Some(error) = wire.error.filter(|e| !e.trim().is_empty()) {
        return Err(ClassifierError::Service(error));
    }

    let mut distribution = Vec::with_capacity(wire.confidence_scores.len());
    for score in wire.confidence_scores {
        let confidence = parse_confidence(&score.confidence).ok_or_else(|| {
            ClassifierError::Parse(format!("Invalid confidence for '{}'", score.disorder))
        })?;
        distribution.push(ConfidenceScore::new(score.disorder, confidence));
    }

    let label = wire.primary_prediction.unwrap_or_default();
    if label.trim().is_empty() && distribution.is_empty() {
        return Err(ClassifierError::Parse(
            "Response carries neither a prediction nor confidence scores".to_string(),
        ));
    }

    Ok(Prediction::new(label, distribution, source))
}

/// Pull a message out of a non-2xx body (`{"error": "..."}` or plain text)
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// HTTP classifier client bound to the resolved base
pub struct HttpClassifierClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpClassifierClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }

    async fn post_prediction<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        source: SourceReading,
    ) -> Result<Prediction, ClassifierError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Submitting reading to classifier");

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(ClassifierError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(url = %url, status = %status, "Classifier returned error status");
            return Err(ClassifierError::Api(status.as_u16(), error_message(&error_text)));
        }

        let wire: WirePrediction = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;

        let prediction = into_prediction(wire, source)?;
        info!(
            modality = %prediction.modality(),
            label = %prediction.label(),
            scores = prediction.distribution().len(),
            "Received prediction"
        );
        Ok(prediction)
    }

    async fn get_payload(&self, path: &str) -> Result<Value, ClassifierError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Fetching latest average");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(ClassifierError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api(status.as_u16(), error_message(&error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Classifier for HttpClassifierClient {
    async fn classify_eeg(&self, reading: EegReading) -> Result<Prediction, ClassifierError> {
        let [delta, theta, alpha, beta, gamma] = reading.bands();
        let missing = |band: &str| ClassifierError::Parse(format!("Missing {} band", band));
        let body = EegRequest {
            delta: delta.ok_or_else(|| missing("delta"))?,
            theta: theta.ok_or_else(|| missing("theta"))?,
            alpha: alpha.ok_or_else(|| missing("alpha"))?,
            beta: beta.ok_or_else(|| missing("beta"))?,
            gamma: gamma.ok_or_else(|| missing("gamma"))?,
        };
        self.post_prediction("/predict_eeg", &body, SourceReading::Eeg(reading))
            .await
    }

    async fn classify_biometric(
        &self,
        reading: BiometricReading,
    ) -> Result<Prediction, ClassifierError> {
        self.post_prediction(
            "/predict_combined",
            &reading,
            SourceReading::Biometric(reading),
        )
        .await
    }

    async fn latest_eeg_payload(&self) -> Result<Value, ClassifierError> {
        self.get_payload("/latest_avg_eeg").await
    }

    async fn latest_biometric_payload(&self) -> Result<Value, ClassifierError> {
        self.get_payload("/latest_avg_biometric").await
    }
}
