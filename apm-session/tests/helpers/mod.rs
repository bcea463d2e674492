//! Test Helper Utilities
//!
//! A throwaway classifier/report-store service on an ephemeral port, plus
//! session configuration with short pacing delays.

#![allow(dead_code)]

use apm_common::config::{TimingConfig, TomlConfig};
use apm_session::config::{ConfigOverrides, SessionConfig};
use apm_session::models::{BiometricReading, EegReading, PatientIdentity, Session};
use apm_session::workflow::SessionHandle;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upper bound for waiting on asynchronous session progress
pub const WAIT: Duration = Duration::from_secs(5);

/// How the fake service answers
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub eeg_fails: bool,
    pub biometric_fails: bool,
    /// Answer `success: false` to saves
    pub save_rejects: bool,
    pub latest_eeg: Value,
    pub latest_biometric: Value,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            eeg_fails: false,
            biometric_fails: false,
            save_rejects: false,
            latest_eeg: json!({"status": "success", "data": {"avg": {
                "delta": 40.0, "theta": 8.0, "alpha": 20.0, "beta": 12.0, "gamma": 3.0
            }}}),
            latest_biometric: json!({"status": "success", "data": {"gsr": 0.29, "spo2": 97.5}}),
        }
    }
}

#[derive(Default)]
pub struct FakeState {
    pub behavior: Mutex<FakeBehavior>,
    /// Bodies received on /save_report
    pub saved: Mutex<Vec<Value>>,
    /// Bodies received on the predict endpoints
    pub classified: Mutex<Vec<Value>>,
}

/// Running fake service
pub struct FakeService {
    pub base_url: String,
    pub state: Arc<FakeState>,
}

impl FakeService {
    pub fn saved(&self) -> Vec<Value> {
        self.state.saved.lock().unwrap().clone()
    }

    pub fn classified(&self) -> Vec<Value> {
        self.state.classified.lock().unwrap().clone()
    }
}

async fn liveness() -> Json<Value> {
    Json(json!({"status": "success", "message": "Server is reachable"}))
}

async fn predict_eeg(
    State(state): State<Arc<FakeState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.classified.lock().unwrap().push(body);
    if state.behavior.lock().unwrap().eeg_fails {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "EEG model not loaded"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "primary_prediction": "Anxiety",
            "confidence_scores": [
                {"disorder": "Anxiety", "confidence": 80.0, "status": "✅", "note": "High"},
                {"disorder": "Depression", "confidence": 20.0, "status": "⚠️", "note": "Low"}
            ]
        })),
    )
}

async fn predict_combined(
    State(state): State<Arc<FakeState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.classified.lock().unwrap().push(body);
    if state.behavior.lock().unwrap().biometric_fails {
        // Application error reported inside a 2xx body
        return (StatusCode::OK, Json(json!({"error": "Biometric model not loaded"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "primary_prediction": "Depression",
            "confidence_scores": [
                {"disorder": "Depression", "confidence": 70.0},
                {"disorder": "Anxiety", "confidence": 30.0}
            ]
        })),
    )
}

async fn latest_avg_eeg(State(state): State<Arc<FakeState>>) -> Json<Value> {
    Json(state.behavior.lock().unwrap().latest_eeg.clone())
}

async fn latest_avg_biometric(State(state): State<Arc<FakeState>>) -> Json<Value> {
    Json(state.behavior.lock().unwrap().latest_biometric.clone())
}

async fn save_report(
    State(state): State<Arc<FakeState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if state.behavior.lock().unwrap().save_rejects {
        return Json(json!({"success": false, "message": "Patient not registered"}));
    }
    let mut saved = state.saved.lock().unwrap();
    saved.push(body);
    Json(json!({"success": true, "report_id": format!("r-{}", saved.len())}))
}

/// Start the fake service on 127.0.0.1:0
pub async fn spawn_fake_service(behavior: FakeBehavior) -> FakeService {
    let state = Arc::new(FakeState {
        behavior: Mutex::new(behavior),
        ..Default::default()
    });

    let app = Router::new()
        .route("/test", get(liveness))
        .route("/predict_eeg", post(predict_eeg))
        .route("/predict_combined", post(predict_combined))
        .route("/latest_avg_eeg", get(latest_avg_eeg))
        .route("/latest_avg_biometric", get(latest_avg_biometric))
        .route("/save_report", post(save_report))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeService {
        base_url: format!("http://{}", addr),
        state,
    }
}

/// Address nothing listens on
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Session config pointed at `base_url` with short pacing delays
pub fn fast_config(base_url: &str) -> SessionConfig {
    let toml = TomlConfig {
        timing: TimingConfig {
            connect_ms: Some(20),
            analyzing_ms: Some(40),
            fuse_ms: Some(20),
        },
        probe_timeout_ms: Some(500),
        save_timeout_ms: Some(2000),
        ..Default::default()
    };
    let overrides = ConfigOverrides {
        classifier_urls: vec![base_url.to_string()],
        doctor_id: Some("dr-test".to_string()),
        ..Default::default()
    };
    SessionConfig::resolve(overrides, &toml).unwrap()
}

pub fn identity() -> PatientIdentity {
    PatientIdentity {
        patient_id: "P-100".to_string(),
        name: "Meera".to_string(),
        age: 29,
        doctor_id: None,
    }
}

pub fn eeg_reading() -> EegReading {
    EegReading::new(40.0, 8.2, 20.1, 12.3, 3.4)
}

pub fn biometric_reading() -> BiometricReading {
    BiometricReading::new(0.2862, 98.2)
}

/// Wait for a state or fail the test
pub async fn wait_for<F>(handle: &SessionHandle, what: &str, predicate: F) -> Session
where
    F: Fn(&Session) -> bool,
{
    match handle.wait_until(WAIT, predicate).await {
        Some(session) => session,
        None => panic!("timed out waiting for {}: {:?}", what, handle.snapshot()),
    }
}
