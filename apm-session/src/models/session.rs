//! Assessment session (in-memory state)
//!
//! Created at session start, mutated only by the state machine, and reset
//! wholesale on restart.

use super::prediction::Prediction;
use super::reading::{BiometricReading, EegReading};
use super::report::CombinedReport;
use apm_common::events::{Modality, PersistenceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Oldest accepted patient age
pub const MAX_PATIENT_AGE: u32 = 120;

/// Identification validation errors
#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("Patient ID is required")]
    MissingId,

    #[error("Patient name is required")]
    MissingName,

    #[error("Patient age must be between 1 and {MAX_PATIENT_AGE}, got {0}")]
    AgeOutOfRange(u32),
}

/// Identification submitted on the first step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientIdentity {
    pub patient_id: String,
    pub name: String,
    pub age: u32,
    /// Overrides the configured doctor for this session
    #[serde(default)]
    pub doctor_id: Option<String>,
}

impl PatientIdentity {
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.patient_id.trim().is_empty() {
            return Err(IdentityError::MissingId);
        }
        if self.name.trim().is_empty() {
            return Err(IdentityError::MissingName);
        }
        if !(1..=MAX_PATIENT_AGE).contains(&self.age) {
            return Err(IdentityError::AgeOutOfRange(self.age));
        }
        Ok(())
    }
}

/// Session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable for the lifetime of the interaction
    pub session_id: Uuid,

    /// Incremented on restart; tags timers and network completions
    pub generation: u64,

    pub current_step_index: usize,

    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_age: Option<u32>,
    /// Doctor attached to saved reports; a per-patient override replaces it
    pub doctor_id: Option<String>,
    /// Doctor from configuration, restored on restart
    pub configured_doctor_id: Option<String>,

    /// Last submitted readings (preserved across a failed submission)
    pub eeg_reading: Option<EegReading>,
    pub biometric_reading: Option<BiometricReading>,

    /// Prefill from the "latest average" endpoints
    pub eeg_draft: Option<EegReading>,
    pub biometric_draft: Option<BiometricReading>,

    pub eeg_prediction: Option<Prediction>,
    pub biometric_prediction: Option<Prediction>,
    pub combined_report: Option<CombinedReport>,

    /// User-visible error from the last failed action
    pub error: Option<String>,
    /// Non-fatal notice (e.g. latest-average payload not understood)
    pub notice: Option<String>,

    pub save_status: PersistenceStatus,

    /// Classifier submission in flight
    pub pending: Option<Modality>,
    /// Pacing delay of the current analyzing step has elapsed
    pub pacing_elapsed: bool,

    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Create new session at step 0
    pub fn new(doctor_id: Option<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            generation: 0,
            current_step_index: 0,
            patient_id: None,
            patient_name: None,
            patient_age: None,
            doctor_id: doctor_id.clone(),
            configured_doctor_id: doctor_id,
            eeg_reading: None,
            biometric_reading: None,
            eeg_draft: None,
            biometric_draft: None,
            eeg_prediction: None,
            biometric_prediction: None,
            combined_report: None,
            error: None,
            notice: None,
            save_status: PersistenceStatus::Idle,
            pending: None,
            pacing_elapsed: false,
            started_at: Utc::now(),
        }
    }

    /// Fresh state for a restart
    ///
    /// Keeps the session id and configured doctor, bumps the generation,
    /// clears everything else (including a per-patient doctor override).
    pub fn restarted(&self) -> Self {
        Self {
            session_id: self.session_id,
            generation: self.generation + 1,
            ..Self::new(self.configured_doctor_id.clone())
        }
    }

    pub fn has_both_predictions(&self) -> bool {
        self.eeg_prediction.is_some() && self.biometric_prediction.is_some()
    }

    pub fn prediction(&self, modality: Modality) -> Option<&Prediction> {
        match modality {
            Modality::Eeg => self.eeg_prediction.as_ref(),
            Modality::Biometric => self.biometric_prediction.as_ref(),
        }
    }

    /// Identity as submitted, once the first step has been passed
    pub fn identity(&self) -> Option<PatientIdentity> {
        Some(PatientIdentity {
            patient_id: self.patient_id.clone()?,
            name: self.patient_name.clone()?,
            age: self.patient_age?,
            doctor_id: self.doctor_id.clone(),
        })
    }
}
