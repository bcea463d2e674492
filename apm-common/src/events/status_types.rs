//! Status-related type definitions
//!
//! Supporting types shared between the session service and its event stream.

use serde::{Deserialize, Serialize};

/// Report persistence lifecycle
///
/// Transitions `Idle → Saving → {Saved | Error}`, each at most once per report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceStatus {
    /// No save attempted for the current report
    #[default]
    Idle,
    /// Save request in flight
    Saving,
    /// Store acknowledged the report
    Saved,
    /// Save failed (report remains usable)
    Error,
}

impl PersistenceStatus {
    /// True once the save has settled either way
    pub fn is_terminal(&self) -> bool {
        matches!(self, PersistenceStatus::Saved | PersistenceStatus::Error)
    }
}

impl std::fmt::Display for PersistenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceStatus::Idle => write!(f, "idle"),
            PersistenceStatus::Saving => write!(f, "saving"),
            PersistenceStatus::Saved => write!(f, "saved"),
            PersistenceStatus::Error => write!(f, "error"),
        }
    }
}

/// Sensor modality of a reading or prediction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// EEG band powers
    Eeg,
    /// GSR / SpO2 pair
    Biometric,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::Eeg => write!(f, "EEG"),
            Modality::Biometric => write!(f, "biometric"),
        }
    }
}
