//! Assessment step plan
//!
//! Twelve ordered steps, each with exactly one advance mode:
//! IDENTIFY → SETUP → CONNECT → INPUT_EEG → ANALYZING_EEG → EEG_RESULT →
//! BIOMETRIC_SETUP → INPUT_BIOMETRIC → ANALYZING_BIOMETRIC → BIOMETRIC_RESULT →
//! FUSE → FINAL

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Step identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    IdentifyPatient,
    Setup,
    Connect,
    InputEeg,
    AnalyzingEeg,
    ShowEegResult,
    SetupBiometric,
    InputBiometric,
    AnalyzingBiometric,
    ShowBiometricResult,
    Fuse,
    ShowFinal,
}

impl StepId {
    /// All steps in session order
    pub const ALL: [StepId; 12] = [
        StepId::IdentifyPatient,
        StepId::Setup,
        StepId::Connect,
        StepId::InputEeg,
        StepId::AnalyzingEeg,
        StepId::ShowEegResult,
        StepId::SetupBiometric,
        StepId::InputBiometric,
        StepId::AnalyzingBiometric,
        StepId::ShowBiometricResult,
        StepId::Fuse,
        StepId::ShowFinal,
    ];

    /// Position in the session order
    pub fn index(self) -> usize {
        // ALL is exhaustive, so the lookup always succeeds
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<StepId> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepId::IdentifyPatient => "identify-patient",
            StepId::Setup => "setup",
            StepId::Connect => "connect",
            StepId::InputEeg => "input-eeg",
            StepId::AnalyzingEeg => "analyzing-eeg",
            StepId::ShowEegResult => "show-eeg-result",
            StepId::SetupBiometric => "setup-biometric",
            StepId::InputBiometric => "input-biometric",
            StepId::AnalyzingBiometric => "analyzing-biometric",
            StepId::ShowBiometricResult => "show-biometric-result",
            StepId::Fuse => "fuse",
            StepId::ShowFinal => "show-final",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a step advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvanceMode {
    /// Explicit user confirmation
    Manual,
    /// Automatic after a fixed pacing delay
    Timed,
    /// Validated submission
    Form,
}

/// Immutable step descriptor exposed to presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub mode: AdvanceMode,
    /// Present for timed steps only
    pub duration_ms: Option<u64>,
}

impl Step {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }
}

/// Pacing delays for the timed steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTiming {
    pub connect: Duration,
    pub analyzing: Duration,
    pub fuse: Duration,
}

pub const DEFAULT_CONNECT_MS: u64 = 3000;
pub const DEFAULT_ANALYZING_MS: u64 = 4000;
pub const DEFAULT_FUSE_MS: u64 = 1500;

impl Default for StepTiming {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(DEFAULT_CONNECT_MS),
            analyzing: Duration::from_millis(DEFAULT_ANALYZING_MS),
            fuse: Duration::from_millis(DEFAULT_FUSE_MS),
        }
    }
}

impl StepTiming {
    /// Same delay for every timed step (tests)
    pub fn uniform(delay: Duration) -> Self {
        Self {
            connect: delay,
            analyzing: delay,
            fuse: delay,
        }
    }
}

/// The ordered step table with its timing
#[derive(Debug, Clone)]
pub struct StepPlan {
    steps: Vec<Step>,
}

impl StepPlan {
    pub fn new(timing: StepTiming) -> Self {
        let steps = StepId::ALL
            .iter()
            .map(|&id| {
                let (mode, duration) = match id {
                    StepId::IdentifyPatient | StepId::InputEeg | StepId::InputBiometric => {
                        (AdvanceMode::Form, None)
                    }
                    StepId::Connect => (AdvanceMode::Timed, Some(timing.connect)),
                    StepId::AnalyzingEeg | StepId::AnalyzingBiometric => {
                        (AdvanceMode::Timed, Some(timing.analyzing))
                    }
                    StepId::Fuse => (AdvanceMode::Timed, Some(timing.fuse)),
                    StepId::Setup
                    | StepId::ShowEegResult
                    | StepId::SetupBiometric
                    | StepId::ShowBiometricResult
                    | StepId::ShowFinal => (AdvanceMode::Manual, None),
                };
                Step {
                    id,
                    mode,
                    duration_ms: duration.map(|d| d.as_millis() as u64),
                }
            })
            .collect();
        Self { steps }
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl Default for StepPlan {
    fn default() -> Self {
        Self::new(StepTiming::default())
    }
}
