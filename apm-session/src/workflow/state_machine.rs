//! Step session state machine
//!
//! Pure transition function: `(Session, Input) -> (Session, Effects)`.
//! Network calls, timers and persistence are described as [`Effect`]s and
//! carried out by the driver, which feeds their completions back as inputs
//! tagged with the session generation. Completions from an older generation
//! (before a restart) or for a step the session has left are ignored.

use crate::models::{
    AdvanceMode, BiometricReading, EegReading, Modality, PatientIdentity, PersistenceStatus,
    Prediction, Session, Step, StepId, StepPlan,
};
use crate::services::{fuse_predictions, FusionParams, SaveReportRequest};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything that can happen to a session
#[derive(Debug, Clone)]
pub enum Input {
    /// User confirmation on a manual step
    ConfirmStep,
    SubmitIdentity(PatientIdentity),
    SubmitEegReading(EegReading),
    SubmitBiometricReading(BiometricReading),
    /// Prefill the EEG form from the "latest average" endpoint
    FetchLatestEeg,
    FetchLatestBiometric,
    Restart,

    /// Pacing delay of a timed step elapsed
    TimerElapsed { generation: u64, step_index: usize },
    /// EEG classifier completed (`Err` carries the user-visible message)
    EegClassified {
        generation: u64,
        result: Result<Prediction, String>,
    },
    BiometricClassified {
        generation: u64,
        result: Result<Prediction, String>,
    },
    /// `Ok(None)` means the payload could not be normalized
    LatestEegFetched {
        generation: u64,
        result: Result<Option<EegReading>, String>,
    },
    LatestBiometricFetched {
        generation: u64,
        result: Result<Option<BiometricReading>, String>,
    },
    PersistenceStarted { generation: u64 },
    PersistenceFinished {
        generation: u64,
        status: PersistenceStatus,
    },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Replaces any running timer
    StartTimer {
        generation: u64,
        step_index: usize,
        delay: Duration,
    },
    CancelTimer,
    ClassifyEeg { generation: u64, reading: EegReading },
    ClassifyBiometric {
        generation: u64,
        reading: BiometricReading,
    },
    FetchLatestEeg { generation: u64 },
    FetchLatestBiometric { generation: u64 },
    PersistReport {
        generation: u64,
        request: Box<SaveReportRequest>,
    },
}

/// How an input was handled
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    /// No-op (wrong step, pending submission, stale completion, guard)
    Ignored(&'static str),
    /// Validation failure; message is also stored in `Session::error`
    Rejected(String),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// Result of one transition
#[derive(Debug, Clone)]
pub struct Transition {
    pub session: Session,
    pub effects: Vec<Effect>,
    pub outcome: Outcome,
}

impl Transition {
    fn ignored(session: &Session, reason: &'static str) -> Self {
        debug!(session_id = %session.session_id, reason, "Input ignored");
        Self {
            session: session.clone(),
            effects: Vec::new(),
            outcome: Outcome::Ignored(reason),
        }
    }
}

/// Read-only view handed to presentation
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub step: Step,
    pub step_count: usize,
    /// Manual confirmation currently possible
    pub can_confirm: bool,
}

/// Step sequencing rules over a fixed plan
#[derive(Debug, Clone)]
pub struct StateMachine {
    plan: StepPlan,
    fusion: FusionParams,
}

impl StateMachine {
    pub fn new(plan: StepPlan, fusion: FusionParams) -> Self {
        Self { plan, fusion }
    }

    pub fn plan(&self) -> &StepPlan {
        &self.plan
    }

    /// Current step descriptor
    pub fn current_step(&self, session: &Session) -> Step {
        self.step_at(session.current_step_index)
    }

    fn step_at(&self, index: usize) -> Step {
        match self.plan.step(index) {
            Some(step) => *step,
            None => *self.plan.steps().last().unwrap_or(&Step {
                id: StepId::ShowFinal,
                mode: AdvanceMode::Manual,
                duration_ms: None,
            }),
        }
    }

    fn current_id(&self, session: &Session) -> StepId {
        self.current_step(session).id
    }

    pub fn view(&self, session: &Session) -> SessionView {
        SessionView {
            session: session.clone(),
            step: self.current_step(session),
            step_count: self.plan.len(),
            can_confirm: self.confirm_blocker(session).is_none(),
        }
    }

    /// Why a confirmation would be ignored right now, if it would
    fn confirm_blocker(&self, session: &Session) -> Option<&'static str> {
        if session.pending.is_some() {
            return Some("submission pending");
        }
        if self.current_step(session).mode != AdvanceMode::Manual {
            return Some("step does not advance on confirmation");
        }
        let next = session.current_step_index + 1;
        if next > self.plan.last_index() {
            return Some("final step");
        }
        if StepId::from_index(next) == Some(StepId::Fuse) && !session.has_both_predictions() {
            return Some("fusion requires both predictions");
        }
        None
    }

    /// Apply one input
    pub fn transition(&self, session: &Session, input: Input) -> Transition {
        let mut next = session.clone();
        let mut effects = Vec::new();

        let outcome = match input {
            Input::ConfirmStep => match self.confirm_blocker(session) {
                Some(reason) => return Transition::ignored(session, reason),
                None => {
                    self.enter(&mut next, session.current_step_index + 1, &mut effects);
                    Outcome::Applied
                }
            },

            Input::SubmitIdentity(identity) => {
                if self.current_id(session) != StepId::IdentifyPatient {
                    return Transition::ignored(session, "not on identification step");
                }
                match identity.validate() {
                    Err(e) => {
                        next.error = Some(e.to_string());
                        Outcome::Rejected(e.to_string())
                    }
                    Ok(()) => {
                        next.patient_id = Some(identity.patient_id.trim().to_string());
                        next.patient_name = Some(identity.name.trim().to_string());
                        next.patient_age = Some(identity.age);
                        if let Some(doctor_id) = identity.doctor_id.filter(|d| !d.trim().is_empty()) {
                            next.doctor_id = Some(doctor_id);
                        }
                        self.enter(&mut next, session.current_step_index + 1, &mut effects);
                        Outcome::Applied
                    }
                }
            }

            Input::SubmitEegReading(reading) => {
                if let Some(reason) = self.form_blocker(session, StepId::InputEeg) {
                    return Transition::ignored(session, reason);
                }
                match reading.validate() {
                    Err(e) => {
                        next.error = Some(e.to_string());
                        Outcome::Rejected(e.to_string())
                    }
                    Ok(()) => {
                        next.eeg_reading = Some(reading);
                        next.eeg_prediction = None;
                        next.pending = Some(Modality::Eeg);
                        self.enter(&mut next, StepId::AnalyzingEeg.index(), &mut effects);
                        effects.push(Effect::ClassifyEeg {
                            generation: session.generation,
                            reading,
                        });
                        Outcome::Applied
                    }
                }
            }

            Input::SubmitBiometricReading(reading) => {
                if let Some(reason) = self.form_blocker(session, StepId::InputBiometric) {
                    return Transition::ignored(session, reason);
                }
                match reading.validate() {
                    Err(e) => {
                        next.error = Some(e.to_string());
                        Outcome::Rejected(e.to_string())
                    }
                    Ok(()) => {
                        next.biometric_reading = Some(reading);
                        next.biometric_prediction = None;
                        next.pending = Some(Modality::Biometric);
                        self.enter(&mut next, StepId::AnalyzingBiometric.index(), &mut effects);
                        effects.push(Effect::ClassifyBiometric {
                            generation: session.generation,
                            reading,
                        });
                        Outcome::Applied
                    }
                }
            }

            Input::FetchLatestEeg => {
                if let Some(reason) = self.form_blocker(session, StepId::InputEeg) {
                    return Transition::ignored(session, reason);
                }
                next.notice = None;
                effects.push(Effect::FetchLatestEeg {
                    generation: session.generation,
                });
                Outcome::Applied
            }

            Input::FetchLatestBiometric => {
                if let Some(reason) = self.form_blocker(session, StepId::InputBiometric) {
                    return Transition::ignored(session, reason);
                }
                next.notice = None;
                effects.push(Effect::FetchLatestBiometric {
                    generation: session.generation,
                });
                Outcome::Applied
            }

            Input::Restart => {
                next = session.restarted();
                effects.push(Effect::CancelTimer);
                Outcome::Applied
            }

            Input::TimerElapsed {
                generation,
                step_index,
            } => {
                if generation != session.generation || step_index != session.current_step_index {
                    return Transition::ignored(session, "stale timer");
                }
                match self.current_id(session) {
                    StepId::Connect | StepId::Fuse => {
                        self.enter(&mut next, step_index + 1, &mut effects);
                    }
                    StepId::AnalyzingEeg | StepId::AnalyzingBiometric => {
                        next.pacing_elapsed = true;
                        self.finish_analysis_if_ready(&mut next, &mut effects);
                    }
                    _ => return Transition::ignored(session, "step is not timed"),
                }
                Outcome::Applied
            }

            Input::EegClassified { generation, result } => {
                if generation != session.generation || session.pending != Some(Modality::Eeg) {
                    return Transition::ignored(session, "stale classification");
                }
                next.pending = None;
                match result {
                    Ok(prediction) => {
                        next.eeg_prediction = Some(prediction);
                        self.finish_analysis_if_ready(&mut next, &mut effects);
                    }
                    Err(message) => self.roll_back(&mut next, StepId::InputEeg, message, &mut effects),
                }
                Outcome::Applied
            }

            Input::BiometricClassified { generation, result } => {
                if generation != session.generation
                    || session.pending != Some(Modality::Biometric)
                {
                    return Transition::ignored(session, "stale classification");
                }
                next.pending = None;
                match result {
                    Ok(prediction) => {
                        next.biometric_prediction = Some(prediction);
                        self.finish_analysis_if_ready(&mut next, &mut effects);
                    }
                    Err(message) => {
                        self.roll_back(&mut next, StepId::InputBiometric, message, &mut effects)
                    }
                }
                Outcome::Applied
            }

            Input::LatestEegFetched { generation, result } => {
                // The user may have submitted or moved on while the fetch ran
                if generation != session.generation
                    || self.form_blocker(session, StepId::InputEeg).is_some()
                {
                    return Transition::ignored(session, "stale fetch");
                }
                match result {
                    Ok(Some(reading)) => next.eeg_draft = Some(reading),
                    Ok(None) => {
                        next.notice = Some(
                            "Could not parse the latest EEG averages; enter the values manually"
                                .to_string(),
                        )
                    }
                    Err(message) => {
                        next.notice = Some(format!("Latest EEG averages unavailable: {}", message))
                    }
                }
                Outcome::Applied
            }

            Input::LatestBiometricFetched { generation, result } => {
                // The user may have submitted or moved on while the fetch ran
                if generation != session.generation
                    || self.form_blocker(session, StepId::InputBiometric).is_some()
                {
                    return Transition::ignored(session, "stale fetch");
                }
                match result {
                    Ok(Some(reading)) => next.biometric_draft = Some(reading),
                    Ok(None) => {
                        next.notice = Some(
                            "Could not parse the latest biometric averages; enter the values manually"
                                .to_string(),
                        )
                    }
                    Err(message) => {
                        next.notice =
                            Some(format!("Latest biometric averages unavailable: {}", message))
                    }
                }
                Outcome::Applied
            }

            Input::PersistenceStarted { generation } => {
                if generation != session.generation
                    || session.combined_report.is_none()
                    || session.save_status != PersistenceStatus::Idle
                {
                    return Transition::ignored(session, "persistence not startable");
                }
                next.save_status = PersistenceStatus::Saving;
                Outcome::Applied
            }

            Input::PersistenceFinished { generation, status } => {
                if generation != session.generation
                    || session.save_status != PersistenceStatus::Saving
                    || !status.is_terminal()
                {
                    return Transition::ignored(session, "stale persistence result");
                }
                next.save_status = status;
                Outcome::Applied
            }
        };

        Transition {
            session: next,
            effects,
            outcome,
        }
    }

    /// Why a form action on `step` would be ignored right now, if it would
    fn form_blocker(&self, session: &Session, step: StepId) -> Option<&'static str> {
        if session.pending.is_some() {
            Some("submission pending")
        } else if self.current_id(session) != step {
            Some("not on the matching input step")
        } else {
            None
        }
    }

    /// Move to `index`, starting its timer and building the report on fuse
    fn enter(&self, session: &mut Session, index: usize, effects: &mut Vec<Effect>) {
        let step = self.step_at(index);
        session.current_step_index = index;
        session.pacing_elapsed = false;
        session.error = None;

        if step.id == StepId::Fuse {
            self.build_report(session, effects);
        }

        if let Some(delay) = step.duration() {
            effects.push(Effect::StartTimer {
                generation: session.generation,
                step_index: index,
                delay,
            });
        }
    }

    /// Fuse both predictions and request persistence
    fn build_report(&self, session: &mut Session, effects: &mut Vec<Effect>) {
        let (Some(eeg), Some(biometric)) = (&session.eeg_prediction, &session.biometric_prediction)
        else {
            return;
        };

        let report = fuse_predictions(eeg, biometric, &self.fusion);
        match SaveReportRequest::from_session(session, &report) {
            Some(request) => effects.push(Effect::PersistReport {
                generation: session.generation,
                request: Box::new(request),
            }),
            None => warn!(
                session_id = %session.session_id,
                "Report built without complete identity, skipping persistence"
            ),
        }
        session.combined_report = Some(report);
    }

    /// Advance from an analyzing step once pacing and prediction are both done
    fn finish_analysis_if_ready(&self, session: &mut Session, effects: &mut Vec<Effect>) {
        let (modality, result_step) = match self.current_id(session) {
            StepId::AnalyzingEeg => (Modality::Eeg, StepId::ShowEegResult),
            StepId::AnalyzingBiometric => (Modality::Biometric, StepId::ShowBiometricResult),
            _ => return,
        };
        if session.pacing_elapsed && session.prediction(modality).is_some() {
            self.enter(session, result_step.index(), effects);
        }
    }

    fn roll_back(
        &self,
        session: &mut Session,
        input_step: StepId,
        message: String,
        effects: &mut Vec<Effect>,
    ) {
        warn!(
            session_id = %session.session_id,
            step = %input_step,
            error = %message,
            "Submission failed, returning to input step"
        );
        session.current_step_index = input_step.index();
        session.pacing_elapsed = false;
        session.error = Some(message);
        effects.push(Effect::CancelTimer);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(StepPlan::default(), FusionParams::default())
    }
}
