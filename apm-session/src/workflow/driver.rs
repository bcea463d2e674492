//! Async session driver
//!
//! One tokio task owns the [`Session`]. User actions and effect completions
//! arrive as commands over an mpsc channel and are applied through the
//! [`StateMachine`]; every resulting state is published on a `watch` channel
//! and the differences are broadcast as [`SessionEvent`]s. Effects run as
//! spawned tasks that post their completion back as another command.

use super::state_machine::{Effect, Input, Outcome, SessionView, StateMachine};
use crate::models::{Modality, Session, StepPlan};
use crate::services::{normalize_biometric, normalize_eeg, persist_report, Classifier, ReportStore};
use apm_common::events::{EventBus, SessionEvent};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Session driver has stopped")]
    Stopped,
}

/// Remote collaborators used to carry out effects
#[derive(Clone)]
pub struct SessionDeps {
    pub classifier: Arc<dyn Classifier>,
    pub store: Arc<dyn ReportStore>,
    pub save_timeout: Duration,
}

/// Answer to a dispatched input
#[derive(Debug, Clone)]
pub struct Reply {
    pub session: Session,
    pub outcome: Outcome,
}

struct Command {
    input: Input,
    reply: Option<oneshot::Sender<Reply>>,
}

/// Cloneable handle to a running session driver
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Session>,
    machine: Arc<StateMachine>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Apply an input and wait for the resulting state
    pub async fn dispatch(&self, input: Input) -> Result<Reply, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command {
                input,
                reply: Some(tx),
            })
            .await
            .map_err(|_| DriverError::Stopped)?;
        rx.await.map_err(|_| DriverError::Stopped)
    }

    /// Latest published session state
    pub fn snapshot(&self) -> Session {
        self.snapshot.borrow().clone()
    }

    pub fn view(&self) -> SessionView {
        self.machine.view(&self.snapshot.borrow())
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Wait until the published state satisfies `predicate`
    ///
    /// Returns `None` on timeout or when the driver stops.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> Option<Session>
    where
        F: Fn(&Session) -> bool,
    {
        let mut rx = self.snapshot.clone();
        tokio::time::timeout(timeout, async move {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if predicate(&current) {
                        return Some(current.clone());
                    }
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Stop the driver and any running timer
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Start a driver task for a new session
pub fn spawn_session(
    machine: StateMachine,
    deps: SessionDeps,
    event_bus: EventBus,
    doctor_id: Option<String>,
) -> (SessionHandle, JoinHandle<()>) {
    let machine = Arc::new(machine);
    let session = Session::new(doctor_id);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(session.clone());
    let shutdown = CancellationToken::new();

    info!(session_id = %session.session_id, "Session started");

    let driver = Driver {
        machine: Arc::clone(&machine),
        deps,
        event_bus,
        session,
        snapshot_tx,
        command_tx: command_tx.clone(),
        timer: None,
        shutdown: shutdown.clone(),
    };
    let join = tokio::spawn(driver.run(command_rx));

    let handle = SessionHandle {
        commands: command_tx,
        snapshot: snapshot_rx,
        machine,
        shutdown,
    };
    (handle, join)
}

struct Driver {
    machine: Arc<StateMachine>,
    deps: SessionDeps,
    event_bus: EventBus,
    session: Session,
    snapshot_tx: watch::Sender<Session>,
    /// Effects post completions back through this
    command_tx: mpsc::Sender<Command>,
    timer: Option<CancellationToken>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        self.cancel_timer();
        info!(session_id = %self.session.session_id, "Session driver stopped");
    }

    fn handle(&mut self, command: Command) {
        let outcome = self.apply(command.input);
        if let Some(reply) = command.reply {
            // Caller may have gone away
            let _ = reply.send(Reply {
                session: self.session.clone(),
                outcome,
            });
        }
    }

    /// Transition, publish, then perform effects
    fn apply(&mut self, input: Input) -> Outcome {
        let transition = self.machine.transition(&self.session, input);
        let old = std::mem::replace(&mut self.session, transition.session);

        if old != self.session {
            for event in session_events(&old, &self.session, self.machine.plan()) {
                debug!(event = event.event_type(), "Emitting session event");
                self.event_bus.emit_lossy(event);
            }
            self.snapshot_tx.send_replace(self.session.clone());
        }

        for effect in transition.effects {
            self.perform(effect);
        }
        transition.outcome
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::StartTimer {
                generation,
                step_index,
                delay,
            } => self.start_timer(generation, step_index, delay),

            Effect::CancelTimer => self.cancel_timer(),

            Effect::ClassifyEeg { generation, reading } => {
                let classifier = Arc::clone(&self.deps.classifier);
                self.spawn_completion(async move {
                    let result = classifier
                        .classify_eeg(reading)
                        .await
                        .map_err(|e| e.user_message());
                    Input::EegClassified { generation, result }
                });
            }

            Effect::ClassifyBiometric { generation, reading } => {
                let classifier = Arc::clone(&self.deps.classifier);
                self.spawn_completion(async move {
                    let result = classifier
                        .classify_biometric(reading)
                        .await
                        .map_err(|e| e.user_message());
                    Input::BiometricClassified { generation, result }
                });
            }

            Effect::FetchLatestEeg { generation } => {
                let classifier = Arc::clone(&self.deps.classifier);
                self.spawn_completion(async move {
                    let result = classifier
                        .latest_eeg_payload()
                        .await
                        .map(|payload| normalize_eeg(&payload))
                        .map_err(|e| e.to_string());
                    Input::LatestEegFetched { generation, result }
                });
            }

            Effect::FetchLatestBiometric { generation } => {
                let classifier = Arc::clone(&self.deps.classifier);
                self.spawn_completion(async move {
                    let result = classifier
                        .latest_biometric_payload()
                        .await
                        .map(|payload| normalize_biometric(&payload))
                        .map_err(|e| e.to_string());
                    Input::LatestBiometricFetched { generation, result }
                });
            }

            Effect::PersistReport {
                generation,
                request,
            } => {
                // The report is already published; only now mark saving
                if !self.apply(Input::PersistenceStarted { generation }).is_applied() {
                    return;
                }
                let store = Arc::clone(&self.deps.store);
                let timeout = self.deps.save_timeout;
                self.spawn_completion(async move {
                    let status = persist_report(store.as_ref(), &request, timeout).await;
                    Input::PersistenceFinished { generation, status }
                });
            }
        }
    }

    /// Run `work` in the background and feed its input back to the driver
    fn spawn_completion<F>(&self, work: F)
    where
        F: std::future::Future<Output = Input> + Send + 'static,
    {
        let commands = self.command_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let input = tokio::select! {
                _ = shutdown.cancelled() => return,
                input = work => input,
            };
            if commands.send(Command { input, reply: None }).await.is_err() {
                debug!("Driver gone, dropping completion");
            }
        });
    }

    fn start_timer(&mut self, generation: u64, step_index: usize, delay: Duration) {
        self.cancel_timer();
        let token = self.shutdown.child_token();
        self.timer = Some(token.clone());

        let commands = self.command_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let input = Input::TimerElapsed { generation, step_index };
                    if commands.send(Command { input, reply: None }).await.is_err() {
                        debug!("Driver gone, dropping timer");
                    }
                }
            }
        });
    }

    fn cancel_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

/// Events describing the change from `old` to `new`
pub fn session_events(old: &Session, new: &Session, plan: &StepPlan) -> Vec<SessionEvent> {
    let session_id = new.session_id;
    let timestamp = Utc::now();
    let mut events = Vec::new();

    if new.generation != old.generation {
        info!(session_id = %session_id, generation = new.generation, "Session restarted");
        events.push(SessionEvent::SessionRestarted {
            session_id,
            timestamp,
        });
    } else {
        for modality in [Modality::Eeg, Modality::Biometric] {
            if let (None, Some(prediction)) = (old.prediction(modality), new.prediction(modality)) {
                events.push(SessionEvent::PredictionReceived {
                    session_id,
                    modality,
                    label: prediction.top_label().unwrap_or_default().to_string(),
                    timestamp,
                });
            }
        }

        if let (Some(modality), None, Some(message)) = (old.pending, new.pending, &new.error) {
            if new.prediction(modality).is_none() {
                events.push(SessionEvent::SubmissionFailed {
                    session_id,
                    modality,
                    message: message.clone(),
                    timestamp,
                });
            }
        }
    }

    if new.current_step_index != old.current_step_index {
        let step_id = plan
            .step(new.current_step_index)
            .map(|s| s.id.to_string())
            .unwrap_or_default();
        info!(
            session_id = %session_id,
            from = old.current_step_index,
            to = new.current_step_index,
            step = %step_id,
            "Step changed"
        );
        events.push(SessionEvent::StepChanged {
            session_id,
            old_index: old.current_step_index,
            new_index: new.current_step_index,
            step_id,
            timestamp,
        });
    }

    if new.generation == old.generation {
        if let (None, Some(report)) = (&old.combined_report, &new.combined_report) {
            events.push(SessionEvent::ReportReady {
                session_id,
                primary_label: report.primary_label.clone(),
                conflict: report.has_conflict(),
                timestamp,
            });
        }

        if new.save_status != old.save_status {
            events.push(SessionEvent::SaveStatusChanged {
                session_id,
                old_status: old.save_status,
                new_status: new.save_status,
                timestamp,
            });
        }

        if let Some(message) = new.notice.as_ref().filter(|n| old.notice.as_ref() != Some(*n)) {
            warn!(session_id = %session_id, notice = %message, "Session notice");
            events.push(SessionEvent::NoticeRaised {
                session_id,
                message: message.clone(),
                timestamp,
            });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CombinedReport, ConfidenceScore, EegReading, FusionWeights, PersistenceStatus, Prediction,
        SourceReading,
    };

    fn names(events: &[SessionEvent]) -> Vec<&'static str> {
        events.iter().map(SessionEvent::event_type).collect()
    }

    #[test]
    fn test_no_change_no_events() {
        let s = Session::new(None);
        assert!(session_events(&s, &s.clone(), &StepPlan::default()).is_empty());
    }

    #[test]
    fn test_prediction_and_step_events() {
        let old = {
            let mut s = Session::new(None);
            s.current_step_index = 4;
            s.pending = Some(Modality::Eeg);
            s.pacing_elapsed = true;
            s
        };
        let mut new = old.clone();
        new.pending = None;
        new.current_step_index = 5;
        new.eeg_prediction = Some(Prediction::new(
            "Anxiety",
            vec![ConfidenceScore::new("Anxiety", 70.0)],
            SourceReading::Eeg(EegReading::new(1.0, 2.0, 3.0, 4.0, 5.0)),
        ));

        let events = session_events(&old, &new, &StepPlan::default());
        assert_eq!(names(&events), vec!["PredictionReceived", "StepChanged"]);
        match &events[1] {
            SessionEvent::StepChanged { step_id, .. } => assert_eq!(step_id, "show-eeg-result"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failure_event() {
        let mut old = Session::new(None);
        old.current_step_index = 8;
        old.pending = Some(Modality::Biometric);
        let mut new = old.clone();
        new.pending = None;
        new.current_step_index = 7;
        new.error = Some("Analysis failed: timeout".to_string());

        let events = session_events(&old, &new, &StepPlan::default());
        assert_eq!(names(&events), vec!["SubmissionFailed", "StepChanged"]);
    }

    #[test]
    fn test_report_and_save_events() {
        let old = Session::new(None);
        let mut new = old.clone();
        new.combined_report = Some(CombinedReport {
            primary_label: "A".to_string(),
            fused_distribution: vec![],
            conflict: None,
            weights: FusionWeights {
                eeg: 0.7,
                biometric: 0.3,
            },
        });
        new.save_status = PersistenceStatus::Saving;

        let events = session_events(&old, &new, &StepPlan::default());
        assert_eq!(names(&events), vec!["ReportReady", "SaveStatusChanged"]);
    }

    #[test]
    fn test_restart_emits_restart_and_step() {
        let mut old = Session::new(None);
        old.current_step_index = 11;
        old.notice = Some("old".to_string());
        let new = old.restarted();

        let events = session_events(&old, &new, &StepPlan::default());
        assert_eq!(names(&events), vec!["SessionRestarted", "StepChanged"]);
    }
}
