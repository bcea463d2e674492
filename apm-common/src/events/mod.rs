//! Event types for the APM event system
//!
//! Provides shared event definitions and the EventBus used to stream session
//! changes to presentation clients.

mod status_types;

pub use status_types::{Modality, PersistenceStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Session event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Current step changed (forward, rollback or restart)
    StepChanged {
        session_id: Uuid,
        /// Step index before change
        old_index: usize,
        /// Step index after change
        new_index: usize,
        /// Identifier of the new step (e.g. "input-eeg")
        step_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A classifier returned a prediction
    PredictionReceived {
        session_id: Uuid,
        modality: Modality,
        label: String,
        timestamp: DateTime<Utc>,
    },

    /// A classifier submission failed; the session rolled back to the input step
    SubmissionFailed {
        session_id: Uuid,
        modality: Modality,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The combined report is available for presentation
    ReportReady {
        session_id: Uuid,
        primary_label: String,
        conflict: bool,
        timestamp: DateTime<Utc>,
    },

    /// Report persistence status changed
    SaveStatusChanged {
        session_id: Uuid,
        old_status: PersistenceStatus,
        new_status: PersistenceStatus,
        timestamp: DateTime<Utc>,
    },

    /// Non-fatal notice (e.g. latest-average payload could not be parsed)
    NoticeRaised {
        session_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Session was reset to the first step
    SessionRestarted {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::StepChanged { .. } => "StepChanged",
            SessionEvent::PredictionReceived { .. } => "PredictionReceived",
            SessionEvent::SubmissionFailed { .. } => "SubmissionFailed",
            SessionEvent::ReportReady { .. } => "ReportReady",
            SessionEvent::SaveStatusChanged { .. } => "SaveStatusChanged",
            SessionEvent::NoticeRaised { .. } => "NoticeRaised",
            SessionEvent::SessionRestarted { .. } => "SessionRestarted",
        }
    }
}

/// Broadcast bus for session events
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use apm_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
