//! Data models for the assessment session

pub mod prediction;
pub mod reading;
pub mod report;
pub mod session;
pub mod step;

pub use prediction::{ConfidenceScore, Prediction, SourceReading};
pub use reading::{BiometricReading, EegReading, ReadingError};
pub use report::{CombinedReport, ConflictAnalysis, FusedScore, FusionWeights, Severity};
pub use session::{IdentityError, PatientIdentity, Session, MAX_PATIENT_AGE};
pub use step::{AdvanceMode, Step, StepId, StepPlan, StepTiming};

pub use apm_common::events::{Modality, PersistenceStatus};
