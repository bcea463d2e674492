//! Session services: endpoint resolution, reading normalization, fusion,
//! remote classification and report persistence

pub mod classifier_client;
pub mod endpoint_resolver;
pub mod fusion_engine;
pub mod reading_normalizer;
pub mod report_store;

pub use classifier_client::{Classifier, ClassifierError, HttpClassifierClient, DEFAULT_CLASSIFY_TIMEOUT};
pub use endpoint_resolver::{
    candidate_list, resolve_endpoint, HttpProbe, LivenessProbe, ResolveError, ResolvedEndpoint,
    DEFAULT_PROBE_TIMEOUT,
};
pub use fusion_engine::{fuse_predictions, FusionError, FusionParams};
pub use reading_normalizer::{normalize_biometric, normalize_eeg};
pub use report_store::{
    persist_report, HttpReportStore, ReportStore, SaveReportRequest, SaveReportResponse,
    StoreError, DEFAULT_SAVE_TIMEOUT,
};
