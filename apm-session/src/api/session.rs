//! Session endpoints
//!
//! Every action is forwarded to the session driver. Actions the current step
//! does not accept answer 409, validation failures 400; both carry the
//! standard `{error: {code, message}}` envelope.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    models::{BiometricReading, CombinedReport, EegReading, PatientIdentity, PersistenceStatus, Step},
    workflow::{Input, SessionView},
    AppState,
};

/// Current step summary
#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub index: usize,
    pub step: Step,
    pub step_count: usize,
    pub can_confirm: bool,
    pub pending: bool,
}

/// Combined report with its persistence status
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: CombinedReport,
    pub save_status: PersistenceStatus,
}

/// Forward an input and map a non-applied outcome to an error
async fn act(state: &AppState, input: Input) -> ApiResult<Json<SessionView>> {
    let reply = state.session.dispatch(input).await?;
    if let Some(err) = ApiError::from_outcome(&reply.outcome) {
        return Err(err);
    }
    Ok(Json(state.session.machine().view(&reply.session)))
}

/// GET /api/session
pub async fn get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.session.view())
}

/// GET /api/session/step
pub async fn get_step(State(state): State<AppState>) -> Json<StepResponse> {
    let view = state.session.view();
    Json(StepResponse {
        index: view.session.current_step_index,
        step: view.step,
        step_count: view.step_count,
        can_confirm: view.can_confirm,
        pending: view.session.pending.is_some(),
    })
}

/// GET /api/session/report
pub async fn get_report(State(state): State<AppState>) -> ApiResult<Json<ReportResponse>> {
    let session = state.session.snapshot();
    let report = session
        .combined_report
        .ok_or_else(|| ApiError::NotFound("No combined report yet".to_string()))?;

    Ok(Json(ReportResponse {
        report,
        save_status: session.save_status,
    }))
}

/// POST /api/session/identify
pub async fn identify(
    State(state): State<AppState>,
    payload: Result<Json<PatientIdentity>, JsonRejection>,
) -> ApiResult<Json<SessionView>> {
    let Json(identity) = payload?;
    act(&state, Input::SubmitIdentity(identity)).await
}

/// POST /api/session/confirm
pub async fn confirm(State(state): State<AppState>) -> ApiResult<Json<SessionView>> {
    act(&state, Input::ConfirmStep).await
}

/// POST /api/session/eeg
pub async fn submit_eeg(
    State(state): State<AppState>,
    payload: Result<Json<EegReading>, JsonRejection>,
) -> ApiResult<Json<SessionView>> {
    let Json(reading) = payload?;
    act(&state, Input::SubmitEegReading(reading)).await
}

/// POST /api/session/biometric
pub async fn submit_biometric(
    State(state): State<AppState>,
    payload: Result<Json<BiometricReading>, JsonRejection>,
) -> ApiResult<Json<SessionView>> {
    let Json(reading) = payload?;
    act(&state, Input::SubmitBiometricReading(reading)).await
}

/// POST /api/session/eeg/latest
///
/// Starts the fetch; the draft (or a notice) shows up on the session shortly.
pub async fn fetch_latest_eeg(State(state): State<AppState>) -> ApiResult<Json<SessionView>> {
    act(&state, Input::FetchLatestEeg).await
}

/// POST /api/session/biometric/latest
pub async fn fetch_latest_biometric(
    State(state): State<AppState>,
) -> ApiResult<Json<SessionView>> {
    act(&state, Input::FetchLatestBiometric).await
}

/// POST /api/session/restart
pub async fn restart(State(state): State<AppState>) -> ApiResult<Json<SessionView>> {
    info!("Restart requested");
    act(&state, Input::Restart).await
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/step", get(get_step))
        .route("/api/session/report", get(get_report))
        .route("/api/session/identify", post(identify))
        .route("/api/session/confirm", post(confirm))
        .route("/api/session/eeg", post(submit_eeg))
        .route("/api/session/biometric", post(submit_biometric))
        .route("/api/session/eeg/latest", post(fetch_latest_eeg))
        .route("/api/session/biometric/latest", post(fetch_latest_biometric))
        .route("/api/session/restart", post(restart))
}
