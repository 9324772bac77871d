//! JSON API over the quote assistant and the reminder workflows.
//!
//! Every failure is rendered as `{error, message, correlation_id}`. The
//! correlation id is taken from the `x-correlation-id` request header when
//! present, otherwise one is generated per request.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use paysage_core::domain::prestation::DerivationResult;
use paysage_core::domain::proposal::{ProposalId, QuoteProposal};
use paysage_core::domain::reminder::{
    InvoiceId, ReminderChannel, ReminderWorkflow, ReminderWorkflowId,
};
use paysage_core::errors::{ApplicationError, InterfaceError};
use paysage_core::reminders::Trigger;
use paysage_db::services::TriggerReport;
use paysage_db::{
    ProposalService, ReminderService, SqlProposalRepository, SqlReminderRepository,
    TracingNotifier, WorkflowHistory,
};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct AppState {
    pub reminders: Arc<ReminderService<SqlReminderRepository, TracingNotifier>>,
    pub proposals: Arc<ProposalService<SqlProposalRepository>>,
    pub default_channel: ReminderChannel,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartReminderRequest {
    #[serde(default)]
    pub auto_send: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdvanceRequest {
    pub channel: Option<ReminderChannel>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StopRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AutoSendRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_owned(),
        })
    }

    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::Unprocessable { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable")
            }
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        // Storage and configuration details stay in the logs.
        let message = match &self.0 {
            InterfaceError::BadRequest { message, .. }
            | InterfaceError::Unprocessable { message, .. }
            | InterfaceError::NotFound { message, .. }
            | InterfaceError::Conflict { message, .. } => message.clone(),
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                self.0.user_message().to_owned()
            }
        };

        warn!(
            event_name = "api.request.rejected",
            correlation_id = %self.0.correlation_id(),
            status = status.as_u16(),
            error = %self.0,
            "api request rejected"
        );

        let body = ErrorBody {
            error,
            message,
            correlation_id: self.0.correlation_id().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/assistant/derive", post(derive_quote))
        .route("/api/proposals", post(create_proposal))
        .route("/api/proposals/{id}", get(get_proposal))
        .route("/api/invoices/{invoice_id}/reminders", post(start_reminders))
        .route("/api/reminders/{id}", get(get_reminders))
        .route("/api/reminders/{id}/advance", post(advance_reminders))
        .route("/api/reminders/{id}/stop", post(stop_reminders))
        .route("/api/reminders/{id}/auto-send", put(set_auto_send))
        .with_state(state)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

/// Extractor failures of any kind (syntax, missing field, content type) are 400s
/// in the shared error shape.
fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    correlation_id: &str,
) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        let message = format!("invalid request body: {}", rejection.body_text());
        ApiError::bad_request(message, correlation_id)
    })
}

/// A request without a JSON content type carries no body and means "all defaults".
fn optional_json_body<T: Default>(
    payload: Result<Option<Json<T>>, JsonRejection>,
    correlation_id: &str,
) -> Result<T, ApiError> {
    json_body(payload.map(|body| body.unwrap_or_else(|| Json(T::default()))), correlation_id)
}

async fn derive_quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<DerivationResult>, ApiError> {
    let cid = correlation_id(&headers);
    let request = json_body(payload, &cid)?;
    Ok(Json(state.proposals.derive(&request.text)))
}

async fn create_proposal(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<QuoteProposal>), ApiError> {
    let cid = correlation_id(&headers);
    let request = json_body(payload, &cid)?;
    let proposal = state
        .proposals
        .propose(&request.text, Utc::now())
        .await
        .map_err(|error| ApiError::from_application(error, &cid))?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

async fn get_proposal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<QuoteProposal>, ApiError> {
    let cid = correlation_id(&headers);
    let proposal = state
        .proposals
        .find(&ProposalId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &cid))?;
    Ok(Json(proposal))
}

async fn start_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<String>,
    payload: Result<Option<Json<StartReminderRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<ReminderWorkflow>), ApiError> {
    let cid = correlation_id(&headers);
    let request = optional_json_body(payload, &cid)?;
    let workflow = state
        .reminders
        .start(InvoiceId(invoice_id), request.auto_send, Utc::now())
        .await
        .map_err(|error| ApiError::from_application(error, &cid))?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn get_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<WorkflowHistory>, ApiError> {
    let cid = correlation_id(&headers);
    let history = state
        .reminders
        .history(&ReminderWorkflowId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &cid))?;
    Ok(Json(history))
}

async fn advance_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Option<Json<AdvanceRequest>>, JsonRejection>,
) -> Result<Json<TriggerReport>, ApiError> {
    let cid = correlation_id(&headers);
    let request = optional_json_body(payload, &cid)?;
    let channel = request.channel.unwrap_or(state.default_channel);
    let report = state
        .reminders
        .trigger(&ReminderWorkflowId(id), channel, Trigger::Manual, Utc::now())
        .await
        .map_err(|error| ApiError::from_application(error, &cid))?;
    Ok(Json(report))
}

async fn stop_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Option<Json<StopRequest>>, JsonRejection>,
) -> Result<Json<ReminderWorkflow>, ApiError> {
    let cid = correlation_id(&headers);
    let request = optional_json_body(payload, &cid)?;
    let workflow = state
        .reminders
        .stop(&ReminderWorkflowId(id), request.reason.as_deref(), Utc::now())
        .await
        .map_err(|error| ApiError::from_application(error, &cid))?;
    Ok(Json(workflow))
}

async fn set_auto_send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<AutoSendRequest>, JsonRejection>,
) -> Result<Json<ReminderWorkflow>, ApiError> {
    let cid = correlation_id(&headers);
    let request = json_body(payload, &cid)?;
    let workflow = state
        .reminders
        .set_auto_send(&ReminderWorkflowId(id), request.enabled, Utc::now())
        .await
        .map_err(|error| ApiError::from_application(error, &cid))?;
    Ok(Json(workflow))
}
