use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::escalation_queries;
use crate::error::EngineError;
use crate::models::api::{EscalationApproveRequest, EscalationCheckRequest, EscalationRejectRequest};
use crate::models::escalation::JobEscalation;
use crate::routes::reject_invalid;
use crate::services::escalation::{self, EscalationCheck};

/// POST /api/v1/jobs/{id}/escalations/check — scan free text (chat, job
/// notes) for escalation triggers.
pub async fn check_escalation(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<EscalationCheckRequest>,
) -> Result<Json<EscalationCheck>, EngineError> {
    reject_invalid(&req)?;
    let result = escalation::check(&state.db, job_id, &req.text).await?;
    Ok(Json(result))
}

/// GET /api/v1/jobs/{id}/escalations
pub async fn list_escalations(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<JobEscalation>>, EngineError> {
    let escalations = escalation_queries::list_for_job(&state.db, job_id).await?;
    Ok(Json(escalations))
}

/// POST /api/v1/escalations/{id}/approve
pub async fn approve_escalation(
    State(state): State<AppState>,
    Path(escalation_id): Path<Uuid>,
    Json(req): Json<EscalationApproveRequest>,
) -> Result<Json<JobEscalation>, EngineError> {
    reject_invalid(&req)?;
    let escalation = escalation::approve(&state.db, escalation_id, req.admin_id).await?;
    Ok(Json(escalation))
}

/// POST /api/v1/escalations/{id}/reject
pub async fn reject_escalation(
    State(state): State<AppState>,
    Path(escalation_id): Path<Uuid>,
    Json(req): Json<EscalationRejectRequest>,
) -> Result<Json<JobEscalation>, EngineError> {
    reject_invalid(&req)?;
    let escalation =
        escalation::reject(&state.db, escalation_id, req.admin_id, &req.reason).await?;
    Ok(Json(escalation))
}
