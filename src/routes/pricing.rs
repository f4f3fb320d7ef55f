use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{job_queries, pricing_queries, task_queries};
use crate::error::EngineError;
use crate::models::api::{PriceAdjustRequest, ProposalRequest, ProposalResponseRequest, TipRequest};
use crate::models::pricing::PriceProposal;
use crate::routes::reject_invalid;
use crate::services::pricing::{self, PriceBreakdown, PriceEstimate};
use crate::services::weather;

/// POST /api/v1/jobs/{id}/price/estimate — recompute the estimate for a
/// job from its task, emergency flag, and current weather conditions.
pub async fn estimate_price(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<PriceEstimate>, EngineError> {
    let job = job_queries::get(&state.db, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    let task = task_queries::get(&state.db, job.task_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {}", job.task_id)))?;

    let extreme = weather::extreme_weather_or_default(
        state.weather.as_deref(),
        job.service_lat,
        job.service_lng,
    )
    .await;

    let estimate = pricing::estimate(&task, job.requested_start, job.is_emergency, extreme, "US");
    pricing::record_estimate(&state.db, job_id, &estimate).await?;

    Ok(Json(estimate))
}

/// GET /api/v1/jobs/{id}/price — breakdown from the audit trail, falling
/// back to the job's stored price fields.
pub async fn price_breakdown(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<PriceBreakdown>, EngineError> {
    let breakdown = pricing::breakdown(&state.db, job_id).await?;
    Ok(Json(breakdown))
}

/// POST /api/v1/jobs/{id}/price/proposals
pub async fn create_proposal(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<ProposalRequest>,
) -> Result<(StatusCode, Json<PriceProposal>), EngineError> {
    reject_invalid(&req)?;
    let proposal = pricing::create_proposal(
        &state.db,
        job_id,
        req.proposer_id,
        req.role,
        req.price_cents,
        req.description.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

/// GET /api/v1/jobs/{id}/price/proposals
pub async fn list_proposals(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<PriceProposal>>, EngineError> {
    job_queries::get(&state.db, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    let proposals = pricing_queries::list_proposals(&state.db, job_id).await?;
    Ok(Json(proposals))
}

/// POST /api/v1/price/proposals/{id}/respond
pub async fn respond_to_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Json(req): Json<ProposalResponseRequest>,
) -> Result<Json<PriceProposal>, EngineError> {
    reject_invalid(&req)?;
    let proposal =
        pricing::respond(&state.db, proposal_id, req.responder_id, req.accept).await?;
    Ok(Json(proposal))
}

/// POST /api/v1/jobs/{id}/price/adjust — on-site scope change forcing
/// re-approval.
pub async fn adjust_price(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<PriceAdjustRequest>,
) -> Result<(StatusCode, Json<PriceProposal>), EngineError> {
    reject_invalid(&req)?;
    let proposal = pricing::adjust(
        &state.db,
        job_id,
        req.proposer_id,
        req.price_cents,
        &req.reason,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

/// POST /api/v1/jobs/{id}/price/tip
pub async fn record_tip(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<TipRequest>,
) -> Result<StatusCode, EngineError> {
    reject_invalid(&req)?;
    pricing::record_tip(&state.db, job_id, req.amount_cents, req.actor_id).await?;
    Ok(StatusCode::CREATED)
}
