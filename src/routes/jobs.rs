use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{assignment_queries, job_queries, task_queries};
use crate::error::EngineError;
use crate::models::api::{
    AssignRequest, CreateJobRequest, MatchQuery, ReassignRequest, TransitionRequest,
};
use crate::models::assignment::{AssignmentStatus, JobAssignment};
use crate::models::job::{ActorType, Job, JobPriority, JobStatus, SlaSnapshot};
use crate::routes::reject_invalid;
use crate::services::matching::{MatchReport, RankingWeights};
use crate::services::queue::MatchRequest;
use crate::services::{lifecycle, matching, pricing, weather};

#[derive(Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub assignment: Option<JobAssignment>,
    pub valid_targets: Vec<JobStatus>,
}

/// POST /api/v1/jobs — create a job in draft with its SLA and price
/// snapshot taken from the task catalog.
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), EngineError> {
    reject_invalid(&req)?;

    let task = task_queries::get(&state.db, req.task_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {}", req.task_id)))?;

    let job = job_queries::create(
        &state.db,
        task.id,
        req.customer_id,
        req.lat,
        req.lng,
        &req.address,
        req.requested_start,
        req.priority.unwrap_or(JobPriority::Normal),
        SlaSnapshot::for_level(task.level),
        task.base_price_max_cents,
    )
    .await?;

    tracing::info!(job_id = %job.id, reference = %job.reference_code, task = %task.name, "job created");
    metrics::counter!("jobs_created_total").increment(1);

    Ok((StatusCode::CREATED, Json(job)))
}

/// POST /api/v1/jobs/{id}/submit — move a draft into the matching pool,
/// record the initial estimate, and enqueue a match request.
pub async fn submit_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, EngineError> {
    let job = job_queries::get(&state.db, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;

    lifecycle::validate(job.status, JobStatus::PendingMatch, ActorType::Customer)?;

    let mut conn = state.db.acquire().await?;
    job_queries::set_status(&mut conn, job_id, JobStatus::PendingMatch, job.status).await?;
    drop(conn);

    // Initial estimate goes straight onto the audit trail.
    if let Some(task) = task_queries::get(&state.db, job.task_id).await? {
        let extreme = weather::extreme_weather_or_default(
            state.weather.as_deref(),
            job.service_lat,
            job.service_lng,
        )
        .await;
        let estimate = pricing::estimate(
            &task,
            job.requested_start,
            job.is_emergency,
            extreme,
            "US",
        );
        pricing::record_estimate(&state.db, job_id, &estimate).await?;
    }

    // Best-effort: the stale-pending sweep re-queues anything dropped here.
    let request = MatchRequest {
        job_id,
        reason: "submitted".to_string(),
        attempts: 0,
    };
    if let Err(e) = state.queue.enqueue(&request).await {
        tracing::warn!(job_id = %job_id, error = %e, "failed to enqueue match request");
    }

    metrics::counter!("jobs_submitted_total").increment(1);

    let job = job_queries::get(&state.db, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    Ok(Json(job))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, EngineError> {
    let job = job_queries::get(&state.db, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    let assignment = assignment_queries::active_for_job_pool(&state.db, job_id).await?;

    let valid_targets = lifecycle::valid_targets(job.status, ActorType::Customer);

    Ok(Json(JobView { job, assignment, valid_targets }))
}

/// POST /api/v1/jobs/{id}/transition — guarded status change.
pub async fn transition_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<Job>, EngineError> {
    reject_invalid(&req)?;

    let job = job_queries::get(&state.db, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;

    lifecycle::validate(job.status, req.target, req.actor)?;

    let mut conn = state.db.acquire().await?;
    job_queries::set_status(&mut conn, job_id, req.target, job.status).await?;
    drop(conn);

    // Keep the active assignment in step with provider responses.
    if let Some(assignment) = assignment_queries::active_for_job_pool(&state.db, job_id).await? {
        match req.target {
            JobStatus::ProviderAccepted => {
                assignment_queries::set_status(&state.db, assignment.id, AssignmentStatus::Accepted)
                    .await?;
            }
            JobStatus::Completed => {
                assignment_queries::set_status(&state.db, assignment.id, AssignmentStatus::Completed)
                    .await?;
            }
            JobStatus::CancelledByCustomer
            | JobStatus::CancelledByProvider
            | JobStatus::CancelledBySystem => {
                let mut conn = state.db.acquire().await?;
                assignment_queries::cancel(&mut conn, assignment.id, &req.target.to_string())
                    .await?;
            }
            _ => {}
        }
    }

    tracing::info!(job_id = %job_id, from = %job.status, to = %req.target, actor = %req.actor, "job transitioned");

    let job = job_queries::get(&state.db, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    Ok(Json(job))
}

fn weights_from_query(query: &MatchQuery) -> Result<Option<RankingWeights>, EngineError> {
    match (query.weight_internal, query.weight_distance, query.weight_response) {
        (None, None, None) => Ok(None),
        (Some(internal), Some(distance), Some(response)) => {
            Ok(Some(RankingWeights { internal, distance, response }))
        }
        _ => Err(EngineError::InvalidInput(
            "either all three ranking weights or none must be supplied".to_string(),
        )),
    }
}

/// GET /api/v1/jobs/{id}/matches — ranked candidate providers.
pub async fn list_matches(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<MatchReport>, EngineError> {
    let weights = weights_from_query(&query)?;
    let report = matching::find_matches(
        &state.db,
        job_id,
        query.radius_km,
        query.limit.unwrap_or(10),
        weights,
    )
    .await?;
    Ok(Json(report))
}

/// POST /api/v1/jobs/{id}/assign
pub async fn assign_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<(StatusCode, Json<JobAssignment>), EngineError> {
    reject_invalid(&req)?;
    let assignment = matching::assign(&state.db, job_id, req.provider_id, req.match_score).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// POST /api/v1/jobs/{id}/reassign
pub async fn reassign_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<ReassignRequest>,
) -> Result<(StatusCode, Json<JobAssignment>), EngineError> {
    reject_invalid(&req)?;
    let assignment =
        matching::reassign(&state.db, job_id, req.provider_id, req.reason.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}
