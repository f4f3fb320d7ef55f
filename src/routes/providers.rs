use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{penalty_queries, provider_queries};
use crate::error::EngineError;
use crate::models::api::{AdjustScoreRequest, PenaltyRequest, ProviderScoreResponse};
use crate::models::penalty::PenaltyRecord;
use crate::routes::reject_invalid;
use crate::services::scoring::{self, AdjustOutcome, PenaltyOutcome, RecoveryOutcome};

/// POST /api/v1/providers/{id}/penalties
pub async fn apply_penalty(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    Json(req): Json<PenaltyRequest>,
) -> Result<Json<PenaltyOutcome>, EngineError> {
    reject_invalid(&req)?;
    let outcome = scoring::apply_penalty(
        &state.db,
        provider_id,
        req.penalty_type,
        req.job_id,
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/providers/{id}/penalties
pub async fn list_penalties(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Vec<PenaltyRecord>>, EngineError> {
    provider_queries::get(&state.db, provider_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;
    let records = penalty_queries::list(&state.db, provider_id).await?;
    Ok(Json(records))
}

/// POST /api/v1/providers/{id}/normalize — one week's worth of score
/// recovery; the maintenance binary calls this weekly for every provider.
pub async fn normalize_score(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<RecoveryOutcome>, EngineError> {
    let outcome = scoring::normalize(&state.db, provider_id).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/providers/{id}/score/adjust
pub async fn adjust_score(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    Json(req): Json<AdjustScoreRequest>,
) -> Result<Json<AdjustOutcome>, EngineError> {
    reject_invalid(&req)?;
    let outcome =
        scoring::adjust_manually(&state.db, provider_id, req.delta, req.admin_id, &req.reason)
            .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/providers/{id}/score
pub async fn get_score(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<ProviderScoreResponse>, EngineError> {
    let provider = provider_queries::get(&state.db, provider_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;

    let config = scoring::level_config(provider.current_level);
    let is_expelled = scoring::check_expulsion(&state.db, provider_id).await?;

    Ok(Json(ProviderScoreResponse {
        provider_id: provider.id,
        current_level: provider.current_level,
        internal_score: provider.internal_score,
        status: provider.status.to_string(),
        level_base: config.base,
        level_min: config.min,
        level_max: config.max,
        is_expelled,
    }))
}
