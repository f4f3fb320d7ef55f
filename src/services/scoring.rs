//! Provider reputation scoring: per-level score bounds, penalty
//! application, expulsion detection, weekly recovery, and audited manual
//! adjustment.
//!
//! The score math is pure; the async wrappers lock the provider row
//! (`SELECT … FOR UPDATE`) so concurrent penalty/adjustment/normalization
//! calls on the same provider serialize instead of racing the
//! read-modify-write.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{penalty_queries, provider_queries};
use crate::error::EngineError;
use crate::models::penalty::PenaltyType;
use crate::models::provider::ProviderStatus;

/// Points recovered per incident-free week.
pub const WEEKLY_RECOVERY_POINTS: f64 = 5.0;

/// Cap on counted incident-free weeks; also the value assumed for a
/// provider with no penalty history at all.
pub const MAX_INCIDENT_FREE_WEEKS: i64 = 52;

/// Score bounds for a provider level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelScoreConfig {
    pub base: f64,
    pub min: f64,
    pub max: f64,
}

/// Fixed per-level score configuration.
pub fn level_config(level: i16) -> LevelScoreConfig {
    match level {
        1 => LevelScoreConfig { base: 70.0, min: 40.0, max: 90.0 },
        2 => LevelScoreConfig { base: 75.0, min: 50.0, max: 95.0 },
        3 => LevelScoreConfig { base: 80.0, min: 60.0, max: 98.0 },
        _ => LevelScoreConfig { base: 85.0, min: 70.0, max: 100.0 },
    }
}

/// Fixed penalty table: points deducted per (level, event type).
/// `bad_review` applies to levels 1–3 only; `sla_breach` to level 4 only.
pub fn penalty_points(level: i16, penalty_type: PenaltyType) -> Option<f64> {
    let points = match (level, penalty_type) {
        (1, PenaltyType::ResponseTimeout) => -2.0,
        (2, PenaltyType::ResponseTimeout) => -4.0,
        (3, PenaltyType::ResponseTimeout) => -6.0,
        (4, PenaltyType::ResponseTimeout) => -15.0,

        (1, PenaltyType::Cancellation) => -3.0,
        (2, PenaltyType::Cancellation) => -6.0,
        (3, PenaltyType::Cancellation) => -10.0,
        (4, PenaltyType::Cancellation) => -25.0,

        (1, PenaltyType::NoShow) => -10.0,
        (2, PenaltyType::NoShow) => -15.0,
        (3, PenaltyType::NoShow) => -30.0,
        (4, PenaltyType::NoShow) => -50.0,

        (1, PenaltyType::BadReview) => -5.0,
        (2, PenaltyType::BadReview) => -7.0,
        (3, PenaltyType::BadReview) => -10.0,

        (4, PenaltyType::SlaBreach) => -30.0,

        _ => return None,
    };
    Some(points)
}

/// Clamp a score into the bounds of the given level.
pub fn clamp_score(level: i16, score: f64) -> f64 {
    let config = level_config(level);
    score.clamp(config.min, config.max)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PenaltyOutcome {
    pub previous_score: f64,
    pub new_score: f64,
    pub points: f64,
    pub is_expelled: bool,
}

/// Pure penalty computation.
///
/// A level-4 no-show is zero-tolerance: the score is forced to 0 and the
/// provider is expelled regardless of prior standing, bypassing the
/// normal deduction math.
pub fn compute_penalty(
    level: i16,
    current_score: f64,
    penalty_type: PenaltyType,
) -> Result<PenaltyOutcome, EngineError> {
    let points = penalty_points(level, penalty_type).ok_or_else(|| {
        EngineError::InvalidInput(format!(
            "penalty type {penalty_type} is not defined for level {level}"
        ))
    })?;

    if level == 4 && penalty_type == PenaltyType::NoShow {
        return Ok(PenaltyOutcome {
            previous_score: current_score,
            new_score: 0.0,
            points,
            is_expelled: true,
        });
    }

    let config = level_config(level);
    let new_score = (current_score + points).clamp(config.min, config.max);

    Ok(PenaltyOutcome {
        previous_score: current_score,
        new_score,
        points,
        is_expelled: new_score <= config.min,
    })
}

/// Apply a penalty to a provider, appending an immutable penalty record.
pub async fn apply_penalty(
    pool: &PgPool,
    provider_id: Uuid,
    penalty_type: PenaltyType,
    job_id: Option<Uuid>,
    reason: Option<&str>,
) -> Result<PenaltyOutcome, EngineError> {
    let mut tx = pool.begin().await?;

    let provider = provider_queries::get_for_update(&mut tx, provider_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;

    let outcome = compute_penalty(provider.current_level, provider.internal_score, penalty_type)?;

    let status = if outcome.is_expelled {
        ProviderStatus::Suspended
    } else {
        provider.status
    };

    let now = Utc::now();
    provider_queries::update_after_penalty(&mut tx, provider_id, outcome.new_score, status, now)
        .await?;

    penalty_queries::insert(
        &mut tx,
        provider_id,
        penalty_type,
        outcome.points,
        job_id,
        reason,
        outcome.previous_score,
        outcome.new_score,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        provider_id = %provider_id,
        penalty_type = %penalty_type,
        previous_score = outcome.previous_score,
        new_score = outcome.new_score,
        expelled = outcome.is_expelled,
        "penalty applied"
    );
    metrics::counter!("provider_penalties_total").increment(1);
    if outcome.is_expelled {
        metrics::counter!("provider_expulsions_total").increment(1);
    }

    Ok(outcome)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RecoveryOutcome {
    pub previous_score: f64,
    pub new_score: f64,
    pub points_recovered: f64,
    pub incident_free_weeks: i64,
}

/// Pure recovery computation: one week's worth of recovery per
/// invocation, never raising the score above the level base.
pub fn compute_recovery(
    level: i16,
    current_score: f64,
    incident_free_weeks: i64,
) -> RecoveryOutcome {
    let config = level_config(level);

    if current_score >= config.base || incident_free_weeks < 1 {
        return RecoveryOutcome {
            previous_score: current_score,
            new_score: current_score,
            points_recovered: 0.0,
            incident_free_weeks,
        };
    }

    let recovered = WEEKLY_RECOVERY_POINTS.min(config.base - current_score);
    RecoveryOutcome {
        previous_score: current_score,
        new_score: current_score + recovered,
        points_recovered: recovered,
        incident_free_weeks,
    }
}

/// Weekly score recovery for one provider. Intended to be invoked on a
/// weekly cadence; each invocation recovers at most one week's worth.
pub async fn normalize(pool: &PgPool, provider_id: Uuid) -> Result<RecoveryOutcome, EngineError> {
    let mut tx = pool.begin().await?;

    let provider = provider_queries::get_for_update(&mut tx, provider_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;

    let now = Utc::now();
    let weeks = match penalty_queries::last_applied_at(&mut tx, provider_id).await? {
        Some(last) => ((now - last).num_days() / 7).clamp(0, MAX_INCIDENT_FREE_WEEKS),
        None => MAX_INCIDENT_FREE_WEEKS,
    };

    let outcome = compute_recovery(provider.current_level, provider.internal_score, weeks);

    if outcome.points_recovered > 0.0 {
        provider_queries::update_after_normalization(&mut tx, provider_id, outcome.new_score, now)
            .await?;
        tracing::info!(
            provider_id = %provider_id,
            previous_score = outcome.previous_score,
            new_score = outcome.new_score,
            incident_free_weeks = weeks,
            "score recovered"
        );
    }

    tx.commit().await?;
    Ok(outcome)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AdjustOutcome {
    pub previous_score: f64,
    pub new_score: f64,
    pub applied_delta: f64,
}

/// Manual score adjustment by an admin. The reason is mandatory and the
/// adjustment is always written to the audit table, in both directions.
pub async fn adjust_manually(
    pool: &PgPool,
    provider_id: Uuid,
    delta: f64,
    admin_id: Uuid,
    reason: &str,
) -> Result<AdjustOutcome, EngineError> {
    if reason.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "a reason is required for manual score adjustments".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let provider = provider_queries::get_for_update(&mut tx, provider_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;

    let new_score = clamp_score(provider.current_level, provider.internal_score + delta);

    provider_queries::update_score(&mut tx, provider_id, new_score).await?;
    penalty_queries::insert_adjustment(
        &mut tx,
        provider_id,
        admin_id,
        delta,
        reason,
        provider.internal_score,
        new_score,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        provider_id = %provider_id,
        admin_id = %admin_id,
        delta,
        previous_score = provider.internal_score,
        new_score,
        "manual score adjustment"
    );

    Ok(AdjustOutcome {
        previous_score: provider.internal_score,
        new_score,
        applied_delta: new_score - provider.internal_score,
    })
}

/// Whether a provider is expelled: suspended, at or below the level
/// minimum, or (level 4 only) carrying any no-show on record.
pub async fn check_expulsion(pool: &PgPool, provider_id: Uuid) -> Result<bool, EngineError> {
    let provider = provider_queries::get(pool, provider_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;

    if provider.status == ProviderStatus::Suspended {
        return Ok(true);
    }

    let config = level_config(provider.current_level);
    if provider.internal_score <= config.min {
        return Ok(true);
    }

    if provider.current_level == 4 && penalty_queries::has_no_show(pool, provider_id).await? {
        return Ok(true);
    }

    Ok(false)
}
