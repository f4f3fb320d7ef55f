//! Durable penalty history. Injected everywhere as a plain repository
//! over `(provider_id, applied_at)`-indexed tables; never a process-local
//! cache, so multiple server instances observe the same history.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::db::decode_enum;
use crate::models::penalty::{PenaltyRecord, PenaltyType, ScoreAdjustment};

const PENALTY_COLUMNS: &str = r#"
    id, provider_id, penalty_type, points, job_id, reason,
    score_before, score_after, applied_at
"#;

fn row_to_penalty(row: &PgRow) -> Result<PenaltyRecord, sqlx::Error> {
    let type_str: String = row.try_get("penalty_type")?;

    Ok(PenaltyRecord {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        penalty_type: decode_enum::<PenaltyType>("penalty_type", &type_str)?,
        points: row.try_get("points")?,
        job_id: row.try_get("job_id")?,
        reason: row.try_get("reason")?,
        score_before: row.try_get("score_before")?,
        score_after: row.try_get("score_after")?,
        applied_at: row.try_get("applied_at")?,
    })
}

/// Append one immutable penalty record.
#[allow(clippy::too_many_arguments)]
pub async fn insert(
    conn: &mut PgConnection,
    provider_id: Uuid,
    penalty_type: PenaltyType,
    points: f64,
    job_id: Option<Uuid>,
    reason: Option<&str>,
    score_before: f64,
    score_after: f64,
) -> Result<PenaltyRecord, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO penalty_records (provider_id, penalty_type, points, job_id, reason, score_before, score_after)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {PENALTY_COLUMNS}
        "#
    ))
    .bind(provider_id)
    .bind(penalty_type.to_string())
    .bind(points)
    .bind(job_id)
    .bind(reason)
    .bind(score_before)
    .bind(score_after)
    .fetch_one(conn)
    .await?;

    row_to_penalty(&row)
}

/// When the provider's most recent penalty landed, if ever.
pub async fn last_applied_at(
    conn: &mut PgConnection,
    provider_id: Uuid,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT MAX(applied_at) AS last FROM penalty_records WHERE provider_id = $1",
    )
    .bind(provider_id)
    .fetch_one(conn)
    .await?;
    row.try_get("last")
}

/// Whether the provider has any no-show on record.
pub async fn has_no_show(pool: &PgPool, provider_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM penalty_records WHERE provider_id = $1 AND penalty_type = 'no_show') AS found",
    )
    .bind(provider_id)
    .fetch_one(pool)
    .await?;
    row.try_get("found")
}

/// Full penalty history for a provider, newest first.
pub async fn list(pool: &PgPool, provider_id: Uuid) -> Result<Vec<PenaltyRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {PENALTY_COLUMNS} FROM penalty_records
        WHERE provider_id = $1
        ORDER BY applied_at DESC
        "#
    ))
    .bind(provider_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_penalty).collect()
}

/// Append a manual-adjustment audit row.
pub async fn insert_adjustment(
    conn: &mut PgConnection,
    provider_id: Uuid,
    admin_id: Uuid,
    delta: f64,
    reason: &str,
    score_before: f64,
    score_after: f64,
) -> Result<ScoreAdjustment, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO score_adjustments (provider_id, admin_id, delta, reason, score_before, score_after)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, provider_id, admin_id, delta, reason, score_before, score_after, created_at
        "#,
    )
    .bind(provider_id)
    .bind(admin_id)
    .bind(delta)
    .bind(reason)
    .bind(score_before)
    .bind(score_after)
    .fetch_one(conn)
    .await?;

    Ok(ScoreAdjustment {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        admin_id: row.try_get("admin_id")?,
        delta: row.try_get("delta")?,
        reason: row.try_get("reason")?,
        score_before: row.try_get("score_before")?,
        score_after: row.try_get("score_after")?,
        created_at: row.try_get("created_at")?,
    })
}
