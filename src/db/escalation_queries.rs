use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::models::escalation::JobEscalation;

const ESCALATION_COLUMNS: &str = r#"
    id, job_id, from_level, to_level, trigger_keywords, matched_text,
    resolved, approved, resolved_by, resolved_at, resolution_notes, created_at
"#;

fn row_to_escalation(row: &PgRow) -> Result<JobEscalation, sqlx::Error> {
    Ok(JobEscalation {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        from_level: row.try_get("from_level")?,
        to_level: row.try_get("to_level")?,
        trigger_keywords: row.try_get("trigger_keywords")?,
        matched_text: row.try_get("matched_text")?,
        resolved: row.try_get("resolved")?,
        approved: row.try_get("approved")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: row.try_get("resolved_at")?,
        resolution_notes: row.try_get("resolution_notes")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Append a new unresolved escalation record.
pub async fn insert(
    pool: &PgPool,
    job_id: Uuid,
    from_level: i16,
    to_level: i16,
    trigger_keywords: &[String],
    matched_text: &[String],
) -> Result<JobEscalation, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO job_escalations (job_id, from_level, to_level, trigger_keywords, matched_text)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ESCALATION_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(from_level)
    .bind(to_level)
    .bind(trigger_keywords)
    .bind(matched_text)
    .fetch_one(pool)
    .await?;

    row_to_escalation(&row)
}

pub async fn get(
    pool: &PgPool,
    escalation_id: Uuid,
) -> Result<Option<JobEscalation>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {ESCALATION_COLUMNS} FROM job_escalations WHERE id = $1"
    ))
    .bind(escalation_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_escalation).transpose()
}

/// Mark an escalation resolved. The WHERE clause refuses a second
/// resolution, so racing admins cannot both win.
pub async fn resolve(
    conn: &mut PgConnection,
    escalation_id: Uuid,
    resolver_id: Uuid,
    approved: bool,
    notes: Option<&str>,
    resolved_at: DateTime<Utc>,
) -> Result<JobEscalation, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE job_escalations
        SET resolved = true, approved = $1, resolved_by = $2, resolved_at = $3, resolution_notes = $4
        WHERE id = $5 AND resolved = false
        RETURNING {ESCALATION_COLUMNS}
        "#
    ))
    .bind(approved)
    .bind(resolver_id)
    .bind(resolved_at)
    .bind(notes)
    .bind(escalation_id)
    .fetch_one(conn)
    .await?;

    row_to_escalation(&row)
}

pub async fn count_unresolved(pool: &PgPool, job_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM job_escalations WHERE job_id = $1 AND resolved = false",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await?;
    row.try_get("n")
}

pub async fn list_for_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<JobEscalation>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {ESCALATION_COLUMNS} FROM job_escalations WHERE job_id = $1 ORDER BY created_at DESC"
    ))
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_escalation).collect()
}
