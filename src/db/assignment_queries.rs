use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::db::decode_enum;
use crate::models::assignment::{AssignmentStatus, JobAssignment};

const ASSIGNMENT_COLUMNS: &str = r#"
    id, job_id, provider_id, status, match_score,
    response_deadline, arrival_deadline, cancelled_reason, created_at, responded_at
"#;

fn row_to_assignment(row: &PgRow) -> Result<JobAssignment, sqlx::Error> {
    let status_str: String = row.try_get("status")?;

    Ok(JobAssignment {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        provider_id: row.try_get("provider_id")?,
        status: decode_enum::<AssignmentStatus>("status", &status_str)?,
        match_score: row.try_get("match_score")?,
        response_deadline: row.try_get("response_deadline")?,
        arrival_deadline: row.try_get("arrival_deadline")?,
        cancelled_reason: row.try_get("cancelled_reason")?,
        created_at: row.try_get("created_at")?,
        responded_at: row.try_get("responded_at")?,
    })
}

/// Create an assignment offer with its SLA deadlines.
pub async fn insert(
    conn: &mut PgConnection,
    job_id: Uuid,
    provider_id: Uuid,
    match_score: Option<f64>,
    response_deadline: DateTime<Utc>,
    arrival_deadline: DateTime<Utc>,
) -> Result<JobAssignment, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO job_assignments (job_id, provider_id, status, match_score, response_deadline, arrival_deadline)
        VALUES ($1, $2, 'offered', $3, $4, $5)
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(provider_id)
    .bind(match_score)
    .bind(response_deadline)
    .bind(arrival_deadline)
    .fetch_one(conn)
    .await?;

    row_to_assignment(&row)
}

pub async fn count_active_for_job(
    conn: &mut PgConnection,
    job_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM job_assignments WHERE job_id = $1 AND status IN ('offered', 'accepted')",
    )
    .bind(job_id)
    .fetch_one(conn)
    .await?;
    row.try_get("n")
}

pub async fn count_active_for_provider(
    conn: &mut PgConnection,
    provider_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM job_assignments WHERE provider_id = $1 AND status IN ('offered', 'accepted')",
    )
    .bind(provider_id)
    .fetch_one(conn)
    .await?;
    row.try_get("n")
}

/// The job's active (offered or accepted) assignment, if any.
pub async fn active_for_job(
    conn: &mut PgConnection,
    job_id: Uuid,
) -> Result<Option<JobAssignment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS} FROM job_assignments
        WHERE job_id = $1 AND status IN ('offered', 'accepted')
        ORDER BY created_at DESC
        LIMIT 1
        "#
    ))
    .bind(job_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(row_to_assignment).transpose()
}

/// Pool-level variant of `active_for_job` for read paths.
pub async fn active_for_job_pool(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Option<JobAssignment>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    active_for_job(&mut conn, job_id).await
}

pub async fn cancel(
    conn: &mut PgConnection,
    assignment_id: Uuid,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE job_assignments
        SET status = 'cancelled', cancelled_reason = $1
        WHERE id = $2 AND status IN ('offered', 'accepted')
        "#,
    )
    .bind(reason)
    .bind(assignment_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Record a provider response (accept) or completion on the assignment.
pub async fn set_status(
    pool: &PgPool,
    assignment_id: Uuid,
    status: AssignmentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE job_assignments
        SET status = $1,
            responded_at = CASE WHEN $1 = 'accepted' THEN NOW() ELSE responded_at END
        WHERE id = $2
        "#,
    )
    .bind(status.to_string())
    .bind(assignment_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Offers whose response deadline has passed, for the expiry sweep.
pub async fn list_expired_offers(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<JobAssignment>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS} FROM job_assignments
        WHERE status = 'offered' AND response_deadline < $1
        ORDER BY response_deadline ASC
        LIMIT $2
        "#
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_assignment).collect()
}
