use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::db::decode_enum;
use crate::models::job::{reference_code, Job, JobPriority, JobStatus, SlaSnapshot};

const JOB_COLUMNS: &str = r#"
    id, reference_code, task_id, customer_id, status, priority, is_emergency,
    service_lat, service_lng, address, requested_start,
    sla_response_minutes, sla_arrival_minutes, sla_completion_minutes, sla_penalty_percent,
    quoted_price_cents, final_price_cents, proposed_price_cents, price_agreed_at,
    started_at, completed_at, cancelled_at, created_at, updated_at
"#;

fn row_to_job(row: &PgRow) -> Result<Job, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let priority_str: String = row.try_get("priority")?;

    Ok(Job {
        id: row.try_get("id")?,
        reference_code: row.try_get("reference_code")?,
        task_id: row.try_get("task_id")?,
        customer_id: row.try_get("customer_id")?,
        status: decode_enum::<JobStatus>("status", &status_str)?,
        priority: decode_enum::<JobPriority>("priority", &priority_str)?,
        is_emergency: row.try_get("is_emergency")?,
        service_lat: row.try_get("service_lat")?,
        service_lng: row.try_get("service_lng")?,
        address: row.try_get("address")?,
        requested_start: row.try_get("requested_start")?,
        sla: SlaSnapshot {
            response_minutes: row.try_get("sla_response_minutes")?,
            arrival_minutes: row.try_get("sla_arrival_minutes")?,
            completion_minutes: row.try_get("sla_completion_minutes")?,
            penalty_percent: row.try_get("sla_penalty_percent")?,
        },
        quoted_price_cents: row.try_get("quoted_price_cents")?,
        final_price_cents: row.try_get("final_price_cents")?,
        proposed_price_cents: row.try_get("proposed_price_cents")?,
        price_agreed_at: row.try_get("price_agreed_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new job in `draft` with its immutable SLA snapshot.
#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &PgPool,
    task_id: Uuid,
    customer_id: Uuid,
    lat: f64,
    lng: f64,
    address: &str,
    requested_start: Option<DateTime<Utc>>,
    priority: JobPriority,
    sla: SlaSnapshot,
    quoted_price_cents: i64,
) -> Result<Job, sqlx::Error> {
    let id = Uuid::new_v4();
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO jobs (
            id, reference_code, task_id, customer_id, status, priority, is_emergency,
            service_lat, service_lng, address, requested_start,
            sla_response_minutes, sla_arrival_minutes, sla_completion_minutes, sla_penalty_percent,
            quoted_price_cents
        )
        VALUES ($1, $2, $3, $4, 'draft', $5, false, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(reference_code(id))
    .bind(task_id)
    .bind(customer_id)
    .bind(priority.to_string())
    .bind(lat)
    .bind(lng)
    .bind(address)
    .bind(requested_start)
    .bind(sla.response_minutes)
    .bind(sla.arrival_minutes)
    .bind(sla.completion_minutes)
    .bind(sla.penalty_percent)
    .bind(quoted_price_cents)
    .fetch_one(pool)
    .await?;

    row_to_job(&row)
}

/// Get a job by ID
pub async fn get(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Get a job by ID with a row lock, serializing concurrent assignment
/// and transition attempts on the same job.
pub async fn get_for_update(
    conn: &mut PgConnection,
    job_id: Uuid,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"
    ))
    .bind(job_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Apply a validated status change. The WHERE clause re-checks the
/// expected current status so a concurrently-moved job is not clobbered.
/// Lifecycle timestamps ride along on the relevant targets.
pub async fn set_status(
    conn: &mut PgConnection,
    job_id: Uuid,
    new_status: JobStatus,
    expected: JobStatus,
) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1,
            started_at = CASE WHEN $1 = 'in_progress' THEN NOW() ELSE started_at END,
            completed_at = CASE WHEN $1 = 'completed' THEN NOW() ELSE completed_at END,
            cancelled_at = CASE
                WHEN $1 IN ('cancelled_by_customer', 'cancelled_by_provider', 'cancelled_by_system')
                THEN NOW() ELSE cancelled_at
            END,
            updated_at = NOW()
        WHERE id = $2 AND status = $3
        "#,
    )
    .bind(new_status.to_string())
    .bind(job_id)
    .bind(expected.to_string())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Flip the emergency flags after a level-4 escalation approval. The SLA
/// snapshot is deliberately untouched.
pub async fn mark_emergency(
    conn: &mut PgConnection,
    job_id: Uuid,
    priority: JobPriority,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET is_emergency = true, priority = $1, updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(priority.to_string())
    .bind(job_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Lock the agreed price onto the job after a proposal acceptance.
pub async fn lock_agreed_price(
    conn: &mut PgConnection,
    job_id: Uuid,
    price_cents: i64,
    agreed_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET proposed_price_cents = $1, price_agreed_at = $2, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(price_cents)
    .bind(agreed_at)
    .bind(job_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Jobs starting inside the window that have not yet been reminded.
pub async fn list_needing_start_reminder(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS} FROM jobs
        WHERE requested_start BETWEEN $1 AND $2
          AND reminder_sent = false
          AND status IN ('scheduled', 'provider_accepted', 'matched')
        ORDER BY requested_start ASC
        "#
    ))
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_job).collect()
}

/// Pending jobs with no active assignment and no recent activity, for
/// the stale-pending re-queue sweep.
pub async fn list_stale_pending(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS} FROM jobs j
        WHERE j.status = 'pending_match'
          AND j.updated_at < $1
          AND NOT EXISTS (
              SELECT 1 FROM job_assignments a
              WHERE a.job_id = j.id AND a.status IN ('offered', 'accepted')
          )
        ORDER BY j.updated_at ASC
        LIMIT $2
        "#
    ))
    .bind(cutoff)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_job).collect()
}

/// Bump `updated_at` without changing anything else.
pub async fn touch(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET updated_at = NOW() WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_reminder_sent(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET reminder_sent = true, updated_at = NOW() WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}
