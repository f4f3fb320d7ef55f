use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::db::decode_enum;
use crate::models::pricing::{
    PriceProposal, PricingEvent, PricingEventType, ProposalStatus, ProposerRole,
};

const EVENT_COLUMNS: &str =
    "id, job_id, event_type, amount_cents, multiplier, detail, actor_id, created_at";

const PROPOSAL_COLUMNS: &str = r#"
    id, job_id, proposed_by, proposer_role, price_cents, description, status,
    responded_by, created_at, responded_at
"#;

fn row_to_event(row: &PgRow) -> Result<PricingEvent, sqlx::Error> {
    let type_str: String = row.try_get("event_type")?;

    Ok(PricingEvent {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        event_type: decode_enum::<PricingEventType>("event_type", &type_str)?,
        amount_cents: row.try_get("amount_cents")?,
        multiplier: row.try_get("multiplier")?,
        detail: row.try_get("detail")?,
        actor_id: row.try_get("actor_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_proposal(row: &PgRow) -> Result<PriceProposal, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let role_str: String = row.try_get("proposer_role")?;

    Ok(PriceProposal {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        proposed_by: row.try_get("proposed_by")?,
        proposer_role: decode_enum::<ProposerRole>("proposer_role", &role_str)?,
        price_cents: row.try_get("price_cents")?,
        description: row.try_get("description")?,
        status: decode_enum::<ProposalStatus>("status", &status_str)?,
        responded_by: row.try_get("responded_by")?,
        created_at: row.try_get("created_at")?,
        responded_at: row.try_get("responded_at")?,
    })
}

/// Append a pricing audit event inside an open transaction.
pub async fn insert_event_tx(
    conn: &mut PgConnection,
    job_id: Uuid,
    event_type: PricingEventType,
    amount_cents: Option<i64>,
    multiplier: Option<f64>,
    detail: serde_json::Value,
    actor_id: Option<Uuid>,
) -> Result<PricingEvent, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO pricing_events (job_id, event_type, amount_cents, multiplier, detail, actor_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {EVENT_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(event_type.to_string())
    .bind(amount_cents)
    .bind(multiplier)
    .bind(detail)
    .bind(actor_id)
    .fetch_one(conn)
    .await?;

    row_to_event(&row)
}

/// Append a pricing audit event.
pub async fn insert_event(
    pool: &PgPool,
    job_id: Uuid,
    event_type: PricingEventType,
    amount_cents: Option<i64>,
    multiplier: Option<f64>,
    detail: serde_json::Value,
    actor_id: Option<Uuid>,
) -> Result<PricingEvent, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    insert_event_tx(&mut conn, job_id, event_type, amount_cents, multiplier, detail, actor_id).await
}

/// Most recent pricing event for a job.
pub async fn latest_event(pool: &PgPool, job_id: Uuid) -> Result<Option<PricingEvent>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {EVENT_COLUMNS} FROM pricing_events
        WHERE job_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_event).transpose()
}

pub async fn insert_proposal(
    conn: &mut PgConnection,
    job_id: Uuid,
    proposed_by: Uuid,
    role: ProposerRole,
    price_cents: i64,
    description: Option<&str>,
) -> Result<PriceProposal, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO price_proposals (job_id, proposed_by, proposer_role, price_cents, description, status)
        VALUES ($1, $2, $3, $4, $5, 'pending')
        RETURNING {PROPOSAL_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(proposed_by)
    .bind(role.to_string())
    .bind(price_cents)
    .bind(description)
    .fetch_one(conn)
    .await?;

    row_to_proposal(&row)
}

pub async fn get_proposal(
    pool: &PgPool,
    proposal_id: Uuid,
) -> Result<Option<PriceProposal>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PROPOSAL_COLUMNS} FROM price_proposals WHERE id = $1"
    ))
    .bind(proposal_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_proposal).transpose()
}

pub async fn set_proposal_status(
    conn: &mut PgConnection,
    proposal_id: Uuid,
    status: ProposalStatus,
    responded_by: Option<Uuid>,
) -> Result<PriceProposal, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE price_proposals
        SET status = $1, responded_by = $2, responded_at = NOW()
        WHERE id = $3
        RETURNING {PROPOSAL_COLUMNS}
        "#
    ))
    .bind(status.to_string())
    .bind(responded_by)
    .bind(proposal_id)
    .fetch_one(conn)
    .await?;

    row_to_proposal(&row)
}

/// Supersede every pending or accepted proposal for a job. Returns the
/// number of proposals displaced.
pub async fn supersede_proposals(
    conn: &mut PgConnection,
    job_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE price_proposals
        SET status = 'superseded'
        WHERE job_id = $1 AND status IN ('pending', 'accepted')
        "#,
    )
    .bind(job_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn list_proposals(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Vec<PriceProposal>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {PROPOSAL_COLUMNS} FROM price_proposals WHERE job_id = $1 ORDER BY created_at DESC"
    ))
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_proposal).collect()
}
