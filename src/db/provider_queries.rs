use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::db::decode_enum;
use crate::models::provider::{ProviderProfile, ProviderStatus};

const PROVIDER_COLUMNS: &str = r#"
    id, display_name, current_level, internal_score, status,
    home_lat, home_lng, service_radius_km, on_call, background_check_verified,
    license_valid_until, insurance_valid_until, avg_response_minutes,
    max_concurrent_jobs, last_penalty_at, created_at, updated_at
"#;

fn row_to_provider(row: &PgRow) -> Result<ProviderProfile, sqlx::Error> {
    let status_str: String = row.try_get("status")?;

    Ok(ProviderProfile {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        current_level: row.try_get("current_level")?,
        internal_score: row.try_get("internal_score")?,
        status: decode_enum::<ProviderStatus>("status", &status_str)?,
        home_lat: row.try_get("home_lat")?,
        home_lng: row.try_get("home_lng")?,
        service_radius_km: row.try_get("service_radius_km")?,
        on_call: row.try_get("on_call")?,
        background_check_verified: row.try_get("background_check_verified")?,
        license_valid_until: row.try_get("license_valid_until")?,
        insurance_valid_until: row.try_get("insurance_valid_until")?,
        avg_response_minutes: row.try_get("avg_response_minutes")?,
        max_concurrent_jobs: row.try_get("max_concurrent_jobs")?,
        last_penalty_at: row.try_get("last_penalty_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Get a provider by ID
pub async fn get(pool: &PgPool, provider_id: Uuid) -> Result<Option<ProviderProfile>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = $1"
    ))
    .bind(provider_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_provider).transpose()
}

/// Get a provider with a row lock. All score read-modify-writes go
/// through this so concurrent penalty/adjustment/normalization calls
/// serialize per provider.
pub async fn get_for_update(
    conn: &mut PgConnection,
    provider_id: Uuid,
) -> Result<Option<ProviderProfile>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = $1 FOR UPDATE"
    ))
    .bind(provider_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(row_to_provider).transpose()
}

/// Candidate pool for matching. Every provider is loaded; the ranking
/// pipeline itself filters on status and qualifications so the report's
/// evaluated/qualified counts stay meaningful.
pub async fn list_candidates(pool: &PgPool) -> Result<Vec<ProviderProfile>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_provider).collect()
}

pub async fn update_score(
    conn: &mut PgConnection,
    provider_id: Uuid,
    score: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE providers SET internal_score = $1, updated_at = NOW() WHERE id = $2")
        .bind(score)
        .bind(provider_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_after_penalty(
    conn: &mut PgConnection,
    provider_id: Uuid,
    score: f64,
    status: ProviderStatus,
    applied_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE providers
        SET internal_score = $1, status = $2, last_penalty_at = $3, updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(score)
    .bind(status.to_string())
    .bind(applied_at)
    .bind(provider_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_after_normalization(
    conn: &mut PgConnection,
    provider_id: Uuid,
    score: f64,
    normalized_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE providers
        SET internal_score = $1, last_normalized_at = $2, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(score)
    .bind(normalized_at)
    .bind(provider_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Providers due for the weekly recovery sweep: active, below their
/// level base, and not normalized inside the last week. The cutoff makes
/// the sweep idempotent across re-runs.
pub async fn list_due_for_normalization(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id FROM providers
        WHERE status = 'active'
          AND (last_normalized_at IS NULL OR last_normalized_at < $1)
        ORDER BY id
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| r.try_get("id")).collect()
}
