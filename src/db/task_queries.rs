use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::task::ServiceTask;

const TASK_COLUMNS: &str = r#"
    id, name, category, level, regulated, license_required, insurance_required,
    hazardous, structural, emergency_eligible,
    base_price_min_cents, base_price_max_cents, escalation_keywords
"#;

fn row_to_task(row: &PgRow) -> Result<ServiceTask, sqlx::Error> {
    Ok(ServiceTask {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        level: row.try_get("level")?,
        regulated: row.try_get("regulated")?,
        license_required: row.try_get("license_required")?,
        insurance_required: row.try_get("insurance_required")?,
        hazardous: row.try_get("hazardous")?,
        structural: row.try_get("structural")?,
        emergency_eligible: row.try_get("emergency_eligible")?,
        base_price_min_cents: row.try_get("base_price_min_cents")?,
        base_price_max_cents: row.try_get("base_price_max_cents")?,
        escalation_keywords: row.try_get("escalation_keywords")?,
    })
}

/// Get a catalog task by ID
pub async fn get(pool: &PgPool, task_id: Uuid) -> Result<Option<ServiceTask>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM service_tasks WHERE id = $1"
    ))
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_task).transpose()
}

/// List the full catalog
pub async fn list(pool: &PgPool) -> Result<Vec<ServiceTask>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM service_tasks ORDER BY level, name"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_task).collect()
}
