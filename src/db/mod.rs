use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Parse a stored enum column, surfacing unknown values as decode errors
/// instead of silently defaulting.
pub(crate) fn decode_enum<T: std::str::FromStr>(column: &str, raw: &str) -> Result<T, sqlx::Error> {
    raw.parse::<T>().map_err(|_| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unrecognized {column} value: {raw}").into(),
    })
}

pub mod assignment_queries;
pub mod escalation_queries;
pub mod job_queries;
pub mod penalty_queries;
pub mod pricing_queries;
pub mod provider_queries;
pub mod task_queries;
