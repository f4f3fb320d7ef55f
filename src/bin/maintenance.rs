//! Maintenance worker: scheduled sweeps that run independently of
//! request handling.
//!
//! - expired-offer sweep: offers past their response deadline are
//!   cancelled, the provider takes a response-timeout penalty, and the
//!   job returns to the matching pool;
//! - weekly score normalization: providers below their level base
//!   recover points after incident-free weeks;
//! - stale-pending sweep: pending jobs that never made it onto the
//!   match queue are re-enqueued;
//! - job-start reminders for upcoming scheduled work.
//!
//! Every sweep recomputes from current state, so re-running after an
//! interruption is safe.

use chrono::{Duration as ChronoDuration, Utc};
use home_dispatch::{
    config::AppConfig,
    db::{self, assignment_queries, job_queries, provider_queries},
    models::job::{ActorType, JobStatus},
    models::penalty::PenaltyType,
    services::lifecycle,
    services::queue::{MatchQueue, MatchRequest},
    services::scoring,
};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const EXPIRED_OFFER_BATCH: i64 = 100;
const STALE_PENDING_BATCH: i64 = 100;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting maintenance worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connecting to Redis match queue");
    let queue = MatchQueue::new(&config.redis_url).expect("Failed to initialize match queue");

    let interval = Duration::from_secs(config.sweep_interval_secs);
    tracing::info!(interval_secs = config.sweep_interval_secs, "Maintenance loop ready");

    loop {
        if let Err(e) = sweep_expired_offers(&db_pool, &queue).await {
            tracing::error!(error = %e, "Expired-offer sweep failed");
        }
        if let Err(e) = sweep_normalization(&db_pool).await {
            tracing::error!(error = %e, "Normalization sweep failed");
        }
        if let Err(e) = sweep_stale_pending(&db_pool, &queue).await {
            tracing::error!(error = %e, "Stale-pending sweep failed");
        }
        if let Err(e) = sweep_start_reminders(&db_pool).await {
            tracing::error!(error = %e, "Start-reminder sweep failed");
        }

        sleep(interval).await;
    }
}

/// Offers past their response deadline: cancel, penalize, and return the
/// job to the pool for another round of matching.
async fn sweep_expired_offers(
    pool: &PgPool,
    queue: &MatchQueue,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let expired = assignment_queries::list_expired_offers(pool, now, EXPIRED_OFFER_BATCH).await?;

    for assignment in expired {
        let mut tx = pool.begin().await?;

        let Some(job) = job_queries::get_for_update(&mut tx, assignment.job_id).await? else {
            tx.rollback().await?;
            continue;
        };

        assignment_queries::cancel(&mut tx, assignment.id, "response deadline expired").await?;

        if job.status == JobStatus::Matched {
            lifecycle::validate(job.status, JobStatus::PendingMatch, ActorType::System)?;
            job_queries::set_status(&mut tx, job.id, JobStatus::PendingMatch, job.status).await?;
        }

        tx.commit().await?;

        // Penalty runs in its own transaction; the offer is already gone
        // even if this fails and the sweep retries.
        if let Err(e) = scoring::apply_penalty(
            pool,
            assignment.provider_id,
            PenaltyType::ResponseTimeout,
            Some(job.id),
            Some("offer response deadline expired"),
        )
        .await
        {
            tracing::error!(
                provider_id = %assignment.provider_id,
                job_id = %job.id,
                error = %e,
                "Failed to apply response-timeout penalty"
            );
        }

        let request = MatchRequest {
            job_id: job.id,
            reason: "expired_offer".to_string(),
            attempts: 0,
        };
        if let Err(e) = queue.enqueue(&request).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to re-enqueue job after expiry");
        }

        tracing::info!(
            job_id = %job.id,
            provider_id = %assignment.provider_id,
            assignment_id = %assignment.id,
            "Expired offer swept"
        );
    }

    Ok(())
}

/// Weekly score recovery. Providers are filtered on their last
/// normalization stamp, so the sweep can run on any cadence without
/// over-recovering.
async fn sweep_normalization(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let cutoff = Utc::now() - ChronoDuration::days(7);
    let due = provider_queries::list_due_for_normalization(pool, cutoff).await?;

    let mut recovered = 0usize;
    for provider_id in due {
        match scoring::normalize(pool, provider_id).await {
            Ok(outcome) if outcome.points_recovered > 0.0 => recovered += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(provider_id = %provider_id, error = %e, "Normalization failed");
            }
        }
    }

    if recovered > 0 {
        tracing::info!(providers = recovered, "Normalization sweep recovered scores");
    }

    Ok(())
}

/// Jobs sitting in `pending_match` with no active assignment and no
/// recent activity: put them back on the queue.
async fn sweep_stale_pending(
    pool: &PgPool,
    queue: &MatchQueue,
) -> Result<(), Box<dyn std::error::Error>> {
    let cutoff = Utc::now() - ChronoDuration::minutes(15);
    let stale = job_queries::list_stale_pending(pool, cutoff, STALE_PENDING_BATCH).await?;

    for job in stale {
        let request = MatchRequest {
            job_id: job.id,
            reason: "stale_pending".to_string(),
            attempts: 0,
        };
        queue.enqueue(&request).await?;
        // Touch the job so the next sweep skips it until the cutoff passes again.
        job_queries::touch(pool, job.id).await?;
        tracing::info!(job_id = %job.id, "Stale pending job re-enqueued");
    }

    Ok(())
}

/// Reminder emission for jobs starting within the next hour. Delivery is
/// the push-notification collaborator's problem; this logs and marks.
async fn sweep_start_reminders(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let upcoming = job_queries::list_needing_start_reminder(
        pool,
        now,
        now + ChronoDuration::hours(1),
    )
    .await?;

    for job in upcoming {
        tracing::info!(
            job_id = %job.id,
            reference = %job.reference_code,
            starts_at = ?job.requested_start,
            "Job start reminder emitted"
        );
        job_queries::mark_reminder_sent(pool, job.id).await?;
    }

    Ok(())
}
