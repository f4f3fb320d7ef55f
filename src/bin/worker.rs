//! Match worker: consumes the match-request queue, ranks candidates, and
//! offers each job to the top-ranked provider.

use home_dispatch::{
    config::AppConfig,
    db,
    error::EngineError,
    services::matching,
    services::queue::{MatchQueue, MatchRequest},
};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const MAX_ATTEMPTS: u32 = 3;
const POLL_INTERVAL_MS: u64 = 1000; // 1 second
const MATCH_LIMIT: usize = 5;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting match worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connecting to Redis match queue");
    let queue = MatchQueue::new(&config.redis_url).expect("Failed to initialize match queue");

    tracing::info!("Worker ready, starting match processing loop");

    // Main processing loop
    loop {
        match process_next_request(&db_pool, &queue).await {
            Ok(true) => {
                tracing::debug!("Request processed, checking for next");
            }
            Ok(false) => {
                tracing::trace!("No match requests available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing match request, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next match request from the queue.
/// Returns Ok(true) if a request was processed, Ok(false) if none available.
async fn process_next_request(
    pool: &PgPool,
    queue: &MatchQueue,
) -> Result<bool, Box<dyn std::error::Error>> {
    let request = match queue.dequeue().await? {
        Some(r) => r,
        None => return Ok(false),
    };

    if let Ok(depth) = queue.queue_depth().await {
        metrics::gauge!("match_queue_depth").set(depth as f64);
    }

    tracing::info!(
        job_id = %request.job_id,
        reason = %request.reason,
        attempts = request.attempts,
        "Processing match request"
    );

    match match_and_offer(pool, &request).await {
        Ok(Some(provider_id)) => {
            queue.complete(&request).await?;
            tracing::info!(
                job_id = %request.job_id,
                provider_id = %provider_id,
                "Job offered to top-ranked provider"
            );
            Ok(true)
        }
        Ok(None) => {
            // No qualified candidate right now; retry a bounded number of times.
            queue.complete(&request).await?;
            if request.attempts + 1 < MAX_ATTEMPTS {
                let retry = MatchRequest {
                    attempts: request.attempts + 1,
                    ..request.clone()
                };
                queue.enqueue(&retry).await?;
                tracing::info!(
                    job_id = %request.job_id,
                    attempts = retry.attempts,
                    "No candidates found, request re-queued"
                );
            } else {
                tracing::warn!(
                    job_id = %request.job_id,
                    attempts = MAX_ATTEMPTS,
                    "No candidates found after max attempts, leaving job in the pool"
                );
            }
            Ok(true)
        }
        Err(EngineError::NotFound(what)) => {
            // Job or task vanished; nothing to retry.
            queue.complete(&request).await?;
            tracing::warn!(job_id = %request.job_id, what = %what, "Match request dropped");
            Ok(true)
        }
        Err(EngineError::InvalidState(reason)) => {
            // Job moved on (cancelled, already matched elsewhere).
            queue.complete(&request).await?;
            tracing::info!(job_id = %request.job_id, reason = %reason, "Job no longer matchable");
            Ok(true)
        }
        Err(e) => {
            queue.complete(&request).await?;
            queue.enqueue(&request).await?;
            Err(e.into())
        }
    }
}

/// Rank candidates for the job and offer it to the best one.
/// Returns the chosen provider, or None when nobody qualifies.
async fn match_and_offer(
    pool: &PgPool,
    request: &MatchRequest,
) -> Result<Option<uuid::Uuid>, EngineError> {
    let start = std::time::Instant::now();
    let report = matching::find_matches(pool, request.job_id, None, MATCH_LIMIT, None).await?;
    metrics::histogram!("match_ranking_seconds").record(start.elapsed().as_secs_f64());

    tracing::info!(
        job_id = %request.job_id,
        evaluated = report.total_evaluated,
        qualified = report.total_qualified,
        "Ranked candidates"
    );

    let Some(best) = report.matches.first() else {
        return Ok(None);
    };

    let assignment = matching::assign(
        pool,
        request.job_id,
        best.provider_id,
        Some(best.composite),
    )
    .await?;

    // Offer notification is a side channel; delivery belongs to the
    // push-notification collaborator.
    tracing::info!(
        job_id = %request.job_id,
        provider_id = %best.provider_id,
        assignment_id = %assignment.id,
        respond_by = %assignment.response_deadline,
        "Offer notification emitted"
    );

    Ok(Some(best.provider_id))
}
