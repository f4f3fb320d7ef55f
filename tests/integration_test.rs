use chrono::Utc;
use home_dispatch::{
    config::AppConfig,
    db::{self, assignment_queries, job_queries, penalty_queries, provider_queries, task_queries},
    error::EngineError,
    models::job::{JobPriority, JobStatus, SlaSnapshot},
    models::penalty::PenaltyType,
    services::{escalation, matching, queue::MatchQueue, queue::MatchRequest, scoring},
};
use uuid::Uuid;

/// Integration test: full marketplace flow
///
/// This test verifies the complete integration:
/// 1. Database connection and schema
/// 2. Job creation with SLA snapshot
/// 3. Matching, assignment, and the double-assignment guard
/// 4. Escalation detection and approval
/// 5. Penalty application and durable penalty history
/// 6. Match queue (enqueue/dequeue)
///
/// Note: This requires a running PostgreSQL and Redis instance
/// configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    // Load config from environment
    let config = AppConfig::from_env().expect("Failed to load config");

    // Initialize database
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let queue = MatchQueue::new(&config.redis_url).expect("Failed to initialize queue");

    // Pick a seeded level-3 task from the catalog
    let tasks = task_queries::list(&db_pool).await.expect("Failed to list tasks");
    let task = tasks
        .iter()
        .find(|t| t.level == 3)
        .expect("Seeded catalog should contain a level-3 task");

    // 1. Create a job with its SLA snapshot
    let job = job_queries::create(
        &db_pool,
        task.id,
        Uuid::new_v4(),
        40.7128,
        -74.0060,
        "350 Fifth Ave, New York, NY",
        None,
        JobPriority::Normal,
        SlaSnapshot::for_level(task.level),
        task.base_price_max_cents,
    )
    .await
    .expect("Failed to create job");

    assert_eq!(job.status, JobStatus::Draft);
    assert!(job.reference_code.starts_with("HD-"));
    assert_eq!(job.sla.response_minutes, 30);

    // 2. Submit for matching
    let mut conn = db_pool.acquire().await.expect("acquire");
    job_queries::set_status(&mut conn, job.id, JobStatus::PendingMatch, JobStatus::Draft)
        .await
        .expect("Failed to submit job");
    drop(conn);

    // 3. Create a qualified provider nearby and find matches
    let provider_id = seed_provider(&db_pool).await;

    let report = matching::find_matches(&db_pool, job.id, None, 10, None)
        .await
        .expect("Failed to find matches");
    assert!(report.total_evaluated >= 1);
    assert!(report.matches.iter().any(|m| m.provider_id == provider_id));

    // 4. Assign, then verify the double-assignment guard
    let assignment = matching::assign(&db_pool, job.id, provider_id, Some(90.0))
        .await
        .expect("Failed to assign");
    assert_eq!(assignment.job_id, job.id);

    let conflict = matching::assign(&db_pool, job.id, provider_id, None).await;
    assert!(matches!(conflict, Err(EngineError::Conflict(_))));

    let refreshed = job_queries::get(&db_pool, job.id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(refreshed.status, JobStatus::Matched);

    // 5. Escalation: detect, then approve to level 4
    let check = escalation::check(&db_pool, job.id, "the pipe burst and the basement is flooding — emergency")
        .await
        .expect("Failed to check escalation");
    assert!(check.should_escalate);
    assert_eq!(check.target_level, Some(4));

    let escalation_id = check.escalation_id.expect("Escalation record expected");
    escalation::approve(&db_pool, escalation_id, Uuid::new_v4())
        .await
        .expect("Failed to approve escalation");

    let escalated = job_queries::get(&db_pool, job.id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert!(escalated.is_emergency);
    assert_eq!(escalated.priority, JobPriority::Emergency);

    // A second approval must conflict
    let again = escalation::approve(&db_pool, escalation_id, Uuid::new_v4()).await;
    assert!(matches!(again, Err(EngineError::Conflict(_))));

    // 6. Penalty lands in durable history and moves the score
    let outcome = scoring::apply_penalty(
        &db_pool,
        provider_id,
        PenaltyType::ResponseTimeout,
        Some(job.id),
        Some("integration test"),
    )
    .await
    .expect("Failed to apply penalty");
    assert_eq!(outcome.new_score, outcome.previous_score - 6.0);

    let history = penalty_queries::list(&db_pool, provider_id)
        .await
        .expect("Failed to list penalties");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].penalty_type, PenaltyType::ResponseTimeout);

    // 7. Queue round trip
    let request = MatchRequest {
        job_id: job.id,
        reason: "integration".to_string(),
        attempts: 0,
    };
    queue.enqueue(&request).await.expect("Failed to enqueue");
    let dequeued = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No request in queue");
    assert_eq!(dequeued.job_id, job.id);
    queue.complete(&dequeued).await.expect("Failed to complete");

    // Cleanup: cancel the assignment and the job
    let mut conn = db_pool.acquire().await.expect("acquire");
    assignment_queries::cancel(&mut conn, assignment.id, "integration cleanup")
        .await
        .expect("Failed to cancel assignment");
    job_queries::set_status(&mut conn, job.id, JobStatus::CancelledBySystem, JobStatus::Matched)
        .await
        .expect("Failed to cancel job");
}

/// Insert a qualified level-3 provider a few km from the test job.
async fn seed_provider(pool: &sqlx::PgPool) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO providers
            (display_name, current_level, internal_score, status, home_lat, home_lng,
             service_radius_km, on_call, background_check_verified,
             license_valid_until, insurance_valid_until, avg_response_minutes, max_concurrent_jobs)
        VALUES
            ('Integration Provider', 3, 82.0, 'active', 40.73, -74.00,
             50.0, true, true, $1, $1, 12.0, 5)
        RETURNING id
        "#,
    )
    .bind(Utc::now() + chrono::Duration::days(365))
    .fetch_one(pool)
    .await
    .expect("Failed to seed provider");
    row.0
}

/// Weekly normalization against the live schema.
#[tokio::test]
#[ignore]
async fn test_normalization_recovers_toward_base() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool).await.expect("Failed to run migrations");

    let provider_id = seed_provider(&db_pool).await;

    // Push the score below base with two bad reviews (level 3: -10 each).
    for _ in 0..2 {
        scoring::apply_penalty(&db_pool, provider_id, PenaltyType::BadReview, None, None)
            .await
            .expect("Failed to apply penalty");
    }

    let provider = provider_queries::get(&db_pool, provider_id)
        .await
        .expect("query failed")
        .expect("provider missing");
    assert_eq!(provider.internal_score, 62.0);

    // Fresh penalties mean zero incident-free weeks: normalization no-ops.
    let outcome = scoring::normalize(&db_pool, provider_id)
        .await
        .expect("Failed to normalize");
    assert_eq!(outcome.points_recovered, 0.0);
    assert_eq!(outcome.incident_free_weeks, 0);
}

/// State-machine guard against the live row-level re-check.
#[tokio::test]
#[ignore]
async fn test_concurrent_status_change_is_detected() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool).await.expect("Failed to run migrations");

    let tasks = task_queries::list(&db_pool).await.expect("Failed to list tasks");
    let task = tasks.first().expect("Seeded catalog expected");

    let job = job_queries::create(
        &db_pool,
        task.id,
        Uuid::new_v4(),
        40.0,
        -74.0,
        "test",
        None,
        JobPriority::Normal,
        SlaSnapshot::for_level(task.level),
        task.base_price_max_cents,
    )
    .await
    .expect("Failed to create job");

    let mut conn = db_pool.acquire().await.expect("acquire");
    job_queries::set_status(&mut conn, job.id, JobStatus::PendingMatch, JobStatus::Draft)
        .await
        .expect("First transition should apply");

    // The expected-status re-check refuses a stale second transition.
    let stale = job_queries::set_status(&mut conn, job.id, JobStatus::PendingMatch, JobStatus::Draft).await;
    assert!(stale.is_err());
}
