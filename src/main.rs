mod app_state;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{queue::MatchQueue, weather::WeatherClient};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing home-dispatch server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("jobs_created_total", "Total jobs created");
    metrics::describe_counter!("jobs_submitted_total", "Total jobs submitted for matching");
    metrics::describe_counter!("assignments_created_total", "Total assignment offers created");
    metrics::describe_counter!("assignments_reassigned_total", "Total reassignments");
    metrics::describe_counter!("escalations_detected_total", "Total escalations detected");
    metrics::describe_counter!("escalations_approved_total", "Total escalations approved");
    metrics::describe_counter!("provider_penalties_total", "Total provider penalties applied");
    metrics::describe_counter!("provider_expulsions_total", "Total provider expulsions");
    metrics::describe_counter!("price_agreements_total", "Total accepted price proposals");
    metrics::describe_histogram!(
        "match_ranking_seconds",
        "Time to rank match candidates for a job"
    );
    metrics::describe_gauge!(
        "match_queue_depth",
        "Current number of pending match requests"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis match queue
    tracing::info!("Connecting to Redis match queue");
    let queue = MatchQueue::new(&config.redis_url).expect("Failed to initialize match queue");

    // Optional external weather feed for emergency pricing
    let weather = match &config.weather_api_url {
        Some(url) => {
            tracing::info!("Initializing weather feed client");
            Some(WeatherClient::new(url).expect("Failed to initialize weather client"))
        }
        None => None,
    };

    // Create shared application state
    let state = AppState::new(db_pool, queue, weather);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/jobs", post(routes::jobs::create_job))
        .route("/api/v1/jobs/{id}", get(routes::jobs::get_job))
        .route("/api/v1/jobs/{id}/submit", post(routes::jobs::submit_job))
        .route("/api/v1/jobs/{id}/transition", post(routes::jobs::transition_job))
        .route("/api/v1/jobs/{id}/matches", get(routes::jobs::list_matches))
        .route("/api/v1/jobs/{id}/assign", post(routes::jobs::assign_job))
        .route("/api/v1/jobs/{id}/reassign", post(routes::jobs::reassign_job))
        .route(
            "/api/v1/jobs/{id}/escalations",
            get(routes::escalations::list_escalations),
        )
        .route(
            "/api/v1/jobs/{id}/escalations/check",
            post(routes::escalations::check_escalation),
        )
        .route(
            "/api/v1/escalations/{id}/approve",
            post(routes::escalations::approve_escalation),
        )
        .route(
            "/api/v1/escalations/{id}/reject",
            post(routes::escalations::reject_escalation),
        )
        .route(
            "/api/v1/jobs/{id}/price/estimate",
            post(routes::pricing::estimate_price),
        )
        .route("/api/v1/jobs/{id}/price", get(routes::pricing::price_breakdown))
        .route(
            "/api/v1/jobs/{id}/price/proposals",
            post(routes::pricing::create_proposal).get(routes::pricing::list_proposals),
        )
        .route(
            "/api/v1/price/proposals/{id}/respond",
            post(routes::pricing::respond_to_proposal),
        )
        .route("/api/v1/jobs/{id}/price/adjust", post(routes::pricing::adjust_price))
        .route("/api/v1/jobs/{id}/price/tip", post(routes::pricing::record_tip))
        .route(
            "/api/v1/providers/{id}/penalties",
            post(routes::providers::apply_penalty).get(routes::providers::list_penalties),
        )
        .route(
            "/api/v1/providers/{id}/normalize",
            post(routes::providers::normalize_score),
        )
        .route(
            "/api/v1/providers/{id}/score/adjust",
            post(routes::providers::adjust_score),
        )
        .route("/api/v1/providers/{id}/score", get(routes::providers::get_score))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit

    tracing::info!("Starting home-dispatch on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
