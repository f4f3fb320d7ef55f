//! Provider matching: geographic filtering, hard qualification checks,
//! and weighted composite ranking, plus assignment creation and
//! reassignment.
//!
//! The ranking pipeline is pure and deterministic; the async wrappers
//! load state, run it, and persist assignments inside a transaction that
//! locks the job row so concurrent assigns cannot double-book a job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{assignment_queries, job_queries, provider_queries, task_queries};
use crate::error::EngineError;
use crate::models::assignment::JobAssignment;
use crate::models::job::{ActorType, JobStatus};
use crate::models::provider::{ProviderProfile, ProviderStatus};
use crate::models::task::ServiceTask;
use crate::services::{geo, lifecycle};

/// Distance at or beyond which the distance component scores zero.
pub const MAX_DISTANCE_KM: f64 = 50.0;

/// Average response time at or beyond which the response component scores zero.
pub const MAX_RESPONSE_TIME_MIN: f64 = 60.0;

/// Upper bound of the internal score scale.
pub const MAX_INTERNAL_SCORE: f64 = 100.0;

/// Neutral response score for providers without history.
const NEUTRAL_RESPONSE_SCORE: f64 = 50.0;

/// Bounds on the requested result count.
const MIN_RESULTS: usize = 1;
const MAX_RESULTS: usize = 50;

/// Weights for the composite ranking blend. Must sum to 1.0 ± 0.01.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingWeights {
    pub internal: f64,
    pub distance: f64,
    pub response: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self { internal: 0.6, distance: 0.3, response: 0.1 }
    }
}

impl RankingWeights {
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, w) in [
            ("internal", self.internal),
            ("distance", self.distance),
            ("response", self.response),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "ranking weight {name} must be a non-negative number, got {w}"
                )));
            }
        }
        let sum = self.internal + self.distance + self.response;
        if (sum - 1.0).abs() > 0.01 {
            return Err(EngineError::InvalidInput(format!(
                "ranking weights must sum to 1.0 (±0.01), got {sum}"
            )));
        }
        Ok(())
    }
}

/// Internal score component: the score is already on a 0–100 scale.
pub fn score_internal(internal_score: f64) -> f64 {
    internal_score.clamp(0.0, MAX_INTERNAL_SCORE)
}

/// Distance component: 100 at the job's doorstep, 0 at 50 km and beyond.
pub fn score_distance(distance_km: f64) -> f64 {
    if distance_km <= 0.0 {
        100.0
    } else if distance_km >= MAX_DISTANCE_KM {
        0.0
    } else {
        (MAX_DISTANCE_KM - distance_km) / MAX_DISTANCE_KM * 100.0
    }
}

/// Response component: neutral 50 without history, else linear from 100
/// at instant response down to 0 at an hour.
pub fn score_response(avg_response_minutes: Option<f64>) -> f64 {
    match avg_response_minutes {
        None => NEUTRAL_RESPONSE_SCORE,
        Some(avg) if avg <= 0.0 => 100.0,
        Some(avg) if avg >= MAX_RESPONSE_TIME_MIN => 0.0,
        Some(avg) => (MAX_RESPONSE_TIME_MIN - avg) / MAX_RESPONSE_TIME_MIN * 100.0,
    }
}

/// Hard qualification filter: pass/fail, no partial credit.
pub fn qualifies(provider: &ProviderProfile, task: &ServiceTask, now: DateTime<Utc>) -> bool {
    if provider.status != ProviderStatus::Active {
        return false;
    }
    if provider.current_level < task.level {
        return false;
    }
    if !provider.background_check_verified {
        return false;
    }
    if task.license_required && !provider.has_valid_license(now) {
        return false;
    }
    if task.insurance_required && !provider.has_valid_insurance(now) {
        return false;
    }
    if task.level == 4 && !provider.on_call {
        return false;
    }
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedMatch {
    pub provider_id: Uuid,
    pub display_name: String,
    pub level: i16,
    pub distance_km: f64,
    pub score_internal: f64,
    pub score_distance: f64,
    pub score_response: f64,
    pub composite: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub total_evaluated: usize,
    pub total_qualified: usize,
    pub matches: Vec<RankedMatch>,
}

/// Run the full ranking pipeline over a candidate set. Pure and
/// deterministic: identical inputs and weights yield identical order.
pub fn rank_candidates(
    service_lat: f64,
    service_lng: f64,
    task: &ServiceTask,
    providers: &[ProviderProfile],
    weights: RankingWeights,
    radius_override: Option<f64>,
    max_results: usize,
    now: DateTime<Utc>,
) -> Result<MatchReport, EngineError> {
    weights.validate()?;

    if !(MIN_RESULTS..=MAX_RESULTS).contains(&max_results) {
        return Err(EngineError::InvalidInput(format!(
            "max_results must be between {MIN_RESULTS} and {MAX_RESULTS}, got {max_results}"
        )));
    }

    let total_evaluated = providers.len();
    let mut matches: Vec<RankedMatch> = Vec::new();

    for provider in providers {
        let (Some(home_lat), Some(home_lng)) = (provider.home_lat, provider.home_lng) else {
            continue;
        };

        let distance = geo::haversine_km(service_lat, service_lng, home_lat, home_lng);
        let radius = radius_override.unwrap_or(provider.service_radius_km);
        if distance > radius {
            continue;
        }

        if !qualifies(provider, task, now) {
            continue;
        }

        let s_internal = score_internal(provider.internal_score);
        let s_distance = score_distance(distance);
        let s_response = score_response(provider.avg_response_minutes);
        let composite = s_internal * weights.internal
            + s_distance * weights.distance
            + s_response * weights.response;

        matches.push(RankedMatch {
            provider_id: provider.id,
            display_name: provider.display_name.clone(),
            level: provider.current_level,
            distance_km: distance,
            score_internal: s_internal,
            score_distance: s_distance,
            score_response: s_response,
            composite,
        });
    }

    let total_qualified = matches.len();

    matches.sort_by(|a, b| {
        b.composite
            .total_cmp(&a.composite)
            .then(b.score_internal.total_cmp(&a.score_internal))
            .then(a.distance_km.total_cmp(&b.distance_km))
    });
    matches.truncate(max_results);

    Ok(MatchReport { total_evaluated, total_qualified, matches })
}

/// Load a job and its candidate pool, then rank.
pub async fn find_matches(
    pool: &PgPool,
    job_id: Uuid,
    radius_override: Option<f64>,
    max_results: usize,
    weights: Option<RankingWeights>,
) -> Result<MatchReport, EngineError> {
    let job = job_queries::get(pool, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    let task = task_queries::get(pool, job.task_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {}", job.task_id)))?;

    let providers = provider_queries::list_candidates(pool).await?;

    let report = rank_candidates(
        job.service_lat,
        job.service_lng,
        &task,
        &providers,
        weights.unwrap_or_default(),
        radius_override,
        max_results,
        Utc::now(),
    )?;

    tracing::debug!(
        job_id = %job_id,
        evaluated = report.total_evaluated,
        qualified = report.total_qualified,
        "ranked match candidates"
    );

    Ok(report)
}

/// Create an assignment offer for a provider.
///
/// The job row is locked for the duration so two concurrent assigns
/// serialize; the second sees the first's active assignment and fails
/// with a conflict. The provider's concurrency cap is enforced the same
/// way.
pub async fn assign(
    pool: &PgPool,
    job_id: Uuid,
    provider_id: Uuid,
    match_score: Option<f64>,
) -> Result<JobAssignment, EngineError> {
    let mut tx = pool.begin().await?;

    let job = job_queries::get_for_update(&mut tx, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    let provider = provider_queries::get_for_update(&mut tx, provider_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;

    if assignment_queries::count_active_for_job(&mut tx, job_id).await? > 0 {
        return Err(EngineError::Conflict(format!(
            "job {job_id} already has an active assignment"
        )));
    }

    let provider_active = assignment_queries::count_active_for_provider(&mut tx, provider_id).await?;
    if provider_active >= provider.max_concurrent_jobs as i64 {
        return Err(EngineError::Conflict(format!(
            "provider {provider_id} is at its concurrent job limit ({})",
            provider.max_concurrent_jobs
        )));
    }

    // A job already matched stays matched; anything else must pass the
    // state machine into `matched`.
    if job.status != JobStatus::Matched {
        lifecycle::validate(job.status, JobStatus::Matched, ActorType::System)?;
        job_queries::set_status(&mut tx, job_id, JobStatus::Matched, job.status).await?;
    }

    let now = Utc::now();
    let assignment = assignment_queries::insert(
        &mut tx,
        job_id,
        provider_id,
        match_score,
        now + Duration::minutes(job.sla.response_minutes as i64),
        now + Duration::minutes(job.sla.arrival_minutes as i64),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        job_id = %job_id,
        provider_id = %provider_id,
        assignment_id = %assignment.id,
        match_score = ?match_score,
        "assignment offered"
    );
    metrics::counter!("assignments_created_total").increment(1);

    Ok(assignment)
}

/// Cancel any active assignment, return the job to the matching pool,
/// and offer it to a new provider — all in one transaction.
pub async fn reassign(
    pool: &PgPool,
    job_id: Uuid,
    new_provider_id: Uuid,
    reason: Option<&str>,
) -> Result<JobAssignment, EngineError> {
    let mut tx = pool.begin().await?;

    let job = job_queries::get_for_update(&mut tx, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    let provider = provider_queries::get_for_update(&mut tx, new_provider_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("provider {new_provider_id}")))?;

    if let Some(active) = assignment_queries::active_for_job(&mut tx, job_id).await? {
        assignment_queries::cancel(
            &mut tx,
            active.id,
            reason.unwrap_or("reassigned"),
        )
        .await?;
        tracing::info!(
            job_id = %job_id,
            assignment_id = %active.id,
            old_provider_id = %active.provider_id,
            "assignment cancelled for reassignment"
        );
    }

    // Reset to the matching pool, then immediately re-match.
    let mut current = job.status;
    if current != JobStatus::PendingMatch {
        lifecycle::validate(current, JobStatus::PendingMatch, ActorType::System)?;
        job_queries::set_status(&mut tx, job_id, JobStatus::PendingMatch, current).await?;
        current = JobStatus::PendingMatch;
    }

    let provider_active =
        assignment_queries::count_active_for_provider(&mut tx, new_provider_id).await?;
    if provider_active >= provider.max_concurrent_jobs as i64 {
        return Err(EngineError::Conflict(format!(
            "provider {new_provider_id} is at its concurrent job limit ({})",
            provider.max_concurrent_jobs
        )));
    }

    lifecycle::validate(current, JobStatus::Matched, ActorType::System)?;
    job_queries::set_status(&mut tx, job_id, JobStatus::Matched, current).await?;

    let now = Utc::now();
    let assignment = assignment_queries::insert(
        &mut tx,
        job_id,
        new_provider_id,
        None,
        now + Duration::minutes(job.sla.response_minutes as i64),
        now + Duration::minutes(job.sla.arrival_minutes as i64),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        job_id = %job_id,
        provider_id = %new_provider_id,
        assignment_id = %assignment.id,
        "job reassigned"
    );
    metrics::counter!("assignments_reassigned_total").increment(1);

    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(level: i16) -> ServiceTask {
        ServiceTask {
            id: Uuid::new_v4(),
            name: "Test task".to_string(),
            category: "plumbing".to_string(),
            level,
            regulated: false,
            license_required: false,
            insurance_required: false,
            hazardous: false,
            structural: false,
            emergency_eligible: level == 4,
            base_price_min_cents: 10_000,
            base_price_max_cents: 20_000,
            escalation_keywords: Vec::new(),
        }
    }

    fn provider(internal_score: f64, home: (f64, f64), avg_response: Option<f64>) -> ProviderProfile {
        let now = Utc::now();
        ProviderProfile {
            id: Uuid::new_v4(),
            display_name: "Test Provider".to_string(),
            current_level: 3,
            internal_score,
            status: ProviderStatus::Active,
            home_lat: Some(home.0),
            home_lng: Some(home.1),
            service_radius_km: 50.0,
            on_call: false,
            background_check_verified: true,
            license_valid_until: Some(now + Duration::days(365)),
            insurance_valid_until: Some(now + Duration::days(365)),
            avg_response_minutes: avg_response,
            max_concurrent_jobs: 3,
            last_penalty_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Provider at roughly `km` kilometers north of the origin.
    fn offset_lat(km: f64) -> f64 {
        km / 111.0
    }

    #[test]
    fn test_component_scores() {
        assert_eq!(score_internal(80.0), 80.0);
        assert_eq!(score_internal(150.0), 100.0);
        assert_eq!(score_internal(-5.0), 0.0);

        assert_eq!(score_distance(0.0), 100.0);
        assert_eq!(score_distance(50.0), 0.0);
        assert_eq!(score_distance(60.0), 0.0);
        assert!((score_distance(5.0) - 90.0).abs() < 1e-9);

        assert_eq!(score_response(None), 50.0);
        assert_eq!(score_response(Some(0.0)), 100.0);
        assert_eq!(score_response(Some(60.0)), 0.0);
        assert_eq!(score_response(Some(90.0)), 0.0);
        assert!((score_response(Some(10.0)) - 83.333333).abs() < 1e-4);
    }

    #[test]
    fn test_weight_validation() {
        assert!(RankingWeights::default().validate().is_ok());
        assert!(RankingWeights { internal: 0.5, distance: 0.4, response: 0.1 }.validate().is_ok());
        // Within tolerance.
        assert!(RankingWeights { internal: 0.6, distance: 0.3, response: 0.105 }.validate().is_ok());
        // Outside tolerance.
        assert!(RankingWeights { internal: 0.5, distance: 0.3, response: 0.1 }.validate().is_err());
        assert!(RankingWeights { internal: 1.5, distance: -0.4, response: -0.1 }.validate().is_err());
    }

    #[test]
    fn test_bad_weights_rejected_before_scoring() {
        let providers = vec![provider(80.0, (offset_lat(5.0), 0.0), Some(10.0))];
        let bad = RankingWeights { internal: 0.9, distance: 0.3, response: 0.1 };
        let err = rank_candidates(0.0, 0.0, &task(1), &providers, bad, None, 10, Utc::now());
        assert!(matches!(err, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_max_results_bounds() {
        let providers = vec![provider(80.0, (0.0, 0.0), None)];
        for bad in [0usize, 51, 100] {
            let err = rank_candidates(
                0.0, 0.0, &task(1), &providers, RankingWeights::default(), None, bad, Utc::now(),
            );
            assert!(matches!(err, Err(EngineError::InvalidInput(_))), "{bad}");
        }
    }

    #[test]
    fn test_reference_ranking_example() {
        // A: internal 80, 5 km, 10 min avg response → composite ≈ 83.33
        // B: internal 60, 2 km, 5 min avg response → composite ≈ 73.97
        let a = provider(80.0, (offset_lat(5.0), 0.0), Some(10.0));
        let b = provider(60.0, (offset_lat(2.0), 0.0), Some(5.0));
        let a_id = a.id;

        let report = rank_candidates(
            0.0,
            0.0,
            &task(1),
            &[b, a],
            RankingWeights::default(),
            None,
            10,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(report.total_evaluated, 2);
        assert_eq!(report.total_qualified, 2);
        assert_eq!(report.matches[0].provider_id, a_id);
        assert!((report.matches[0].composite - 83.33).abs() < 0.1, "{}", report.matches[0].composite);
        assert!((report.matches[1].composite - 73.97).abs() < 0.1, "{}", report.matches[1].composite);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let providers: Vec<ProviderProfile> = (0..10)
            .map(|i| provider(50.0 + i as f64 * 4.0, (offset_lat(i as f64 * 3.0), 0.0), Some(i as f64 * 5.0)))
            .collect();

        let run = || {
            rank_candidates(
                0.0, 0.0, &task(1), &providers, RankingWeights::default(), None, 10, Utc::now(),
            )
            .unwrap()
            .matches
            .iter()
            .map(|m| m.provider_id)
            .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_geo_filter_uses_provider_radius() {
        let mut near = provider(80.0, (offset_lat(5.0), 0.0), None);
        near.service_radius_km = 10.0;
        let mut far = provider(90.0, (offset_lat(30.0), 0.0), None);
        far.service_radius_km = 10.0;

        let report = rank_candidates(
            0.0,
            0.0,
            &task(1),
            &[near.clone(), far],
            RankingWeights::default(),
            None,
            10,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(report.total_evaluated, 2);
        assert_eq!(report.total_qualified, 1);
        assert_eq!(report.matches[0].provider_id, near.id);
    }

    #[test]
    fn test_radius_override_widens_the_net() {
        let mut far = provider(90.0, (offset_lat(30.0), 0.0), None);
        far.service_radius_km = 10.0;

        let report = rank_candidates(
            0.0, 0.0, &task(1), &[far], RankingWeights::default(), Some(40.0), 10, Utc::now(),
        )
        .unwrap();
        assert_eq!(report.total_qualified, 1);
    }

    #[test]
    fn test_qualification_filters() {
        let now = Utc::now();
        let base = provider(80.0, (0.0, 0.0), None);

        // Level too low.
        let mut p = base.clone();
        p.current_level = 2;
        assert!(!qualifies(&p, &task(3), now));

        // Background check missing.
        let mut p = base.clone();
        p.background_check_verified = false;
        assert!(!qualifies(&p, &task(1), now));

        // Expired license when required.
        let mut p = base.clone();
        p.license_valid_until = Some(now - Duration::days(1));
        let mut t = task(3);
        t.license_required = true;
        assert!(!qualifies(&p, &t, now));

        // Missing insurance when required.
        let mut p = base.clone();
        p.insurance_valid_until = None;
        let mut t = task(3);
        t.insurance_required = true;
        assert!(!qualifies(&p, &t, now));

        // Level-4 task requires an on-call provider.
        let mut p = base.clone();
        p.current_level = 4;
        p.on_call = false;
        assert!(!qualifies(&p, &task(4), now));
        p.on_call = true;
        assert!(qualifies(&p, &task(4), now));

        // Suspended providers never qualify.
        let mut p = base.clone();
        p.status = ProviderStatus::Suspended;
        assert!(!qualifies(&p, &task(1), now));
    }

    #[test]
    fn test_providers_without_coordinates_are_skipped() {
        let mut p = provider(80.0, (0.0, 0.0), None);
        p.home_lat = None;

        let report = rank_candidates(
            0.0, 0.0, &task(1), &[p], RankingWeights::default(), None, 10, Utc::now(),
        )
        .unwrap();
        assert_eq!(report.total_evaluated, 1);
        assert_eq!(report.total_qualified, 0);
    }

    #[test]
    fn test_tie_breaks() {
        // Equal composites: higher internal wins, then nearer provider.
        let mut a = provider(80.0, (offset_lat(10.0), 0.0), Some(30.0));
        let mut b = provider(80.0, (offset_lat(10.0), 0.0), Some(30.0));
        a.display_name = "A".to_string();
        b.display_name = "B".to_string();
        b.home_lat = Some(offset_lat(5.0));

        let report = rank_candidates(
            0.0,
            0.0,
            &task(1),
            &[a, b],
            // All weight on internal: identical composites, tie broken by distance.
            RankingWeights { internal: 1.0, distance: 0.0, response: 0.0 },
            None,
            10,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(report.matches[0].display_name, "B");
    }

    #[test]
    fn test_truncation() {
        let providers: Vec<ProviderProfile> = (0..8)
            .map(|i| provider(50.0 + i as f64, (offset_lat(i as f64), 0.0), None))
            .collect();
        let report = rank_candidates(
            0.0, 0.0, &task(1), &providers, RankingWeights::default(), None, 3, Utc::now(),
        )
        .unwrap();
        assert_eq!(report.total_qualified, 8);
        assert_eq!(report.matches.len(), 3);
    }
}
