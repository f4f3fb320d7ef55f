//! Cross-engine tests over the pure cores: lifecycle validation,
//! ranking, scoring, escalation scanning, and pricing composition.
//! None of these touch the database.

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use home_dispatch::models::job::{ActorType, JobStatus, SlaSnapshot};
use home_dispatch::models::penalty::PenaltyType;
use home_dispatch::models::provider::{ProviderProfile, ProviderStatus};
use home_dispatch::models::task::ServiceTask;
use home_dispatch::services::{escalation, lifecycle, matching, pricing, scoring};

fn task(level: i16) -> ServiceTask {
    ServiceTask {
        id: Uuid::new_v4(),
        name: "Test task".to_string(),
        category: "plumbing".to_string(),
        level,
        regulated: level >= 3,
        license_required: level >= 2,
        insurance_required: level >= 3,
        hazardous: false,
        structural: false,
        emergency_eligible: level == 4,
        base_price_min_cents: 10_000,
        base_price_max_cents: 30_000,
        escalation_keywords: Vec::new(),
    }
}

fn provider(level: i16, score: f64, km_away: f64, avg_response: Option<f64>) -> ProviderProfile {
    let now = Utc::now();
    ProviderProfile {
        id: Uuid::new_v4(),
        display_name: format!("Provider {score}"),
        current_level: level,
        internal_score: score,
        status: ProviderStatus::Active,
        home_lat: Some(km_away / 111.0),
        home_lng: Some(0.0),
        service_radius_km: 50.0,
        on_call: true,
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

// ── Lifecycle ────────────────────────────────────────────────────────

#[test]
fn full_happy_path_is_legal_step_by_step() {
    let path = [
        (JobStatus::Draft, JobStatus::PendingMatch, ActorType::Customer),
        (JobStatus::PendingMatch, JobStatus::Matched, ActorType::System),
        (JobStatus::Matched, JobStatus::ProviderAccepted, ActorType::Provider),
        (JobStatus::ProviderAccepted, JobStatus::ProviderEnRoute, ActorType::Provider),
        (JobStatus::ProviderEnRoute, JobStatus::InProgress, ActorType::Provider),
        (JobStatus::InProgress, JobStatus::Completed, ActorType::Provider),
    ];
    for (from, to, actor) in path {
        assert!(lifecycle::validate(from, to, actor).is_ok(), "{from} -> {to}");
    }
}

#[test]
fn negotiated_path_rejoins_the_main_flow() {
    let path = [
        (JobStatus::Matched, JobStatus::PendingPriceAgreement, ActorType::Provider),
        (JobStatus::PendingPriceAgreement, JobStatus::Scheduled, ActorType::System),
        (JobStatus::Scheduled, JobStatus::ProviderEnRoute, ActorType::Provider),
        (JobStatus::ProviderEnRoute, JobStatus::InProgress, ActorType::Provider),
        // On-site scope change loops back through negotiation.
        (JobStatus::InProgress, JobStatus::PendingPriceAgreement, ActorType::Provider),
        (JobStatus::PendingPriceAgreement, JobStatus::Scheduled, ActorType::System),
    ];
    for (from, to, actor) in path {
        assert!(lifecycle::validate(from, to, actor).is_ok(), "{from} -> {to}");
    }
}

#[test]
fn skipping_states_is_denied_with_the_allowed_set() {
    let err = lifecycle::validate(JobStatus::Draft, JobStatus::Completed, ActorType::Admin)
        .unwrap_err()
        .to_string();
    assert!(err.contains("allowed targets from draft"), "{err}");
    assert!(err.contains("pending_match"), "{err}");
}

#[test]
fn validate_has_no_side_effects() {
    for _ in 0..3 {
        let targets = lifecycle::valid_targets(JobStatus::Matched, ActorType::Provider);
        assert_eq!(targets, lifecycle::valid_targets(JobStatus::Matched, ActorType::Provider));
    }
}

// ── Matching ─────────────────────────────────────────────────────────

#[test]
fn reference_candidates_rank_a_before_b() {
    let a = provider(3, 80.0, 5.0, Some(10.0));
    let b = provider(3, 60.0, 2.0, Some(5.0));
    let a_id = a.id;
    let b_id = b.id;

    let report = matching::rank_candidates(
        0.0,
        0.0,
        &task(2),
        &[b, a],
        matching::RankingWeights::default(),
        None,
        10,
        Utc::now(),
    )
    .unwrap();

    assert_eq!(report.matches.len(), 2);
    assert_eq!(report.matches[0].provider_id, a_id);
    assert_eq!(report.matches[1].provider_id, b_id);
    assert!((report.matches[0].composite - 83.33).abs() < 0.1);
    assert!((report.matches[1].composite - 73.97).abs() < 0.1);
}

#[test]
fn invalid_weights_fail_before_any_scoring() {
    let candidates = vec![provider(3, 80.0, 5.0, None)];
    let result = matching::rank_candidates(
        0.0,
        0.0,
        &task(2),
        &candidates,
        matching::RankingWeights { internal: 0.8, distance: 0.3, response: 0.1 },
        None,
        10,
        Utc::now(),
    );
    assert!(result.is_err());
}

#[test]
fn underqualified_providers_are_filtered_not_downranked() {
    // A stellar level-1 provider cannot take a level-3 task at all.
    let strong_but_low = provider(1, 100.0, 1.0, Some(0.0));
    let weak_but_qualified = provider(3, 60.0, 20.0, Some(45.0));
    let qualified_id = weak_but_qualified.id;

    let report = matching::rank_candidates(
        0.0,
        0.0,
        &task(3),
        &[strong_but_low, weak_but_qualified],
        matching::RankingWeights::default(),
        None,
        10,
        Utc::now(),
    )
    .unwrap();

    assert_eq!(report.total_evaluated, 2);
    assert_eq!(report.total_qualified, 1);
    assert_eq!(report.matches[0].provider_id, qualified_id);
}

// ── Scoring ──────────────────────────────────────────────────────────

#[test]
fn level4_no_show_expels_regardless_of_standing() {
    let outcome = scoring::compute_penalty(4, 85.0, PenaltyType::NoShow).unwrap();
    assert_eq!(outcome.new_score, 0.0);
    assert!(outcome.is_expelled);
}

#[test]
fn penalties_then_recovery_stay_inside_level_bounds() {
    let mut score = 70.0;
    for _ in 0..20 {
        let outcome = scoring::compute_penalty(1, score, PenaltyType::BadReview).unwrap();
        score = outcome.new_score;
        let config = scoring::level_config(1);
        assert!(score >= config.min && score <= config.max);
    }
    assert_eq!(score, 40.0);

    for _ in 0..20 {
        let outcome = scoring::compute_recovery(1, score, 4);
        score = outcome.new_score;
        assert!(score <= scoring::level_config(1).base);
    }
    assert_eq!(score, 70.0);
}

#[test]
fn manual_minus_hundred_clamps_to_level_one_floor() {
    assert_eq!(scoring::clamp_score(1, 71.0 - 100.0), 40.0);
}

// ── Escalation ───────────────────────────────────────────────────────

#[test]
fn gas_leak_with_flood_targets_level_four() {
    let matches = escalation::scan("Gas leak caused a flood in the basement");
    let top = matches.iter().map(|m| m.level).max().unwrap();
    assert_eq!(top, 4);

    let reported: Vec<&str> = matches.iter().map(|m| m.keyword.as_str()).collect();
    assert!(reported.contains(&"gas"));
    assert!(reported.contains(&"flood"));

    let triggers: Vec<&str> = matches
        .iter()
        .filter(|m| m.level == top)
        .map(|m| m.keyword.as_str())
        .collect();
    assert_eq!(triggers, vec!["flood"]);
}

#[test]
fn matches_at_or_below_current_level_do_not_escalate() {
    // A level-4 job has nothing above it to escalate to.
    let matches = escalation::scan("emergency flood");
    let target = matches.iter().map(|m| m.level).filter(|l| *l > 4).max();
    assert!(target.is_none());

    // A level-3 job ignores level-3 and level-2 hits.
    let matches = escalation::scan("gas permit and wiring");
    let target = matches.iter().map(|m| m.level).filter(|l| *l > 3).max();
    assert!(target.is_none());
    assert_eq!(matches.len(), 3);
}

// ── Pricing ──────────────────────────────────────────────────────────

#[test]
fn emergency_estimate_composes_and_caps() {
    // Saturday 03:00 with extreme weather.
    let start = Utc.with_ymd_and_hms(2025, 1, 4, 3, 0, 0).unwrap();
    let est = pricing::estimate(&task(4), Some(start), true, true, "US");

    assert!(est.dynamic_multiplier <= pricing::MAX_DYNAMIC_MULTIPLIER);
    let names: Vec<&str> = est.rules.iter().map(|r| r.rule_name.as_str()).collect();
    assert!(names.contains(&"emergency_response"));
    assert!(names.contains(&"after_hours"));
    assert!(names.contains(&"weekend"));
    assert!(names.contains(&"weather_extreme"));
}

#[test]
fn non_emergency_estimate_is_flat() {
    let est = pricing::estimate(&task(2), None, false, true, "US");
    assert_eq!(est.dynamic_multiplier, 1.0);
    assert_eq!(est.estimated_min_cents, 10_000);
    assert_eq!(est.estimated_max_cents, 30_000);
}

// ── SLA snapshot ─────────────────────────────────────────────────────

#[test]
fn sla_snapshot_tightens_with_level() {
    let mut previous = i32::MAX;
    for level in 1..=4 {
        let sla = SlaSnapshot::for_level(level);
        assert!(sla.response_minutes < previous);
        previous = sla.response_minutes;
    }
    assert_eq!(SlaSnapshot::for_level(4).response_minutes, 10);
}
