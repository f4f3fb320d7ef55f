//! Dynamic pricing: base-price lookup, situational multiplier
//! composition with a platform-wide cap, commission/payout computation,
//! and price-proposal negotiation for level-3/4 jobs.
//!
//! Every computation and negotiation action appends an immutable
//! `PricingEvent` audit record.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{job_queries, pricing_queries, task_queries};
use crate::error::EngineError;
use crate::models::job::{ActorType, Job, JobStatus};
use crate::models::pricing::{PriceProposal, PricingEventType, ProposalStatus, ProposerRole};
use crate::models::task::ServiceTask;
use crate::services::lifecycle;

/// Platform-wide cap on the composed dynamic multiplier.
pub const MAX_DYNAMIC_MULTIPLIER: f64 = 5.0;

/// Multiplier contributed by an active extreme-weather condition.
pub const WEATHER_EXTREME_MULTIPLIER: f64 = 2.0;

const EMERGENCY_RESPONSE_MULTIPLIER: f64 = 1.5;
const AFTER_HOURS_MULTIPLIER: f64 = 1.25;
const WEEKEND_MULTIPLIER: f64 = 1.15;

/// Commission rate band reported with every estimate.
pub const COMMISSION_MIN: f64 = 0.10;
pub const COMMISSION_MAX: f64 = 0.25;
pub const COMMISSION_DEFAULT: f64 = 0.15;

/// Task levels eligible for price negotiation.
const NEGOTIABLE_LEVEL: i16 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplierRule {
    pub rule_name: String,
    pub rule_type: String,
    pub multiplier: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommissionBand {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub currency: String,
    pub base_min_cents: i64,
    pub base_max_cents: i64,
    pub dynamic_multiplier: f64,
    pub estimated_min_cents: i64,
    pub estimated_max_cents: i64,
    pub rules: Vec<MultiplierRule>,
    pub commission: CommissionBand,
    /// Payout band at the default commission rate.
    pub payout_min_cents: i64,
    pub payout_max_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceBreakdown {
    pub job_id: Uuid,
    pub quoted_price_cents: i64,
    pub final_price_cents: Option<i64>,
    pub proposed_price_cents: Option<i64>,
    pub dynamic_multiplier: Option<f64>,
    pub rules: Vec<MultiplierRule>,
    pub commission: CommissionBand,
    /// "event" when rebuilt from the audit trail, "job" when falling back
    /// to the stored price fields.
    pub source: String,
}

fn currency_for(country: &str) -> String {
    match country.to_ascii_uppercase().as_str() {
        "CA" => "CAD",
        "GB" => "GBP",
        _ => "USD",
    }
    .to_string()
}

fn commission_band() -> CommissionBand {
    CommissionBand {
        min: COMMISSION_MIN,
        max: COMMISSION_MAX,
        default: COMMISSION_DEFAULT,
    }
}

/// Situational multiplier rules for an emergency request. Non-emergency
/// requests compose no rules at all.
fn emergency_rules(
    schedule: Option<DateTime<Utc>>,
    extreme_weather: bool,
) -> Vec<MultiplierRule> {
    let mut rules = vec![MultiplierRule {
        rule_name: "emergency_response".to_string(),
        rule_type: "surge".to_string(),
        multiplier: EMERGENCY_RESPONSE_MULTIPLIER,
        reason: "immediate dispatch outside the normal queue".to_string(),
    }];

    if let Some(start) = schedule {
        let hour = start.hour();
        if !(6..20).contains(&hour) {
            rules.push(MultiplierRule {
                rule_name: "after_hours".to_string(),
                rule_type: "schedule".to_string(),
                multiplier: AFTER_HOURS_MULTIPLIER,
                reason: "requested start between 20:00 and 06:00".to_string(),
            });
        }
        if matches!(start.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
            rules.push(MultiplierRule {
                rule_name: "weekend".to_string(),
                rule_type: "schedule".to_string(),
                multiplier: WEEKEND_MULTIPLIER,
                reason: "requested start falls on a weekend".to_string(),
            });
        }
    }

    if extreme_weather {
        rules.push(MultiplierRule {
            rule_name: "weather_extreme".to_string(),
            rule_type: "weather".to_string(),
            multiplier: WEATHER_EXTREME_MULTIPLIER,
            reason: "extreme weather active at the service location".to_string(),
        });
    }

    rules
}

/// Compute a price estimate for a task. Pure: the extreme-weather flag is
/// supplied by the caller (external feed), never fetched here.
pub fn estimate(
    task: &ServiceTask,
    schedule: Option<DateTime<Utc>>,
    is_emergency: bool,
    extreme_weather: bool,
    country: &str,
) -> PriceEstimate {
    let rules = if is_emergency {
        emergency_rules(schedule, extreme_weather)
    } else {
        Vec::new()
    };

    let raw: f64 = rules.iter().map(|r| r.multiplier).product();
    let multiplier = raw.min(MAX_DYNAMIC_MULTIPLIER);

    let estimated_min = (task.base_price_min_cents as f64 * multiplier).round() as i64;
    let estimated_max = (task.base_price_max_cents as f64 * multiplier).round() as i64;

    let commission = commission_band();
    let payout_min = (estimated_min as f64 * (1.0 - commission.default)).round() as i64;
    let payout_max = (estimated_max as f64 * (1.0 - commission.default)).round() as i64;

    PriceEstimate {
        currency: currency_for(country),
        base_min_cents: task.base_price_min_cents,
        base_max_cents: task.base_price_max_cents,
        dynamic_multiplier: multiplier,
        estimated_min_cents: estimated_min,
        estimated_max_cents: estimated_max,
        rules,
        commission,
        payout_min_cents: payout_min,
        payout_max_cents: payout_max,
    }
}

/// Append an `estimated` audit event for a computed estimate.
pub async fn record_estimate(
    pool: &PgPool,
    job_id: Uuid,
    estimate: &PriceEstimate,
) -> Result<(), EngineError> {
    let detail = serde_json::json!({
        "rules": estimate.rules,
        "currency": estimate.currency,
        "estimated_min_cents": estimate.estimated_min_cents,
        "estimated_max_cents": estimate.estimated_max_cents,
    });
    pricing_queries::insert_event(
        pool,
        job_id,
        PricingEventType::Estimated,
        Some(estimate.estimated_max_cents),
        Some(estimate.dynamic_multiplier),
        detail,
        None,
    )
    .await?;
    Ok(())
}

/// Reconstruct a price breakdown from the most recent pricing event, or
/// fall back to the job's stored price fields.
pub async fn breakdown(pool: &PgPool, job_id: Uuid) -> Result<PriceBreakdown, EngineError> {
    let job = job_queries::get(pool, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;

    let latest = pricing_queries::latest_event(pool, job_id).await?;

    match latest {
        Some(event) => {
            let rules: Vec<MultiplierRule> = event
                .detail
                .get("rules")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            Ok(PriceBreakdown {
                job_id,
                quoted_price_cents: job.quoted_price_cents,
                final_price_cents: job.final_price_cents,
                proposed_price_cents: job.proposed_price_cents,
                dynamic_multiplier: event.multiplier,
                rules,
                commission: commission_band(),
                source: "event".to_string(),
            })
        }
        None => Ok(PriceBreakdown {
            job_id,
            quoted_price_cents: job.quoted_price_cents,
            final_price_cents: job.final_price_cents,
            proposed_price_cents: job.proposed_price_cents,
            dynamic_multiplier: None,
            rules: Vec::new(),
            commission: commission_band(),
            source: "job".to_string(),
        }),
    }
}

async fn negotiable_job(pool: &PgPool, job_id: Uuid) -> Result<(Job, ServiceTask), EngineError> {
    let job = job_queries::get(pool, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    let task = task_queries::get(pool, job.task_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {}", job.task_id)))?;

    if task.level < NEGOTIABLE_LEVEL {
        return Err(EngineError::InvalidState(format!(
            "price negotiation applies to level 3 and 4 tasks; task {} is level {}",
            task.id, task.level
        )));
    }
    Ok((job, task))
}

/// Create a pending price proposal. The job must already be in
/// `pending_price_agreement`.
pub async fn create_proposal(
    pool: &PgPool,
    job_id: Uuid,
    proposer_id: Uuid,
    role: ProposerRole,
    price_cents: i64,
    description: Option<&str>,
) -> Result<PriceProposal, EngineError> {
    if price_cents <= 0 {
        return Err(EngineError::InvalidInput(
            "proposed price must be positive".to_string(),
        ));
    }

    let (job, _task) = negotiable_job(pool, job_id).await?;

    if job.status != JobStatus::PendingPriceAgreement {
        return Err(EngineError::InvalidState(format!(
            "job {job_id} is {}; proposals require pending_price_agreement",
            job.status
        )));
    }

    let mut tx = pool.begin().await?;
    let proposal = pricing_queries::insert_proposal(
        &mut tx,
        job_id,
        proposer_id,
        role,
        price_cents,
        description,
    )
    .await?;
    pricing_queries::insert_event_tx(
        &mut tx,
        job_id,
        PricingEventType::Proposed,
        Some(price_cents),
        None,
        serde_json::json!({ "proposal_id": proposal.id, "role": role }),
        Some(proposer_id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        job_id = %job_id,
        proposal_id = %proposal.id,
        price_cents,
        role = %role,
        "price proposed"
    );

    Ok(proposal)
}

/// Accept or reject a pending proposal.
///
/// Acceptance locks the job's proposed price, stamps the agreement time,
/// and moves the job to `scheduled`. Rejection changes only the proposal.
pub async fn respond(
    pool: &PgPool,
    proposal_id: Uuid,
    responder_id: Uuid,
    accept: bool,
) -> Result<PriceProposal, EngineError> {
    let proposal = pricing_queries::get_proposal(pool, proposal_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("proposal {proposal_id}")))?;

    if proposal.status != ProposalStatus::Pending {
        return Err(EngineError::InvalidState(format!(
            "proposal {proposal_id} is {}; only pending proposals accept a response",
            proposal.status
        )));
    }

    let job = job_queries::get(pool, proposal.job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {}", proposal.job_id)))?;

    if !accept {
        let mut tx = pool.begin().await?;
        let updated = pricing_queries::set_proposal_status(
            &mut tx,
            proposal_id,
            ProposalStatus::Rejected,
            Some(responder_id),
        )
        .await?;
        pricing_queries::insert_event_tx(
            &mut tx,
            proposal.job_id,
            PricingEventType::Rejected,
            Some(proposal.price_cents),
            None,
            serde_json::json!({ "proposal_id": proposal_id }),
            Some(responder_id),
        )
        .await?;
        tx.commit().await?;
        return Ok(updated);
    }

    lifecycle::validate(job.status, JobStatus::Scheduled, ActorType::System)?;

    let mut tx = pool.begin().await?;
    let updated = pricing_queries::set_proposal_status(
        &mut tx,
        proposal_id,
        ProposalStatus::Accepted,
        Some(responder_id),
    )
    .await?;
    job_queries::lock_agreed_price(
        &mut tx,
        proposal.job_id,
        proposal.price_cents,
        Utc::now(),
    )
    .await?;
    job_queries::set_status(&mut tx, proposal.job_id, JobStatus::Scheduled, job.status).await?;
    pricing_queries::insert_event_tx(
        &mut tx,
        proposal.job_id,
        PricingEventType::Accepted,
        Some(proposal.price_cents),
        None,
        serde_json::json!({ "proposal_id": proposal_id }),
        Some(responder_id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        job_id = %proposal.job_id,
        proposal_id = %proposal_id,
        price_cents = proposal.price_cents,
        "price accepted"
    );
    metrics::counter!("price_agreements_total").increment(1);

    Ok(updated)
}

/// On-site scope change: supersede every prior proposal, reopen
/// negotiation, and file a fresh pending proposal — forcing re-approval.
pub async fn adjust(
    pool: &PgPool,
    job_id: Uuid,
    proposer_id: Uuid,
    new_price_cents: i64,
    reason: &str,
) -> Result<PriceProposal, EngineError> {
    if reason.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "a reason is required for an on-site price adjustment".to_string(),
        ));
    }
    if new_price_cents <= 0 {
        return Err(EngineError::InvalidInput(
            "adjusted price must be positive".to_string(),
        ));
    }

    let (job, _task) = negotiable_job(pool, job_id).await?;

    if job.status != JobStatus::PendingPriceAgreement {
        lifecycle::validate(job.status, JobStatus::PendingPriceAgreement, ActorType::Provider)?;
    }

    let mut tx = pool.begin().await?;

    let superseded = pricing_queries::supersede_proposals(&mut tx, job_id).await?;

    if job.status != JobStatus::PendingPriceAgreement {
        job_queries::set_status(&mut tx, job_id, JobStatus::PendingPriceAgreement, job.status)
            .await?;
    }

    let proposal = pricing_queries::insert_proposal(
        &mut tx,
        job_id,
        proposer_id,
        ProposerRole::Provider,
        new_price_cents,
        Some(reason),
    )
    .await?;
    pricing_queries::insert_event_tx(
        &mut tx,
        job_id,
        PricingEventType::Adjusted,
        Some(new_price_cents),
        None,
        serde_json::json!({
            "proposal_id": proposal.id,
            "superseded": superseded,
            "reason": reason,
        }),
        Some(proposer_id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        job_id = %job_id,
        proposal_id = %proposal.id,
        superseded,
        new_price_cents,
        "on-site price adjustment"
    );

    Ok(proposal)
}

/// Record a tip against a completed job. Audit only.
pub async fn record_tip(
    pool: &PgPool,
    job_id: Uuid,
    amount_cents: i64,
    actor_id: Option<Uuid>,
) -> Result<(), EngineError> {
    if amount_cents <= 0 {
        return Err(EngineError::InvalidInput("tip must be positive".to_string()));
    }

    job_queries::get(pool, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;

    pricing_queries::insert_event(
        pool,
        job_id,
        PricingEventType::Tip,
        Some(amount_cents),
        None,
        serde_json::json!({}),
        actor_id,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plumbing_task(level: i16) -> ServiceTask {
        ServiceTask {
            id: Uuid::new_v4(),
            name: "Pipe repair".to_string(),
            category: "plumbing".to_string(),
            level,
            regulated: level >= 3,
            license_required: level >= 2,
            insurance_required: level >= 3,
            hazardous: false,
            structural: false,
            emergency_eligible: true,
            base_price_min_cents: 10_000,
            base_price_max_cents: 30_000,
            escalation_keywords: vec!["burst".to_string()],
        }
    }

    #[test]
    fn test_non_emergency_is_base_range() {
        let est = estimate(&plumbing_task(2), None, false, true, "US");
        assert_eq!(est.dynamic_multiplier, 1.0);
        assert_eq!(est.estimated_min_cents, 10_000);
        assert_eq!(est.estimated_max_cents, 30_000);
        assert!(est.rules.is_empty());
    }

    #[test]
    fn test_emergency_composes_rules() {
        // Tuesday 22:30 UTC: emergency surge + after hours.
        let start = Utc.with_ymd_and_hms(2025, 6, 10, 22, 30, 0).unwrap();
        let est = estimate(&plumbing_task(3), Some(start), true, false, "US");
        assert_eq!(est.rules.len(), 2);
        let expected = 1.5 * 1.25;
        assert!((est.dynamic_multiplier - expected).abs() < 1e-9);
        assert_eq!(est.estimated_min_cents, (10_000.0 * expected).round() as i64);
    }

    #[test]
    fn test_weather_rule_contributes_two_x() {
        let est = estimate(&plumbing_task(4), None, true, true, "US");
        let weather = est.rules.iter().find(|r| r.rule_name == "weather_extreme").unwrap();
        assert_eq!(weather.multiplier, 2.0);
        assert!((est.dynamic_multiplier - 3.0).abs() < 1e-9); // 1.5 * 2.0
    }

    #[test]
    fn test_multiplier_capped_at_five() {
        // Saturday 02:00 with extreme weather: 1.5 * 1.25 * 1.15 * 2.0 = 4.3125,
        // still under the cap; verify the cap kicks in mathematically.
        let start = Utc.with_ymd_and_hms(2025, 6, 14, 2, 0, 0).unwrap();
        let est = estimate(&plumbing_task(4), Some(start), true, true, "US");
        assert!(est.dynamic_multiplier <= MAX_DYNAMIC_MULTIPLIER);
        assert!((est.dynamic_multiplier - 4.3125).abs() < 1e-9);

        let raw: f64 = est.rules.iter().map(|r| r.multiplier).product::<f64>() * 2.0;
        assert_eq!(raw.min(MAX_DYNAMIC_MULTIPLIER), MAX_DYNAMIC_MULTIPLIER);
    }

    #[test]
    fn test_commission_band_and_payout() {
        let est = estimate(&plumbing_task(1), None, false, false, "US");
        assert_eq!(est.commission.min, 0.10);
        assert_eq!(est.commission.max, 0.25);
        assert_eq!(est.commission.default, 0.15);
        assert_eq!(est.payout_max_cents, (30_000.0 * 0.85_f64).round() as i64);
    }

    #[test]
    fn test_currency_mapping() {
        assert_eq!(estimate(&plumbing_task(1), None, false, false, "us").currency, "USD");
        assert_eq!(estimate(&plumbing_task(1), None, false, false, "CA").currency, "CAD");
        assert_eq!(estimate(&plumbing_task(1), None, false, false, "GB").currency, "GBP");
        assert_eq!(estimate(&plumbing_task(1), None, false, false, "DE").currency, "USD");
    }

    #[test]
    fn test_daytime_weekday_emergency_is_surge_only() {
        // Wednesday 10:00 UTC.
        let start = Utc.with_ymd_and_hms(2025, 6, 11, 10, 0, 0).unwrap();
        let est = estimate(&plumbing_task(4), Some(start), true, false, "US");
        assert_eq!(est.rules.len(), 1);
        assert_eq!(est.rules[0].rule_name, "emergency_response");
        assert!((est.dynamic_multiplier - 1.5).abs() < 1e-9);
    }
}
