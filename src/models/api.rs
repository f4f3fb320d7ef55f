use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{ActorType, JobPriority, JobStatus};
use crate::models::penalty::PenaltyType;
use crate::models::pricing::ProposerRole;

/// Request to create a job in `draft` status.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(skip)]
    pub task_id: Uuid,

    #[garde(skip)]
    pub customer_id: Uuid,

    #[garde(range(min = -90.0, max = 90.0))]
    pub lat: f64,

    #[garde(range(min = -180.0, max = 180.0))]
    pub lng: f64,

    #[garde(length(min = 1, max = 500))]
    pub address: String,

    #[garde(skip)]
    pub requested_start: Option<DateTime<Utc>>,

    #[garde(skip)]
    pub priority: Option<JobPriority>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    #[garde(skip)]
    pub target: JobStatus,

    #[garde(skip)]
    pub actor: ActorType,
}

/// Query parameters for the match listing endpoint. Weights must be
/// supplied all-or-none.
#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    pub radius_km: Option<f64>,
    pub limit: Option<usize>,
    pub weight_internal: Option<f64>,
    pub weight_distance: Option<f64>,
    pub weight_response: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRequest {
    #[garde(skip)]
    pub provider_id: Uuid,

    #[garde(range(min = 0.0, max = 100.0))]
    pub match_score: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReassignRequest {
    #[garde(skip)]
    pub provider_id: Uuid,

    #[garde(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EscalationCheckRequest {
    #[garde(length(min = 1, max = 10_000))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EscalationApproveRequest {
    #[garde(skip)]
    pub admin_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EscalationRejectRequest {
    #[garde(skip)]
    pub admin_id: Uuid,

    #[garde(length(min = 1, max = 2_000))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PenaltyRequest {
    #[garde(skip)]
    pub penalty_type: PenaltyType,

    #[garde(skip)]
    pub job_id: Option<Uuid>,

    #[garde(length(max = 2_000))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustScoreRequest {
    #[garde(skip)]
    pub admin_id: Uuid,

    #[garde(range(min = -100.0, max = 100.0))]
    pub delta: f64,

    #[garde(length(min = 1, max = 2_000))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProposalRequest {
    #[garde(skip)]
    pub proposer_id: Uuid,

    #[garde(skip)]
    pub role: ProposerRole,

    #[garde(range(min = 1))]
    pub price_cents: i64,

    #[garde(length(max = 2_000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProposalResponseRequest {
    #[garde(skip)]
    pub responder_id: Uuid,

    #[garde(skip)]
    pub accept: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PriceAdjustRequest {
    #[garde(skip)]
    pub proposer_id: Uuid,

    #[garde(range(min = 1))]
    pub price_cents: i64,

    #[garde(length(min = 1, max = 2_000))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TipRequest {
    #[garde(range(min = 1))]
    pub amount_cents: i64,

    #[garde(skip)]
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ProviderScoreResponse {
    pub provider_id: Uuid,
    pub current_level: i16,
    pub internal_score: f64,
    pub status: String,
    pub level_base: f64,
    pub level_min: f64,
    pub level_max: f64,
    pub is_expelled: bool,
}
