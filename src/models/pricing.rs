use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
    Superseded,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProposerRole {
    Customer,
    Provider,
    Admin,
}

/// A negotiated price offer for a level-3/4 job. At most one proposal per
/// job is `accepted`; an on-site adjustment supersedes everything prior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceProposal {
    pub id: Uuid,
    pub job_id: Uuid,
    pub proposed_by: Uuid,
    pub proposer_role: ProposerRole,
    pub price_cents: i64,
    pub description: Option<String>,
    pub status: ProposalStatus,
    pub responded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PricingEventType {
    Estimated,
    Proposed,
    Accepted,
    Rejected,
    Adjusted,
    Tip,
}

/// Append-only audit record of every pricing computation or action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingEvent {
    pub id: Uuid,
    pub job_id: Uuid,
    pub event_type: PricingEventType,
    pub amount_cents: Option<i64>,
    pub multiplier: Option<f64>,
    pub detail: serde_json::Value,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
