use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Penalty event types. Deduction points depend on the provider's level;
/// see `services::scoring::penalty_points`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PenaltyType {
    ResponseTimeout,
    Cancellation,
    NoShow,
    BadReview,
    SlaBreach,
}

/// One penalty application. Immutable once written; the aggregate per
/// provider drives expulsion and incident-free-week recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyRecord {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub penalty_type: PenaltyType,
    pub points: f64,
    pub job_id: Option<Uuid>,
    pub reason: Option<String>,
    pub score_before: f64,
    pub score_after: f64,
    pub applied_at: DateTime<Utc>,
}

/// Audit row for a manual score adjustment by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreAdjustment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub admin_id: Uuid,
    pub delta: f64,
    pub reason: String,
    pub score_before: f64,
    pub score_after: f64,
    pub created_at: DateTime<Utc>,
}
