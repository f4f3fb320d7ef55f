use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssignmentStatus {
    Offered,
    Accepted,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    /// Offered and accepted assignments block further assignment of the job.
    pub fn is_active(self) -> bool {
        matches!(self, AssignmentStatus::Offered | AssignmentStatus::Accepted)
    }
}

/// Links one job to one provider at a point in time. A job may accumulate
/// assignments over its life through reassignment, but at most one is
/// active at any moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAssignment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub provider_id: Uuid,
    pub status: AssignmentStatus,
    pub match_score: Option<f64>,
    pub response_deadline: DateTime<Utc>,
    pub arrival_deadline: DateTime<Utc>,
    pub cancelled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}
