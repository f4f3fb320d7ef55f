use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An entry in the closed service-task catalog. Read-only to the job
/// lifecycle: escalation approval changes job-level flags, never the
/// catalog level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTask {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub level: i16,
    pub regulated: bool,
    pub license_required: bool,
    pub insurance_required: bool,
    pub hazardous: bool,
    pub structural: bool,
    pub emergency_eligible: bool,
    pub base_price_min_cents: i64,
    pub base_price_max_cents: i64,
    pub escalation_keywords: Vec<String>,
}
