use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderStatus {
    Active,
    Suspended,
    OnLeave,
    PendingReview,
}

/// A service provider. Qualification fields (background check, license,
/// insurance, on-call) are maintained by verification collaborators and
/// only read here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: Uuid,
    pub display_name: String,
    pub current_level: i16,
    pub internal_score: f64,
    pub status: ProviderStatus,
    pub home_lat: Option<f64>,
    pub home_lng: Option<f64>,
    pub service_radius_km: f64,
    pub on_call: bool,
    pub background_check_verified: bool,
    pub license_valid_until: Option<DateTime<Utc>>,
    pub insurance_valid_until: Option<DateTime<Utc>>,
    pub avg_response_minutes: Option<f64>,
    pub max_concurrent_jobs: i32,
    pub last_penalty_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderProfile {
    pub fn has_valid_license(&self, now: DateTime<Utc>) -> bool {
        self.license_valid_until.is_some_and(|until| until > now)
    }

    pub fn has_valid_insurance(&self, now: DateTime<Utc>) -> bool {
        self.insurance_valid_until.is_some_and(|until| until > now)
    }
}
