use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a job. Transitions are validated by
/// `services::lifecycle` before any mutation is applied.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Draft,
    PendingMatch,
    Matched,
    PendingPriceAgreement,
    Scheduled,
    ProviderAccepted,
    ProviderEnRoute,
    InProgress,
    Completed,
    Disputed,
    Refunded,
    CancelledByCustomer,
    CancelledByProvider,
    CancelledBySystem,
}

impl JobStatus {
    /// States that accept no further transitions. `Completed` is not
    /// terminal (it can still be disputed); the cancelled and refunded
    /// states are.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Refunded
                | JobStatus::CancelledByCustomer
                | JobStatus::CancelledByProvider
                | JobStatus::CancelledBySystem
        )
    }
}

/// Who is requesting a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorType {
    Customer,
    Provider,
    System,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobPriority {
    Normal,
    High,
    Emergency,
}

/// SLA targets captured onto the job at creation time. Write-once:
/// never recomputed, even when the job escalates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlaSnapshot {
    pub response_minutes: i32,
    pub arrival_minutes: i32,
    pub completion_minutes: i32,
    pub penalty_percent: i32,
}

impl SlaSnapshot {
    /// Default SLA terms per task level.
    pub fn for_level(level: i16) -> Self {
        match level {
            1 => Self {
                response_minutes: 120,
                arrival_minutes: 480,
                completion_minutes: 2880,
                penalty_percent: 5,
            },
            2 => Self {
                response_minutes: 60,
                arrival_minutes: 240,
                completion_minutes: 1440,
                penalty_percent: 10,
            },
            3 => Self {
                response_minutes: 30,
                arrival_minutes: 120,
                completion_minutes: 720,
                penalty_percent: 15,
            },
            _ => Self {
                response_minutes: 10,
                arrival_minutes: 45,
                completion_minutes: 240,
                penalty_percent: 25,
            },
        }
    }
}

/// A service job requested by a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub reference_code: String,
    pub task_id: Uuid,
    pub customer_id: Uuid,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub is_emergency: bool,
    pub service_lat: f64,
    pub service_lng: f64,
    pub address: String,
    pub requested_start: Option<DateTime<Utc>>,
    pub sla: SlaSnapshot,
    pub quoted_price_cents: i64,
    pub final_price_cents: Option<i64>,
    pub proposed_price_cents: Option<i64>,
    pub price_agreed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Short human-facing reference code, e.g. `HD-3fa94c1e`.
pub fn reference_code(id: Uuid) -> String {
    format!("HD-{}", &id.simple().to_string()[..8])
}
