use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A proposal to raise a job's required service level, created by keyword
/// detection and resolved once by an admin. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEscalation {
    pub id: Uuid,
    pub job_id: Uuid,
    pub from_level: i16,
    pub to_level: i16,
    /// Every keyword that mapped to the winning level.
    pub trigger_keywords: Vec<String>,
    /// Context snippets around each trigger match.
    pub matched_text: Vec<String>,
    pub resolved: bool,
    pub approved: Option<bool>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
