//! Keyword-driven escalation detection.
//!
//! A fixed keyword-to-level table is scanned highest level first.
//! Matching is case-insensitive; single-word keywords match on word
//! boundaries, multi-word phrases as literal substrings. A detected
//! escalation creates an unresolved record that an admin later approves
//! or rejects; approval to level 4 flips the job's emergency flags but
//! never touches the task catalog.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{escalation_queries, job_queries, task_queries};
use crate::error::EngineError;
use crate::models::escalation::JobEscalation;
use crate::models::job::JobPriority;

/// Keywords that demand a level-4 (emergency) response.
pub const LEVEL_4_KEYWORDS: &[&str] = &["emergency", "flood", "fire", "burst", "no heat", "no power"];

/// Keywords indicating regulated or structural level-3 work.
pub const LEVEL_3_KEYWORDS: &[&str] = &["gas", "permit", "structural", "hvac", "plumbing main"];

/// Keywords indicating licensed level-2 work.
pub const LEVEL_2_KEYWORDS: &[&str] = &["electrical", "wiring"];

/// Table in scan order: highest level first.
const KEYWORD_TABLE: &[(i16, &[&str])] = &[
    (4, LEVEL_4_KEYWORDS),
    (3, LEVEL_3_KEYWORDS),
    (2, LEVEL_2_KEYWORDS),
];

/// Characters of context captured on each side of a match.
const SNIPPET_CONTEXT: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct KeywordMatch {
    pub keyword: String,
    pub level: i16,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EscalationCheck {
    pub should_escalate: bool,
    pub current_level: i16,
    pub target_level: Option<i16>,
    pub matched_keywords: Vec<KeywordMatch>,
    pub escalation_id: Option<Uuid>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Byte offsets of every occurrence of `needle` in `haystack`.
/// `word_bounded` requires non-word characters (or string edges) on both
/// sides, for single-word keywords.
fn find_occurrences(haystack: &str, needle: &str, word_bounded: bool) -> Vec<usize> {
    let mut found = Vec::new();
    let mut from = 0;

    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();

        let bounded = !word_bounded || {
            let before_ok = haystack[..start].chars().next_back().is_none_or(|c| !is_word_char(c));
            let after_ok = haystack[end..].chars().next().is_none_or(|c| !is_word_char(c));
            before_ok && after_ok
        };

        if bounded {
            found.push(start);
        }
        from = end;
    }

    found
}

fn clamp_to_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn snippet(source: &str, start: usize, end: usize) -> String {
    let from = clamp_to_char_boundary(source, start.saturating_sub(SNIPPET_CONTEXT));
    let mut to = (end + SNIPPET_CONTEXT).min(source.len());
    while to < source.len() && !source.is_char_boundary(to) {
        to += 1;
    }
    source[from..to].trim().to_string()
}

/// Scan free text against the keyword table. Pure; returns one entry per
/// matched keyword (first occurrence), highest levels first.
pub fn scan(text: &str) -> Vec<KeywordMatch> {
    let lowered = text.to_lowercase();
    // Snippets come from the original text when lowercasing preserved
    // byte offsets; some non-ASCII mappings change lengths.
    let source = if lowered.len() == text.len() { text } else { lowered.as_str() };

    let mut matches = Vec::new();
    for (level, keywords) in KEYWORD_TABLE {
        for keyword in *keywords {
            let word_bounded = !keyword.contains(' ');
            if let Some(&start) = find_occurrences(&lowered, keyword, word_bounded).first() {
                matches.push(KeywordMatch {
                    keyword: keyword.to_string(),
                    level: *level,
                    snippet: snippet(source, start, start + keyword.len()),
                });
            }
        }
    }
    matches
}

/// Check a job's chat/notes text for escalation triggers.
///
/// The target is the highest matched level strictly above the job's task
/// level. Matches at or below the current level are reported but trigger
/// nothing. A repeated check with identical text creates a fresh record.
pub async fn check(pool: &PgPool, job_id: Uuid, text: &str) -> Result<EscalationCheck, EngineError> {
    let job = job_queries::get(pool, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    let task = task_queries::get(pool, job.task_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {}", job.task_id)))?;

    let matches = scan(text);
    let current_level = task.level;

    let target_level = matches
        .iter()
        .map(|m| m.level)
        .filter(|level| *level > current_level)
        .max();

    let Some(to_level) = target_level else {
        return Ok(EscalationCheck {
            should_escalate: false,
            current_level,
            target_level: None,
            matched_keywords: matches,
            escalation_id: None,
        });
    };

    // The trigger set is every keyword that mapped to the winning level;
    // lower-level matches are reported only.
    let trigger_keywords: Vec<String> = matches
        .iter()
        .filter(|m| m.level == to_level)
        .map(|m| m.keyword.clone())
        .collect();
    let matched_text: Vec<String> = matches
        .iter()
        .filter(|m| m.level == to_level)
        .map(|m| m.snippet.clone())
        .collect();

    let escalation = escalation_queries::insert(
        pool,
        job_id,
        current_level,
        to_level,
        &trigger_keywords,
        &matched_text,
    )
    .await?;

    let open = escalation_queries::count_unresolved(pool, job_id).await?;
    if open > 1 {
        tracing::debug!(job_id = %job_id, unresolved = open, "job accumulating unresolved escalations");
    }

    tracing::info!(
        job_id = %job_id,
        from_level = current_level,
        to_level,
        triggers = ?trigger_keywords,
        "escalation detected"
    );
    metrics::counter!("escalations_detected_total").increment(1);

    Ok(EscalationCheck {
        should_escalate: true,
        current_level,
        target_level: Some(to_level),
        matched_keywords: matches,
        escalation_id: Some(escalation.id),
    })
}

/// Approve an escalation. Level-4 approvals flip the job's emergency
/// flag and priority; the task's catalog level is never altered.
pub async fn approve(
    pool: &PgPool,
    escalation_id: Uuid,
    admin_id: Uuid,
) -> Result<JobEscalation, EngineError> {
    let escalation = escalation_queries::get(pool, escalation_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("escalation {escalation_id}")))?;

    if escalation.resolved {
        return Err(EngineError::Conflict(format!(
            "escalation {escalation_id} is already resolved"
        )));
    }

    let mut tx = pool.begin().await?;

    let resolved = escalation_queries::resolve(
        &mut tx,
        escalation_id,
        admin_id,
        true,
        None,
        Utc::now(),
    )
    .await?;

    if escalation.to_level == 4 {
        job_queries::mark_emergency(&mut tx, escalation.job_id, JobPriority::Emergency).await?;
    }

    tx.commit().await?;

    tracing::info!(
        escalation_id = %escalation_id,
        job_id = %escalation.job_id,
        to_level = escalation.to_level,
        admin_id = %admin_id,
        "escalation approved"
    );
    metrics::counter!("escalations_approved_total").increment(1);

    Ok(resolved)
}

/// Reject an escalation with a mandatory reason. No job mutation.
pub async fn reject(
    pool: &PgPool,
    escalation_id: Uuid,
    admin_id: Uuid,
    reason: &str,
) -> Result<JobEscalation, EngineError> {
    if reason.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "a reason is required to reject an escalation".to_string(),
        ));
    }

    let escalation = escalation_queries::get(pool, escalation_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("escalation {escalation_id}")))?;

    if escalation.resolved {
        return Err(EngineError::Conflict(format!(
            "escalation {escalation_id} is already resolved"
        )));
    }

    let mut tx = pool.begin().await?;
    let resolved = escalation_queries::resolve(
        &mut tx,
        escalation_id,
        admin_id,
        false,
        Some(reason),
        Utc::now(),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        escalation_id = %escalation_id,
        job_id = %escalation.job_id,
        admin_id = %admin_id,
        "escalation rejected"
    );

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_word_boundary() {
        let matches = scan("the gas meter is leaking");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "gas");
        assert_eq!(matches[0].level, 3);

        // Embedded occurrences do not count as words.
        assert!(scan("the gasket needs replacing").is_empty());
        assert!(scan("megastore delivery").is_empty());
    }

    #[test]
    fn test_phrase_matches_as_substring() {
        let matches = scan("there is no heating anywhere");
        // "no heat" matches literally inside "no heating".
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "no heat");
        assert_eq!(matches[0].level, 4);
    }

    #[test]
    fn test_case_insensitive() {
        let matches = scan("EMERGENCY: pipe BURST in the kitchen");
        let keywords: Vec<&str> = matches.iter().map(|m| m.keyword.as_str()).collect();
        assert!(keywords.contains(&"emergency"));
        assert!(keywords.contains(&"burst"));
    }

    #[test]
    fn test_gas_leak_flood_scenario() {
        // "flood" (level 4) outranks "gas" (level 3); both are reported.
        let matches = scan("Gas leak caused a flood in the basement");
        let keywords: Vec<(&str, i16)> =
            matches.iter().map(|m| (m.keyword.as_str(), m.level)).collect();
        assert!(keywords.contains(&("flood", 4)));
        assert!(keywords.contains(&("gas", 3)));

        let highest = matches.iter().map(|m| m.level).max().unwrap();
        assert_eq!(highest, 4);

        let triggers: Vec<&str> = matches
            .iter()
            .filter(|m| m.level == highest)
            .map(|m| m.keyword.as_str())
            .collect();
        assert_eq!(triggers, vec!["flood"]);
    }

    #[test]
    fn test_snippet_contains_context() {
        let matches = scan("the upstairs bathroom has a burst pipe spraying water everywhere");
        assert_eq!(matches[0].keyword, "burst");
        assert!(matches[0].snippet.contains("burst pipe"));
        assert!(matches[0].snippet.len() < 70);
    }

    #[test]
    fn test_no_keywords_no_matches() {
        assert!(scan("please mount a shelf in the hallway").is_empty());
    }

    #[test]
    fn test_keyword_at_text_edges() {
        assert_eq!(scan("fire").len(), 1);
        assert_eq!(scan("fire in the attic").len(), 1);
        assert_eq!(scan("attic is on fire").len(), 1);
    }

    #[test]
    fn test_highest_level_first_ordering() {
        let matches = scan("wiring issue after the flood");
        assert_eq!(matches[0].level, 4);
        assert_eq!(matches[1].level, 2);
    }
}
