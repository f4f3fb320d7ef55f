//! Job lifecycle state machine.
//!
//! The whole machine is data: a static table of `(from, allowed targets)`
//! pairs plus actor guards layered on top. Validation is pure; callers
//! apply the mutation only when `validate` passes, and the persistence
//! layer re-checks the expected current status in its UPDATE.

use crate::error::EngineError;
use crate::models::job::{ActorType, JobStatus};

use JobStatus::*;

/// Structural transition table. `CancelledBySystem` appears in every
/// non-terminal row: the system can always abort a live job.
const TRANSITIONS: &[(JobStatus, &[JobStatus])] = &[
    (Draft, &[PendingMatch, CancelledByCustomer, CancelledBySystem]),
    (PendingMatch, &[Matched, CancelledByCustomer, CancelledBySystem]),
    (
        Matched,
        &[
            ProviderAccepted,
            PendingPriceAgreement,
            PendingMatch,
            CancelledByCustomer,
            CancelledByProvider,
            CancelledBySystem,
        ],
    ),
    (PendingPriceAgreement, &[Scheduled, CancelledBySystem]),
    (
        Scheduled,
        &[ProviderEnRoute, PendingPriceAgreement, CancelledBySystem],
    ),
    (
        ProviderAccepted,
        &[
            ProviderEnRoute,
            PendingPriceAgreement,
            CancelledByProvider,
            CancelledBySystem,
        ],
    ),
    (
        ProviderEnRoute,
        &[
            InProgress,
            PendingPriceAgreement,
            CancelledByProvider,
            CancelledBySystem,
        ],
    ),
    (
        InProgress,
        &[
            Completed,
            PendingPriceAgreement,
            CancelledByProvider,
            CancelledBySystem,
        ],
    ),
    (Completed, &[Disputed, CancelledBySystem]),
    (Disputed, &[Refunded, Completed, CancelledBySystem]),
    (Refunded, &[]),
    (CancelledByCustomer, &[]),
    (CancelledByProvider, &[]),
    (CancelledBySystem, &[]),
];

/// Statuses only a provider-side actor may drive.
const PROVIDER_DRIVEN: &[JobStatus] = &[ProviderAccepted, ProviderEnRoute, InProgress, Completed];

/// Allowed structural targets from `current`.
pub fn allowed_targets(current: JobStatus) -> &'static [JobStatus] {
    TRANSITIONS
        .iter()
        .find(|(from, _)| *from == current)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

fn guard(current: JobStatus, target: JobStatus, actor: ActorType) -> Result<(), String> {
    match target {
        CancelledByCustomer => {
            if !matches!(actor, ActorType::Customer | ActorType::Admin | ActorType::System) {
                return Err(format!("actor {actor} may not cancel on behalf of the customer"));
            }
        }
        CancelledByProvider => {
            if !matches!(actor, ActorType::Provider | ActorType::Admin | ActorType::System) {
                return Err(format!("actor {actor} may not cancel on behalf of the provider"));
            }
        }
        CancelledBySystem => {
            if !matches!(actor, ActorType::System | ActorType::Admin) {
                return Err(format!("actor {actor} may not issue a system cancellation"));
            }
        }
        t if PROVIDER_DRIVEN.contains(&t) => {
            if actor == ActorType::Customer {
                return Err(format!("actor {actor} may not move a job to {target}"));
            }
        }
        // Reassignment reset back into the matching pool.
        PendingMatch if current == Matched => {
            if !matches!(actor, ActorType::System | ActorType::Admin) {
                return Err(format!("actor {actor} may not return a matched job to the pool"));
            }
        }
        // Opening or reopening price negotiation.
        PendingPriceAgreement => {
            if !matches!(actor, ActorType::Provider | ActorType::System | ActorType::Admin) {
                return Err(format!("actor {actor} may not open price negotiation"));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Validate a status transition. Pure and deterministic: no side effects,
/// identical inputs always yield the identical result.
pub fn validate(
    current: JobStatus,
    target: JobStatus,
    actor: ActorType,
) -> Result<(), EngineError> {
    let targets = allowed_targets(current);
    if !targets.contains(&target) {
        let allowed: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        return Err(EngineError::InvalidState(format!(
            "cannot move job from {current} to {target}; allowed targets from {current}: [{}]",
            allowed.join(", ")
        )));
    }

    guard(current, target, actor).map_err(EngineError::InvalidState)
}

/// Targets from `current` that pass both the structural check and the
/// actor guard, sorted by name. Intended for UI affordance.
pub fn valid_targets(current: JobStatus, actor: ActorType) -> Vec<JobStatus> {
    let mut targets: Vec<JobStatus> = allowed_targets(current)
        .iter()
        .copied()
        .filter(|t| guard(current, *t, actor).is_ok())
        .collect();
    targets.sort_by_key(|t| t.to_string());
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_progression() {
        assert!(validate(Draft, PendingMatch, ActorType::Customer).is_ok());
        assert!(validate(PendingMatch, Matched, ActorType::System).is_ok());
        assert!(validate(Matched, ProviderAccepted, ActorType::Provider).is_ok());
        assert!(validate(ProviderAccepted, ProviderEnRoute, ActorType::Provider).is_ok());
        assert!(validate(ProviderEnRoute, InProgress, ActorType::Provider).is_ok());
        assert!(validate(InProgress, Completed, ActorType::Provider).is_ok());
        assert!(validate(Completed, Disputed, ActorType::Customer).is_ok());
        assert!(validate(Disputed, Refunded, ActorType::Admin).is_ok());
    }

    #[test]
    fn test_draft_to_completed_denied_with_allowed_targets() {
        let err = validate(Draft, Completed, ActorType::Admin).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pending_match"), "{msg}");
        assert!(msg.contains("cancelled_by_customer"), "{msg}");
        assert!(msg.contains("cancelled_by_system"), "{msg}");
    }

    #[test]
    fn test_validate_is_deterministic() {
        let first = validate(Draft, Completed, ActorType::Admin).unwrap_err().to_string();
        let second = validate(Draft, Completed, ActorType::Admin).unwrap_err().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_customer_cancel_window() {
        assert!(validate(Draft, CancelledByCustomer, ActorType::Customer).is_ok());
        assert!(validate(PendingMatch, CancelledByCustomer, ActorType::Customer).is_ok());
        assert!(validate(Matched, CancelledByCustomer, ActorType::Customer).is_ok());
        // Past the cancel window the target is structurally absent.
        assert!(validate(ProviderAccepted, CancelledByCustomer, ActorType::Customer).is_err());
        assert!(validate(InProgress, CancelledByCustomer, ActorType::Customer).is_err());
    }

    #[test]
    fn test_provider_cancel_window() {
        for from in [Matched, ProviderAccepted, ProviderEnRoute, InProgress] {
            assert!(validate(from, CancelledByProvider, ActorType::Provider).is_ok());
        }
        assert!(validate(Draft, CancelledByProvider, ActorType::Provider).is_err());
        assert!(validate(PendingMatch, CancelledByProvider, ActorType::Provider).is_err());
    }

    #[test]
    fn test_customer_may_not_drive_provider_states() {
        assert!(validate(Matched, ProviderAccepted, ActorType::Customer).is_err());
        assert!(validate(ProviderEnRoute, InProgress, ActorType::Customer).is_err());
        assert!(validate(InProgress, Completed, ActorType::Customer).is_err());
    }

    #[test]
    fn test_system_cancel_always_allowed_from_non_terminal() {
        for (from, _) in TRANSITIONS {
            if from.is_terminal() {
                continue;
            }
            assert!(
                validate(*from, CancelledBySystem, ActorType::System).is_ok(),
                "system cancel denied from {from}"
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_targets() {
        for s in [Refunded, CancelledByCustomer, CancelledByProvider, CancelledBySystem] {
            assert!(allowed_targets(s).is_empty());
            assert!(valid_targets(s, ActorType::Admin).is_empty());
        }
    }

    #[test]
    fn test_valid_targets_sorted_and_guarded() {
        let targets = valid_targets(Matched, ActorType::Customer);
        // Customer sees the cancel option but none of the provider-driven moves.
        assert_eq!(targets, vec![CancelledByCustomer]);

        let admin_targets = valid_targets(Matched, ActorType::Admin);
        let mut sorted = admin_targets.clone();
        sorted.sort_by_key(|t| t.to_string());
        assert_eq!(admin_targets, sorted);
        assert!(admin_targets.contains(&ProviderAccepted));
        assert!(admin_targets.contains(&PendingMatch));
    }

    #[test]
    fn test_negotiation_states_join_the_main_path() {
        assert!(validate(Matched, PendingPriceAgreement, ActorType::Provider).is_ok());
        assert!(validate(PendingPriceAgreement, Scheduled, ActorType::System).is_ok());
        assert!(validate(Scheduled, ProviderEnRoute, ActorType::Provider).is_ok());
        // On-site adjustment reopens negotiation from active states.
        assert!(validate(InProgress, PendingPriceAgreement, ActorType::Provider).is_ok());
        // Customers may not force negotiation open.
        assert!(validate(Matched, PendingPriceAgreement, ActorType::Customer).is_err());
    }

    #[test]
    fn test_dispute_resolution() {
        assert!(validate(Disputed, Completed, ActorType::Admin).is_ok());
        assert!(validate(Disputed, Refunded, ActorType::Admin).is_ok());
        assert!(validate(Refunded, Disputed, ActorType::Admin).is_err());
    }
}
