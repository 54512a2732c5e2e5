//! Administrator-driven status transitions.
//!
//! ```text
//! unverified ──Verify──────────▶ verified
//!     │                             │
//!     └──Mark Resolved──▶ resolved ◀┘ Mark Resolved
//! ```
//!
//! `archived` has no entry transition here; it is only ever set outside
//! this workflow.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::ReportStatus;

/// One allowed status change and the action label shown for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Status the report must currently have.
    pub from: ReportStatus,
    /// Status the report moves to.
    pub to: ReportStatus,
    /// Button/menu label for this action.
    pub action: &'static str,
}

const TRANSITIONS: &[Transition] = &[
    Transition {
        from: ReportStatus::Unverified,
        to: ReportStatus::Verified,
        action: "Verify",
    },
    Transition {
        from: ReportStatus::Unverified,
        to: ReportStatus::Resolved,
        action: "Mark Resolved",
    },
    Transition {
        from: ReportStatus::Verified,
        to: ReportStatus::Resolved,
        action: "Mark Resolved",
    },
];

/// Transitions available from `current`, in display order.
pub fn transitions_from(current: ReportStatus) -> impl Iterator<Item = &'static Transition> {
    TRANSITIONS.iter().filter(move |t| t.from == current)
}

/// Statuses a report in `current` may move to.
#[must_use]
pub fn allowed_transitions(current: ReportStatus) -> BTreeSet<ReportStatus> {
    transitions_from(current).map(|t| t.to).collect()
}

/// Returns `true` if `from -> to` is an allowed transition.
#[must_use]
pub fn can_transition(from: ReportStatus, to: ReportStatus) -> bool {
    transitions_from(from).any(|t| t.to == to)
}

/// Returns `true` if no transition leaves `status`.
#[must_use]
pub fn is_terminal(status: ReportStatus) -> bool {
    transitions_from(status).next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unverified_can_be_verified_or_resolved() {
        assert_eq!(
            allowed_transitions(ReportStatus::Unverified),
            BTreeSet::from([ReportStatus::Verified, ReportStatus::Resolved])
        );
    }

    #[test]
    fn verified_can_only_be_resolved() {
        assert_eq!(
            allowed_transitions(ReportStatus::Verified),
            BTreeSet::from([ReportStatus::Resolved])
        );
    }

    #[test]
    fn resolved_and_archived_are_terminal() {
        assert!(allowed_transitions(ReportStatus::Resolved).is_empty());
        assert!(allowed_transitions(ReportStatus::Archived).is_empty());
        assert!(is_terminal(ReportStatus::Resolved));
        assert!(is_terminal(ReportStatus::Archived));
        assert!(!is_terminal(ReportStatus::Unverified));
    }

    #[test]
    fn backwards_and_self_transitions_are_rejected() {
        assert!(!can_transition(ReportStatus::Resolved, ReportStatus::Verified));
        assert!(!can_transition(ReportStatus::Verified, ReportStatus::Unverified));
        assert!(!can_transition(ReportStatus::Verified, ReportStatus::Verified));
        for status in ReportStatus::all() {
            assert!(!can_transition(*status, ReportStatus::Archived));
        }
    }

    #[test]
    fn action_labels() {
        let actions: Vec<&str> = transitions_from(ReportStatus::Unverified)
            .map(|t| t.action)
            .collect();
        assert_eq!(actions, ["Verify", "Mark Resolved"]);
    }
}
