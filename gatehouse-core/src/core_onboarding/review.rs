//! Review queue items, decisions and the tier rules reviewers act under

use serde::{Deserialize, Serialize};

use super::appeal::Appeal;
use super::errors::{NotEligibleReason, Refusal};
use super::member::{Member, RoleTier};
use super::session::{SessionStep, Submission};
use super::types::Timestamp;

/// Moderator verdict on a pending submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewOutcome {
    /// Admit at `tier`
    Approve { tier: RoleTier },
    /// Turn down; `ban` also removes the person from the group
    Reject { reason: Option<String>, ban: bool },
}

/// Something waiting for a moderator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewItem {
    Application(Submission),
    Appeal(Appeal),
}

impl ReviewItem {
    pub fn enqueued_at(&self) -> Timestamp {
        match self {
            ReviewItem::Application(submission) => submission.enqueued_at(),
            ReviewItem::Appeal(appeal) => appeal.created_at,
        }
    }

    /// Stable secondary ordering for items enqueued in the same millisecond
    fn sort_key(&self) -> (Timestamp, u8, i64) {
        match self {
            ReviewItem::Application(submission) => (self.enqueued_at(), 0, submission.id.0),
            ReviewItem::Appeal(appeal) => (self.enqueued_at(), 1, appeal.id.0),
        }
    }
}

/// Oldest first
pub fn sort_queue(items: &mut [ReviewItem]) {
    items.sort_by_key(ReviewItem::sort_key);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierDirection {
    Promote,
    Demote,
}

/// Reviewer must hold at least the configured moderator tier
pub fn check_reviewer(reviewer: RoleTier, moderator_tier: RoleTier) -> Result<(), NotEligibleReason> {
    if reviewer < moderator_tier {
        return Err(NotEligibleReason::ReviewerTierTooLow { required: moderator_tier, actual: reviewer });
    }
    Ok(())
}

/// Reviewer must strictly outrank the person acted upon
pub fn check_outranks(reviewer: RoleTier, target: RoleTier) -> Result<(), NotEligibleReason> {
    if target >= reviewer {
        return Err(NotEligibleReason::TargetOutranksReviewer);
    }
    Ok(())
}

/// Approval grants at least Member and strictly less than the reviewer holds
pub fn check_grant(tier: RoleTier, reviewer: RoleTier) -> Result<(), Refusal> {
    if tier < RoleTier::LOWEST_GRANTED {
        return Err(Refusal::Validation(format!(
            "cannot approve at {}, the lowest granted tier is {}",
            tier,
            RoleTier::LOWEST_GRANTED
        )));
    }
    if tier >= reviewer {
        return Err(Refusal::Validation(format!(
            "cannot grant {} while holding {}",
            tier, reviewer
        )));
    }
    Ok(())
}

/// Rules for promote and demote
pub fn check_tier_change(
    direction: TierDirection,
    current: RoleTier,
    new: RoleTier,
    reviewer: RoleTier,
) -> Result<(), Refusal> {
    check_outranks(reviewer, current)?;
    if new >= reviewer {
        return Err(Refusal::Validation(format!("cannot assign {} while holding {}", new, reviewer)));
    }
    match direction {
        TierDirection::Promote if new <= current => Err(Refusal::Validation(format!(
            "promotion must raise the tier above {}",
            current
        ))),
        TierDirection::Demote if new >= current => Err(Refusal::Validation(format!(
            "demotion must lower the tier below {}",
            current
        ))),
        TierDirection::Demote if new < RoleTier::LOWEST_GRANTED => Err(Refusal::Validation(format!(
            "demotion cannot go below {}",
            RoleTier::LOWEST_GRANTED
        ))),
        _ => Ok(()),
    }
}

/// Result of a decision on a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionReport {
    pub submission: Submission,
    pub member: Member,
    pub previous_tier: RoleTier,
    pub banned: bool,
}

/// Result of an appeal decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppealDecisionReport {
    pub appeal: Appeal,
    pub member: Member,
}

/// Result of a promote or demote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierChangeReport {
    pub member: Member,
    pub previous_tier: RoleTier,
}

/// What a reset cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetScope {
    /// Requested by the person themself
    SelfService,
    /// Moderator reset; the appeal right is untouched
    Application,
    /// Moderator reset that also restores the appeal right
    ApplicationAndAppeal,
    /// Moderator removed every tier role
    StripRoles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub member: Member,
    pub previous_tier: RoleTier,
    pub removed_submissions: usize,
    pub scope: ResetScope,
    /// First question of the fresh session, for self-service resets
    pub next: Option<SessionStep>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reviewer_must_reach_moderator_tier() {
        assert!(check_reviewer(RoleTier::Moderator, RoleTier::Moderator).is_ok());
        assert!(check_reviewer(RoleTier::Leader, RoleTier::Moderator).is_ok());
        assert_eq!(
            check_reviewer(RoleTier::Trusted, RoleTier::Moderator),
            Err(NotEligibleReason::ReviewerTierTooLow {
                required: RoleTier::Moderator,
                actual: RoleTier::Trusted
            })
        );
    }

    #[test]
    fn test_grant_bounds() {
        assert!(check_grant(RoleTier::Member, RoleTier::Moderator).is_ok());
        assert!(check_grant(RoleTier::Trusted, RoleTier::Moderator).is_ok());
        assert!(check_grant(RoleTier::Moderator, RoleTier::Moderator).is_err());
        assert!(check_grant(RoleTier::Applicant, RoleTier::Leader).is_err());
        assert!(check_grant(RoleTier::Moderator, RoleTier::Leader).is_ok());
    }

    #[test]
    fn test_tier_changes() {
        use TierDirection::*;

        assert!(check_tier_change(Promote, RoleTier::Member, RoleTier::Trusted, RoleTier::Moderator).is_ok());
        // Cannot lift someone to the reviewer's own tier
        assert!(check_tier_change(Promote, RoleTier::Trusted, RoleTier::Moderator, RoleTier::Moderator).is_err());
        // Promotion must go up
        assert!(check_tier_change(Promote, RoleTier::Trusted, RoleTier::Member, RoleTier::Leader).is_err());

        assert!(check_tier_change(Demote, RoleTier::Moderator, RoleTier::Member, RoleTier::Leader).is_ok());
        assert!(check_tier_change(Demote, RoleTier::Member, RoleTier::Applicant, RoleTier::Leader).is_err());
        // Target at the reviewer's tier is out of reach
        assert_eq!(
            check_tier_change(Demote, RoleTier::Moderator, RoleTier::Member, RoleTier::Moderator),
            Err(Refusal::NotEligible(NotEligibleReason::TargetOutranksReviewer))
        );
    }
}
