//! Manager traits for application, review and appeal operations
//!
//! Every method runs one store transaction. Refusals leave the store
//! untouched; callers pass `now` so the timeline is explicit.

use super::appeal::{Appeal, AppealOutcome};
use super::errors::OnboardingResult;
use super::member::{Member, ProfileChange, ProfileSnapshot, RoleTier};
use super::question_graph::AnswerValue;
use super::review::{
    AppealDecisionReport, DecisionReport, ResetReport, ResetScope, ReviewItem, ReviewOutcome,
    TierChangeReport, TierDirection,
};
use super::session::{SessionStep, Submission, SubmissionKind};
use super::types::{AppealId, GroupId, MemberKey, QuestionId, SubmissionId, Timestamp, UserId};

/// Operations a person performs on their own application
pub trait ApplicationManager {
    /// Start a new session or pick up the open one
    fn start_or_resume(
        &self,
        member: &MemberKey,
        kind: SubmissionKind,
        referral_note: Option<&str>,
        now: Timestamp,
    ) -> OnboardingResult<SessionStep>;

    /// Record (or overwrite) one answer and move the session forward
    fn submit_answer(
        &self,
        member: &MemberKey,
        question: &QuestionId,
        value: AnswerValue,
        now: Timestamp,
    ) -> OnboardingResult<SessionStep>;

    /// Finalize a session whose questionnaire is complete; repeat calls are no-ops
    fn complete_session(&self, member: &MemberKey, now: Timestamp) -> OnboardingResult<SessionStep>;

    /// Throw away the application and start over
    fn request_reset(&self, member: &MemberKey, now: Timestamp) -> OnboardingResult<ResetReport>;

    /// Close the open session; the person is back to no application
    fn abandon(&self, member: &MemberKey, now: Timestamp) -> OnboardingResult<Member>;

    /// Register a newcomer; the flag is true when the record was created
    fn welcome(
        &self,
        member: &MemberKey,
        profile: Option<&ProfileSnapshot>,
        now: Timestamp,
    ) -> OnboardingResult<(Member, bool)>;

    /// Store a fresh profile snapshot; returns what changed since the last one
    fn record_profile(
        &self,
        member: &MemberKey,
        snapshot: &ProfileSnapshot,
        now: Timestamp,
    ) -> OnboardingResult<Vec<ProfileChange>>;

    fn member(&self, member: &MemberKey) -> OnboardingResult<Member>;
}

/// Operations reviewers perform
pub trait ReviewManager {
    /// Pending applications and appeals, oldest first
    fn list_pending(&self, group: &GroupId) -> OnboardingResult<Vec<ReviewItem>>;

    fn decide(
        &self,
        submission: SubmissionId,
        reviewer: &UserId,
        outcome: ReviewOutcome,
        now: Timestamp,
    ) -> OnboardingResult<DecisionReport>;

    fn change_tier(
        &self,
        member: &MemberKey,
        reviewer: &UserId,
        direction: TierDirection,
        tier: RoleTier,
        now: Timestamp,
    ) -> OnboardingResult<TierChangeReport>;

    /// Moderator reset of someone else's onboarding
    fn reset_member(
        &self,
        member: &MemberKey,
        reviewer: &UserId,
        scope: ResetScope,
        now: Timestamp,
    ) -> OnboardingResult<ResetReport>;

    /// Seed an approved record at `tier` for existing staff
    fn register_staff(&self, member: &MemberKey, tier: RoleTier, now: Timestamp) -> OnboardingResult<Member>;

    fn submission(&self, submission: SubmissionId) -> OnboardingResult<Submission>;
}

/// The one-time appeal
pub trait AppealManager {
    fn file_appeal(&self, member: &MemberKey, reason: &str, now: Timestamp) -> OnboardingResult<Appeal>;

    fn decide_appeal(
        &self,
        appeal: AppealId,
        reviewer: &UserId,
        outcome: AppealOutcome,
        now: Timestamp,
    ) -> OnboardingResult<AppealDecisionReport>;

    fn appeal(&self, appeal: AppealId) -> OnboardingResult<Appeal>;
}
