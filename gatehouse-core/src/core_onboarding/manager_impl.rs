//! Manager trait implementations over the SQLite store
//!
//! Each operation is a single IMMEDIATE transaction: read the member, apply
//! the pure transition rules, then write with a compare-and-swap on the
//! status that was read. A refusal returned from inside the transaction
//! rolls it back.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::appeal::{check_can_appeal, validate_reason, Appeal, AppealOutcome, AppealStatus};
use super::audit::{AuditAction, AuditEntry};
use super::errors::{NotEligibleReason, OnboardingError, OnboardingResult, Refusal};
use super::graph_registry::GraphRegistry;
use super::manager::{AppealManager, ApplicationManager, ReviewManager};
use super::member::{ApplicationStatus, Member, ProfileChange, ProfileSnapshot, RoleTier};
use super::question_graph::{AnswerSet, AnswerValue, QuestionGraph};
use super::review::{
    check_grant, check_outranks, check_reviewer, check_tier_change, sort_queue, AppealDecisionReport,
    DecisionReport, ResetReport, ResetScope, ReviewItem, ReviewOutcome, TierChangeReport, TierDirection,
};
use super::session::{
    check_self_reset, check_start, compute_flags, Answer, SessionStep, StartMode, Submission,
    SubmissionDecision, SubmissionKind, SubmissionStatus,
};
use super::storage::{SqlStore, StoreError, StoreTx};
use super::types::{AppealId, GroupId, MemberKey, QuestionId, SubmissionId, Timestamp, UserId};
use crate::config::{FeatureManager, OnboardingConfig};

/// Reviewer note on appeals closed by a moderator reset
const CLOSED_BY_RESET: &str = "closed by moderator reset";

fn corrupt(message: String) -> OnboardingError {
    OnboardingError::Storage(StoreError::Corrupt(message))
}

/// The row moved under us; with IMMEDIATE transactions this means another
/// writer committed first
fn lost_race() -> OnboardingError {
    Refusal::AlreadyDecided.into()
}

pub struct OnboardingManagerImpl {
    store: SqlStore,
    graphs: GraphRegistry,
    settings: OnboardingConfig,
    features: FeatureManager,
}

impl OnboardingManagerImpl {
    pub fn new(store: SqlStore, graphs: GraphRegistry, settings: OnboardingConfig, features: FeatureManager) -> Self {
        Self { store, graphs, settings, features }
    }

    pub fn store(&self) -> &SqlStore {
        &self.store
    }

    pub fn settings(&self) -> &OnboardingConfig {
        &self.settings
    }

    pub fn graph(&self, group: &GroupId) -> Result<Arc<QuestionGraph>, Refusal> {
        self.graphs.get(group).ok_or_else(|| Refusal::NotConfigured(group.clone()))
    }

    fn load_member(tx: &StoreTx<'_>, key: &MemberKey) -> OnboardingResult<Member> {
        tx.get_member(key)?.ok_or_else(|| Refusal::NotFound(format!("member {}", key)).into())
    }

    /// Tier a reviewer acts with; only approved records carry authority
    fn reviewer_tier(tx: &StoreTx<'_>, key: &MemberKey) -> OnboardingResult<RoleTier> {
        Ok(match tx.get_member(key)? {
            Some(member) if member.status == ApplicationStatus::Approved => member.role_tier,
            _ => RoleTier::Applicant,
        })
    }

    fn open_submission(tx: &StoreTx<'_>, key: &MemberKey) -> OnboardingResult<Option<Submission>> {
        Ok(tx.latest_submission(key, SubmissionStatus::InProgress)?)
    }

    fn pending_submission(tx: &StoreTx<'_>, key: &MemberKey) -> OnboardingResult<Submission> {
        tx.latest_submission(key, SubmissionStatus::Pending)?
            .ok_or_else(|| corrupt(format!("{} is PENDING without a pending submission", key)))
    }

    /// Next question of `submission`, or finalize it when nothing is left
    fn advance(&self, tx: &StoreTx<'_>, submission: Submission, now: Timestamp) -> OnboardingResult<SessionStep> {
        let (flagged, flag_reason) = if submission.kind.uses_graph() {
            let graph = self.graph(&submission.member.group)?;
            let answers = submission.answer_set();
            if let Some(next) = graph.next_question(&answers) {
                return Ok(SessionStep::Question { submission: submission.id, question: next.clone() });
            }
            compute_flags(&graph, &answers)
        } else {
            (false, None)
        };

        if !tx.finalize_submission(submission.id, flagged, flag_reason.as_deref(), now)? {
            return Err(lost_race());
        }

        let mut member = Self::load_member(tx, &submission.member)?;
        member.status = ApplicationStatus::Pending;
        member.updated_at = now;
        if !tx.save_member(&member, ApplicationStatus::InProgress)? {
            return Err(lost_race());
        }

        let submission = tx
            .get_submission(submission.id)?
            .ok_or_else(|| corrupt(format!("submission {} vanished", submission.id)))?;
        info!(
            member = %submission.member,
            submission = %submission.id,
            kind = submission.kind.as_str(),
            flagged,
            "Submission queued for review"
        );
        Ok(SessionStep::Submitted(submission))
    }

    fn audit(tx: &StoreTx<'_>, entry: AuditEntry) -> OnboardingResult<()> {
        let id = tx.append_audit(&entry)?;
        debug!(audit = id, action = %entry.action, target = %entry.target, "Audit entry appended");
        Ok(())
    }

    /// Ordered answer list following the traversal, keeping earlier answer times
    fn ordered_answers(
        graph: &QuestionGraph,
        answers: &AnswerSet,
        previous: &[Answer],
        changed: &QuestionId,
        now: Timestamp,
    ) -> Vec<Answer> {
        let answered_at: HashMap<&QuestionId, Timestamp> =
            previous.iter().map(|a| (&a.question, a.answered_at)).collect();

        graph
            .reachable_path(answers)
            .into_iter()
            .filter_map(|node| {
                let value = answers.get(&node.id)?;
                let at = if &node.id == changed {
                    now
                } else {
                    answered_at.get(&node.id).copied().unwrap_or(now)
                };
                Some(Answer { question: node.id.clone(), value: value.clone(), answered_at: at })
            })
            .collect()
    }
}

impl ApplicationManager for OnboardingManagerImpl {
    fn start_or_resume(
        &self,
        key: &MemberKey,
        kind: SubmissionKind,
        referral_note: Option<&str>,
        now: Timestamp,
    ) -> OnboardingResult<SessionStep> {
        if kind.uses_graph() {
            self.graph(&key.group)?;
        }
        let referral_note = referral_note.map(str::trim).filter(|note| !note.is_empty());

        self.store.write(|tx| {
            let (mut member, _) = tx.ensure_member(key, now)?;
            let appeal = tx.appeal_for(key)?.map(|appeal| appeal.status);
            let mode = check_start(&member, appeal, self.features.reapply_after_denied_appeal())?;

            match mode {
                StartMode::AwaitingReview => {
                    Ok(SessionStep::AlreadyPending(Self::pending_submission(tx, key)?))
                }
                StartMode::Resume => {
                    let submission = match Self::open_submission(tx, key)? {
                        Some(submission) => submission,
                        // Reset or approved appeal left the member open with nothing on file
                        None => tx.insert_submission(key, kind, referral_note, now)?,
                    };
                    debug!(member = %key, submission = %submission.id, "Resuming application");
                    self.advance(tx, submission, now)
                }
                StartMode::Fresh => {
                    let expected = member.status;
                    if expected == ApplicationStatus::Rejected {
                        let removed = tx.delete_submissions(key)?;
                        debug!(member = %key, removed, "Cleared rejected submissions for a fresh attempt");
                    }
                    member.status = ApplicationStatus::InProgress;
                    member.updated_at = now;
                    if !tx.save_member(&member, expected)? {
                        return Err(lost_race());
                    }

                    let submission = tx.insert_submission(key, kind, referral_note, now)?;
                    info!(member = %key, submission = %submission.id, kind = kind.as_str(), "Application started");
                    self.advance(tx, submission, now)
                }
            }
        })
    }

    fn submit_answer(
        &self,
        key: &MemberKey,
        question: &QuestionId,
        value: AnswerValue,
        now: Timestamp,
    ) -> OnboardingResult<SessionStep> {
        self.store.write(|tx| {
            let member = tx.get_member(key)?.ok_or(NotEligibleReason::NotStarted)?;
            match member.status {
                ApplicationStatus::InProgress => {}
                ApplicationStatus::None => return Err(NotEligibleReason::NotStarted.into()),
                ApplicationStatus::Pending => return Err(NotEligibleReason::AlreadySubmitted.into()),
                ApplicationStatus::Approved | ApplicationStatus::Rejected => {
                    return Err(NotEligibleReason::NoOpenSession.into())
                }
            }

            let mut submission = Self::open_submission(tx, key)?.ok_or(NotEligibleReason::NoOpenSession)?;
            if !submission.kind.uses_graph() {
                return Err(Refusal::Validation("this application has no questionnaire".to_string()).into());
            }

            let graph = self.graph(&key.group)?;
            let node = graph
                .question(question)
                .ok_or_else(|| Refusal::Validation(format!("unknown question '{}'", question)))?;

            let mut answers = submission.answer_set();
            let is_next = graph.next_question(&answers).map(|next| &next.id) == Some(question);
            let is_overwrite = answers.contains_key(question) && graph.is_reachable(question, &answers);
            if !is_next && !is_overwrite {
                return Err(Refusal::Validation(format!("question '{}' is not open", question)).into());
            }

            let value = graph.validate_answer(node, value, self.settings.max_answer_length)?;
            answers.insert(question.clone(), value);
            let pruned = graph.prune_unreachable(&mut answers);
            if !pruned.is_empty() {
                debug!(member = %key, question = %question, pruned = pruned.len(), "Dropped answers on closed branch");
            }

            let ordered = Self::ordered_answers(&graph, &answers, &submission.answers, question, now);
            tx.replace_answers(submission.id, &ordered)?;
            submission.answers = ordered;

            self.advance(tx, submission, now)
        })
    }

    fn complete_session(&self, key: &MemberKey, now: Timestamp) -> OnboardingResult<SessionStep> {
        self.store.write(|tx| {
            let member = tx.get_member(key)?.ok_or(NotEligibleReason::NotStarted)?;
            match member.status {
                ApplicationStatus::Pending => {
                    Ok(SessionStep::AlreadyPending(Self::pending_submission(tx, key)?))
                }
                ApplicationStatus::InProgress => {
                    let submission =
                        Self::open_submission(tx, key)?.ok_or(NotEligibleReason::NoOpenSession)?;
                    self.advance(tx, submission, now)
                }
                ApplicationStatus::None => Err(NotEligibleReason::NotStarted.into()),
                ApplicationStatus::Approved => Err(NotEligibleReason::AlreadyApproved.into()),
                ApplicationStatus::Rejected => Err(NotEligibleReason::NoOpenSession.into()),
            }
        })
    }

    fn request_reset(&self, key: &MemberKey, now: Timestamp) -> OnboardingResult<ResetReport> {
        self.graph(&key.group)?;

        self.store.write(|tx| {
            let mut member = tx.get_member(key)?.ok_or(NotEligibleReason::NotStarted)?;
            check_self_reset(&member)?;
            if member.status == ApplicationStatus::Rejected
                && tx.appeal_for(key)?.map(|appeal| appeal.status) == Some(AppealStatus::Pending)
            {
                return Err(NotEligibleReason::AppealPending.into());
            }

            let previous_tier = member.role_tier;
            let expected = member.status;
            let removed_submissions = tx.delete_submissions(key)?;
            member.reset_onboarding(now);
            if !tx.save_member(&member, expected)? {
                return Err(lost_race());
            }

            let submission = tx.insert_submission(key, SubmissionKind::Applicant, None, now)?;
            let next = self.advance(tx, submission, now)?;
            Self::audit(tx, AuditEntry::new(&key.group, &key.user, &key.user, AuditAction::Reset, now))?;

            info!(member = %key, previous_tier = %previous_tier, removed_submissions, "Onboarding reset by member");
            Ok(ResetReport {
                member,
                previous_tier,
                removed_submissions,
                scope: ResetScope::SelfService,
                next: Some(next),
            })
        })
    }

    fn abandon(&self, key: &MemberKey, now: Timestamp) -> OnboardingResult<Member> {
        self.store.write(|tx| {
            let mut member = tx.get_member(key)?.ok_or(NotEligibleReason::NotStarted)?;
            match member.status {
                ApplicationStatus::InProgress => {}
                ApplicationStatus::None => return Err(NotEligibleReason::NotStarted.into()),
                _ => return Err(NotEligibleReason::NoOpenSession.into()),
            }

            if let Some(submission) = Self::open_submission(tx, key)? {
                tx.set_submission_status(submission.id, SubmissionStatus::InProgress, SubmissionStatus::Abandoned)?;
            }
            member.status = ApplicationStatus::None;
            member.updated_at = now;
            if !tx.save_member(&member, ApplicationStatus::InProgress)? {
                return Err(lost_race());
            }

            info!(member = %key, "Application abandoned");
            Ok(member)
        })
    }

    fn welcome(
        &self,
        key: &MemberKey,
        profile: Option<&ProfileSnapshot>,
        now: Timestamp,
    ) -> OnboardingResult<(Member, bool)> {
        self.store.write(|tx| {
            let (mut member, created) = tx.ensure_member(key, now)?;
            if let Some(profile) = profile.filter(|p| member.profile.is_empty() && !p.is_empty()) {
                tx.update_profile(key, profile, now)?;
                member.profile = profile.clone();
            }
            if created {
                info!(member = %key, "New member registered");
            }
            Ok((member, created))
        })
    }

    fn record_profile(
        &self,
        key: &MemberKey,
        snapshot: &ProfileSnapshot,
        now: Timestamp,
    ) -> OnboardingResult<Vec<ProfileChange>> {
        self.store.write(|tx| {
            let (member, _) = tx.ensure_member(key, now)?;
            // First snapshot is a baseline, not a change
            let changes = if member.profile.is_empty() { Vec::new() } else { member.profile.diff(snapshot) };
            if &member.profile != snapshot {
                tx.update_profile(key, snapshot, now)?;
            }
            Ok(changes)
        })
    }

    fn member(&self, key: &MemberKey) -> OnboardingResult<Member> {
        self.store.read(|tx| Self::load_member(tx, key))
    }
}

impl ReviewManager for OnboardingManagerImpl {
    fn list_pending(&self, group: &GroupId) -> OnboardingResult<Vec<ReviewItem>> {
        self.store.read(|tx| {
            let mut items: Vec<ReviewItem> =
                tx.pending_submissions(group)?.into_iter().map(ReviewItem::Application).collect();
            items.extend(tx.pending_appeals(group)?.into_iter().map(ReviewItem::Appeal));
            sort_queue(&mut items);
            Ok(items)
        })
    }

    fn decide(
        &self,
        id: SubmissionId,
        reviewer: &UserId,
        outcome: ReviewOutcome,
        now: Timestamp,
    ) -> OnboardingResult<DecisionReport> {
        self.store.write(|tx| {
            let submission = tx
                .get_submission(id)?
                .ok_or_else(|| Refusal::NotFound(format!("submission {}", id)))?;
            if submission.status != SubmissionStatus::Pending {
                return Err(Refusal::AlreadyDecided.into());
            }

            let key = submission.member.clone();
            let reviewer_tier = Self::reviewer_tier(tx, &key.with_user(reviewer))?;
            check_reviewer(reviewer_tier, self.settings.moderator_tier)?;

            let (status, decision, banned) = match &outcome {
                ReviewOutcome::Approve { tier } => {
                    check_grant(*tier, reviewer_tier)?;
                    let decision = SubmissionDecision {
                        reviewer: reviewer.clone(),
                        reason: None,
                        granted_tier: Some(*tier),
                        reviewed_at: now,
                    };
                    (SubmissionStatus::Approved, decision, false)
                }
                ReviewOutcome::Reject { reason, ban } => {
                    let decision = SubmissionDecision {
                        reviewer: reviewer.clone(),
                        reason: reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
                        granted_tier: None,
                        reviewed_at: now,
                    };
                    (SubmissionStatus::Rejected, decision, *ban)
                }
            };

            if !tx.decide_submission(id, status, &decision)? {
                return Err(Refusal::AlreadyDecided.into());
            }

            let mut member = tx
                .get_member(&key)?
                .ok_or_else(|| corrupt(format!("submission {} has no member {}", id, key)))?;
            let previous_tier = member.role_tier;
            let action = match outcome {
                ReviewOutcome::Approve { tier } => {
                    member.status = ApplicationStatus::Approved;
                    member.role_tier = tier;
                    member.approved_at = Some(now);
                    AuditAction::Approve
                }
                ReviewOutcome::Reject { .. } => {
                    member.status = ApplicationStatus::Rejected;
                    if banned {
                        AuditAction::Ban
                    } else {
                        AuditAction::Reject
                    }
                }
            };
            member.updated_at = now;
            if !tx.save_member(&member, ApplicationStatus::Pending)? {
                return Err(Refusal::AlreadyDecided.into());
            }

            Self::audit(
                tx,
                AuditEntry::new(&key.group, &key.user, reviewer, action, now)
                    .submission(id)
                    .reason(decision.reason.as_deref())
                    .banned(banned),
            )?;

            let submission = tx
                .get_submission(id)?
                .ok_or_else(|| corrupt(format!("submission {} vanished", id)))?;
            info!(
                member = %key,
                submission = %id,
                reviewer = %reviewer,
                action = %action,
                tier = %member.role_tier,
                "Application decided"
            );
            Ok(DecisionReport { submission, member, previous_tier, banned })
        })
    }

    fn change_tier(
        &self,
        key: &MemberKey,
        reviewer: &UserId,
        direction: TierDirection,
        tier: RoleTier,
        now: Timestamp,
    ) -> OnboardingResult<TierChangeReport> {
        self.store.write(|tx| {
            let reviewer_tier = Self::reviewer_tier(tx, &key.with_user(reviewer))?;
            check_reviewer(reviewer_tier, self.settings.moderator_tier)?;

            let mut member = Self::load_member(tx, key)?;
            if member.status != ApplicationStatus::Approved {
                return Err(NotEligibleReason::NotApproved.into());
            }
            check_tier_change(direction, member.role_tier, tier, reviewer_tier)?;

            let previous_tier = member.role_tier;
            member.role_tier = tier;
            member.updated_at = now;
            if !tx.save_member(&member, ApplicationStatus::Approved)? {
                return Err(lost_race());
            }

            let action = match direction {
                TierDirection::Promote => AuditAction::Promote,
                TierDirection::Demote => AuditAction::Demote,
            };
            let change = format!("{} -> {}", previous_tier, tier);
            Self::audit(
                tx,
                AuditEntry::new(&key.group, &key.user, reviewer, action, now).reason(Some(&change)),
            )?;

            info!(member = %key, reviewer = %reviewer, action = %action, change = %change, "Tier changed");
            Ok(TierChangeReport { member, previous_tier })
        })
    }

    fn reset_member(
        &self,
        key: &MemberKey,
        reviewer: &UserId,
        scope: ResetScope,
        now: Timestamp,
    ) -> OnboardingResult<ResetReport> {
        self.store.write(|tx| {
            let reviewer_tier = Self::reviewer_tier(tx, &key.with_user(reviewer))?;
            check_reviewer(reviewer_tier, self.settings.moderator_tier)?;

            let mut member = Self::load_member(tx, key)?;
            check_outranks(reviewer_tier, member.role_tier)?;
            if member.status == ApplicationStatus::None {
                return Err(NotEligibleReason::NotStarted.into());
            }

            let previous_tier = member.role_tier;
            let expected = member.status;
            let mut removed_submissions = 0;
            let mut closed_appeals = 0;
            let (action, note) = match scope {
                ResetScope::Application => {
                    removed_submissions = tx.delete_submissions(key)?;
                    closed_appeals = tx.close_pending_appeals(key, reviewer, CLOSED_BY_RESET, now)?;
                    (AuditAction::Reset, None)
                }
                ResetScope::ApplicationAndAppeal => {
                    removed_submissions = tx.delete_submissions(key)?;
                    tx.delete_appeals(key)?;
                    member.appeal_used = false;
                    (AuditAction::Reset, Some("appeal eligibility restored"))
                }
                ResetScope::StripRoles => {
                    // History stays; open questionnaires leave the queue
                    for status in [SubmissionStatus::Pending, SubmissionStatus::InProgress] {
                        if let Some(open) = tx.latest_submission(key, status)? {
                            tx.set_submission_status(open.id, status, SubmissionStatus::Abandoned)?;
                        }
                    }
                    closed_appeals = tx.close_pending_appeals(key, reviewer, CLOSED_BY_RESET, now)?;
                    (AuditAction::StripRoles, None)
                }
                ResetScope::SelfService => {
                    return Err(Refusal::Validation(
                        "self-service resets go through request_reset".to_string(),
                    )
                    .into())
                }
            };

            member.reset_onboarding(now);
            if !tx.save_member(&member, expected)? {
                return Err(lost_race());
            }
            Self::audit(tx, AuditEntry::new(&key.group, &key.user, reviewer, action, now).reason(note))?;

            info!(
                member = %key,
                reviewer = %reviewer,
                scope = ?scope,
                previous_tier = %previous_tier,
                removed_submissions,
                closed_appeals,
                "Onboarding reset by moderator"
            );
            Ok(ResetReport { member, previous_tier, removed_submissions, scope, next: None })
        })
    }

    fn register_staff(&self, key: &MemberKey, tier: RoleTier, now: Timestamp) -> OnboardingResult<Member> {
        if tier < RoleTier::LOWEST_GRANTED {
            return Err(Refusal::Validation(format!(
                "staff must hold at least the {} tier",
                RoleTier::LOWEST_GRANTED
            ))
            .into());
        }

        self.store.write(|tx| {
            let (mut member, _) = tx.ensure_member(key, now)?;
            let expected = member.status;
            member.status = ApplicationStatus::Approved;
            member.role_tier = tier;
            member.approved_at = Some(member.approved_at.unwrap_or(now));
            member.updated_at = now;
            if !tx.save_member(&member, expected)? {
                return Err(lost_race());
            }
            info!(member = %key, tier = %tier, "Registered staff member");
            Ok(member)
        })
    }

    fn submission(&self, id: SubmissionId) -> OnboardingResult<Submission> {
        self.store.read(|tx| {
            tx.get_submission(id)?
                .ok_or_else(|| Refusal::NotFound(format!("submission {}", id)).into())
        })
    }
}

impl AppealManager for OnboardingManagerImpl {
    fn file_appeal(&self, key: &MemberKey, reason: &str, now: Timestamp) -> OnboardingResult<Appeal> {
        let reason = validate_reason(reason, self.settings.max_appeal_length)?;

        self.store.write(|tx| {
            let member = tx.get_member(key)?.ok_or(NotEligibleReason::NotStarted)?;
            check_can_appeal(&member)?;
            // Spends the right in the same transaction that creates the appeal
            if !tx.claim_appeal(key, now)? {
                return Err(NotEligibleReason::AppealAlreadyUsed.into());
            }

            let appeal = tx.insert_appeal(key, &reason, now)?;
            Self::audit(
                tx,
                AuditEntry::new(&key.group, &key.user, &key.user, AuditAction::AppealFiled, now)
                    .appeal(appeal.id)
                    .reason(Some(&reason)),
            )?;

            info!(member = %key, appeal = %appeal.id, "Appeal filed");
            Ok(appeal)
        })
    }

    fn decide_appeal(
        &self,
        id: AppealId,
        reviewer: &UserId,
        outcome: AppealOutcome,
        now: Timestamp,
    ) -> OnboardingResult<AppealDecisionReport> {
        self.store.write(|tx| {
            let appeal = tx.get_appeal(id)?.ok_or_else(|| Refusal::NotFound(format!("appeal {}", id)))?;
            if appeal.status != AppealStatus::Pending {
                return Err(Refusal::AlreadyDecided.into());
            }

            let key = appeal.member.clone();
            let reviewer_tier = Self::reviewer_tier(tx, &key.with_user(reviewer))?;
            check_reviewer(reviewer_tier, self.settings.moderator_tier)?;

            let mut member = tx
                .get_member(&key)?
                .ok_or_else(|| corrupt(format!("appeal {} has no member {}", id, key)))?;
            // The member moved on since filing; the appeal no longer applies
            if member.status != ApplicationStatus::Rejected {
                return Err(NotEligibleReason::NotRejected.into());
            }

            let note = outcome.note().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
            if !tx.decide_appeal(id, outcome.status(), reviewer, note.as_deref(), now)? {
                return Err(Refusal::AlreadyDecided.into());
            }

            let action = match &outcome {
                AppealOutcome::Approve { .. } => {
                    let removed = tx.delete_submissions(&key)?;
                    member.status = ApplicationStatus::InProgress;
                    member.updated_at = now;
                    if !tx.save_member(&member, ApplicationStatus::Rejected)? {
                        return Err(lost_race());
                    }
                    debug!(member = %key, removed, "Cleared submissions after approved appeal");
                    AuditAction::AppealApproved
                }
                AppealOutcome::Reject { .. } => AuditAction::AppealRejected,
            };

            Self::audit(
                tx,
                AuditEntry::new(&key.group, &key.user, reviewer, action, now).appeal(id).reason(note.as_deref()),
            )?;

            let appeal = tx.get_appeal(id)?.ok_or_else(|| corrupt(format!("appeal {} vanished", id)))?;
            info!(member = %key, appeal = %id, reviewer = %reviewer, action = %action, "Appeal decided");
            Ok(AppealDecisionReport { appeal, member })
        })
    }

    fn appeal(&self, id: AppealId) -> OnboardingResult<Appeal> {
        self.store.read(|tx| {
            tx.get_appeal(id)?
                .ok_or_else(|| Refusal::NotFound(format!("appeal {}", id)).into())
        })
    }
}
