//! Async onboarding API
//!
//! Wraps the synchronous manager the way the other async managers in this
//! crate do, and adds what a shared service needs around it:
//! - one lock per (group, person) so a member's read-modify-write never interleaves
//! - sliding-window rate limits on member-facing commands
//! - notifications queued on the outbox after the transaction commits
//!
//! Every operation returns [`ServiceResult`]: refusals are `Ok(Outcome::Refused)`,
//! only storage failure is an `Err`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use super::appeal::{Appeal, AppealOutcome};
use super::errors::{OnboardingResult, Outcome, Refusal, ServiceResult};
use super::graph_registry::GraphRegistry;
use super::manager::{AppealManager, ApplicationManager, ReviewManager};
use super::manager_impl::OnboardingManagerImpl;
use super::member::{Member, ProfileChange, ProfileSnapshot, RoleTier};
use super::messages;
use super::metrics;
use super::notify::{Fallback, Notification, Outbox};
use super::question_graph::AnswerValue;
use super::review::{
    AppealDecisionReport, DecisionReport, ResetReport, ResetScope, ReviewItem, ReviewOutcome,
    TierChangeReport, TierDirection,
};
use super::session::{SessionStep, Submission, SubmissionKind};
use super::storage::SqlStore;
use super::types::{AppealId, GroupId, MemberKey, QuestionId, RoleRef, SubmissionId, Timestamp, UserId};
use crate::config::{FeatureManager, OnboardingConfig, RateLimitConfig};
use crate::rate_limiter::{CommandCategory, RateLimitDecision, SlidingWindowLimiter};

/// Idle lock entries are swept once the registry grows past this
const LOCK_SWEEP_THRESHOLD: usize = 1024;

/// Per-member async locks
#[derive(Debug, Clone, Default)]
struct MemberLocks {
    locks: Arc<StdMutex<HashMap<MemberKey, Arc<Mutex<()>>>>>,
}

impl MemberLocks {
    async fn lock(&self, key: &MemberKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() > LOCK_SWEEP_THRESHOLD {
                locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            metrics::set_member_locks(locks.len());
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }
}

/// The exposed onboarding operations
#[derive(Clone)]
pub struct OnboardingService {
    manager: Arc<OnboardingManagerImpl>,
    limiter: Arc<SlidingWindowLimiter>,
    locks: MemberLocks,
    outbox: Outbox,
    rate_limits: RateLimitConfig,
    features: FeatureManager,
}

impl OnboardingService {
    pub fn new(
        store: SqlStore,
        graphs: GraphRegistry,
        settings: OnboardingConfig,
        rate_limits: RateLimitConfig,
        features: FeatureManager,
        outbox: Outbox,
    ) -> Self {
        let manager = OnboardingManagerImpl::new(store, graphs, settings, features.clone());
        Self {
            manager: Arc::new(manager),
            limiter: Arc::new(SlidingWindowLimiter::new()),
            locks: MemberLocks::default(),
            outbox,
            rate_limits,
            features,
        }
    }

    pub fn manager(&self) -> &OnboardingManagerImpl {
        &self.manager
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    fn settings(&self) -> &OnboardingConfig {
        self.manager.settings()
    }

    /// Split a manager result, logging refusals and storage failures
    fn finish<T>(&self, operation: &'static str, result: OnboardingResult<T>) -> ServiceResult<T> {
        let outcome = Outcome::from_result(result);
        match &outcome {
            Ok(Outcome::Refused(refusal)) => {
                warn!(operation, kind = refusal.kind(), reason = %refusal, "Operation refused");
                metrics::operation_refused(refusal.kind());
            }
            Err(err) => error!(operation, error = %err, "Storage failure"),
            Ok(Outcome::Done(_)) => {}
        }
        outcome
    }

    /// Admit one member-facing command, or explain when it may be retried
    pub async fn check_rate_limit(&self, member: &MemberKey, category: CommandCategory) -> ServiceResult<u32> {
        let limit = self.rate_limits.limit_for(category);
        if !self.features.rate_limiting() {
            return Ok(Outcome::Done(limit.max_uses));
        }

        match self.limiter.admit(&member.to_string(), category, limit).await {
            RateLimitDecision::Allowed { remaining } => Ok(Outcome::Done(remaining)),
            RateLimitDecision::Denied { retry_after } => {
                metrics::rate_limit_denied(category.as_str());
                Ok(Outcome::Refused(Refusal::RateLimited { retry_after }))
            }
        }
    }

    // ===== Notifications =====

    fn role(&self, tier: RoleTier) -> Option<RoleRef> {
        self.settings().roles.role_for(tier)
    }

    fn to_moderators(&self, content: String) {
        match self.settings().channels.moderator_queue() {
            Some(channel) => self.outbox.send(Notification::channel(channel, content)),
            None => debug!("No moderator queue channel configured, skipping post"),
        }
    }

    fn notify_submitted(&self, step: &SessionStep) {
        if let SessionStep::Submitted(submission) = step {
            metrics::submission_queued(submission.flagged);
            let graph = self.manager.graph(&submission.member.group).ok();
            self.to_moderators(messages::submission_queued(submission, graph.as_deref()));
        }
    }

    /// Revoke the role of `previous` when it differs from the current tier
    fn swap_roles(&self, member: &MemberKey, previous: RoleTier, current: RoleTier) {
        if previous == current {
            return;
        }
        if let Some(role) = self.role(previous) {
            self.outbox.send(Notification::RevokeRole { member: member.clone(), role });
        }
        if let Some(role) = self.role(current) {
            self.outbox.send(Notification::GrantRole { member: member.clone(), role });
        }
    }

    fn notify_decision(&self, report: &DecisionReport, outcome: &ReviewOutcome) {
        let key = &report.member.key;
        match outcome {
            ReviewOutcome::Approve { tier } => {
                metrics::decision_recorded("application", "approve");
                self.swap_roles(key, report.previous_tier, *tier);
                self.outbox.send(Notification::direct(&key.user, messages::approved(&key.group, *tier)));
                if self.features.announcements() {
                    if let Some(channel) = self.settings().channels.announcements() {
                        let content = messages::announcement(&self.settings().welcome_template, &key.user);
                        self.outbox.send(Notification::channel(channel, content));
                    }
                }
            }
            ReviewOutcome::Reject { reason, ban } => {
                metrics::decision_recorded("application", if *ban { "ban" } else { "reject" });
                // Queued ahead of the ban
                let stored = report.submission.decision.as_ref().and_then(|d| d.reason.as_deref());
                let content = messages::rejected(&key.group, stored, !report.member.appeal_used);
                self.outbox.send(Notification::direct(&key.user, content));
                if *ban {
                    self.outbox.send(Notification::Ban { member: key.clone(), reason: reason.clone() });
                }
            }
        }
    }

    fn notify_reset(&self, report: &ResetReport) {
        let key = &report.member.key;
        match report.scope {
            ResetScope::StripRoles => {
                for (_, role) in self.settings().roles.all() {
                    self.outbox.send(Notification::RevokeRole { member: key.clone(), role });
                }
                self.outbox.send(Notification::direct(&key.user, messages::roles_stripped(&key.group)));
            }
            scope => {
                self.swap_roles(key, report.previous_tier, report.member.role_tier);
                if scope != ResetScope::SelfService {
                    let restored = scope == ResetScope::ApplicationAndAppeal;
                    let content = messages::reset_by_moderator(&key.group, restored);
                    self.outbox.send(Notification::direct(&key.user, content));
                }
            }
        }
        if let Some(step) = &report.next {
            self.notify_submitted(step);
        }
    }

    // ===== Application sessions =====

    pub async fn start_or_resume_session(
        &self,
        group: &GroupId,
        user: &UserId,
        kind: SubmissionKind,
        referral_note: Option<&str>,
    ) -> ServiceResult<SessionStep> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.start_or_resume(&key, kind, referral_note, Timestamp::now());
        let outcome = self.finish("start_or_resume_session", result)?;
        if let Outcome::Done(step) = &outcome {
            let mode = if matches!(step, SessionStep::AlreadyPending(_)) { "pending" } else { "started" };
            metrics::session_started(mode);
            self.notify_submitted(step);
        }
        Ok(outcome)
    }

    pub async fn submit_answer(
        &self,
        group: &GroupId,
        user: &UserId,
        question: &QuestionId,
        value: AnswerValue,
    ) -> ServiceResult<SessionStep> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.submit_answer(&key, question, value, Timestamp::now());
        let outcome = self.finish("submit_answer", result)?;
        if let Outcome::Done(step) = &outcome {
            self.notify_submitted(step);
        }
        Ok(outcome)
    }

    /// Completion signal; a second call on a pending submission changes nothing
    pub async fn complete_session(&self, group: &GroupId, user: &UserId) -> ServiceResult<SessionStep> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.complete_session(&key, Timestamp::now());
        let outcome = self.finish("complete_session", result)?;
        if let Outcome::Done(step) = &outcome {
            self.notify_submitted(step);
        }
        Ok(outcome)
    }

    pub async fn request_reset(&self, group: &GroupId, user: &UserId) -> ServiceResult<ResetReport> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        if let Outcome::Refused(refusal) = self.check_rate_limit(&key, CommandCategory::Reset).await? {
            return Ok(Outcome::Refused(refusal));
        }
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.request_reset(&key, Timestamp::now());
        let outcome = self.finish("request_reset", result)?;
        if let Outcome::Done(report) = &outcome {
            self.notify_reset(report);
        }
        Ok(outcome)
    }

    pub async fn abandon_session(&self, group: &GroupId, user: &UserId) -> ServiceResult<Member> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.abandon(&key, Timestamp::now());
        self.finish("abandon_session", result)
    }

    // ===== Appeals =====

    pub async fn file_appeal(&self, group: &GroupId, user: &UserId, reason: &str) -> ServiceResult<Appeal> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        if let Outcome::Refused(refusal) = self.check_rate_limit(&key, CommandCategory::Appeal).await? {
            return Ok(Outcome::Refused(refusal));
        }
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.file_appeal(&key, reason, Timestamp::now());
        let outcome = self.finish("file_appeal", result)?;
        if let Outcome::Done(appeal) = &outcome {
            self.to_moderators(messages::appeal_filed(appeal));
        }
        Ok(outcome)
    }

    pub async fn decide_appeal(
        &self,
        appeal: AppealId,
        reviewer: &UserId,
        outcome: AppealOutcome,
    ) -> ServiceResult<AppealDecisionReport> {
        let key = match self.finish("decide_appeal", self.manager.appeal(appeal))? {
            Outcome::Done(appeal) => appeal.member,
            Outcome::Refused(refusal) => return Ok(Outcome::Refused(refusal)),
        };
        let _guard = self.locks.lock(&key).await;

        let action = match &outcome {
            AppealOutcome::Approve { .. } => "approve",
            AppealOutcome::Reject { .. } => "reject",
        };
        let result = self.manager.decide_appeal(appeal, reviewer, outcome, Timestamp::now());
        let outcome = self.finish("decide_appeal", result)?;
        if let Outcome::Done(report) = &outcome {
            metrics::decision_recorded("appeal", action);
            self.outbox
                .send(Notification::direct(&report.member.key.user, messages::appeal_decided(&report.appeal)));
        }
        Ok(outcome)
    }

    // ===== Review =====

    pub async fn list_pending(&self, group: &GroupId) -> ServiceResult<Vec<ReviewItem>> {
        self.finish("list_pending", self.manager.list_pending(group))
    }

    pub async fn decide(
        &self,
        submission: SubmissionId,
        reviewer: &UserId,
        outcome: ReviewOutcome,
    ) -> ServiceResult<DecisionReport> {
        let key = match self.finish("decide", self.manager.submission(submission))? {
            Outcome::Done(submission) => submission.member,
            Outcome::Refused(refusal) => return Ok(Outcome::Refused(refusal)),
        };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.decide(submission, reviewer, outcome.clone(), Timestamp::now());
        let decided = self.finish("decide", result)?;
        if let Outcome::Done(report) = &decided {
            self.notify_decision(report, &outcome);
        }
        Ok(decided)
    }

    async fn change_tier(
        &self,
        group: &GroupId,
        target: &UserId,
        reviewer: &UserId,
        direction: TierDirection,
        tier: RoleTier,
    ) -> ServiceResult<TierChangeReport> {
        let key = MemberKey { group: group.clone(), user: target.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.change_tier(&key, reviewer, direction, tier, Timestamp::now());
        let outcome = self.finish("change_tier", result)?;
        if let Outcome::Done(report) = &outcome {
            self.swap_roles(&key, report.previous_tier, report.member.role_tier);
            let content = messages::tier_changed(group, report.previous_tier, report.member.role_tier);
            self.outbox.send(Notification::direct(target, content));
        }
        Ok(outcome)
    }

    pub async fn promote(
        &self,
        group: &GroupId,
        target: &UserId,
        reviewer: &UserId,
        tier: RoleTier,
    ) -> ServiceResult<TierChangeReport> {
        self.change_tier(group, target, reviewer, TierDirection::Promote, tier).await
    }

    pub async fn demote(
        &self,
        group: &GroupId,
        target: &UserId,
        reviewer: &UserId,
        tier: RoleTier,
    ) -> ServiceResult<TierChangeReport> {
        self.change_tier(group, target, reviewer, TierDirection::Demote, tier).await
    }

    async fn moderator_reset(
        &self,
        group: &GroupId,
        target: &UserId,
        reviewer: &UserId,
        scope: ResetScope,
    ) -> ServiceResult<ResetReport> {
        let key = MemberKey { group: group.clone(), user: target.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.reset_member(&key, reviewer, scope, Timestamp::now());
        let outcome = self.finish("moderator_reset", result)?;
        if let Outcome::Done(report) = &outcome {
            self.notify_reset(report);
        }
        Ok(outcome)
    }

    /// Clear the application; the appeal right stays spent
    pub async fn reset_application(
        &self,
        group: &GroupId,
        target: &UserId,
        reviewer: &UserId,
    ) -> ServiceResult<ResetReport> {
        self.moderator_reset(group, target, reviewer, ResetScope::Application).await
    }

    /// Clear the application and give the appeal right back
    pub async fn reset_application_and_appeal_eligibility(
        &self,
        group: &GroupId,
        target: &UserId,
        reviewer: &UserId,
    ) -> ServiceResult<ResetReport> {
        self.moderator_reset(group, target, reviewer, ResetScope::ApplicationAndAppeal).await
    }

    pub async fn strip_roles(&self, group: &GroupId, target: &UserId, reviewer: &UserId) -> ServiceResult<ResetReport> {
        self.moderator_reset(group, target, reviewer, ResetScope::StripRoles).await
    }

    pub async fn register_staff(&self, group: &GroupId, user: &UserId, tier: RoleTier) -> ServiceResult<Member> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.register_staff(&key, tier, Timestamp::now());
        self.finish("register_staff", result)
    }

    // ===== Gateway events =====

    pub async fn record_profile(
        &self,
        group: &GroupId,
        user: &UserId,
        snapshot: &ProfileSnapshot,
    ) -> ServiceResult<Vec<ProfileChange>> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.record_profile(&key, snapshot, Timestamp::now());
        let outcome = self.finish("record_profile", result)?;
        if let Outcome::Done(changes) = &outcome {
            if !changes.is_empty() && self.features.profile_change_alerts() {
                self.to_moderators(messages::profile_changed(user, changes));
            }
        }
        Ok(outcome)
    }

    pub async fn welcome_member(
        &self,
        group: &GroupId,
        user: &UserId,
        profile: Option<&ProfileSnapshot>,
    ) -> ServiceResult<Member> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        let _guard = self.locks.lock(&key).await;

        let result = self.manager.welcome(&key, profile, Timestamp::now());
        let outcome = self.finish("welcome_member", result)?.map(|(member, _)| member);
        if outcome.is_done() {
            let welcome = &self.settings().welcome_message;
            let fallback = if self.features.dm_fallback() {
                self.settings().channels.welcome().map(|channel| Fallback {
                    channel,
                    content: messages::welcome_fallback(user, welcome),
                })
            } else {
                None
            };
            if fallback.is_none() {
                debug!(member = %key, "Welcome DM has no fallback channel");
            }
            self.outbox.send(Notification::Direct { to: user.clone(), content: welcome.clone(), fallback });
        }
        Ok(outcome)
    }

    // ===== Reads =====

    pub async fn member(&self, group: &GroupId, user: &UserId) -> ServiceResult<Member> {
        let key = MemberKey { group: group.clone(), user: user.clone() };
        self.finish("member", self.manager.member(&key))
    }

    pub async fn submission(&self, submission: SubmissionId) -> ServiceResult<Submission> {
        self.finish("submission", self.manager.submission(submission))
    }
}
