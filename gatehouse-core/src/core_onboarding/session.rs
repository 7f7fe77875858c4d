//! Application sessions and the submissions they produce
//!
//! The transition rules here are pure: they look at a member record and say
//! what may happen next. The manager applies them inside a store transaction.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::appeal::AppealStatus;
use super::errors::NotEligibleReason;
use super::member::{ApplicationStatus, Member, RoleTier};
use super::question_graph::{AnswerSet, AnswerValue, QuestionGraph, QuestionNode};
use super::types::{MemberKey, QuestionId, SubmissionId, Timestamp, UserId};

/// How the person came to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionKind {
    /// Walks the question graph
    Applicant,
    /// Vouched for by an existing member; goes straight to review
    Referral,
    /// No questionnaire; goes straight to review
    None,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Applicant => "APPLICANT",
            SubmissionKind::Referral => "REFERRAL",
            SubmissionKind::None => "NONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APPLICANT" => Some(SubmissionKind::Applicant),
            "REFERRAL" => Some(SubmissionKind::Referral),
            "NONE" => Some(SubmissionKind::None),
            _ => None,
        }
    }

    pub fn uses_graph(&self) -> bool {
        matches!(self, SubmissionKind::Applicant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    InProgress,
    Pending,
    Approved,
    Rejected,
    Abandoned,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::InProgress => "IN_PROGRESS",
            SubmissionStatus::Pending => "PENDING",
            SubmissionStatus::Approved => "APPROVED",
            SubmissionStatus::Rejected => "REJECTED",
            SubmissionStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(SubmissionStatus::InProgress),
            "PENDING" => Some(SubmissionStatus::Pending),
            "APPROVED" => Some(SubmissionStatus::Approved),
            "REJECTED" => Some(SubmissionStatus::Rejected),
            "ABANDONED" => Some(SubmissionStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Approved | SubmissionStatus::Rejected | SubmissionStatus::Abandoned
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question: QuestionId,
    pub value: AnswerValue,
    pub answered_at: Timestamp,
}

/// Reviewer's verdict recorded on a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDecision {
    pub reviewer: UserId,
    pub reason: Option<String>,
    pub granted_tier: Option<RoleTier>,
    pub reviewed_at: Timestamp,
}

/// Everything one application session collected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub member: MemberKey,
    pub kind: SubmissionKind,
    pub referral_note: Option<String>,
    pub status: SubmissionStatus,
    pub answers: Vec<Answer>,
    pub flagged: bool,
    pub flag_reason: Option<String>,
    pub created_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
    pub decision: Option<SubmissionDecision>,
}

impl Submission {
    pub fn answer_set(&self) -> AnswerSet {
        self.answers.iter().map(|a| (a.question.clone(), a.value.clone())).collect()
    }

    pub fn answer(&self, question: &QuestionId) -> Option<&Answer> {
        self.answers.iter().find(|a| &a.question == question)
    }

    /// Moment the submission entered the review queue
    pub fn enqueued_at(&self) -> Timestamp {
        self.submitted_at.unwrap_or(self.created_at)
    }
}

/// Flag bit and reason for a completed answer set
pub fn compute_flags(graph: &QuestionGraph, answers: &AnswerSet) -> (bool, Option<String>) {
    let reasons = graph.flag_reasons(answers);
    if reasons.is_empty() {
        (false, None)
    } else {
        (true, Some(reasons.join("\n")))
    }
}

/// What a start request resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Create a new submission
    Fresh,
    /// Continue the open submission
    Resume,
    /// Already submitted; report the pending submission
    AwaitingReview,
}

/// Decide whether `member` may start or resume an application
///
/// `appeal` is the status of the member's appeal, if one was ever filed.
pub fn check_start(
    member: &Member,
    appeal: Option<AppealStatus>,
    reapply_after_denied_appeal: bool,
) -> Result<StartMode, NotEligibleReason> {
    match member.status {
        ApplicationStatus::None => Ok(StartMode::Fresh),
        ApplicationStatus::InProgress => Ok(StartMode::Resume),
        ApplicationStatus::Pending => Ok(StartMode::AwaitingReview),
        ApplicationStatus::Approved => Err(NotEligibleReason::AlreadyApproved),
        ApplicationStatus::Rejected => match (member.appeal_used, appeal) {
            (true, Some(AppealStatus::Rejected)) if reapply_after_denied_appeal => {
                Ok(StartMode::Fresh)
            }
            (true, Some(AppealStatus::Pending)) => Err(NotEligibleReason::AppealPending),
            (appeal_used, _) => {
                Err(NotEligibleReason::ApplicationRejected { appeal_available: !appeal_used })
            }
        },
    }
}

/// Self-service reset is open to anyone still onboarding and to plain members
pub fn check_self_reset(member: &Member) -> Result<(), NotEligibleReason> {
    match member.status {
        ApplicationStatus::None => Err(NotEligibleReason::NotStarted),
        ApplicationStatus::InProgress | ApplicationStatus::Pending | ApplicationStatus::Rejected => {
            Ok(())
        }
        ApplicationStatus::Approved if member.role_tier <= RoleTier::LOWEST_GRANTED => Ok(()),
        ApplicationStatus::Approved => {
            Err(NotEligibleReason::ResetNotAllowed { tier: member.role_tier })
        }
    }
}

/// Where a session stands after a start, answer or completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStep {
    /// Ask this question next
    Question { submission: SubmissionId, question: QuestionNode },
    /// The session just completed and is queued for review
    Submitted(Submission),
    /// Already in the review queue; nothing changed
    AlreadyPending(Submission),
}

impl SessionStep {
    pub fn question(&self) -> Option<&QuestionNode> {
        match self {
            SessionStep::Question { question, .. } => Some(question),
            _ => None,
        }
    }

    pub fn submission(&self) -> Option<&Submission> {
        match self {
            SessionStep::Submitted(submission) | SessionStep::AlreadyPending(submission) => {
                Some(submission)
            }
            SessionStep::Question { .. } => None,
        }
    }
}
