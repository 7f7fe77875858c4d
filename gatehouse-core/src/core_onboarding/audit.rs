//! Append-only record of moderator and appeal actions

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{AppealId, GroupId, SubmissionId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Approve,
    Reject,
    Ban,
    Promote,
    Demote,
    Reset,
    StripRoles,
    AppealFiled,
    AppealApproved,
    AppealRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Approve => "APPROVE",
            AuditAction::Reject => "REJECT",
            AuditAction::Ban => "BAN",
            AuditAction::Promote => "PROMOTE",
            AuditAction::Demote => "DEMOTE",
            AuditAction::Reset => "RESET",
            AuditAction::StripRoles => "STRIP_ROLES",
            AuditAction::AppealFiled => "APPEAL_FILED",
            AuditAction::AppealApproved => "APPEAL_APPROVED",
            AuditAction::AppealRejected => "APPEAL_REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APPROVE" => Some(AuditAction::Approve),
            "REJECT" => Some(AuditAction::Reject),
            "BAN" => Some(AuditAction::Ban),
            "PROMOTE" => Some(AuditAction::Promote),
            "DEMOTE" => Some(AuditAction::Demote),
            "RESET" => Some(AuditAction::Reset),
            "STRIP_ROLES" => Some(AuditAction::StripRoles),
            "APPEAL_FILED" => Some(AuditAction::AppealFiled),
            "APPEAL_APPROVED" => Some(AuditAction::AppealApproved),
            "APPEAL_REJECTED" => Some(AuditAction::AppealRejected),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Row id; `None` until stored
    pub id: Option<i64>,
    pub group: GroupId,
    pub target: UserId,
    pub actor: UserId,
    pub action: AuditAction,
    pub submission: Option<SubmissionId>,
    pub appeal: Option<AppealId>,
    pub reason: Option<String>,
    pub banned: bool,
    pub created_at: Timestamp,
}

impl AuditEntry {
    pub fn new(group: &GroupId, target: &UserId, actor: &UserId, action: AuditAction, now: Timestamp) -> Self {
        Self {
            id: None,
            group: group.clone(),
            target: target.clone(),
            actor: actor.clone(),
            action,
            submission: None,
            appeal: None,
            reason: None,
            banned: false,
            created_at: now,
        }
    }

    pub fn submission(mut self, id: SubmissionId) -> Self {
        self.submission = Some(id);
        self
    }

    pub fn appeal(mut self, id: AppealId) -> Self {
        self.appeal = Some(id);
        self
    }

    pub fn reason(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(str::to_string);
        self
    }

    pub fn banned(mut self, banned: bool) -> Self {
        self.banned = banned;
        self
    }
}
