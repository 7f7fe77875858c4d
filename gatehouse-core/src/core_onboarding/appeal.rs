//! Appeals against a rejected application
//!
//! A member gets exactly one appeal. Filing it spends the right immediately,
//! whatever the outcome; the member record carries that as `appeal_used`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{NotEligibleReason, Refusal};
use super::member::{ApplicationStatus, Member};
use super::types::{AppealId, MemberKey, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "PENDING",
            AppealStatus::Approved => "APPROVED",
            AppealStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AppealStatus::Pending),
            "APPROVED" => Some(AppealStatus::Approved),
            "REJECTED" => Some(AppealStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderator verdict on an appeal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppealOutcome {
    /// Reopen onboarding for a fresh application
    Approve { note: Option<String> },
    /// Final; no further appeal path
    Reject { note: Option<String> },
}

impl AppealOutcome {
    pub fn status(&self) -> AppealStatus {
        match self {
            AppealOutcome::Approve { .. } => AppealStatus::Approved,
            AppealOutcome::Reject { .. } => AppealStatus::Rejected,
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            AppealOutcome::Approve { note } | AppealOutcome::Reject { note } => note.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appeal {
    pub id: AppealId,
    pub member: MemberKey,
    pub reason: String,
    pub status: AppealStatus,
    pub created_at: Timestamp,
    pub reviewer: Option<UserId>,
    pub reviewer_note: Option<String>,
    pub reviewed_at: Option<Timestamp>,
}

/// Normalize an appeal reason: trimmed, non-empty, at most `max_len` characters
pub fn validate_reason(reason: &str, max_len: usize) -> Result<String, Refusal> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Refusal::Validation("appeal reason is empty".to_string()));
    }
    let length = reason.chars().count();
    if length > max_len {
        return Err(Refusal::Validation(format!(
            "appeal reason is {} characters, the limit is {}",
            length, max_len
        )));
    }
    Ok(reason.to_string())
}

/// Only a rejected member who never appealed may file
pub fn check_can_appeal(member: &Member) -> Result<(), NotEligibleReason> {
    if member.status != ApplicationStatus::Rejected {
        return Err(NotEligibleReason::NotRejected);
    }
    if member.appeal_used {
        return Err(NotEligibleReason::AppealAlreadyUsed);
    }
    Ok(())
}
