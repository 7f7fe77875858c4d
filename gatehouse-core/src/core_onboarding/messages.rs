//! Text of the messages people and moderators receive

use std::fmt::Write;

use super::appeal::{Appeal, AppealStatus};
use super::member::{ProfileChange, RoleTier};
use super::notify::mention;
use super::question_graph::{AnswerValue, QuestionGraph};
use super::session::Submission;
use super::types::{GroupId, UserId};

/// Review-queue post for a newly submitted application
pub fn submission_queued(submission: &Submission, graph: Option<&QuestionGraph>) -> String {
    let mut text = format!(
        "New application from {} (submission {}, {})",
        mention(&submission.member.user),
        submission.id,
        submission.kind.as_str().to_lowercase()
    );

    if let Some(note) = &submission.referral_note {
        let _ = write!(text, "\nReferral note: {}", note);
    }

    for answer in &submission.answers {
        let (prompt, value) = match graph {
            Some(graph) => (
                graph
                    .question(&answer.question)
                    .map(|node| node.prompt.clone())
                    .unwrap_or_else(|| answer.question.to_string()),
                graph.describe_answer(&answer.question, &answer.value),
            ),
            None => {
                let value = match &answer.value {
                    AnswerValue::Text(text) => text.clone(),
                    AnswerValue::Choice(option) => option.to_string(),
                };
                (answer.question.to_string(), value)
            }
        };
        let _ = write!(text, "\n**{}**\n{}", prompt, value);
    }

    if let Some(reason) = &submission.flag_reason {
        let _ = write!(text, "\n⚠ Flagged:\n{}", reason);
    }
    text
}

pub fn approved(group: &GroupId, tier: RoleTier) -> String {
    format!(
        "Your application to {} has been approved! You now hold the {} tier. Welcome!",
        group, tier
    )
}

/// Public announcement; `{mention}` in the template becomes the person's mention
pub fn announcement(template: &str, user: &UserId) -> String {
    template.replace("{mention}", &mention(user))
}

pub fn rejected(group: &GroupId, reason: Option<&str>, appeal_available: bool) -> String {
    let mut text = format!("Your application to {} was not approved.", group);
    if let Some(reason) = reason {
        let _ = write!(text, "\nReason: {}", reason);
    }
    if appeal_available {
        text.push_str("\nYou may file one appeal with /appeal.");
    }
    text
}

pub fn tier_changed(group: &GroupId, previous: RoleTier, new: RoleTier) -> String {
    if new > previous {
        format!("You have been promoted to {} in {}.", new, group)
    } else {
        format!("Your tier in {} has been changed from {} to {}.", group, previous, new)
    }
}

pub fn reset_by_moderator(group: &GroupId, appeal_restored: bool) -> String {
    let mut text = format!(
        "A moderator reset your application in {}. Start a new one with /apply.",
        group
    );
    if appeal_restored {
        text.push_str(" Your appeal is available again.");
    }
    text
}

pub fn roles_stripped(group: &GroupId) -> String {
    format!(
        "A moderator removed your roles in {}. Start a new application with /apply.",
        group
    )
}

pub fn appeal_filed(appeal: &Appeal) -> String {
    format!(
        "Appeal {} from {}:\n{}",
        appeal.id,
        mention(&appeal.member.user),
        appeal.reason
    )
}

pub fn appeal_decided(appeal: &Appeal) -> String {
    let mut text = match appeal.status {
        AppealStatus::Approved => format!(
            "Your appeal in {} was approved. You may start a new application with /apply.",
            appeal.member.group
        ),
        _ => format!("Your appeal in {} was denied. This decision is final.", appeal.member.group),
    };
    if let Some(note) = &appeal.reviewer_note {
        let _ = write!(text, "\nNote: {}", note);
    }
    text
}

pub fn profile_changed(user: &UserId, changes: &[ProfileChange]) -> String {
    let mut text = format!("Profile change for {}:", mention(user));
    for change in changes {
        let _ = write!(text, "\n- {}", change);
    }
    text
}

/// Channel version of the welcome DM
pub fn welcome_fallback(user: &UserId, welcome: &str) -> String {
    format!("{} {}", mention(user), welcome)
}
