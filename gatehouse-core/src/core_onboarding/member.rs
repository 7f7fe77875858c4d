//! Member records: application status, role tier and profile snapshot

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{MemberKey, Timestamp};

/// Where a person stands in onboarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    /// Known to the group, never started (or abandoned) an application
    None,
    /// Answering questions
    InProgress,
    /// Submitted, waiting for a moderator
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::None => "NONE",
            ApplicationStatus::InProgress => "IN_PROGRESS",
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(ApplicationStatus::None),
            "IN_PROGRESS" => Some(ApplicationStatus::InProgress),
            "PENDING" => Some(ApplicationStatus::Pending),
            "APPROVED" => Some(ApplicationStatus::Approved),
            "REJECTED" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered role hierarchy; comparisons follow declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleTier {
    Applicant,
    Member,
    Trusted,
    Moderator,
    Leader,
}

impl RoleTier {
    pub const ALL: [RoleTier; 5] = [
        RoleTier::Applicant,
        RoleTier::Member,
        RoleTier::Trusted,
        RoleTier::Moderator,
        RoleTier::Leader,
    ];

    /// Lowest tier an approved person can hold
    pub const LOWEST_GRANTED: RoleTier = RoleTier::Member;

    pub fn level(&self) -> u8 {
        match self {
            RoleTier::Applicant => 0,
            RoleTier::Member => 1,
            RoleTier::Trusted => 2,
            RoleTier::Moderator => 3,
            RoleTier::Leader => 4,
        }
    }

    pub fn from_level(level: i64) -> Option<Self> {
        RoleTier::ALL.iter().copied().find(|tier| i64::from(tier.level()) == level)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleTier::Applicant => "applicant",
            RoleTier::Member => "member",
            RoleTier::Trusted => "trusted",
            RoleTier::Moderator => "moderator",
            RoleTier::Leader => "leader",
        }
    }
}

impl FromStr for RoleTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        RoleTier::ALL
            .iter()
            .copied()
            .find(|tier| tier.as_str() == wanted)
            .ok_or_else(|| format!("unknown role tier '{}'", s))
    }
}

impl fmt::Display for RoleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observed profile of a person, used for change alerts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub nickname: Option<String>,
}

impl ProfileSnapshot {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.avatar_ref.is_none() && self.nickname.is_none()
    }

    /// Fields that differ between `self` (older) and `newer`
    ///
    /// Setting a nickname for the first time is not reported.
    pub fn diff(&self, newer: &ProfileSnapshot) -> Vec<ProfileChange> {
        let mut changes = Vec::new();

        if self.avatar_ref != newer.avatar_ref {
            changes.push(ProfileChange::new(ProfileField::Avatar, &self.avatar_ref, &newer.avatar_ref));
        }
        if self.display_name != newer.display_name {
            changes.push(ProfileChange::new(
                ProfileField::DisplayName,
                &self.display_name,
                &newer.display_name,
            ));
        }
        if self.nickname.is_some() && self.nickname != newer.nickname {
            changes.push(ProfileChange::new(ProfileField::Nickname, &self.nickname, &newer.nickname));
        }

        changes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Avatar,
    DisplayName,
    Nickname,
}

impl ProfileField {
    pub fn label(&self) -> &'static str {
        match self {
            ProfileField::Avatar => "avatar",
            ProfileField::DisplayName => "display name",
            ProfileField::Nickname => "nickname",
        }
    }
}

/// One changed profile field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChange {
    pub field: ProfileField,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl ProfileChange {
    fn new(field: ProfileField, old: &Option<String>, new: &Option<String>) -> Self {
        Self { field, old: old.clone(), new: new.clone() }
    }
}

impl fmt::Display for ProfileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.field.label(),
            self.old.as_deref().unwrap_or("(none)"),
            self.new.as_deref().unwrap_or("(none)")
        )
    }
}

/// One person in one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub key: MemberKey,
    pub status: ApplicationStatus,
    pub role_tier: RoleTier,
    /// Set when an appeal is filed; never cleared by a plain reset
    pub appeal_used: bool,
    pub profile: ProfileSnapshot,
    pub joined_at: Timestamp,
    pub approved_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Member {
    /// A newly seen person: no application, no role
    pub fn new(key: MemberKey, now: Timestamp) -> Self {
        Self {
            key,
            status: ApplicationStatus::None,
            role_tier: RoleTier::Applicant,
            appeal_used: false,
            profile: ProfileSnapshot::default(),
            joined_at: now,
            approved_at: None,
            updated_at: now,
        }
    }

    /// Clear role and application state, ready for a fresh questionnaire
    pub fn reset_onboarding(&mut self, now: Timestamp) {
        self.status = ApplicationStatus::InProgress;
        self.role_tier = RoleTier::Applicant;
        self.approved_at = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: Option<&str>, avatar: Option<&str>, nick: Option<&str>) -> ProfileSnapshot {
        ProfileSnapshot {
            display_name: name.map(String::from),
            avatar_ref: avatar.map(String::from),
            nickname: nick.map(String::from),
        }
    }

    #[test]
    fn test_tier_ordering() {
        assert!(RoleTier::Applicant < RoleTier::Member);
        assert!(RoleTier::Member < RoleTier::Trusted);
        assert!(RoleTier::Trusted < RoleTier::Moderator);
        assert!(RoleTier::Moderator < RoleTier::Leader);
        for tier in RoleTier::ALL {
            assert_eq!(RoleTier::from_level(i64::from(tier.level())), Some(tier));
            assert_eq!(tier.as_str().parse::<RoleTier>(), Ok(tier));
        }
        assert_eq!(RoleTier::from_level(9), None);
        assert!("admiral".parse::<RoleTier>().is_err());
    }

    #[test]
    fn test_status_strings() {
        for status in [
            ApplicationStatus::None,
            ApplicationStatus::InProgress,
            ApplicationStatus::Pending,
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
        ] {
            assert_eq!(ApplicationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ApplicationStatus::parse("in_progress"), None);
    }

    #[test]
    fn test_profile_diff_reports_each_field() {
        let before = snapshot(Some("Alice"), Some("a1"), Some("Al"));
        let after = snapshot(Some("Alicia"), Some("a2"), Some("Ally"));

        let fields: Vec<ProfileField> = before.diff(&after).into_iter().map(|c| c.field).collect();
        assert_eq!(fields, vec![ProfileField::Avatar, ProfileField::DisplayName, ProfileField::Nickname]);
    }

    #[test]
    fn test_first_nickname_is_not_reported() {
        let before = snapshot(Some("Alice"), Some("a1"), None);
        let after = snapshot(Some("Alice"), Some("a1"), Some("Al"));
        assert!(before.diff(&after).is_empty());

        // Clearing a nickname is reported
        let cleared = snapshot(Some("Alice"), Some("a1"), None);
        let changes = after.diff(&cleared);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to_string(), "nickname: Al -> (none)");
    }

    #[test]
    fn test_reset_onboarding_clears_role() {
        let mut member = Member::new(MemberKey::new("g", "u"), Timestamp(1));
        member.status = ApplicationStatus::Approved;
        member.role_tier = RoleTier::Member;
        member.approved_at = Some(Timestamp(2));
        member.appeal_used = true;

        member.reset_onboarding(Timestamp(3));
        assert_eq!(member.status, ApplicationStatus::InProgress);
        assert_eq!(member.role_tier, RoleTier::Applicant);
        assert_eq!(member.approved_at, None);
        assert!(member.appeal_used);
        assert_eq!(member.updated_at, Timestamp(3));
    }
}
