//! Identifier and time types shared by the onboarding modules

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }
    };
}

string_id!(
    /// Gateway identifier of a group (guild, workspace, server)
    GroupId
);
string_id!(
    /// Gateway identifier of a person
    UserId
);
string_id!(
    /// Stable id of a question in a group's graph
    QuestionId
);
string_id!(
    /// Stable id of an option on a single-select question
    OptionId
);
string_id!(
    /// Gateway channel a message can be posted to
    ChannelRef
);
string_id!(
    /// Gateway role granted to members of a tier
    RoleRef
);

/// A person within one group; all member state is keyed by this pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberKey {
    pub group: GroupId,
    pub user: UserId,
}

impl MemberKey {
    pub fn new(group: impl Into<String>, user: impl Into<String>) -> Self {
        Self { group: GroupId::new(group), user: UserId::new(user) }
    }

    pub fn with_user(&self, user: &UserId) -> Self {
        Self { group: self.group.clone(), user: user.clone() }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.user)
    }
}

/// Row id of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub i64);

/// Row id of an appeal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppealId(pub i64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for AppealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time; a clock set before 1970 reads as the epoch
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_key_display() {
        let key = MemberKey::new("guild-1", "alice");
        assert_eq!(key.to_string(), "guild-1/alice");
        assert_eq!(key.with_user(&UserId::new("bob")), MemberKey::new("guild-1", "bob"));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&QuestionId::new("q1")).expect("serialize");
        assert_eq!(json, "\"q1\"");
        let json = serde_json::to_string(&SubmissionId(7)).expect("serialize");
        assert_eq!(json, "7");
    }

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
        assert!(a.as_millis() > 0);
    }
}
