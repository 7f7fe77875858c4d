//! In-memory [`Messenger`] that records what it was asked to do
//!
//! Used by tests and by dry runs; nothing leaves the process.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{Delivery, Messenger, MessengerError};
use crate::core_onboarding::member::ProfileSnapshot;
use crate::core_onboarding::types::{ChannelRef, MemberKey, RoleRef, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Direct { to: UserId, content: String },
    Channel { channel: ChannelRef, content: String },
    GrantRole { member: MemberKey, role: RoleRef },
    RevokeRole { member: MemberKey, role: RoleRef },
    Ban { member: MemberKey, reason: Option<String> },
}

#[derive(Debug, Default)]
struct State {
    records: Vec<Recorded>,
    no_dm: HashSet<UserId>,
    profiles: HashMap<MemberKey, ProfileSnapshot>,
    fail_roles: bool,
}

#[derive(Debug, Default)]
pub struct RecordingMessenger {
    state: Mutex<State>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Direct messages to `user` come back undeliverable
    pub fn refuse_direct_messages(&self, user: &UserId) {
        self.state().no_dm.insert(user.clone());
    }

    /// Role grants and revocations fail with a gateway error
    pub fn fail_role_changes(&self) {
        self.state().fail_roles = true;
    }

    pub fn set_profile(&self, member: &MemberKey, profile: ProfileSnapshot) {
        self.state().profiles.insert(member.clone(), profile);
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.state().records.clone()
    }

    pub fn direct_messages_to(&self, user: &UserId) -> Vec<String> {
        self.state()
            .records
            .iter()
            .filter_map(|record| match record {
                Recorded::Direct { to, content } if to == user => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn channel_messages(&self, channel: &ChannelRef) -> Vec<String> {
        self.state()
            .records
            .iter()
            .filter_map(|record| match record {
                Recorded::Channel { channel: c, content } if c == channel => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, record: Recorded) {
        self.state().records.push(record);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_direct_message(&self, to: &UserId, content: &str) -> Result<Delivery, MessengerError> {
        if self.state().no_dm.contains(to) {
            return Ok(Delivery::Undeliverable);
        }
        self.push(Recorded::Direct { to: to.clone(), content: content.to_string() });
        Ok(Delivery::Delivered)
    }

    async fn send_channel_message(&self, channel: &ChannelRef, content: &str) -> Result<(), MessengerError> {
        self.push(Recorded::Channel { channel: channel.clone(), content: content.to_string() });
        Ok(())
    }

    async fn grant_role(&self, member: &MemberKey, role: &RoleRef) -> Result<(), MessengerError> {
        if self.state().fail_roles {
            return Err(MessengerError::Gateway(format!("cannot grant {}", role)));
        }
        self.push(Recorded::GrantRole { member: member.clone(), role: role.clone() });
        Ok(())
    }

    async fn revoke_role(&self, member: &MemberKey, role: &RoleRef) -> Result<(), MessengerError> {
        if self.state().fail_roles {
            return Err(MessengerError::Gateway(format!("cannot revoke {}", role)));
        }
        self.push(Recorded::RevokeRole { member: member.clone(), role: role.clone() });
        Ok(())
    }

    async fn read_profile_snapshot(&self, member: &MemberKey) -> Result<ProfileSnapshot, MessengerError> {
        self.state()
            .profiles
            .get(member)
            .cloned()
            .ok_or_else(|| MessengerError::Unreachable(member.to_string()))
    }

    async fn ban(&self, member: &MemberKey, reason: Option<&str>) -> Result<(), MessengerError> {
        self.push(Recorded::Ban { member: member.clone(), reason: reason.map(str::to_string) });
        Ok(())
    }
}
