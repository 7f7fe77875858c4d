//! Outbound side effects: messages, role changes and bans
//!
//! Onboarding operations never talk to the messaging gateway directly. After
//! a transaction commits, the service pushes [`Notification`]s onto the
//! [`Outbox`]; a dispatcher task drains it through a [`Messenger`]. Delivery
//! failures are logged and never undo committed state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::member::ProfileSnapshot;
use super::types::{ChannelRef, MemberKey, RoleRef, UserId};

pub mod dispatcher;
pub mod recording;

pub use dispatcher::{deliver, spawn_dispatcher, DispatchResult, DispatchStats};
pub use recording::{Recorded, RecordingMessenger};

/// Render a person reference the gateway turns into a mention
pub fn mention(user: &UserId) -> String {
    format!("<@{}>", user)
}

/// Channel post used when a direct message cannot be delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback {
    pub channel: ChannelRef,
    pub content: String,
}

/// One requested side effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Direct { to: UserId, content: String, fallback: Option<Fallback> },
    Channel { channel: ChannelRef, content: String },
    GrantRole { member: MemberKey, role: RoleRef },
    RevokeRole { member: MemberKey, role: RoleRef },
    Ban { member: MemberKey, reason: Option<String> },
}

impl Notification {
    pub fn direct(to: &UserId, content: impl Into<String>) -> Self {
        Notification::Direct { to: to.clone(), content: content.into(), fallback: None }
    }

    pub fn channel(channel: ChannelRef, content: impl Into<String>) -> Self {
        Notification::Channel { channel, content: content.into() }
    }

    /// Label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Direct { .. } => "direct",
            Notification::Channel { .. } => "channel",
            Notification::GrantRole { .. } => "grant_role",
            Notification::RevokeRole { .. } => "revoke_role",
            Notification::Ban { .. } => "ban",
        }
    }
}

/// Outcome of a direct message the gateway accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The person does not accept direct messages
    Undeliverable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessengerError {
    #[error("{0} is unreachable")]
    Unreachable(String),

    #[error("gateway error: {0}")]
    Gateway(String),
}

/// Messaging gateway the core hands side effects to
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_direct_message(&self, to: &UserId, content: &str) -> Result<Delivery, MessengerError>;

    async fn send_channel_message(&self, channel: &ChannelRef, content: &str) -> Result<(), MessengerError>;

    async fn grant_role(&self, member: &MemberKey, role: &RoleRef) -> Result<(), MessengerError>;

    async fn revoke_role(&self, member: &MemberKey, role: &RoleRef) -> Result<(), MessengerError>;

    /// Current profile as the gateway sees it
    async fn read_profile_snapshot(&self, member: &MemberKey) -> Result<ProfileSnapshot, MessengerError>;

    async fn ban(&self, member: &MemberKey, reason: Option<&str>) -> Result<(), MessengerError>;
}

/// Sending half of the notification queue
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, notification: Notification) {
        trace!(kind = notification.kind(), "Queued notification");
        if let Err(err) = self.tx.send(notification) {
            warn!(kind = err.0.kind(), "Notification dropped, dispatcher is gone");
        }
    }

    pub fn send_all(&self, notifications: impl IntoIterator<Item = Notification>) {
        for notification in notifications {
            self.send(notification);
        }
    }
}
