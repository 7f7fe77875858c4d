//! Gateway events and the loop that routes them into the service

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

use super::errors::{NotEligibleReason, Outcome, Refusal, ServiceResult};
use super::member::ProfileSnapshot;
use super::notify::Messenger;
use super::service::OnboardingService;
use super::types::{ChannelRef, GroupId, MemberKey, UserId};
use crate::shutdown::ShutdownSignal;

/// Something that happened on the messaging gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    MemberJoined { group: GroupId, user: UserId, profile: Option<ProfileSnapshot> },
    MemberLeft { group: GroupId, user: UserId },
    /// `snapshot` is `None` when the gateway only says that something changed
    ProfileChanged { group: GroupId, user: UserId, snapshot: Option<ProfileSnapshot> },
    MessageReceived { group: GroupId, channel: ChannelRef, author: UserId, content: String },
}

#[async_trait]
pub trait EventSource: Send {
    /// Next event; `None` once the source is exhausted
    async fn next_event(&mut self) -> Option<GatewayEvent>;
}

/// Event source fed through an mpsc channel
#[derive(Debug)]
pub struct ChannelEventSource {
    rx: mpsc::Receiver<GatewayEvent>,
}

impl ChannelEventSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<GatewayEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_event(&mut self) -> Option<GatewayEvent> {
        self.rx.recv().await
    }
}

/// Counts reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventLoopStats {
    pub joined: usize,
    pub left: usize,
    pub profile_changes: usize,
    pub messages: usize,
    /// Events dropped because storage or the gateway failed
    pub failures: usize,
}

fn storage_ok<T>(stats: &mut EventLoopStats, event: &'static str, result: ServiceResult<T>) -> Option<Outcome<T>> {
    match result {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            error!(event, error = %err, "Event handling failed");
            stats.failures += 1;
            None
        }
    }
}

async fn handle_event(
    service: &OnboardingService,
    messenger: &dyn Messenger,
    event: GatewayEvent,
    stats: &mut EventLoopStats,
) {
    match event {
        GatewayEvent::MemberJoined { group, user, profile } => {
            stats.joined += 1;
            let result = service.welcome_member(&group, &user, profile.as_ref()).await;
            storage_ok(stats, "member_joined", result);
        }
        GatewayEvent::MemberLeft { group, user } => {
            stats.left += 1;
            let result = service.abandon_session(&group, &user).await;
            if let Some(Outcome::Refused(refusal)) = storage_ok(stats, "member_left", result) {
                match refusal {
                    Refusal::NotEligible(NotEligibleReason::NotStarted | NotEligibleReason::NoOpenSession) => {
                        trace!(group = %group, user = %user, "Departed member had no open session");
                    }
                    other => debug!(group = %group, user = %user, reason = %other, "Departure left state unchanged"),
                }
            }
        }
        GatewayEvent::ProfileChanged { group, user, snapshot } => {
            stats.profile_changes += 1;
            let snapshot = match snapshot {
                Some(snapshot) => snapshot,
                None => {
                    let key = MemberKey { group: group.clone(), user: user.clone() };
                    match messenger.read_profile_snapshot(&key).await {
                        Ok(snapshot) => snapshot,
                        Err(err) => {
                            warn!(member = %key, error = %err, "Could not read profile snapshot");
                            stats.failures += 1;
                            return;
                        }
                    }
                }
            };
            let result = service.record_profile(&group, &user, &snapshot).await;
            storage_ok(stats, "profile_changed", result);
        }
        GatewayEvent::MessageReceived { group, channel, author, content } => {
            stats.messages += 1;
            trace!(group = %group, channel = %channel, author = %author, length = content.len(), "Message received");
        }
    }
}

/// Route events until the source is exhausted or a shutdown signal arrives
pub async fn run_event_loop(
    service: &OnboardingService,
    source: &mut dyn EventSource,
    messenger: &dyn Messenger,
    mut shutdown: broadcast::Receiver<ShutdownSignal>,
) -> EventLoopStats {
    let mut stats = EventLoopStats::default();
    info!("Event loop started");

    loop {
        tokio::select! {
            biased;

            signal = shutdown.recv() => {
                match signal {
                    Ok(signal) => info!(signal = ?signal, "Event loop received shutdown signal"),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Event loop missed shutdown signals, stopping");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Shutdown channel closed, stopping event loop");
                    }
                }
                break;
            }
            event = source.next_event() => match event {
                Some(event) => handle_event(service, messenger, event, &mut stats).await,
                None => {
                    debug!("Event source exhausted");
                    break;
                }
            },
        }
    }

    info!(
        joined = stats.joined,
        left = stats.left,
        profile_changes = stats.profile_changes,
        messages = stats.messages,
        failures = stats.failures,
        "Event loop stopped"
    );
    stats
}
