//! Background delivery of queued notifications

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Delivery, Messenger, MessengerError, Notification};
use crate::core_onboarding::metrics;

/// What happened to one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Delivered,
    /// The DM bounced and the fallback channel post went out instead
    FellBack,
    /// The DM bounced and there was no fallback
    Undeliverable,
    Failed(MessengerError),
}

/// Totals reported when the dispatcher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub fell_back: usize,
    pub undeliverable: usize,
    pub failed: usize,
}

impl DispatchStats {
    fn record(&mut self, result: &DispatchResult) {
        match result {
            DispatchResult::Delivered => self.delivered += 1,
            DispatchResult::FellBack => self.fell_back += 1,
            DispatchResult::Undeliverable => self.undeliverable += 1,
            DispatchResult::Failed(_) => self.failed += 1,
        }
    }
}

/// Hand one notification to the messenger
pub async fn deliver(messenger: &dyn Messenger, notification: Notification) -> DispatchResult {
    let kind = notification.kind();
    let result = match notification {
        Notification::Direct { to, content, fallback } => {
            match messenger.send_direct_message(&to, &content).await {
                Ok(Delivery::Delivered) => DispatchResult::Delivered,
                Ok(Delivery::Undeliverable) => match fallback {
                    Some(fallback) => {
                        debug!(user = %to, channel = %fallback.channel, "DM undeliverable, posting to channel");
                        match messenger.send_channel_message(&fallback.channel, &fallback.content).await {
                            Ok(()) => {
                                metrics::dm_fallback_used();
                                DispatchResult::FellBack
                            }
                            Err(err) => DispatchResult::Failed(err),
                        }
                    }
                    None => DispatchResult::Undeliverable,
                },
                Err(err) => DispatchResult::Failed(err),
            }
        }
        Notification::Channel { channel, content } => {
            to_result(messenger.send_channel_message(&channel, &content).await)
        }
        Notification::GrantRole { member, role } => to_result(messenger.grant_role(&member, &role).await),
        Notification::RevokeRole { member, role } => to_result(messenger.revoke_role(&member, &role).await),
        Notification::Ban { member, reason } => to_result(messenger.ban(&member, reason.as_deref()).await),
    };

    match &result {
        DispatchResult::Delivered => metrics::notification_sent(kind, "delivered"),
        DispatchResult::FellBack => metrics::notification_sent(kind, "fell_back"),
        DispatchResult::Undeliverable => {
            warn!(kind, "Direct message undeliverable and no fallback channel configured");
            metrics::notification_sent(kind, "undeliverable");
        }
        DispatchResult::Failed(err) => {
            warn!(kind, error = %err, "Notification delivery failed");
            metrics::notification_sent(kind, "failed");
        }
    }
    result
}

fn to_result(result: Result<(), MessengerError>) -> DispatchResult {
    match result {
        Ok(()) => DispatchResult::Delivered,
        Err(err) => DispatchResult::Failed(err),
    }
}

/// Drain `rx` until every [`super::Outbox`] is dropped
pub fn spawn_dispatcher(
    messenger: Arc<dyn Messenger>,
    mut rx: mpsc::UnboundedReceiver<Notification>,
) -> JoinHandle<DispatchStats> {
    tokio::spawn(async move {
        let mut stats = DispatchStats::default();
        while let Some(notification) = rx.recv().await {
            let result = deliver(messenger.as_ref(), notification).await;
            stats.record(&result);
        }
        info!(
            delivered = stats.delivered,
            fell_back = stats.fell_back,
            undeliverable = stats.undeliverable,
            failed = stats.failed,
            "Notification dispatcher stopped"
        );
        stats
    })
}
