/*
    Metrics - Onboarding activity counters

    Provides counters and gauges for:
    - Lifecycle transitions (sessions started, submissions queued, decisions)
    - Refusals by kind, including rate-limit denials
    - Notification delivery and fallback

    Metrics can be exported via Prometheus or other backends.
*/

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    describe_counter!(
        "gatehouse_sessions_started_total",
        "Start requests that opened or resumed a session (started) or found one under review (pending)"
    );

    describe_counter!(
        "gatehouse_submissions_queued_total",
        "Submissions that entered the review queue, labeled by flagged (true, false)"
    );

    describe_counter!(
        "gatehouse_decisions_total",
        "Moderator decisions on submissions and appeals, labeled by item and action"
    );

    describe_counter!(
        "gatehouse_refusals_total",
        "Operations refused without a state change, labeled by kind"
    );

    describe_counter!(
        "gatehouse_rate_limit_denied_total",
        "Member commands denied by the sliding-window limiter, labeled by category"
    );

    describe_counter!(
        "gatehouse_notifications_total",
        "Notifications handed to the messenger, labeled by kind and result"
    );

    describe_counter!(
        "gatehouse_dm_fallbacks_total",
        "Direct messages redirected to a channel because the DM was undeliverable"
    );

    describe_gauge!(
        "gatehouse_member_locks",
        "Per-member locks currently held in the service registry"
    );
}

/// Record a session start
pub fn session_started(mode: &'static str) {
    counter!("gatehouse_sessions_started_total", "mode" => mode).increment(1);
}

/// Record a submission entering the review queue
pub fn submission_queued(flagged: bool) {
    let flagged = if flagged { "true" } else { "false" };
    counter!("gatehouse_submissions_queued_total", "flagged" => flagged).increment(1);
}

/// Record a moderator decision
pub fn decision_recorded(item: &'static str, action: &'static str) {
    counter!("gatehouse_decisions_total", "item" => item, "action" => action).increment(1);
}

/// Record a refusal
pub fn operation_refused(kind: &'static str) {
    counter!("gatehouse_refusals_total", "kind" => kind).increment(1);
}

/// Record a rate-limit denial
pub fn rate_limit_denied(category: &'static str) {
    counter!("gatehouse_rate_limit_denied_total", "category" => category).increment(1);
}

/// Record a notification handed to the messenger
pub fn notification_sent(kind: &'static str, result: &'static str) {
    counter!("gatehouse_notifications_total", "kind" => kind, "result" => result).increment(1);
}

pub fn dm_fallback_used() {
    counter!("gatehouse_dm_fallbacks_total").increment(1);
}

pub fn set_member_locks(count: usize) {
    gauge!("gatehouse_member_locks").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_compilation() {
        // No recorder installed; the calls are no-ops
        init_metrics();
        session_started("fresh");
        submission_queued(true);
        decision_recorded("application", "approve");
        operation_refused("not_eligible");
        rate_limit_denied("appeal");
        notification_sent("direct", "delivered");
        dm_fallback_used();
        set_member_locks(3);
    }
}
