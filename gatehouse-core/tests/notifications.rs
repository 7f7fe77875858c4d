/*
    Welcome flow, DM fallback, profile change alerts and delivery failures
*/

mod common;

use std::sync::Arc;

use common::{done, group, settings, user, Harness, BRANCHING_GRAPH, MOD_QUEUE, WELCOME};
use gatehouse_core::config::{FeatureManager, RateLimitConfig};
use gatehouse_core::core_onboarding::notify::{spawn_dispatcher, DispatchResult, Messenger};
use gatehouse_core::core_onboarding::{
    ApplicationStatus, ChannelRef, GraphRegistry, OnboardingService, Outbox, ProfileField, ProfileSnapshot,
    QuestionGraph, RecordingMessenger, ReviewOutcome, RoleTier, SqlStore,
};

fn profile(name: &str, avatar: &str) -> ProfileSnapshot {
    ProfileSnapshot {
        display_name: Some(name.to_string()),
        avatar_ref: Some(avatar.to_string()),
        nickname: None,
    }
}

#[tokio::test]
async fn test_welcome_sends_direct_message() {
    let mut h = Harness::new();
    let alice = user("alice");

    let member = done(h.service.welcome_member(&group(), &alice, Some(&profile("Alice", "a1"))).await);
    assert_eq!(member.status, ApplicationStatus::None);
    assert_eq!(member.profile, profile("Alice", "a1"));

    assert_eq!(h.flush().await, vec![DispatchResult::Delivered]);
    let dms = h.messenger.direct_messages_to(&alice);
    assert_eq!(dms.len(), 1);
    assert!(dms[0].contains("/apply"));
}

#[tokio::test]
async fn test_undeliverable_welcome_falls_back_to_channel() {
    let mut h = Harness::new();
    let bob = user("bob");
    h.messenger.refuse_direct_messages(&bob);

    done(h.service.welcome_member(&group(), &bob, None).await);

    assert_eq!(h.flush().await, vec![DispatchResult::FellBack]);
    let posts = h.messenger.channel_messages(&ChannelRef::new(WELCOME));
    assert_eq!(posts.len(), 1);
    assert!(posts[0].starts_with("<@bob> "));
}

#[tokio::test]
async fn test_fallback_disabled_leaves_welcome_undelivered() {
    let mut h = Harness::new();
    h.features.disable("dm_fallback");
    let cara = user("cara");
    h.messenger.refuse_direct_messages(&cara);

    done(h.service.welcome_member(&group(), &cara, None).await);

    assert_eq!(h.flush().await, vec![DispatchResult::Undeliverable]);
    assert!(h.messenger.channel_messages(&ChannelRef::new(WELCOME)).is_empty());
}

#[tokio::test]
async fn test_profile_changes_alert_moderators() {
    let mut h = Harness::new();
    let dan = user("dan");

    // First snapshot is only a baseline
    let baseline = done(h.service.record_profile(&group(), &dan, &profile("Dan", "a1")).await);
    assert!(baseline.is_empty());

    let changes = done(h.service.record_profile(&group(), &dan, &profile("Daniel", "a2")).await);
    let fields: Vec<_> = changes.iter().map(|change| change.field).collect();
    assert_eq!(fields, vec![ProfileField::Avatar, ProfileField::DisplayName]);

    let unchanged = done(h.service.record_profile(&group(), &dan, &profile("Daniel", "a2")).await);
    assert!(unchanged.is_empty());

    h.flush().await;
    let posts = h.messenger.channel_messages(&ChannelRef::new(MOD_QUEUE));
    assert_eq!(posts, vec!["Profile change for <@dan>:\n- avatar: a1 -> a2\n- display name: Dan -> Daniel".to_string()]);
}

#[tokio::test]
async fn test_profile_alerts_can_be_disabled() {
    let mut h = Harness::new();
    h.features.disable("profile_change_alerts");
    let eve = user("eve");

    done(h.service.welcome_member(&group(), &eve, Some(&profile("Eve", "a1"))).await);
    let changes = done(h.service.record_profile(&group(), &eve, &profile("Eve", "a9")).await);
    assert_eq!(changes.len(), 1);

    h.flush().await;
    assert!(h.messenger.channel_messages(&ChannelRef::new(MOD_QUEUE)).is_empty());
}

#[tokio::test]
async fn test_failed_role_grant_keeps_the_decision() {
    let mut h = Harness::new();
    let moderator = h.moderator().await;
    h.messenger.fail_role_changes();

    let submission = h.submit_application("finn", "b").await;
    done(h.service.decide(submission.id, &moderator, ReviewOutcome::Approve { tier: RoleTier::Member }).await);

    let results = h.flush().await;
    assert!(results.iter().any(|result| matches!(result, DispatchResult::Failed(_))));

    let member = done(h.service.member(&group(), &user("finn")).await);
    assert_eq!(member.status, ApplicationStatus::Approved);
    assert_eq!(member.role_tier, RoleTier::Member);
}

#[tokio::test]
async fn test_background_dispatcher_drains_outbox() {
    let messenger = Arc::new(RecordingMessenger::new());
    let (outbox, rx) = Outbox::channel();
    let dispatcher = spawn_dispatcher(messenger.clone() as Arc<dyn Messenger>, rx);

    let graphs = GraphRegistry::new()
        .with_graph(common::GROUP, QuestionGraph::from_toml_str(BRANCHING_GRAPH).expect("valid graph"));
    let service = OnboardingService::new(
        SqlStore::memory().expect("in-memory store"),
        graphs,
        settings(),
        RateLimitConfig::default(),
        FeatureManager::new(),
        outbox,
    );

    done(service.welcome_member(&group(), &user("gail"), None).await);
    done(service.welcome_member(&group(), &user("hugo"), None).await);
    drop(service);

    let stats = dispatcher.await.expect("dispatcher task");
    assert_eq!(stats.delivered, 2);
    assert_eq!(messenger.direct_messages_to(&user("gail")).len(), 1);
    assert_eq!(messenger.direct_messages_to(&user("hugo")).len(), 1);
}
