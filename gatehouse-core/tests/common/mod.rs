/*
    Shared fixtures for the onboarding integration tests

    A service over an in-memory store, a recording messenger, and a
    two-question branching graph: q1 (a, b, refuse) with q2 asked only
    after q1 = a.
*/

#![allow(dead_code)]

use std::fmt::Debug;
use std::sync::Arc;

use gatehouse_core::config::{ChannelRefs, FeatureManager, OnboardingConfig, RateLimitConfig, RoleRefs};
use gatehouse_core::core_onboarding::notify::{deliver, DispatchResult};
use gatehouse_core::core_onboarding::{
    AnswerValue, GraphRegistry, GroupId, Notification, OnboardingService, Outbox, Outcome, QuestionGraph,
    QuestionId, RecordingMessenger, Refusal, RoleTier, ServiceResult, SessionStep, SqlStore, Submission,
    SubmissionKind, UserId,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const GROUP: &str = "guild";
pub const MOD_QUEUE: &str = "mod-queue";
pub const ANNOUNCEMENTS: &str = "announcements";
pub const WELCOME: &str = "welcome";

pub const BRANCHING_GRAPH: &str = r#"
[[question]]
id = "q1"
prompt = "How did you find us?"
kind = "single_select"
options = [
    { id = "a", label = "Through a friend" },
    { id = "b", label = "Search" },
    { id = "refuse", label = "I do not accept the rules", immediate_reject = true },
]

[[question]]
id = "q2"
prompt = "Who invited you?"
kind = "free_text"
parent = { question = "q1", option = "a" }
"#;

pub fn group() -> GroupId {
    GroupId::new(GROUP)
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub fn question(id: &str) -> QuestionId {
    QuestionId::new(id)
}

pub fn settings() -> OnboardingConfig {
    OnboardingConfig {
        roles: RoleRefs {
            applicant: None,
            member: Some("role-member".to_string()),
            trusted: Some("role-trusted".to_string()),
            moderator: Some("role-moderator".to_string()),
            leader: Some("role-leader".to_string()),
        },
        channels: ChannelRefs {
            moderator_queue: Some(MOD_QUEUE.to_string()),
            announcements: Some(ANNOUNCEMENTS.to_string()),
            welcome: Some(WELCOME.to_string()),
        },
        ..OnboardingConfig::default()
    }
}

/// Unwrap a completed operation
pub fn done<T: Debug>(result: ServiceResult<T>) -> T {
    match result.expect("storage should be available") {
        Outcome::Done(value) => value,
        Outcome::Refused(refusal) => panic!("expected success, got refusal: {}", refusal),
    }
}

/// Unwrap a refused operation
pub fn refused<T: Debug>(result: ServiceResult<T>) -> Refusal {
    match result.expect("storage should be available") {
        Outcome::Refused(refusal) => refusal,
        Outcome::Done(value) => panic!("expected a refusal, got {:?}", value),
    }
}

pub struct Harness {
    pub service: OnboardingService,
    pub messenger: Arc<RecordingMessenger>,
    pub features: FeatureManager,
    rx: UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(SqlStore::memory().expect("in-memory store"))
    }

    pub fn with_store(store: SqlStore) -> Self {
        Self::build(store, RateLimitConfig::default())
    }

    pub fn with_rate_limits(rate_limits: RateLimitConfig) -> Self {
        Self::build(SqlStore::memory().expect("in-memory store"), rate_limits)
    }

    fn build(store: SqlStore, rate_limits: RateLimitConfig) -> Self {
        let graph = QuestionGraph::from_toml_str(BRANCHING_GRAPH).expect("valid graph");
        let graphs = GraphRegistry::new().with_graph(GROUP, graph);
        let features = FeatureManager::new();
        let (outbox, rx) = Outbox::channel();
        let service = OnboardingService::new(store, graphs, settings(), rate_limits, features.clone(), outbox);
        Self { service, messenger: Arc::new(RecordingMessenger::new()), features, rx }
    }

    /// Deliver every queued notification to the recording messenger
    pub async fn flush(&mut self) -> Vec<DispatchResult> {
        let mut results = Vec::new();
        while let Ok(notification) = self.rx.try_recv() {
            results.push(deliver(self.messenger.as_ref(), notification).await);
        }
        results
    }

    /// Seed a reviewer with authority at `tier`
    pub async fn staff(&self, id: &str, tier: RoleTier) -> UserId {
        let staff = user(id);
        done(self.service.register_staff(&group(), &staff, tier).await);
        staff
    }

    pub async fn moderator(&self) -> UserId {
        self.staff("mod", RoleTier::Moderator).await
    }

    /// Start an application and answer q1 with `choice`, which completes it for b and refuse
    pub async fn submit_application(&self, id: &str, choice: &str) -> Submission {
        let applicant = user(id);
        let first = done(
            self.service.start_or_resume_session(&group(), &applicant, SubmissionKind::Applicant, None).await,
        );
        assert_eq!(first.question().map(|q| q.id.as_str()), Some("q1"));

        let step = done(
            self.service.submit_answer(&group(), &applicant, &question("q1"), AnswerValue::choice(choice)).await,
        );
        match step {
            SessionStep::Submitted(submission) => submission,
            other => panic!("expected the session to complete, got {:?}", other),
        }
    }
}
