//! Walk one applicant through rejection, appeal and approval
//!
//! Run with:
//! ```bash
//! cargo run --example onboarding_walkthrough
//! ```

use std::sync::Arc;

use gatehouse_core::config::{Config, FeatureManager};
use gatehouse_core::core_onboarding::notify::{spawn_dispatcher, Messenger};
use gatehouse_core::core_onboarding::{
    AnswerValue, AppealOutcome, GraphRegistry, GroupId, OnboardingService, Outbox, QuestionGraph, QuestionId,
    RecordingMessenger, ReviewOutcome, RoleTier, SqlStore, SubmissionKind, UserId,
};
use gatehouse_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use tracing::info;

const GRAPH: &str = r#"
[[question]]
id = "source"
prompt = "How did you find us?"
kind = "single_select"
options = [
    { id = "friend", label = "A friend invited me" },
    { id = "search", label = "Search" },
]

[[question]]
id = "friend_name"
prompt = "Who invited you?"
kind = "free_text"
parent = { question = "source", option = "friend" }
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_with_config(LogConfig::new(LogLevel::Debug).with_target(false))?;

    let mut config = Config::default();
    config.onboarding.channels.moderator_queue = Some("mod-queue".to_string());
    config.onboarding.roles.member = Some("member-role".to_string());

    let messenger = Arc::new(RecordingMessenger::new());
    let (outbox, rx) = Outbox::channel();
    let dispatcher = spawn_dispatcher(messenger.clone() as Arc<dyn Messenger>, rx);

    let graphs = GraphRegistry::new().with_graph("guild", QuestionGraph::from_toml_str(GRAPH)?);
    let service = OnboardingService::new(
        SqlStore::memory()?,
        graphs,
        config.onboarding.clone(),
        config.rate_limit.clone(),
        FeatureManager::with_flags(config.features.clone()),
        outbox,
    );

    let group = GroupId::new("guild");
    let applicant = UserId::new("alice");
    let moderator = UserId::new("mod");
    service.register_staff(&group, &moderator, RoleTier::Moderator).await?;

    service.start_or_resume_session(&group, &applicant, SubmissionKind::Applicant, None).await?;
    service
        .submit_answer(&group, &applicant, &QuestionId::new("source"), AnswerValue::choice("friend"))
        .await?;
    let step = service
        .submit_answer(&group, &applicant, &QuestionId::new("friend_name"), AnswerValue::text("Bob"))
        .await?
        .into_result()?;

    if let Some(submission) = step.submission() {
        let rejected = ReviewOutcome::Reject { reason: Some("Bob is not a member".to_string()), ban: false };
        service.decide(submission.id, &moderator, rejected).await?.into_result()?;
    }

    let appeal = service.file_appeal(&group, &applicant, "Bob joined last week").await?.into_result()?;
    service
        .decide_appeal(appeal.id, &moderator, AppealOutcome::Approve { note: Some("confirmed".to_string()) })
        .await?
        .into_result()?;

    service.start_or_resume_session(&group, &applicant, SubmissionKind::Applicant, None).await?;
    let step = service
        .submit_answer(&group, &applicant, &QuestionId::new("source"), AnswerValue::choice("search"))
        .await?
        .into_result()?;
    if let Some(submission) = step.submission() {
        service
            .decide(submission.id, &moderator, ReviewOutcome::Approve { tier: RoleTier::Member })
            .await?
            .into_result()?;
    }

    let member = service.member(&group, &applicant).await?.into_result()?;
    info!(status = %member.status, tier = %member.role_tier, appeal_used = member.appeal_used, "Final member state");

    drop(service);
    let stats = dispatcher.await?;
    info!(delivered = stats.delivered, records = messenger.records().len(), "Notifications delivered");
    Ok(())
}
