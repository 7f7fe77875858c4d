/*
    File-backed store: state survives reopening, migrations are
    idempotent, and graphs load from the paths in a config file.
*/

mod common;

use std::time::Duration;

use common::{done, group, user, Harness, BRANCHING_GRAPH};
use gatehouse_core::config::Config;
use gatehouse_core::core_onboarding::storage::CURRENT_SCHEMA_VERSION;
use gatehouse_core::core_onboarding::{
    ApplicationStatus, AuditAction, GraphRegistry, GroupId, ReviewOutcome, RoleTier, SqlStore,
};
use gatehouse_core::ConfigError;
use tempfile::tempdir;

#[tokio::test]
async fn test_state_survives_reopening_the_database() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("data").join("gatehouse.db");

    let submission_id = {
        let store = SqlStore::open_path(&path, 2, Duration::from_secs(5)).expect("open store");
        let h = Harness::with_store(store);
        let moderator = h.moderator().await;
        let submission = h.submit_application("alice", "b").await;
        done(h.service.decide(submission.id, &moderator, ReviewOutcome::Approve { tier: RoleTier::Member }).await);
        submission.id
    };

    let store = SqlStore::open_path(&path, 2, Duration::from_secs(5)).expect("reopen store");
    assert_eq!(store.schema_version().expect("schema version"), CURRENT_SCHEMA_VERSION);

    let h = Harness::with_store(store.clone());
    let member = done(h.service.member(&group(), &user("alice")).await);
    assert_eq!(member.status, ApplicationStatus::Approved);
    assert_eq!(member.role_tier, RoleTier::Member);

    let submission = done(h.service.submission(submission_id).await);
    assert_eq!(submission.answers.len(), 1);
    assert!(done(h.service.list_pending(&group()).await).is_empty());

    let audit = store.read(|tx| tx.audit_entries(&group(), None)).expect("audit log readable");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Approve);
    assert_eq!(audit[0].submission, Some(submission_id));
}

#[tokio::test]
async fn test_graphs_load_from_config_file() {
    let dir = tempdir().expect("temp dir");
    let graph_path = dir.path().join("guild.toml");
    std::fs::write(&graph_path, BRANCHING_GRAPH).expect("write graph");

    let config_path = dir.path().join("gatehouse.toml");
    let contents = format!(
        r#"
[store]
database_path = "{db}"

[onboarding]
moderator_tier = "moderator"

[onboarding.question_graphs]
guild = "{graph}"

[rate_limit.appeal]
max_uses = 3
window = "10m"
"#,
        db = dir.path().join("gatehouse.db").display(),
        graph = graph_path.display()
    );
    std::fs::write(&config_path, contents).expect("write config");

    let config = Config::from_file(&config_path).expect("valid config");
    assert_eq!(config.rate_limit.appeal.max_uses, 3);
    assert_eq!(config.rate_limit.appeal.window, Duration::from_secs(600));

    let registry = GraphRegistry::load(&config.onboarding).expect("graphs load");
    assert_eq!(registry.len(), 1);
    let graph = registry.get(&GroupId::new("guild")).expect("guild graph");
    assert_eq!(graph.len(), 2);

    let store = SqlStore::open(&config.store).expect("open configured store");
    assert_eq!(store.schema_version().expect("schema version"), CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_broken_graph_file_names_the_group() {
    let dir = tempdir().expect("temp dir");
    let graph_path = dir.path().join("broken.toml");
    std::fs::write(
        &graph_path,
        r#"
[[question]]
id = "child"
prompt = "Orphan"
kind = "free_text"
parent = { question = "missing", option = "a" }
"#,
    )
    .expect("write graph");

    let mut config = Config::default();
    config.onboarding.question_graphs.insert("guild".to_string(), graph_path);

    match GraphRegistry::load(&config.onboarding) {
        Err(ConfigError::GraphLoad { group, reason }) => {
            assert_eq!(group, "guild");
            assert!(reason.contains("missing"));
        }
        other => panic!("expected a graph load error, got {:?}", other.map(|r| r.len())),
    }
}
