use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gatehouse_core::config::Config;
use gatehouse_core::core_onboarding::metrics::init_metrics;
use gatehouse_core::core_onboarding::{
    ApplicationManager, GraphRegistry, GroupId, MemberKey, OnboardingManagerImpl, QuestionGraph, ReviewManager,
    SqlStore, UserId,
};
use gatehouse_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use gatehouse_core::FeatureManager;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(author, version, about = "Membership onboarding administration", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file; GATEHOUSE_* environment variables apply on top
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and every question graph it names
    CheckConfig,

    /// Validate one question graph file
    ValidateGraph {
        /// Path to a `[[question]]` TOML file
        file: PathBuf,
    },

    /// Create or upgrade the database schema
    Migrate,

    /// List the review queue of a group as JSON
    Pending {
        group: String,
    },

    /// Show one member record as JSON
    Member {
        group: String,
        identity: String,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).context("failed to load configuration")?;
    debug!(path = ?path, "Configuration loaded");
    Ok(config)
}

fn manager(config: &Config) -> Result<OnboardingManagerImpl> {
    let store = SqlStore::open(&config.store).context("failed to open the onboarding database")?;
    let graphs = GraphRegistry::load(&config.onboarding)?;
    let features = FeatureManager::with_flags(config.features.clone());
    Ok(OnboardingManagerImpl::new(store, graphs, config.onboarding.clone(), features))
}

fn check_config(config: &Config) -> Result<String> {
    let graphs = GraphRegistry::load(&config.onboarding)?;
    info!(graphs = graphs.len(), "Configuration is valid");
    Ok(format!(
        "configuration OK: database {}, {} question graph(s), moderator tier {}",
        config.store.database_path.display(),
        graphs.len(),
        config.onboarding.moderator_tier
    ))
}

fn validate_graph(file: &Path) -> Result<String> {
    let graph = QuestionGraph::from_file(file)?;
    let roots = graph.questions().iter().filter(|q| q.parent.is_none()).count();
    Ok(format!("{}: {} question(s), {} root(s)", file.display(), graph.len(), roots))
}

fn migrate(config: &Config) -> Result<String> {
    let store = SqlStore::open(&config.store).context("failed to open the onboarding database")?;
    let version = store.schema_version()?;
    Ok(format!("{}: schema version {}", config.store.database_path.display(), version))
}

fn pending(config: &Config, group: &str) -> Result<String> {
    let items = manager(config)?.list_pending(&GroupId::new(group))?;
    Ok(serde_json::to_string_pretty(&json!({ "group": group, "items": items }))?)
}

fn member(config: &Config, group: &str, identity: &str) -> Result<String> {
    let key = MemberKey { group: GroupId::new(group), user: UserId::new(identity) };
    let member = manager(config)?.member(&key)?;
    Ok(serde_json::to_string_pretty(&member)?)
}

fn run(command: &Command, config: &Config) -> Result<String> {
    match command {
        Command::CheckConfig => check_config(config),
        Command::ValidateGraph { file } => validate_graph(file),
        Command::Migrate => migrate(config),
        Command::Pending { group } => pending(config, group),
        Command::Member { group, identity } => member(config, group, identity),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(level) = &args.log_level {
        config.logging.level = match level.parse::<LogLevel>() {
            Ok(level) => level,
            Err(e) => bail!("{}", e),
        };
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    init_logging_with_config(LogConfig::from_settings(&config.logging))?;
    init_metrics();

    info!(command = ?args.command, "Gatehouse CLI started");
    let output = run(&args.command, &config)?;
    println!("{}", output);

    Ok(())
}
