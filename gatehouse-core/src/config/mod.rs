//! Configuration management for Gatehouse
//!
//! Configuration is read from a TOML file, then individual keys may be
//! overridden from the environment. Every section has defaults, so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core_onboarding::{ChannelRef, RoleRef, RoleTier};
use crate::logging::LogLevel;
use crate::rate_limiter::{CommandCategory, CommandLimit};

mod error;
mod feature_flags;

pub use error::ConfigError;
pub use feature_flags::{FeatureFlags, FeatureManager};

/// Prefix for environment overrides: `GATEHOUSE_<SECTION>_<KEY>`
pub const ENV_PREFIX: &str = "GATEHOUSE";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
    pub onboarding: OnboardingConfig,
    pub features: FeatureFlags,
}

/// SQLite store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; created on first open
    pub database_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// How long a writer waits on a locked database before giving up
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,

    pub with_timestamp: bool,

    pub with_target: bool,

    /// Full filter directive; overrides `level` when set
    pub directives: Option<String>,
}

/// Per-category command budgets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub reset: CommandLimit,
    pub appeal: CommandLimit,
    pub character_management: CommandLimit,
}

impl RateLimitConfig {
    pub fn limit_for(&self, category: CommandCategory) -> CommandLimit {
        match category {
            CommandCategory::Reset => self.reset,
            CommandCategory::Appeal => self.appeal,
            CommandCategory::CharacterManagement => self.character_management,
        }
    }

    fn limit_mut(&mut self, category: CommandCategory) -> &mut CommandLimit {
        match category {
            CommandCategory::Reset => &mut self.reset,
            CommandCategory::Appeal => &mut self.appeal,
            CommandCategory::CharacterManagement => &mut self.character_management,
        }
    }
}

/// Gateway role reference for each tier; `None` means the tier has no role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleRefs {
    pub applicant: Option<String>,
    pub member: Option<String>,
    pub trusted: Option<String>,
    pub moderator: Option<String>,
    pub leader: Option<String>,
}

impl RoleRefs {
    pub fn role_for(&self, tier: RoleTier) -> Option<RoleRef> {
        let role = match tier {
            RoleTier::Applicant => &self.applicant,
            RoleTier::Member => &self.member,
            RoleTier::Trusted => &self.trusted,
            RoleTier::Moderator => &self.moderator,
            RoleTier::Leader => &self.leader,
        };
        role.as_deref().map(RoleRef::new)
    }

    /// Every configured role, lowest tier first
    pub fn all(&self) -> Vec<(RoleTier, RoleRef)> {
        RoleTier::ALL
            .iter()
            .filter_map(|tier| self.role_for(*tier).map(|role| (*tier, role)))
            .collect()
    }
}

/// Channels the service posts to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelRefs {
    /// New applications, appeals and profile alerts
    pub moderator_queue: Option<String>,
    /// Public welcome announcements after approval
    pub announcements: Option<String>,
    /// Fallback when a welcome DM cannot be delivered
    pub welcome: Option<String>,
}

impl ChannelRefs {
    pub fn moderator_queue(&self) -> Option<ChannelRef> {
        self.moderator_queue.as_deref().map(ChannelRef::new)
    }

    pub fn announcements(&self) -> Option<ChannelRef> {
        self.announcements.as_deref().map(ChannelRef::new)
    }

    pub fn welcome(&self) -> Option<ChannelRef> {
        self.welcome.as_deref().map(ChannelRef::new)
    }
}

/// Onboarding behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingConfig {
    /// Lowest tier allowed to review applications and appeals
    pub moderator_tier: RoleTier,

    /// Upper bound on a free-text answer, in characters
    pub max_answer_length: usize,

    /// Upper bound on an appeal reason, in characters
    pub max_appeal_length: usize,

    /// Public announcement after approval; `{mention}` is replaced
    pub welcome_template: String,

    /// DM sent when someone joins the group
    pub welcome_message: String,

    pub roles: RoleRefs,

    pub channels: ChannelRefs,

    /// Question graph file per group id
    pub question_graphs: BTreeMap<String, PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/gatehouse.db"),
            pool_size: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            with_timestamp: true,
            with_target: true,
            directives: None,
        }
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            moderator_tier: RoleTier::Moderator,
            max_answer_length: 1000,
            max_appeal_length: 1000,
            welcome_template: "Welcome {mention} to the server!".to_string(),
            welcome_message: "Welcome! When you are ready, start your application with /apply."
                .to_string(),
            roles: RoleRefs::default(),
            channels: ChannelRefs::default(),
            question_graphs: BTreeMap::new(),
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e)))
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(raw.trim())
        .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e)))
}

impl Config {
    /// Load configuration from environment variables over defaults
    ///
    /// Environment variables follow the pattern: GATEHOUSE_<SECTION>_<KEY>
    /// Example: GATEHOUSE_STORE_DATABASE_PATH=/var/lib/gatehouse/gatehouse.db
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// File (when given) then environment overrides, validated once at the end
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::parse_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply `GATEHOUSE_*` overrides fetched through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let key = format!("{}_{}", ENV_PREFIX, suffix);
            lookup(&key).map(|value| (key, value))
        };

        // Store
        if let Some((_, value)) = var("STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(value);
        }
        if let Some((key, value)) = var("STORE_POOL_SIZE") {
            self.store.pool_size = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("STORE_BUSY_TIMEOUT") {
            self.store.busy_timeout = parse_duration(&key, &value)?;
        }

        // Logging
        if let Some((key, value)) = var("LOGGING_LEVEL") {
            self.logging.level = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("LOGGING_JSON_FORMAT") {
            self.logging.json_format = parse_value(&key, &value)?;
        }
        if let Some((_, value)) = var("LOGGING_DIRECTIVES") {
            self.logging.directives = Some(value);
        }

        // Rate limits
        for category in CommandCategory::ALL {
            let section = category.as_str().to_uppercase();
            if let Some((key, value)) = var(&format!("RATE_LIMIT_{}_MAX_USES", section)) {
                self.rate_limit.limit_mut(category).max_uses = parse_value(&key, &value)?;
            }
            if let Some((key, value)) = var(&format!("RATE_LIMIT_{}_WINDOW", section)) {
                self.rate_limit.limit_mut(category).window = parse_duration(&key, &value)?;
            }
        }

        // Onboarding
        if let Some((key, value)) = var("ONBOARDING_MODERATOR_TIER") {
            self.onboarding.moderator_tier = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("ONBOARDING_MAX_ANSWER_LENGTH") {
            self.onboarding.max_answer_length = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("ONBOARDING_MAX_APPEAL_LENGTH") {
            self.onboarding.max_appeal_length = parse_value(&key, &value)?;
        }
        if let Some((_, value)) = var("ONBOARDING_WELCOME_TEMPLATE") {
            self.onboarding.welcome_template = value;
        }
        if let Some((_, value)) = var("ONBOARDING_MODERATOR_QUEUE_CHANNEL") {
            self.onboarding.channels.moderator_queue = Some(value);
        }
        if let Some((_, value)) = var("ONBOARDING_ANNOUNCEMENTS_CHANNEL") {
            self.onboarding.channels.announcements = Some(value);
        }
        if let Some((_, value)) = var("ONBOARDING_WELCOME_CHANNEL") {
            self.onboarding.channels.welcome = Some(value);
        }

        // Features
        for name in FeatureFlags::NAMED {
            if let Some((key, value)) = var(&format!("FEATURES_{}", name.to_uppercase())) {
                let enabled: bool = parse_value(&key, &value)?;
                self.features.set(name, enabled);
            }
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "store.pool_size must be greater than 0".to_string(),
            ));
        }

        if self.store.database_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "store.database_path must not be empty".to_string(),
            ));
        }

        for category in CommandCategory::ALL {
            let limit = self.rate_limit.limit_for(category);
            if limit.max_uses == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "rate_limit.{}.max_uses must be greater than 0",
                    category
                )));
            }
            if limit.window.is_zero() {
                return Err(ConfigError::ValidationFailed(format!(
                    "rate_limit.{}.window must be greater than 0",
                    category
                )));
            }
        }

        // Approval grants at least Member and strictly below the reviewer
        if self.onboarding.moderator_tier <= RoleTier::Member {
            return Err(ConfigError::ValidationFailed(format!(
                "onboarding.moderator_tier must be above member, got {}",
                self.onboarding.moderator_tier
            )));
        }

        if self.onboarding.max_answer_length == 0 || self.onboarding.max_appeal_length == 0 {
            return Err(ConfigError::ValidationFailed(
                "onboarding length limits must be greater than 0".to_string(),
            ));
        }

        if self.onboarding.welcome_template.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "onboarding.welcome_template must not be empty".to_string(),
            ));
        }

        if let Some(directives) = &self.logging.directives {
            if directives.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "logging.directives must not be blank when set".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.reset, CommandLimit::new(5, Duration::from_secs(300)));
        assert_eq!(config.onboarding.moderator_tier, RoleTier::Moderator);
        assert!(config.features.reapply_after_denied_appeal);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = Config::from_toml_str("").expect("empty config parses");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [store]
            database_path = "/tmp/gate.db"

            [rate_limit.appeal]
            max_uses = 2
            window = "10m"

            [onboarding]
            moderator_tier = "trusted"

            [onboarding.roles]
            member = "role-member"

            [onboarding.question_graphs]
            guild-1 = "graphs/guild-1.toml"

            [features]
            announcements = false
            "#,
        )
        .expect("partial config parses");

        assert_eq!(config.store.database_path, PathBuf::from("/tmp/gate.db"));
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.rate_limit.appeal, CommandLimit::new(2, Duration::from_secs(600)));
        assert_eq!(config.rate_limit.reset, CommandLimit::default());
        assert_eq!(config.onboarding.moderator_tier, RoleTier::Trusted);
        assert_eq!(config.onboarding.roles.role_for(RoleTier::Member), Some(RoleRef::new("role-member")));
        assert_eq!(config.onboarding.roles.role_for(RoleTier::Leader), None);
        assert_eq!(
            config.onboarding.question_graphs.get("guild-1"),
            Some(&PathBuf::from("graphs/guild-1.toml"))
        );
        assert!(!config.features.announcements);
        assert!(config.features.dm_fallback);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("gatehouse.toml");

        let mut config = Config::default();
        config.store.pool_size = 8;
        config.logging.json_format = true;
        config.onboarding.channels.moderator_queue = Some("mod-queue".to_string());
        config.onboarding.roles.trusted = Some("role-trusted".to_string());
        config.features.profile_change_alerts = false;

        config.save_to_file(&path).expect("save");
        let loaded = Config::from_file(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(lookup(&[
                ("GATEHOUSE_STORE_POOL_SIZE", "12"),
                ("GATEHOUSE_STORE_BUSY_TIMEOUT", "250ms"),
                ("GATEHOUSE_LOGGING_LEVEL", "debug"),
                ("GATEHOUSE_RATE_LIMIT_RESET_MAX_USES", "3"),
                ("GATEHOUSE_RATE_LIMIT_CHARACTER_MANAGEMENT_WINDOW", "1h"),
                ("GATEHOUSE_ONBOARDING_MODERATOR_TIER", "leader"),
                ("GATEHOUSE_ONBOARDING_WELCOME_CHANNEL", "lobby"),
                ("GATEHOUSE_FEATURES_DM_FALLBACK", "false"),
            ]))
            .expect("overrides apply");

        assert_eq!(config.store.pool_size, 12);
        assert_eq!(config.store.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.rate_limit.reset.max_uses, 3);
        assert_eq!(config.rate_limit.character_management.window, Duration::from_secs(3600));
        assert_eq!(config.onboarding.moderator_tier, RoleTier::Leader);
        assert_eq!(config.onboarding.channels.welcome(), Some(ChannelRef::new("lobby")));
        assert!(!config.features.dm_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(lookup(&[("GATEHOUSE_STORE_POOL_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(msg) if msg.contains("GATEHOUSE_STORE_POOL_SIZE")));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.store.pool_size = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.rate_limit.appeal.max_uses = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.onboarding.moderator_tier = RoleTier::Member;
        assert!(config.validate().is_err());

        config = Config::default();
        config.onboarding.welcome_template = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_roles_lowest_first() {
        let roles = RoleRefs {
            leader: Some("l".to_string()),
            member: Some("m".to_string()),
            ..Default::default()
        };
        let tiers: Vec<RoleTier> = roles.all().into_iter().map(|(tier, _)| tier).collect();
        assert_eq!(tiers, vec![RoleTier::Member, RoleTier::Leader]);
    }
}
