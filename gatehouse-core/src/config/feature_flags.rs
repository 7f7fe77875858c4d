//! Feature flags for onboarding behaviour that operators toggle at runtime

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Switches for optional onboarding behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Post to the welcome channel when a welcome DM cannot be delivered
    pub dm_fallback: bool,

    /// Publicly announce approved members
    pub announcements: bool,

    /// Alert moderators when a member changes avatar, name or nickname
    pub profile_change_alerts: bool,

    /// Allow a fresh application once the single appeal was rejected
    pub reapply_after_denied_appeal: bool,

    /// Apply command budgets to member-facing operations
    pub rate_limiting: bool,

    /// Operator-defined flags
    pub custom: HashMap<String, bool>,
}

impl FeatureFlags {
    /// Names of the built-in flags
    pub const NAMED: [&'static str; 5] = [
        "dm_fallback",
        "announcements",
        "profile_change_alerts",
        "reapply_after_denied_appeal",
        "rate_limiting",
    ];

    pub fn is_enabled(&self, feature: &str) -> bool {
        match feature {
            "dm_fallback" => self.dm_fallback,
            "announcements" => self.announcements,
            "profile_change_alerts" => self.profile_change_alerts,
            "reapply_after_denied_appeal" => self.reapply_after_denied_appeal,
            "rate_limiting" => self.rate_limiting,
            other => self.custom.get(other).copied().unwrap_or(false),
        }
    }

    pub fn set(&mut self, feature: &str, enabled: bool) {
        match feature {
            "dm_fallback" => self.dm_fallback = enabled,
            "announcements" => self.announcements = enabled,
            "profile_change_alerts" => self.profile_change_alerts = enabled,
            "reapply_after_denied_appeal" => self.reapply_after_denied_appeal = enabled,
            "rate_limiting" => self.rate_limiting = enabled,
            other => {
                self.custom.insert(other.to_string(), enabled);
            }
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            dm_fallback: true,
            announcements: true,
            profile_change_alerts: true,
            reapply_after_denied_appeal: true,
            rate_limiting: true,
            custom: HashMap::new(),
        }
    }
}

/// Shared, thread-safe view of the flags
///
/// Clones share state, so a flag flipped by an operator is seen by every
/// holder on its next read.
#[derive(Debug, Clone, Default)]
pub struct FeatureManager {
    flags: Arc<RwLock<FeatureFlags>>,
}

impl FeatureManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(flags: FeatureFlags) -> Self {
        Self { flags: Arc::new(RwLock::new(flags)) }
    }

    fn read<T>(&self, f: impl FnOnce(&FeatureFlags) -> T) -> T {
        match self.flags.read() {
            Ok(flags) => f(&flags),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write(&self, f: impl FnOnce(&mut FeatureFlags)) {
        match self.flags.write() {
            Ok(mut flags) => f(&mut flags),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn dm_fallback(&self) -> bool {
        self.read(|f| f.dm_fallback)
    }

    pub fn announcements(&self) -> bool {
        self.read(|f| f.announcements)
    }

    pub fn profile_change_alerts(&self) -> bool {
        self.read(|f| f.profile_change_alerts)
    }

    pub fn reapply_after_denied_appeal(&self) -> bool {
        self.read(|f| f.reapply_after_denied_appeal)
    }

    pub fn rate_limiting(&self) -> bool {
        self.read(|f| f.rate_limiting)
    }

    /// Check any flag by name, built-in or custom
    pub fn is_enabled(&self, feature: &str) -> bool {
        self.read(|f| f.is_enabled(feature))
    }

    pub fn enable(&self, feature: &str) {
        self.write(|f| f.set(feature, true));
    }

    pub fn disable(&self, feature: &str) {
        self.write(|f| f.set(feature, false));
    }

    /// Snapshot of all current flags
    pub fn get_flags(&self) -> FeatureFlags {
        self.read(FeatureFlags::clone)
    }

    pub fn update_flags(&self, new_flags: FeatureFlags) {
        self.write(|f| *f = new_flags);
    }
}
