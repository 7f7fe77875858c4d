/*
    Rate Limiter - Sliding-window limits for member-facing commands

    Each (identity, command category) pair keeps the instants of its recent
    admitted invocations. A call is admitted while fewer than `max_uses`
    invocations fall inside the window; denied calls leave no trace, so a
    person hammering a command does not extend their own lockout.

    Windows live in memory only and are rebuilt from nothing on restart.
*/

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Commands that share one budget per person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    /// Self-service onboarding reset
    Reset,
    /// Filing an appeal
    Appeal,
    /// Character sheet edits handled by the command dispatcher
    CharacterManagement,
}

impl CommandCategory {
    pub const ALL: [CommandCategory; 3] =
        [CommandCategory::Reset, CommandCategory::Appeal, CommandCategory::CharacterManagement];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCategory::Reset => "reset",
            CommandCategory::Appeal => "appeal",
            CommandCategory::CharacterManagement => "character_management",
        }
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget for one command category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLimit {
    /// Admitted invocations allowed inside one window
    pub max_uses: u32,

    /// Length of the sliding window
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl CommandLimit {
    pub fn new(max_uses: u32, window: Duration) -> Self {
        Self { max_uses, window }
    }
}

impl Default for CommandLimit {
    fn default() -> Self {
        // 5 uses per 5 minutes
        Self { max_uses: 5, window: Duration::from_secs(5 * 60) }
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Invocation recorded; `remaining` more fit in the current window
    Allowed { remaining: u32 },
    /// Budget exhausted; the oldest recorded use expires after `retry_after`
    Denied { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    identity: String,
    category: CommandCategory,
}

/// Recent admitted invocations for one key, oldest first
#[derive(Debug, Default)]
struct SlidingWindow {
    hits: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Drop every invocation whose age has reached the window
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn admit(&mut self, now: Instant, limit: CommandLimit) -> RateLimitDecision {
        self.prune(now, limit.window);

        let used = self.hits.len() as u32;
        if used < limit.max_uses {
            self.hits.push_back(now);
            return RateLimitDecision::Allowed { remaining: limit.max_uses - used - 1 };
        }

        let retry_after = match self.hits.front() {
            Some(&oldest) => limit.window.saturating_sub(now.saturating_duration_since(oldest)),
            None => limit.window,
        };
        RateLimitDecision::Denied { retry_after }
    }

    fn is_idle(&self, now: Instant, window: Duration) -> bool {
        self.hits.back().map_or(true, |&newest| now.saturating_duration_since(newest) >= window)
    }
}

/// Sliding-window limiter keyed by (identity, command category)
///
/// The key map sits behind a shared `RwLock`; each window has its own
/// `Mutex`, so two people never wait on each other once their windows exist.
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    windows: RwLock<HashMap<WindowKey, Arc<Mutex<SlidingWindow>>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and, when admitted, record one invocation
    pub async fn admit(
        &self,
        identity: &str,
        category: CommandCategory,
        limit: CommandLimit,
    ) -> RateLimitDecision {
        let window = self.window_for(identity, category).await;
        let mut window = window.lock().await;
        let decision = window.admit(Instant::now(), limit);

        match decision {
            RateLimitDecision::Allowed { remaining } => {
                trace!(identity, category = %category, remaining, "Command admitted");
            }
            RateLimitDecision::Denied { retry_after } => {
                warn!(
                    identity,
                    category = %category,
                    max_uses = limit.max_uses,
                    window_secs = limit.window.as_secs(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Command rate limited"
                );
            }
        }

        decision
    }

    async fn window_for(&self, identity: &str, category: CommandCategory) -> Arc<Mutex<SlidingWindow>> {
        let key = WindowKey { identity: identity.to_string(), category };

        if let Some(window) = self.windows.read().await.get(&key) {
            return Arc::clone(window);
        }

        let mut windows = self.windows.write().await;
        let window = windows.entry(key).or_insert_with(|| {
            debug!(identity, category = %category, "Creating rate limit window");
            Arc::new(Mutex::new(SlidingWindow::default()))
        });
        Arc::clone(window)
    }

    /// Drop every window belonging to `identity`
    pub async fn forget(&self, identity: &str) {
        self.windows.write().await.retain(|key, _| key.identity != identity);
    }

    /// Remove windows with no invocation younger than `window`; returns how many went
    pub async fn sweep_idle(&self, window: Duration) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => !guard.is_idle(now, window),
            // Busy windows are in use right now
            Err(_) => true,
        });
        before - windows.len()
    }

    /// Number of live (identity, category) windows
    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}
