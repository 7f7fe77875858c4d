//! Gatehouse - membership onboarding for chat communities
//!
//! People who join a group answer a branching questionnaire; moderators
//! approve, reject or ban from a review queue; rejected applicants get one
//! appeal. Member commands pass through a sliding-window rate limiter.

pub mod config;
pub mod core_onboarding;
pub mod logging;
pub mod rate_limiter;
pub mod shutdown;

pub use config::{Config, ConfigError, FeatureManager};
pub use core_onboarding::{OnboardingService, Outcome, Refusal, SqlStore, StoreError};
pub use logging::{init_logging, LogLevel};
pub use rate_limiter::{CommandCategory, RateLimitDecision, SlidingWindowLimiter};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
