//! Membership onboarding
//!
//! Tracks each person's application through a group's question graph, the
//! moderator review queue, and the single appeal a rejected applicant may file.
//!
//! ## Architecture
//!
//! - **Question graph**: per-group questions with branching and flags
//! - **Session**: the open submission a person is answering
//! - **Review**: moderator decisions, tier changes and resets
//! - **Appeal**: one appeal per member, decided once
//!
//! State lives in [`SqlStore`]; every status change is a compare-and-set so
//! two moderators acting at once cannot both win. [`OnboardingService`] adds
//! rate limiting, per-member serialization and notifications on top of the
//! synchronous [`OnboardingManagerImpl`].

pub mod appeal;
pub mod audit;
pub mod errors;
pub mod events;
pub mod graph_registry;
pub mod manager;
pub mod manager_impl;
pub mod member;
pub mod messages;
pub mod metrics;
pub mod notify;
pub mod question_graph;
pub mod review;
pub mod service;
pub mod session;
pub mod storage;
pub mod types;

pub use appeal::{Appeal, AppealOutcome, AppealStatus};
pub use audit::{AuditAction, AuditEntry};
pub use errors::{NotEligibleReason, OnboardingError, OnboardingResult, Outcome, Refusal, ServiceResult};
pub use events::{run_event_loop, ChannelEventSource, EventLoopStats, EventSource, GatewayEvent};
pub use graph_registry::GraphRegistry;
pub use manager::{AppealManager, ApplicationManager, ReviewManager};
pub use manager_impl::OnboardingManagerImpl;
pub use member::{ApplicationStatus, Member, ProfileChange, ProfileField, ProfileSnapshot, RoleTier};
pub use notify::{Delivery, Messenger, MessengerError, Notification, Outbox, RecordingMessenger};
pub use question_graph::{AnswerSet, AnswerValue, GraphError, QuestionGraph, QuestionKind, QuestionNode};
pub use review::{
    AppealDecisionReport, DecisionReport, ResetReport, ResetScope, ReviewItem, ReviewOutcome, TierChangeReport,
    TierDirection,
};
pub use service::OnboardingService;
pub use session::{Answer, SessionStep, StartMode, Submission, SubmissionKind, SubmissionStatus};
pub use storage::{SqlStore, StoreError, StoreResult};
pub use types::{AppealId, ChannelRef, GroupId, MemberKey, OptionId, QuestionId, RoleRef, SubmissionId, Timestamp, UserId};
