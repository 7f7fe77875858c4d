//! Error and outcome types for onboarding operations
//!
//! Business refusals ([`Refusal`]) are ordinary results: the caller shows
//! them to the person and nothing was changed. Only [`StoreError`] is a
//! failure of the system itself.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::member::RoleTier;
use super::storage::StoreError;
use super::types::GroupId;

/// Why a person or reviewer may not perform an operation right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotEligibleReason {
    /// No member record or no application yet
    NotStarted,
    AlreadyApproved,
    /// Rejected; `appeal_available` tells whether an appeal can still be filed
    ApplicationRejected { appeal_available: bool },
    /// Rejected and the appeal is still waiting for a moderator
    AppealPending,
    /// No open questionnaire to answer or abandon
    NoOpenSession,
    /// The questionnaire was already submitted for review
    AlreadySubmitted,
    /// The single appeal has been spent
    AppealAlreadyUsed,
    /// Appeals are only for rejected applications
    NotRejected,
    /// Self-reset is closed to members above the lowest tier
    ResetNotAllowed { tier: RoleTier },
    /// The reviewer is below the configured moderator tier
    ReviewerTierTooLow { required: RoleTier, actual: RoleTier },
    /// The target holds a tier at or above the reviewer's
    TargetOutranksReviewer,
    /// Promotion and demotion apply to approved members only
    NotApproved,
}

impl fmt::Display for NotEligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotEligibleReason::NotStarted => f.write_str("you have not started an application"),
            NotEligibleReason::AlreadyApproved => {
                f.write_str("your application has already been approved")
            }
            NotEligibleReason::ApplicationRejected { appeal_available: true } => {
                f.write_str("your application was not approved; you may file one appeal")
            }
            NotEligibleReason::ApplicationRejected { appeal_available: false } => {
                f.write_str("your application was not approved")
            }
            NotEligibleReason::AppealPending => f.write_str("your appeal is awaiting review"),
            NotEligibleReason::NoOpenSession => {
                f.write_str("you do not have an application in progress")
            }
            NotEligibleReason::AlreadySubmitted => {
                f.write_str("your application has already been submitted for review")
            }
            NotEligibleReason::AppealAlreadyUsed => {
                f.write_str("you have already used your one appeal")
            }
            NotEligibleReason::NotRejected => {
                f.write_str("only rejected applications can be appealed")
            }
            NotEligibleReason::ResetNotAllowed { tier } => {
                write!(f, "members holding the {} tier cannot reset their onboarding", tier)
            }
            NotEligibleReason::ReviewerTierTooLow { required, actual } => {
                write!(f, "reviewing requires the {} tier (you hold {})", required, actual)
            }
            NotEligibleReason::TargetOutranksReviewer => {
                f.write_str("you cannot act on someone at or above your own tier")
            }
            NotEligibleReason::NotApproved => {
                f.write_str("only approved members can be promoted or demoted")
            }
        }
    }
}

/// An expected business condition; no state was changed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Refusal {
    /// Malformed input: unknown or unreachable question, bad option, bad tier
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not eligible: {0}")]
    NotEligible(NotEligibleReason),

    /// Another reviewer acted first
    #[error("this item has already been decided")]
    AlreadyDecided,

    #[error("{0} not found")]
    NotFound(String),

    #[error("rate limited, try again in {}s", .retry_after.as_secs().max(1))]
    RateLimited { retry_after: Duration },

    /// The group has no question graph
    #[error("onboarding is not configured for group {0}")]
    NotConfigured(GroupId),
}

impl Refusal {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Refusal::Validation(_) => "validation",
            Refusal::NotEligible(_) => "not_eligible",
            Refusal::AlreadyDecided => "already_decided",
            Refusal::NotFound(_) => "not_found",
            Refusal::RateLimited { .. } => "rate_limited",
            Refusal::NotConfigured(_) => "not_configured",
        }
    }
}

impl From<NotEligibleReason> for Refusal {
    fn from(reason: NotEligibleReason) -> Self {
        Refusal::NotEligible(reason)
    }
}

/// Error type of the synchronous manager layer
#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error(transparent)]
    Refused(#[from] Refusal),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<NotEligibleReason> for OnboardingError {
    fn from(reason: NotEligibleReason) -> Self {
        OnboardingError::Refused(Refusal::NotEligible(reason))
    }
}

pub type OnboardingResult<T> = Result<T, OnboardingError>;

/// Result of an operation that ran to a business decision
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    Refused(Refusal),
}

impl<T> Outcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::Refused(_) => None,
        }
    }

    pub fn refusal(&self) -> Option<&Refusal> {
        match self {
            Outcome::Done(_) => None,
            Outcome::Refused(refusal) => Some(refusal),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(value) => Outcome::Done(f(value)),
            Outcome::Refused(refusal) => Outcome::Refused(refusal),
        }
    }

    pub fn into_result(self) -> Result<T, Refusal> {
        match self {
            Outcome::Done(value) => Ok(value),
            Outcome::Refused(refusal) => Err(refusal),
        }
    }

    /// Split a manager result: refusals become outcomes, storage errors stay errors
    pub fn from_result(result: OnboardingResult<T>) -> ServiceResult<T> {
        match result {
            Ok(value) => Ok(Outcome::Done(value)),
            Err(OnboardingError::Refused(refusal)) => Ok(Outcome::Refused(refusal)),
            Err(OnboardingError::Storage(err)) => Err(err),
        }
    }
}

/// What every exposed operation returns
pub type ServiceResult<T> = Result<Outcome<T>, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refusal_messages() {
        assert_eq!(
            Refusal::NotEligible(NotEligibleReason::AppealAlreadyUsed).to_string(),
            "not eligible: you have already used your one appeal"
        );
        assert_eq!(
            Refusal::RateLimited { retry_after: Duration::from_millis(300) }.to_string(),
            "rate limited, try again in 1s"
        );
        assert_eq!(
            Refusal::NotConfigured(GroupId::new("guild-9")).to_string(),
            "onboarding is not configured for group guild-9"
        );
    }

    #[test]
    fn test_outcome_from_result_splits_refusals() {
        let refused: OnboardingResult<u32> = Err(NotEligibleReason::NotStarted.into());
        let outcome = Outcome::from_result(refused).expect("refusal is not a storage error");
        assert_eq!(outcome.refusal(), Some(&Refusal::NotEligible(NotEligibleReason::NotStarted)));

        let done = Outcome::from_result(Ok(5)).expect("ok");
        assert_eq!(done.map(|n| n * 2).done(), Some(10));
    }

    #[test]
    fn test_storage_errors_stay_errors() {
        let failed: OnboardingResult<()> = Err(StoreError::Corrupt("bad row".to_string()).into());
        assert!(Outcome::from_result(failed).is_err());
    }
}
