//! Licensing collaborator interface.
//!
//! Token validation itself lives outside this crate. A [`RecorderFactory`]
//! built with a [`TokenValidator`] refuses to create recorders until a token
//! that validates has been set.
//!
//! [`RecorderFactory`]: crate::RecorderFactory

use crate::status::MediaStatus;

/// Outcome of validating a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenStatus {
    /// Token accepted.
    Valid,
    /// Token missing, malformed or expired.
    Invalid,
    /// The hub dependency is not installed.
    HubMissing,
    /// The hub dependency is present but incompatible.
    HubInvalid,
    /// The account plan does not include recording.
    PlanInvalid,
    /// The account plan restricts this feature.
    PlanLimited,
}

impl TokenStatus {
    /// Status code reported for this outcome.
    pub fn media_status(self) -> MediaStatus {
        match self {
            TokenStatus::Valid => MediaStatus::Ok,
            TokenStatus::Invalid => MediaStatus::InvalidSession,
            TokenStatus::HubMissing => MediaStatus::MissingHub,
            TokenStatus::HubInvalid => MediaStatus::InvalidHub,
            TokenStatus::PlanInvalid => MediaStatus::InvalidPlan,
            TokenStatus::PlanLimited => MediaStatus::LimitedPlan,
        }
    }

    pub fn is_valid(self) -> bool {
        self == TokenStatus::Valid
    }
}

/// External token validation service.
pub trait TokenValidator: Send + Sync {
    /// Validate `token` and report the outcome.
    fn validate(&self, token: &str) -> TokenStatus;
}

impl<F> TokenValidator for F
where
    F: Fn(&str) -> TokenStatus + Send + Sync,
{
    fn validate(&self, token: &str) -> TokenStatus {
        self(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_status_codes() {
        assert_eq!(TokenStatus::Valid.media_status(), MediaStatus::Ok);
        assert_eq!(TokenStatus::Invalid.media_status(), MediaStatus::InvalidSession);
        assert_eq!(TokenStatus::HubMissing.media_status(), MediaStatus::MissingHub);
        assert_eq!(TokenStatus::HubInvalid.media_status(), MediaStatus::InvalidHub);
        assert_eq!(TokenStatus::PlanInvalid.media_status(), MediaStatus::InvalidPlan);
        assert_eq!(TokenStatus::PlanLimited.media_status(), MediaStatus::LimitedPlan);
    }

    #[test]
    fn test_closure_validator() {
        let validator = |token: &str| {
            if token == "ok" {
                TokenStatus::Valid
            } else {
                TokenStatus::Invalid
            }
        };
        assert!(validator.validate("ok").is_valid());
        assert!(!validator.validate("nope").is_valid());
    }
}
