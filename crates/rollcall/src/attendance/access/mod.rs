mod context;
mod matrix;

pub use context::ActorContext;
pub use matrix::{scope_for, Operation, Scope};

use serde::{Deserialize, Serialize};

use super::domain::{DistrictScope, Event, Session, User, UserId, VoicePart};
use super::error::ForbiddenError;

/// What an operation touches, reduced to the attributes the matrix inspects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTarget {
    #[serde(default)]
    pub owner: Option<UserId>,
    #[serde(default)]
    pub district: Option<DistrictScope>,
    #[serde(default)]
    pub voice_part: Option<VoicePart>,
    #[serde(default)]
    pub creator: Option<UserId>,
}

impl AccessTarget {
    /// Target for attendance owned by `user`.
    pub fn user(user: &User) -> Self {
        Self {
            owner: Some(user.id.clone()),
            district: Some(DistrictScope::District(user.district_id.clone())),
            voice_part: user.voice_part,
            creator: None,
        }
    }

    pub fn session(session: &Session) -> Self {
        Self {
            owner: None,
            district: Some(DistrictScope::District(session.district_id.clone())),
            voice_part: None,
            creator: Some(session.created_by.clone()),
        }
    }

    pub fn event(event: &Event) -> Self {
        Self {
            owner: None,
            district: Some(event.scope.clone()),
            voice_part: None,
            creator: Some(event.created_by.clone()),
        }
    }

    /// Target for creating something inside `scope`.
    pub fn scope(scope: DistrictScope) -> Self {
        Self {
            district: Some(scope),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        self == AccessDecision::Allow
    }
}

/// Evaluate one actor against the matrix.
pub fn decide(actor: &User, operation: Operation, target: &AccessTarget) -> AccessDecision {
    if matrix::permits(actor, operation, target) {
        AccessDecision::Allow
    } else {
        AccessDecision::Deny
    }
}

/// Single entry point for access checks. Evaluated against the effective actor.
pub fn check_access(
    context: &ActorContext,
    operation: Operation,
    target: &AccessTarget,
) -> AccessDecision {
    decide(context.effective(), operation, target)
}

/// [`check_access`] as a `Result`, for use with `?` inside services.
pub fn require(
    context: &ActorContext,
    operation: Operation,
    target: &AccessTarget,
) -> Result<(), ForbiddenError> {
    if check_access(context, operation, target).is_allowed() {
        Ok(())
    } else {
        Err(ForbiddenError::AccessDenied {
            operation,
            role: context.effective().role.label(),
        })
    }
}
