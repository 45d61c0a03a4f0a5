use super::super::domain::{Role, User};
use super::super::error::ForbiddenError;

/// The identity performing a request and the identity it is performed as.
///
/// Access-matrix checks bind to `effective`. The submission-window bypass and the
/// duplicate-submission hint bind to `actual`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actual: User,
    effective: User,
}

impl ActorContext {
    pub fn direct(actor: User) -> Self {
        Self {
            actual: actor.clone(),
            effective: actor,
        }
    }

    /// Only administrators may act as somebody else.
    pub fn acting_as(actual: User, effective: User) -> Result<Self, ForbiddenError> {
        if actual.id == effective.id {
            return Ok(Self::direct(actual));
        }
        if actual.role != Role::Admin {
            return Err(ForbiddenError::ImpersonationNotPermitted);
        }
        Ok(Self { actual, effective })
    }

    pub fn actual(&self) -> &User {
        &self.actual
    }

    pub fn effective(&self) -> &User {
        &self.effective
    }

    pub fn is_impersonating(&self) -> bool {
        self.actual.id != self.effective.id
    }
}
