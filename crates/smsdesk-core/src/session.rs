use smsdesk_types::api::Claims;

use crate::error::CoreError;

/// The signed-in user as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<&Claims> for AuthUser {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub.clone(),
            username: claims.username.clone(),
            email: claims.email.clone(),
        }
    }
}

/// Source of the current user, provided by whatever handles sign-in.
pub trait Session: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;
}

impl Session for AuthUser {
    fn current_user(&self) -> Option<AuthUser> {
        Some(self.clone())
    }
}

impl Session for Option<AuthUser> {
    fn current_user(&self) -> Option<AuthUser> {
        self.clone()
    }
}

pub(crate) fn require_user(session: &dyn Session) -> Result<AuthUser, CoreError> {
    session.current_user().ok_or(CoreError::NotAuthenticated)
}
