//! Role gate consulted by every protected view.

use crate::model::{IdentityState, Role};
use crate::route::Route;

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    /// Bootstrap still in flight: render nothing final, redirect nowhere.
    Pending,
    /// No identity: send the user to the login view.
    RedirectToLogin,
    /// Identity present but lacking the role: show an access-denied notice in place.
    Denied,
}

impl Access {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Access::Allow)
    }

    /// Navigation the caller should perform, if any.
    #[must_use]
    pub fn redirect(self) -> Option<Route> {
        match self {
            Access::RedirectToLogin => Some(Route::Login),
            Access::Allow | Access::Pending | Access::Denied => None,
        }
    }
}

/// Decide whether `state` may see a view restricted to `required`.
///
/// Pure; evaluate it on every render against the current state.
#[must_use]
pub fn can_access(state: &IdentityState, required: &[Role]) -> Access {
    match state {
        IdentityState::Unknown => Access::Pending,
        IdentityState::Absent => Access::RedirectToLogin,
        IdentityState::Present(identity) if required.contains(&identity.role()) => Access::Allow,
        IdentityState::Present(_) => Access::Denied,
    }
}

/// Roles allowed on learner views (course detail, my courses).
pub const LEARNER_ROLES: &[Role] = &[Role::User, Role::Admin];

/// Roles allowed on the content-management views.
pub const ADMIN_ROLES: &[Role] = &[Role::Admin];
