use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::model::CourseId;
use crate::route::Route;

/// Role carried by an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated user's profile, reconstructed from the backend on every bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    email: String,
    role: Role,
    enrolled_course_ids: BTreeSet<CourseId>,
}

impl Identity {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        enrolled_course_ids: impl IntoIterator<Item = CourseId>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role,
            enrolled_course_ids: enrolled_course_ids.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn enrolled_course_ids(&self) -> &BTreeSet<CourseId> {
        &self.enrolled_course_ids
    }

    #[must_use]
    pub fn is_enrolled(&self, course_id: &CourseId) -> bool {
        self.enrolled_course_ids.contains(course_id)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Where a freshly authenticated identity lands.
    #[must_use]
    pub fn home_route(&self) -> Route {
        match self.role {
            Role::Admin => Route::AdminDashboard,
            Role::User => Route::Landing,
        }
    }
}

/// Opaque bearer credential. The value never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(**redacted**)")
    }
}

/// What the client knows about the current identity.
///
/// `Unknown` only exists until the first bootstrap resolves; it is never a
/// synonym for `Absent`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityState {
    #[default]
    Unknown,
    Absent,
    Present(Identity),
}

impl IdentityState {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityState::Present(identity) => Some(identity),
            IdentityState::Unknown | IdentityState::Absent => None,
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, IdentityState::Unknown)
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, IdentityState::Present(_))
    }
}
