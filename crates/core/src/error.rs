use thiserror::Error;

/// Input rejected before any request leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Password must be at least {min} characters long.")]
    PasswordTooShort { min: usize },
    #[error("Name must be at least {min} characters long.")]
    NameTooShort { min: usize },
    #[error("Passwords do not match.")]
    PasswordMismatch,
    #[error("Please verify your email address.")]
    MissingVerificationCode,
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Error type for identifiers that cannot be built from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse {kind} from {raw:?}")]
pub struct ParseIdError {
    pub(crate) kind: &'static str,
    pub(crate) raw: String,
}
