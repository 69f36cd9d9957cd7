//! Shared error types for the services crate.

use reqwest::StatusCode;
use thiserror::Error;

use course_core::ValidationError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Body text the backend uses when a lecture was already marked.
pub const ALREADY_WATCHED_MESSAGE: &str = "Video already watched";

const GENERIC_FAILURE: &str = "Something went wrong. Please try again later.";

/// Errors emitted while talking to the course backend.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("request failed with status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(_) | ApiError::Decode(_) => None,
        }
    }

    /// The backend's own `message`, when it sent one.
    #[must_use]
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    #[must_use]
    pub fn is_already_watched(&self) -> bool {
        self.backend_message()
            .is_some_and(|message| message.trim() == ALREADY_WATCHED_MESSAGE)
    }

    #[must_use]
    pub fn is_already_enrolled(&self) -> bool {
        self.backend_message()
            .is_some_and(|message| message.to_lowercase().contains("already enrolled"))
    }

    /// Text suitable for a dismissible notice.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { status, message } => {
                if message.is_empty() {
                    format!("Request failed ({status}).")
                } else {
                    message.clone()
                }
            }
            ApiError::Network(_) => GENERIC_FAILURE.to_string(),
            ApiError::Decode(_) => "Unexpected response from the server.".to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Errors in the API configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid API base url {raw:?}: {source}")]
    InvalidBaseUrl {
        raw: String,
        source: url::ParseError,
    },
    #[error("API base url {0:?} cannot carry a path")]
    NotABase(String),
}

/// Errors emitted by `SessionManager`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email address has not been verified")]
    EmailNotVerified,
    #[error("a request is already in progress")]
    Busy,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Validation(err) => err.to_string(),
            SessionError::InvalidCredentials => {
                "Email or password does not match. Please try again.".to_string()
            }
            SessionError::EmailNotVerified => ValidationError::MissingVerificationCode.to_string(),
            SessionError::Busy => "Please wait for the current request to finish.".to_string(),
            SessionError::Api(err) => err.user_message(),
            SessionError::Storage(_) => "Your session could not be saved on this device.".to_string(),
        }
    }
}

/// Errors emitted by `ProgressTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("no course is open")]
    NoActiveCourse,
    #[error("lecture {0} is not part of the open course")]
    UnknownLecture(String),
    /// The course context changed while the request was in flight.
    #[error("course context changed before the response arrived")]
    Superseded,
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ProgressError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ProgressError::NotAuthenticated => "Authentication required! Please log in.".to_string(),
            ProgressError::NoActiveCourse => "Open a course first.".to_string(),
            ProgressError::UnknownLecture(_) => "That lecture is not part of this course.".to_string(),
            ProgressError::Superseded => String::new(),
            ProgressError::Api(err) => err.user_message(),
        }
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CatalogError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            CatalogError::Api(err) => err.user_message(),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_watched_is_recognised_from_backend_message() {
        let err = ApiError::Status {
            status: StatusCode::BAD_REQUEST,
            message: "Video already watched".into(),
        };
        assert!(err.is_already_watched());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn already_enrolled_matches_case_insensitively() {
        let err = ApiError::Status {
            status: StatusCode::BAD_REQUEST,
            message: "User Already Enrolled in this course".into(),
        };
        assert!(err.is_already_enrolled());
    }

    #[test]
    fn user_message_prefers_backend_text() {
        let err = ApiError::Status {
            status: StatusCode::CONFLICT,
            message: "Email already registered".into(),
        };
        assert_eq!(err.user_message(), "Email already registered");

        let bare = ApiError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: String::new(),
        };
        assert!(bare.user_message().contains("500"));
        assert_eq!(ApiError::Network("reset".into()).user_message(), GENERIC_FAILURE);
    }

    #[test]
    fn validation_errors_surface_their_own_text() {
        let err = SessionError::from(ValidationError::InvalidEmail);
        assert_eq!(err.user_message(), "Please enter a valid email address.");
    }
}
