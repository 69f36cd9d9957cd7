//! The REST contract of the course backend.

use async_trait::async_trait;

use course_core::credentials::{Credentials, NewPassword, RegistrationProfile};
use course_core::model::{Course, CourseId, Identity, LectureId, Module, ModuleId, SessionToken};

use crate::error::ApiError;

mod config;
mod http;
mod in_memory;
mod wire;

pub use config::{ApiConfig, DEFAULT_BASE_URL};
pub use http::HttpBackend;
pub use in_memory::InMemoryBackend;

/// Identity and token handed out together by login and registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub identity: Identity,
    pub token: SessionToken,
}

/// Every backend call the client core makes.
///
/// Implementations perform no retries; callers decide what a failure means.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /api/auth/me`
    async fn me(&self, token: &SessionToken) -> Result<Identity, ApiError>;

    /// `POST /api/auth/login`
    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError>;

    /// `POST /api/auth/register`
    async fn register(
        &self,
        profile: &RegistrationProfile,
        verification_code: &str,
    ) -> Result<AuthGrant, ApiError>;

    /// `POST /api/auth/send-verification-code`, returning the issued code.
    async fn send_verification_code(&self, email: &str) -> Result<String, ApiError>;

    /// `POST /api/auth/verify-code`
    async fn verify_code(&self, email: &str, code: &str) -> Result<(), ApiError>;

    /// `POST /api/auth/forgot-password`
    async fn forgot_password(&self, email: &str) -> Result<String, ApiError>;

    /// `POST /api/auth/reset-password/:token`
    async fn reset_password(
        &self,
        reset_token: &str,
        password: &NewPassword,
    ) -> Result<String, ApiError>;

    /// `GET /api/courses`
    async fn list_courses(&self) -> Result<Vec<Course>, ApiError>;

    /// `GET /api/courses/:id`
    async fn get_course(&self, course_id: &CourseId) -> Result<Course, ApiError>;

    /// `GET /api/user-courses`
    async fn enrolled_courses(&self, token: &SessionToken) -> Result<Vec<Course>, ApiError>;

    /// `GET /api/courses/:id/modules`
    async fn modules(&self, course_id: &CourseId) -> Result<Vec<Module>, ApiError>;

    /// `POST /api/courses/:id/enroll`
    async fn enroll(&self, token: &SessionToken, course_id: &CourseId) -> Result<String, ApiError>;

    /// `GET /api/watched-videos`
    async fn watched_lectures(&self, token: &SessionToken) -> Result<Vec<LectureId>, ApiError>;

    /// `POST /api/courses/:id/modules/:m/lectures/:l/watch`
    async fn mark_watched(
        &self,
        token: &SessionToken,
        course_id: &CourseId,
        module_id: &ModuleId,
        lecture_id: &LectureId,
    ) -> Result<String, ApiError>;
}
