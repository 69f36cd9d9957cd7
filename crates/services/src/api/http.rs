use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use course_core::credentials::{Credentials, NewPassword, RegistrationProfile};
use course_core::model::{Course, CourseId, Identity, LectureId, Module, ModuleId, SessionToken};

use super::wire::{
    AuthBody, CodeBody, CourseBody, EmailRequest, LoginRequest, MessageBody, ModuleBody,
    RegisterRequest, ResetPasswordRequest, UserBody, VerifyCodeRequest, WatchedBody,
};
use super::{ApiConfig, AuthGrant, Backend};
use crate::error::ApiError;

/// `Backend` over HTTP/JSON.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: ApiConfig,
}

impl HttpBackend {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    #[must_use]
    pub fn with_client(client: Client, config: ApiConfig) -> Self {
        Self { client, config }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn get(&self, segments: &[&str]) -> RequestBuilder {
        self.client.get(self.config.endpoint(segments))
    }

    fn post(&self, segments: &[&str]) -> RequestBuilder {
        self.client.post(self.config.endpoint(segments))
    }

    /// Sends the request and decodes a 2xx body as `T`.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(%status, "backend responded");

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    /// Like `send`, for endpoints that answer with `{message}` only.
    async fn send_message(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let body: MessageBody = self.send(request).await?;
        Ok(body.message.unwrap_or_default())
    }
}

fn status_error(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<MessageBody>(body)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_default();
    ApiError::Status { status, message }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn me(&self, token: &SessionToken) -> Result<Identity, ApiError> {
        let user: UserBody = self
            .send(self.get(&["api", "auth", "me"]).bearer_auth(token.expose()))
            .await?;
        Ok(user.into())
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError> {
        let body: AuthBody = self
            .send(self.post(&["api", "auth", "login"]).json(&LoginRequest {
                email: credentials.email(),
                password: credentials.password(),
            }))
            .await?;
        Ok(body.into())
    }

    async fn register(
        &self,
        profile: &RegistrationProfile,
        verification_code: &str,
    ) -> Result<AuthGrant, ApiError> {
        let body: AuthBody = self
            .send(self.post(&["api", "auth", "register"]).json(&RegisterRequest {
                name: profile.name(),
                email: profile.email(),
                password: profile.password(),
                verification_code,
            }))
            .await?;
        Ok(body.into())
    }

    async fn send_verification_code(&self, email: &str) -> Result<String, ApiError> {
        let body: CodeBody = self
            .send(
                self.post(&["api", "auth", "send-verification-code"])
                    .json(&EmailRequest { email }),
            )
            .await?;
        Ok(body.code)
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .send(
                self.post(&["api", "auth", "verify-code"])
                    .json(&VerifyCodeRequest { email, code }),
            )
            .await?;
        Ok(())
    }

    async fn forgot_password(&self, email: &str) -> Result<String, ApiError> {
        self.send_message(
            self.post(&["api", "auth", "forgot-password"])
                .json(&EmailRequest { email }),
        )
        .await
    }

    async fn reset_password(
        &self,
        reset_token: &str,
        password: &NewPassword,
    ) -> Result<String, ApiError> {
        self.send_message(
            self.post(&["api", "auth", "reset-password", reset_token])
                .json(&ResetPasswordRequest {
                    password: password.expose(),
                }),
        )
        .await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
        let courses: Vec<CourseBody> = self.send(self.get(&["api", "courses"])).await?;
        Ok(courses.into_iter().map(Course::from).collect())
    }

    async fn get_course(&self, course_id: &CourseId) -> Result<Course, ApiError> {
        let course: CourseBody = self
            .send(self.get(&["api", "courses", course_id.as_str()]))
            .await?;
        Ok(course.into())
    }

    async fn enrolled_courses(&self, token: &SessionToken) -> Result<Vec<Course>, ApiError> {
        let courses: Vec<CourseBody> = self
            .send(self.get(&["api", "user-courses"]).bearer_auth(token.expose()))
            .await?;
        Ok(courses.into_iter().map(Course::from).collect())
    }

    async fn modules(&self, course_id: &CourseId) -> Result<Vec<Module>, ApiError> {
        let modules: Vec<ModuleBody> = self
            .send(self.get(&["api", "courses", course_id.as_str(), "modules"]))
            .await?;
        Ok(modules.into_iter().map(Module::from).collect())
    }

    async fn enroll(&self, token: &SessionToken, course_id: &CourseId) -> Result<String, ApiError> {
        self.send_message(
            self.post(&["api", "courses", course_id.as_str(), "enroll"])
                .bearer_auth(token.expose()),
        )
        .await
    }

    async fn watched_lectures(&self, token: &SessionToken) -> Result<Vec<LectureId>, ApiError> {
        let body: WatchedBody = self
            .send(self.get(&["api", "watched-videos"]).bearer_auth(token.expose()))
            .await?;
        Ok(body.watched_videos)
    }

    async fn mark_watched(
        &self,
        token: &SessionToken,
        course_id: &CourseId,
        module_id: &ModuleId,
        lecture_id: &LectureId,
    ) -> Result<String, ApiError> {
        self.send_message(
            self.post(&[
                "api",
                "courses",
                course_id.as_str(),
                "modules",
                module_id.as_str(),
                "lectures",
                lecture_id.as_str(),
                "watch",
            ])
            .bearer_auth(token.expose()),
        )
        .await
    }
}
