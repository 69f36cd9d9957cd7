use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use course_core::credentials::{Credentials, NewPassword, RegistrationProfile};
use course_core::model::{
    Course, CourseId, Identity, LectureId, Module, ModuleId, Role, SessionToken,
};

use super::{AuthGrant, Backend};
use crate::error::{ALREADY_WATCHED_MESSAGE, ApiError};

#[derive(Debug, Clone)]
struct Account {
    name: String,
    password: String,
    role: Role,
    enrolled: BTreeSet<CourseId>,
    watched: Vec<LectureId>,
}

#[derive(Default)]
struct World {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, String>,
    courses: Vec<Course>,
    modules: HashMap<CourseId, Vec<Module>>,
    issued_codes: HashMap<String, String>,
    next_token: u64,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
    delays: HashMap<&'static str, Duration>,
}

/// In-process backend for testing and prototyping.
///
/// Behaves like the real service for the happy paths, counts every call per
/// endpoint, and can be told to fail or stall a given endpoint.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    world: Arc<Mutex<World>>,
}

fn status(status: StatusCode, message: &str) -> ApiError {
    ApiError::Status {
        status,
        message: message.to_string(),
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an account that can log in immediately.
    pub fn add_account(&self, name: &str, email: &str, password: &str, role: Role) {
        self.world().accounts.insert(
            email.to_string(),
            Account {
                name: name.to_string(),
                password: password.to_string(),
                role,
                enrolled: BTreeSet::new(),
                watched: Vec::new(),
            },
        );
    }

    /// Issues a session token for an existing account without a login call.
    #[must_use]
    pub fn issue_token(&self, email: &str) -> SessionToken {
        let mut world = self.world();
        world.next_token += 1;
        let token = format!("token-{}", world.next_token);
        world.sessions.insert(token.clone(), email.to_string());
        SessionToken::new(token)
    }

    /// Invalidates every issued token, as an expired signing key would.
    pub fn revoke_all_tokens(&self) {
        self.world().sessions.clear();
    }

    pub fn add_course(&self, course: Course, modules: Vec<Module>) {
        let mut world = self.world();
        world.modules.insert(course.id.clone(), modules);
        world.courses.push(course);
    }

    /// Watched lectures the server has recorded for `email`.
    #[must_use]
    pub fn recorded_watches(&self, email: &str) -> Vec<LectureId> {
        self.world()
            .accounts
            .get(email)
            .map(|account| account.watched.clone())
            .unwrap_or_default()
    }

    /// Records a watch server-side, as another tab would.
    pub fn record_watch(&self, email: &str, lecture_id: LectureId) {
        if let Some(account) = self.world().accounts.get_mut(email) {
            account.watched.push(lecture_id);
        }
    }

    /// Number of calls received by `endpoint` (the `Backend` method name).
    #[must_use]
    pub fn calls(&self, endpoint: &str) -> usize {
        self.world().calls.get(endpoint).copied().unwrap_or(0)
    }

    /// Makes the next call to `endpoint` fail with `error`.
    pub fn fail_next(&self, endpoint: &'static str, error: ApiError) {
        self.world()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Holds every call to `endpoint` for `delay` before it is handled.
    pub fn delay(&self, endpoint: &'static str, delay: Duration) {
        self.world().delays.insert(endpoint, delay);
    }

    async fn enter(&self, endpoint: &'static str) -> Result<(), ApiError> {
        let delay = {
            let mut world = self.world();
            *world.calls.entry(endpoint).or_default() += 1;
            world.delays.get(endpoint).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self
            .world()
            .failures
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn account_for(world: &World, token: &SessionToken) -> Result<String, ApiError> {
        world
            .sessions
            .get(token.expose())
            .cloned()
            .ok_or_else(|| status(StatusCode::UNAUTHORIZED, "Invalid token"))
    }

    fn identity_of(email: &str, account: &Account) -> Identity {
        Identity::new(
            account.name.clone(),
            email,
            account.role,
            account.enrolled.iter().cloned(),
        )
    }

    fn grant(world: &mut World, email: &str) -> Result<AuthGrant, ApiError> {
        let account = world
            .accounts
            .get(email)
            .ok_or_else(|| status(StatusCode::NOT_FOUND, "User not found"))?;
        let identity = Self::identity_of(email, account);
        world.next_token += 1;
        let token = format!("token-{}", world.next_token);
        world.sessions.insert(token.clone(), email.to_string());
        Ok(AuthGrant {
            identity,
            token: SessionToken::new(token),
        })
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn me(&self, token: &SessionToken) -> Result<Identity, ApiError> {
        self.enter("me").await?;
        let world = self.world();
        let email = Self::account_for(&world, token)?;
        let account = world
            .accounts
            .get(&email)
            .ok_or_else(|| status(StatusCode::UNAUTHORIZED, "Invalid token"))?;
        Ok(Self::identity_of(&email, account))
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError> {
        self.enter("login").await?;
        let mut world = self.world();
        let matches = world
            .accounts
            .get(credentials.email())
            .is_some_and(|account| account.password == credentials.password());
        if !matches {
            return Err(status(StatusCode::BAD_REQUEST, "Invalid credentials"));
        }
        Self::grant(&mut world, credentials.email())
    }

    async fn register(
        &self,
        profile: &RegistrationProfile,
        verification_code: &str,
    ) -> Result<AuthGrant, ApiError> {
        self.enter("register").await?;
        let mut world = self.world();
        if world.accounts.contains_key(profile.email()) {
            return Err(status(StatusCode::BAD_REQUEST, "User already exists"));
        }
        if world.issued_codes.get(profile.email()).map(String::as_str) != Some(verification_code) {
            return Err(status(StatusCode::BAD_REQUEST, "Invalid verification code"));
        }
        world.accounts.insert(
            profile.email().to_string(),
            Account {
                name: profile.name().to_string(),
                password: profile.password().to_string(),
                role: Role::User,
                enrolled: BTreeSet::new(),
                watched: Vec::new(),
            },
        );
        Self::grant(&mut world, profile.email())
    }

    async fn send_verification_code(&self, email: &str) -> Result<String, ApiError> {
        self.enter("send_verification_code").await?;
        let mut world = self.world();
        let code = format!("{:06}", 100_000 + world.issued_codes.len());
        world.issued_codes.insert(email.to_string(), code.clone());
        Ok(code)
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<(), ApiError> {
        self.enter("verify_code").await?;
        let world = self.world();
        if world.issued_codes.get(email).map(String::as_str) == Some(code) {
            Ok(())
        } else {
            Err(status(StatusCode::BAD_REQUEST, "Invalid verification code"))
        }
    }

    async fn forgot_password(&self, email: &str) -> Result<String, ApiError> {
        self.enter("forgot_password").await?;
        if self.world().accounts.contains_key(email) {
            Ok("Password reset email sent".to_string())
        } else {
            Err(status(StatusCode::NOT_FOUND, "User not found"))
        }
    }

    async fn reset_password(
        &self,
        reset_token: &str,
        password: &NewPassword,
    ) -> Result<String, ApiError> {
        self.enter("reset_password").await?;
        let mut world = self.world();
        let email = world
            .sessions
            .get(reset_token)
            .cloned()
            .ok_or_else(|| status(StatusCode::BAD_REQUEST, "Invalid or expired token"))?;
        if let Some(account) = world.accounts.get_mut(&email) {
            account.password = password.expose().to_string();
        }
        Ok("Password has been reset".to_string())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
        self.enter("list_courses").await?;
        Ok(self.world().courses.clone())
    }

    async fn get_course(&self, course_id: &CourseId) -> Result<Course, ApiError> {
        self.enter("get_course").await?;
        self.world()
            .courses
            .iter()
            .find(|course| &course.id == course_id)
            .cloned()
            .ok_or_else(|| status(StatusCode::NOT_FOUND, "Course not found"))
    }

    async fn enrolled_courses(&self, token: &SessionToken) -> Result<Vec<Course>, ApiError> {
        self.enter("enrolled_courses").await?;
        let world = self.world();
        let email = Self::account_for(&world, token)?;
        let enrolled = world
            .accounts
            .get(&email)
            .map(|account| account.enrolled.clone())
            .unwrap_or_default();
        Ok(world
            .courses
            .iter()
            .filter(|course| enrolled.contains(&course.id))
            .cloned()
            .collect())
    }

    async fn modules(&self, course_id: &CourseId) -> Result<Vec<Module>, ApiError> {
        self.enter("modules").await?;
        self.world()
            .modules
            .get(course_id)
            .cloned()
            .ok_or_else(|| status(StatusCode::NOT_FOUND, "Course not found"))
    }

    async fn enroll(&self, token: &SessionToken, course_id: &CourseId) -> Result<String, ApiError> {
        self.enter("enroll").await?;
        let mut world = self.world();
        let email = Self::account_for(&world, token)?;
        if !world.modules.contains_key(course_id) {
            return Err(status(StatusCode::NOT_FOUND, "Course not found"));
        }
        let account = world
            .accounts
            .get_mut(&email)
            .ok_or_else(|| status(StatusCode::UNAUTHORIZED, "Invalid token"))?;
        if account.enrolled.insert(course_id.clone()) {
            Ok("Enrolled successfully".to_string())
        } else {
            Err(status(StatusCode::BAD_REQUEST, "Already enrolled in this course"))
        }
    }

    async fn watched_lectures(&self, token: &SessionToken) -> Result<Vec<LectureId>, ApiError> {
        self.enter("watched_lectures").await?;
        let world = self.world();
        let email = Self::account_for(&world, token)?;
        Ok(world
            .accounts
            .get(&email)
            .map(|account| account.watched.clone())
            .unwrap_or_default())
    }

    async fn mark_watched(
        &self,
        token: &SessionToken,
        course_id: &CourseId,
        module_id: &ModuleId,
        lecture_id: &LectureId,
    ) -> Result<String, ApiError> {
        self.enter("mark_watched").await?;
        let mut world = self.world();
        let email = Self::account_for(&world, token)?;
        let known = world
            .modules
            .get(course_id)
            .and_then(|modules| modules.iter().find(|module| &module.id == module_id))
            .is_some_and(|module| module.contains(lecture_id));
        if !known {
            return Err(status(StatusCode::NOT_FOUND, "Lecture not found"));
        }
        let account = world
            .accounts
            .get_mut(&email)
            .ok_or_else(|| status(StatusCode::UNAUTHORIZED, "Invalid token"))?;
        if account.watched.contains(lecture_id) {
            return Err(status(StatusCode::BAD_REQUEST, ALREADY_WATCHED_MESSAGE));
        }
        account.watched.push(lecture_id.clone());
        Ok("Video marked as watched".to_string())
    }
}
