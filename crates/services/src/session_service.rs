use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::StatusCode;
use tokio::sync::watch;

use course_core::credentials::{self, Credentials, NewPassword, RegistrationProfile};
use course_core::model::{Identity, IdentityState, SessionToken};
use course_core::{Route, ValidationError};
use storage::repository::TokenStore;

use crate::api::{AuthGrant, Backend};
use crate::error::SessionError;

/// Identity and token as one value, so observers never see one without the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    identity: IdentityState,
    token: Option<SessionToken>,
}

impl SessionState {
    fn present(grant: AuthGrant) -> Self {
        Self {
            identity: IdentityState::Present(grant.identity),
            token: Some(grant.token),
        }
    }

    fn absent() -> Self {
        Self {
            identity: IdentityState::Absent,
            token: None,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityState {
        &self.identity
    }

    #[must_use]
    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }
}

#[derive(Debug, Default)]
struct EmailVerification {
    email: String,
    code: String,
    verified: bool,
}

/// Clears the submit flag when the outstanding request resolves.
struct SubmitGuard<'a>(&'a AtomicBool);

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the authenticated identity and its persisted token.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    tokens: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
    submitting: AtomicBool,
    verification: Mutex<Option<EmailVerification>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, tokens: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            tokens,
            state,
            submitting: AtomicBool::new(false),
            verification: Mutex::new(None),
        }
    }

    /// Observe session changes. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn identity_state(&self) -> IdentityState {
        self.state.borrow().identity.clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.identity().cloned()
    }

    #[must_use]
    pub fn token(&self) -> Option<SessionToken> {
        self.state.borrow().token.clone()
    }

    /// True while a login or registration request is outstanding.
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    fn verification(&self) -> MutexGuard<'_, Option<EmailVerification>> {
        self.verification
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Revalidate the persisted token, if any, and settle the identity.
    ///
    /// Leaves the state `Absent` or `Present`, never `Unknown`, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the token store cannot be read and
    /// `SessionError::Api` if the backend could not be reached; the identity
    /// is `Absent` in both cases.
    pub async fn bootstrap(&self) -> Result<IdentityState, SessionError> {
        let stored = match self.tokens.load().await {
            Ok(stored) => stored,
            Err(err) => {
                self.state.send_replace(SessionState::absent());
                return Err(err.into());
            }
        };

        let Some(stored) = stored else {
            tracing::debug!("no stored session token");
            self.state.send_replace(SessionState::absent());
            return Ok(IdentityState::Absent);
        };

        match self.backend.me(&stored.token).await {
            Ok(identity) => {
                tracing::info!(role = %identity.role(), "session restored");
                let state = SessionState::present(AuthGrant {
                    identity,
                    token: stored.token,
                });
                let identity = state.identity.clone();
                self.state.send_replace(state);
                Ok(identity)
            }
            Err(err) if err.status().is_some() => {
                tracing::warn!(status = ?err.status(), "stored session token rejected; discarding");
                self.state.send_replace(SessionState::absent());
                self.tokens.clear().await?;
                Ok(IdentityState::Absent)
            }
            Err(err) => {
                // Keep the token: the backend never judged it.
                tracing::warn!(error = %err, "could not revalidate session token");
                self.state.send_replace(SessionState::absent());
                Err(err.into())
            }
        }
    }

    /// Authenticate with the backend and persist the returned token.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidCredentials` when the backend rejects the
    /// credentials, `SessionError::Busy` when another submit is outstanding,
    /// and `Api`/`Storage` errors otherwise. The state is untouched on error.
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity, SessionError> {
        let _guard = SubmitGuard::acquire(&self.submitting)?;
        let grant = self.backend.login(credentials).await.map_err(|err| {
            match err.status() {
                Some(StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND) => {
                    SessionError::InvalidCredentials
                }
                _ => SessionError::Api(err),
            }
        })?;
        let identity = self.commit(grant).await?;
        tracing::info!(role = %identity.role(), "logged in");
        Ok(identity)
    }

    /// Persist then publish a grant; nothing is published if persisting fails.
    async fn commit(&self, grant: AuthGrant) -> Result<Identity, SessionError> {
        self.tokens.save(&grant.token).await?;
        let identity = grant.identity.clone();
        self.state.send_replace(SessionState::present(grant));
        Ok(identity)
    }

    /// Drop the identity and token, then point the shell at the landing view.
    ///
    /// The in-memory session is cleared before anything else happens.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the persisted token could not be
    /// removed; the in-memory session is cleared regardless.
    pub async fn logout(&self) -> Result<Route, SessionError> {
        self.state.send_replace(SessionState::absent());
        tracing::info!("logged out");
        self.tokens.clear().await?;
        Ok(Route::Landing)
    }

    /// Forget a token the backend no longer accepts.
    pub async fn invalidate(&self) {
        if self.state.borrow().token.is_none() {
            return;
        }
        tracing::warn!("session token rejected by backend; signing out");
        self.state.send_replace(SessionState::absent());
        if let Err(err) = self.tokens.clear().await {
            tracing::warn!(error = %err, "failed to remove rejected session token");
        }
    }

    /// Re-read the identity for the current token, e.g. after its enrollments changed.
    ///
    /// Returns `None` when signed out, or when the session changed while the
    /// request was in flight; the state is then left alone.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` on failure; a 401 also signs the session out.
    pub async fn refresh_identity(&self) -> Result<Option<Identity>, SessionError> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        match self.backend.me(&token).await {
            Ok(identity) => {
                let applied = self.state.send_if_modified(|state| {
                    if state.token.as_ref() != Some(&token) {
                        return false;
                    }
                    state.identity = IdentityState::Present(identity.clone());
                    true
                });
                Ok(applied.then_some(identity))
            }
            Err(err) => {
                if err.is_unauthorized() {
                    self.invalidate().await;
                }
                Err(err.into())
            }
        }
    }

    /// Ask the backend to email a verification code; returns the issued code.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for a malformed email, or `Api` on failure.
    pub async fn send_verification_code(&self, email: &str) -> Result<String, SessionError> {
        let email = email.trim();
        credentials::validate_email(email)?;
        let code = self.backend.send_verification_code(email).await?;
        *self.verification() = Some(EmailVerification {
            email: email.to_string(),
            code: code.clone(),
            verified: false,
        });
        tracing::debug!("verification code issued");
        Ok(code)
    }

    /// Confirm the code the user received for `email`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for a malformed email or an empty
    /// code, or `Api` when the backend rejects the code.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<(), SessionError> {
        let email = email.trim();
        let code = code.trim();
        credentials::validate_email(email)?;
        if code.is_empty() {
            return Err(ValidationError::MissingVerificationCode.into());
        }
        self.backend.verify_code(email, code).await?;
        *self.verification() = Some(EmailVerification {
            email: email.to_string(),
            code: code.to_string(),
            verified: true,
        });
        Ok(())
    }

    #[must_use]
    pub fn is_email_verified(&self, email: &str) -> bool {
        self.verification()
            .as_ref()
            .is_some_and(|v| v.verified && v.email == email.trim())
    }

    /// Create an account for a profile whose email was verified first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmailNotVerified` without calling the backend if
    /// the profile's email has not been verified; otherwise as `login`.
    pub async fn register(&self, profile: &RegistrationProfile) -> Result<Identity, SessionError> {
        let code = self
            .verification()
            .as_ref()
            .filter(|v| v.verified && v.email == profile.email())
            .map(|v| v.code.clone())
            .ok_or(SessionError::EmailNotVerified)?;

        let _guard = SubmitGuard::acquire(&self.submitting)?;
        let grant = self.backend.register(profile, &code).await?;
        let identity = self.commit(grant).await?;
        *self.verification() = None;
        tracing::info!("registered new account");
        Ok(identity)
    }

    /// Request a password-reset email; returns the backend's message.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for a malformed email, or `Api` on failure.
    pub async fn forgot_password(&self, email: &str) -> Result<String, SessionError> {
        let email = email.trim();
        credentials::validate_email(email)?;
        Ok(self.backend.forgot_password(email).await?)
    }

    /// Set a new password using the token from the reset email.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for an empty reset token, or `Api` on failure.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        password: &NewPassword,
    ) -> Result<String, SessionError> {
        let reset_token = reset_token.trim();
        if reset_token.is_empty() {
            return Err(ValidationError::EmptyField("reset token").into());
        }
        Ok(self.backend.reset_password(reset_token, password).await?)
    }
}
