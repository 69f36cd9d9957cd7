//! Form input validated before it is sent anywhere.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 3;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// Checks the shape of an email address.
///
/// # Errors
///
/// Returns `ValidationError::InvalidEmail` if the address is malformed.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Email and password for the login endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// # Errors
    ///
    /// Returns `ValidationError` for a malformed email or a short password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Result<Self, ValidationError> {
        let email = email.into().trim().to_owned();
        let password = password.into();
        validate_email(&email)?;
        validate_password(&password)?;
        Ok(Self { email, password })
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"**redacted**")
            .finish()
    }
}

/// Sign-up form contents.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationProfile {
    name: String,
    email: String,
    password: String,
}

impl RegistrationProfile {
    /// # Errors
    ///
    /// Returns `ValidationError` if the name, email or password is rejected.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_owned();
        let email = email.into().trim().to_owned();
        let password = password.into();

        if name.chars().count() < MIN_NAME_LEN {
            return Err(ValidationError::NameTooShort { min: MIN_NAME_LEN });
        }
        validate_email(&email)?;
        validate_password(&password)?;

        Ok(Self {
            name,
            email,
            password,
        })
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
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for RegistrationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationProfile")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"**redacted**")
            .finish()
    }
}

/// New password typed twice on the reset form.
#[derive(Clone, PartialEq, Eq)]
pub struct NewPassword(String);

impl NewPassword {
    /// # Errors
    ///
    /// Returns `ValidationError::PasswordMismatch` when the two entries differ,
    /// or `PasswordTooShort` for a short password.
    pub fn new(password: impl Into<String>, confirmation: &str) -> Result<Self, ValidationError> {
        let password = password.into();
        if password != confirmation {
            return Err(ValidationError::PasswordMismatch);
        }
        validate_password(&password)?;
        Ok(Self(password))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NewPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NewPassword(**redacted**)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(validate_email("a@b.co").is_ok());
        assert_eq!(validate_email("a@b"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email("a b@c.de"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email(""), Err(ValidationError::InvalidEmail));
    }

    #[test]
    fn credentials_require_six_char_password() {
        let err = Credentials::new("ada@example.com", "12345").unwrap_err();
        assert_eq!(err, ValidationError::PasswordTooShort { min: 6 });
        assert_eq!(err.to_string(), "Password must be at least 6 characters long.");
        assert!(Credentials::new(" ada@example.com ", "123456").is_ok());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("ada@example.com", "hunter22").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("ada@example.com"));
        assert!(!debug.contains("hunter22"));
    }

    #[test]
    fn registration_checks_name_first() {
        let err = RegistrationProfile::new(" Al ", "bad", "1").unwrap_err();
        assert_eq!(err, ValidationError::NameTooShort { min: 3 });
        let ok = RegistrationProfile::new(" Alan ", "alan@example.com", "secret1").unwrap();
        assert_eq!(ok.name(), "Alan");
    }

    #[test]
    fn reset_requires_matching_confirmation() {
        assert_eq!(
            NewPassword::new("secret1", "secret2").unwrap_err(),
            ValidationError::PasswordMismatch
        );
        assert_eq!(NewPassword::new("secret1", "secret1").unwrap().expose(), "secret1");
    }
}
