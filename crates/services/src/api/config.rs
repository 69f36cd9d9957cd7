use std::env;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: Url,
}

impl ApiConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` if `raw` is not an absolute http(s) style URL.
    pub fn new(raw: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidBaseUrl {
            raw: raw.to_string(),
            source,
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::NotABase(raw.to_string()));
        }
        Ok(Self { base_url })
    }

    /// Reads `COURSE_API_URL`, falling back to a local development backend.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the variable holds an unusable URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("COURSE_API_URL") {
            Ok(raw) if !raw.trim().is_empty() => Self::new(&raw),
            _ => Self::new(DEFAULT_BASE_URL),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    #[must_use]
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
