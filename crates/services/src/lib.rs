#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod catalog_service;
pub mod error;
pub mod progress_service;
pub mod session_service;

pub use api::{ApiConfig, AuthGrant, Backend, HttpBackend, InMemoryBackend};
pub use app_services::AppServices;
pub use catalog_service::CatalogService;
pub use error::{ApiError, AppServicesError, CatalogError, ConfigError, ProgressError, SessionError};
pub use progress_service::{EnrollOutcome, MarkOutcome, ProgressTracker};
pub use session_service::{SessionManager, SessionState};
