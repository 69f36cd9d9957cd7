use std::sync::Arc;

use storage::repository::Storage;

use crate::api::{ApiConfig, Backend, HttpBackend};
use crate::catalog_service::CatalogService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressTracker;
use crate::session_service::SessionManager;

/// Composition root handed to views as an explicit context object.
#[derive(Clone)]
pub struct AppServices {
    session: Arc<SessionManager>,
    progress: Arc<ProgressTracker>,
    catalog: Arc<CatalogService>,
}

impl AppServices {
    /// Build services talking HTTP to the backend at `api_url` (or
    /// `COURSE_API_URL`), persisting the session token in `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the API url is unusable, the HTTP client
    /// cannot be built, or storage initialization fails.
    pub async fn new_sqlite(api_url: Option<&str>, db_url: &str) -> Result<Self, AppServicesError> {
        let config = match api_url {
            Some(raw) => ApiConfig::new(raw)?,
            None => ApiConfig::from_env()?,
        };
        let client = reqwest::Client::builder()
            .user_agent(concat!("course-services/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppServicesError::Client(err.to_string()))?;
        tracing::info!(api = %config.base_url(), "using course backend");

        let storage = Storage::sqlite(db_url).await?;
        let backend: Arc<dyn Backend> = Arc::new(HttpBackend::with_client(client, config));
        Ok(Self::from_parts(backend, storage))
    }

    /// Wire services over an arbitrary backend and storage.
    #[must_use]
    pub fn from_parts(backend: Arc<dyn Backend>, storage: Storage) -> Self {
        let session = Arc::new(SessionManager::new(
            Arc::clone(&backend),
            Arc::clone(&storage.tokens),
        ));
        let progress = Arc::new(ProgressTracker::new(
            Arc::clone(&backend),
            Arc::clone(&session),
        ));
        let catalog = Arc::new(CatalogService::new(backend));

        Self {
            session,
            progress,
            catalog,
        }
    }

    #[must_use]
    pub fn session(&self) -> Arc<SessionManager> {
        Arc::clone(&self.session)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }
}
