use std::sync::Arc;

use course_core::model::{Course, CourseId, CourseOutline};

use crate::api::Backend;
use crate::error::CatalogError;

/// Read-only access to the public course catalog.
#[derive(Clone)]
pub struct CatalogService {
    backend: Arc<dyn Backend>,
}

impl CatalogService {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// List every published course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Api` if the backend request fails.
    pub async fn list_courses(&self) -> Result<Vec<Course>, CatalogError> {
        Ok(self.backend.list_courses().await?)
    }

    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Api` if the backend request fails, including 404.
    pub async fn get_course(&self, course_id: &CourseId) -> Result<Course, CatalogError> {
        Ok(self.backend.get_course(course_id).await?)
    }

    /// A course's modules in backend order, without opening it for progress tracking.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Api` if the backend request fails.
    pub async fn outline(&self, course_id: &CourseId) -> Result<CourseOutline, CatalogError> {
        let modules = self.backend.modules(course_id).await?;
        Ok(CourseOutline::new(course_id.clone(), modules))
    }
}
