use chrono::{DateTime, Utc};

use crate::model::{CourseId, LectureId, ModuleId};

/// Catalog entry as published by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub thumbnail: String,
    pub description: String,
    pub price: f64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lecture {
    pub id: LectureId,
    pub number: String,
    pub title: String,
    pub video_url: String,
    pub pdf_urls: Vec<String>,
}

/// A module keeps its lectures in the order the backend sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: ModuleId,
    pub number: String,
    pub title: String,
    pub lectures: Vec<Lecture>,
}

impl Module {
    pub fn lecture_ids(&self) -> impl Iterator<Item = &LectureId> {
        self.lectures.iter().map(|lecture| &lecture.id)
    }

    #[must_use]
    pub fn contains(&self, lecture_id: &LectureId) -> bool {
        self.lectures.iter().any(|lecture| &lecture.id == lecture_id)
    }
}

/// A course together with its ordered modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOutline {
    course_id: CourseId,
    modules: Vec<Module>,
}

impl CourseOutline {
    #[must_use]
    pub fn new(course_id: CourseId, modules: Vec<Module>) -> Self {
        Self { course_id, modules }
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn lectures(&self) -> impl Iterator<Item = &Lecture> {
        self.modules.iter().flat_map(|module| module.lectures.iter())
    }

    /// Finds the module that owns a lecture.
    #[must_use]
    pub fn module_of(&self, lecture_id: &LectureId) -> Option<&Module> {
        self.modules.iter().find(|module| module.contains(lecture_id))
    }

    /// First lecture of the first non-empty module, the one a learner starts on.
    #[must_use]
    pub fn first_lecture(&self) -> Option<&Lecture> {
        self.lectures().next()
    }
}
