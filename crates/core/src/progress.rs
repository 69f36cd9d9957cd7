//! Watched-lecture bookkeeping and the completion figures derived from it.

use std::collections::HashSet;

use crate::model::{CourseId, CourseOutline, Lecture, LectureId, Module, ModuleId};

/// Lectures the current identity has confirmed as viewed.
///
/// Insert-only: nothing removes an id once it is in the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchedSet {
    ids: HashSet<LectureId>,
}

impl WatchedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id`, returning `false` if it was already present.
    pub fn insert(&mut self, id: LectureId) -> bool {
        self.ids.insert(id)
    }

    #[must_use]
    pub fn contains(&self, id: &LectureId) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LectureId> {
        self.ids.iter()
    }
}

impl FromIterator<LectureId> for WatchedSet {
    fn from_iter<I: IntoIterator<Item = LectureId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

fn percent(watched: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    // Multiply first so exact ratios (2 of 5) come out as exact percentages.
    (watched as f64 * 100.0) / total as f64
}

/// Percentage in `[0, 100]` of the course's distinct lectures present in `watched`.
///
/// A course without lectures reports `0`.
#[must_use]
pub fn compute_progress(course: &CourseOutline, watched: &WatchedSet) -> f64 {
    let lectures: HashSet<&LectureId> = course.lectures().map(|lecture| &lecture.id).collect();
    let seen = lectures.iter().filter(|id| watched.contains(id)).count();
    percent(seen, lectures.len())
}

/// True iff every lecture of `module` is in `watched`.
///
/// A module without lectures is vacuously complete; use
/// [`ModuleProgress::is_empty`] to tell the two apart.
#[must_use]
pub fn is_module_complete(module: &Module, watched: &WatchedSet) -> bool {
    module.lecture_ids().all(|id| watched.contains(id))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub title: String,
    pub watched: usize,
    pub total: usize,
    pub is_complete: bool,
}

impl ModuleProgress {
    #[must_use]
    pub fn measure(module: &Module, watched: &WatchedSet) -> Self {
        let seen = module.lecture_ids().filter(|id| watched.contains(id)).count();
        Self {
            module_id: module.id.clone(),
            title: module.title.clone(),
            watched: seen,
            total: module.lectures.len(),
            is_complete: is_module_complete(module, watched),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    #[must_use]
    pub fn percent(&self) -> f64 {
        percent(self.watched, self.total)
    }
}

/// Aggregated view of course progress, useful for UI.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseProgress {
    pub course_id: CourseId,
    pub percent: f64,
    pub modules: Vec<ModuleProgress>,
    pub completed_modules: usize,
}

impl CourseProgress {
    #[must_use]
    pub fn measure(course: &CourseOutline, watched: &WatchedSet) -> Self {
        let modules: Vec<ModuleProgress> = course
            .modules()
            .iter()
            .map(|module| ModuleProgress::measure(module, watched))
            .collect();
        let completed_modules = modules
            .iter()
            .filter(|module| module.is_complete && !module.is_empty())
            .count();

        Self {
            course_id: course.course_id().clone(),
            percent: compute_progress(course, watched),
            modules,
            completed_modules,
        }
    }

    /// Modules that actually carry lectures.
    #[must_use]
    pub fn countable_modules(&self) -> usize {
        self.modules.iter().filter(|module| !module.is_empty()).count()
    }
}

/// The first lecture, in module then lecture order, not yet watched.
#[must_use]
pub fn next_unwatched<'a>(course: &'a CourseOutline, watched: &WatchedSet) -> Option<&'a Lecture> {
    course.lectures().find(|lecture| !watched.contains(&lecture.id))
}
