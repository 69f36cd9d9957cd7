use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use course_core::model::{Course, CourseId, CourseOutline, LectureId, SessionToken};
use course_core::progress::{self, CourseProgress, WatchedSet};

use crate::api::Backend;
use crate::error::{ALREADY_WATCHED_MESSAGE, ApiError, ProgressError};
use crate::session_service::SessionManager;

/// Result of `ProgressTracker::mark_watched`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The backend recorded the lecture just now.
    Marked,
    /// The lecture was already watched, locally or according to the backend.
    AlreadyWatched,
    /// A mark request for this lecture is still outstanding.
    InFlight,
}

/// Result of `ProgressTracker::enroll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollOutcome {
    Enrolled,
    AlreadyEnrolled,
}

/// Request ordering for a single state slot: the newest resolved request wins.
#[derive(Debug, Default)]
struct Slot {
    issued: u64,
    applied: u64,
}

impl Slot {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Claims the slot for `ticket` unless a newer request already wrote it.
    fn try_apply(&mut self, ticket: u64) -> bool {
        if ticket < self.applied {
            return false;
        }
        self.applied = ticket;
        true
    }
}

#[derive(Default)]
struct TrackerState {
    /// Session token the rest of the state belongs to.
    owner: Option<SessionToken>,
    enrolled: Vec<Course>,
    enrolled_slot: Slot,
    /// Bumped whenever the open course changes.
    generation: u64,
    active: Option<CourseOutline>,
    watched: WatchedSet,
    watched_slot: Slot,
    pending: HashSet<LectureId>,
}

impl TrackerState {
    /// Drop everything learned under the previous session.
    fn reset_for(&mut self, owner: Option<SessionToken>) {
        self.owner = owner;
        self.enrolled.clear();
        self.generation += 1;
        self.active = None;
        self.watched = WatchedSet::new();
        self.pending.clear();
    }
}

/// Enrolled courses and watched lectures for the current identity.
///
/// State is scoped to the session token: once the session signs out or
/// switches identity, the next access starts from empty.
pub struct ProgressTracker {
    backend: Arc<dyn Backend>,
    session: Arc<SessionManager>,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, session: Arc<SessionManager>) -> Self {
        Self {
            backend,
            session,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        let owner = self.session.token();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.owner != owner {
            tracing::debug!("session changed; dropping progress state");
            state.reset_for(owner);
        }
        state
    }

    fn require_token(&self) -> Result<SessionToken, ProgressError> {
        self.session.token().ok_or(ProgressError::NotAuthenticated)
    }

    /// Signs the session out on a 401 before handing the error back.
    async fn reject(&self, err: ApiError) -> ProgressError {
        if err.is_unauthorized() {
            self.session.invalidate().await;
        }
        ProgressError::Api(err)
    }

    #[must_use]
    pub fn enrolled_courses(&self) -> Vec<Course> {
        self.state().enrolled.clone()
    }

    #[must_use]
    pub fn active_course(&self) -> Option<CourseOutline> {
        self.state().active.clone()
    }

    #[must_use]
    pub fn watched(&self) -> WatchedSet {
        self.state().watched.clone()
    }

    /// True while a mark request for `lecture_id` is outstanding.
    #[must_use]
    pub fn is_marking(&self, lecture_id: &LectureId) -> bool {
        self.state().pending.contains(lecture_id)
    }

    /// Progress of the open course, derived from the current modules and watched set.
    #[must_use]
    pub fn progress(&self) -> Option<CourseProgress> {
        let state = self.state();
        state
            .active
            .as_ref()
            .map(|course| CourseProgress::measure(course, &state.watched))
    }

    /// Replace the enrolled-course list with the backend's.
    ///
    /// Does nothing without a session token.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Api` if the request fails; the previous list is kept.
    pub async fn fetch_enrolled_courses(&self) -> Result<(), ProgressError> {
        let Some(token) = self.session.token() else {
            return Ok(());
        };
        let ticket = self.state().enrolled_slot.issue();

        let courses = match self.backend.enrolled_courses(&token).await {
            Ok(courses) => courses,
            Err(err) => return Err(self.reject(err).await),
        };

        let mut state = self.state();
        if state.owner.as_ref() != Some(&token) {
            tracing::debug!("ignoring enrolled-courses response for a previous session");
        } else if state.enrolled_slot.try_apply(ticket) {
            tracing::debug!(count = courses.len(), "enrolled courses refreshed");
            state.enrolled = courses;
        } else {
            tracing::debug!("ignoring superseded enrolled-courses response");
        }
        Ok(())
    }

    /// Make `course_id` the open course: load its modules, then its watched lectures.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Superseded` if another course was opened while
    /// the modules were loading, or `Api` if they could not be fetched.
    pub async fn open_course(&self, course_id: &CourseId) -> Result<CourseProgress, ProgressError> {
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.generation
        };

        let modules = match self.backend.modules(course_id).await {
            Ok(modules) => modules,
            Err(err) => return Err(self.reject(err).await),
        };

        {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!(%course_id, "course switched while modules were loading");
                return Err(ProgressError::Superseded);
            }
            state.active = Some(CourseOutline::new(course_id.clone(), modules));
            state.watched = WatchedSet::new();
            state.pending.clear();
        }

        if self.session.token().is_some() {
            // Failure already left an empty set behind; progress still renders.
            if let Err(err) = self.fetch_watched_lectures(course_id).await {
                tracing::warn!(%course_id, error = %err, "watched lectures unavailable");
            }
        }

        self.progress().ok_or(ProgressError::Superseded)
    }

    /// Reload the watched set for the open course.
    ///
    /// On failure the set is reset to empty rather than left partially stale.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a token, `NoActiveCourse` if
    /// `course_id` is not the open course, `Superseded` if the course changed
    /// meanwhile, or `Api` on request failure.
    pub async fn fetch_watched_lectures(&self, course_id: &CourseId) -> Result<(), ProgressError> {
        let token = self.require_token()?;
        let (generation, ticket) = {
            let mut state = self.state();
            let is_open = state
                .active
                .as_ref()
                .is_some_and(|course| course.course_id() == course_id);
            if !is_open {
                return Err(ProgressError::NoActiveCourse);
            }
            (state.generation, state.watched_slot.issue())
        };

        let result = self.backend.watched_lectures(&token).await;

        {
            let mut state = self.state();
            if state.generation != generation || !state.watched_slot.try_apply(ticket) {
                tracing::debug!(%course_id, "ignoring superseded watched-lectures response");
                return Err(ProgressError::Superseded);
            }
            match &result {
                Ok(ids) => {
                    // Union keeps lectures confirmed locally after the request went out.
                    for id in ids {
                        state.watched.insert(id.clone());
                    }
                }
                Err(_) => {
                    tracing::warn!(%course_id, "resetting watched lectures after failed fetch");
                    state.watched = WatchedSet::new();
                }
            }
        }

        match result {
            Ok(_) => Ok(()),
            Err(err) => Err(self.reject(err).await),
        }
    }

    /// Mark a lecture of the open course as watched.
    ///
    /// The lecture enters the watched set only once the backend confirms it,
    /// either as newly recorded or as already watched.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveCourse`, `UnknownLecture`, or `NotAuthenticated`
    /// without calling the backend; `Api` if the backend rejects the request.
    pub async fn mark_watched(&self, lecture_id: &LectureId) -> Result<MarkOutcome, ProgressError> {
        let (generation, token, course_id, module_id) = {
            let mut state = self.state();
            let course = state.active.as_ref().ok_or(ProgressError::NoActiveCourse)?;
            let module_id = course
                .module_of(lecture_id)
                .map(|module| module.id.clone())
                .ok_or_else(|| ProgressError::UnknownLecture(lecture_id.to_string()))?;
            let course_id = course.course_id().clone();

            if state.watched.contains(lecture_id) {
                return Ok(MarkOutcome::AlreadyWatched);
            }
            if state.pending.contains(lecture_id) {
                return Ok(MarkOutcome::InFlight);
            }
            let token = state.owner.clone().ok_or(ProgressError::NotAuthenticated)?;
            state.pending.insert(lecture_id.clone());
            (state.generation, token, course_id, module_id)
        };

        let result = self
            .backend
            .mark_watched(&token, &course_id, &module_id, lecture_id)
            .await;

        let outcome = match result {
            Ok(message) if message.trim() == ALREADY_WATCHED_MESSAGE => MarkOutcome::AlreadyWatched,
            Ok(_) => MarkOutcome::Marked,
            Err(err) if err.is_already_watched() => MarkOutcome::AlreadyWatched,
            Err(err) => {
                self.state().pending.remove(lecture_id);
                return Err(self.reject(err).await);
            }
        };

        let mut state = self.state();
        state.pending.remove(lecture_id);
        if state.generation == generation {
            state.watched.insert(lecture_id.clone());
            tracing::debug!(%course_id, %lecture_id, ?outcome, "lecture watched");
        } else {
            tracing::debug!(%course_id, %lecture_id, "course switched before watch confirmed");
        }
        Ok(outcome)
    }

    /// Enroll the current identity in a course, then refresh the enrolled list
    /// and the identity's own enrollment set.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without calling the backend when signed out,
    /// or `Api` if the backend refuses for any reason other than an existing enrollment.
    pub async fn enroll(&self, course_id: &CourseId) -> Result<EnrollOutcome, ProgressError> {
        let token = self.require_token()?;
        let outcome = match self.backend.enroll(&token, course_id).await {
            Ok(_) => EnrollOutcome::Enrolled,
            Err(err) if err.is_already_enrolled() => EnrollOutcome::AlreadyEnrolled,
            Err(err) => return Err(self.reject(err).await),
        };
        tracing::info!(%course_id, ?outcome, "enrollment confirmed");

        if let Err(err) = self.fetch_enrolled_courses().await {
            tracing::warn!(error = %err, "could not refresh enrolled courses");
        }
        if let Err(err) = self.session.refresh_identity().await {
            tracing::warn!(error = %err, "could not refresh identity after enrolling");
        }
        Ok(outcome)
    }

    /// Percentage of the open course watched, `0` when nothing is open.
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        let state = self.state();
        state
            .active
            .as_ref()
            .map_or(0.0, |course| progress::compute_progress(course, &state.watched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use course_core::model::{Lecture, Module, ModuleId, Role};
    use reqwest::StatusCode;
    use storage::repository::InMemoryTokenStore;

    use crate::api::InMemoryBackend;

    const EMAIL: &str = "ada@example.com";

    fn course(id: &str) -> Course {
        Course {
            id: CourseId::new(id),
            title: format!("Course {id}"),
            thumbnail: String::new(),
            description: String::new(),
            price: 0.0,
            created_at: None,
        }
    }

    fn module(id: &str, lectures: &[&str]) -> Module {
        Module {
            id: ModuleId::new(id),
            number: "1".into(),
            title: id.to_string(),
            lectures: lectures
                .iter()
                .map(|lecture| Lecture {
                    id: LectureId::new(*lecture),
                    number: "1".into(),
                    title: (*lecture).to_string(),
                    video_url: String::new(),
                    pdf_urls: Vec::new(),
                })
                .collect(),
        }
    }

    async fn signed_in() -> (InMemoryBackend, ProgressTracker) {
        let backend = InMemoryBackend::new();
        backend.add_account("Ada", EMAIL, "secret1", Role::User);
        backend.add_course(course("c1"), vec![module("m1", &["L1", "L2", "L3", "L4", "L5"])]);
        backend.add_course(course("c2"), vec![module("m9", &["X1"])]);
        let store = InMemoryTokenStore::with_token(backend.issue_token(EMAIL));
        let shared: Arc<dyn Backend> = Arc::new(backend.clone());
        let session = Arc::new(SessionManager::new(Arc::clone(&shared), Arc::new(store)));
        session.bootstrap().await.unwrap();
        (backend, ProgressTracker::new(shared, session))
    }

    #[tokio::test]
    async fn fetch_enrolled_without_token_makes_no_call() {
        let backend = InMemoryBackend::new();
        let shared: Arc<dyn Backend> = Arc::new(backend.clone());
        let session = Arc::new(SessionManager::new(
            Arc::clone(&shared),
            Arc::new(InMemoryTokenStore::new()),
        ));
        let tracker = ProgressTracker::new(shared, session);

        tracker.fetch_enrolled_courses().await.unwrap();
        assert!(tracker.enrolled_courses().is_empty());
        assert_eq!(backend.calls("enrolled_courses"), 0);
    }

    #[tokio::test]
    async fn marking_twice_calls_backend_once() {
        let (backend, tracker) = signed_in().await;
        tracker.open_course(&CourseId::new("c1")).await.unwrap();

        let lecture = LectureId::new("L1");
        assert_eq!(tracker.mark_watched(&lecture).await.unwrap(), MarkOutcome::Marked);
        assert_eq!(
            tracker.mark_watched(&lecture).await.unwrap(),
            MarkOutcome::AlreadyWatched
        );

        assert_eq!(backend.calls("mark_watched"), 1);
        assert_eq!(tracker.watched().len(), 1);
        assert_eq!(backend.recorded_watches(EMAIL), vec![lecture]);
    }

    #[tokio::test]
    async fn backend_already_watched_counts_as_success() {
        let (backend, tracker) = signed_in().await;
        tracker.open_course(&CourseId::new("c1")).await.unwrap();
        // Another tab watched it after this one loaded.
        backend.record_watch(EMAIL, LectureId::new("L1"));

        let outcome = tracker.mark_watched(&LectureId::new("L1")).await.unwrap();
        assert_eq!(outcome, MarkOutcome::AlreadyWatched);
        assert!(tracker.watched().contains(&LectureId::new("L1")));
    }

    #[tokio::test]
    async fn failed_mark_leaves_set_unchanged() {
        let (backend, tracker) = signed_in().await;
        tracker.open_course(&CourseId::new("c1")).await.unwrap();
        backend.fail_next(
            "mark_watched",
            ApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "boom".into(),
            },
        );

        let err = tracker.mark_watched(&LectureId::new("L2")).await.unwrap_err();
        assert_eq!(err.user_message(), "boom");
        assert!(tracker.watched().is_empty());
        assert!(!tracker.is_marking(&LectureId::new("L2")));
    }

    #[tokio::test]
    async fn concurrent_mark_reports_in_flight() {
        let (backend, tracker) = signed_in().await;
        tracker.open_course(&CourseId::new("c1")).await.unwrap();
        backend.delay("mark_watched", std::time::Duration::from_millis(50));

        let lecture = LectureId::new("L3");
        let (first, second) = tokio::join!(tracker.mark_watched(&lecture), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tracker.mark_watched(&lecture).await
        });

        assert_eq!(first.unwrap(), MarkOutcome::Marked);
        assert_eq!(second.unwrap(), MarkOutcome::InFlight);
        assert_eq!(backend.calls("mark_watched"), 1);
    }

    #[tokio::test]
    async fn mark_requires_open_course_and_known_lecture() {
        let (_backend, tracker) = signed_in().await;
        assert!(matches!(
            tracker.mark_watched(&LectureId::new("L1")).await,
            Err(ProgressError::NoActiveCourse)
        ));

        tracker.open_course(&CourseId::new("c1")).await.unwrap();
        assert!(matches!(
            tracker.mark_watched(&LectureId::new("X1")).await,
            Err(ProgressError::UnknownLecture(_))
        ));
    }

    #[tokio::test]
    async fn watched_fetch_failure_resets_to_empty() {
        let (backend, tracker) = signed_in().await;
        backend.record_watch(EMAIL, LectureId::new("L1"));
        let progress = tracker.open_course(&CourseId::new("c1")).await.unwrap();
        assert_eq!(progress.percent, 20.0);

        backend.fail_next("watched_lectures", ApiError::Network("reset".into()));
        let err = tracker
            .fetch_watched_lectures(&CourseId::new("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Api(ApiError::Network(_))));
        assert!(tracker.watched().is_empty());
        assert_eq!(tracker.percent_complete(), 0.0);
    }

    #[tokio::test]
    async fn progress_tracks_marks() {
        let (_backend, tracker) = signed_in().await;
        tracker.open_course(&CourseId::new("c1")).await.unwrap();
        tracker.mark_watched(&LectureId::new("L1")).await.unwrap();
        tracker.mark_watched(&LectureId::new("L2")).await.unwrap();

        let progress = tracker.progress().unwrap();
        assert_eq!(progress.percent, 40.0);
        assert_eq!(progress.modules[0].watched, 2);
        assert!(!progress.modules[0].is_complete);
    }

    #[tokio::test]
    async fn stale_mark_does_not_leak_into_new_course() {
        let (backend, tracker) = signed_in().await;
        tracker.open_course(&CourseId::new("c1")).await.unwrap();
        backend.delay("mark_watched", std::time::Duration::from_millis(50));

        let lecture = LectureId::new("L1");
        let (marked, opened) = tokio::join!(tracker.mark_watched(&lecture), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tracker.open_course(&CourseId::new("c2")).await
        });

        assert_eq!(marked.unwrap(), MarkOutcome::Marked);
        assert_eq!(opened.unwrap().course_id, CourseId::new("c2"));
        assert!(!tracker.watched().contains(&lecture));
    }

    #[tokio::test]
    async fn enroll_is_idempotent_and_refreshes_list() {
        let (backend, tracker) = signed_in().await;
        let c1 = CourseId::new("c1");

        assert_eq!(tracker.enroll(&c1).await.unwrap(), EnrollOutcome::Enrolled);
        assert_eq!(tracker.enroll(&c1).await.unwrap(), EnrollOutcome::AlreadyEnrolled);
        assert_eq!(tracker.enrolled_courses().len(), 1);
        assert_eq!(backend.calls("enrolled_courses"), 2);
    }

    #[tokio::test]
    async fn unauthorized_response_signs_out() {
        let (backend, tracker) = signed_in().await;
        backend.revoke_all_tokens();

        let err = tracker.enroll(&CourseId::new("c1")).await.unwrap_err();
        assert!(matches!(err, ProgressError::Api(ref api) if api.is_unauthorized()));
        assert!(matches!(
            tracker.enroll(&CourseId::new("c1")).await,
            Err(ProgressError::NotAuthenticated)
        ));
        assert_eq!(backend.calls("enroll"), 1);
    }

    #[tokio::test]
    async fn enroll_updates_identity_enrollments() {
        let (_backend, tracker) = signed_in().await;
        let c1 = CourseId::new("c1");
        assert!(!tracker.session.identity().unwrap().is_enrolled(&c1));

        tracker.enroll(&c1).await.unwrap();

        assert!(tracker.session.identity().unwrap().is_enrolled(&c1));
    }

    async fn with_watched_lecture() -> (InMemoryBackend, ProgressTracker) {
        let (backend, tracker) = signed_in().await;
        tracker.enroll(&CourseId::new("c1")).await.unwrap();
        tracker.open_course(&CourseId::new("c1")).await.unwrap();
        tracker.mark_watched(&LectureId::new("L1")).await.unwrap();
        assert_eq!(tracker.percent_complete(), 20.0);
        (backend, tracker)
    }

    fn assert_cleared(tracker: &ProgressTracker) {
        assert!(tracker.watched().is_empty());
        assert!(tracker.enrolled_courses().is_empty());
        assert!(tracker.active_course().is_none());
        assert!(tracker.progress().is_none());
        assert_eq!(tracker.percent_complete(), 0.0);
    }

    #[tokio::test]
    async fn logout_drops_tracked_progress() {
        let (_backend, tracker) = with_watched_lecture().await;

        tracker.session.logout().await.unwrap();

        assert_cleared(&tracker);
        assert!(matches!(
            tracker.mark_watched(&LectureId::new("L1")).await,
            Err(ProgressError::NoActiveCourse)
        ));
    }

    #[tokio::test]
    async fn invalidated_session_drops_tracked_progress() {
        let (_backend, tracker) = with_watched_lecture().await;

        tracker.session.invalidate().await;

        assert_cleared(&tracker);
    }

    #[tokio::test]
    async fn next_identity_starts_from_its_own_progress() {
        let (backend, tracker) = with_watched_lecture().await;
        backend.add_account("Grace", "grace@example.com", "secret2", Role::User);

        tracker.session.logout().await.unwrap();
        let grace = course_core::credentials::Credentials::new("grace@example.com", "secret2")
            .unwrap();
        tracker.session.login(&grace).await.unwrap();
        assert_cleared(&tracker);

        tracker.open_course(&CourseId::new("c1")).await.unwrap();
        let outcome = tracker.mark_watched(&LectureId::new("L1")).await.unwrap();

        assert_eq!(outcome, MarkOutcome::Marked);
        assert_eq!(backend.calls("mark_watched"), 2);
        assert_eq!(
            backend.recorded_watches("grace@example.com"),
            vec![LectureId::new("L1")]
        );
        assert_eq!(tracker.percent_complete(), 20.0);
    }

    #[tokio::test]
    async fn enrolled_response_for_previous_session_is_dropped() {
        let (backend, tracker) = signed_in().await;
        tracker.enroll(&CourseId::new("c1")).await.unwrap();
        backend.delay("enrolled_courses", std::time::Duration::from_millis(50));

        let (fetched, ()) = tokio::join!(tracker.fetch_enrolled_courses(), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tracker.session.logout().await.unwrap();
        });

        fetched.unwrap();
        assert!(tracker.enrolled_courses().is_empty());
    }

    #[test]
    fn newer_ticket_wins_slot() {
        let mut slot = Slot::default();
        let older = slot.issue();
        let newer = slot.issue();
        assert!(slot.try_apply(newer));
        assert!(!slot.try_apply(older));
    }
}
