use std::sync::Arc;

use course_core::access::{Access, LEARNER_ROLES, can_access};
use course_core::credentials::Credentials;
use course_core::model::{
    Course, CourseId, IdentityState, Lecture, LectureId, Module, ModuleId, Role,
};
use course_core::Route;
use services::{AppServices, EnrollOutcome, InMemoryBackend, MarkOutcome};
use storage::repository::{InMemoryTokenStore, Storage, TokenStore};

const EMAIL: &str = "learner@example.com";
const PASSWORD: &str = "secret1";

fn lecture(id: &str, number: &str) -> Lecture {
    Lecture {
        id: LectureId::new(id),
        number: number.to_string(),
        title: format!("Lecture {number}"),
        video_url: format!("https://videos.example.com/{id}.mp4"),
        pdf_urls: Vec::new(),
    }
}

/// One course: module m1 holds L1..L3, module m2 holds L4..L5.
fn seeded_backend() -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    backend.add_account("Learner", EMAIL, PASSWORD, Role::User);
    backend.add_course(
        Course {
            id: CourseId::new("c1"),
            title: "Systems Programming".to_string(),
            thumbnail: String::new(),
            description: "Bits and bytes".to_string(),
            price: 19.99,
            created_at: None,
        },
        vec![
            Module {
                id: ModuleId::new("m1"),
                number: "1".to_string(),
                title: "Basics".to_string(),
                lectures: vec![lecture("L1", "1"), lecture("L2", "2"), lecture("L3", "3")],
            },
            Module {
                id: ModuleId::new("m2"),
                number: "2".to_string(),
                title: "Advanced".to_string(),
                lectures: vec![lecture("L4", "1"), lecture("L5", "2")],
            },
        ],
    );
    backend
}

fn services_over(backend: &InMemoryBackend, storage: Storage) -> AppServices {
    AppServices::from_parts(Arc::new(backend.clone()), storage)
}

fn credentials() -> Credentials {
    Credentials::new(EMAIL, PASSWORD).unwrap()
}

#[tokio::test]
async fn logout_then_reload_starts_signed_out() {
    let backend = seeded_backend();
    let storage = Storage::in_memory();

    let app = services_over(&backend, storage.clone());
    app.session().bootstrap().await.unwrap();
    app.session().login(&credentials()).await.unwrap();
    assert!(app.session().identity_state().is_present());

    let route = app.session().logout().await.unwrap();
    assert_eq!(route, Route::Landing);

    // A fresh composition over the same storage models a page reload.
    let reloaded = services_over(&backend, storage);
    let state = reloaded.session().bootstrap().await.unwrap();
    assert_eq!(state, IdentityState::Absent);
    assert_eq!(backend.calls("me"), 0);
}

#[tokio::test]
async fn login_survives_reload_through_stored_token() {
    let backend = seeded_backend();
    let storage = Storage::in_memory();

    let app = services_over(&backend, storage.clone());
    app.session().login(&credentials()).await.unwrap();

    let reloaded = services_over(&backend, storage);
    let state = reloaded.session().bootstrap().await.unwrap();
    assert_eq!(
        state.identity().map(|identity| identity.email()),
        Some(EMAIL)
    );
}

#[tokio::test]
async fn rejected_token_at_startup_is_discarded() {
    let backend = seeded_backend();
    let stale = backend.issue_token(EMAIL);
    backend.revoke_all_tokens();
    let tokens = InMemoryTokenStore::with_token(stale);
    let storage = Storage {
        tokens: Arc::new(tokens.clone()),
    };

    let app = services_over(&backend, storage);
    let state = app.session().bootstrap().await.unwrap();

    assert_eq!(state, IdentityState::Absent);
    assert!(app.session().token().is_none());
    assert!(tokens.load().await.unwrap().is_none());
}

#[tokio::test]
async fn learner_routes_wait_for_bootstrap_then_follow_identity() {
    let backend = seeded_backend();
    let app = services_over(&backend, Storage::in_memory());

    assert_eq!(
        can_access(&app.session().identity_state(), LEARNER_ROLES),
        Access::Pending
    );

    app.session().bootstrap().await.unwrap();
    let access = can_access(&app.session().identity_state(), LEARNER_ROLES);
    assert_eq!(access, Access::RedirectToLogin);
    assert_eq!(access.redirect(), Some(Route::Login));

    app.session().login(&credentials()).await.unwrap();
    assert!(can_access(&app.session().identity_state(), LEARNER_ROLES).is_allowed());
}

#[tokio::test]
async fn watching_lectures_drives_course_progress() {
    let backend = seeded_backend();
    let app = services_over(&backend, Storage::in_memory());
    app.session().login(&credentials()).await.unwrap();

    let course_id = CourseId::new("c1");
    assert_eq!(
        app.progress().enroll(&course_id).await.unwrap(),
        EnrollOutcome::Enrolled
    );
    assert_eq!(app.progress().enrolled_courses().len(), 1);

    let opened = app.progress().open_course(&course_id).await.unwrap();
    assert_eq!(opened.percent, 0.0);

    let tracker = app.progress();
    for id in ["L1", "L2"] {
        let outcome = tracker.mark_watched(&LectureId::new(id)).await.unwrap();
        assert_eq!(outcome, MarkOutcome::Marked);
    }
    assert_eq!(tracker.percent_complete(), 40.0);

    for id in ["L3", "L4", "L5"] {
        tracker.mark_watched(&LectureId::new(id)).await.unwrap();
    }
    let progress = tracker.progress().unwrap();
    assert_eq!(progress.percent, 100.0);
    assert_eq!(progress.completed_modules, 2);
    assert_eq!(backend.recorded_watches(EMAIL).len(), 5);
}

#[tokio::test]
async fn lecture_watched_elsewhere_is_confirmed_locally() {
    let backend = seeded_backend();
    let app = services_over(&backend, Storage::in_memory());
    app.session().login(&credentials()).await.unwrap();
    app.progress().open_course(&CourseId::new("c1")).await.unwrap();

    // Another tab records the watch after this one loaded its watched set.
    backend.record_watch(EMAIL, LectureId::new("L1"));

    let outcome = app
        .progress()
        .mark_watched(&LectureId::new("L1"))
        .await
        .unwrap();

    assert_eq!(outcome, MarkOutcome::AlreadyWatched);
    assert!(app.progress().watched().contains(&LectureId::new("L1")));
    assert_eq!(app.progress().percent_complete(), 20.0);
}

#[tokio::test]
async fn reopening_course_restores_server_side_watches() {
    let backend = seeded_backend();
    let storage = Storage::in_memory();
    let app = services_over(&backend, storage.clone());
    app.session().login(&credentials()).await.unwrap();
    app.progress().open_course(&CourseId::new("c1")).await.unwrap();
    app.progress()
        .mark_watched(&LectureId::new("L4"))
        .await
        .unwrap();

    let reloaded = services_over(&backend, storage);
    reloaded.session().bootstrap().await.unwrap();
    let progress = reloaded
        .progress()
        .open_course(&CourseId::new("c1"))
        .await
        .unwrap();

    assert_eq!(progress.percent, 20.0);
    assert!(reloaded.progress().watched().contains(&LectureId::new("L4")));
}

#[tokio::test]
async fn expired_session_mid_flow_signs_out() {
    let backend = seeded_backend();
    let app = services_over(&backend, Storage::in_memory());
    app.session().login(&credentials()).await.unwrap();
    app.progress().open_course(&CourseId::new("c1")).await.unwrap();

    backend.revoke_all_tokens();
    let err = app
        .progress()
        .mark_watched(&LectureId::new("L2"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Invalid token"));
    assert_eq!(app.session().identity_state(), IdentityState::Absent);
    assert!(!app.progress().watched().contains(&LectureId::new("L2")));
}

#[tokio::test]
async fn catalog_is_readable_signed_out() {
    let backend = seeded_backend();
    let app = services_over(&backend, Storage::in_memory());
    app.session().bootstrap().await.unwrap();

    let courses = app.catalog().list_courses().await.unwrap();
    assert_eq!(courses.len(), 1);
    let outline = app.catalog().outline(&CourseId::new("c1")).await.unwrap();
    assert_eq!(outline.lectures().count(), 5);
}

#[tokio::test]
async fn switching_identity_does_not_carry_progress_over() {
    let backend = seeded_backend();
    backend.add_account("Other", "other@example.com", "secret2", Role::User);
    let app = services_over(&backend, Storage::in_memory());
    let tracker = app.progress();
    let course_id = CourseId::new("c1");
    let lecture = LectureId::new("L1");

    app.session().login(&credentials()).await.unwrap();
    tracker.enroll(&course_id).await.unwrap();
    tracker.open_course(&course_id).await.unwrap();
    tracker.mark_watched(&lecture).await.unwrap();

    app.session().logout().await.unwrap();
    assert!(tracker.enrolled_courses().is_empty());
    assert!(tracker.watched().is_empty());
    assert_eq!(tracker.percent_complete(), 0.0);

    let other = Credentials::new("other@example.com", "secret2").unwrap();
    app.session().login(&other).await.unwrap();
    tracker.open_course(&course_id).await.unwrap();
    let outcome = tracker.mark_watched(&lecture).await.unwrap();

    assert_eq!(outcome, MarkOutcome::Marked);
    assert_eq!(backend.calls("mark_watched"), 2);
    assert_eq!(backend.recorded_watches("other@example.com"), vec![lecture]);
    tracker.fetch_enrolled_courses().await.unwrap();
    assert!(tracker.enrolled_courses().is_empty());
}

#[tokio::test]
async fn enrolling_updates_whoami_enrollments() {
    let backend = seeded_backend();
    let app = services_over(&backend, Storage::in_memory());
    app.session().login(&credentials()).await.unwrap();
    let course_id = CourseId::new("c1");

    app.progress().enroll(&course_id).await.unwrap();

    let identity = app.session().identity().unwrap();
    assert!(identity.is_enrolled(&course_id));
    assert_eq!(identity.enrolled_course_ids().len(), 1);
}
