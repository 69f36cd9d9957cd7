//! JSON shapes exchanged with the backend and their mapping onto domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use course_core::model::{
    Course, CourseId, Identity, Lecture, LectureId, Module, ModuleId, Role, SessionToken,
};

use super::AuthGrant;

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub verification_code: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmailRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyCodeRequest<'a> {
    pub email: &'a str,
    pub code: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetPasswordRequest<'a> {
    pub password: &'a str,
}

/// `enrolledCourses` may arrive as bare ids or as populated documents.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CourseRef {
    Id(CourseId),
    Doc {
        #[serde(rename = "_id")]
        id: CourseId,
    },
}

impl CourseRef {
    fn into_id(self) -> CourseId {
        match self {
            CourseRef::Id(id) | CourseRef::Doc { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserBody {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub enrolled_courses: Vec<CourseRef>,
}

impl From<UserBody> for Identity {
    fn from(body: UserBody) -> Self {
        Identity::new(
            body.name,
            body.email,
            body.role,
            body.enrolled_courses.into_iter().map(CourseRef::into_id),
        )
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthBody {
    pub user: UserBody,
    pub token: String,
}

impl From<AuthBody> for AuthGrant {
    fn from(body: AuthBody) -> Self {
        Self {
            identity: body.user.into(),
            token: SessionToken::new(body.token),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CodeBody {
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchedBody {
    #[serde(default)]
    pub watched_videos: Vec<LectureId>,
}

/// Ordinals are typed as strings in some documents and numbers in others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Ordinal {
    Text(String),
    Number(serde_json::Number),
}

impl Default for Ordinal {
    fn default() -> Self {
        Ordinal::Text(String::new())
    }
}

impl From<Ordinal> for String {
    fn from(ordinal: Ordinal) -> Self {
        match ordinal {
            Ordinal::Text(text) => text,
            Ordinal::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CourseBody {
    #[serde(rename = "_id")]
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<CourseBody> for Course {
    fn from(body: CourseBody) -> Self {
        Course {
            id: body.id,
            title: body.title,
            thumbnail: body.thumbnail,
            description: body.description,
            price: body.price,
            created_at: body.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LectureBody {
    #[serde(rename = "_id")]
    pub id: LectureId,
    #[serde(default)]
    pub lecture_number: Ordinal,
    pub title: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub pdf_urls: Vec<String>,
}

impl From<LectureBody> for Lecture {
    fn from(body: LectureBody) -> Self {
        Lecture {
            id: body.id,
            number: body.lecture_number.into(),
            title: body.title,
            video_url: body.video_url,
            pdf_urls: body.pdf_urls,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModuleBody {
    #[serde(rename = "_id")]
    pub id: ModuleId,
    #[serde(default)]
    pub module_number: Ordinal,
    pub title: String,
    #[serde(default)]
    pub lectures: Vec<LectureBody>,
}

impl From<ModuleBody> for Module {
    fn from(body: ModuleBody) -> Self {
        Module {
            id: body.id,
            number: body.module_number.into(),
            title: body.title,
            lectures: body.lectures.into_iter().map(Lecture::from).collect(),
        }
    }
}
