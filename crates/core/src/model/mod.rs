mod course;
mod identity;
mod ids;

pub use course::{Course, CourseOutline, Lecture, Module};
pub use identity::{Identity, IdentityState, Role, SessionToken};
pub use ids::{CourseId, LectureId, ModuleId};
