#![forbid(unsafe_code)]

pub mod access;
pub mod credentials;
pub mod error;
pub mod model;
pub mod progress;
pub mod route;

pub use access::{Access, can_access};
pub use error::{ParseIdError, ValidationError};
pub use progress::{CourseProgress, ModuleProgress, WatchedSet, compute_progress, is_module_complete};
pub use route::Route;
