use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseIdError;

/// Declares an opaque, backend-assigned string identifier.
///
/// The backend hands out document ids (hex strings); the client never mints
/// them, so the only invariant enforced here is non-emptiness.
macro_rules! backend_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw backend identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        kind: stringify!($name),
                        raw: s.to_owned(),
                    });
                }
                Ok(Self::new(trimmed))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

backend_id!(
    /// Unique identifier for a Course
    CourseId
);
backend_id!(
    /// Unique identifier for a Module within a course
    ModuleId
);
backend_id!(
    /// Unique identifier for a Lecture within a module
    LectureId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_id_display_is_raw_value() {
        let id = CourseId::new("65a1f0c2");
        assert_eq!(id.to_string(), "65a1f0c2");
        assert_eq!(format!("{id:?}"), "CourseId(65a1f0c2)");
    }

    #[test]
    fn lecture_id_from_str_trims() {
        let id: LectureId = "  L1 ".parse().unwrap();
        assert_eq!(id, LectureId::new("L1"));
    }

    #[test]
    fn blank_ids_are_rejected() {
        let err = "   ".parse::<ModuleId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse ModuleId from \"   \"");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&CourseId::new("c1")).unwrap();
        assert_eq!(json, "\"c1\"");
        let back: CourseId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "c1");
    }
}
