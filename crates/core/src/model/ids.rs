use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value
            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

row_id!(
    /// Unique identifier for a user (student, teacher or admin)
    UserId
);
row_id!(
    /// Unique identifier for a course
    CourseId
);
row_id!(
    /// Unique identifier for a section within a course
    SectionId
);
row_id!(
    /// Unique identifier for a chapter within a section
    ChapterId
);
row_id!(
    /// Unique identifier for a course category
    CategoryId
);
row_id!(
    /// Unique identifier for a payment ledger row
    PaymentId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_id_display() {
        assert_eq!(CourseId::new(42).to_string(), "42");
    }

    #[test]
    fn user_id_from_str_trims_whitespace() {
        let id: UserId = " 7 ".parse().unwrap();
        assert_eq!(id, UserId::new(7));
    }

    #[test]
    fn chapter_id_from_str_invalid() {
        let err = "chapter-one".parse::<ChapterId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse ChapterId from string");
    }

    #[test]
    fn debug_includes_type_name() {
        assert_eq!(format!("{:?}", SectionId::new(3)), "SectionId(3)");
    }
}
