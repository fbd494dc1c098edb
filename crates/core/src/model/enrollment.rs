use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, SectionId, UserId};

/// A student's membership in a course. Unique per (course, student).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub course_id: CourseId,
    pub student_id: UserId,
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    #[must_use]
    pub fn new(course_id: CourseId, student_id: UserId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            course_id,
            student_id,
            enrolled_at,
        }
    }
}

/// Per-section progress row, created zero-valued at enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProgress {
    pub section_id: SectionId,
    pub course_id: CourseId,
    pub student_id: UserId,
    pub completed_chapters: u32,
    pub is_completed: bool,
}

impl SectionProgress {
    #[must_use]
    pub fn initial(section_id: SectionId, course_id: CourseId, student_id: UserId) -> Self {
        Self {
            section_id,
            course_id,
            student_id,
            completed_chapters: 0,
            is_completed: false,
        }
    }
}
