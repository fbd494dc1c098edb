use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{CourseId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("completed chapters ({completed}) exceed total chapters ({total})")]
    CompletedExceedsTotal { completed: u32, total: u32 },

    #[error("unknown completion status: {0}")]
    UnknownStatus(String),

    #[error("completion percentage out of range: {0}")]
    PercentageOutOfRange(Decimal),
}

/// Completion state of a student in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    /// Status implied by a completion percentage.
    ///
    /// Anything at or above 100 counts as completed.
    #[must_use]
    pub fn from_percentage(percentage: Decimal) -> Self {
        if percentage >= Decimal::ONE_HUNDRED {
            ProgressStatus::Completed
        } else if percentage > Decimal::ZERO {
            ProgressStatus::InProgress
        } else {
            ProgressStatus::NotStarted
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStatus {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ProgressStatus::NotStarted),
            "in_progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            other => Err(ProgressError::UnknownStatus(other.to_owned())),
        }
    }
}

/// Derived progress values for one (student, course) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed_chapters: u32,
    pub total_chapters: u32,
    pub percentage: Decimal,
    pub status: ProgressStatus,
}

impl ProgressSnapshot {
    /// Snapshot for a course with no chapters or a student with no completions.
    #[must_use]
    pub fn empty(total_chapters: u32) -> Self {
        let mut percentage = Decimal::ZERO;
        percentage.rescale(2);
        Self {
            completed_chapters: 0,
            total_chapters,
            percentage,
            status: ProgressStatus::NotStarted,
        }
    }

    /// Derive percentage and status from chapter counts.
    ///
    /// The percentage is rounded half-up to two decimal places. A course with
    /// no chapters is always `NotStarted` at 0.00.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CompletedExceedsTotal` if `completed > total`.
    pub fn from_counts(completed: u32, total: u32) -> Result<Self, ProgressError> {
        if total == 0 {
            return Ok(Self::empty(0));
        }
        if completed > total {
            return Err(ProgressError::CompletedExceedsTotal { completed, total });
        }

        let mut percentage = (Decimal::from(completed) * Decimal::ONE_HUNDRED
            / Decimal::from(total))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        percentage.rescale(2);

        Ok(Self {
            completed_chapters: completed,
            total_chapters: total,
            percentage,
            status: ProgressStatus::from_percentage(percentage),
        })
    }
}

/// The cached `course_progress` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub course_id: CourseId,
    pub student_id: UserId,
    /// Stored in the `completed_sections` column; it is a chapter count.
    pub completed_chapters: u32,
    pub completion_percentage: Decimal,
    pub status: ProgressStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CourseProgress {
    /// Zero-valued row inserted at enrollment.
    #[must_use]
    pub fn initial(course_id: CourseId, student_id: UserId) -> Self {
        let snapshot = ProgressSnapshot::empty(0);
        Self {
            course_id,
            student_id,
            completed_chapters: 0,
            completion_percentage: snapshot.percentage,
            status: snapshot.status,
            completed_at: None,
        }
    }

    /// Overwrite the derived values from a snapshot.
    ///
    /// `completed_at` is stamped the first time the status becomes completed
    /// and never changes afterwards.
    pub fn apply(&mut self, snapshot: &ProgressSnapshot, now: DateTime<Utc>) {
        self.completed_chapters = snapshot.completed_chapters;
        self.completion_percentage = snapshot.percentage;
        self.status = snapshot.status;
        if self.completed_at.is_none() && snapshot.status == ProgressStatus::Completed {
            self.completed_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn empty_course_is_not_started() {
        let snap = ProgressSnapshot::from_counts(0, 0).unwrap();
        assert_eq!(snap.percentage.to_string(), "0.00");
        assert_eq!(snap.status, ProgressStatus::NotStarted);
    }

    #[test]
    fn half_complete_is_in_progress() {
        let snap = ProgressSnapshot::from_counts(5, 10).unwrap();
        assert_eq!(snap.percentage.to_string(), "50.00");
        assert_eq!(snap.status, ProgressStatus::InProgress);
    }

    #[test]
    fn rounds_half_up_to_two_places() {
        assert_eq!(
            ProgressSnapshot::from_counts(1, 3).unwrap().percentage.to_string(),
            "33.33"
        );
        assert_eq!(
            ProgressSnapshot::from_counts(2, 3).unwrap().percentage.to_string(),
            "66.67"
        );
        // 1/8 = 12.5 exactly, 1/16 = 6.25, 1/32 = 3.125 -> 3.13
        assert_eq!(
            ProgressSnapshot::from_counts(1, 32).unwrap().percentage.to_string(),
            "3.13"
        );
    }

    #[test]
    fn all_chapters_is_completed() {
        let snap = ProgressSnapshot::from_counts(4, 4).unwrap();
        assert_eq!(snap.percentage.to_string(), "100.00");
        assert_eq!(snap.status, ProgressStatus::Completed);
    }

    #[test]
    fn overshoot_is_rejected() {
        assert_eq!(
            ProgressSnapshot::from_counts(5, 4),
            Err(ProgressError::CompletedExceedsTotal {
                completed: 5,
                total: 4
            })
        );
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(
            ProgressStatus::from_percentage(Decimal::new(10001, 2)),
            ProgressStatus::Completed
        );
        assert_eq!(
            ProgressStatus::from_percentage(Decimal::new(1, 2)),
            ProgressStatus::InProgress
        );
        assert_eq!(
            ProgressStatus::from_percentage(Decimal::ZERO),
            ProgressStatus::NotStarted
        );
    }

    #[test]
    fn completed_at_is_stamped_once() {
        let mut row = CourseProgress::initial(CourseId::new(1), UserId::new(2));
        let done = ProgressSnapshot::from_counts(4, 4).unwrap();
        let first = fixed_now();
        row.apply(&done, first);
        assert_eq!(row.completed_at, Some(first));

        row.apply(&done, first + chrono::Duration::days(3));
        assert_eq!(row.completed_at, Some(first));
    }
}
