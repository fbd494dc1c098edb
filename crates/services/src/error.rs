//! Shared error types for the services crate.

use thiserror::Error;

use lms_core::model::{ChapterId, CourseError, CourseId, ProgressError, UserId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("chapter {0} not found")]
    ChapterNotFound(ChapterId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("student is not enrolled in course {0}")]
    NotEnrolled(CourseId),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `EnrollmentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnrollmentError {
    #[error("already enrolled in course {0}")]
    AlreadyEnrolled(CourseId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("course {0} is not open for enrollment")]
    CourseUnavailable(CourseId),
    #[error("only students can enroll")]
    NotAStudent,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CourseService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseServiceError {
    #[error("not allowed to manage course")]
    Forbidden,
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `PaymentReportService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PaymentReportError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error("unknown user {0}")]
    UnknownUser(UserId),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
