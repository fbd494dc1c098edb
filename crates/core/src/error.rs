use thiserror::Error;

use crate::model::{CourseError, PaymentError, ProgressError, UserError};

/// Any domain validation failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    User(#[from] UserError),
}
