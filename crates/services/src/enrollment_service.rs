use std::sync::Arc;

use lms_core::model::{CourseId, Enrollment, NewPayment, RequestContext};
use rust_decimal::Decimal;
use storage::repository::{
    CourseRepository, EnrollmentRepository, FreeEnrollmentRecord, StorageError,
};

use crate::Clock;
use crate::error::EnrollmentError;

/// What happened when a student asked to join a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// Free course: enrollment, zero progress rows and a FREE ledger row were written.
    Enrolled { course_id: CourseId },
    /// Paid course: nothing was written; the caller hands off to checkout.
    CheckoutRequired { course_id: CourseId, price: Decimal },
}

/// Drives the unenrolled → enrolled transition.
#[derive(Clone)]
pub struct EnrollmentService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            enrollments,
        }
    }

    /// Enroll the acting student in a course.
    ///
    /// Free courses are enrolled in a single transaction. Paid courses return
    /// [`EnrollOutcome::CheckoutRequired`] without touching storage.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::NotAStudent` for non-student roles,
    /// `EnrollmentError::CourseNotFound` / `CourseUnavailable` when the course
    /// is missing or not published, `EnrollmentError::AlreadyEnrolled` on a
    /// repeat, and `EnrollmentError::Storage` if the transaction fails.
    pub async fn enroll(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
    ) -> Result<EnrollOutcome, EnrollmentError> {
        if !ctx.is_student() {
            return Err(EnrollmentError::NotAStudent);
        }

        let course = self
            .courses
            .get_course(course_id)
            .await?
            .ok_or(EnrollmentError::CourseNotFound(course_id))?;
        if !course.is_open_for_enrollment() {
            return Err(EnrollmentError::CourseUnavailable(course_id));
        }

        let student_id = ctx.user_id();
        if self.enrollments.is_enrolled(course_id, student_id).await? {
            return Err(EnrollmentError::AlreadyEnrolled(course_id));
        }

        if !course.is_free() {
            tracing::info!(
                student_id = student_id.value(),
                course_id = course_id.value(),
                price = %course.price(),
                "paid course, checkout required"
            );
            return Ok(EnrollOutcome::CheckoutRequired {
                course_id,
                price: course.price(),
            });
        }

        let now = self.clock.now();
        let section_ids = self
            .courses
            .sections_for(course_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let record = FreeEnrollmentRecord {
            enrollment: Enrollment::new(course_id, student_id, now),
            section_ids,
            payment: NewPayment::free_enrollment(student_id, course_id, now),
        };

        match self.enrollments.enroll_free(record).await {
            Ok(()) => {}
            // Lost a race with a concurrent request for the same pair.
            Err(StorageError::Conflict) => {
                return Err(EnrollmentError::AlreadyEnrolled(course_id));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            student_id = student_id.value(),
            course_id = course_id.value(),
            "enrolled in free course"
        );
        Ok(EnrollOutcome::Enrolled { course_id })
    }

    /// # Errors
    ///
    /// Returns `EnrollmentError::Storage` if repository access fails.
    pub async fn enrollments(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<Enrollment>, EnrollmentError> {
        Ok(self
            .enrollments
            .enrollments_for_student(ctx.user_id())
            .await?)
    }
}
