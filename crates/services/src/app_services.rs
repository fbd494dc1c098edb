use std::sync::Arc;

use lms_core::model::{RequestContext, UserId};
use storage::repository::Storage;

use crate::Clock;
use crate::access::{PermissionChecker, RepositoryPermissionChecker};
use crate::course_service::CourseService;
use crate::dashboard_service::DashboardService;
use crate::enrollment_service::EnrollmentService;
use crate::error::AppServicesError;
use crate::payment_report_service::PaymentReportService;
use crate::progress_service::ProgressService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    gate: Arc<dyn PermissionChecker>,
    progress: Arc<ProgressService>,
    enrollment: Arc<EnrollmentService>,
    dashboard: Arc<DashboardService>,
    courses: Arc<CourseService>,
    payment_reports: Arc<PaymentReportService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock))
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        let gate: Arc<dyn PermissionChecker> = Arc::new(RepositoryPermissionChecker::new(
            Arc::clone(&storage.permissions),
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.enrollments),
        ));
        let enrollment = Arc::new(EnrollmentService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
        ));
        let dashboard = Arc::new(DashboardService::new(
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
            Arc::clone(&progress),
            Arc::clone(&gate),
        ));
        let courses = Arc::new(CourseService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&gate),
        ));
        let payment_reports = Arc::new(PaymentReportService::new(
            Arc::clone(&storage.payments),
            Arc::clone(&gate),
        ));

        Self {
            storage,
            gate,
            progress,
            enrollment,
            dashboard,
            courses,
            payment_reports,
        }
    }

    /// Load the acting user once at request start.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::UnknownUser` if no such user exists, or
    /// `AppServicesError::Storage` if the lookup fails.
    pub async fn request_context(
        &self,
        user_id: UserId,
    ) -> Result<RequestContext, AppServicesError> {
        let user = self
            .storage
            .users
            .get_user(user_id)
            .await?
            .ok_or(AppServicesError::UnknownUser(user_id))?;
        Ok(user.context())
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn gate(&self) -> Arc<dyn PermissionChecker> {
        Arc::clone(&self.gate)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn enrollment(&self) -> Arc<EnrollmentService> {
        Arc::clone(&self.enrollment)
    }

    #[must_use]
    pub fn dashboard(&self) -> Arc<DashboardService> {
        Arc::clone(&self.dashboard)
    }

    #[must_use]
    pub fn courses(&self) -> Arc<CourseService> {
        Arc::clone(&self.courses)
    }

    #[must_use]
    pub fn payment_reports(&self) -> Arc<PaymentReportService> {
        Arc::clone(&self.payment_reports)
    }
}
