#![forbid(unsafe_code)]

pub mod access;
pub mod app_services;
pub mod course_service;
pub mod dashboard_service;
pub mod enrollment_service;
pub mod error;
pub mod payment_report_service;
pub mod progress_service;

pub use lms_core::Clock;

pub use access::{Access, PermissionChecker, RepositoryPermissionChecker};
pub use app_services::AppServices;
pub use course_service::{CourseDraft, CourseService};
pub use dashboard_service::{
    CardProgress, CourseDetail, DashboardCard, DashboardService, SectionOutline,
};
pub use enrollment_service::{EnrollOutcome, EnrollmentService};
pub use error::{
    AppServicesError, CourseServiceError, EnrollmentError, PaymentReportError,
    ProgressServiceError,
};
pub use payment_report_service::{PaymentReport, PaymentReportService};
pub use progress_service::ProgressService;
