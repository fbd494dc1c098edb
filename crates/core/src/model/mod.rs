mod course;
mod enrollment;
mod ids;
mod payment;
pub mod permission;
mod progress;
mod user;

pub use course::{Chapter, ContentType, Course, CourseError, CourseStatus, Section};
pub use enrollment::{Enrollment, SectionProgress};
pub use ids::{CategoryId, ChapterId, CourseId, ParseIdError, PaymentId, SectionId, UserId};
pub use payment::{
    NewPayment, Payment, PaymentError, PaymentStatus, PaymentTotals, PaymentType, StatusTotal,
};
pub use permission::PermissionSet;
pub use progress::{CourseProgress, ProgressError, ProgressSnapshot, ProgressStatus};
pub use user::{RequestContext, Role, User, UserError};
