use std::sync::Arc;

use lms_core::model::permission::{COURSE_MANAGE_ALL, COURSE_MANAGE_OWN};
use lms_core::model::{
    CategoryId, ChapterId, ContentType, Course, CourseId, RequestContext, SectionId,
};
use rust_decimal::Decimal;
use storage::repository::{
    CourseRepository, NewChapterRecord, NewCourseRecord, NewSectionRecord,
};

use crate::Clock;
use crate::access::{PermissionChecker, may_manage_course};
use crate::error::CourseServiceError;

/// Input for a new draft course.
#[derive(Debug, Clone)]
pub struct CourseDraft {
    pub title: String,
    pub price: Decimal,
    pub category_id: Option<CategoryId>,
}

/// Teacher-facing course management.
///
/// Owners need `course_manage_own`; anyone holding `course_manage_all` may
/// manage every course.
#[derive(Clone)]
pub struct CourseService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    gate: Arc<dyn PermissionChecker>,
}

impl CourseService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        gate: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            clock,
            courses,
            gate,
        }
    }

    /// Create a draft course owned by the acting user.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Forbidden` without a course permission,
    /// `CourseServiceError::Course` for an invalid title or price, or
    /// `CourseServiceError::Storage` if persistence fails.
    pub async fn create_draft(
        &self,
        ctx: &RequestContext,
        draft: CourseDraft,
    ) -> Result<CourseId, CourseServiceError> {
        if !self
            .gate
            .has_permission(ctx, &[COURSE_MANAGE_OWN, COURSE_MANAGE_ALL])
            .await
        {
            return Err(CourseServiceError::Forbidden);
        }

        let course = Course::new_draft(
            CourseId::new(0),
            ctx.user_id(),
            draft.category_id,
            draft.title,
            draft.price,
            self.clock.now(),
        )?;
        let course_id = self
            .courses
            .insert_course(NewCourseRecord::from_course(&course))
            .await?;

        tracing::info!(
            course_id = course_id.value(),
            teacher_id = ctx.user_id().value(),
            "created draft course"
        );
        Ok(course_id)
    }

    /// # Errors
    ///
    /// See [`CourseService::create_draft`]; also `CourseNotFound` for an
    /// unknown course.
    pub async fn add_section(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
        title: impl Into<String>,
        order_index: u32,
    ) -> Result<SectionId, CourseServiceError> {
        self.authorized_course(ctx, course_id).await?;
        Ok(self
            .courses
            .insert_section(NewSectionRecord {
                course_id,
                title: title.into(),
                order_index,
            })
            .await?)
    }

    /// # Errors
    ///
    /// Same as [`CourseService::add_section`].
    pub async fn add_chapter(
        &self,
        ctx: &RequestContext,
        section_id: SectionId,
        title: impl Into<String>,
        content_type: ContentType,
        order_index: u32,
    ) -> Result<ChapterId, CourseServiceError> {
        let section = self
            .courses
            .get_section(section_id)
            .await?
            .ok_or(storage::repository::StorageError::NotFound)?;
        self.authorized_course(ctx, section.course_id).await?;
        Ok(self
            .courses
            .insert_chapter(NewChapterRecord {
                section_id,
                title: title.into(),
                content_type,
                order_index,
            })
            .await?)
    }

    /// # Errors
    ///
    /// Returns `CourseServiceError::Course` unless the course is a draft.
    pub async fn publish(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
    ) -> Result<Course, CourseServiceError> {
        self.transition(ctx, course_id, Course::publish).await
    }

    /// # Errors
    ///
    /// Returns `CourseServiceError::Course` if the course is already archived.
    pub async fn archive(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
    ) -> Result<Course, CourseServiceError> {
        self.transition(ctx, course_id, Course::archive).await
    }

    /// Bring an archived course back as a draft.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Course` unless the course is archived.
    pub async fn restore(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
    ) -> Result<Course, CourseServiceError> {
        self.transition(ctx, course_id, Course::restore).await
    }

    /// Courses owned by the acting user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Forbidden` without a course permission.
    pub async fn list_own(&self, ctx: &RequestContext) -> Result<Vec<Course>, CourseServiceError> {
        if !self
            .gate
            .has_permission(ctx, &[COURSE_MANAGE_OWN, COURSE_MANAGE_ALL])
            .await
        {
            return Err(CourseServiceError::Forbidden);
        }
        Ok(self.courses.courses_by_teacher(ctx.user_id()).await?)
    }

    async fn transition(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
        apply: fn(&mut Course) -> Result<(), lms_core::model::CourseError>,
    ) -> Result<Course, CourseServiceError> {
        let mut course = self.authorized_course(ctx, course_id).await?;
        let from = course.status();
        apply(&mut course)?;
        self.courses.update_course(&course).await?;

        tracing::info!(
            course_id = course_id.value(),
            from = %from,
            to = %course.status(),
            "course status changed"
        );
        Ok(course)
    }

    async fn authorized_course(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
    ) -> Result<Course, CourseServiceError> {
        let course = self
            .courses
            .get_course(course_id)
            .await?
            .ok_or(CourseServiceError::CourseNotFound(course_id))?;

        if !may_manage_course(self.gate.as_ref(), ctx, &course).await {
            tracing::warn!(
                course_id = course_id.value(),
                user_id = ctx.user_id().value(),
                "course management restricted"
            );
            return Err(CourseServiceError::Forbidden);
        }
        Ok(course)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{CourseStatus, Role, UserId};
    use lms_core::time::fixed_clock;
    use storage::repository::{InMemoryRepository, PermissionRepository};

    use crate::access::RepositoryPermissionChecker;

    fn teacher(id: u64) -> RequestContext {
        RequestContext::new(UserId::new(id), Role::Teacher)
    }

    async fn service() -> (CourseService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        repo.grant_role(Role::Teacher, COURSE_MANAGE_OWN)
            .await
            .unwrap();
        repo.grant_role(Role::Admin, COURSE_MANAGE_ALL)
            .await
            .unwrap();
        let shared = Arc::new(repo.clone());
        let gate = Arc::new(RepositoryPermissionChecker::new(shared.clone()));
        (CourseService::new(fixed_clock(), shared, gate), repo)
    }

    fn draft(title: &str) -> CourseDraft {
        CourseDraft {
            title: title.to_owned(),
            price: Decimal::new(1500, 2),
            category_id: None,
        }
    }

    #[tokio::test]
    async fn owner_walks_the_full_lifecycle() {
        let (svc, _) = service().await;
        let ctx = teacher(3);
        let id = svc.create_draft(&ctx, draft("Traits")).await.unwrap();

        let published = svc.publish(&ctx, id).await.unwrap();
        assert_eq!(published.status(), CourseStatus::Published);
        let archived = svc.archive(&ctx, id).await.unwrap();
        assert_eq!(archived.status(), CourseStatus::Archived);
        let restored = svc.restore(&ctx, id).await.unwrap();
        assert_eq!(restored.status(), CourseStatus::Draft);

        let own = svc.list_own(&ctx).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].price().to_string(), "15.00");
    }

    #[tokio::test]
    async fn invalid_transition_is_reported() {
        let (svc, _) = service().await;
        let ctx = teacher(3);
        let id = svc.create_draft(&ctx, draft("Macros")).await.unwrap();

        let err = svc.restore(&ctx, id).await.unwrap_err();
        assert!(matches!(err, CourseServiceError::Course(_)));
    }

    #[tokio::test]
    async fn other_teachers_are_forbidden_but_admins_are_not() {
        let (svc, _) = service().await;
        let owner = teacher(3);
        let id = svc.create_draft(&owner, draft("Async")).await.unwrap();

        assert!(matches!(
            svc.publish(&teacher(4), id).await,
            Err(CourseServiceError::Forbidden)
        ));
        let admin = RequestContext::new(UserId::new(9), Role::Admin);
        assert!(svc.publish(&admin, id).await.is_ok());
    }

    #[tokio::test]
    async fn students_cannot_create_courses() {
        let (svc, _) = service().await;
        let ctx = RequestContext::new(UserId::new(5), Role::Student);
        assert!(matches!(
            svc.create_draft(&ctx, draft("Nope")).await,
            Err(CourseServiceError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn outline_is_added_through_the_owner() {
        let (svc, repo) = service().await;
        let ctx = teacher(3);
        let id = svc.create_draft(&ctx, draft("Outline")).await.unwrap();
        let section = svc.add_section(&ctx, id, "Intro", 0).await.unwrap();
        svc.add_chapter(&ctx, section, "Welcome", ContentType::Video, 0)
            .await
            .unwrap();

        assert_eq!(repo.chapters_for(id).await.unwrap().len(), 1);
        assert!(matches!(
            svc.add_section(&teacher(4), id, "Hijack", 1).await,
            Err(CourseServiceError::Forbidden)
        ));
    }
}
