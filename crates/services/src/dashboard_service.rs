use std::sync::Arc;

use chrono::{DateTime, Utc};
use lms_core::model::{
    Chapter, CourseId, CourseProgress, CourseStatus, ProgressSnapshot, ProgressStatus,
    RequestContext, Section, UserId,
};
use rust_decimal::Decimal;
use serde::Serialize;
use storage::repository::{CourseRepository, EnrollmentRepository, StorageError};

use crate::access::{PermissionChecker, may_manage_course};
use crate::progress_service::ProgressService;

/// Where the figures on a dashboard card came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CardProgress {
    /// Recomputed for this render.
    Fresh(ProgressSnapshot),
    /// The recount failed; this is the row written by the last successful one.
    Cached(CourseProgress),
    Unavailable,
}

impl CardProgress {
    #[must_use]
    pub fn percentage(&self) -> Option<Decimal> {
        match self {
            CardProgress::Fresh(snap) => Some(snap.percentage),
            CardProgress::Cached(row) => Some(row.completion_percentage),
            CardProgress::Unavailable => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<ProgressStatus> {
        match self {
            CardProgress::Fresh(snap) => Some(snap.status),
            CardProgress::Cached(row) => Some(row.status),
            CardProgress::Unavailable => None,
        }
    }
}

/// One enrolled course as shown on the student dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardCard {
    pub course_id: CourseId,
    pub title: String,
    pub enrolled_at: DateTime<Utc>,
    pub progress: CardProgress,
}

/// A section with its chapters in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionOutline {
    pub section: Section,
    pub chapters: Vec<Chapter>,
}

/// Course detail page: outline plus the viewer's progress when enrolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseDetail {
    pub course_id: CourseId,
    pub title: String,
    pub price: Decimal,
    pub status: CourseStatus,
    pub sections: Vec<SectionOutline>,
    pub progress: Option<ProgressSnapshot>,
}

/// Builds the student dashboard, recomputing each course's progress on read.
#[derive(Clone)]
pub struct DashboardService {
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<ProgressService>,
    gate: Arc<dyn PermissionChecker>,
}

impl DashboardService {
    #[must_use]
    pub fn new(
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<ProgressService>,
        gate: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            courses,
            enrollments,
            progress,
            gate,
        }
    }

    /// Cards for every enrolled course, most recent enrollment first.
    ///
    /// Storage failures are logged and degrade to fewer (or no) cards so the
    /// page still renders.
    pub async fn cards(&self, ctx: &RequestContext) -> Vec<DashboardCard> {
        let student_id = ctx.user_id();
        let enrollments = match self.enrollments.enrollments_for_student(student_id).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(
                    student_id = student_id.value(),
                    error = %err,
                    "failed to load enrollments"
                );
                return Vec::new();
            }
        };

        let mut cards = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            let course = match self.courses.get_course(enrollment.course_id).await {
                Ok(Some(course)) => course,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(
                        course_id = enrollment.course_id.value(),
                        error = %err,
                        "failed to load course"
                    );
                    continue;
                }
            };

            let progress = match self.progress.recompute(student_id, course.id()).await {
                Ok(snapshot) => CardProgress::Fresh(snapshot),
                Err(err) => {
                    tracing::error!(
                        course_id = course.id().value(),
                        error = %err,
                        "failed to recompute progress"
                    );
                    self.cached_progress(student_id, course.id()).await
                }
            };

            cards.push(DashboardCard {
                course_id: course.id(),
                title: course.title().to_owned(),
                enrolled_at: enrollment.enrolled_at,
                progress,
            });
        }
        cards
    }

    async fn cached_progress(&self, student_id: UserId, course_id: CourseId) -> CardProgress {
        match self.progress.cached(student_id, course_id).await {
            Ok(Some(row)) => CardProgress::Cached(row),
            Ok(None) => CardProgress::Unavailable,
            Err(err) => {
                tracing::error!(
                    course_id = course_id.value(),
                    error = %err,
                    "failed to load cached progress"
                );
                CardProgress::Unavailable
            }
        }
    }

    /// The course page for one course. `None` when the course does not exist,
    /// cannot be loaded, or is unpublished and the viewer neither studies nor
    /// manages it; failures are logged.
    ///
    /// Progress is recomputed only if the viewer is enrolled.
    pub async fn course_detail(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
    ) -> Option<CourseDetail> {
        let loaded = async {
            let course = self.courses.get_course(course_id).await?;
            let sections = self.courses.sections_for(course_id).await?;
            let chapters = self.courses.chapters_for(course_id).await?;
            let enrolled = self
                .enrollments
                .is_enrolled(course_id, ctx.user_id())
                .await?;
            Ok::<_, StorageError>((course, sections, chapters, enrolled))
        }
        .await;

        let (course, sections, chapters, enrolled) = match loaded {
            Ok((Some(course), sections, chapters, enrolled)) => {
                (course, sections, chapters, enrolled)
            }
            Ok((None, ..)) => return None,
            Err(err) => {
                tracing::error!(
                    course_id = course_id.value(),
                    error = %err,
                    "failed to load course detail"
                );
                return None;
            }
        };

        if !course.is_open_for_enrollment()
            && !enrolled
            && !may_manage_course(self.gate.as_ref(), ctx, &course).await
        {
            tracing::debug!(
                course_id = course_id.value(),
                user_id = ctx.user_id().value(),
                status = %course.status(),
                "unpublished course hidden"
            );
            return None;
        }

        let progress = if enrolled {
            match self.progress.recompute(ctx.user_id(), course_id).await {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    tracing::error!(
                        course_id = course_id.value(),
                        error = %err,
                        "failed to recompute progress"
                    );
                    None
                }
            }
        } else {
            None
        };

        let sections = sections
            .into_iter()
            .map(|section| SectionOutline {
                chapters: chapters
                    .iter()
                    .filter(|ch| ch.section_id == section.id)
                    .cloned()
                    .collect(),
                section,
            })
            .collect();

        Some(CourseDetail {
            course_id,
            title: course.title().to_owned(),
            price: course.price(),
            status: course.status(),
            sections,
            progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use lms_core::model::permission::{COURSE_MANAGE_ALL, COURSE_MANAGE_OWN};
    use lms_core::model::{ContentType, Course, Enrollment, NewPayment, Role, SectionId};
    use lms_core::time::{fixed_clock, fixed_now};
    use storage::repository::{
        ChapterCounts, FreeEnrollmentRecord, InMemoryRepository, NewChapterRecord,
        NewCourseRecord, NewSectionRecord, PermissionRepository, ProgressRepository,
    };

    use crate::access::RepositoryPermissionChecker;

    const TEACHER: UserId = UserId::new(1);
    const STUDENT: UserId = UserId::new(4);

    /// Course owned by `TEACHER` with one section per entry of `outline`.
    async fn course(
        repo: &InMemoryRepository,
        title: &str,
        publish: bool,
        outline: &[u32],
    ) -> (CourseId, Vec<SectionId>) {
        let mut course = Course::new_draft(
            CourseId::new(0),
            TEACHER,
            None,
            title,
            Decimal::new(1500, 2),
            fixed_now(),
        )
        .unwrap();
        if publish {
            course.publish().unwrap();
        }
        let course_id = repo
            .insert_course(NewCourseRecord::from_course(&course))
            .await
            .unwrap();
        let mut section_ids = Vec::new();
        for (s, &chapters) in outline.iter().enumerate() {
            let s = u32::try_from(s).unwrap();
            let section_id = repo
                .insert_section(NewSectionRecord {
                    course_id,
                    title: format!("Section {s}"),
                    order_index: s,
                })
                .await
                .unwrap();
            for c in 0..chapters {
                repo.insert_chapter(NewChapterRecord {
                    section_id,
                    title: format!("Chapter {s}.{c}"),
                    content_type: ContentType::Text,
                    order_index: c,
                })
                .await
                .unwrap();
            }
            section_ids.push(section_id);
        }
        (course_id, section_ids)
    }

    async fn enroll(repo: &InMemoryRepository, course_id: CourseId, section_ids: Vec<SectionId>) {
        repo.enroll_free(FreeEnrollmentRecord {
            enrollment: Enrollment::new(course_id, STUDENT, fixed_now()),
            section_ids,
            payment: NewPayment::free_enrollment(STUDENT, course_id, fixed_now()),
        })
        .await
        .unwrap();
    }

    fn build(repo: &InMemoryRepository, progress: Arc<dyn ProgressRepository>) -> DashboardService {
        let shared = Arc::new(repo.clone());
        let progress = Arc::new(ProgressService::new(
            fixed_clock(),
            shared.clone(),
            progress,
            shared.clone(),
        ));
        let gate = Arc::new(RepositoryPermissionChecker::new(shared.clone()));
        DashboardService::new(shared.clone(), shared, progress, gate)
    }

    fn service(repo: &InMemoryRepository) -> DashboardService {
        build(repo, Arc::new(repo.clone()))
    }

    fn student() -> RequestContext {
        RequestContext::new(STUDENT, Role::Student)
    }

    /// Chapter counting is down; the cached row is still readable.
    struct CountsOffline(InMemoryRepository);

    #[async_trait]
    impl ProgressRepository for CountsOffline {
        async fn chapter_counts(
            &self,
            _student_id: UserId,
            _course_id: CourseId,
        ) -> Result<ChapterCounts, StorageError> {
            Err(StorageError::Connection("database is locked".into()))
        }

        async fn mark_chapter_complete(
            &self,
            student_id: UserId,
            chapter: &Chapter,
            at: DateTime<Utc>,
        ) -> Result<(), StorageError> {
            self.0.mark_chapter_complete(student_id, chapter, at).await
        }

        async fn save_progress(
            &self,
            course_id: CourseId,
            student_id: UserId,
            snapshot: &ProgressSnapshot,
            now: DateTime<Utc>,
        ) -> Result<CourseProgress, StorageError> {
            self.0
                .save_progress(course_id, student_id, snapshot, now)
                .await
        }

        async fn get_progress(
            &self,
            course_id: CourseId,
            student_id: UserId,
        ) -> Result<Option<CourseProgress>, StorageError> {
            self.0.get_progress(course_id, student_id).await
        }
    }

    #[tokio::test]
    async fn cards_carry_fresh_progress() {
        let repo = InMemoryRepository::new();
        let (course_id, sections) = course(&repo, "Pattern matching", true, &[3]).await;
        enroll(&repo, course_id, sections).await;
        let first = repo.chapters_for(course_id).await.unwrap().remove(0);
        repo.mark_chapter_complete(STUDENT, &first, fixed_now())
            .await
            .unwrap();

        let cards = service(&repo).cards(&student()).await;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Pattern matching");
        let CardProgress::Fresh(snap) = &cards[0].progress else {
            panic!("expected fresh progress, got {:?}", cards[0].progress);
        };
        assert_eq!(snap.total_chapters, 3);
        assert_eq!(snap.percentage.to_string(), "33.33");
        assert_eq!(snap.status, ProgressStatus::InProgress);

        // The cached row was refreshed by the render.
        let cached = repo.get_progress(course_id, STUDENT).await.unwrap().unwrap();
        assert_eq!(cached.completed_chapters, 1);
    }

    #[tokio::test]
    async fn failed_recount_shows_last_cached_row() {
        let repo = InMemoryRepository::new();
        let (course_id, sections) = course(&repo, "Closures", true, &[3]).await;
        enroll(&repo, course_id, sections).await;
        let first = repo.chapters_for(course_id).await.unwrap().remove(0);
        repo.mark_chapter_complete(STUDENT, &first, fixed_now())
            .await
            .unwrap();
        service(&repo).cards(&student()).await;

        let degraded = build(&repo, Arc::new(CountsOffline(repo.clone())));
        let cards = degraded.cards(&student()).await;
        assert_eq!(cards.len(), 1);
        let CardProgress::Cached(row) = &cards[0].progress else {
            panic!("expected cached progress, got {:?}", cards[0].progress);
        };
        assert_eq!(row.completed_chapters, 1);
        assert_eq!(
            cards[0].progress.percentage().map(|p| p.to_string()),
            Some("33.33".to_owned())
        );
        assert_eq!(cards[0].progress.status(), Some(ProgressStatus::InProgress));
    }

    #[tokio::test]
    async fn no_enrollments_means_no_cards() {
        let repo = InMemoryRepository::new();
        assert!(service(&repo).cards(&student()).await.is_empty());
    }

    #[tokio::test]
    async fn course_detail_groups_chapters_and_hides_progress_from_visitors() {
        let repo = InMemoryRepository::new();
        let (course_id, sections) = course(&repo, "Traits", true, &[1, 2]).await;
        let svc = service(&repo);

        let detail = svc.course_detail(&student(), course_id).await.unwrap();
        assert_eq!(detail.price.to_string(), "15.00");
        assert_eq!(detail.sections.len(), 2);
        assert_eq!(detail.sections[0].chapters.len(), 1);
        assert_eq!(detail.sections[1].chapters.len(), 2);
        assert_eq!(detail.sections[1].chapters[1].title, "Chapter 1.1");
        assert!(detail.progress.is_none());
        assert!(repo.get_progress(course_id, STUDENT).await.unwrap().is_none());

        enroll(&repo, course_id, sections).await;
        let detail = svc.course_detail(&student(), course_id).await.unwrap();
        let snap = detail.progress.unwrap();
        assert_eq!(snap.total_chapters, 3);
        assert_eq!(snap.status, ProgressStatus::NotStarted);

        assert!(
            svc.course_detail(&student(), CourseId::new(99))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn unpublished_course_is_only_shown_to_its_managers() {
        let repo = InMemoryRepository::new();
        repo.grant_role(Role::Teacher, COURSE_MANAGE_OWN)
            .await
            .unwrap();
        repo.grant_role(Role::Admin, COURSE_MANAGE_ALL)
            .await
            .unwrap();
        let (draft_id, _) = course(&repo, "Unsafe", false, &[1]).await;
        let svc = service(&repo);

        assert!(svc.course_detail(&student(), draft_id).await.is_none());
        let other_teacher = RequestContext::new(UserId::new(8), Role::Teacher);
        assert!(svc.course_detail(&other_teacher, draft_id).await.is_none());

        let owner = RequestContext::new(TEACHER, Role::Teacher);
        let detail = svc.course_detail(&owner, draft_id).await.unwrap();
        assert_eq!(detail.status, CourseStatus::Draft);
        let admin = RequestContext::new(UserId::new(9), Role::Admin);
        assert!(svc.course_detail(&admin, draft_id).await.is_some());
    }
}
