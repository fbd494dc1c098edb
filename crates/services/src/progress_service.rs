use std::sync::Arc;

use lms_core::model::{
    ChapterId, CourseId, CourseProgress, ProgressSnapshot, RequestContext, UserId,
};
use storage::repository::{CourseRepository, EnrollmentRepository, ProgressRepository};

use crate::Clock;
use crate::error::ProgressServiceError;

/// Derives a student's course progress from chapter completions and keeps the
/// cached `course_progress` row in step.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    progress: Arc<dyn ProgressRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        progress: Arc<dyn ProgressRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            progress,
            enrollments,
        }
    }

    /// Recount chapters, derive percentage and status, and upsert the cached row.
    ///
    /// Safe to call repeatedly; the result only depends on the completion rows.
    /// Callers must have established that the student is enrolled; use
    /// [`ProgressService::for_student`] when that is not yet known.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if counting or the upsert fails.
    pub async fn recompute(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<ProgressSnapshot, ProgressServiceError> {
        let counts = self.progress.chapter_counts(student_id, course_id).await?;
        let snapshot = ProgressSnapshot::from_counts(counts.completed, counts.total)?;

        self.progress
            .save_progress(course_id, student_id, &snapshot, self.clock.now())
            .await?;

        tracing::debug!(
            student_id = student_id.value(),
            course_id = course_id.value(),
            completed = snapshot.completed_chapters,
            total = snapshot.total_chapters,
            percentage = %snapshot.percentage,
            status = %snapshot.status,
            "recomputed course progress"
        );
        Ok(snapshot)
    }

    /// Fresh progress of the acting student in one course.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::CourseNotFound` for an unknown course,
    /// `ProgressServiceError::NotEnrolled` if the student is not in it (nothing
    /// is written), or `ProgressServiceError::Storage` on persistence failure.
    pub async fn for_student(
        &self,
        ctx: &RequestContext,
        course_id: CourseId,
    ) -> Result<ProgressSnapshot, ProgressServiceError> {
        if self.courses.get_course(course_id).await?.is_none() {
            return Err(ProgressServiceError::CourseNotFound(course_id));
        }
        self.ensure_enrolled(ctx.user_id(), course_id).await?;
        self.recompute(ctx.user_id(), course_id).await
    }

    /// Mark a chapter done for the acting student and recompute its course.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::ChapterNotFound` for an unknown chapter,
    /// `ProgressServiceError::NotEnrolled` if the student is not in the course,
    /// or `ProgressServiceError::Storage` on persistence failure.
    pub async fn complete_chapter(
        &self,
        ctx: &RequestContext,
        chapter_id: ChapterId,
    ) -> Result<ProgressSnapshot, ProgressServiceError> {
        let chapter = self
            .courses
            .get_chapter(chapter_id)
            .await?
            .ok_or(ProgressServiceError::ChapterNotFound(chapter_id))?;
        let section = self
            .courses
            .get_section(chapter.section_id)
            .await?
            .ok_or(ProgressServiceError::ChapterNotFound(chapter_id))?;

        let student_id = ctx.user_id();
        self.ensure_enrolled(student_id, section.course_id).await?;

        self.progress
            .mark_chapter_complete(student_id, &chapter, self.clock.now())
            .await?;
        self.recompute(student_id, section.course_id).await
    }

    /// The cached row as last written; `Ok(None)` before enrollment.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn cached(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, ProgressServiceError> {
        Ok(self.progress.get_progress(course_id, student_id).await?)
    }

    async fn ensure_enrolled(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<(), ProgressServiceError> {
        if self.enrollments.is_enrolled(course_id, student_id).await? {
            Ok(())
        } else {
            Err(ProgressServiceError::NotEnrolled(course_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{ContentType, Course, Enrollment, NewPayment, ProgressStatus, Role};
    use lms_core::time::{fixed_clock, fixed_now};
    use rust_decimal::Decimal;
    use storage::repository::{
        FreeEnrollmentRecord, InMemoryRepository, NewChapterRecord, NewCourseRecord,
        NewSectionRecord,
    };

    const STUDENT: UserId = UserId::new(7);

    async fn outline(
        repo: &InMemoryRepository,
        kinds: &[ContentType],
    ) -> (CourseId, Vec<ChapterId>) {
        let course = Course::new_draft(
            CourseId::new(0),
            UserId::new(1),
            None,
            "Ownership",
            Decimal::ZERO,
            fixed_now(),
        )
        .unwrap();
        let course_id = repo
            .insert_course(NewCourseRecord::from_course(&course))
            .await
            .unwrap();
        let section_id = repo
            .insert_section(NewSectionRecord {
                course_id,
                title: "Basics".into(),
                order_index: 0,
            })
            .await
            .unwrap();
        let mut chapters = Vec::new();
        for (i, kind) in kinds.iter().enumerate() {
            chapters.push(
                repo.insert_chapter(NewChapterRecord {
                    section_id,
                    title: format!("Chapter {i}"),
                    content_type: *kind,
                    order_index: u32::try_from(i).unwrap(),
                })
                .await
                .unwrap(),
            );
        }
        (course_id, chapters)
    }

    async fn enroll(repo: &InMemoryRepository, course_id: CourseId) {
        repo.enroll_free(FreeEnrollmentRecord {
            enrollment: Enrollment::new(course_id, STUDENT, fixed_now()),
            section_ids: Vec::new(),
            payment: NewPayment::free_enrollment(STUDENT, course_id, fixed_now()),
        })
        .await
        .unwrap();
    }

    fn service(repo: &InMemoryRepository) -> ProgressService {
        let repo = Arc::new(repo.clone());
        ProgressService::new(fixed_clock(), repo.clone(), repo.clone(), repo)
    }

    #[tokio::test]
    async fn empty_course_is_zero_and_still_cached() {
        let repo = InMemoryRepository::new();
        let (course_id, _) = outline(&repo, &[]).await;
        enroll(&repo, course_id).await;
        let svc = service(&repo);
        let ctx = RequestContext::new(STUDENT, Role::Student);

        let snap = svc.for_student(&ctx, course_id).await.unwrap();
        assert_eq!(snap.total_chapters, 0);
        assert_eq!(snap.percentage.to_string(), "0.00");
        assert_eq!(snap.status, ProgressStatus::NotStarted);
        assert!(svc.cached(STUDENT, course_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unenrolled_viewer_gets_no_progress_row() {
        let repo = InMemoryRepository::new();
        let (course_id, _) = outline(&repo, &[ContentType::Text]).await;
        let svc = service(&repo);
        let admin = RequestContext::new(UserId::new(3), Role::Admin);

        let err = svc.for_student(&admin, course_id).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::NotEnrolled(id) if id == course_id));
        assert!(svc.cached(admin.user_id(), course_id).await.unwrap().is_none());

        let err = svc
            .for_student(&admin, CourseId::new(4_040))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::CourseNotFound(_)));
    }

    #[tokio::test]
    async fn half_of_mixed_chapters_is_in_progress() {
        let repo = InMemoryRepository::new();
        let mut kinds = vec![ContentType::Video; 5];
        kinds.extend([ContentType::Text; 5]);
        let (course_id, chapters) = outline(&repo, &kinds).await;
        enroll(&repo, course_id).await;
        let svc = service(&repo);
        let ctx = RequestContext::new(STUDENT, Role::Student);

        // Three videos and two texts.
        for id in [chapters[0], chapters[1], chapters[2], chapters[5], chapters[6]] {
            svc.complete_chapter(&ctx, id).await.unwrap();
        }

        let snap = svc.recompute(STUDENT, course_id).await.unwrap();
        assert_eq!(snap.completed_chapters, 5);
        assert_eq!(snap.total_chapters, 10);
        assert_eq!(snap.percentage.to_string(), "50.00");
        assert_eq!(snap.status, ProgressStatus::InProgress);
    }

    #[tokio::test]
    async fn finishing_every_chapter_completes_once() {
        let repo = InMemoryRepository::new();
        let (course_id, chapters) = outline(&repo, &[ContentType::Text; 4]).await;
        enroll(&repo, course_id).await;
        let svc = service(&repo);
        let ctx = RequestContext::new(STUDENT, Role::Student);

        let mut last = None;
        for id in &chapters {
            last = Some(svc.complete_chapter(&ctx, *id).await.unwrap());
        }
        let snap = last.unwrap();
        assert_eq!(snap.percentage.to_string(), "100.00");
        assert_eq!(snap.status, ProgressStatus::Completed);

        let first = svc.cached(STUDENT, course_id).await.unwrap().unwrap();
        assert_eq!(first.completed_at, Some(fixed_now()));

        // A later recompute with a moved clock keeps the original stamp.
        let mut later = fixed_clock();
        later.advance(chrono::Duration::days(2));
        let repo_arc = Arc::new(repo.clone());
        let svc_later = ProgressService::new(later, repo_arc.clone(), repo_arc.clone(), repo_arc);
        let again = svc_later.recompute(STUDENT, course_id).await.unwrap();
        assert_eq!(again, snap);
        let second = svc.cached(STUDENT, course_id).await.unwrap().unwrap();
        assert_eq!(second.completed_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn completing_requires_enrollment() {
        let repo = InMemoryRepository::new();
        let (course_id, chapters) = outline(&repo, &[ContentType::Video]).await;
        let svc = service(&repo);
        let ctx = RequestContext::new(STUDENT, Role::Student);

        let err = svc.complete_chapter(&ctx, chapters[0]).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::NotEnrolled(id) if id == course_id));

        let err = svc
            .complete_chapter(&ctx, ChapterId::new(9_999))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::ChapterNotFound(_)));
    }
}
