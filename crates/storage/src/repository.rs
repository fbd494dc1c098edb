use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::model::{
    CategoryId, Chapter, ChapterId, ContentType, Course, CourseId, CourseProgress, CourseStatus,
    Enrollment, NewPayment, Payment, PaymentId, PaymentStatus, PermissionSet, ProgressSnapshot,
    Role, Section, SectionId, SectionProgress, User, UserId,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Insert shape for a course; the database assigns the id.
#[derive(Debug, Clone)]
pub struct NewCourseRecord {
    pub teacher_id: UserId,
    pub category_id: Option<CategoryId>,
    pub title: String,
    pub price: Decimal,
    pub status: CourseStatus,
    pub created_at: DateTime<Utc>,
}

impl NewCourseRecord {
    #[must_use]
    pub fn from_course(course: &Course) -> Self {
        Self {
            teacher_id: course.teacher_id(),
            category_id: course.category_id(),
            title: course.title().to_owned(),
            price: course.price(),
            status: course.status(),
            created_at: course.created_at(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSectionRecord {
    pub course_id: CourseId,
    pub title: String,
    pub order_index: u32,
}

#[derive(Debug, Clone)]
pub struct NewChapterRecord {
    pub section_id: SectionId,
    pub title: String,
    pub content_type: ContentType,
    pub order_index: u32,
}

/// Raw chapter counts for one (student, course) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChapterCounts {
    pub total: u32,
    pub completed: u32,
}

/// Everything written by a free enrollment, applied all-or-nothing.
#[derive(Debug, Clone)]
pub struct FreeEnrollmentRecord {
    pub enrollment: Enrollment,
    pub section_ids: Vec<SectionId>,
    pub payment: NewPayment,
}

/// Filter for payment ledger queries. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub user_id: Option<UserId>,
    pub course_id: Option<CourseId>,
    pub limit: Option<u32>,
}

impl PaymentFilter {
    fn matches(&self, payment: &Payment) -> bool {
        self.status.is_none_or(|s| s == payment.status)
            && self.user_id.is_none_or(|u| u == payment.user_id)
            && self.course_id.is_none_or(|c| c == payment.course_id)
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist or update a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the user cannot be stored.
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError>;

    /// Fetch a user by ID; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError>;
}

/// Read/write access to `user_permissions` and `role_permissions`.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// True when the user, directly or through `role`, holds any of `names`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn holds_any(
        &self,
        user_id: UserId,
        role: Role,
        names: &[&str],
    ) -> Result<bool, StorageError>;

    /// All permission names held by the user, direct and role defaults combined.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn permissions_for(
        &self,
        user_id: UserId,
        role: Role,
    ) -> Result<PermissionSet, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the grant cannot be stored.
    async fn grant_user(&self, user_id: UserId, name: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the revoke fails.
    async fn revoke_user(&self, user_id: UserId, name: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the grant cannot be stored.
    async fn grant_role(&self, role: Role, name: &str) -> Result<(), StorageError>;
}

/// Courses with their section/chapter outline.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn insert_course(&self, course: NewCourseRecord) -> Result<CourseId, StorageError>;

    /// Write the mutable fields (title, price, status flags) of an existing course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course does not exist.
    async fn update_course(&self, course: &Course) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// Courses owned by a teacher, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn courses_by_teacher(&self, teacher_id: UserId) -> Result<Vec<Course>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the section cannot be stored.
    async fn insert_section(&self, section: NewSectionRecord) -> Result<SectionId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the chapter cannot be stored.
    async fn insert_chapter(&self, chapter: NewChapterRecord) -> Result<ChapterId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn get_section(&self, id: SectionId) -> Result<Option<Section>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError>;

    /// Sections of a course in `order_index` order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn sections_for(&self, course_id: CourseId) -> Result<Vec<Section>, StorageError>;

    /// Chapters of a course, ordered by section then chapter `order_index`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn chapters_for(&self, course_id: CourseId) -> Result<Vec<Chapter>, StorageError>;
}

/// Chapter completion rows and the cached `course_progress` row.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Count total chapters of the course and those the student has completed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn chapter_counts(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<ChapterCounts, StorageError>;

    /// Mark a chapter completed in the progress table matching its content type.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn mark_chapter_complete(
        &self,
        student_id: UserId,
        chapter: &Chapter,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Upsert the derived values, overwriting any previous row.
    ///
    /// `completed_at` is only written the first time the row becomes completed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn save_progress(
        &self,
        course_id: CourseId,
        student_id: UserId,
        snapshot: &ProgressSnapshot,
        now: DateTime<Utc>,
    ) -> Result<CourseProgress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn get_progress(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Option<CourseProgress>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn is_enrolled(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<bool, StorageError>;

    /// Write enrollment, zero progress rows and the ledger row in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the student is already enrolled, or
    /// any other `StorageError` if a write fails. Nothing is persisted on error.
    async fn enroll_free(&self, record: FreeEnrollmentRecord) -> Result<(), StorageError>;

    /// Enrollments of a student, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn enrollments_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<Enrollment>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn section_progress_for(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Vec<SectionProgress>, StorageError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn record_payment(&self, payment: NewPayment) -> Result<PaymentId, StorageError>;

    /// Ledger rows matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or mapping failure.
    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    user_permissions: HashMap<UserId, HashSet<String>>,
    role_permissions: HashMap<Role, HashSet<String>>,
    courses: BTreeMap<CourseId, Course>,
    sections: BTreeMap<SectionId, Section>,
    chapters: BTreeMap<ChapterId, Chapter>,
    video_progress: HashSet<(ChapterId, UserId)>,
    text_progress: HashSet<(ChapterId, UserId)>,
    enrollments: HashMap<(CourseId, UserId), Enrollment>,
    course_progress: HashMap<(CourseId, UserId), CourseProgress>,
    section_progress: HashMap<(SectionId, UserId), SectionProgress>,
    payments: BTreeMap<PaymentId, Payment>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn course_chapters(&self, course_id: CourseId) -> Vec<&Chapter> {
        let mut chapters: Vec<&Chapter> = self
            .chapters
            .values()
            .filter(|ch| {
                self.sections
                    .get(&ch.section_id)
                    .is_some_and(|s| s.course_id == course_id)
            })
            .collect();
        chapters.sort_by_key(|ch| {
            let section_order = self
                .sections
                .get(&ch.section_id)
                .map_or(u32::MAX, |s| s.order_index);
            (section_order, ch.section_id, ch.order_index, ch.id)
        });
        chapters
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// A single lock guards all tables, so multi-table writes are atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn count(n: usize) -> Result<u32, StorageError> {
    u32::try_from(n).map_err(|_| StorageError::Serialization("count overflow".into()))
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.users.insert(user.id(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.users.get(&id).cloned())
    }
}

#[async_trait]
impl PermissionRepository for InMemoryRepository {
    async fn holds_any(
        &self,
        user_id: UserId,
        role: Role,
        names: &[&str],
    ) -> Result<bool, StorageError> {
        let held = self.permissions_for(user_id, role).await?;
        Ok(held.contains_any(names))
    }

    async fn permissions_for(
        &self,
        user_id: UserId,
        role: Role,
    ) -> Result<PermissionSet, StorageError> {
        let guard = self.lock()?;
        let mut set = PermissionSet::new();
        if let Some(direct) = guard.user_permissions.get(&user_id) {
            set.extend(direct.iter().cloned());
        }
        if let Some(defaults) = guard.role_permissions.get(&role) {
            set.extend(defaults.iter().cloned());
        }
        Ok(set)
    }

    async fn grant_user(&self, user_id: UserId, name: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard
            .user_permissions
            .entry(user_id)
            .or_default()
            .insert(name.to_owned());
        Ok(())
    }

    async fn revoke_user(&self, user_id: UserId, name: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if let Some(names) = guard.user_permissions.get_mut(&user_id) {
            names.remove(name);
        }
        Ok(())
    }

    async fn grant_role(&self, role: Role, name: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard
            .role_permissions
            .entry(role)
            .or_default()
            .insert(name.to_owned());
        Ok(())
    }
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn insert_course(&self, course: NewCourseRecord) -> Result<CourseId, StorageError> {
        let mut guard = self.lock()?;
        let id = CourseId::new(guard.next_id());
        let stored = Course::from_persisted(
            id,
            course.teacher_id,
            course.category_id,
            course.title,
            course.price,
            course.status,
            course.created_at,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.courses.insert(id, stored);
        Ok(id)
    }

    async fn update_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        match guard.courses.get_mut(&course.id()) {
            Some(existing) => {
                *existing = course.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound),
        }
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.courses.get(&id).cloned())
    }

    async fn courses_by_teacher(&self, teacher_id: UserId) -> Result<Vec<Course>, StorageError> {
        let guard = self.lock()?;
        let mut courses: Vec<Course> = guard
            .courses
            .values()
            .filter(|c| c.teacher_id() == teacher_id)
            .cloned()
            .collect();
        courses.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(courses)
    }

    async fn insert_section(&self, section: NewSectionRecord) -> Result<SectionId, StorageError> {
        let mut guard = self.lock()?;
        if !guard.courses.contains_key(&section.course_id) {
            return Err(StorageError::NotFound);
        }
        let id = SectionId::new(guard.next_id());
        guard.sections.insert(
            id,
            Section {
                id,
                course_id: section.course_id,
                title: section.title,
                order_index: section.order_index,
            },
        );
        Ok(id)
    }

    async fn insert_chapter(&self, chapter: NewChapterRecord) -> Result<ChapterId, StorageError> {
        let mut guard = self.lock()?;
        if !guard.sections.contains_key(&chapter.section_id) {
            return Err(StorageError::NotFound);
        }
        let id = ChapterId::new(guard.next_id());
        guard.chapters.insert(
            id,
            Chapter {
                id,
                section_id: chapter.section_id,
                title: chapter.title,
                content_type: chapter.content_type,
                order_index: chapter.order_index,
            },
        );
        Ok(id)
    }

    async fn get_section(&self, id: SectionId) -> Result<Option<Section>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.sections.get(&id).cloned())
    }

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.chapters.get(&id).cloned())
    }

    async fn sections_for(&self, course_id: CourseId) -> Result<Vec<Section>, StorageError> {
        let guard = self.lock()?;
        let mut sections: Vec<Section> = guard
            .sections
            .values()
            .filter(|s| s.course_id == course_id)
            .cloned()
            .collect();
        sections.sort_by_key(|s| (s.order_index, s.id));
        Ok(sections)
    }

    async fn chapters_for(&self, course_id: CourseId) -> Result<Vec<Chapter>, StorageError> {
        let guard = self.lock()?;
        let chapters: Vec<Chapter> = guard
            .course_chapters(course_id)
            .into_iter()
            .cloned()
            .collect();
        Ok(chapters)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn chapter_counts(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<ChapterCounts, StorageError> {
        let guard = self.lock()?;
        let chapters = guard.course_chapters(course_id);
        let completed = chapters
            .iter()
            .filter(|ch| match ch.content_type {
                ContentType::Video => guard.video_progress.contains(&(ch.id, student_id)),
                ContentType::Text => guard.text_progress.contains(&(ch.id, student_id)),
            })
            .count();
        Ok(ChapterCounts {
            total: count(chapters.len())?,
            completed: count(completed)?,
        })
    }

    async fn mark_chapter_complete(
        &self,
        student_id: UserId,
        chapter: &Chapter,
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.chapters.contains_key(&chapter.id) {
            return Err(StorageError::NotFound);
        }
        match chapter.content_type {
            ContentType::Video => guard.video_progress.insert((chapter.id, student_id)),
            ContentType::Text => guard.text_progress.insert((chapter.id, student_id)),
        };
        Ok(())
    }

    async fn save_progress(
        &self,
        course_id: CourseId,
        student_id: UserId,
        snapshot: &ProgressSnapshot,
        now: DateTime<Utc>,
    ) -> Result<CourseProgress, StorageError> {
        let mut guard = self.lock()?;
        let row = guard
            .course_progress
            .entry((course_id, student_id))
            .or_insert_with(|| CourseProgress::initial(course_id, student_id));
        row.apply(snapshot, now);
        Ok(row.clone())
    }

    async fn get_progress(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.course_progress.get(&(course_id, student_id)).cloned())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn is_enrolled(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<bool, StorageError> {
        let guard = self.lock()?;
        Ok(guard.enrollments.contains_key(&(course_id, student_id)))
    }

    async fn enroll_free(&self, record: FreeEnrollmentRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let course_id = record.enrollment.course_id;
        let student_id = record.enrollment.student_id;
        if guard.enrollments.contains_key(&(course_id, student_id)) {
            return Err(StorageError::Conflict);
        }
        if !guard.courses.contains_key(&course_id) {
            return Err(StorageError::NotFound);
        }

        // Validate everything before the first write so a failure leaves no trace.
        let payment_id = PaymentId::new(guard.next_id());
        let payment = record
            .payment
            .assign_id(payment_id)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        guard
            .enrollments
            .insert((course_id, student_id), record.enrollment);
        guard
            .course_progress
            .entry((course_id, student_id))
            .or_insert_with(|| CourseProgress::initial(course_id, student_id));
        for section_id in record.section_ids {
            guard
                .section_progress
                .entry((section_id, student_id))
                .or_insert_with(|| SectionProgress::initial(section_id, course_id, student_id));
        }
        guard.payments.insert(payment_id, payment);
        Ok(())
    }

    async fn enrollments_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<Enrollment> = guard
            .enrollments
            .values()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.enrolled_at
                .cmp(&a.enrolled_at)
                .then_with(|| b.course_id.cmp(&a.course_id))
        });
        Ok(rows)
    }

    async fn section_progress_for(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Vec<SectionProgress>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<SectionProgress> = guard
            .section_progress
            .values()
            .filter(|p| p.course_id == course_id && p.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.section_id);
        Ok(rows)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryRepository {
    async fn record_payment(&self, payment: NewPayment) -> Result<PaymentId, StorageError> {
        let mut guard = self.lock()?;
        let id = PaymentId::new(guard.next_id());
        let payment = payment
            .assign_id(id)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.payments.insert(id, payment);
        Ok(id)
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<Payment> = guard
            .payments
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.payment_date
                .cmp(&a.payment_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = filter.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(rows)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub permissions: Arc<dyn PermissionRepository>,
    pub courses: Arc<dyn CourseRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub payments: Arc<dyn PaymentRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one backend for every repository.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: UserRepository
            + PermissionRepository
            + CourseRepository
            + ProgressRepository
            + EnrollmentRepository
            + PaymentRepository
            + Clone
            + 'static,
    {
        Self {
            users: Arc::new(repo.clone()),
            permissions: Arc::new(repo.clone()),
            courses: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            payments: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::time::fixed_now;

    async fn course_with_outline(repo: &InMemoryRepository, chapters: &[ContentType]) -> CourseId {
        let course = Course::new_draft(
            CourseId::new(0),
            UserId::new(1),
            None,
            "Outline",
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
                title: "Only".into(),
                order_index: 0,
            })
            .await
            .unwrap();
        for (i, kind) in chapters.iter().enumerate() {
            repo.insert_chapter(NewChapterRecord {
                section_id,
                title: format!("Chapter {i}"),
                content_type: *kind,
                order_index: u32::try_from(i).unwrap(),
            })
            .await
            .unwrap();
        }
        course_id
    }

    #[tokio::test]
    async fn completion_only_counts_matching_table() {
        let repo = InMemoryRepository::new();
        let course_id =
            course_with_outline(&repo, &[ContentType::Video, ContentType::Text]).await;
        let student = UserId::new(9);
        let chapters = repo.chapters_for(course_id).await.unwrap();

        repo.mark_chapter_complete(student, &chapters[0], fixed_now())
            .await
            .unwrap();
        // A text row for a video chapter must not count.
        repo.lock()
            .unwrap()
            .text_progress
            .insert((chapters[0].id, student));

        let counts = repo.chapter_counts(student, course_id).await.unwrap();
        assert_eq!(counts, ChapterCounts { total: 2, completed: 1 });
    }

    #[tokio::test]
    async fn role_defaults_merge_with_direct_grants() {
        let repo = InMemoryRepository::new();
        repo.grant_role(Role::Admin, "payment_view_history")
            .await
            .unwrap();
        repo.grant_user(UserId::new(5), "audit_view_logs")
            .await
            .unwrap();

        let held = repo
            .permissions_for(UserId::new(5), Role::Admin)
            .await
            .unwrap();
        assert_eq!(held.len(), 2);
        assert!(
            !repo
                .holds_any(UserId::new(5), Role::Student, &["payment_view_history"])
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn enroll_free_rejects_duplicates() {
        let repo = InMemoryRepository::new();
        let course_id = course_with_outline(&repo, &[ContentType::Text]).await;
        let student = UserId::new(3);
        let record = FreeEnrollmentRecord {
            enrollment: Enrollment::new(course_id, student, fixed_now()),
            section_ids: repo
                .sections_for(course_id)
                .await
                .unwrap()
                .iter()
                .map(|s| s.id)
                .collect(),
            payment: NewPayment::free_enrollment(student, course_id, fixed_now()),
        };

        repo.enroll_free(record.clone()).await.unwrap();
        assert!(matches!(
            repo.enroll_free(record).await,
            Err(StorageError::Conflict)
        ));
        assert_eq!(
            repo.list_payments(&PaymentFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            repo.section_progress_for(course_id, student)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
