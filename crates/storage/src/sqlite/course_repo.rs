use lms_core::model::{Chapter, ChapterId, Course, CourseId, Section, SectionId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, fk_or_conn, id_to_i64, map_chapter_row, map_course_row, map_section_row};
use crate::repository::{
    CourseRepository, NewChapterRecord, NewCourseRecord, NewSectionRecord, StorageError,
};

const COURSE_COLUMNS: &str = "id, title, price, status, is_archived, is_published, teacher_id, category_id, created_at";

fn flag(v: bool) -> i64 {
    i64::from(v)
}

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn insert_course(&self, course: NewCourseRecord) -> Result<CourseId, StorageError> {
        let category = course
            .category_id
            .map(|c| id_to_i64("category_id", c.value()))
            .transpose()?;

        let res = sqlx::query(
            r"
            INSERT INTO courses (
                title, price, status, is_archived, is_published, teacher_id, category_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(course.title)
        .bind(course.price.to_string())
        .bind(course.status.as_str())
        .bind(flag(course.status.is_archived()))
        .bind(flag(course.status.is_published()))
        .bind(id_to_i64("teacher_id", course.teacher_id.value())?)
        .bind(category)
        .bind(course.created_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("course_id sign overflow".into()))?;
        Ok(CourseId::new(id))
    }

    async fn update_course(&self, course: &Course) -> Result<(), StorageError> {
        let category = course
            .category_id()
            .map(|c| id_to_i64("category_id", c.value()))
            .transpose()?;

        // teacher_id and created_at are fixed at insert.
        let res = sqlx::query(
            r"
            UPDATE courses SET
                title = ?2,
                price = ?3,
                status = ?4,
                is_archived = ?5,
                is_published = ?6,
                category_id = ?7
            WHERE id = ?1
            ",
        )
        .bind(id_to_i64("course_id", course.id().value())?)
        .bind(course.title())
        .bind(course.price().to_string())
        .bind(course.status().as_str())
        .bind(flag(course.status().is_archived()))
        .bind(flag(course.status().is_published()))
        .bind(category)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_to_i64("course_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_course_row).transpose()
    }

    async fn courses_by_teacher(&self, teacher_id: UserId) -> Result<Vec<Course>, StorageError> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE teacher_id = ?1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_to_i64("teacher_id", teacher_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            courses.push(map_course_row(&row)?);
        }
        Ok(courses)
    }

    async fn insert_section(&self, section: NewSectionRecord) -> Result<SectionId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO sections (course_id, title, order_index)
            VALUES (?1, ?2, ?3)
            ",
        )
        .bind(id_to_i64("course_id", section.course_id.value())?)
        .bind(section.title)
        .bind(i64::from(section.order_index))
        .execute(&self.pool)
        .await
        .map_err(fk_or_conn)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("section_id sign overflow".into()))?;
        Ok(SectionId::new(id))
    }

    async fn insert_chapter(&self, chapter: NewChapterRecord) -> Result<ChapterId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO chapters (section_id, title, content_type, order_index)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_to_i64("section_id", chapter.section_id.value())?)
        .bind(chapter.title)
        .bind(chapter.content_type.as_str())
        .bind(i64::from(chapter.order_index))
        .execute(&self.pool)
        .await
        .map_err(fk_or_conn)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("chapter_id sign overflow".into()))?;
        Ok(ChapterId::new(id))
    }

    async fn get_section(&self, id: SectionId) -> Result<Option<Section>, StorageError> {
        let row = sqlx::query(
            "SELECT id, course_id, title, order_index FROM sections WHERE id = ?1",
        )
        .bind(id_to_i64("section_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_section_row).transpose()
    }

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError> {
        let row = sqlx::query(
            "SELECT id, section_id, title, content_type, order_index FROM chapters WHERE id = ?1",
        )
        .bind(id_to_i64("chapter_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_chapter_row).transpose()
    }

    async fn sections_for(&self, course_id: CourseId) -> Result<Vec<Section>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, order_index
            FROM sections
            WHERE course_id = ?1
            ORDER BY order_index ASC, id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut sections = Vec::with_capacity(rows.len());
        for row in rows {
            sections.push(map_section_row(&row)?);
        }
        Ok(sections)
    }

    async fn chapters_for(&self, course_id: CourseId) -> Result<Vec<Chapter>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT ch.id AS id, ch.section_id AS section_id, ch.title AS title,
                   ch.content_type AS content_type, ch.order_index AS order_index
            FROM chapters ch
            JOIN sections s ON s.id = ch.section_id
            WHERE s.course_id = ?1
            ORDER BY s.order_index ASC, s.id ASC, ch.order_index ASC, ch.id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut chapters = Vec::with_capacity(rows.len());
        for row in rows {
            chapters.push(map_chapter_row(&row)?);
        }
        Ok(chapters)
    }
}
