use chrono::{DateTime, Utc};
use lms_core::model::{
    Chapter, ContentType, CourseId, CourseProgress, ProgressSnapshot, ProgressStatus, UserId,
};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, fk_or_conn, i64_to_u32, id_to_i64, map_progress_row, ser};
use crate::repository::{ChapterCounts, ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = "course_id, student_id, completed_sections, completion_percentage, completion_status, completed_at";

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn chapter_counts(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<ChapterCounts, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(ch.id) AS total,
                COUNT(DISTINCT CASE
                    WHEN ch.content_type = 'video' AND vp.completed = 1 THEN ch.id
                    WHEN ch.content_type = 'text' AND tp.completed = 1 THEN ch.id
                END) AS completed
            FROM chapters ch
            JOIN sections s ON s.id = ch.section_id
            LEFT JOIN video_progress vp ON vp.chapter_id = ch.id AND vp.student_id = ?2
            LEFT JOIN text_progress tp ON tp.chapter_id = ch.id AND tp.student_id = ?2
            WHERE s.course_id = ?1
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .bind(id_to_i64("student_id", student_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        Ok(ChapterCounts {
            total: i64_to_u32("total", row.try_get("total").map_err(ser)?)?,
            completed: i64_to_u32("completed", row.try_get("completed").map_err(ser)?)?,
        })
    }

    async fn mark_chapter_complete(
        &self,
        student_id: UserId,
        chapter: &Chapter,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let sql = match chapter.content_type {
            ContentType::Video => {
                r"
                INSERT INTO video_progress (chapter_id, student_id, completed, updated_at)
                VALUES (?1, ?2, 1, ?3)
                ON CONFLICT(chapter_id, student_id) DO UPDATE SET
                    completed = 1,
                    updated_at = excluded.updated_at
                "
            }
            ContentType::Text => {
                r"
                INSERT INTO text_progress (chapter_id, student_id, completed, updated_at)
                VALUES (?1, ?2, 1, ?3)
                ON CONFLICT(chapter_id, student_id) DO UPDATE SET
                    completed = 1,
                    updated_at = excluded.updated_at
                "
            }
        };

        sqlx::query(sql)
            .bind(id_to_i64("chapter_id", chapter.id.value())?)
            .bind(id_to_i64("student_id", student_id.value())?)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(fk_or_conn)?;
        Ok(())
    }

    async fn save_progress(
        &self,
        course_id: CourseId,
        student_id: UserId,
        snapshot: &ProgressSnapshot,
        now: DateTime<Utc>,
    ) -> Result<CourseProgress, StorageError> {
        let completed_at = (snapshot.status == ProgressStatus::Completed).then_some(now);

        let sql = format!(
            r"
            INSERT INTO course_progress (
                course_id, student_id, completed_sections, completion_percentage,
                completion_status, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(course_id, student_id) DO UPDATE SET
                completed_sections = excluded.completed_sections,
                completion_percentage = excluded.completion_percentage,
                completion_status = excluded.completion_status,
                completed_at = CASE
                    WHEN course_progress.completed_at IS NULL
                         AND excluded.completion_status = 'completed'
                        THEN excluded.completed_at
                    ELSE course_progress.completed_at
                END
            RETURNING {PROGRESS_COLUMNS}
            "
        );

        let row = sqlx::query(&sql)
            .bind(id_to_i64("course_id", course_id.value())?)
            .bind(id_to_i64("student_id", student_id.value())?)
            .bind(i64::from(snapshot.completed_chapters))
            .bind(snapshot.percentage.to_string())
            .bind(snapshot.status.as_str())
            .bind(completed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(fk_or_conn)?;

        map_progress_row(&row)
    }

    async fn get_progress(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM course_progress WHERE course_id = ?1 AND student_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("course_id", course_id.value())?)
            .bind(id_to_i64("student_id", student_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }
}
