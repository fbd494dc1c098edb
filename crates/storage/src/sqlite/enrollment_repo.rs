use lms_core::model::{CourseId, Enrollment, PaymentId, SectionProgress, UserId};
use sqlx::{Sqlite, Transaction};

use super::SqliteRepository;
use super::mapping::{conn, fk_or_conn, id_to_i64, map_enrollment_row, map_section_progress_row};
use super::payment_repo::insert_payment;
use crate::repository::{EnrollmentRepository, FreeEnrollmentRecord, StorageError};

/// Every write of a free enrollment; the caller owns commit and rollback.
async fn write_free_enrollment(
    tx: &mut Transaction<'_, Sqlite>,
    record: &FreeEnrollmentRecord,
) -> Result<PaymentId, StorageError> {
    let course_id = id_to_i64("course_id", record.enrollment.course_id.value())?;
    let student_id = id_to_i64("student_id", record.enrollment.student_id.value())?;

    let inserted = sqlx::query(
        r"
        INSERT INTO enrollments (course_id, student_id, enrolled_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(course_id, student_id) DO NOTHING
        ",
    )
    .bind(course_id)
    .bind(student_id)
    .bind(record.enrollment.enrolled_at)
    .execute(&mut **tx)
    .await
    .map_err(fk_or_conn)?;

    if inserted.rows_affected() == 0 {
        return Err(StorageError::Conflict);
    }

    sqlx::query(
        r"
        INSERT INTO course_progress (course_id, student_id)
        VALUES (?1, ?2)
        ON CONFLICT(course_id, student_id) DO NOTHING
        ",
    )
    .bind(course_id)
    .bind(student_id)
    .execute(&mut **tx)
    .await
    .map_err(fk_or_conn)?;

    for section_id in &record.section_ids {
        sqlx::query(
            r"
            INSERT INTO section_progress (section_id, course_id, student_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(section_id, student_id) DO NOTHING
            ",
        )
        .bind(id_to_i64("section_id", section_id.value())?)
        .bind(course_id)
        .bind(student_id)
        .execute(&mut **tx)
        .await
        .map_err(fk_or_conn)?;
    }

    insert_payment(&mut **tx, &record.payment).await
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn is_enrolled(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM enrollments WHERE course_id = ?1 AND student_id = ?2")
            .bind(id_to_i64("course_id", course_id.value())?)
            .bind(id_to_i64("student_id", student_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Ok(row.is_some())
    }

    async fn enroll_free(&self, record: FreeEnrollmentRecord) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        match write_free_enrollment(&mut tx, &record).await {
            Ok(payment_id) => {
                tx.commit().await.map_err(conn)?;
                tracing::debug!(
                    course_id = record.enrollment.course_id.value(),
                    student_id = record.enrollment.student_id.value(),
                    payment_id = payment_id.value(),
                    sections = record.section_ids.len(),
                    "free enrollment committed"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        course_id = record.enrollment.course_id.value(),
                        student_id = record.enrollment.student_id.value(),
                        error = %rollback_err,
                        "free enrollment rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn enrollments_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT course_id, student_id, enrolled_at
            FROM enrollments
            WHERE student_id = ?1
            ORDER BY enrolled_at DESC, course_id DESC
            ",
        )
        .bind(id_to_i64("student_id", student_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut enrollments = Vec::with_capacity(rows.len());
        for row in rows {
            enrollments.push(map_enrollment_row(&row)?);
        }
        Ok(enrollments)
    }

    async fn section_progress_for(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Vec<SectionProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT section_id, course_id, student_id, completed_chapters, is_completed
            FROM section_progress
            WHERE course_id = ?1 AND student_id = ?2
            ORDER BY section_id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .bind(id_to_i64("student_id", student_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut progress = Vec::with_capacity(rows.len());
        for row in rows {
            progress.push(map_section_progress_row(&row)?);
        }
        Ok(progress)
    }
}
