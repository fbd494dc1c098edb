use std::str::FromStr;

use lms_core::model::{
    CategoryId, Chapter, ChapterId, Course, CourseId, CourseProgress, CourseStatus, Enrollment,
    Payment, PaymentId, ProgressError, Section, SectionId, SectionProgress, User, UserId,
};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// A dangling course, user or chapter reference surfaces as `NotFound`.
pub(crate) fn fk_or_conn(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => StorageError::NotFound,
        other => conn(other),
    }
}

/// Domain ids are u64; SQLite rowids are i64.
pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn get_u64(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    i64_to_u64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_u32(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    i64_to_u32(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_bool(row: &SqliteRow, field: &'static str) -> Result<bool, StorageError> {
    Ok(row.try_get::<i64, _>(field).map_err(ser)? != 0)
}

/// Decimals are stored as canonical text so cents survive exactly.
pub(crate) fn decimal_from_text(field: &'static str, raw: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field} {raw:?}: {e}")))
}

fn get_decimal(row: &SqliteRow, field: &'static str) -> Result<Decimal, StorageError> {
    let raw: String = row.try_get(field).map_err(ser)?;
    decimal_from_text(field, &raw)
}

fn parse_column<T>(row: &SqliteRow, field: &'static str) -> Result<T, StorageError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = row.try_get(field).map_err(ser)?;
    raw.parse::<T>().map_err(ser)
}

pub(crate) fn map_user_row(row: &SqliteRow) -> Result<User, StorageError> {
    User::new(
        UserId::new(get_u64(row, "id")?),
        parse_column(row, "role")?,
        row.try_get::<String, _>("display_name").map_err(ser)?,
        row.try_get::<String, _>("email").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<Course, StorageError> {
    let status: CourseStatus = parse_column(row, "status")?;
    if get_bool(row, "is_published")? != status.is_published()
        || get_bool(row, "is_archived")? != status.is_archived()
    {
        return Err(StorageError::Serialization(format!(
            "course flags disagree with status {status}"
        )));
    }

    let category_id = row
        .try_get::<Option<i64>, _>("category_id")
        .map_err(ser)?
        .map(|v| i64_to_u64("category_id", v).map(CategoryId::new))
        .transpose()?;

    Course::from_persisted(
        CourseId::new(get_u64(row, "id")?),
        UserId::new(get_u64(row, "teacher_id")?),
        category_id,
        row.try_get::<String, _>("title").map_err(ser)?,
        get_decimal(row, "price")?,
        status,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_section_row(row: &SqliteRow) -> Result<Section, StorageError> {
    Ok(Section {
        id: SectionId::new(get_u64(row, "id")?),
        course_id: CourseId::new(get_u64(row, "course_id")?),
        title: row.try_get("title").map_err(ser)?,
        order_index: get_u32(row, "order_index")?,
    })
}

pub(crate) fn map_chapter_row(row: &SqliteRow) -> Result<Chapter, StorageError> {
    Ok(Chapter {
        id: ChapterId::new(get_u64(row, "id")?),
        section_id: SectionId::new(get_u64(row, "section_id")?),
        title: row.try_get("title").map_err(ser)?,
        content_type: parse_column(row, "content_type")?,
        order_index: get_u32(row, "order_index")?,
    })
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<CourseProgress, StorageError> {
    let completion_percentage = get_decimal(row, "completion_percentage")?;
    if completion_percentage < Decimal::ZERO || completion_percentage > Decimal::ONE_HUNDRED {
        return Err(ser(ProgressError::PercentageOutOfRange(
            completion_percentage,
        )));
    }
    Ok(CourseProgress {
        course_id: CourseId::new(get_u64(row, "course_id")?),
        student_id: UserId::new(get_u64(row, "student_id")?),
        completed_chapters: get_u32(row, "completed_sections")?,
        completion_percentage,
        status: parse_column(row, "completion_status")?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment::new(
        CourseId::new(get_u64(row, "course_id")?),
        UserId::new(get_u64(row, "student_id")?),
        row.try_get("enrolled_at").map_err(ser)?,
    ))
}

pub(crate) fn map_section_progress_row(row: &SqliteRow) -> Result<SectionProgress, StorageError> {
    Ok(SectionProgress {
        section_id: SectionId::new(get_u64(row, "section_id")?),
        course_id: CourseId::new(get_u64(row, "course_id")?),
        student_id: UserId::new(get_u64(row, "student_id")?),
        completed_chapters: get_u32(row, "completed_chapters")?,
        is_completed: get_bool(row, "is_completed")?,
    })
}

pub(crate) fn map_payment_row(row: &SqliteRow) -> Result<Payment, StorageError> {
    Ok(Payment {
        id: PaymentId::new(get_u64(row, "id")?),
        user_id: UserId::new(get_u64(row, "user_id")?),
        course_id: CourseId::new(get_u64(row, "course_id")?),
        amount: get_decimal(row, "amount")?,
        status: parse_column(row, "payment_status")?,
        payment_type: parse_column(row, "payment_type")?,
        payment_date: row.try_get("payment_date").map_err(ser)?,
    })
}
