use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Version 1: accounts, permissions, course outline, progress, enrollment and ledger.
const V1_SCHEMA: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            role TEXT NOT NULL CHECK (role IN ('student', 'teacher', 'admin')),
            display_name TEXT NOT NULL,
            email TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_permissions (
            user_id INTEGER NOT NULL,
            permission_name TEXT NOT NULL,
            PRIMARY KEY (user_id, permission_name),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS role_permissions (
            role TEXT NOT NULL CHECK (role IN ('student', 'teacher', 'admin')),
            permission_name TEXT NOT NULL,
            PRIMARY KEY (role, permission_name)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            price TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('draft', 'published', 'archived')),
            is_archived INTEGER NOT NULL CHECK (is_archived IN (0, 1)),
            is_published INTEGER NOT NULL CHECK (is_published IN (0, 1)),
            teacher_id INTEGER NOT NULL,
            category_id INTEGER,
            created_at TEXT NOT NULL,
            FOREIGN KEY (teacher_id) REFERENCES users(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS sections (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            order_index INTEGER NOT NULL CHECK (order_index >= 0),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS chapters (
            id INTEGER PRIMARY KEY,
            section_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            content_type TEXT NOT NULL CHECK (content_type IN ('video', 'text')),
            order_index INTEGER NOT NULL CHECK (order_index >= 0),
            FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS video_progress (
            chapter_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0 CHECK (completed IN (0, 1)),
            updated_at TEXT NOT NULL,
            PRIMARY KEY (chapter_id, student_id),
            FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE,
            FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS text_progress (
            chapter_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0 CHECK (completed IN (0, 1)),
            updated_at TEXT NOT NULL,
            PRIMARY KEY (chapter_id, student_id),
            FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE,
            FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS enrollments (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            enrolled_at TEXT NOT NULL,
            UNIQUE (course_id, student_id),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
            FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS course_progress (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            -- holds the completed chapter count
            completed_sections INTEGER NOT NULL DEFAULT 0 CHECK (completed_sections >= 0),
            completion_percentage TEXT NOT NULL DEFAULT '0.00',
            completion_status TEXT NOT NULL DEFAULT 'not_started'
                CHECK (completion_status IN ('not_started', 'in_progress', 'completed')),
            completed_at TEXT,
            UNIQUE (course_id, student_id),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
            FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS section_progress (
            id INTEGER PRIMARY KEY,
            section_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            completed_chapters INTEGER NOT NULL DEFAULT 0 CHECK (completed_chapters >= 0),
            is_completed INTEGER NOT NULL DEFAULT 0 CHECK (is_completed IN (0, 1)),
            UNIQUE (section_id, student_id),
            FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE,
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
            FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            amount TEXT NOT NULL,
            payment_status TEXT NOT NULL
                CHECK (payment_status IN ('completed', 'pending', 'failed', 'refunded')),
            payment_date TEXT NOT NULL,
            payment_type TEXT NOT NULL CHECK (payment_type IN ('FREE', 'PAID')),
            FOREIGN KEY (user_id) REFERENCES users(id),
            FOREIGN KEY (course_id) REFERENCES courses(id)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_courses_teacher_created
            ON courses (teacher_id, created_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sections_course_order
            ON sections (course_id, order_index);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_chapters_section_order
            ON chapters (section_id, order_index);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_enrollments_student
            ON enrollments (student_id, enrolled_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_payments_status_date
            ON payments (payment_status, payment_date);
    ",
];

/// Runs all pending schema migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for &statement in V1_SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
