use lms_core::model::{User, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_user_row};
use crate::repository::{StorageError, UserRepository};

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO users (id, role, display_name, email)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                role = excluded.role,
                display_name = excluded.display_name,
                email = excluded.email
            ",
        )
        .bind(id_to_i64("user_id", user.id().value())?)
        .bind(user.role().as_str())
        .bind(user.display_name())
        .bind(user.email())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let row = sqlx::query("SELECT id, role, display_name, email FROM users WHERE id = ?1")
            .bind(id_to_i64("user_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_user_row).transpose()
    }
}
