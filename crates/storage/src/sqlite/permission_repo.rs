use lms_core::model::{PermissionSet, Role, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, ser};
use crate::repository::{PermissionRepository, StorageError};

/// `?start, ?start+1, …` for `n` bind slots.
fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait::async_trait]
impl PermissionRepository for SqliteRepository {
    async fn holds_any(
        &self,
        user_id: UserId,
        role: Role,
        names: &[&str],
    ) -> Result<bool, StorageError> {
        if names.is_empty() {
            return Ok(false);
        }

        // ?1 = user, ?2 = role, then the names.
        let list = placeholders(3, names.len());
        let sql = format!(
            r"
            SELECT 1 FROM user_permissions
            WHERE user_id = ?1 AND permission_name IN ({list})
            UNION ALL
            SELECT 1 FROM role_permissions
            WHERE role = ?2 AND permission_name IN ({list})
            LIMIT 1
            "
        );

        let mut q = sqlx::query(&sql)
            .bind(id_to_i64("user_id", user_id.value())?)
            .bind(role.as_str());
        for name in names {
            q = q.bind(*name);
        }

        let row = q.fetch_optional(&self.pool).await.map_err(conn)?;
        Ok(row.is_some())
    }

    async fn permissions_for(
        &self,
        user_id: UserId,
        role: Role,
    ) -> Result<PermissionSet, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT permission_name FROM user_permissions WHERE user_id = ?1
            UNION
            SELECT permission_name FROM role_permissions WHERE role = ?2
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut set = PermissionSet::new();
        for row in rows {
            set.insert(row.try_get::<String, _>("permission_name").map_err(ser)?);
        }
        Ok(set)
    }

    async fn grant_user(&self, user_id: UserId, name: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO user_permissions (user_id, permission_name)
            VALUES (?1, ?2)
            ON CONFLICT(user_id, permission_name) DO NOTHING
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn revoke_user(&self, user_id: UserId, name: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM user_permissions WHERE user_id = ?1 AND permission_name = ?2")
            .bind(id_to_i64("user_id", user_id.value())?)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn grant_role(&self, role: Role, name: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO role_permissions (role, permission_name)
            VALUES (?1, ?2)
            ON CONFLICT(role, permission_name) DO NOTHING
            ",
        )
        .bind(role.as_str())
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::placeholders;

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(3, 2), "?3, ?4");
        assert_eq!(placeholders(1, 1), "?1");
    }
}
