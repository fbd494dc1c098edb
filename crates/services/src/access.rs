use std::sync::Arc;

use async_trait::async_trait;
use lms_core::model::permission::{COURSE_MANAGE_ALL, COURSE_MANAGE_OWN};
use lms_core::model::{Course, RequestContext};
use storage::repository::PermissionRepository;

/// Result of permission-gated work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access<T> {
    Granted(T),
    Restricted,
}

impl<T> Access<T> {
    #[must_use]
    pub fn granted(self) -> Option<T> {
        match self {
            Access::Granted(value) => Some(value),
            Access::Restricted => None,
        }
    }
}

/// Answers "does this user hold at least one of these permissions?".
///
/// Both methods OR-match: holding any single listed name is enough. An empty
/// list is never satisfied.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn has_any(&self, ctx: &RequestContext, names: &[&str]) -> bool;

    /// Same semantics as [`PermissionChecker::has_any`]. Callers pass one or
    /// several names and match if any is held.
    async fn has_permission(&self, ctx: &RequestContext, names: &[&str]) -> bool {
        self.has_any(ctx, names).await
    }
}

/// Owners need `course_manage_own` (or `course_manage_all`); everyone else
/// needs `course_manage_all`.
pub async fn may_manage_course(
    gate: &dyn PermissionChecker,
    ctx: &RequestContext,
    course: &Course,
) -> bool {
    if course.is_owned_by(ctx.user_id()) {
        gate.has_permission(ctx, &[COURSE_MANAGE_OWN, COURSE_MANAGE_ALL])
            .await
    } else {
        gate.has_permission(ctx, &[COURSE_MANAGE_ALL]).await
    }
}

/// Gate backed by `user_permissions` and `role_permissions`.
#[derive(Clone)]
pub struct RepositoryPermissionChecker {
    permissions: Arc<dyn PermissionRepository>,
}

impl RepositoryPermissionChecker {
    #[must_use]
    pub fn new(permissions: Arc<dyn PermissionRepository>) -> Self {
        Self { permissions }
    }
}

#[async_trait]
impl PermissionChecker for RepositoryPermissionChecker {
    async fn has_any(&self, ctx: &RequestContext, names: &[&str]) -> bool {
        if names.is_empty() {
            return false;
        }

        match self
            .permissions
            .holds_any(ctx.user_id(), ctx.role(), names)
            .await
        {
            Ok(held) => held,
            Err(err) => {
                // Fail closed.
                tracing::error!(
                    user_id = ctx.user_id().value(),
                    ?names,
                    error = %err,
                    "permission lookup failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{PermissionSet, Role, UserId};
    use storage::repository::{InMemoryRepository, StorageError};

    struct Offline;

    #[async_trait]
    impl PermissionRepository for Offline {
        async fn holds_any(
            &self,
            _user_id: UserId,
            _role: Role,
            _names: &[&str],
        ) -> Result<bool, StorageError> {
            Err(StorageError::Connection("database is locked".into()))
        }

        async fn permissions_for(
            &self,
            _user_id: UserId,
            _role: Role,
        ) -> Result<PermissionSet, StorageError> {
            Err(StorageError::Connection("database is locked".into()))
        }

        async fn grant_user(&self, _user_id: UserId, _name: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn revoke_user(&self, _user_id: UserId, _name: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn grant_role(&self, _role: Role, _name: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn admin() -> RequestContext {
        RequestContext::new(UserId::new(1), Role::Admin)
    }

    #[tokio::test]
    async fn any_listed_permission_is_enough() {
        let repo = InMemoryRepository::new();
        repo.grant_user(UserId::new(1), "payment_view_history")
            .await
            .unwrap();
        let gate = RepositoryPermissionChecker::new(Arc::new(repo));

        assert!(
            gate.has_permission(&admin(), &["payment_view_history", "payment_refund"])
                .await
        );
        assert!(gate.has_any(&admin(), &["payment_view_history"]).await);
        assert!(
            !gate
                .has_permission(&admin(), &["audit_view_logs", "user_manage"])
                .await
        );
        assert!(!gate.has_permission(&admin(), &["no_such_permission"]).await);
    }

    #[tokio::test]
    async fn empty_request_is_never_granted() {
        let repo = InMemoryRepository::new();
        repo.grant_role(Role::Admin, "payment_view_history")
            .await
            .unwrap();
        let gate = RepositoryPermissionChecker::new(Arc::new(repo));

        assert!(!gate.has_permission(&admin(), &[]).await);
        assert!(!gate.has_any(&admin(), &[]).await);
    }

    #[tokio::test]
    async fn storage_failure_denies() {
        let gate = RepositoryPermissionChecker::new(Arc::new(Offline));
        assert!(!gate.has_permission(&admin(), &["payment_view_history"]).await);
    }

    #[test]
    fn restricted_access_yields_nothing() {
        let restricted: Access<u32> = Access::Restricted;
        assert_eq!(restricted.granted(), None);
        assert_eq!(Access::Granted(2).granted(), Some(2));
    }
}
