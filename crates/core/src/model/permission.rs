//! Named permission strings.
//!
//! A permission is a plain capability name held by a user either directly
//! (`user_permissions`) or through a role default (`role_permissions`).
//! Checks match when the holder has ANY of the requested names.

use std::collections::HashSet;

// =============================================================================
// Payments
// =============================================================================

/// View the payment ledger and totals
pub const PAYMENT_VIEW_HISTORY: &str = "payment_view_history";
/// Issue refunds
pub const PAYMENT_REFUND: &str = "payment_refund";

// =============================================================================
// Security & audit
// =============================================================================

/// View security warnings raised by the platform
pub const SECURITY_VIEW_WARNINGS: &str = "security_view_warnings";
/// View the audit trail
pub const AUDIT_VIEW_LOGS: &str = "audit_view_logs";

// =============================================================================
// Courses
// =============================================================================

/// Create and edit own courses
pub const COURSE_MANAGE_OWN: &str = "course_manage_own";
/// Manage any course regardless of owner
pub const COURSE_MANAGE_ALL: &str = "course_manage_all";

// =============================================================================
// Users
// =============================================================================

/// Manage user accounts and their permissions
pub const USER_MANAGE: &str = "user_manage";

/// The set of permission names held by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    names: HashSet<String>,
}

impl PermissionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// True when at least one of `requested` is held. An empty request never matches.
    #[must_use]
    pub fn contains_any(&self, requested: &[&str]) -> bool {
        requested.iter().any(|name| self.names.contains(*name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for PermissionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.names.extend(iter.into_iter().map(Into::into));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_never_matches() {
        let held: PermissionSet = [PAYMENT_VIEW_HISTORY].into_iter().collect();
        assert!(!held.contains_any(&[]));
    }

    #[test]
    fn any_listed_name_matches() {
        let held: PermissionSet = ["A"].into_iter().collect();
        assert!(held.contains_any(&["A", "B"]));
        assert!(!held.contains_any(&["C", "D"]));
    }

    #[test]
    fn unknown_names_simply_miss() {
        let held = PermissionSet::new();
        assert!(!held.contains_any(&["does_not_exist"]));
    }
}
