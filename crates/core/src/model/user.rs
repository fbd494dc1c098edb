use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("display name cannot be empty")]
    EmptyName,
}

/// Account role. Each role may carry default permissions in `role_permissions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(UserError::UnknownRole(other.to_owned())),
        }
    }
}

/// A platform account with its profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    role: Role,
    display_name: String,
    email: String,
}

impl User {
    /// # Errors
    ///
    /// Returns `UserError::EmptyName` if the display name is blank.
    pub fn new(
        id: UserId,
        role: Role,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, UserError> {
        let display_name = display_name.into();
        if display_name.trim().is_empty() {
            return Err(UserError::EmptyName);
        }
        Ok(Self {
            id,
            role,
            display_name: display_name.trim().to_owned(),
            email: email.into().trim().to_owned(),
        })
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Request context for this user.
    #[must_use]
    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.id, self.role)
    }
}

/// Identity of the caller for a single request.
///
/// Loaded once when the request starts and passed to every service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestContext {
    user_id: UserId,
    role: Role,
}

impl RequestContext {
    #[must_use]
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}
