use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{CategoryId, ChapterId, CourseId, SectionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("course price must be >= 0 with at most 2 decimal places, got {0}")]
    InvalidPrice(Decimal),

    #[error("cannot {action} a course that is {from}")]
    InvalidTransition {
        action: &'static str,
        from: CourseStatus,
    },

    #[error("unknown course status: {0}")]
    UnknownStatus(String),

    #[error("unknown content type: {0}")]
    UnknownContentType(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Publication lifecycle of a course.
///
/// ```text
/// draft ──publish──▶ published ──archive──▶ archived
///   ▲                                          │
///   └──────────────── restore ─────────────────┘
/// ```
/// A draft may also be archived directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    Draft,
    Published,
    Archived,
}

impl CourseStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CourseStatus::Draft => "draft",
            CourseStatus::Published => "published",
            CourseStatus::Archived => "archived",
        }
    }

    /// Value of the `is_published` column for this status.
    #[must_use]
    pub fn is_published(self) -> bool {
        self == CourseStatus::Published
    }

    /// Value of the `is_archived` column for this status.
    #[must_use]
    pub fn is_archived(self) -> bool {
        self == CourseStatus::Archived
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CourseStatus::Draft),
            "published" => Ok(CourseStatus::Published),
            "archived" => Ok(CourseStatus::Archived),
            other => Err(CourseError::UnknownStatus(other.to_owned())),
        }
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A course owned by a teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    id: CourseId,
    teacher_id: UserId,
    category_id: Option<CategoryId>,
    title: String,
    price: Decimal,
    status: CourseStatus,
    created_at: DateTime<Utc>,
}

fn validate_price(price: Decimal) -> Result<Decimal, CourseError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(CourseError::InvalidPrice(price));
    }
    let normalized = price.normalize();
    if normalized.scale() > 2 {
        return Err(CourseError::InvalidPrice(price));
    }
    let mut price = normalized;
    price.rescale(2);
    Ok(price)
}

impl Course {
    /// Creates a new draft course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title and
    /// `CourseError::InvalidPrice` for a negative or sub-cent price.
    pub fn new_draft(
        id: CourseId,
        teacher_id: UserId,
        category_id: Option<CategoryId>,
        title: impl Into<String>,
        price: Decimal,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        Self::from_persisted(
            id,
            teacher_id,
            category_id,
            title,
            price,
            CourseStatus::Draft,
            created_at,
        )
    }

    /// Rehydrate a course from storage.
    ///
    /// # Errors
    ///
    /// Same validation as [`Course::new_draft`].
    pub fn from_persisted(
        id: CourseId,
        teacher_id: UserId,
        category_id: Option<CategoryId>,
        title: impl Into<String>,
        price: Decimal,
        status: CourseStatus,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }
        Ok(Self {
            id,
            teacher_id,
            category_id,
            title: title.trim().to_owned(),
            price: validate_price(price)?,
            status,
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn teacher_id(&self) -> UserId {
        self.teacher_id
    }

    #[must_use]
    pub fn category_id(&self) -> Option<CategoryId> {
        self.category_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Price with exactly two decimal places.
    #[must_use]
    pub fn price(&self) -> Decimal {
        self.price
    }

    #[must_use]
    pub fn status(&self) -> CourseStatus {
        self.status
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.price.is_zero()
    }

    #[must_use]
    pub fn is_open_for_enrollment(&self) -> bool {
        self.status == CourseStatus::Published
    }

    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.teacher_id == user
    }

    // Transitions

    /// # Errors
    ///
    /// Returns `CourseError::InvalidTransition` unless the course is a draft.
    pub fn publish(&mut self) -> Result<(), CourseError> {
        self.transition("publish", &[CourseStatus::Draft], CourseStatus::Published)
    }

    /// # Errors
    ///
    /// Returns `CourseError::InvalidTransition` if the course is already archived.
    pub fn archive(&mut self) -> Result<(), CourseError> {
        self.transition(
            "archive",
            &[CourseStatus::Draft, CourseStatus::Published],
            CourseStatus::Archived,
        )
    }

    /// Brings an archived course back as a draft.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::InvalidTransition` unless the course is archived.
    pub fn restore(&mut self) -> Result<(), CourseError> {
        self.transition("restore", &[CourseStatus::Archived], CourseStatus::Draft)
    }

    fn transition(
        &mut self,
        action: &'static str,
        allowed_from: &[CourseStatus],
        to: CourseStatus,
    ) -> Result<(), CourseError> {
        if !allowed_from.contains(&self.status) {
            return Err(CourseError::InvalidTransition {
                action,
                from: self.status,
            });
        }
        self.status = to;
        Ok(())
    }
}

//
// ─── OUTLINE ───────────────────────────────────────────────────────────────────
//

/// Kind of content a chapter carries; decides which progress table tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Text,
}

impl ContentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Text => "text",
        }
    }
}

impl FromStr for ContentType {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ContentType::Video),
            "text" => Ok(ContentType::Text),
            other => Err(CourseError::UnknownContentType(other.to_owned())),
        }
    }
}

/// Ordered grouping of chapters within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub course_id: CourseId,
    pub title: String,
    pub order_index: u32,
}

/// Smallest content unit; completion is tracked per student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub section_id: SectionId,
    pub title: String,
    pub content_type: ContentType,
    pub order_index: u32,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
