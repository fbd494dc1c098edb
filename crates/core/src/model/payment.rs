use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{CourseId, PaymentId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PaymentError {
    #[error("unknown payment status: {0}")]
    UnknownStatus(String),

    #[error("unknown payment type: {0}")]
    UnknownType(String),

    #[error("payment amount cannot be negative: {0}")]
    NegativeAmount(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Pending,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Completed,
        PaymentStatus::Pending,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(PaymentStatus::Completed),
            "pending" => Ok(PaymentStatus::Pending),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(PaymentError::UnknownStatus(other.to_owned())),
        }
    }
}

/// How the enrollment was paid for. Free enrollments are still written to
/// the ledger with a zero amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentType {
    #[serde(rename = "FREE")]
    Free,
    #[serde(rename = "PAID")]
    Paid,
}

impl PaymentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentType::Free => "FREE",
            PaymentType::Paid => "PAID",
        }
    }
}

impl FromStr for PaymentType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(PaymentType::Free),
            "PAID" => Ok(PaymentType::Paid),
            other => Err(PaymentError::UnknownType(other.to_owned())),
        }
    }
}

/// A ledger row that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub payment_date: DateTime<Utc>,
}

impl NewPayment {
    /// Zero-amount completed row recorded for a free enrollment.
    #[must_use]
    pub fn free_enrollment(user_id: UserId, course_id: CourseId, at: DateTime<Utc>) -> Self {
        let mut amount = Decimal::ZERO;
        amount.rescale(2);
        Self {
            user_id,
            course_id,
            amount,
            status: PaymentStatus::Completed,
            payment_type: PaymentType::Free,
            payment_date: at,
        }
    }

    /// # Errors
    ///
    /// Returns `PaymentError::NegativeAmount` for amounts below zero.
    pub fn assign_id(self, id: PaymentId) -> Result<Payment, PaymentError> {
        if self.amount < Decimal::ZERO {
            return Err(PaymentError::NegativeAmount(self.amount));
        }
        Ok(Payment {
            id,
            user_id: self.user_id,
            course_id: self.course_id,
            amount: self.amount,
            status: self.status,
            payment_type: self.payment_type,
            payment_date: self.payment_date,
        })
    }
}

/// Immutable payment ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub payment_date: DateTime<Utc>,
}

/// Per-status count and amount over a set of payments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTotals {
    pub completed: StatusTotal,
    pub pending: StatusTotal,
    pub failed: StatusTotal,
    pub refunded: StatusTotal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTotal {
    pub count: u64,
    pub amount: Decimal,
}

impl PaymentTotals {
    #[must_use]
    pub fn from_payments<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        let mut totals = Self::default();
        for payment in payments {
            let bucket = totals.bucket_mut(payment.status);
            bucket.count += 1;
            bucket.amount += payment.amount;
        }
        totals
    }

    #[must_use]
    pub fn get(&self, status: PaymentStatus) -> StatusTotal {
        match status {
            PaymentStatus::Completed => self.completed,
            PaymentStatus::Pending => self.pending,
            PaymentStatus::Failed => self.failed,
            PaymentStatus::Refunded => self.refunded,
        }
    }

    /// Completed revenue minus refunds.
    #[must_use]
    pub fn net_revenue(&self) -> Decimal {
        self.completed.amount - self.refunded.amount
    }

    fn bucket_mut(&mut self, status: PaymentStatus) -> &mut StatusTotal {
        match status {
            PaymentStatus::Completed => &mut self.completed,
            PaymentStatus::Pending => &mut self.pending,
            PaymentStatus::Failed => &mut self.failed,
            PaymentStatus::Refunded => &mut self.refunded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn payment(id: u64, amount: Decimal, status: PaymentStatus) -> Payment {
        NewPayment {
            user_id: UserId::new(1),
            course_id: CourseId::new(1),
            amount,
            status,
            payment_type: PaymentType::Paid,
            payment_date: fixed_now(),
        }
        .assign_id(PaymentId::new(id))
        .unwrap()
    }

    #[test]
    fn free_enrollment_row_is_zero_and_completed() {
        let row = NewPayment::free_enrollment(UserId::new(3), CourseId::new(4), fixed_now());
        assert_eq!(row.amount.to_string(), "0.00");
        assert_eq!(row.status, PaymentStatus::Completed);
        assert_eq!(row.payment_type, PaymentType::Free);
    }

    #[test]
    fn totals_group_by_status() {
        let rows = vec![
            payment(1, Decimal::new(4990, 2), PaymentStatus::Completed),
            payment(2, Decimal::new(1000, 2), PaymentStatus::Completed),
            payment(3, Decimal::new(1000, 2), PaymentStatus::Refunded),
            payment(4, Decimal::new(2500, 2), PaymentStatus::Failed),
        ];
        let totals = PaymentTotals::from_payments(&rows);
        assert_eq!(totals.completed.count, 2);
        assert_eq!(totals.completed.amount, Decimal::new(5990, 2));
        assert_eq!(totals.get(PaymentStatus::Failed).count, 1);
        assert_eq!(totals.pending.count, 0);
        assert_eq!(totals.net_revenue(), Decimal::new(4990, 2));
    }

    #[test]
    fn negative_amount_is_rejected() {
        let row = NewPayment {
            amount: Decimal::new(-1, 0),
            ..NewPayment::free_enrollment(UserId::new(1), CourseId::new(1), fixed_now())
        };
        assert!(matches!(
            row.assign_id(PaymentId::new(1)),
            Err(PaymentError::NegativeAmount(_))
        ));
    }

    #[test]
    fn payment_type_uses_ledger_labels() {
        assert_eq!(PaymentType::Free.as_str(), "FREE");
        assert_eq!("PAID".parse::<PaymentType>().unwrap(), PaymentType::Paid);
    }
}
