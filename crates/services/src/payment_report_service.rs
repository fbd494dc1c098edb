use std::sync::Arc;

use lms_core::model::permission::PAYMENT_VIEW_HISTORY;
use lms_core::model::{Payment, PaymentTotals, RequestContext};
use serde::Serialize;
use storage::repository::{PaymentFilter, PaymentRepository};

use crate::access::{Access, PermissionChecker};
use crate::error::PaymentReportError;

/// Ledger rows plus per-status totals over exactly those rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReport {
    pub payments: Vec<Payment>,
    pub totals: PaymentTotals,
}

/// Admin payment history, gated by `payment_view_history`.
#[derive(Clone)]
pub struct PaymentReportService {
    payments: Arc<dyn PaymentRepository>,
    gate: Arc<dyn PermissionChecker>,
}

impl PaymentReportService {
    #[must_use]
    pub fn new(payments: Arc<dyn PaymentRepository>, gate: Arc<dyn PermissionChecker>) -> Self {
        Self { payments, gate }
    }

    /// Whether to show the payment history entry point at all.
    pub async fn can_view(&self, ctx: &RequestContext) -> bool {
        self.gate.has_permission(ctx, &[PAYMENT_VIEW_HISTORY]).await
    }

    /// Payment history matching `filter`, newest first.
    ///
    /// The permission is checked before the ledger is read.
    ///
    /// # Errors
    ///
    /// Returns `PaymentReportError::Storage` if the ledger cannot be read.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        filter: &PaymentFilter,
    ) -> Result<Access<PaymentReport>, PaymentReportError> {
        if !self.can_view(ctx).await {
            tracing::warn!(
                user_id = ctx.user_id().value(),
                "payment history restricted"
            );
            return Ok(Access::Restricted);
        }

        let payments = self.payments.list_payments(filter).await?;
        let totals = PaymentTotals::from_payments(&payments);
        Ok(Access::Granted(PaymentReport { payments, totals }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{
        CourseId, NewPayment, PaymentStatus, PaymentType, Role, UserId,
    };
    use lms_core::time::fixed_now;
    use rust_decimal::Decimal;
    use storage::repository::{InMemoryRepository, PermissionRepository};

    use crate::access::RepositoryPermissionChecker;

    async fn service() -> PaymentReportService {
        let repo = InMemoryRepository::new();
        repo.grant_role(Role::Admin, PAYMENT_VIEW_HISTORY)
            .await
            .unwrap();
        for (amount, status) in [
            (Decimal::new(4990, 2), PaymentStatus::Completed),
            (Decimal::new(1000, 2), PaymentStatus::Refunded),
        ] {
            repo.record_payment(NewPayment {
                user_id: UserId::new(2),
                course_id: CourseId::new(1),
                amount,
                status,
                payment_type: PaymentType::Paid,
                payment_date: fixed_now(),
            })
            .await
            .unwrap();
        }
        repo.record_payment(NewPayment::free_enrollment(
            UserId::new(2),
            CourseId::new(3),
            fixed_now(),
        ))
        .await
        .unwrap();

        let shared = Arc::new(repo);
        let gate = Arc::new(RepositoryPermissionChecker::new(shared.clone()));
        PaymentReportService::new(shared, gate)
    }

    #[tokio::test]
    async fn admin_sees_totals_including_free_rows() {
        let svc = service().await;
        let admin = RequestContext::new(UserId::new(1), Role::Admin);

        let report = svc
            .history(&admin, &PaymentFilter::default())
            .await
            .unwrap()
            .granted()
            .expect("admin is granted");
        assert_eq!(report.payments.len(), 3);
        assert_eq!(report.totals.completed.count, 2);
        assert_eq!(report.totals.completed.amount, Decimal::new(4990, 2));
        assert_eq!(report.totals.net_revenue(), Decimal::new(3990, 2));
    }

    #[tokio::test]
    async fn student_is_restricted_before_any_read() {
        let svc = service().await;
        let student = RequestContext::new(UserId::new(2), Role::Student);

        assert!(!svc.can_view(&student).await);
        assert_eq!(
            svc.history(&student, &PaymentFilter::default())
                .await
                .unwrap(),
            Access::Restricted
        );
    }

    #[tokio::test]
    async fn report_serializes_amounts_as_text() {
        let svc = service().await;
        let admin = RequestContext::new(UserId::new(1), Role::Admin);
        let report = svc
            .history(
                &admin,
                &PaymentFilter {
                    status: Some(PaymentStatus::Refunded),
                    ..PaymentFilter::default()
                },
            )
            .await
            .unwrap()
            .granted()
            .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["payments"][0]["amount"], "10.00");
        assert_eq!(json["totals"]["refunded"]["count"], 1);
    }
}
