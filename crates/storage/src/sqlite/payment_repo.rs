use lms_core::model::{NewPayment, Payment, PaymentId};
use rust_decimal::Decimal;
use sqlx::{Executor, Sqlite};

use super::SqliteRepository;
use super::mapping::{conn, fk_or_conn, id_to_i64, map_payment_row};
use crate::repository::{PaymentFilter, PaymentRepository, StorageError};

/// Insert one ledger row on any executor, so enrollment can reuse it inside
/// its transaction.
pub(super) async fn insert_payment<'e, E>(
    exec: E,
    payment: &NewPayment,
) -> Result<PaymentId, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    if payment.amount < Decimal::ZERO {
        return Err(StorageError::Serialization(format!(
            "negative payment amount {}",
            payment.amount
        )));
    }

    let res = sqlx::query(
        r"
        INSERT INTO payments (user_id, course_id, amount, payment_status, payment_date, payment_type)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
    )
    .bind(id_to_i64("user_id", payment.user_id.value())?)
    .bind(id_to_i64("course_id", payment.course_id.value())?)
    .bind(payment.amount.to_string())
    .bind(payment.status.as_str())
    .bind(payment.payment_date)
    .bind(payment.payment_type.as_str())
    .execute(exec)
    .await
    .map_err(fk_or_conn)?;

    let id = u64::try_from(res.last_insert_rowid())
        .map_err(|_| StorageError::Serialization("payment_id sign overflow".into()))?;
    Ok(PaymentId::new(id))
}

#[async_trait::async_trait]
impl PaymentRepository for SqliteRepository {
    async fn record_payment(&self, payment: NewPayment) -> Result<PaymentId, StorageError> {
        insert_payment(&self.pool, &payment).await
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StorageError> {
        // NULL parameters disable their clause.
        let rows = sqlx::query(
            r"
            SELECT id, user_id, course_id, amount, payment_status, payment_date, payment_type
            FROM payments
            WHERE (?1 IS NULL OR payment_status = ?1)
              AND (?2 IS NULL OR user_id = ?2)
              AND (?3 IS NULL OR course_id = ?3)
            ORDER BY payment_date DESC, id DESC
            LIMIT ?4
            ",
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(
            filter
                .user_id
                .map(|u| id_to_i64("user_id", u.value()))
                .transpose()?,
        )
        .bind(
            filter
                .course_id
                .map(|c| id_to_i64("course_id", c.value()))
                .transpose()?,
        )
        .bind(filter.limit.map_or(-1_i64, i64::from))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut payments = Vec::with_capacity(rows.len());
        for row in rows {
            payments.push(map_payment_row(&row)?);
        }
        Ok(payments)
    }
}
