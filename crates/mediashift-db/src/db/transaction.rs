//! Database transaction utilities
//!
//! A [`DbTransaction`] is scoped to one caller and one connection. A failed
//! statement does not consume it, so the caller can always decide to roll back.

use mediashift_core::AppError;
use sqlx::any::AnyRow;
use sqlx::{Any, Transaction};

use super::connection::{bind_params, SqlParam};

pub struct DbTransaction {
    transaction: Option<Transaction<'static, Any>>,
}

impl DbTransaction {
    pub(crate) fn new(transaction: Transaction<'static, Any>) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }

    fn inner(&mut self) -> Result<&mut Transaction<'static, Any>, AppError> {
        self.transaction
            .as_mut()
            .ok_or_else(|| AppError::Internal("Transaction already finished".to_string()))
    }

    pub async fn query_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<AnyRow>, AppError> {
        let tx = self.inner()?;
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut **tx)
            .await?;
        Ok(rows)
    }

    pub async fn query_one(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Option<AnyRow>, AppError> {
        let tx = self.inner()?;
        let row = bind_params(sqlx::query(sql), params)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row)
    }

    pub async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, AppError> {
        let tx = self.inner()?;
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Commit the transaction
    ///
    /// After calling this, the transaction is consumed and cannot be used further.
    pub async fn commit(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.transaction.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    /// Rollback the transaction
    ///
    /// After calling this, the transaction is consumed and cannot be used further.
    pub async fn rollback(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.transaction.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

impl Drop for DbTransaction {
    fn drop(&mut self) {
        // The driver rolls an unfinished transaction back when its connection
        // returns to the pool.
        if self.transaction.is_some() {
            tracing::warn!(
                "Transaction was dropped without explicit commit or rollback - rolling back"
            );
        }
    }
}
