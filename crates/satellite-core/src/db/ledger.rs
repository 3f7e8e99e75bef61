//! Database operations for bucket balances and the transaction log.

use super::PgSatelliteStore;
use crate::cash::cash_symbol;
use crate::store::{CashManager, LedgerStore};
use crate::types::{
    BucketBalance, BucketTransaction, LedgerEntry, TransactionFilter, TransactionType,
    CORE_BUCKET_ID,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Database row for balances.
#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    bucket_id: String,
    currency: String,
    balance: Decimal,
    last_updated: DateTime<Utc>,
}

impl From<BalanceRow> for BucketBalance {
    fn from(row: BalanceRow) -> Self {
        Self {
            bucket_id: row.bucket_id,
            currency: row.currency,
            balance: row.balance,
            last_updated: row.last_updated,
        }
    }
}

/// Database row for transactions.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    bucket_id: String,
    #[sqlx(rename = "type")]
    transaction_type: String,
    amount: Decimal,
    currency: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<BucketTransaction> {
        let transaction_type =
            TransactionType::parse(&self.transaction_type).ok_or_else(|| Error::Config {
                message: format!(
                    "unknown transaction type '{}' in row {}",
                    self.transaction_type, self.id
                ),
            })?;

        Ok(BucketTransaction {
            id: self.id,
            bucket_id: self.bucket_id,
            transaction_type,
            amount: self.amount,
            currency: self.currency,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

#[async_trait::async_trait]
impl CashManager for PgSatelliteStore {
    async fn get_cash_balance(&self, bucket_id: &str, currency: &str) -> Result<Decimal> {
        let row = sqlx::query(
            "SELECT balance FROM bucket_balances WHERE bucket_id = $1 AND currency = $2",
        )
        .bind(bucket_id)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("balance")).unwrap_or(Decimal::ZERO))
    }

    async fn get_all_cash_balances(&self, bucket_id: &str) -> Result<BTreeMap<String, Decimal>> {
        let rows = sqlx::query("SELECT currency, balance FROM bucket_balances WHERE bucket_id = $1")
            .bind(bucket_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("currency"), r.get("balance")))
            .collect())
    }

    async fn get_total_by_currency(&self, currency: &str) -> Result<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(balance), 0) AS total FROM bucket_balances WHERE currency = $1",
        )
        .bind(currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }

    async fn get_all_cash_symbols(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT bucket_id, currency FROM bucket_balances ORDER BY bucket_id, currency",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let bucket_id: String = r.get("bucket_id");
                let currency: String = r.get("currency");
                cash_symbol(&currency, &bucket_id)
            })
            .collect())
    }

    async fn adjust_cash_balance(
        &self,
        bucket_id: &str,
        currency: &str,
        delta: Decimal,
        transaction_type: TransactionType,
        description: Option<String>,
    ) -> Result<Decimal> {
        let entry = LedgerEntry::adjust(bucket_id, currency, delta, transaction_type)
            .with_description(description);
        let rows = self.apply(std::slice::from_ref(&entry)).await?;
        Ok(rows.first().map(|b| b.balance).unwrap_or(Decimal::ZERO))
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgSatelliteStore {
    async fn get_balance(&self, bucket_id: &str, currency: &str) -> Result<Option<BucketBalance>> {
        let row: Option<BalanceRow> = sqlx::query_as(
            r#"
            SELECT bucket_id, currency, balance, last_updated
            FROM bucket_balances
            WHERE bucket_id = $1 AND currency = $2
            "#,
        )
        .bind(bucket_id)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_balances(&self, bucket_id: Option<&str>) -> Result<Vec<BucketBalance>> {
        let rows: Vec<BalanceRow> = sqlx::query_as(
            r#"
            SELECT bucket_id, currency, balance, last_updated
            FROM bucket_balances
            WHERE ($1::text IS NULL OR bucket_id = $1)
            ORDER BY bucket_id, currency
            "#,
        )
        .bind(bucket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn apply(&self, entries: &[LedgerEntry]) -> Result<Vec<BucketBalance>> {
        // Dropping `tx` on any early return rolls the batch back
        let mut tx = self.pool.begin().await?;
        let mut touched = Vec::with_capacity(entries.len());

        for entry in entries {
            let exists = sqlx::query("SELECT 1 FROM buckets WHERE id = $1")
                .bind(&entry.bucket_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(Error::bucket_not_found(&entry.bucket_id));
            }

            let current: Decimal = sqlx::query(
                r#"
                SELECT balance FROM bucket_balances
                WHERE bucket_id = $1 AND currency = $2
                FOR UPDATE
                "#,
            )
            .bind(&entry.bucket_id)
            .bind(&entry.currency)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get("balance"))
            .unwrap_or(Decimal::ZERO);

            let delta = entry.delta_from(current);
            if entry.require_funds && current + delta < Decimal::ZERO {
                warn!(
                    bucket_id = %entry.bucket_id,
                    currency = %entry.currency,
                    available = %current,
                    required = %(-delta),
                    "Rejected ledger batch: insufficient funds"
                );
                return Err(Error::InsufficientFunds {
                    bucket_id: entry.bucket_id.clone(),
                    currency: entry.currency.clone(),
                    available: current,
                    required: -delta,
                });
            }

            let row: BalanceRow = sqlx::query_as(
                r#"
                INSERT INTO bucket_balances (bucket_id, currency, balance, last_updated)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (bucket_id, currency) DO UPDATE SET
                    balance = bucket_balances.balance + EXCLUDED.balance,
                    last_updated = NOW()
                RETURNING bucket_id, currency, balance, last_updated
                "#,
            )
            .bind(&entry.bucket_id)
            .bind(&entry.currency)
            .bind(delta)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO bucket_transactions (bucket_id, type, amount, currency, description)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&entry.bucket_id)
            .bind(entry.transaction_type.as_str())
            .bind(delta)
            .bind(&entry.currency)
            .bind(&entry.description)
            .execute(&mut *tx)
            .await?;

            touched.push(row.into());
        }

        tx.commit().await?;
        debug!(entries = entries.len(), "Applied ledger batch");
        Ok(touched)
    }

    async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<BucketTransaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, bucket_id, type, amount, currency, description, created_at
            FROM bucket_transactions
            WHERE ($1::text IS NULL OR bucket_id = $1)
              AND ($2::text IS NULL OR currency = $2)
              AND ($3::text IS NULL OR type = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(&filter.bucket_id)
        .bind(&filter.currency)
        .bind(filter.transaction_type.map(|t| t.as_str()))
        .bind(filter.since)
        .bind(filter.limit.map(i64::from))
        .bind(i64::from(filter.offset.unwrap_or(0)))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(TransactionRow::into_transaction)
            .collect()
    }

    async fn purge_bucket(&self, bucket_id: &str) -> Result<u64> {
        if bucket_id == CORE_BUCKET_ID {
            return Err(Error::invalid_transition("Cannot delete core bucket"));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM bucket_balances WHERE bucket_id = $1")
            .bind(bucket_id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM bucket_transactions WHERE bucket_id = $1")
            .bind(bucket_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // Settings and risk state cascade
        let deleted = sqlx::query("DELETE FROM buckets WHERE id = $1 AND type = 'satellite'")
            .bind(bucket_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Err(Error::bucket_not_found(bucket_id));
        }

        tx.commit().await?;
        Ok(removed)
    }
}
