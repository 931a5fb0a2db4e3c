//! Wallet and ledger
//!
//! Deposits, withdrawals and balance/ledger queries for players and
//! organizers. The primitives in [`ledger`] are the only code that writes
//! `wallet_balance` or `locked_prize_pool`.

pub mod ledger;
pub mod saga;

pub use saga::{SagaRecord, SagaStatus};

use crate::{
    audit,
    db::{
        models::{Transaction, TransactionType, UserType},
        DbPool,
    },
    error::{AppError, Result},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_TRANSACTION_LIMIT: i64 = 50;
pub const MAX_TRANSACTION_LIMIT: i64 = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub user_id: String,
    pub user_type: UserType,
    pub wallet_balance: i64,
    /// Always zero for players.
    pub locked_prize_pool: i64,
}

pub struct WalletService {
    pool: Arc<DbPool>,
}

impl WalletService {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    pub async fn deposit(
        &self,
        user_type: UserType,
        user_id: &str,
        amount: i64,
    ) -> Result<(i64, Transaction)> {
        self.apply_manual(user_type, user_id, amount, TransactionType::Deposit)
            .await
    }

    pub async fn withdraw(
        &self,
        user_type: UserType,
        user_id: &str,
        amount: i64,
    ) -> Result<(i64, Transaction)> {
        self.apply_manual(user_type, user_id, amount, TransactionType::Withdraw)
            .await
    }

    async fn apply_manual(
        &self,
        user_type: UserType,
        user_id: &str,
        amount: i64,
        transaction_type: TransactionType,
    ) -> Result<(i64, Transaction)> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("userId is required".to_string()));
        }
        if amount <= 0 {
            return Err(AppError::Validation("Amount must be positive".to_string()));
        }

        let (delta, reference) = match transaction_type {
            TransactionType::Deposit => (amount, "manual_deposit"),
            _ => (-amount, "manual_withdraw"),
        };

        let mut tx = self.pool.begin().await?;

        let balance = ledger::adjust_balance(&mut tx, user_type, user_id, delta).await?;
        let transaction = Transaction::new(
            user_type,
            user_id,
            transaction_type,
            amount,
            reference.to_string(),
            json!({}),
        );
        ledger::record_transaction(&mut tx, &transaction).await?;

        tx.commit().await?;

        audit::log_balance_change(
            user_type.as_str(),
            user_id,
            transaction_type.as_str(),
            delta,
            balance,
        );

        Ok((balance, transaction))
    }

    pub async fn balance(&self, user_type: UserType, user_id: &str) -> Result<WalletBalance> {
        let row: Option<(i64, i64)> = match user_type {
            UserType::Player => {
                sqlx::query_as("SELECT wallet_balance, 0 FROM players WHERE id = ?")
                    .bind(user_id)
                    .fetch_optional(&*self.pool)
                    .await?
            }
            UserType::Organizer => {
                sqlx::query_as(
                    "SELECT wallet_balance, locked_prize_pool FROM organizers WHERE id = ?",
                )
                .bind(user_id)
                .fetch_optional(&*self.pool)
                .await?
            }
        };

        let (wallet_balance, locked_prize_pool) =
            row.ok_or_else(|| ledger::owner_not_found(user_type))?;

        Ok(WalletBalance {
            user_id: user_id.to_string(),
            user_type,
            wallet_balance,
            locked_prize_pool,
        })
    }

    /// Ledger entries for one owner, newest first.
    pub async fn transactions(
        &self,
        user_type: UserType,
        user_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Transaction>> {
        let limit = limit
            .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
            .clamp(1, MAX_TRANSACTION_LIMIT);

        let mut conn = self.pool.acquire().await?;
        ledger::list_transactions(&mut conn, user_type, user_id, limit).await
    }

    pub async fn unsettled_sagas(&self) -> Result<Vec<SagaRecord>> {
        saga::unsettled(&self.pool).await
    }
}
