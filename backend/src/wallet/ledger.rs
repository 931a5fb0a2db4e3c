//! Ledger primitives
//!
//! Each balance change is a single conditional `UPDATE ... RETURNING`, so the
//! non-negative check and the write happen atomically on the row. Callers pair
//! every business-relevant change with one `Transaction` record and decide how
//! changes to several entities are grouped (one SQL transaction, or saga steps).

use crate::{
    db::models::{now_timestamp, Transaction, UserType},
    error::{AppError, Result},
};
use sqlx::SqliteConnection;

pub(crate) fn owner_not_found(user_type: UserType) -> AppError {
    match user_type {
        UserType::Player => AppError::PlayerNotFound,
        UserType::Organizer => AppError::OrganizerNotFound,
    }
}

async fn current_value(
    conn: &mut SqliteConnection,
    user_type: UserType,
    user_id: &str,
    column: &str,
) -> Result<Option<i64>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", column, user_type.table());
    let row: Option<(i64,)> = sqlx::query_as(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|(value,)| value))
}

/// Adds `amount` (may be negative) to a wallet and returns the new balance.
///
/// Fails with `InsufficientFunds` when the result would be negative and leaves
/// the row untouched.
pub(crate) async fn adjust_balance(
    conn: &mut SqliteConnection,
    user_type: UserType,
    user_id: &str,
    amount: i64,
) -> Result<i64> {
    let sql = format!(
        "UPDATE {} SET wallet_balance = wallet_balance + ?, updated_at = ?
         WHERE id = ? AND wallet_balance + ? >= 0
         RETURNING wallet_balance",
        user_type.table()
    );

    let updated: Option<(i64,)> = sqlx::query_as(&sql)
        .bind(amount)
        .bind(now_timestamp())
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some((balance,)) = updated {
        return Ok(balance);
    }

    match current_value(conn, user_type, user_id, "wallet_balance").await? {
        None => Err(owner_not_found(user_type)),
        Some(available) => Err(AppError::InsufficientFunds {
            required: -amount,
            available,
        }),
    }
}

/// Adds `amount` (may be negative) to an organizer's locked prize pool.
pub(crate) async fn adjust_locked_pool(
    conn: &mut SqliteConnection,
    organizer_id: &str,
    amount: i64,
) -> Result<i64> {
    let updated: Option<(i64,)> = sqlx::query_as(
        "UPDATE organizers SET locked_prize_pool = locked_prize_pool + ?, updated_at = ?
         WHERE id = ? AND locked_prize_pool + ? >= 0
         RETURNING locked_prize_pool",
    )
    .bind(amount)
    .bind(now_timestamp())
    .bind(organizer_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((locked,)) = updated {
        return Ok(locked);
    }

    match current_value(conn, UserType::Organizer, organizer_id, "locked_prize_pool").await? {
        None => Err(AppError::OrganizerNotFound),
        Some(available) => Err(AppError::InsufficientEscrow {
            required: -amount,
            available,
        }),
    }
}

/// Moves `amount` from an organizer's wallet into escrow.
/// Returns `(wallet_balance, locked_prize_pool)` after the move.
pub(crate) async fn lock_funds(
    conn: &mut SqliteConnection,
    organizer_id: &str,
    amount: i64,
) -> Result<(i64, i64)> {
    let updated: Option<(i64, i64)> = sqlx::query_as(
        "UPDATE organizers
         SET wallet_balance = wallet_balance - ?, locked_prize_pool = locked_prize_pool + ?, updated_at = ?
         WHERE id = ? AND wallet_balance >= ?
         RETURNING wallet_balance, locked_prize_pool",
    )
    .bind(amount)
    .bind(amount)
    .bind(now_timestamp())
    .bind(organizer_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(balances) = updated {
        return Ok(balances);
    }

    match current_value(conn, UserType::Organizer, organizer_id, "wallet_balance").await? {
        None => Err(AppError::OrganizerNotFound),
        Some(available) => Err(AppError::InsufficientFunds {
            required: amount,
            available,
        }),
    }
}

/// Moves `amount` from an organizer's escrow back to the wallet.
pub(crate) async fn release_funds(
    conn: &mut SqliteConnection,
    organizer_id: &str,
    amount: i64,
) -> Result<(i64, i64)> {
    let updated: Option<(i64, i64)> = sqlx::query_as(
        "UPDATE organizers
         SET wallet_balance = wallet_balance + ?, locked_prize_pool = locked_prize_pool - ?, updated_at = ?
         WHERE id = ? AND locked_prize_pool >= ?
         RETURNING wallet_balance, locked_prize_pool",
    )
    .bind(amount)
    .bind(amount)
    .bind(now_timestamp())
    .bind(organizer_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(balances) = updated {
        return Ok(balances);
    }

    match current_value(conn, UserType::Organizer, organizer_id, "locked_prize_pool").await? {
        None => Err(AppError::OrganizerNotFound),
        Some(available) => Err(AppError::InsufficientEscrow {
            required: amount,
            available,
        }),
    }
}

pub(crate) async fn record_transaction(
    conn: &mut SqliteConnection,
    transaction: &Transaction,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO transactions (id, user_id, user_type, transaction_type, amount, currency, reference, meta, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&transaction.id)
    .bind(&transaction.user_id)
    .bind(&transaction.user_type)
    .bind(&transaction.transaction_type)
    .bind(transaction.amount)
    .bind(&transaction.currency)
    .bind(&transaction.reference)
    .bind(&transaction.meta)
    .bind(&transaction.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Removes the entry a compensating action is undoing. Only the entry-fee
/// rollback calls this; the ledger is otherwise append-only.
///
/// Deletes by id so a concurrent transfer that shares the same reference keeps
/// its own entry.
pub(crate) async fn delete_transaction(conn: &mut SqliteConnection, transaction_id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(transaction_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Ledger entry {} not found",
            transaction_id
        )));
    }
    Ok(())
}

pub(crate) async fn list_transactions(
    conn: &mut SqliteConnection,
    user_type: UserType,
    user_id: &str,
    limit: i64,
) -> Result<Vec<Transaction>> {
    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions
         WHERE user_type = ? AND user_id = ?
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?",
    )
    .bind(user_type.as_str())
    .bind(user_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    Ok(transactions)
}
