//! Entry-fee transfer
//!
//! Moves a registration fee from the player's wallet to the organizer's,
//! counts it on the tournament and appends the participant. Each step commits
//! on its own and is logged in a [`Saga`]; a failing step rolls back the
//! applied ones in reverse order.

use crate::{
    audit,
    db::{
        models::{Tournament, Transaction, TransactionType, UserType},
        DbPool,
    },
    error::{AppError, Result},
    wallet::{
        ledger,
        saga::{Saga, SagaStatus},
    },
};
use serde_json::json;

pub(crate) const DEBIT_PLAYER: &str = "debit_player";
pub(crate) const CREDIT_ORGANIZER: &str = "credit_organizer";
pub(crate) const COLLECT_FEE: &str = "collect_fee";
pub(crate) const APPEND_PARTICIPANT: &str = "append_participant";

const STEPS: &[&str] = &[DEBIT_PLAYER, CREDIT_ORGANIZER, COLLECT_FEE, APPEND_PARTICIPANT];

/// Ledger reference of the player's `deduct` entry.
pub fn deduct_reference(tournament_id: &str) -> String {
    format!("entry_fee_{}", tournament_id)
}

/// Ledger reference of the organizer's `fee-credit` entry.
pub fn fee_credit_reference(tournament_id: &str, player_id: &str) -> String {
    format!("entry_fee_{}_{}", tournament_id, player_id)
}

pub(crate) struct EntryFeeTransfer<'a> {
    pool: &'a DbPool,
    saga: Saga,
    tournament_id: String,
    organizer_id: String,
    player_id: String,
    fee: i64,
    /// Ids of the ledger entries written by this transfer, for compensation.
    deduct_entry: Option<String>,
    credit_entry: Option<String>,
}

impl<'a> EntryFeeTransfer<'a> {
    pub(crate) async fn begin(pool: &'a DbPool, tournament: &Tournament, player_id: &str) -> Result<Self> {
        let saga = Saga::begin(
            pool,
            "entry_fee",
            &fee_credit_reference(&tournament.id, player_id),
            STEPS,
        )
        .await?;

        Ok(Self {
            pool,
            saga,
            tournament_id: tournament.id.clone(),
            organizer_id: tournament.organizer_id.clone(),
            player_id: player_id.to_string(),
            fee: tournament.registration_fee(),
            deduct_entry: None,
            credit_entry: None,
        })
    }

    /// Runs the three money steps. On failure the applied steps are already
    /// compensated when this returns.
    pub(crate) async fn transfer(&mut self) -> Result<()> {
        if let Err(cause) = self.apply_money_steps().await {
            return Err(self.compensate(cause).await);
        }
        Ok(())
    }

    async fn apply_money_steps(&mut self) -> Result<()> {
        self.debit_player().await?;
        self.saga.mark_applied(self.pool, DEBIT_PLAYER).await?;

        self.credit_organizer().await?;
        self.saga.mark_applied(self.pool, CREDIT_ORGANIZER).await?;

        self.collect_fee().await?;
        self.saga.mark_applied(self.pool, COLLECT_FEE).await?;

        Ok(())
    }

    /// Records the final step as applied and closes the saga. A failure here
    /// leaves the saga `pending` for reconciliation but does not undo the
    /// registration.
    pub(crate) async fn complete(mut self) {
        let result = match self.saga.mark_applied(self.pool, APPEND_PARTICIPANT).await {
            Ok(()) => self.saga.finish(self.pool, SagaStatus::Completed, None).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(
                "Entry fee saga {} completed but could not be closed: {}",
                self.saga.id(),
                e
            );
        }
    }

    /// Undoes every applied step, newest first, and returns the error to report.
    pub(crate) async fn compensate(&mut self, cause: AppError) -> AppError {
        let cause_text = cause.to_string();

        for step in self.saga.applied_steps() {
            let undone = match step.as_str() {
                COLLECT_FEE => self.uncollect_fee().await,
                CREDIT_ORGANIZER => self.reverse_organizer_credit().await,
                DEBIT_PLAYER => self.refund_player().await,
                _ => Ok(()),
            };

            if let Err(e) = undone {
                let details = format!("undoing {} failed: {} (after: {})", step, e, cause_text);
                audit::log_reconciliation_required(self.saga.id(), self.saga.reference(), &details);
                if let Err(e) = self
                    .saga
                    .finish(self.pool, SagaStatus::CompensationFailed, Some(details.clone()))
                    .await
                {
                    tracing::error!("Could not record failed saga {}: {}", self.saga.id(), e);
                }
                return AppError::Reconciliation(format!("{}: {}", self.saga.reference(), details));
            }

            if let Err(e) = self.saga.mark_compensated(self.pool, &step).await {
                tracing::warn!("Could not persist compensation of {} in {}: {}", step, self.saga.id(), e);
            }
        }

        if let Err(e) = self
            .saga
            .finish(self.pool, SagaStatus::Compensated, Some(cause_text.clone()))
            .await
        {
            tracing::warn!("Could not close compensated saga {}: {}", self.saga.id(), e);
        }
        audit::log_compensation(self.saga.id(), self.saga.reference(), &cause_text);

        cause
    }

    // ------------------------------------------------------------------
    // Forward steps
    // ------------------------------------------------------------------

    async fn debit_player(&mut self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let balance = ledger::adjust_balance(&mut tx, UserType::Player, &self.player_id, -self.fee).await?;
        let entry = Transaction::new(
            UserType::Player,
            &self.player_id,
            TransactionType::Deduct,
            self.fee,
            deduct_reference(&self.tournament_id),
            json!({ "tournamentId": self.tournament_id, "organizerId": self.organizer_id }),
        );
        ledger::record_transaction(&mut tx, &entry).await?;

        tx.commit().await?;
        self.deduct_entry = Some(entry.id);

        audit::log_balance_change("player", &self.player_id, "deduct", -self.fee, balance);
        Ok(())
    }

    async fn credit_organizer(&mut self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let balance =
            ledger::adjust_balance(&mut tx, UserType::Organizer, &self.organizer_id, self.fee).await?;
        let entry = Transaction::new(
            UserType::Organizer,
            &self.organizer_id,
            TransactionType::FeeCredit,
            self.fee,
            fee_credit_reference(&self.tournament_id, &self.player_id),
            json!({ "tournamentId": self.tournament_id, "playerId": self.player_id }),
        );
        ledger::record_transaction(&mut tx, &entry).await?;

        tx.commit().await?;
        self.credit_entry = Some(entry.id);

        audit::log_balance_change("organizer", &self.organizer_id, "fee-credit", self.fee, balance);
        Ok(())
    }

    async fn collect_fee(&self) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tournaments SET entry_fee_collected = entry_fee_collected + ? WHERE id = ?",
        )
        .bind(self.fee)
        .bind(&self.tournament_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TournamentNotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Compensations
    // ------------------------------------------------------------------

    async fn uncollect_fee(&self) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tournaments SET entry_fee_collected = entry_fee_collected - ?
             WHERE id = ? AND entry_fee_collected >= ?",
        )
        .bind(self.fee)
        .bind(&self.tournament_id)
        .bind(self.fee)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Collected entry fees of tournament {} cannot be reduced",
                self.tournament_id
            )));
        }
        Ok(())
    }

    async fn reverse_organizer_credit(&self) -> Result<()> {
        let entry_id = recorded_entry(&self.credit_entry, CREDIT_ORGANIZER)?;
        let mut tx = self.pool.begin().await?;

        let balance =
            ledger::adjust_balance(&mut tx, UserType::Organizer, &self.organizer_id, -self.fee).await?;
        ledger::delete_transaction(&mut tx, entry_id).await?;

        tx.commit().await?;

        audit::log_balance_change("organizer", &self.organizer_id, "fee-credit-reversal", -self.fee, balance);
        Ok(())
    }

    async fn refund_player(&self) -> Result<()> {
        let entry_id = recorded_entry(&self.deduct_entry, DEBIT_PLAYER)?;
        let mut tx = self.pool.begin().await?;

        let balance = ledger::adjust_balance(&mut tx, UserType::Player, &self.player_id, self.fee).await?;
        ledger::delete_transaction(&mut tx, entry_id).await?;

        tx.commit().await?;

        audit::log_balance_change("player", &self.player_id, "deduct-refund", self.fee, balance);
        Ok(())
    }
}

fn recorded_entry<'e>(entry: &'e Option<String>, step: &str) -> Result<&'e str> {
    entry
        .as_deref()
        .ok_or_else(|| AppError::Conflict(format!("No ledger entry recorded for step {}", step)))
}
