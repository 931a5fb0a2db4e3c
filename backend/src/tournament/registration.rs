use crate::{
    audit,
    db::{
        models::{now_timestamp, Tournament, TournamentDetail},
        DbPool,
    },
    error::{AppError, Result},
};
use chrono::Utc;
use std::sync::Arc;

use super::{
    context::{self, TournamentContext},
    entry_fee::EntryFeeTransfer,
    lifecycle,
    manager::PlayerRegistration,
};

pub(crate) struct RegistrationService {
    ctx: Arc<TournamentContext>,
}

impl RegistrationService {
    pub(crate) fn new(ctx: Arc<TournamentContext>) -> Self {
        Self { ctx }
    }

    /// Register a player, charging the entry fee first when the tournament has one
    pub(crate) async fn register_player(
        &self,
        tournament_id: &str,
        registration: PlayerRegistration,
    ) -> Result<TournamentDetail> {
        let player_id = registration.player_id.trim().to_string();
        let player_name = registration.player_name.trim().to_string();
        if player_id.is_empty() {
            return Err(AppError::Validation("playerId is required".to_string()));
        }
        if player_name.is_empty() {
            return Err(AppError::Validation("playerName is required".to_string()));
        }
        let team_name = registration
            .team_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| player_name.clone());

        let tournament = self.ctx.load_tournament(tournament_id).await?;
        lifecycle::ensure_registration_open(&tournament, Utc::now())?;

        // Checked before any money moves; the primary key catches races later
        if self.ctx.is_registered(tournament_id, &player_id).await? {
            return Err(AppError::AlreadyRegistered);
        }

        let player = self.ctx.load_player(&player_id).await?;
        let fee = tournament.registration_fee();

        if fee > 0 {
            if player.wallet_balance < fee {
                return Err(AppError::InsufficientFunds {
                    required: fee,
                    available: player.wallet_balance,
                });
            }

            let mut transfer = EntryFeeTransfer::begin(&self.ctx.pool, &tournament, &player_id).await?;
            transfer.transfer().await?;

            if let Err(cause) =
                append_participant(&self.ctx.pool, &tournament, &player_id, &player_name, &team_name).await
            {
                return Err(transfer.compensate(cause).await);
            }

            transfer.complete().await;
        } else {
            append_participant(&self.ctx.pool, &tournament, &player_id, &player_name, &team_name).await?;
        }

        audit::log_tournament_event(
            tournament_id,
            "player_registered",
            &format!("{} ({}) fee {}", player_name, player_id, fee),
        );
        tracing::info!(
            "Player {} ({}) registered for tournament {}",
            player_name,
            player_id,
            tournament_id
        );

        self.ctx.load_detail(tournament_id).await
    }
}

/// Inserts the participant and recounts the roster in one transaction.
///
/// Fails with `AlreadyRegistered` on a duplicate, `RegistrationClosed` once the
/// status or deadline no longer allows entries and `TournamentFull` when the
/// recount exceeds `max_teams`; nothing is written in any of these cases.
async fn append_participant(
    pool: &DbPool,
    tournament: &Tournament,
    player_id: &str,
    player_name: &str,
    team_name: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    // Status, deadline and capacity may have changed while the fee was moving
    let current = context::fetch_tournament(&mut tx, &tournament.id).await?;
    lifecycle::ensure_registration_open(&current, Utc::now())?;

    sqlx::query(
        "INSERT INTO tournament_participants (tournament_id, player_id, player_name, team_name, registered_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&tournament.id)
    .bind(player_id)
    .bind(player_name)
    .bind(team_name)
    .bind(now_timestamp())
    .execute(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::AlreadyRegistered,
        _ => AppError::Database(e),
    })?;

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tournament_participants WHERE tournament_id = ?")
            .bind(&tournament.id)
            .fetch_one(&mut *tx)
            .await?;

    if count > current.max_teams {
        return Err(AppError::TournamentFull);
    }

    sqlx::query("UPDATE tournaments SET current_participants = ?, updated_at = ? WHERE id = ?")
        .bind(count)
        .bind(now_timestamp())
        .bind(&tournament.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE players SET tournaments_participated = tournaments_participated + 1 WHERE id = ?",
    )
    .bind(player_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
