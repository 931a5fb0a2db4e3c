use crate::{
    audit,
    db::models::{now_timestamp, TournamentDetail, Transaction, TransactionType, UserType},
    error::{AppError, Result},
    tournament::prizes::{self, Payout, PrizeDistribution, WinnerSelection, WinnerSelectionMode},
    wallet::ledger,
};
use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde_json::json;
use std::sync::Arc;

use super::{
    context::{self, TournamentContext},
    lifecycle,
    manager::ResultDeclaration,
};

pub(crate) struct ResultsService {
    ctx: Arc<TournamentContext>,
}

impl ResultsService {
    pub(crate) fn new(ctx: Arc<TournamentContext>) -> Self {
        Self { ctx }
    }

    /// Declare results and pay winners out of the tournament's escrow.
    ///
    /// Winner credits, the escrow debit, the `completed` stamp and the winner
    /// rows commit together or not at all.
    pub(crate) async fn declare_result(
        &self,
        tournament_id: &str,
        declaration: ResultDeclaration,
    ) -> Result<TournamentDetail> {
        let mut tx = self.ctx.pool.begin().await?;

        let tournament = context::fetch_tournament(&mut tx, tournament_id).await?;
        lifecycle::ensure_organizer(&tournament, &declaration.organizer_id)?;
        lifecycle::ensure_result_declarable(
            &tournament,
            Utc::now(),
            self.ctx.config.result_grace_hours,
        )?;

        let participants = context::fetch_participants(&mut tx, tournament_id).await?;
        let minimum = self.ctx.config.min_participants_for_result;
        if participants.len() < minimum {
            return Err(AppError::Validation(format!(
                "At least {} participants are required to declare results",
                minimum
            )));
        }

        let mode = self.selection_mode(&declaration)?;
        let distribution: PrizeDistribution = tournament.prize_distribution.parse()?;
        let budget = tournament.prize_locked;

        let selection = match mode {
            WinnerSelectionMode::Explicit => {
                WinnerSelection::Explicit(declaration.winners.clone().unwrap_or_default())
            }
            WinnerSelectionMode::Random => WinnerSelection::Random {
                count: distribution.paid_positions().min(participants.len()),
            },
        };

        let payouts = match selection {
            WinnerSelection::Explicit(winners) => {
                prizes::resolve_explicit_winners(&winners, &participants, &distribution, budget)?
            }
            WinnerSelection::Random { count } => {
                let mut rng = ChaCha20Rng::from_entropy();
                prizes::select_random_winners(&participants, count, &distribution, budget, &mut rng)?
            }
        };

        let total = prizes::total_prize(&payouts).ok_or(AppError::InsufficientEscrow {
            required: i64::MAX,
            available: tournament.prize_locked,
        })?;
        if total > tournament.prize_locked {
            return Err(AppError::InsufficientEscrow {
                required: total,
                available: tournament.prize_locked,
            });
        }

        let organizer = context::fetch_organizer(&mut tx, &tournament.organizer_id).await?;
        if organizer.locked_prize_pool < total {
            return Err(AppError::InsufficientEscrow {
                required: total,
                available: organizer.locked_prize_pool,
            });
        }

        let mut credited = Vec::with_capacity(payouts.len());
        for payout in &payouts {
            if payout.prize > 0 {
                let balance =
                    ledger::adjust_balance(&mut tx, UserType::Player, &payout.player_id, payout.prize)
                        .await?;
                let entry = Transaction::new(
                    UserType::Player,
                    &payout.player_id,
                    TransactionType::PrizeCredit,
                    payout.prize,
                    format!("prize_{}_{}", tournament_id, payout.position),
                    json!({
                        "tournamentId": tournament_id,
                        "organizerId": tournament.organizer_id,
                        "position": payout.position,
                    }),
                );
                ledger::record_transaction(&mut tx, &entry).await?;
                credited.push((payout.player_id.clone(), payout.prize, balance));
            }

            sqlx::query(
                "UPDATE players
                 SET tournaments_won = tournaments_won + ?, total_earnings = total_earnings + ?
                 WHERE id = ?",
            )
            .bind(i64::from(payout.position == 1))
            .bind(payout.prize)
            .bind(&payout.player_id)
            .execute(&mut *tx)
            .await?;

            insert_winner(&mut tx, tournament_id, payout).await?;
        }

        let locked = ledger::adjust_locked_pool(&mut tx, &tournament.organizer_id, -total).await?;

        let declared_at = now_timestamp();
        let stamped = sqlx::query(
            "UPDATE tournaments
             SET prize_locked = prize_locked - ?, status = 'completed', result_declared_at = ?, updated_at = ?
             WHERE id = ? AND result_declared_at IS NULL AND prize_locked >= ?",
        )
        .bind(total)
        .bind(&declared_at)
        .bind(&declared_at)
        .bind(tournament_id)
        .bind(total)
        .execute(&mut *tx)
        .await?;

        if stamped.rows_affected() == 0 {
            return Err(AppError::ResultsAlreadyDeclared);
        }

        let distribute = Transaction::new(
            UserType::Organizer,
            &tournament.organizer_id,
            TransactionType::PrizeDistribute,
            total,
            format!("prize_distribute_{}", tournament_id),
            json!({
                "tournamentId": tournament_id,
                "winners": payouts.len(),
            }),
        );
        ledger::record_transaction(&mut tx, &distribute).await?;

        tx.commit().await?;

        for (player_id, prize, balance) in &credited {
            audit::log_balance_change("player", player_id, "prize-credit", *prize, *balance);
        }
        audit::log_balance_change(
            "organizer",
            &tournament.organizer_id,
            "prize-distribute",
            -total,
            locked,
        );
        audit::log_tournament_event(
            tournament_id,
            "results_declared",
            &format!("{} winners, {} distributed", payouts.len(), total),
        );

        self.ctx.load_detail(tournament_id).await
    }

    /// Explicit when winners are supplied or requested, otherwise the
    /// requested or configured mode.
    fn selection_mode(&self, declaration: &ResultDeclaration) -> Result<WinnerSelectionMode> {
        let no_winners = declaration.winners.as_ref().map_or(true, Vec::is_empty);
        let mode = match (declaration.mode, no_winners) {
            (Some(mode), _) => mode,
            (None, false) => WinnerSelectionMode::Explicit,
            (None, true) => self.ctx.config.default_winner_selection,
        };

        if mode == WinnerSelectionMode::Explicit && no_winners {
            return Err(AppError::Validation(
                "Explicit result declaration needs at least one winner".to_string(),
            ));
        }
        Ok(mode)
    }
}

async fn insert_winner(
    conn: &mut sqlx::SqliteConnection,
    tournament_id: &str,
    payout: &Payout,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO tournament_winners (tournament_id, position, player_id, player_name, team_name, prize)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(tournament_id)
    .bind(payout.position)
    .bind(&payout.player_id)
    .bind(&payout.player_name)
    .bind(&payout.team_name)
    .bind(payout.prize)
    .execute(&mut *conn)
    .await
    .map_err(|e| crate::error::conflict_on_unique(e, "Winner position already recorded"))?;

    Ok(())
}
