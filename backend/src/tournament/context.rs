use crate::{
    config::LedgerConfig,
    db::{
        models::{Organizer, Participant, Player, Tournament, TournamentDetail, Winner},
        DbPool,
    },
    error::{AppError, Result},
};
use sqlx::SqliteConnection;
use std::sync::Arc;

/// Shared database access and rules for the tournament services.
pub(crate) struct TournamentContext {
    pub(crate) pool: Arc<DbPool>,
    pub(crate) config: LedgerConfig,
}

impl TournamentContext {
    pub(crate) fn new(pool: Arc<DbPool>, config: LedgerConfig) -> Self {
        Self { pool, config }
    }

    pub(crate) async fn load_tournament(&self, tournament_id: &str) -> Result<Tournament> {
        let mut conn = self.pool.acquire().await?;
        fetch_tournament(&mut conn, tournament_id).await
    }

    pub(crate) async fn load_detail(&self, tournament_id: &str) -> Result<TournamentDetail> {
        let mut conn = self.pool.acquire().await?;
        let tournament = fetch_tournament(&mut conn, tournament_id).await?;
        let participants = fetch_participants(&mut conn, tournament_id).await?;

        let winners = sqlx::query_as::<_, Winner>(
            "SELECT * FROM tournament_winners WHERE tournament_id = ? ORDER BY position",
        )
        .bind(tournament_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(TournamentDetail {
            tournament,
            participants,
            winners,
        })
    }

    pub(crate) async fn is_registered(&self, tournament_id: &str, player_id: &str) -> Result<bool> {
        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT player_id FROM tournament_participants WHERE tournament_id = ? AND player_id = ?",
        )
        .bind(tournament_id)
        .bind(player_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(existing.is_some())
    }

    pub(crate) async fn load_player(&self, player_id: &str) -> Result<Player> {
        let mut conn = self.pool.acquire().await?;
        fetch_player(&mut conn, player_id).await
    }
}

pub(crate) async fn fetch_tournament(
    conn: &mut SqliteConnection,
    tournament_id: &str,
) -> Result<Tournament> {
    sqlx::query_as::<_, Tournament>("SELECT * FROM tournaments WHERE id = ?")
        .bind(tournament_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::TournamentNotFound)
}

pub(crate) async fn fetch_participants(
    conn: &mut SqliteConnection,
    tournament_id: &str,
) -> Result<Vec<Participant>> {
    let participants = sqlx::query_as::<_, Participant>(
        "SELECT * FROM tournament_participants
         WHERE tournament_id = ?
         ORDER BY registered_at, rowid",
    )
    .bind(tournament_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(participants)
}

pub(crate) async fn fetch_organizer(
    conn: &mut SqliteConnection,
    organizer_id: &str,
) -> Result<Organizer> {
    sqlx::query_as::<_, Organizer>("SELECT * FROM organizers WHERE id = ?")
        .bind(organizer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::OrganizerNotFound)
}

pub(crate) async fn fetch_player(conn: &mut SqliteConnection, player_id: &str) -> Result<Player> {
    sqlx::query_as::<_, Player>("SELECT * FROM players WHERE id = ?")
        .bind(player_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::PlayerNotFound)
}

pub(crate) async fn insert_tournament(
    conn: &mut SqliteConnection,
    tournament: &Tournament,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO tournaments (
            id, tournament_name, organizer_id, organizer_name, game, mode, format,
            start_date, end_date, registration_deadline, max_teams, current_participants,
            prize_pool, prize_distribution, has_entry_fee, entry_fee, region, rules,
            description, stream_url, discord_url, status, entry_fee_collected, prize_locked,
            result_declared_at, prize_released_at, prize_release_note, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&tournament.id)
    .bind(&tournament.tournament_name)
    .bind(&tournament.organizer_id)
    .bind(&tournament.organizer_name)
    .bind(&tournament.game)
    .bind(&tournament.mode)
    .bind(&tournament.format)
    .bind(&tournament.start_date)
    .bind(&tournament.end_date)
    .bind(&tournament.registration_deadline)
    .bind(tournament.max_teams)
    .bind(tournament.current_participants)
    .bind(tournament.prize_pool)
    .bind(&tournament.prize_distribution)
    .bind(tournament.has_entry_fee)
    .bind(tournament.entry_fee)
    .bind(&tournament.region)
    .bind(&tournament.rules)
    .bind(&tournament.description)
    .bind(&tournament.stream_url)
    .bind(&tournament.discord_url)
    .bind(&tournament.status)
    .bind(tournament.entry_fee_collected)
    .bind(tournament.prize_locked)
    .bind(&tournament.result_declared_at)
    .bind(&tournament.prize_released_at)
    .bind(&tournament.prize_release_note)
    .bind(&tournament.created_at)
    .bind(&tournament.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| crate::error::conflict_on_unique(e, "Tournament with this ID already exists"))?;

    Ok(())
}
