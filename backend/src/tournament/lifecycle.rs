use crate::{
    audit,
    config::LedgerConfig,
    db::{
        models::{
            generate_id, now_timestamp, parse_timestamp, timestamp, Organizer, Tournament,
            TournamentDetail, TournamentStatus, Transaction, TransactionType, UserType,
        },
        Page, Pagination,
    },
    error::{AppError, Result},
    tournament::prizes::PrizeDistribution,
    wallet::ledger,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite};
use std::sync::Arc;

use super::{
    context::{self, TournamentContext},
    manager::{LinkUpdate, PrizeRelease, StatusUpdate, TournamentConfig, TournamentFilter},
};

pub const GAMES: &[&str] = &["pubg", "valorant", "cod"];
pub const MODES: &[&str] = &["solo", "duo", "squad"];
pub const FORMATS: &[&str] = &[
    "battle-royale",
    "single-elimination",
    "double-elimination",
    "round-robin",
    "swiss",
];

pub(crate) struct LifecycleService {
    ctx: Arc<TournamentContext>,
}

impl LifecycleService {
    pub(crate) fn new(ctx: Arc<TournamentContext>) -> Self {
        Self { ctx }
    }

    /// Create a tournament and lock its prize pool in the organizer's escrow.
    ///
    /// The organizer debit, the tournament row and the `lock` ledger entry are
    /// written in one transaction.
    pub(crate) async fn create_tournament(&self, config: TournamentConfig) -> Result<TournamentDetail> {
        let validated = validate_config(&config, &self.ctx.config)?;

        let mut tx = self.ctx.pool.begin().await?;

        let organizer = context::fetch_organizer(&mut tx, &config.organizer_id).await?;
        let prize = config.prize_pool;

        // Fails with InsufficientFunds without touching the row
        let (wallet_balance, locked_prize_pool) =
            ledger::lock_funds(&mut tx, &organizer.id, prize).await?;

        let tournament = build_tournament(config, validated, &organizer);
        context::insert_tournament(&mut tx, &tournament).await?;

        let lock = Transaction::new(
            UserType::Organizer,
            &organizer.id,
            TransactionType::Lock,
            prize,
            format!("prize_lock_{}", tournament.id),
            json!({ "tournamentId": tournament.id }),
        );
        ledger::record_transaction(&mut tx, &lock).await?;

        sqlx::query(
            "UPDATE organizers
             SET tournaments_organized = tournaments_organized + 1,
                 total_prize_pools = total_prize_pools + ?
             WHERE id = ?",
        )
        .bind(prize)
        .bind(&organizer.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        audit::log_balance_change("organizer", &organizer.id, "lock", -prize, wallet_balance);
        audit::log_tournament_event(
            &tournament.id,
            "created",
            &format!("prize {} locked (escrow now {})", prize, locked_prize_pool),
        );
        tracing::info!(
            "Created tournament {} ({}) for organizer {}",
            tournament.tournament_name,
            tournament.id,
            organizer.id
        );

        Ok(TournamentDetail {
            tournament,
            participants: Vec::new(),
            winners: Vec::new(),
        })
    }

    pub(crate) async fn update_links(
        &self,
        tournament_id: &str,
        update: LinkUpdate,
    ) -> Result<TournamentDetail> {
        let tournament = self.ctx.load_tournament(tournament_id).await?;

        ensure_organizer(&tournament, &update.organizer_id)?;
        ensure_links_editable(&tournament, Utc::now())?;

        let stream_url = update.stream_url.unwrap_or(tournament.stream_url);
        let discord_url = update.discord_url.unwrap_or(tournament.discord_url);

        sqlx::query(
            "UPDATE tournaments SET stream_url = ?, discord_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(stream_url.trim())
        .bind(discord_url.trim())
        .bind(now_timestamp())
        .bind(tournament_id)
        .execute(&*self.ctx.pool)
        .await?;

        audit::log_tournament_event(tournament_id, "links_updated", &stream_url);

        self.ctx.load_detail(tournament_id).await
    }

    pub(crate) async fn update_status(
        &self,
        tournament_id: &str,
        update: StatusUpdate,
    ) -> Result<TournamentDetail> {
        let tournament = self.ctx.load_tournament(tournament_id).await?;

        ensure_organizer(&tournament, &update.organizer_id)?;

        let target: TournamentStatus = update
            .status
            .parse()
            .map_err(|_| AppError::Validation(format!("Unknown status '{}'", update.status)))?;

        match target {
            TournamentStatus::Completed => {
                return Err(AppError::Validation(
                    "Tournaments are completed by declaring results".to_string(),
                ))
            }
            TournamentStatus::Cancelled => {
                return Err(AppError::Validation(
                    "Cancelling tournaments is not supported".to_string(),
                ))
            }
            _ => {}
        }

        let current = tournament.status();
        if current.is_terminal() {
            return Err(AppError::Conflict(format!("Tournament is already {}", current)));
        }
        if !current.can_advance_to(target) {
            return Err(AppError::Conflict(format!(
                "Cannot move tournament from {} to {}",
                current, target
            )));
        }

        // Guarded on the old status so two concurrent moves cannot both apply
        let result = sqlx::query(
            "UPDATE tournaments SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(target.as_str())
        .bind(now_timestamp())
        .bind(tournament_id)
        .bind(current.as_str())
        .execute(&*self.ctx.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "Tournament status changed concurrently".to_string(),
            ));
        }

        audit::log_tournament_event(
            tournament_id,
            "status_changed",
            &format!("{} -> {}", current, target),
        );

        self.ctx.load_detail(tournament_id).await
    }

    /// Return the undistributed escrow of a completed tournament to the organizer.
    pub(crate) async fn release_prize(
        &self,
        tournament_id: &str,
        release: PrizeRelease,
    ) -> Result<TournamentDetail> {
        let mut tx = self.ctx.pool.begin().await?;

        let tournament = context::fetch_tournament(&mut tx, tournament_id).await?;
        ensure_organizer(&tournament, &release.organizer_id)?;
        ensure_prize_releasable(&tournament)?;

        let amount = tournament.prize_locked;
        let released_at = now_timestamp();

        let stamped = sqlx::query(
            "UPDATE tournaments
             SET prize_locked = 0, prize_released_at = ?, prize_release_note = ?, updated_at = ?
             WHERE id = ? AND prize_released_at IS NULL AND prize_locked = ?",
        )
        .bind(&released_at)
        .bind(release.note.as_deref().unwrap_or("").trim())
        .bind(&released_at)
        .bind(tournament_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        if stamped.rows_affected() == 0 {
            return Err(AppError::AlreadyReleased);
        }

        let (wallet_balance, _) =
            ledger::release_funds(&mut tx, &tournament.organizer_id, amount).await?;

        let entry = Transaction::new(
            UserType::Organizer,
            &tournament.organizer_id,
            TransactionType::Release,
            amount,
            format!("prize_release_{}", tournament_id),
            json!({ "tournamentId": tournament_id }),
        );
        ledger::record_transaction(&mut tx, &entry).await?;

        tx.commit().await?;

        audit::log_balance_change(
            "organizer",
            &tournament.organizer_id,
            "release",
            amount,
            wallet_balance,
        );
        audit::log_tournament_event(tournament_id, "prize_released", &amount.to_string());

        self.ctx.load_detail(tournament_id).await
    }

    pub(crate) async fn list_tournaments(&self, filter: TournamentFilter) -> Result<Page<Tournament>> {
        let pagination = Pagination::new(filter.limit, filter.page);

        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tournaments");
        push_filters(&mut count_query, &filter);
        let (total,) = count_query
            .build_query_as::<(i64,)>()
            .fetch_one(&*self.ctx.pool)
            .await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM tournaments");
        push_filters(&mut query, &filter);
        query
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(pagination.limit)
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let items = query
            .build_query_as::<Tournament>()
            .fetch_all(&*self.ctx.pool)
            .await?;

        Ok(Page::new(items, total, pagination))
    }
}

fn push_filters<'a>(query: &mut QueryBuilder<'a, Sqlite>, filter: &'a TournamentFilter) {
    let mut separator = " WHERE ";

    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        query
            .push(separator)
            .push("(tournament_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR organizer_name LIKE ")
            .push_bind(pattern)
            .push(")");
        separator = " AND ";
    }

    for (column, value) in [
        ("game", &filter.game),
        ("status", &filter.status),
        ("organizer_id", &filter.organizer_id),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            query.push(separator).push(column).push(" = ").push_bind(value);
            separator = " AND ";
        }
    }
}

/// Dates and distribution parsed from a creation request.
pub(crate) struct ValidatedSchedule {
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    registration_deadline: DateTime<Utc>,
    distribution: PrizeDistribution,
    status: TournamentStatus,
}

fn parse_request_time(value: &str, field: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value.trim())
        .ok_or_else(|| AppError::Validation(format!("{} must be an RFC 3339 timestamp", field)))
}

/// Checks a creation request before anything is written.
pub(crate) fn validate_config(
    config: &TournamentConfig,
    rules: &LedgerConfig,
) -> Result<ValidatedSchedule> {
    if config.tournament_name.trim().is_empty() {
        return Err(AppError::Validation("Tournament name is required".to_string()));
    }
    if config.organizer_id.trim().is_empty() {
        return Err(AppError::Validation("organizerId is required".to_string()));
    }
    if !GAMES.contains(&config.game.as_str()) {
        return Err(AppError::Validation(format!("Unsupported game '{}'", config.game)));
    }
    if !MODES.contains(&config.mode.as_str()) {
        return Err(AppError::Validation(format!("Unsupported mode '{}'", config.mode)));
    }
    if let Some(format) = config.format.as_deref() {
        if !FORMATS.contains(&format) {
            return Err(AppError::Validation(format!("Unsupported format '{}'", format)));
        }
    }
    if config.max_teams < 2 {
        return Err(AppError::Validation("maxTeams must be at least 2".to_string()));
    }
    if config.prize_pool < rules.min_prize_pool {
        return Err(AppError::Validation(format!(
            "Prize pool must be at least {}",
            rules.min_prize_pool
        )));
    }
    if config.entry_fee < 0 {
        return Err(AppError::Validation("Entry fee must be non-negative".to_string()));
    }

    let distribution = match config.prize_distribution.as_deref() {
        Some(raw) => raw.parse()?,
        None => rules.default_distribution.clone(),
    };

    let start_date = parse_request_time(&config.start_date, "startDate")?;
    let registration_deadline =
        parse_request_time(&config.registration_deadline, "registrationDeadline")?;
    let end_date = config
        .end_date
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(|value| parse_request_time(value, "endDate"))
        .transpose()?;

    if let Some(end) = end_date {
        if start_date >= end {
            return Err(AppError::Validation(
                "End date must be after start date".to_string(),
            ));
        }
    }
    if registration_deadline >= start_date {
        return Err(AppError::Validation(
            "Registration deadline must be before start date".to_string(),
        ));
    }

    let status = match config.status.as_deref() {
        None | Some("registration-open") => TournamentStatus::RegistrationOpen,
        Some("upcoming") => TournamentStatus::Upcoming,
        Some(other) => {
            return Err(AppError::Validation(format!(
                "New tournaments must start as upcoming or registration-open, not '{}'",
                other
            )))
        }
    };

    Ok(ValidatedSchedule {
        start_date,
        end_date,
        registration_deadline,
        distribution,
        status,
    })
}

fn build_tournament(
    config: TournamentConfig,
    schedule: ValidatedSchedule,
    organizer: &Organizer,
) -> Tournament {
    let now = now_timestamp();
    let trimmed = |value: Option<String>, default: &str| {
        value
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| default.to_string())
    };

    Tournament {
        id: config
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| generate_id("trn")),
        tournament_name: config.tournament_name.trim().to_string(),
        organizer_id: organizer.id.clone(),
        organizer_name: organizer.name.clone(),
        game: config.game,
        mode: config.mode,
        format: config.format.unwrap_or_else(|| "battle-royale".to_string()),
        start_date: timestamp(schedule.start_date),
        end_date: schedule.end_date.map(timestamp),
        registration_deadline: timestamp(schedule.registration_deadline),
        max_teams: config.max_teams,
        current_participants: 0,
        prize_pool: config.prize_pool,
        prize_distribution: schedule.distribution.to_string(),
        has_entry_fee: config.has_entry_fee,
        entry_fee: config.entry_fee,
        region: trimmed(config.region, "global"),
        rules: trimmed(config.rules, "Standard tournament rules apply."),
        description: trimmed(config.description, ""),
        stream_url: trimmed(config.stream_url, ""),
        discord_url: trimmed(config.discord_url, ""),
        status: schedule.status.as_str().to_string(),
        entry_fee_collected: 0,
        prize_locked: config.prize_pool,
        result_declared_at: None,
        prize_released_at: None,
        prize_release_note: String::new(),
        created_at: now.clone(),
        updated_at: now,
    }
}

// ============================================================================
// Transition guards
// ============================================================================

fn stored_time(value: &str, field: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Stored {} is not a timestamp: {}", field, value)))
}

pub(crate) fn ensure_organizer(tournament: &Tournament, organizer_id: &str) -> Result<()> {
    if tournament.organizer_id != organizer_id {
        return Err(AppError::Forbidden(
            "Only the tournament organizer can perform this action".to_string(),
        ));
    }
    Ok(())
}

/// Registration needs an open status, a free slot and an unexpired deadline.
pub(crate) fn ensure_registration_open(tournament: &Tournament, now: DateTime<Utc>) -> Result<()> {
    if tournament.status() != TournamentStatus::RegistrationOpen {
        return Err(AppError::RegistrationClosed(
            "Tournament registration is closed".to_string(),
        ));
    }
    if tournament.current_participants >= tournament.max_teams {
        return Err(AppError::TournamentFull);
    }
    if now >= stored_time(&tournament.registration_deadline, "registrationDeadline")? {
        return Err(AppError::RegistrationClosed(
            "Registration deadline has passed".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_links_editable(tournament: &Tournament, now: DateTime<Utc>) -> Result<()> {
    let deadline = stored_time(&tournament.registration_deadline, "registrationDeadline")?;
    if tournament.status() != TournamentStatus::RegistrationOpen || now >= deadline {
        return Err(AppError::Conflict(
            "Links can only be changed while registration is open".to_string(),
        ));
    }
    Ok(())
}

/// `end_date`, or `start_date + grace` when the tournament has no end date.
pub(crate) fn effective_end(tournament: &Tournament, grace_hours: i64) -> Result<DateTime<Utc>> {
    match tournament.end_date.as_deref() {
        Some(end) => stored_time(end, "endDate"),
        None => Ok(stored_time(&tournament.start_date, "startDate")? + Duration::hours(grace_hours)),
    }
}

/// Declaration is allowed once, after the effective end, whatever the stored status.
pub(crate) fn ensure_result_declarable(
    tournament: &Tournament,
    now: DateTime<Utc>,
    grace_hours: i64,
) -> Result<()> {
    if tournament.result_declared_at.is_some()
        || tournament.status() == TournamentStatus::Completed
    {
        return Err(AppError::ResultsAlreadyDeclared);
    }
    if now < effective_end(tournament, grace_hours)? {
        return Err(AppError::MatchNotFinished);
    }
    Ok(())
}

pub(crate) fn ensure_prize_releasable(tournament: &Tournament) -> Result<()> {
    if tournament.status() != TournamentStatus::Completed {
        return Err(AppError::Conflict(
            "Prize can only be released after results are declared".to_string(),
        ));
    }
    if tournament.prize_released_at.is_some() {
        return Err(AppError::AlreadyReleased);
    }
    if tournament.prize_locked <= 0 {
        return Err(AppError::NothingLocked);
    }
    Ok(())
}
