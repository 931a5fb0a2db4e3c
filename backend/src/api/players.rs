use crate::{
    api::{
        optional_field, optional_id, validate_email, validate_name, validate_status, ApiJson,
        ApiQuery, ApiResponse, AppState, DirectoryQuery,
    },
    db::{
        models::{now_timestamp, Player},
        Page,
    },
    error::{conflict_on_unique, AppError, Result},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlayerRequest {
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country: Option<String>,
}

const PLAYER_STATUSES: &[&str] = &["active", "suspended", "banned"];

/// Profile fields a player may change; the wallet is not one of them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayerRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CountryCount {
    pub country: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub total: i64,
    pub active: i64,
    pub top_countries: Vec<CountryCount>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_player).get(list_players))
        .route("/stats/overview", get(player_stats))
        .route("/:id", get(get_player).put(update_player).delete(delete_player))
}

async fn create_player(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreatePlayerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Player>>)> {
    let player = Player::new(
        optional_id(req.id),
        validate_name("firstName", &req.first_name)?,
        validate_name("lastName", &req.last_name)?,
        validate_email(&req.email)?,
        req.phone.unwrap_or_default().trim().to_string(),
        req.country.unwrap_or_default().trim().to_string(),
    );

    sqlx::query(
        "INSERT INTO players (id, first_name, last_name, email, phone, country, status, wallet_balance,
                              tournaments_participated, tournaments_won, total_earnings, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&player.id)
    .bind(&player.first_name)
    .bind(&player.last_name)
    .bind(&player.email)
    .bind(&player.phone)
    .bind(&player.country)
    .bind(&player.status)
    .bind(player.wallet_balance)
    .bind(player.tournaments_participated)
    .bind(player.tournaments_won)
    .bind(player.total_earnings)
    .bind(&player.created_at)
    .bind(&player.updated_at)
    .execute(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Player with this email or id already exists"))?;

    tracing::info!("Created player {} ({})", player.full_name(), player.id);

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Player created", player),
    ))
}

fn push_filters<'a>(query: &mut QueryBuilder<'a, Sqlite>, filter: &'a DirectoryQuery) {
    let mut separator = " WHERE ";

    if let Some(pattern) = filter.search_pattern() {
        query
            .push(separator)
            .push("(LOWER(first_name || ' ' || last_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(email) LIKE ")
            .push_bind(pattern)
            .push(")");
        separator = " AND ";
    }
    if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
        query.push(separator).push("status = ").push_bind(status);
    }
}

async fn list_players(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<DirectoryQuery>,
) -> Result<Json<ApiResponse<Page<Player>>>> {
    let pagination = filter.pagination();

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM players");
    push_filters(&mut count, &filter);
    let (total,) = count
        .build_query_as::<(i64,)>()
        .fetch_one(&state.pool)
        .await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM players");
    push_filters(&mut query, &filter);
    query
        .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let players = query
        .build_query_as::<Player>()
        .fetch_all(&state.pool)
        .await?;

    Ok(ApiResponse::ok(Page::new(players, total, pagination)))
}

async fn get_player(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Player>>> {
    let player: Player = sqlx::query_as("SELECT * FROM players WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::PlayerNotFound)?;

    Ok(ApiResponse::ok(player))
}

async fn update_player(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdatePlayerRequest>,
) -> Result<Json<ApiResponse<Player>>> {
    let first_name = req
        .first_name
        .as_deref()
        .map(|n| validate_name("firstName", n))
        .transpose()?;
    let last_name = req
        .last_name
        .as_deref()
        .map(|n| validate_name("lastName", n))
        .transpose()?;
    let email = req.email.as_deref().map(validate_email).transpose()?;
    let status = req
        .status
        .as_deref()
        .map(|s| validate_status(s, PLAYER_STATUSES))
        .transpose()?;

    let player: Player = sqlx::query_as(
        "UPDATE players
         SET first_name = COALESCE(?, first_name),
             last_name = COALESCE(?, last_name),
             email = COALESCE(?, email),
             phone = COALESCE(?, phone),
             country = COALESCE(?, country),
             status = COALESCE(?, status),
             updated_at = ?
         WHERE id = ?
         RETURNING *",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(optional_field(req.phone))
    .bind(optional_field(req.country))
    .bind(status)
    .bind(now_timestamp())
    .bind(&id)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Player with this email already exists"))?
    .ok_or(AppError::PlayerNotFound)?;

    tracing::info!("Updated player {}", player.id);

    Ok(ApiResponse::with_message("Player updated", player))
}

/// Deletes a player with an empty wallet who is not entered in an open tournament.
async fn delete_player(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Player>>> {
    let mut tx = state.pool.begin().await?;

    let player: Player = sqlx::query_as("SELECT * FROM players WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::PlayerNotFound)?;

    if player.wallet_balance != 0 {
        return Err(AppError::Conflict(format!(
            "Player still holds {} in wallet",
            player.wallet_balance
        )));
    }

    let (open,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM tournament_participants p
         JOIN tournaments t ON t.id = p.tournament_id
         WHERE p.player_id = ? AND t.status NOT IN ('completed', 'cancelled')",
    )
    .bind(&id)
    .fetch_one(&mut *tx)
    .await?;
    if open > 0 {
        return Err(AppError::Conflict(format!(
            "Player is registered for {} tournaments that are not finished",
            open
        )));
    }

    sqlx::query("DELETE FROM players WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Deleted player {}", id);

    Ok(ApiResponse::with_message("Player deleted", player))
}

async fn player_stats(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse<PlayerStats>>> {
    let (total, active): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(status = 'active'), 0) FROM players",
    )
    .fetch_one(&state.pool)
    .await?;

    let top_countries: Vec<CountryCount> = sqlx::query_as(
        "SELECT country, COUNT(*) AS count FROM players
         WHERE country != ''
         GROUP BY country
         ORDER BY count DESC, country
         LIMIT 5",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::ok(PlayerStats {
        total,
        active,
        top_countries,
    }))
}
