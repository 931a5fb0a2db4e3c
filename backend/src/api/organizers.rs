use crate::{
    api::{
        optional_field, optional_id, validate_email, validate_name, validate_status, ApiJson,
        ApiQuery, ApiResponse, AppState, DirectoryQuery,
    },
    db::{
        models::{now_timestamp, Organizer},
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
pub struct CreateOrganizerRequest {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub organization_name: Option<String>,
}

const ORGANIZER_STATUSES: &[&str] = &["approved", "suspended"];

/// Profile fields an organizer may change. Wallet and escrow columns are not
/// part of it and only move through the ledger.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrganizerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OrganizerStats {
    pub total: i64,
    pub approved: i64,
    pub suspended: i64,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_organizer).get(list_organizers))
        .route("/stats/overview", get(organizer_stats))
        .route(
            "/:id",
            get(get_organizer)
                .put(update_organizer)
                .delete(delete_organizer),
        )
}

async fn create_organizer(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateOrganizerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Organizer>>)> {
    let organizer = Organizer::new(
        optional_id(req.id),
        validate_name("name", &req.name)?,
        validate_email(&req.email)?,
        req.phone.unwrap_or_default().trim().to_string(),
        req.organization_name.unwrap_or_default().trim().to_string(),
    );

    sqlx::query(
        "INSERT INTO organizers (id, name, email, phone, organization_name, status, wallet_balance,
                                 locked_prize_pool, tournaments_organized, total_prize_pools, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&organizer.id)
    .bind(&organizer.name)
    .bind(&organizer.email)
    .bind(&organizer.phone)
    .bind(&organizer.organization_name)
    .bind(&organizer.status)
    .bind(organizer.wallet_balance)
    .bind(organizer.locked_prize_pool)
    .bind(organizer.tournaments_organized)
    .bind(organizer.total_prize_pools)
    .bind(&organizer.created_at)
    .bind(&organizer.updated_at)
    .execute(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Organizer with this email or id already exists"))?;

    tracing::info!("Created organizer {} ({})", organizer.name, organizer.id);

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Organizer created", organizer),
    ))
}

fn push_filters<'a>(query: &mut QueryBuilder<'a, Sqlite>, filter: &'a DirectoryQuery) {
    let mut separator = " WHERE ";

    if let Some(pattern) = filter.search_pattern() {
        query
            .push(separator)
            .push("(LOWER(name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(email) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(organization_name) LIKE ")
            .push_bind(pattern)
            .push(")");
        separator = " AND ";
    }
    if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
        query.push(separator).push("status = ").push_bind(status);
    }
}

async fn list_organizers(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<DirectoryQuery>,
) -> Result<Json<ApiResponse<Page<Organizer>>>> {
    let pagination = filter.pagination();

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM organizers");
    push_filters(&mut count, &filter);
    let (total,) = count
        .build_query_as::<(i64,)>()
        .fetch_one(&state.pool)
        .await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM organizers");
    push_filters(&mut query, &filter);
    query
        .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let organizers = query
        .build_query_as::<Organizer>()
        .fetch_all(&state.pool)
        .await?;

    Ok(ApiResponse::ok(Page::new(organizers, total, pagination)))
}

async fn get_organizer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Organizer>>> {
    let organizer: Organizer = sqlx::query_as("SELECT * FROM organizers WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::OrganizerNotFound)?;

    Ok(ApiResponse::ok(organizer))
}

async fn update_organizer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateOrganizerRequest>,
) -> Result<Json<ApiResponse<Organizer>>> {
    let name = req.name.as_deref().map(|n| validate_name("name", n)).transpose()?;
    let email = req.email.as_deref().map(validate_email).transpose()?;
    let status = req
        .status
        .as_deref()
        .map(|s| validate_status(s, ORGANIZER_STATUSES))
        .transpose()?;

    let organizer: Organizer = sqlx::query_as(
        "UPDATE organizers
         SET name = COALESCE(?, name),
             email = COALESCE(?, email),
             phone = COALESCE(?, phone),
             organization_name = COALESCE(?, organization_name),
             status = COALESCE(?, status),
             updated_at = ?
         WHERE id = ?
         RETURNING *",
    )
    .bind(name)
    .bind(email)
    .bind(optional_field(req.phone))
    .bind(optional_field(req.organization_name))
    .bind(status)
    .bind(now_timestamp())
    .bind(&id)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Organizer with this email already exists"))?
    .ok_or(AppError::OrganizerNotFound)?;

    tracing::info!("Updated organizer {}", organizer.id);

    Ok(ApiResponse::with_message("Organizer updated", organizer))
}

/// Deletes an organizer that holds no money and runs no open tournament.
async fn delete_organizer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Organizer>>> {
    let mut tx = state.pool.begin().await?;

    let organizer: Organizer = sqlx::query_as("SELECT * FROM organizers WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::OrganizerNotFound)?;

    if organizer.wallet_balance != 0 || organizer.locked_prize_pool != 0 {
        return Err(AppError::Conflict(format!(
            "Organizer still holds {} in wallet and {} in escrow",
            organizer.wallet_balance, organizer.locked_prize_pool
        )));
    }

    let (open,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM tournaments
         WHERE organizer_id = ? AND status NOT IN ('completed', 'cancelled')",
    )
    .bind(&id)
    .fetch_one(&mut *tx)
    .await?;
    if open > 0 {
        return Err(AppError::Conflict(format!(
            "Organizer has {} tournaments that are not finished",
            open
        )));
    }

    sqlx::query("DELETE FROM organizers WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Deleted organizer {}", id);

    Ok(ApiResponse::with_message("Organizer deleted", organizer))
}

async fn organizer_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<OrganizerStats>>> {
    let stats: OrganizerStats = sqlx::query_as(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(status = 'approved'), 0) AS approved,
                COALESCE(SUM(status = 'suspended'), 0) AS suspended
         FROM organizers",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::ok(stats))
}
