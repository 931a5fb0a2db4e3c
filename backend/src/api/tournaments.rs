use crate::{
    api::{ApiJson, ApiQuery, ApiResponse, AppState},
    db::{
        models::{Tournament, TournamentDetail},
        Page,
    },
    error::Result,
    tournament::{
        LinkUpdate, PlayerRegistration, PrizeRelease, ResultDeclaration, StatusUpdate,
        TournamentConfig, TournamentFilter,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;

type DetailResponse = Json<ApiResponse<TournamentDetail>>;

// ==================== Router ====================

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_tournament).get(list_tournaments))
        .route("/:id", get(get_tournament))
        // Registration
        .route("/:id/register", post(register_player))
        // Organizer actions
        .route("/:id/links", put(update_links))
        .route("/:id/status", put(update_status))
        // Results
        .route("/:id/declare-result", post(declare_result))
        .route("/:id/release-prize", post(release_prize))
}

// ==================== Handlers ====================

async fn create_tournament(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<TournamentConfig>,
) -> Result<(StatusCode, DetailResponse)> {
    let detail = state.tournament_manager.create_tournament(req).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Tournament created and prize pool locked", detail),
    ))
}

async fn list_tournaments(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<TournamentFilter>,
) -> Result<Json<ApiResponse<Page<Tournament>>>> {
    let page = state.tournament_manager.list_tournaments(filter).await?;
    Ok(ApiResponse::ok(page))
}

async fn get_tournament(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<DetailResponse> {
    let detail = state.tournament_manager.get_tournament(&id).await?;
    Ok(ApiResponse::ok(detail))
}

async fn register_player(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PlayerRegistration>,
) -> Result<DetailResponse> {
    let detail = state.tournament_manager.register_player(&id, req).await?;
    Ok(ApiResponse::with_message("Registered successfully", detail))
}

async fn update_links(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<LinkUpdate>,
) -> Result<DetailResponse> {
    let detail = state.tournament_manager.update_links(&id, req).await?;
    Ok(ApiResponse::with_message("Links updated", detail))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StatusUpdate>,
) -> Result<DetailResponse> {
    let detail = state.tournament_manager.update_status(&id, req).await?;
    Ok(ApiResponse::with_message("Status updated", detail))
}

async fn declare_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ResultDeclaration>,
) -> Result<DetailResponse> {
    let detail = state.tournament_manager.declare_result(&id, req).await?;
    Ok(ApiResponse::with_message("Results declared", detail))
}

async fn release_prize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PrizeRelease>,
) -> Result<DetailResponse> {
    let detail = state.tournament_manager.release_prize(&id, req).await?;
    Ok(ApiResponse::with_message("Prize released", detail))
}
