//! Tournament Manager
//!
//! Entry point for everything that touches a tournament:
//! - Creation with prize escrow
//! - Registration and entry fees
//! - Status and link updates
//! - Result declaration and prize release

use crate::{
    config::LedgerConfig,
    db::{
        models::{Tournament, TournamentDetail},
        DbPool, Page,
    },
    error::Result,
    tournament::prizes::{ExplicitWinner, WinnerSelectionMode},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{
    context::TournamentContext, lifecycle::LifecycleService, registration::RegistrationService,
    results::ResultsService,
};

/// Configuration for creating a tournament
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentConfig {
    /// Client-chosen id; generated when absent.
    pub id: Option<String>,
    pub tournament_name: String,
    pub organizer_id: String,
    pub game: String,
    pub mode: String,
    pub format: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub registration_deadline: String,
    pub max_teams: i64,
    pub prize_pool: i64,
    pub prize_distribution: Option<String>,
    #[serde(default)]
    pub has_entry_fee: bool,
    #[serde(default)]
    pub entry_fee: i64,
    pub region: Option<String>,
    pub rules: Option<String>,
    pub description: Option<String>,
    pub stream_url: Option<String>,
    pub discord_url: Option<String>,
    /// `upcoming` or `registration-open` (default).
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRegistration {
    pub player_id: String,
    pub player_name: String,
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkUpdate {
    pub organizer_id: String,
    pub stream_url: Option<String>,
    pub discord_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub organizer_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDeclaration {
    pub organizer_id: String,
    pub mode: Option<WinnerSelectionMode>,
    pub winners: Option<Vec<ExplicitWinner>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeRelease {
    pub organizer_id: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentFilter {
    pub search: Option<String>,
    pub game: Option<String>,
    pub status: Option<String>,
    pub organizer_id: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

/// Manages all tournaments
pub struct TournamentManager {
    ctx: Arc<TournamentContext>,
    lifecycle: LifecycleService,
    registration: RegistrationService,
    results: ResultsService,
}

impl TournamentManager {
    pub fn new(pool: Arc<DbPool>, config: LedgerConfig) -> Self {
        let ctx = Arc::new(TournamentContext::new(pool, config));
        Self {
            lifecycle: LifecycleService::new(ctx.clone()),
            registration: RegistrationService::new(ctx.clone()),
            results: ResultsService::new(ctx.clone()),
            ctx,
        }
    }

    /// Create a tournament, locking its prize pool from the organizer's wallet
    pub async fn create_tournament(&self, config: TournamentConfig) -> Result<TournamentDetail> {
        self.lifecycle.create_tournament(config).await
    }

    pub async fn get_tournament(&self, tournament_id: &str) -> Result<TournamentDetail> {
        self.ctx.load_detail(tournament_id).await
    }

    pub async fn list_tournaments(&self, filter: TournamentFilter) -> Result<Page<Tournament>> {
        self.lifecycle.list_tournaments(filter).await
    }

    /// Register a player, transferring the entry fee when there is one
    pub async fn register_player(
        &self,
        tournament_id: &str,
        registration: PlayerRegistration,
    ) -> Result<TournamentDetail> {
        self.registration
            .register_player(tournament_id, registration)
            .await
    }

    pub async fn update_links(
        &self,
        tournament_id: &str,
        update: LinkUpdate,
    ) -> Result<TournamentDetail> {
        self.lifecycle.update_links(tournament_id, update).await
    }

    pub async fn update_status(
        &self,
        tournament_id: &str,
        update: StatusUpdate,
    ) -> Result<TournamentDetail> {
        self.lifecycle.update_status(tournament_id, update).await
    }

    /// Declare winners and pay them from escrow
    pub async fn declare_result(
        &self,
        tournament_id: &str,
        declaration: ResultDeclaration,
    ) -> Result<TournamentDetail> {
        self.results.declare_result(tournament_id, declaration).await
    }

    /// Return leftover escrow to the organizer after results are declared
    pub async fn release_prize(
        &self,
        tournament_id: &str,
        release: PrizeRelease,
    ) -> Result<TournamentDetail> {
        self.lifecycle.release_prize(tournament_id, release).await
    }
}
