pub mod organizers;
pub mod players;
pub mod tournaments;
pub mod wallet;

pub use organizers::router as organizers_router;
pub use players::router as players_router;
pub use tournaments::router as tournaments_router;
pub use wallet::router as wallet_router;

use crate::{
    db::{DbPool, Pagination},
    error::{AppError, Result},
    tournament::TournamentManager,
    wallet::WalletService,
};
use axum::{
    extract::{FromRequest, FromRequestParts, Query},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `Json` body extractor whose rejections render as the error envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Query` extractor whose rejections render as the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Shared state for every router
pub struct AppState {
    pub pool: DbPool,
    pub tournament_manager: Arc<TournamentManager>,
    pub wallet: Arc<WalletService>,
}

/// `{success, message?, data?}` envelope used by every successful response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        })
    }
}

/// Query string shared by the organizer and player directories.
#[derive(Debug, Default, Deserialize)]
pub struct DirectoryQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl DirectoryQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.page)
    }

    /// `%term%` for a case-insensitive `LIKE`, or `None` when no search was given.
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(|term| format!("%{}%", term.to_lowercase()))
    }
}

pub(crate) fn validate_name(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    let length = value.chars().count();
    if !(2..=50).contains(&length) {
        return Err(AppError::Validation(format!(
            "{} must be between 2 and 50 characters",
            field
        )));
    }
    Ok(value.to_string())
}

pub(crate) fn validate_email(value: &str) -> Result<String> {
    let value = value.trim().to_lowercase();
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && domain.contains('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    Ok(value)
}

/// Client-supplied id, trimmed; blank counts as absent.
pub(crate) fn optional_id(id: Option<String>) -> Option<String> {
    id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
}

pub(crate) fn validate_status(value: &str, allowed: &[&str]) -> Result<String> {
    let value = value.trim();
    if !allowed.contains(&value) {
        return Err(AppError::Validation(format!(
            "status must be one of: {}",
            allowed.join(", ")
        )));
    }
    Ok(value.to_string())
}

/// Trimmed optional text field; `None` leaves the stored value unchanged.
pub(crate) fn optional_field(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}
