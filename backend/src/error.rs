//! Application error types
//!
//! Every failure carries a stable taxonomy kind (`kind()`), a finer stable code
//! (`code()`) and a human readable message. Responses never include SQL text or
//! backtraces.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Missing entities
    #[error("Organizer not found")]
    OrganizerNotFound,
    #[error("Player not found")]
    PlayerNotFound,
    #[error("Tournament not found")]
    TournamentNotFound,
    #[error("{0}")]
    NotFound(String),

    // Malformed input
    #[error("{0}")]
    Validation(String),

    // Balance and budget checks
    #[error("Insufficient wallet balance: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },
    #[error("Insufficient escrow: required {required}, available {available}")]
    InsufficientEscrow { required: i64, available: i64 },

    #[error("{0}")]
    Forbidden(String),

    // State conflicts
    #[error("Player already registered for this tournament")]
    AlreadyRegistered,
    #[error("{0}")]
    RegistrationClosed(String),
    #[error("Tournament is full")]
    TournamentFull,
    #[error("Results already declared for this tournament")]
    ResultsAlreadyDeclared,
    #[error("Match not finished yet")]
    MatchNotFinished,
    #[error("Prize already released")]
    AlreadyReleased,
    #[error("No locked prize to release")]
    NothingLocked,
    #[error("{0}")]
    Conflict(String),

    /// A compensating action failed; ledger state needs manual reconciliation.
    #[error("Ledger requires manual reconciliation: {0}")]
    Reconciliation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable taxonomy kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::OrganizerNotFound
            | AppError::PlayerNotFound
            | AppError::TournamentNotFound
            | AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "invalid_input",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::InsufficientEscrow { .. } => "insufficient_escrow",
            AppError::Forbidden(_) => "forbidden",
            AppError::AlreadyRegistered
            | AppError::RegistrationClosed(_)
            | AppError::TournamentFull
            | AppError::ResultsAlreadyDeclared
            | AppError::MatchNotFinished
            | AppError::AlreadyReleased
            | AppError::NothingLocked
            | AppError::Conflict(_) => "conflict",
            AppError::Reconciliation(_) | AppError::Database(_) | AppError::Internal(_) => {
                "internal"
            }
        }
    }

    /// Stable fine-grained code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::OrganizerNotFound => "organizer_not_found",
            AppError::PlayerNotFound => "player_not_found",
            AppError::TournamentNotFound => "tournament_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "invalid_input",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::InsufficientEscrow { .. } => "insufficient_escrow",
            AppError::Forbidden(_) => "forbidden",
            AppError::AlreadyRegistered => "already_registered",
            AppError::RegistrationClosed(_) => "registration_closed",
            AppError::TournamentFull => "tournament_full",
            AppError::ResultsAlreadyDeclared => "results_already_declared",
            AppError::MatchNotFinished => "match_not_finished",
            AppError::AlreadyReleased => "already_released",
            AppError::NothingLocked => "nothing_locked",
            AppError::Conflict(_) => "conflict",
            AppError::Reconciliation(_) => "reconciliation_required",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            "not_found" => StatusCode::NOT_FOUND,
            "forbidden" => StatusCode::FORBIDDEN,
            "internal" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to callers.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {:?}", e),
            AppError::Internal(e) => tracing::error!("Internal error: {:?}", e),
            AppError::Reconciliation(msg) => tracing::error!("Reconciliation required: {}", msg),
            _ => {}
        }

        let body = Json(json!({
            "success": false,
            "message": self.public_message(),
            "error": self.kind(),
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Maps a unique-constraint violation to a conflict, passing other errors through.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}
