//! Structured audit logging for money-moving and lifecycle events.
//!
//! Every balance change, tournament event and reconciliation alert is logged
//! with `target: "audit"` so it can be routed separately from request logs.

/// Log a wallet or escrow balance change
pub fn log_balance_change(
    user_type: &str,
    user_id: &str,
    reason: &str,
    amount: i64,
    new_balance: i64,
) {
    tracing::info!(
        target: "audit",
        event = "balance_change",
        user_type = user_type,
        user_id = user_id,
        reason = reason,
        amount = amount,
        new_balance = new_balance,
        "Balance change: {} for {} {} ({})",
        amount,
        user_type,
        user_id,
        reason
    );
}

/// Log a tournament event
pub fn log_tournament_event(tournament_id: &str, event: &str, details: &str) {
    tracing::info!(
        target: "audit",
        event = "tournament",
        tournament_id = tournament_id,
        tournament_event = event,
        details = details,
        "Tournament {}: {} - {}",
        tournament_id,
        event,
        details
    );
}

/// Log a saga that was rolled back by its compensating steps
pub fn log_compensation(saga_id: &str, reference: &str, cause: &str) {
    tracing::warn!(
        target: "audit",
        event = "compensation",
        saga_id = saga_id,
        reference = reference,
        cause = cause,
        "Compensated saga {} ({}): {}",
        saga_id,
        reference,
        cause
    );
}

/// Log ledger state that could not be repaired automatically
pub fn log_reconciliation_required(saga_id: &str, reference: &str, details: &str) {
    tracing::error!(
        target: "audit",
        event = "reconciliation_required",
        saga_id = saga_id,
        reference = reference,
        details = details,
        "Manual reconciliation required for saga {} ({}): {}",
        saga_id,
        reference,
        details
    );
}
