//! Service-level tests for the wallet ledger
//!
//! These tests drive the tournament manager and wallet service directly
//! against an in-memory database:
//! - Prize escrow at creation and release
//! - Entry-fee transfers and their compensation
//! - Result payouts
//! - Conservation of money and concurrent registrations

use chrono::{Duration, Utc};
use std::sync::Arc;
use tourney_server::{
    config::LedgerConfig,
    create_test_db,
    db::{
        models::{timestamp, Organizer, Player, Transaction, UserType},
        DbPool,
    },
    error::AppError,
    tournament::{
        PlayerRegistration, PrizeRelease, ResultDeclaration, TournamentConfig, TournamentManager,
        WinnerSelectionMode,
    },
    wallet::WalletService,
};

struct Harness {
    pool: DbPool,
    manager: Arc<TournamentManager>,
    wallet: WalletService,
}

async fn setup() -> Harness {
    let pool = create_test_db().await;
    let shared = Arc::new(pool.clone());
    Harness {
        manager: Arc::new(TournamentManager::new(shared.clone(), LedgerConfig::default())),
        wallet: WalletService::new(shared),
        pool,
    }
}

fn hours_from_now(hours: i64) -> String {
    timestamp(Utc::now() + Duration::hours(hours))
}

async fn add_organizer(h: &Harness, id: &str, balance: i64) {
    let organizer = Organizer::new(
        Some(id.to_string()),
        format!("Organizer {}", id),
        format!("{}@example.com", id),
        String::new(),
        "Arena League".to_string(),
    );
    sqlx::query(
        "INSERT INTO organizers (id, name, email, phone, organization_name, status, wallet_balance,
                                 locked_prize_pool, tournaments_organized, total_prize_pools, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0, 0, ?, ?)",
    )
    .bind(&organizer.id)
    .bind(&organizer.name)
    .bind(&organizer.email)
    .bind(&organizer.phone)
    .bind(&organizer.organization_name)
    .bind(&organizer.status)
    .bind(&organizer.created_at)
    .bind(&organizer.updated_at)
    .execute(&h.pool)
    .await
    .unwrap();

    if balance > 0 {
        h.wallet
            .deposit(UserType::Organizer, id, balance)
            .await
            .unwrap();
    }
}

async fn add_player(h: &Harness, id: &str, balance: i64) {
    let player = Player::new(
        Some(id.to_string()),
        "Player".to_string(),
        id.to_string(),
        format!("{}@example.com", id),
        String::new(),
        "IN".to_string(),
    );
    sqlx::query(
        "INSERT INTO players (id, first_name, last_name, email, phone, country, status, wallet_balance,
                              tournaments_participated, tournaments_won, total_earnings, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, ?, ?)",
    )
    .bind(&player.id)
    .bind(&player.first_name)
    .bind(&player.last_name)
    .bind(&player.email)
    .bind(&player.phone)
    .bind(&player.country)
    .bind(&player.status)
    .bind(&player.created_at)
    .bind(&player.updated_at)
    .execute(&h.pool)
    .await
    .unwrap();

    if balance > 0 {
        h.wallet.deposit(UserType::Player, id, balance).await.unwrap();
    }
}

fn tournament_config(id: &str, organizer_id: &str, prize_pool: i64, entry_fee: i64) -> TournamentConfig {
    TournamentConfig {
        id: Some(id.to_string()),
        tournament_name: format!("Cup {}", id),
        organizer_id: organizer_id.to_string(),
        game: "pubg".to_string(),
        mode: "squad".to_string(),
        start_date: hours_from_now(48),
        end_date: Some(hours_from_now(50)),
        registration_deadline: hours_from_now(24),
        max_teams: 8,
        prize_pool,
        has_entry_fee: entry_fee > 0,
        entry_fee,
        ..TournamentConfig::default()
    }
}

fn registration(player_id: &str) -> PlayerRegistration {
    PlayerRegistration {
        player_id: player_id.to_string(),
        player_name: format!("Name {}", player_id),
        team_name: None,
    }
}

/// Moves the match into the past so results can be declared.
async fn finish_match(h: &Harness, tournament_id: &str) {
    sqlx::query(
        "UPDATE tournaments SET registration_deadline = ?, start_date = ?, end_date = ? WHERE id = ?",
    )
    .bind(hours_from_now(-5))
    .bind(hours_from_now(-4))
    .bind(hours_from_now(-1))
    .bind(tournament_id)
    .execute(&h.pool)
    .await
    .unwrap();
}

async fn balances(h: &Harness, user_type: UserType, id: &str) -> (i64, i64) {
    let balance = h.wallet.balance(user_type, id).await.unwrap();
    (balance.wallet_balance, balance.locked_prize_pool)
}

async fn ledger(h: &Harness, user_type: UserType, id: &str) -> Vec<Transaction> {
    h.wallet.transactions(user_type, id, Some(200)).await.unwrap()
}

async fn total_money(h: &Harness) -> i64 {
    let (organizers,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(wallet_balance + locked_prize_pool), 0) FROM organizers",
    )
    .fetch_one(&h.pool)
    .await
    .unwrap();
    let (players,): (i64,) = sqlx::query_as("SELECT COALESCE(SUM(wallet_balance), 0) FROM players")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    organizers + players
}

async fn saga_status(h: &Harness, reference: &str) -> String {
    let (status,): (String,) =
        sqlx::query_as("SELECT status FROM ledger_sagas WHERE reference = ? ORDER BY created_at DESC")
            .bind(reference)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    status
}

// ============================================================================
// Prize lock
// ============================================================================

#[tokio::test]
async fn test_creation_locks_prize_pool() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;

    let detail = h
        .manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 0))
        .await
        .unwrap();

    assert_eq!(detail.tournament.prize_locked, 3000);
    assert_eq!(detail.tournament.organizer_name, "Organizer org_a");
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (7000, 3000));

    let locks: Vec<_> = ledger(&h, UserType::Organizer, "org_a")
        .await
        .into_iter()
        .filter(|t| t.transaction_type == "lock")
        .collect();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].amount, 3000);
    assert_eq!(locks[0].reference, "prize_lock_trn_a");
    assert_eq!(locks[0].meta.0["tournamentId"], "trn_a");

    let (organized, pools): (i64, i64) = sqlx::query_as(
        "SELECT tournaments_organized, total_prize_pools FROM organizers WHERE id = 'org_a'",
    )
    .fetch_one(&h.pool)
    .await
    .unwrap();
    assert_eq!((organized, pools), (1, 3000));
}

#[tokio::test]
async fn test_creation_without_funds_changes_nothing() {
    let h = setup().await;
    add_organizer(&h, "org_a", 2000).await;

    let err = h
        .manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds { required: 3000, available: 2000 }));
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (2000, 0));
    assert!(matches!(
        h.manager.get_tournament("trn_a").await,
        Err(AppError::TournamentNotFound)
    ));
}

#[tokio::test]
async fn test_creation_for_unknown_organizer() {
    let h = setup().await;

    let err = h
        .manager
        .create_tournament(tournament_config("trn_a", "org_missing", 3000, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::OrganizerNotFound));
}

#[tokio::test]
async fn test_duplicate_tournament_id_rolls_back_lock() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;

    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 0))
        .await
        .unwrap();
    let err = h
        .manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (7000, 3000));
}

// ============================================================================
// Entry fees
// ============================================================================

#[tokio::test]
async fn test_entry_fee_moves_to_organizer() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 500).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 200))
        .await
        .unwrap();

    let detail = h
        .manager
        .register_player("trn_a", registration("plr_1"))
        .await
        .unwrap();

    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 300);
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (7200, 3000));
    assert_eq!(detail.tournament.entry_fee_collected, 200);
    assert_eq!(detail.tournament.current_participants, 1);
    assert_eq!(detail.participants.len(), 1);
    assert_eq!(detail.participants[0].team_name, "Name plr_1");

    let deduct = ledger(&h, UserType::Player, "plr_1")
        .await
        .into_iter()
        .find(|t| t.transaction_type == "deduct")
        .unwrap();
    assert_eq!(deduct.reference, "entry_fee_trn_a");
    assert_eq!(deduct.amount, 200);

    let credit = ledger(&h, UserType::Organizer, "org_a")
        .await
        .into_iter()
        .find(|t| t.transaction_type == "fee-credit")
        .unwrap();
    assert_eq!(credit.reference, "entry_fee_trn_a_plr_1");
    assert_eq!(credit.meta.0["playerId"], "plr_1");

    assert_eq!(saga_status(&h, "entry_fee_trn_a_plr_1").await, "completed");
}

#[tokio::test]
async fn test_entry_fee_rejected_without_funds() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 100).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 200))
        .await
        .unwrap();

    let err = h
        .manager
        .register_player("trn_a", registration("plr_1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds { required: 200, available: 100 }));
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 100);
    // Only the deposit
    assert_eq!(ledger(&h, UserType::Player, "plr_1").await.len(), 1);
    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert!(detail.participants.is_empty());
    assert_eq!(detail.tournament.entry_fee_collected, 0);
}

#[tokio::test]
async fn test_second_registration_is_rejected_without_charge() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 500).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 200))
        .await
        .unwrap();

    h.manager
        .register_player("trn_a", registration("plr_1"))
        .await
        .unwrap();
    let err = h
        .manager
        .register_player("trn_a", registration("plr_1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AlreadyRegistered));
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 300);
    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert_eq!(detail.participants.len(), 1);
    assert_eq!(detail.tournament.entry_fee_collected, 200);
}

#[tokio::test]
async fn test_unknown_player_is_rejected() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 0))
        .await
        .unwrap();

    let err = h
        .manager
        .register_player("trn_a", registration("plr_ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PlayerNotFound));
}

#[tokio::test]
async fn test_failed_organizer_credit_refunds_player() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 500).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 200))
        .await
        .unwrap();

    // The credit step cannot find the organizer any more
    sqlx::query("DELETE FROM organizers WHERE id = 'org_a'")
        .execute(&h.pool)
        .await
        .unwrap();

    let err = h
        .manager
        .register_player("trn_a", registration("plr_1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::OrganizerNotFound));
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 500);
    assert!(ledger(&h, UserType::Player, "plr_1")
        .await
        .iter()
        .all(|t| t.transaction_type != "deduct"));
    assert_eq!(saga_status(&h, "entry_fee_trn_a_plr_1").await, "compensated");

    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert!(detail.participants.is_empty());
    assert_eq!(detail.tournament.entry_fee_collected, 0);
    assert!(h.wallet.unsettled_sagas().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_refund_requires_reconciliation() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 500).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 200))
        .await
        .unwrap();

    sqlx::query("DELETE FROM organizers WHERE id = 'org_a'")
        .execute(&h.pool)
        .await
        .unwrap();
    // Player wallets can no longer be credited, so the refund fails too
    sqlx::query(
        "CREATE TRIGGER freeze_player_credits BEFORE UPDATE OF wallet_balance ON players
         WHEN NEW.wallet_balance > OLD.wallet_balance
         BEGIN SELECT RAISE(ABORT, 'wallet frozen'); END",
    )
    .execute(&h.pool)
    .await
    .unwrap();

    let err = h
        .manager
        .register_player("trn_a", registration("plr_1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Reconciliation(_)));
    assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 300);

    let unsettled = h.wallet.unsettled_sagas().await.unwrap();
    assert_eq!(unsettled.len(), 1);
    assert_eq!(unsettled[0].status, "compensation_failed");
    assert_eq!(unsettled[0].reference, "entry_fee_trn_a_plr_1");
    assert!(unsettled[0].error.as_deref().unwrap_or("").contains("debit_player"));
}

#[tokio::test]
async fn test_deadline_passing_during_fee_transfer_refunds_player() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 500).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 200))
        .await
        .unwrap();

    // The deadline passes as soon as the fee is counted on the tournament
    sqlx::query(&format!(
        "CREATE TRIGGER close_on_fee AFTER UPDATE OF entry_fee_collected ON tournaments
         BEGIN UPDATE tournaments SET registration_deadline = '{}' WHERE id = NEW.id; END",
        hours_from_now(-1)
    ))
    .execute(&h.pool)
    .await
    .unwrap();

    let err = h
        .manager
        .register_player("trn_a", registration("plr_1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RegistrationClosed(_)));
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 500);
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (7000, 3000));
    assert_eq!(saga_status(&h, "entry_fee_trn_a_plr_1").await, "compensated");

    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert!(detail.participants.is_empty());
    assert_eq!(detail.tournament.entry_fee_collected, 0);
    assert!(ledger(&h, UserType::Organizer, "org_a")
        .await
        .iter()
        .all(|t| t.transaction_type != "fee-credit"));
}

#[tokio::test]
async fn test_free_tournament_registration_moves_no_money() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 0).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 0))
        .await
        .unwrap();

    let detail = h
        .manager
        .register_player(
            "trn_a",
            PlayerRegistration {
                player_id: "plr_1".to_string(),
                player_name: "Neo".to_string(),
                team_name: Some("Zion".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(detail.participants[0].team_name, "Zion");
    assert!(ledger(&h, UserType::Player, "plr_1").await.is_empty());
    let (participated,): (i64,) =
        sqlx::query_as("SELECT tournaments_participated FROM players WHERE id = 'plr_1'")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(participated, 1);
}

// ============================================================================
// Results and release
// ============================================================================

async fn tournament_with_players(h: &Harness, players: &[&str]) {
    add_organizer(h, "org_a", 10_000).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 0))
        .await
        .unwrap();
    for player in players {
        add_player(h, player, 0).await;
        h.manager
            .register_player("trn_a", registration(player))
            .await
            .unwrap();
    }
}

fn explicit(organizer_id: &str, winners: &[(i64, &str)]) -> ResultDeclaration {
    ResultDeclaration {
        organizer_id: organizer_id.to_string(),
        mode: None,
        winners: Some(
            winners
                .iter()
                .map(|(position, player)| {
                    serde_json::from_value(serde_json::json!({
                        "position": position,
                        "playerId": player,
                    }))
                    .unwrap()
                })
                .collect(),
        ),
    }
}

#[tokio::test]
async fn test_declare_pays_distribution() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3", "plr_4"]).await;
    finish_match(&h, "trn_a").await;

    let detail = h
        .manager
        .declare_result(
            "trn_a",
            explicit("org_a", &[(1, "plr_2"), (2, "plr_1"), (3, "plr_4")]),
        )
        .await
        .unwrap();

    let prizes: Vec<i64> = detail.winners.iter().map(|w| w.prize).collect();
    assert_eq!(prizes, vec![1800, 900, 300]);
    assert_eq!(detail.tournament.prize_locked, 0);
    assert_eq!(detail.tournament.status, "completed");
    assert!(detail.tournament.result_declared_at.is_some());

    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (7000, 0));
    assert_eq!(balances(&h, UserType::Player, "plr_2").await.0, 1800);
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 900);
    assert_eq!(balances(&h, UserType::Player, "plr_4").await.0, 300);
    assert_eq!(balances(&h, UserType::Player, "plr_3").await.0, 0);

    let credit = ledger(&h, UserType::Player, "plr_2").await;
    assert_eq!(credit[0].transaction_type, "prize-credit");
    assert_eq!(credit[0].reference, "prize_trn_a_1");

    let distribute = ledger(&h, UserType::Organizer, "org_a")
        .await
        .into_iter()
        .find(|t| t.transaction_type == "prize-distribute")
        .unwrap();
    assert_eq!(distribute.amount, 3000);

    let (won, earnings): (i64, i64) =
        sqlx::query_as("SELECT tournaments_won, total_earnings FROM players WHERE id = 'plr_2'")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!((won, earnings), (1, 1800));
}

#[tokio::test]
async fn test_declare_before_end_is_rejected() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3"]).await;

    let err = h
        .manager
        .declare_result(
            "trn_a",
            explicit("org_a", &[(1, "plr_1"), (2, "plr_2"), (3, "plr_3")]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::MatchNotFinished));
    assert_eq!(err.to_string(), "Match not finished yet");
    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert_eq!(detail.tournament.prize_locked, 3000);
    assert!(detail.winners.is_empty());
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (7000, 3000));
}

#[tokio::test]
async fn test_declare_guard_order() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2"]).await;

    // Wrong organizer beats the time check
    let err = h
        .manager
        .declare_result("trn_a", explicit("org_other", &[(1, "plr_1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Two participants are not enough once the match is over
    finish_match(&h, "trn_a").await;
    let err = h
        .manager
        .declare_result("trn_a", explicit("org_a", &[(1, "plr_1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_declare_twice_is_rejected() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3"]).await;
    finish_match(&h, "trn_a").await;

    let winners = [(1, "plr_1"), (2, "plr_2"), (3, "plr_3")];
    h.manager
        .declare_result("trn_a", explicit("org_a", &winners))
        .await
        .unwrap();
    let err = h
        .manager
        .declare_result("trn_a", explicit("org_a", &winners))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ResultsAlreadyDeclared));
    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert_eq!(detail.winners.len(), 3);
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 1800);
}

#[tokio::test]
async fn test_declare_over_budget_is_rejected() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3"]).await;
    finish_match(&h, "trn_a").await;

    let mut declaration = explicit("org_a", &[(1, "plr_1")]);
    declaration.winners = Some(vec![serde_json::from_value(serde_json::json!({
        "position": 1,
        "playerId": "plr_1",
        "prize": 3001,
    }))
    .unwrap()]);

    let err = h.manager.declare_result("trn_a", declaration).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientEscrow { required: 3001, available: 3000 }));
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 0);
}

#[tokio::test]
async fn test_declare_with_overflowing_prizes_is_rejected() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3"]).await;
    finish_match(&h, "trn_a").await;

    let mut declaration = explicit("org_a", &[]);
    declaration.winners = Some(
        [(1, "plr_1", i64::MAX), (2, "plr_2", 10)]
            .iter()
            .map(|(position, player, prize)| {
                serde_json::from_value(serde_json::json!({
                    "position": position,
                    "playerId": player,
                    "prize": prize,
                }))
                .unwrap()
            })
            .collect(),
    );

    let err = h.manager.declare_result("trn_a", declaration).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientEscrow { .. }));

    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert!(detail.winners.is_empty());
    assert_eq!(detail.tournament.prize_locked, 3000);
    assert_eq!(balances(&h, UserType::Player, "plr_2").await.0, 0);
}

#[tokio::test]
async fn test_zero_prize_winner_gets_no_ledger_entry() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3"]).await;
    finish_match(&h, "trn_a").await;

    let mut declaration = explicit("org_a", &[(1, "plr_1"), (2, "plr_2")]);
    if let Some(winners) = declaration.winners.as_mut() {
        winners.push(
            serde_json::from_value(serde_json::json!({
                "position": 3,
                "playerId": "plr_3",
                "prize": 0,
            }))
            .unwrap(),
        );
    }

    let detail = h.manager.declare_result("trn_a", declaration).await.unwrap();

    assert_eq!(detail.winners.len(), 3);
    let third = detail.winners.iter().find(|w| w.position == 3).unwrap();
    assert_eq!(third.player_id, "plr_3");
    assert_eq!(third.prize, 0);

    assert!(ledger(&h, UserType::Player, "plr_3")
        .await
        .iter()
        .all(|t| t.transaction_type != "prize-credit"));
    assert_eq!(balances(&h, UserType::Player, "plr_3").await.0, 0);

    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 1800);
    assert_eq!(balances(&h, UserType::Player, "plr_2").await.0, 900);
    for player in ["plr_1", "plr_2"] {
        let credits = ledger(&h, UserType::Player, player)
            .await
            .into_iter()
            .filter(|t| t.transaction_type == "prize-credit")
            .count();
        assert_eq!(credits, 1);
    }

    // Only the paid amount leaves escrow
    assert_eq!(detail.tournament.prize_locked, 300);
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (7000, 300));
}

#[tokio::test]
async fn test_random_declaration_picks_distinct_participants() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3", "plr_4", "plr_5"]).await;
    finish_match(&h, "trn_a").await;

    let detail = h
        .manager
        .declare_result(
            "trn_a",
            ResultDeclaration {
                organizer_id: "org_a".to_string(),
                mode: Some(WinnerSelectionMode::Random),
                winners: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(detail.winners.len(), 3);
    let mut ids: Vec<_> = detail.winners.iter().map(|w| w.player_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(
        detail.winners.iter().map(|w| w.prize).collect::<Vec<_>>(),
        vec![1800, 900, 300]
    );
}

#[tokio::test]
async fn test_release_returns_remainder_once() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3"]).await;
    finish_match(&h, "trn_a").await;

    let release = || PrizeRelease {
        organizer_id: "org_a".to_string(),
        note: Some("leftover".to_string()),
    };

    // Not completed yet
    assert!(matches!(
        h.manager.release_prize("trn_a", release()).await,
        Err(AppError::Conflict(_))
    ));

    // Only first place is paid; 1200 stays in escrow
    h.manager
        .declare_result("trn_a", explicit("org_a", &[(1, "plr_1")]))
        .await
        .unwrap();
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (7000, 1200));

    let detail = h.manager.release_prize("trn_a", release()).await.unwrap();
    assert_eq!(detail.tournament.prize_locked, 0);
    assert_eq!(detail.tournament.prize_release_note, "leftover");
    assert!(detail.tournament.prize_released_at.is_some());
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await, (8200, 0));

    let released = ledger(&h, UserType::Organizer, "org_a").await;
    assert_eq!(released[0].transaction_type, "release");
    assert_eq!(released[0].amount, 1200);
    assert_eq!(released[0].reference, "prize_release_trn_a");

    assert!(matches!(
        h.manager.release_prize("trn_a", release()).await,
        Err(AppError::AlreadyReleased)
    ));
}

#[tokio::test]
async fn test_release_with_nothing_locked() {
    let h = setup().await;
    tournament_with_players(&h, &["plr_1", "plr_2", "plr_3"]).await;
    finish_match(&h, "trn_a").await;
    h.manager
        .declare_result(
            "trn_a",
            explicit("org_a", &[(1, "plr_1"), (2, "plr_2"), (3, "plr_3")]),
        )
        .await
        .unwrap();

    let err = h
        .manager
        .release_prize(
            "trn_a",
            PrizeRelease {
                organizer_id: "org_a".to_string(),
                note: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NothingLocked));
}

// ============================================================================
// Conservation and concurrency
// ============================================================================

#[tokio::test]
async fn test_money_is_conserved_across_the_lifecycle() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    for player in ["plr_1", "plr_2", "plr_3", "plr_4"] {
        add_player(&h, player, 1000).await;
    }
    let start = total_money(&h).await;

    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 250))
        .await
        .unwrap();
    assert_eq!(total_money(&h).await, start);

    for player in ["plr_1", "plr_2", "plr_3", "plr_4"] {
        h.manager
            .register_player("trn_a", registration(player))
            .await
            .unwrap();
        assert_eq!(total_money(&h).await, start);
    }

    finish_match(&h, "trn_a").await;
    h.manager
        .declare_result("trn_a", explicit("org_a", &[(1, "plr_3"), (2, "plr_4")]))
        .await
        .unwrap();
    assert_eq!(total_money(&h).await, start);

    h.manager
        .release_prize(
            "trn_a",
            PrizeRelease {
                organizer_id: "org_a".to_string(),
                note: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(total_money(&h).await, start);

    h.wallet
        .withdraw(UserType::Player, "plr_3", 500)
        .await
        .unwrap();
    assert_eq!(total_money(&h).await, start - 500);
}

#[tokio::test]
async fn test_withdraw_never_overdraws() {
    let h = setup().await;
    add_player(&h, "plr_1", 100).await;

    let err = h
        .wallet
        .withdraw(UserType::Player, "plr_1", 101)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { required: 101, available: 100 }));

    let err = h.wallet.deposit(UserType::Player, "plr_1", 0).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 100);
    assert_eq!(ledger(&h, UserType::Player, "plr_1").await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_registrations_for_last_slot() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    let mut config = tournament_config("trn_a", "org_a", 3000, 100);
    config.max_teams = 2;
    h.manager.create_tournament(config).await.unwrap();

    for player in ["plr_1", "plr_2", "plr_3"] {
        add_player(&h, player, 500).await;
    }
    h.manager
        .register_player("trn_a", registration("plr_1"))
        .await
        .unwrap();

    let (second, third) = tokio::join!(
        h.manager.register_player("trn_a", registration("plr_2")),
        h.manager.register_player("trn_a", registration("plr_3")),
    );

    let outcomes = [second.is_ok(), third.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if second.is_ok() { third } else { second };
    assert!(matches!(loser, Err(AppError::TournamentFull)));

    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert_eq!(detail.participants.len(), 2);
    assert_eq!(detail.tournament.current_participants, 2);
    assert_eq!(detail.tournament.entry_fee_collected, 200);
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await.0, 7200);

    let (paid,): (i64,) = sqlx::query_as("SELECT SUM(wallet_balance) FROM players")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(paid, 1500 - 200);
}

#[tokio::test]
async fn test_concurrent_fees_against_low_balance() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 300).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 200))
        .await
        .unwrap();
    h.manager
        .create_tournament(tournament_config("trn_b", "org_a", 3000, 200))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.manager.register_player("trn_a", registration("plr_1")),
        h.manager.register_player("trn_b", registration("plr_1")),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(AppError::InsufficientFunds { .. })));

    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 100);
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await.0, 4200);
    let deducts = ledger(&h, UserType::Player, "plr_1")
        .await
        .into_iter()
        .filter(|t| t.transaction_type == "deduct")
        .count();
    assert_eq!(deducts, 1);
}

#[tokio::test]
async fn test_concurrent_duplicate_registration_keeps_one_charge() {
    let h = setup().await;
    add_organizer(&h, "org_a", 10_000).await;
    add_player(&h, "plr_1", 500).await;
    h.manager
        .create_tournament(tournament_config("trn_a", "org_a", 3000, 200))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.manager.register_player("trn_a", registration("plr_1")),
        h.manager.register_player("trn_a", registration("plr_1")),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(AppError::AlreadyRegistered)));

    let detail = h.manager.get_tournament("trn_a").await.unwrap();
    assert_eq!(detail.participants.len(), 1);
    assert_eq!(detail.tournament.entry_fee_collected, 200);
    assert_eq!(balances(&h, UserType::Player, "plr_1").await.0, 300);
    assert_eq!(balances(&h, UserType::Organizer, "org_a").await.0, 7200);

    // The losing attempt's rollback leaves the winner's entries in place
    let deducts: Vec<_> = ledger(&h, UserType::Player, "plr_1")
        .await
        .into_iter()
        .filter(|t| t.transaction_type == "deduct")
        .collect();
    assert_eq!(deducts.len(), 1);
    assert_eq!(deducts[0].reference, "entry_fee_trn_a");

    let credits = ledger(&h, UserType::Organizer, "org_a")
        .await
        .into_iter()
        .filter(|t| t.transaction_type == "fee-credit")
        .count();
    assert_eq!(credits, 1);
}
