use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use std::fmt;
use uuid::Uuid;

/// Generates an application-level id such as `txn_3f2a...`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// RFC 3339 with fixed microsecond precision so stored values sort lexically.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

// ============================================================================
// Wallet owners
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Player,
    Organizer,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Player => "player",
            UserType::Organizer => "organizer",
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            UserType::Player => "players",
            UserType::Organizer => "organizers",
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player" => Ok(UserType::Player),
            "organizer" => Ok(UserType::Organizer),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Organizer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub organization_name: String,
    pub status: String,
    pub wallet_balance: i64,
    pub locked_prize_pool: i64,
    pub tournaments_organized: i64,
    pub total_prize_pools: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Organizer {
    pub fn new(
        id: Option<String>,
        name: String,
        email: String,
        phone: String,
        organization_name: String,
    ) -> Self {
        let now = now_timestamp();
        Self {
            id: id.unwrap_or_else(|| generate_id("org")),
            name,
            email,
            phone,
            organization_name,
            status: "approved".to_string(),
            wallet_balance: 0,
            locked_prize_pool: 0,
            tournaments_organized: 0,
            total_prize_pools: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub status: String,
    pub wallet_balance: i64,
    pub tournaments_participated: i64,
    pub tournaments_won: i64,
    pub total_earnings: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Player {
    pub fn new(
        id: Option<String>,
        first_name: String,
        last_name: String,
        email: String,
        phone: String,
        country: String,
    ) -> Self {
        let now = now_timestamp();
        Self {
            id: id.unwrap_or_else(|| generate_id("plr")),
            first_name,
            last_name,
            email,
            phone,
            country,
            status: "active".to_string(),
            wallet_balance: 0,
            tournaments_participated: 0,
            tournaments_won: 0,
            total_earnings: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Deduct,
    Lock,
    Release,
    FeeCredit,
    PrizeCredit,
    PrizeDistribute,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
            TransactionType::Deduct => "deduct",
            TransactionType::Lock => "lock",
            TransactionType::Release => "release",
            TransactionType::FeeCredit => "fee-credit",
            TransactionType::PrizeCredit => "prize-credit",
            TransactionType::PrizeDistribute => "prize-distribute",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            "deduct" => Ok(TransactionType::Deduct),
            "lock" => Ok(TransactionType::Lock),
            "release" => Ok(TransactionType::Release),
            "fee-credit" => Ok(TransactionType::FeeCredit),
            "prize-credit" => Ok(TransactionType::PrizeCredit),
            "prize-distribute" => Ok(TransactionType::PrizeDistribute),
            _ => Err(()),
        }
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub user_type: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub amount: i64,
    pub currency: String,
    pub reference: String,
    pub meta: Json<serde_json::Value>,
    pub created_at: String,
}

impl Transaction {
    pub fn new(
        user_type: UserType,
        user_id: &str,
        transaction_type: TransactionType,
        amount: i64,
        reference: String,
        meta: serde_json::Value,
    ) -> Self {
        Self {
            id: generate_id("txn"),
            user_id: user_id.to_string(),
            user_type: user_type.as_str().to_string(),
            transaction_type: transaction_type.as_str().to_string(),
            amount,
            currency: "INR".to_string(),
            reference,
            meta: Json(meta),
            created_at: now_timestamp(),
        }
    }
}

// ============================================================================
// Tournament Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TournamentStatus {
    Upcoming,
    RegistrationOpen,
    RegistrationClosed,
    Ongoing,
    Completed,
    Cancelled,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Upcoming => "upcoming",
            TournamentStatus::RegistrationOpen => "registration-open",
            TournamentStatus::RegistrationClosed => "registration-closed",
            TournamentStatus::Ongoing => "ongoing",
            TournamentStatus::Completed => "completed",
            TournamentStatus::Cancelled => "cancelled",
        }
    }

    /// Position along the forward path; terminal states have none.
    fn rank(&self) -> Option<u8> {
        match self {
            TournamentStatus::Upcoming => Some(0),
            TournamentStatus::RegistrationOpen => Some(1),
            TournamentStatus::RegistrationClosed => Some(2),
            TournamentStatus::Ongoing => Some(3),
            TournamentStatus::Completed | TournamentStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank().is_none()
    }

    /// Organizer-driven moves: forward only, never into a terminal state.
    /// `completed` is reached through result declaration alone.
    pub fn can_advance_to(&self, next: TournamentStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(current), Some(target)) => target > current,
            _ => false,
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TournamentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(TournamentStatus::Upcoming),
            "registration-open" => Ok(TournamentStatus::RegistrationOpen),
            "registration-closed" => Ok(TournamentStatus::RegistrationClosed),
            "ongoing" => Ok(TournamentStatus::Ongoing),
            "completed" => Ok(TournamentStatus::Completed),
            "cancelled" => Ok(TournamentStatus::Cancelled),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: String,
    pub tournament_name: String,
    pub organizer_id: String,
    pub organizer_name: String,
    pub game: String,
    pub mode: String,
    pub format: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub registration_deadline: String,
    pub max_teams: i64,
    pub current_participants: i64,
    pub prize_pool: i64,
    pub prize_distribution: String,
    pub has_entry_fee: bool,
    pub entry_fee: i64,
    pub region: String,
    pub rules: String,
    pub description: String,
    pub stream_url: String,
    pub discord_url: String,
    pub status: String,
    pub entry_fee_collected: i64,
    pub prize_locked: i64,
    pub result_declared_at: Option<String>,
    pub prize_released_at: Option<String>,
    pub prize_release_note: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Tournament {
    /// Stored status; unknown values are treated as `upcoming`, which no guard accepts
    /// for registration.
    pub fn status(&self) -> TournamentStatus {
        self.status.parse().unwrap_or(TournamentStatus::Upcoming)
    }

    /// Fee charged at registration, or zero when the tournament is free.
    pub fn registration_fee(&self) -> i64 {
        if self.has_entry_fee && self.entry_fee > 0 {
            self.entry_fee
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(skip)]
    pub tournament_id: String,
    pub player_id: String,
    pub player_name: String,
    pub team_name: String,
    pub registered_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    #[serde(skip)]
    pub tournament_id: String,
    pub position: i64,
    pub player_id: String,
    pub player_name: String,
    pub team_name: String,
    pub prize: i64,
}

/// Tournament with its embedded participant and winner lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentDetail {
    #[serde(flatten)]
    pub tournament: Tournament,
    pub participants: Vec<Participant>,
    pub winners: Vec<Winner>,
}
