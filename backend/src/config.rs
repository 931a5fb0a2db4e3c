use std::env;
use std::str::FromStr;

use crate::tournament::prizes::{PrizeDistribution, WinnerSelectionMode};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub ledger: LedgerConfig,
}

/// Rules for escrow, registration and result declaration.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub min_prize_pool: i64,
    pub default_distribution: PrizeDistribution,
    pub default_winner_selection: WinnerSelectionMode,
    /// Hours after `start_date` a match counts as finished when `end_date` is unset.
    pub result_grace_hours: i64,
    pub min_participants_for_result: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_prize_pool: 1000,
            default_distribution: PrizeDistribution::default(),
            default_winner_selection: WinnerSelectionMode::Random,
            result_grace_hours: 2,
            min_participants_for_result: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:tourney.db".to_string()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parse_or("SERVER_PORT", 3000),
            cors_allowed_origins,
            ledger: LedgerConfig::from_env(),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            min_prize_pool: parse_or("MIN_PRIZE_POOL", defaults.min_prize_pool),
            default_distribution: parse_or(
                "DEFAULT_PRIZE_DISTRIBUTION",
                defaults.default_distribution,
            ),
            default_winner_selection: parse_or(
                "WINNER_SELECTION",
                defaults.default_winner_selection,
            ),
            result_grace_hours: parse_or("RESULT_GRACE_HOURS", defaults.result_grace_hours),
            min_participants_for_result: parse_or(
                "MIN_PARTICIPANTS_FOR_RESULT",
                defaults.min_participants_for_result,
            ),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring invalid {}={:?}; using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
