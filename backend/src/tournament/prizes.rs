//! Prize Structure and Distribution
//!
//! Parses `"p1-p2-p3"` distribution strings, turns an escrowed budget into
//! per-position payouts and picks winners for result declaration.

use crate::{
    db::models::Participant,
    error::{AppError, Result},
};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, str::FromStr};

/// Relative shares per position (index 0 = 1st place).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeDistribution {
    shares: Vec<u32>,
}

impl Default for PrizeDistribution {
    fn default() -> Self {
        Self {
            shares: vec![60, 30, 10],
        }
    }
}

impl FromStr for PrizeDistribution {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            AppError::Validation(format!(
                "Invalid prize distribution '{}': expected positive shares like 60-30-10",
                s
            ))
        };

        let shares = s
            .split('-')
            .map(|part| part.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;

        if shares.is_empty() || shares.iter().all(|share| *share == 0) {
            return Err(invalid());
        }

        Ok(Self { shares })
    }
}

impl fmt::Display for PrizeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.shares.iter().map(|share| share.to_string()).collect();
        f.write_str(&parts.join("-"))
    }
}

impl PrizeDistribution {
    /// Number of paid positions.
    pub fn paid_positions(&self) -> usize {
        self.shares.len()
    }

    /// `floor(budget * share_i / sum(shares))` for every position.
    pub fn payouts(&self, budget: i64) -> Vec<i64> {
        let total: i128 = self.shares.iter().map(|share| i128::from(*share)).sum();
        let budget = i128::from(budget.max(0));

        self.shares
            .iter()
            .map(|share| (budget * i128::from(*share) / total) as i64)
            .collect()
    }

    /// Payout for a 1-based position, zero past the last paid position.
    pub fn prize_for_position(&self, position: i64, budget: i64) -> i64 {
        if position < 1 {
            return 0;
        }
        self.payouts(budget)
            .get((position - 1) as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// How winners are chosen when a request does not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinnerSelectionMode {
    Explicit,
    Random,
}

impl FromStr for WinnerSelectionMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "explicit" => Ok(WinnerSelectionMode::Explicit),
            "random" => Ok(WinnerSelectionMode::Random),
            _ => Err(()),
        }
    }
}

/// A winner named by the organizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplicitWinner {
    pub position: i64,
    pub player_id: String,
    /// Defaults to the distribution amount for `position`.
    pub prize: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum WinnerSelection {
    Explicit(Vec<ExplicitWinner>),
    /// Uniform sample of `count` distinct participants.
    Random { count: usize },
}

/// A winner with its resolved payout, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub position: i64,
    pub player_id: String,
    pub player_name: String,
    pub team_name: String,
    pub prize: i64,
}

/// Sum of all payouts; `None` when it does not fit in an `i64`.
pub fn total_prize(payouts: &[Payout]) -> Option<i64> {
    payouts
        .iter()
        .try_fold(0i64, |total, payout| total.checked_add(payout.prize))
}

/// Resolves explicit winners against the participant list and the distribution.
pub fn resolve_explicit_winners(
    winners: &[ExplicitWinner],
    participants: &[Participant],
    distribution: &PrizeDistribution,
    budget: i64,
) -> Result<Vec<Payout>> {
    if winners.is_empty() {
        return Err(AppError::Validation(
            "At least one winner is required".to_string(),
        ));
    }

    let mut positions = HashSet::new();
    let mut players = HashSet::new();
    let mut payouts = Vec::with_capacity(winners.len());

    for winner in winners {
        if winner.position < 1 {
            return Err(AppError::Validation(format!(
                "Invalid winner position {}",
                winner.position
            )));
        }
        if !positions.insert(winner.position) {
            return Err(AppError::Validation(format!(
                "Duplicate winner position {}",
                winner.position
            )));
        }
        if !players.insert(winner.player_id.as_str()) {
            return Err(AppError::Validation(format!(
                "Player {} is listed more than once",
                winner.player_id
            )));
        }

        let participant = participants
            .iter()
            .find(|p| p.player_id == winner.player_id)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Player {} is not registered for this tournament",
                    winner.player_id
                ))
            })?;

        let prize = winner
            .prize
            .unwrap_or_else(|| distribution.prize_for_position(winner.position, budget));
        if prize < 0 {
            return Err(AppError::Validation(
                "Winner prizes must be non-negative".to_string(),
            ));
        }
        if prize > budget {
            return Err(AppError::InsufficientEscrow {
                required: prize,
                available: budget,
            });
        }

        payouts.push(Payout {
            position: winner.position,
            player_id: participant.player_id.clone(),
            player_name: participant.player_name.clone(),
            team_name: participant.team_name.clone(),
            prize,
        });
    }

    payouts.sort_by_key(|payout| payout.position);
    Ok(payouts)
}

/// Draws `count` distinct participants and pays them in draw order.
pub fn select_random_winners<R: Rng + ?Sized>(
    participants: &[Participant],
    count: usize,
    distribution: &PrizeDistribution,
    budget: i64,
    rng: &mut R,
) -> Result<Vec<Payout>> {
    if participants.len() < count {
        return Err(AppError::Validation(format!(
            "Need at least {} participants to draw winners",
            count
        )));
    }

    let amounts = distribution.payouts(budget);

    Ok(participants
        .choose_multiple(rng, count)
        .enumerate()
        .map(|(index, participant)| Payout {
            position: index as i64 + 1,
            player_id: participant.player_id.clone(),
            player_name: participant.player_name.clone(),
            team_name: participant.team_name.clone(),
            prize: amounts.get(index).copied().unwrap_or(0),
        })
        .collect())
}
