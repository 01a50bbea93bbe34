use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::domain::{Currency, ExchangeConfig, LedgerSource, Member, MemberId};
use super::failure::FailureKind;
use super::ledger::{ensure_approved, LedgerError, LedgerService};
use super::repository::{Posting, RewardStore};

/// Outcome of a committed coins→points exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeReceipt {
    pub coins_spent: i64,
    pub points_received: i64,
    pub member: Member,
}

/// Rejects configurations the engine cannot apply.
pub fn validate_config(config: &ExchangeConfig) -> Result<(), ExchangeError> {
    if config.coins_per_point < 1 {
        return Err(ExchangeError::InvalidConfig(format!(
            "coins_per_point must be at least 1 (got {})",
            config.coins_per_point
        )));
    }
    if config.minimum_coins < 0 {
        return Err(ExchangeError::InvalidConfig(format!(
            "minimum_coins must not be negative (got {})",
            config.minimum_coins
        )));
    }
    Ok(())
}

/// Points `coins` would buy under `config`, with every precondition except the
/// member's balance checked. Remainders below the rate are not converted.
pub fn quote(coins: i64, config: &ExchangeConfig) -> Result<i64, ExchangeError> {
    if !config.enabled {
        return Err(ExchangeError::Disabled);
    }
    validate_config(config)?;
    if coins <= 0 {
        return Err(ExchangeError::InvalidAmount(coins));
    }
    if coins < config.minimum_coins {
        return Err(ExchangeError::BelowMinimum {
            minimum: config.minimum_coins,
            requested: coins,
        });
    }
    let points = coins / config.coins_per_point;
    if points == 0 {
        return Err(ExchangeError::BelowMinimum {
            minimum: config.coins_per_point,
            requested: coins,
        });
    }
    Ok(points)
}

pub struct ExchangeEngine<S> {
    ledger: Arc<LedgerService<S>>,
}

impl<S> ExchangeEngine<S>
where
    S: RewardStore,
{
    pub fn new(ledger: Arc<LedgerService<S>>) -> Self {
        Self { ledger }
    }

    /// Debits `coins` and credits the converted points in one unit of work.
    pub fn exchange(
        &self,
        member_id: &MemberId,
        coins: i64,
        config: &ExchangeConfig,
        now: DateTime<Utc>,
    ) -> Result<ExchangeReceipt, ExchangeError> {
        let points = quote(coins, config)?;
        let description = format!("Exchanged {coins} coins for {points} points");

        let receipt = self
            .ledger
            .transact(member_id, now, |member, unit| -> Result<_, ExchangeError> {
                ensure_approved(member)?;
                if coins > member.total_coins {
                    return Err(ExchangeError::InsufficientCoins {
                        requested: coins,
                        available: member.total_coins,
                    });
                }
                Ok(unit
                    .post(
                        Posting::spend(Currency::Coins, coins, LedgerSource::Exchange)
                            .describe(Some(description.clone())),
                    )
                    .post(
                        Posting::earn(Currency::Points, points, LedgerSource::Exchange)
                            .describe(Some(description.clone())),
                    ))
            })?;

        info!(
            member = %member_id,
            coins_spent = coins,
            points_received = points,
            rate = config.coins_per_point,
            "coins exchanged for points"
        );

        Ok(ExchangeReceipt {
            coins_spent: coins,
            points_received: points,
            member: receipt.member,
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeError {
    #[error("coin exchange is currently disabled")]
    Disabled,
    #[error("exchange amount must be positive (got {0})")]
    InvalidAmount(i64),
    #[error("at least {minimum} coins are required to exchange (requested {requested})")]
    BelowMinimum { minimum: i64, requested: i64 },
    #[error("insufficient coins: requested {requested}, available {available}")]
    InsufficientCoins { requested: i64, available: i64 },
    #[error("invalid exchange configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Ledger(LedgerError),
}

impl ExchangeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExchangeError::Disabled => FailureKind::Disabled,
            ExchangeError::InvalidAmount(_) | ExchangeError::InvalidConfig(_) => {
                FailureKind::Validation
            }
            ExchangeError::BelowMinimum { .. } => FailureKind::BelowMinimum,
            ExchangeError::InsufficientCoins { .. } => FailureKind::InsufficientCoins,
            ExchangeError::Ledger(err) => err.kind(),
        }
    }
}

impl From<LedgerError> for ExchangeError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                currency: Currency::Coins,
                requested,
                available,
            } => ExchangeError::InsufficientCoins {
                requested,
                available,
            },
            other => ExchangeError::Ledger(other),
        }
    }
}
