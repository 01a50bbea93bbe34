use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use super::domain::{CheckinRecord, Currency, LedgerEntry, LedgerSource, Member, MemberId};
use super::failure::FailureKind;
use super::ledger::{ensure_approved, LedgerError, LedgerService};
use super::repository::{Posting, RewardStore, StoreError};

pub const CYCLE_LENGTH: u32 = 7;
pub const DEFAULT_DAILY_COINS: i64 = 5;
pub const DEFAULT_BONUS_COINS: i64 = 50;

/// Coin reward per day of the seven-day cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckinSchedule {
    rewards: BTreeMap<u8, i64>,
}

impl CheckinSchedule {
    /// Keeps only positive rewards for days 1..=7; anything else falls back to defaults.
    pub fn new(rewards: BTreeMap<u8, i64>) -> Self {
        let rewards = rewards
            .into_iter()
            .filter(|(day, coins)| (1..=CYCLE_LENGTH as u8).contains(day) && *coins > 0)
            .collect();
        Self { rewards }
    }

    pub fn day_number(streak: u32) -> u8 {
        ((streak.max(1) - 1) % CYCLE_LENGTH + 1) as u8
    }

    pub fn reward_for_day(&self, day: u8) -> i64 {
        match self.rewards.get(&day) {
            Some(coins) => *coins,
            None if u32::from(day) == CYCLE_LENGTH => DEFAULT_BONUS_COINS,
            None => DEFAULT_DAILY_COINS,
        }
    }

    pub fn reward_for_streak(&self, streak: u32) -> i64 {
        self.reward_for_day(Self::day_number(streak))
    }
}

/// Result of a successful daily check-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckinOutcome {
    pub record: CheckinRecord,
    pub day_number: u8,
    pub entry: LedgerEntry,
    pub member: Member,
}

/// Streak read model for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakStatus {
    /// Latest stored streak, even when today's check-in is still outstanding.
    pub displayed_streak: u32,
    pub checked_in_today: bool,
    pub next_streak: u32,
    pub next_day_number: u8,
    pub next_reward: i64,
}

/// Daily check-in state machine: at most one transition per member per calendar date.
pub struct CheckinEngine<S> {
    ledger: Arc<LedgerService<S>>,
}

impl<S> CheckinEngine<S>
where
    S: RewardStore,
{
    pub fn new(ledger: Arc<LedgerService<S>>) -> Self {
        Self { ledger }
    }

    pub fn check_in(
        &self,
        member_id: &MemberId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CheckinOutcome, CheckinError> {
        let store = self.ledger.store();
        let schedule = CheckinSchedule::new(store.checkin_rewards().map_err(LedgerError::from)?);

        let receipt = self
            .ledger
            .transact(member_id, now, |member, unit| -> Result<_, CheckinError> {
                ensure_approved(member)?;
                if store
                    .checkin_on(&member.id, today)
                    .map_err(LedgerError::from)?
                    .is_some()
                {
                    return Err(CheckinError::AlreadyCheckedIn(today));
                }

                let streak_count = self.streak_after(&member.id, today)?;
                let coins_earned = schedule.reward_for_streak(streak_count);
                let record = CheckinRecord {
                    member_id: member.id.clone(),
                    date: today,
                    streak_count,
                    coins_earned,
                };

                let day = CheckinSchedule::day_number(streak_count);
                let posting =
                    Posting::earn(Currency::Coins, coins_earned, LedgerSource::DailyCheckin)
                        .describe(Some(format!("Daily check-in day {day}")))
                        .referencing(today.to_string());
                Ok(unit.record_checkin(record).post(posting))
            })?;

        let missing = || CheckinError::Ledger(LedgerError::Store(StoreError::NotFound));
        let record = receipt.checkin.clone().ok_or_else(missing)?;
        let entry = receipt
            .entry_for(Currency::Coins)
            .cloned()
            .ok_or_else(missing)?;
        let day_number = CheckinSchedule::day_number(record.streak_count);

        info!(
            member = %member_id,
            date = %today,
            streak = record.streak_count,
            day_number,
            coins = record.coins_earned,
            "daily check-in recorded"
        );

        Ok(CheckinOutcome {
            record,
            day_number,
            entry,
            member: receipt.member,
        })
    }

    pub fn status(
        &self,
        member_id: &MemberId,
        today: NaiveDate,
    ) -> Result<StreakStatus, CheckinError> {
        let store = self.ledger.store();
        let schedule = CheckinSchedule::new(store.checkin_rewards().map_err(LedgerError::from)?);
        let latest = store.latest_checkin(member_id).map_err(LedgerError::from)?;
        let checked_in_today = latest
            .as_ref()
            .map(|record| record.date == today)
            .unwrap_or(false);

        let displayed_streak = latest
            .as_ref()
            .map(|record| record.streak_count)
            .unwrap_or(0);
        let next_streak = if checked_in_today {
            match today.succ_opt() {
                Some(tomorrow) => self.streak_after(member_id, tomorrow)?,
                None => displayed_streak,
            }
        } else {
            self.streak_after(member_id, today)?
        };

        Ok(StreakStatus {
            displayed_streak,
            checked_in_today,
            next_streak,
            next_day_number: CheckinSchedule::day_number(next_streak),
            next_reward: schedule.reward_for_streak(next_streak),
        })
    }

    /// Streak a check-in on `date` would produce: yesterday's streak plus one, else 1.
    fn streak_after(&self, member_id: &MemberId, date: NaiveDate) -> Result<u32, CheckinError> {
        let Some(yesterday) = date.pred_opt() else {
            return Ok(1);
        };
        let previous = self
            .ledger
            .store()
            .checkin_on(member_id, yesterday)
            .map_err(LedgerError::from)?;
        Ok(previous
            .map(|record| record.streak_count.saturating_add(1))
            .unwrap_or(1))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckinError {
    #[error("already checked in on {0}")]
    AlreadyCheckedIn(NaiveDate),
    #[error(transparent)]
    Ledger(LedgerError),
}

impl CheckinError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CheckinError::AlreadyCheckedIn(_) => FailureKind::AlreadyCheckedIn,
            CheckinError::Ledger(err) => err.kind(),
        }
    }
}

impl From<LedgerError> for CheckinError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Store(StoreError::DuplicateCheckin(date)) => {
                CheckinError::AlreadyCheckedIn(date)
            }
            other => CheckinError::Ledger(other),
        }
    }
}
