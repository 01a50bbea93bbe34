use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::domain::{Currency, LedgerEntry, LedgerSource, Member, MemberId, TransactionKind};
use super::failure::FailureKind;
use super::repository::{CommitReceipt, Posting, RewardStore, StoreError, UnitOfWork};
use super::tiers::TierTable;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Points/coins ledger over a [`RewardStore`].
///
/// Every mutation goes through [`LedgerService::transact`], which rebuilds the
/// unit from a fresh member snapshot whenever another writer got there first.
pub struct LedgerService<S> {
    store: Arc<S>,
    max_attempts: u32,
}

impl<S> LedgerService<S>
where
    S: RewardStore,
{
    pub fn new(store: Arc<S>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn credit(
        &self,
        member_id: &MemberId,
        currency: Currency,
        amount: i64,
        source: LedgerSource,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        ensure_positive(amount)?;
        let receipt = self.transact(member_id, now, |_, unit| {
            Ok::<_, LedgerError>(
                unit.post(Posting::earn(currency, amount, source).describe(description.clone())),
            )
        })?;
        single_entry(receipt, currency)
    }

    pub fn debit(
        &self,
        member_id: &MemberId,
        currency: Currency,
        amount: i64,
        source: LedgerSource,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.withdraw(
            member_id,
            currency,
            amount,
            source,
            TransactionKind::Redeem,
            description,
            now,
        )
    }

    /// Removes balance that lapsed; recorded with kind `expire`.
    pub fn expire(
        &self,
        member_id: &MemberId,
        currency: Currency,
        amount: i64,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.withdraw(
            member_id,
            currency,
            amount,
            LedgerSource::Expiration,
            TransactionKind::Expire,
            description,
            now,
        )
    }

    /// Signed administrative correction.
    pub fn adjust(
        &self,
        member_id: &MemberId,
        currency: Currency,
        amount: i64,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let requested = amount.checked_neg().ok_or(LedgerError::InvalidAmount(amount))?;
        let receipt = self.transact(member_id, now, |member, unit| -> Result<_, LedgerError> {
            let available = member.balance(currency);
            if amount < 0 && requested > available {
                return Err(LedgerError::InsufficientBalance {
                    currency,
                    requested,
                    available,
                });
            }
            let posting = Posting {
                currency,
                amount,
                kind: TransactionKind::Adjust,
                source: LedgerSource::AdminAdjustment,
                description: description.clone(),
                reference: None,
            };
            Ok(unit.post(posting))
        })?;
        single_entry(receipt, currency)
    }

    /// Ledger rows for one currency, newest first.
    pub fn history(
        &self,
        member_id: &MemberId,
        currency: Currency,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries = self.store.ledger_entries(member_id, currency)?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    /// Runs `build` against a fresh member snapshot and commits the resulting unit.
    ///
    /// Version conflicts re-run `build` from scratch; any other failure aborts with
    /// nothing applied. The member's tier is re-derived whenever points change.
    pub fn transact<F, E>(
        &self,
        member_id: &MemberId,
        now: DateTime<Utc>,
        mut build: F,
    ) -> Result<CommitReceipt, E>
    where
        F: FnMut(&Member, UnitOfWork) -> Result<UnitOfWork, E>,
        E: From<LedgerError>,
    {
        for attempt in 1..=self.max_attempts {
            let member = self
                .store
                .fetch_member(member_id)
                .map_err(|err| LedgerError::from_store(err, attempt))?
                .ok_or_else(|| LedgerError::MemberNotFound(member_id.clone()))?;

            let unit = build(&member, UnitOfWork::for_member(&member, now))?;
            let unit = self.with_derived_tier(&member, unit, attempt)?;
            let postings = unit.postings.len();

            match self.store.commit(unit) {
                Ok(receipt) => {
                    debug!(
                        member = %member_id,
                        attempt,
                        postings,
                        points = receipt.member.total_points,
                        coins = receipt.member.total_coins,
                        "ledger unit committed"
                    );
                    if receipt.member.tier != member.tier {
                        info!(
                            member = %member_id,
                            from = member.tier.as_str(),
                            to = receipt.member.tier.as_str(),
                            "member tier changed"
                        );
                    }
                    return Ok(receipt);
                }
                Err(StoreError::VersionConflict { expected, found, .. }) => {
                    warn!(
                        member = %member_id,
                        attempt,
                        expected,
                        found,
                        "concurrent member update, retrying unit"
                    );
                }
                Err(err) => return Err(LedgerError::from_store(err, attempt).into()),
            }
        }

        Err(LedgerError::Transient {
            attempts: self.max_attempts,
            reason: "member kept changing concurrently".to_string(),
        }
        .into())
    }

    #[allow(clippy::too_many_arguments)]
    fn withdraw(
        &self,
        member_id: &MemberId,
        currency: Currency,
        amount: i64,
        source: LedgerSource,
        kind: TransactionKind,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        ensure_positive(amount)?;
        let receipt = self.transact(member_id, now, |member, unit| -> Result<_, LedgerError> {
            let available = member.balance(currency);
            if amount > available {
                return Err(LedgerError::InsufficientBalance {
                    currency,
                    requested: amount,
                    available,
                });
            }
            Ok(unit.post(
                Posting::spend(currency, amount, source)
                    .with_kind(kind)
                    .describe(description.clone()),
            ))
        })?;
        single_entry(receipt, currency)
    }

    /// Rejects units whose balances would overflow and stamps the re-derived tier.
    fn with_derived_tier(
        &self,
        member: &Member,
        mut unit: UnitOfWork,
        attempt: u32,
    ) -> Result<UnitOfWork, LedgerError> {
        let mut points = member.total_points;
        for currency in [Currency::Points, Currency::Coins] {
            let balance = member.balance(currency);
            let delta = unit.net(currency).ok_or(LedgerError::InvalidAmount(i64::MAX))?;
            let next = balance
                .checked_add(delta)
                .ok_or(LedgerError::InvalidAmount(delta))?;
            if currency == Currency::Points {
                points = next;
            }
        }
        if points != member.total_points {
            let table = TierTable::new(
                self.store
                    .tier_definitions()
                    .map_err(|err| LedgerError::from_store(err, attempt))?,
            );
            unit.tier = Some(table.tier_for(points));
        }
        Ok(unit)
    }
}

/// Gate for earn/spend units, checked against the versioned snapshot.
pub(crate) fn ensure_approved(member: &Member) -> Result<(), LedgerError> {
    if member.is_approved() {
        return Ok(());
    }
    Err(LedgerError::NotApproved {
        member_id: member.id.clone(),
        status: member.approval_status.label(),
    })
}

fn ensure_positive(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

fn single_entry(receipt: CommitReceipt, currency: Currency) -> Result<LedgerEntry, LedgerError> {
    receipt
        .entry_for(currency)
        .cloned()
        .ok_or_else(|| LedgerError::Store(StoreError::NotFound))
}

/// Failures raised by the ledger.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger amount {0} is out of range")]
    InvalidAmount(i64),
    #[error("member {0} not found")]
    MemberNotFound(MemberId),
    #[error("member {member_id} is {status} and cannot take part in rewards")]
    NotApproved {
        member_id: MemberId,
        status: &'static str,
    },
    #[error("insufficient {currency} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        currency: Currency,
        requested: i64,
        available: i64,
    },
    #[error("ledger update abandoned after {attempts} attempt(s): {reason}")]
    Transient { attempts: u32, reason: String },
    #[error(transparent)]
    Store(StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LedgerError::InvalidAmount(_) => FailureKind::Validation,
            LedgerError::MemberNotFound(_) => FailureKind::NotFound,
            LedgerError::NotApproved { .. } => FailureKind::Forbidden,
            LedgerError::InsufficientBalance { .. } => FailureKind::InsufficientBalance,
            LedgerError::Transient { .. } => FailureKind::Transient,
            LedgerError::Store(err) => err.kind(),
        }
    }

    pub(crate) fn from_store(err: StoreError, attempts: u32) -> Self {
        match err {
            StoreError::Unavailable(reason) => LedgerError::Transient { attempts, reason },
            StoreError::NegativeBalance {
                currency,
                balance,
                delta,
            } => LedgerError::InsufficientBalance {
                currency,
                requested: delta.saturating_neg(),
                available: balance,
            },
            StoreError::BalanceOverflow { balance, .. } => LedgerError::InvalidAmount(balance),
            other => LedgerError::Store(other),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        Self::from_store(err, 1)
    }
}
