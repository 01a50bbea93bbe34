use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    ApprovalStatus, CheckinRecord, Currency, ExchangeConfig, LedgerEntry, LedgerSource, Member,
    MemberId, Mission, MissionCompletion, MissionId, Tier, TierDefinition, TransactionKind,
};
use super::failure::FailureKind;

/// Signed balance change staged inside a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub currency: Currency,
    pub amount: i64,
    pub kind: TransactionKind,
    pub source: LedgerSource,
    pub description: Option<String>,
    pub reference: Option<String>,
}

impl Posting {
    pub fn earn(currency: Currency, amount: i64, source: LedgerSource) -> Self {
        Self {
            currency,
            amount,
            kind: TransactionKind::Earn,
            source,
            description: None,
            reference: None,
        }
    }

    pub fn spend(currency: Currency, amount: i64, source: LedgerSource) -> Self {
        Self {
            currency,
            amount: -amount,
            kind: TransactionKind::Redeem,
            source,
            description: None,
            reference: None,
        }
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn describe(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn referencing(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Mission completion write carried by a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionWrite {
    /// First interaction; fails if any completion already exists for the pair.
    Insert(MissionCompletion),
    /// Review of an existing pending completion.
    Resolve(MissionCompletion),
}

/// All writes for one member that must land together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOfWork {
    pub member_id: MemberId,
    pub expected_version: u64,
    pub recorded_at: DateTime<Utc>,
    pub postings: Vec<Posting>,
    pub tier: Option<Tier>,
    pub approval_status: Option<ApprovalStatus>,
    pub checkin: Option<CheckinRecord>,
    pub completion: Option<CompletionWrite>,
}

impl UnitOfWork {
    pub fn for_member(member: &Member, recorded_at: DateTime<Utc>) -> Self {
        Self {
            member_id: member.id.clone(),
            expected_version: member.version,
            recorded_at,
            postings: Vec::new(),
            tier: None,
            approval_status: None,
            checkin: None,
            completion: None,
        }
    }

    pub fn post(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }

    pub fn record_checkin(mut self, record: CheckinRecord) -> Self {
        self.checkin = Some(record);
        self
    }

    pub fn write_completion(mut self, write: CompletionWrite) -> Self {
        self.completion = Some(write);
        self
    }

    pub fn set_approval(mut self, status: ApprovalStatus) -> Self {
        self.approval_status = Some(status);
        self
    }

    /// Net change for `currency`, or `None` when the postings overflow `i64`.
    pub fn net(&self, currency: Currency) -> Option<i64> {
        self.postings
            .iter()
            .filter(|posting| posting.currency == currency)
            .try_fold(0i64, |total, posting| total.checked_add(posting.amount))
    }
}

/// Result of a committed unit: the member after the write plus every row it stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    pub member: Member,
    pub entries: Vec<LedgerEntry>,
    pub checkin: Option<CheckinRecord>,
    pub completion: Option<MissionCompletion>,
}

impl CommitReceipt {
    pub fn entry_for(&self, currency: Currency) -> Option<&LedgerEntry> {
        self.entries.iter().find(|entry| entry.currency == currency)
    }
}

/// Storage port for the rewards engines.
///
/// `commit` is the only path that mutates balances, check-ins, completions or
/// approval status. Implementations must apply a unit entirely or not at all
/// and must reject it when the member's version no longer matches.
pub trait RewardStore: Send + Sync {
    /// Allocates an id no stored member uses yet.
    fn next_member_id(&self) -> Result<MemberId, StoreError>;
    fn insert_member(&self, member: Member) -> Result<Member, StoreError>;
    fn fetch_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError>;
    fn ledger_entries(
        &self,
        id: &MemberId,
        currency: Currency,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    fn checkin_on(&self, id: &MemberId, date: NaiveDate)
        -> Result<Option<CheckinRecord>, StoreError>;
    fn latest_checkin(&self, id: &MemberId) -> Result<Option<CheckinRecord>, StoreError>;
    /// Configured coin reward per cycle day (1..=7); missing days use defaults.
    fn checkin_rewards(&self) -> Result<BTreeMap<u8, i64>, StoreError>;

    fn missions(&self) -> Result<Vec<Mission>, StoreError>;
    fn fetch_mission(&self, id: &MissionId) -> Result<Option<Mission>, StoreError>;
    fn upsert_mission(&self, mission: Mission) -> Result<Mission, StoreError>;
    fn completions_for(&self, id: &MemberId) -> Result<Vec<MissionCompletion>, StoreError>;
    fn completion(
        &self,
        member_id: &MemberId,
        mission_id: &MissionId,
    ) -> Result<Option<MissionCompletion>, StoreError>;

    fn tier_definitions(&self) -> Result<Vec<TierDefinition>, StoreError>;
    fn replace_tier_definitions(&self, tiers: Vec<TierDefinition>) -> Result<(), StoreError>;

    fn exchange_config(&self) -> Result<ExchangeConfig, StoreError>;
    /// Stores `config` when its version matches the current one, bumping the version.
    fn update_exchange_config(&self, config: ExchangeConfig)
        -> Result<ExchangeConfig, StoreError>;

    fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("member {member_id} changed concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        member_id: MemberId,
        expected: u64,
        found: u64,
    },
    #[error("configuration changed concurrently (expected version {expected}, found {found})")]
    StaleConfig { expected: u64, found: u64 },
    #[error("check-in already recorded for {0}")]
    DuplicateCheckin(NaiveDate),
    #[error("mission {0} already has a completion for this member")]
    DuplicateCompletion(MissionId),
    #[error("no pending completion for mission {0}")]
    MissingCompletion(MissionId),
    #[error("{currency} balance {balance} cannot absorb change of {delta}")]
    NegativeBalance {
        currency: Currency,
        balance: i64,
        delta: i64,
    },
    #[error("{currency} balance {balance} would overflow")]
    BalanceOverflow { currency: Currency, balance: i64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StoreError::NotFound => FailureKind::NotFound,
            StoreError::BalanceOverflow { .. } => FailureKind::Validation,
            StoreError::Conflict
            | StoreError::StaleConfig { .. }
            | StoreError::DuplicateCompletion(_)
            | StoreError::MissingCompletion(_) => FailureKind::Conflict,
            StoreError::DuplicateCheckin(_) => FailureKind::AlreadyCheckedIn,
            StoreError::NegativeBalance { .. } => FailureKind::InsufficientBalance,
            StoreError::VersionConflict { .. } | StoreError::Unavailable(_) => {
                FailureKind::Transient
            }
        }
    }
}
