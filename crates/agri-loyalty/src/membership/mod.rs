//! Member progression: approval at registration, the points/coins ledger,
//! daily check-in streaks, tier progression, missions and the coins→points
//! exchange, composed by [`MembershipService`] and exposed over HTTP by
//! [`membership_router`].
//!
//! All balance mutations go through [`LedgerService::transact`], which commits
//! a [`UnitOfWork`] atomically against the [`RewardStore`].

pub mod approval;
pub mod checkin;
pub mod domain;
pub mod exchange;
pub mod failure;
pub mod import;
pub mod ledger;
pub mod missions;
pub mod repository;
pub mod router;
pub mod service;
pub mod store;
pub mod tiers;

#[cfg(test)]
mod tests;

pub use approval::{decide, ApprovalDecision};
pub use checkin::{CheckinEngine, CheckinError, CheckinOutcome, CheckinSchedule, StreakStatus};
pub use domain::{
    Actor, ApprovalStatus, BusinessType, CheckinRecord, CompletionStatus, Currency,
    ExchangeConfig, LedgerEntry, LedgerSource, Member, MemberId, MemberType, Mission,
    MissionCompletion, MissionId, MissionTargeting, OccupationProfile, OverrideRule,
    RewardOverride, Tier, TierDefinition, TransactionKind, UnknownVariant, VetType,
};
pub use exchange::{ExchangeEngine, ExchangeError, ExchangeReceipt};
pub use failure::FailureKind;
pub use import::{BulkRegistrationImporter, ImportError, ImportReport, RowFailure};
pub use ledger::{LedgerError, LedgerService, DEFAULT_MAX_ATTEMPTS};
pub use missions::{ClaimOutcome, MissionBoardEntry, MissionEngine, MissionError, ResolvedReward};
pub use repository::{CommitReceipt, Posting, RewardStore, StoreError, UnitOfWork};
pub use router::{actor_from_headers, membership_router};
pub use service::{
    AdjustmentRequest, Dashboard, MembershipError, MembershipService, ProgramSettings,
    RegistrationOutcome, RegistrationRequest,
};
pub use store::InMemoryRewardStore;
pub use tiers::{TierProgress, TierTable, TierTableError};
