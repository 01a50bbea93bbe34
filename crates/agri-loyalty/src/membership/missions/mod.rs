mod eligibility;
mod reward;

pub use eligibility::{eligible_missions, is_available, is_targeted};
pub use reward::{resolve_reward, ResolvedReward};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::domain::{
    CompletionStatus, Currency, LedgerSource, Member, MemberId, Mission, MissionCompletion,
    MissionId,
};
use super::failure::FailureKind;
use super::ledger::{ensure_approved, LedgerError, LedgerService};
use super::repository::{
    CommitReceipt, CompletionWrite, Posting, RewardStore, StoreError, UnitOfWork,
};

/// Mission as presented to one member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionBoardEntry {
    pub mission: Mission,
    pub reward: ResolvedReward,
    /// Any completion exists, whatever its status.
    pub engaged: bool,
    pub completion_status: Option<CompletionStatus>,
}

/// Completion written by a claim or review, with the member after commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimOutcome {
    pub completion: MissionCompletion,
    pub member: Member,
}

/// Filters missions per member and awards them through the ledger.
pub struct MissionEngine<S> {
    ledger: Arc<LedgerService<S>>,
}

impl<S> MissionEngine<S>
where
    S: RewardStore,
{
    pub fn new(ledger: Arc<LedgerService<S>>) -> Self {
        Self { ledger }
    }

    /// Available, targeted missions with the reward resolved for `member`.
    pub fn board(
        &self,
        member: &Member,
        now: DateTime<Utc>,
    ) -> Result<Vec<MissionBoardEntry>, MissionError> {
        let store = self.ledger.store();
        let missions = store.missions().map_err(LedgerError::from)?;
        let completions: HashMap<MissionId, CompletionStatus> = store
            .completions_for(&member.id)
            .map_err(LedgerError::from)?
            .into_iter()
            .map(|completion| (completion.mission_id, completion.status))
            .collect();

        Ok(eligible_missions(&missions, member, now)
            .map(|mission| {
                let completion_status = completions.get(&mission.id).copied();
                MissionBoardEntry {
                    mission: mission.clone(),
                    reward: resolve_reward(mission, member),
                    engaged: completion_status.is_some(),
                    completion_status,
                }
            })
            .collect())
    }

    /// Records the member's first interaction with a mission.
    ///
    /// Missions without review are approved and credited in the same unit as the
    /// completion row; reviewed missions stay pending with nothing credited.
    pub fn claim(
        &self,
        member_id: &MemberId,
        mission_id: &MissionId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MissionError> {
        let store = self.ledger.store();
        let mission = store
            .fetch_mission(mission_id)
            .map_err(LedgerError::from)?
            .ok_or_else(|| MissionError::MissionNotFound(mission_id.clone()))?;
        if !is_available(&mission, now) {
            return Err(MissionError::MissionUnavailable(mission_id.clone()));
        }

        let receipt = self
            .ledger
            .transact(member_id, now, |member, unit| -> Result<_, MissionError> {
                ensure_approved(member)?;
                if !is_targeted(&mission, member) {
                    return Err(MissionError::NotEligible(mission.id.clone()));
                }
                if store
                    .completion(&member.id, &mission.id)
                    .map_err(LedgerError::from)?
                    .is_some()
                {
                    return Err(MissionError::AlreadyEngaged(mission.id.clone()));
                }

                let completion = MissionCompletion {
                    member_id: member.id.clone(),
                    mission_id: mission.id.clone(),
                    status: CompletionStatus::Pending,
                    points_awarded: 0,
                    coins_awarded: 0,
                    submitted_at: now,
                    reviewed_at: None,
                };
                if mission.requires_review {
                    return Ok(unit.write_completion(CompletionWrite::Insert(completion)));
                }

                let (unit, completion) = award(unit, &mission, member, completion, now);
                Ok(unit.write_completion(CompletionWrite::Insert(completion)))
            })?;

        finish(receipt, member_id, mission_id)
    }

    /// Approves (and credits) or rejects a pending completion.
    pub fn review(
        &self,
        member_id: &MemberId,
        mission_id: &MissionId,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MissionError> {
        let store = self.ledger.store();
        let mission = store
            .fetch_mission(mission_id)
            .map_err(LedgerError::from)?
            .ok_or_else(|| MissionError::MissionNotFound(mission_id.clone()))?;

        let receipt = self
            .ledger
            .transact(member_id, now, |member, unit| -> Result<_, MissionError> {
                let pending = store
                    .completion(&member.id, &mission.id)
                    .map_err(LedgerError::from)?
                    .filter(|completion| completion.status == CompletionStatus::Pending)
                    .ok_or_else(|| MissionError::NotPending(mission.id.clone()))?;

                if !approve {
                    let rejected = MissionCompletion {
                        status: CompletionStatus::Rejected,
                        reviewed_at: Some(now),
                        ..pending
                    };
                    return Ok(unit.write_completion(CompletionWrite::Resolve(rejected)));
                }

                let (unit, approved) = award(unit, &mission, member, pending, now);
                Ok(unit.write_completion(CompletionWrite::Resolve(approved)))
            })?;

        finish(receipt, member_id, mission_id)
    }
}

/// Stages the mission reward onto `unit` and marks the completion approved.
fn award(
    mut unit: UnitOfWork,
    mission: &Mission,
    member: &Member,
    completion: MissionCompletion,
    now: DateTime<Utc>,
) -> (UnitOfWork, MissionCompletion) {
    let reward = resolve_reward(mission, member);
    for (currency, amount) in [
        (Currency::Points, reward.points),
        (Currency::Coins, reward.coins),
    ] {
        if amount > 0 {
            unit = unit.post(
                Posting::earn(currency, amount, LedgerSource::Mission)
                    .describe(Some(mission.title.clone()))
                    .referencing(mission.id.0.clone()),
            );
        }
    }

    let completion = MissionCompletion {
        status: CompletionStatus::Approved,
        points_awarded: reward.points.max(0),
        coins_awarded: reward.coins.max(0),
        reviewed_at: Some(now),
        ..completion
    };
    (unit, completion)
}

fn finish(
    receipt: CommitReceipt,
    member_id: &MemberId,
    mission_id: &MissionId,
) -> Result<ClaimOutcome, MissionError> {
    let completion = receipt
        .completion
        .ok_or(MissionError::Ledger(LedgerError::Store(StoreError::NotFound)))?;

    info!(
        member = %member_id,
        mission = %mission_id,
        status = ?completion.status,
        points = completion.points_awarded,
        coins = completion.coins_awarded,
        "mission completion recorded"
    );

    Ok(ClaimOutcome {
        completion,
        member: receipt.member,
    })
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MissionError {
    #[error("mission {0} not found")]
    MissionNotFound(MissionId),
    #[error("mission {0} is not currently running")]
    MissionUnavailable(MissionId),
    #[error("member is not eligible for mission {0}")]
    NotEligible(MissionId),
    #[error("mission {0} was already claimed")]
    AlreadyEngaged(MissionId),
    #[error("mission {0} has no pending completion to review")]
    NotPending(MissionId),
    #[error(transparent)]
    Ledger(LedgerError),
}

impl MissionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MissionError::MissionNotFound(_) => FailureKind::NotFound,
            MissionError::MissionUnavailable(_) | MissionError::NotEligible(_) => {
                FailureKind::Forbidden
            }
            MissionError::AlreadyEngaged(_) | MissionError::NotPending(_) => FailureKind::Conflict,
            MissionError::Ledger(err) => err.kind(),
        }
    }
}

impl From<LedgerError> for MissionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Store(StoreError::DuplicateCompletion(mission_id)) => {
                MissionError::AlreadyEngaged(mission_id)
            }
            LedgerError::Store(StoreError::MissingCompletion(mission_id)) => {
                MissionError::NotPending(mission_id)
            }
            other => MissionError::Ledger(other),
        }
    }
}
