use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::approval::{self, ApprovalDecision};
use super::checkin::{CheckinEngine, CheckinError, CheckinOutcome, StreakStatus};
use super::domain::{
    Actor, ApprovalStatus, Currency, ExchangeConfig, LedgerEntry, Member, MemberId, MemberType,
    Mission, MissionId, OccupationProfile, TierDefinition,
};
use super::exchange::{validate_config, ExchangeEngine, ExchangeError, ExchangeReceipt};
use super::failure::FailureKind;
use super::ledger::{LedgerError, LedgerService, DEFAULT_MAX_ATTEMPTS};
use super::missions::{ClaimOutcome, MissionBoardEntry, MissionEngine, MissionError};
use super::repository::{RewardStore, StoreError};
use super::tiers::{TierProgress, TierTable, TierTableError};

/// Program-level knobs the service needs at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSettings {
    pub ledger_max_attempts: u32,
    /// Offset applied to request instants before taking the calendar date.
    pub utc_offset_minutes: i32,
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            ledger_max_attempts: DEFAULT_MAX_ATTEMPTS,
            utc_offset_minutes: 0,
        }
    }
}

impl ProgramSettings {
    /// Calendar date of `now` in the program's local time.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => now.with_timezone(&offset).date_naive(),
            None => now.date_naive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub display_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub member_type: MemberType,
    #[serde(default)]
    pub occupation: OccupationProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationOutcome {
    pub member: Member,
    pub decision: ApprovalDecision,
}

/// Member home screen: balances, tier progress and streak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub member: Member,
    pub tier: TierProgress,
    pub streak: StreakStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub currency: Currency,
    /// Signed; negative amounts deduct.
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Facade composing the approval, ledger, check-in, tier, mission and exchange
/// engines over one [`RewardStore`].
pub struct MembershipService<S> {
    store: Arc<S>,
    ledger: Arc<LedgerService<S>>,
    checkins: CheckinEngine<S>,
    missions: MissionEngine<S>,
    exchange: ExchangeEngine<S>,
    settings: ProgramSettings,
}

impl<S> MembershipService<S>
where
    S: RewardStore + 'static,
{
    pub fn new(store: Arc<S>, settings: ProgramSettings) -> Self {
        let ledger = Arc::new(LedgerService::new(
            Arc::clone(&store),
            settings.ledger_max_attempts,
        ));
        Self {
            store,
            checkins: CheckinEngine::new(Arc::clone(&ledger)),
            missions: MissionEngine::new(Arc::clone(&ledger)),
            exchange: ExchangeEngine::new(Arc::clone(&ledger)),
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> ProgramSettings {
        self.settings
    }

    pub fn ledger(&self) -> &LedgerService<S> {
        &self.ledger
    }

    /// Creates a member whose initial approval status comes from the approval rules.
    pub fn register(
        &self,
        request: RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<RegistrationOutcome, MembershipError> {
        let display_name = request.display_name.trim();
        if display_name.is_empty() {
            return Err(MembershipError::Validation(
                "display_name must not be blank".to_string(),
            ));
        }

        let decision = approval::decide(request.member_type, &request.occupation);
        let tiers = TierTable::new(self.store.tier_definitions()?);
        let member = Member {
            id: self.store.next_member_id()?,
            display_name: display_name.to_string(),
            phone: request
                .phone
                .map(|phone| phone.trim().to_string())
                .filter(|phone| !phone.is_empty()),
            member_type: request.member_type,
            occupation: request.occupation,
            approval_status: decision.status,
            tier: tiers.tier_for(0),
            total_points: 0,
            total_coins: 0,
            version: 0,
            created_at: now,
        };
        let member = self.store.insert_member(member)?;

        info!(
            member = %member.id,
            member_type = member.member_type.as_str(),
            status = decision.status.label(),
            "member registered"
        );

        Ok(RegistrationOutcome { member, decision })
    }

    pub fn dashboard(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Dashboard, MembershipError> {
        let member = self.member(&actor.member_id)?;
        let tier = TierTable::new(self.store.tier_definitions()?).resolve(member.total_points);
        let streak = self
            .checkins
            .status(&member.id, self.settings.local_date(now))?;
        Ok(Dashboard {
            member,
            tier,
            streak,
        })
    }

    pub fn check_in(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<CheckinOutcome, MembershipError> {
        let member = self.approved_member(&actor.member_id)?;
        let today = self.settings.local_date(now);
        Ok(self.checkins.check_in(&member.id, today, now)?)
    }

    pub fn missions(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Vec<MissionBoardEntry>, MembershipError> {
        let member = self.approved_member(&actor.member_id)?;
        Ok(self.missions.board(&member, now)?)
    }

    pub fn claim_mission(
        &self,
        actor: &Actor,
        mission_id: &MissionId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MembershipError> {
        let member = self.approved_member(&actor.member_id)?;
        Ok(self.missions.claim(&member.id, mission_id, now)?)
    }

    /// Converts coins with the exchange configuration current at call time.
    pub fn exchange(
        &self,
        actor: &Actor,
        coins: i64,
        now: DateTime<Utc>,
    ) -> Result<ExchangeReceipt, MembershipError> {
        let member = self.approved_member(&actor.member_id)?;
        let config = self.store.exchange_config()?;
        Ok(self.exchange.exchange(&member.id, coins, &config, now)?)
    }

    pub fn exchange_config(&self) -> Result<ExchangeConfig, MembershipError> {
        Ok(self.store.exchange_config()?)
    }

    pub fn ledger_history(
        &self,
        actor: &Actor,
        currency: Currency,
    ) -> Result<Vec<LedgerEntry>, MembershipError> {
        let member = self.member(&actor.member_id)?;
        Ok(self.ledger.history(&member.id, currency)?)
    }

    pub fn admin_adjust(
        &self,
        actor: &Actor,
        member_id: &MemberId,
        request: AdjustmentRequest,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, MembershipError> {
        require_admin(actor)?;
        let entry = self.ledger.adjust(
            member_id,
            request.currency,
            request.amount,
            request.description,
            now,
        )?;
        info!(
            admin = %actor.member_id,
            member = %member_id,
            currency = request.currency.as_str(),
            amount = request.amount,
            "balance adjusted"
        );
        Ok(entry)
    }

    /// Removes lapsed balance, recorded as an expiration.
    pub fn admin_expire(
        &self,
        actor: &Actor,
        member_id: &MemberId,
        currency: Currency,
        amount: i64,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, MembershipError> {
        require_admin(actor)?;
        let entry = self
            .ledger
            .expire(member_id, currency, amount, description, now)?;
        info!(
            admin = %actor.member_id,
            member = %member_id,
            currency = currency.as_str(),
            amount,
            "balance expired"
        );
        Ok(entry)
    }

    /// Overrides the approval status decided at registration.
    pub fn admin_set_approval(
        &self,
        actor: &Actor,
        member_id: &MemberId,
        status: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> Result<Member, MembershipError> {
        require_admin(actor)?;
        let receipt = self
            .ledger
            .transact(member_id, now, |_, unit| -> Result<_, LedgerError> {
                Ok(unit.set_approval(status))
            })?;
        info!(
            admin = %actor.member_id,
            member = %member_id,
            status = status.label(),
            "approval status overridden"
        );
        Ok(receipt.member)
    }

    pub fn admin_publish_mission(
        &self,
        actor: &Actor,
        mission: Mission,
    ) -> Result<Mission, MembershipError> {
        require_admin(actor)?;
        validate_mission(&mission)?;
        let mission = self.store.upsert_mission(mission)?;
        info!(
            admin = %actor.member_id,
            mission = %mission.id,
            points = mission.points_reward,
            coins = mission.coins_reward,
            overrides = mission.reward_overrides.len(),
            "mission published"
        );
        Ok(mission)
    }

    pub fn admin_review_completion(
        &self,
        actor: &Actor,
        member_id: &MemberId,
        mission_id: &MissionId,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MembershipError> {
        require_admin(actor)?;
        Ok(self.missions.review(member_id, mission_id, approve, now)?)
    }

    /// Stores a new exchange configuration; `config.version` must match the current one.
    pub fn admin_update_exchange_config(
        &self,
        actor: &Actor,
        config: ExchangeConfig,
    ) -> Result<ExchangeConfig, MembershipError> {
        require_admin(actor)?;
        validate_config(&config)?;
        let stored = self.store.update_exchange_config(config)?;
        info!(
            admin = %actor.member_id,
            version = stored.version,
            rate = stored.coins_per_point,
            minimum = stored.minimum_coins,
            enabled = stored.enabled,
            "exchange configuration updated"
        );
        Ok(stored)
    }

    pub fn admin_replace_tiers(
        &self,
        actor: &Actor,
        definitions: Vec<TierDefinition>,
    ) -> Result<Vec<TierDefinition>, MembershipError> {
        require_admin(actor)?;
        let table = TierTable::validated(definitions)?;
        let definitions = table.into_definitions();
        self.store.replace_tier_definitions(definitions.clone())?;
        info!(
            admin = %actor.member_id,
            tiers = definitions.len(),
            "tier table replaced"
        );
        Ok(definitions)
    }

    fn member(&self, member_id: &MemberId) -> Result<Member, MembershipError> {
        self.store
            .fetch_member(member_id)?
            .ok_or_else(|| MembershipError::MemberNotFound(member_id.clone()))
    }

    fn approved_member(&self, member_id: &MemberId) -> Result<Member, MembershipError> {
        let member = self.member(member_id)?;
        if !member.is_approved() {
            return Err(MembershipError::NotApproved {
                member_id: member.id,
                status: member.approval_status.label(),
            });
        }
        Ok(member)
    }
}

fn require_admin(actor: &Actor) -> Result<(), MembershipError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(MembershipError::Forbidden)
    }
}

fn validate_mission(mission: &Mission) -> Result<(), MembershipError> {
    let invalid = |message: &str| Err(MembershipError::Validation(message.to_string()));
    if mission.id.0.trim().is_empty() {
        return invalid("mission id must not be blank");
    }
    if mission.title.trim().is_empty() {
        return invalid("mission title must not be blank");
    }
    if mission.points_reward < 0 || mission.coins_reward < 0 {
        return invalid("mission rewards must not be negative");
    }
    if mission
        .reward_overrides
        .iter()
        .any(|reward_override| reward_override.points < 0)
    {
        return invalid("override points must not be negative");
    }
    if let (Some(start), Some(end)) = (mission.starts_at, mission.ends_at) {
        if end < start {
            return invalid("mission ends before it starts");
        }
    }
    Ok(())
}

/// Error raised by the membership service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MembershipError {
    #[error("{0}")]
    Validation(String),
    #[error("member {0} not found")]
    MemberNotFound(MemberId),
    #[error("member {member_id} is {status} and cannot take part in rewards")]
    NotApproved {
        member_id: MemberId,
        status: &'static str,
    },
    #[error("administrator role required")]
    Forbidden,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Checkin(#[from] CheckinError),
    #[error(transparent)]
    Mission(#[from] MissionError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Tiers(#[from] TierTableError),
}

impl MembershipError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MembershipError::Validation(_) => FailureKind::Validation,
            MembershipError::MemberNotFound(_) => FailureKind::NotFound,
            MembershipError::NotApproved { .. } | MembershipError::Forbidden => {
                FailureKind::Forbidden
            }
            MembershipError::Store(err) => err.kind(),
            MembershipError::Ledger(err) => err.kind(),
            MembershipError::Checkin(err) => err.kind(),
            MembershipError::Mission(err) => err.kind(),
            MembershipError::Exchange(err) => err.kind(),
            MembershipError::Tiers(err) => err.kind(),
        }
    }
}
