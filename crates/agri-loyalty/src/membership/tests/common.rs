use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::membership::domain::{
    Actor, ApprovalStatus, CheckinRecord, Currency, ExchangeConfig, LedgerEntry, LedgerSource, Member, MemberId,
    MemberType, Mission, MissionCompletion, MissionId, MissionTargeting, OccupationProfile,
    TierDefinition,
};
use crate::membership::ledger::LedgerService;
use crate::membership::repository::{CommitReceipt, RewardStore, StoreError, UnitOfWork};
use crate::membership::service::{MembershipService, ProgramSettings, RegistrationRequest};
use crate::membership::store::InMemoryRewardStore;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn day(offset: i64) -> NaiveDate {
    now().date_naive() + Duration::days(offset)
}

pub(super) fn at_day(offset: i64) -> DateTime<Utc> {
    now() + Duration::days(offset)
}

pub(super) fn registration(name: &str, member_type: MemberType) -> RegistrationRequest {
    RegistrationRequest {
        display_name: name.to_string(),
        phone: Some("0812345678".to_string()),
        member_type,
        occupation: OccupationProfile::default(),
    }
}

pub(super) fn build_service() -> (
    MembershipService<InMemoryRewardStore>,
    Arc<InMemoryRewardStore>,
) {
    let store = Arc::new(InMemoryRewardStore::new());
    let service = MembershipService::new(store.clone(), ProgramSettings::default());
    (service, store)
}

pub(super) fn service_with_store<S>(store: Arc<S>) -> MembershipService<S>
where
    S: RewardStore + 'static,
{
    MembershipService::new(store, ProgramSettings::default())
}

/// Registers an auto-approved farm member and returns its actor.
pub(super) fn approved_farmer<S>(service: &MembershipService<S>, name: &str) -> (Actor, Member)
where
    S: RewardStore + 'static,
{
    let outcome = service
        .register(registration(name, MemberType::Farm), now())
        .expect("farm registration succeeds");
    assert!(outcome.decision.approved());
    (Actor::member(outcome.member.id.clone()), outcome.member)
}

pub(super) fn admin() -> Actor {
    Actor::admin(MemberId("admin-001".to_string()))
}

pub(super) fn ledger_over<S: RewardStore>(store: Arc<S>) -> LedgerService<S> {
    LedgerService::new(store, 3)
}

/// Credits `amount` of `currency` from a receipt so tests start with a balance.
pub(super) fn seed<S: RewardStore>(
    store: &Arc<S>,
    member_id: &MemberId,
    currency: Currency,
    amount: i64,
) -> LedgerEntry {
    ledger_over(Arc::clone(store))
        .credit(
            member_id,
            currency,
            amount,
            LedgerSource::Receipt,
            Some("seed balance".to_string()),
            now(),
        )
        .expect("seed credit")
}

pub(super) fn ledger_sum<S: RewardStore>(
    store: &S,
    member_id: &MemberId,
    currency: Currency,
) -> i64 {
    store
        .ledger_entries(member_id, currency)
        .expect("ledger readable")
        .iter()
        .map(|entry| entry.amount)
        .sum()
}

pub(super) fn assert_balances_match_ledger<S: RewardStore>(store: &S, member_id: &MemberId) {
    let member = store
        .fetch_member(member_id)
        .expect("fetch succeeds")
        .expect("member present");
    assert_eq!(
        member.total_points,
        ledger_sum(store, member_id, Currency::Points)
    );
    assert_eq!(
        member.total_coins,
        ledger_sum(store, member_id, Currency::Coins)
    );
}

pub(super) fn mission(id: &str, points: i64, coins: i64) -> Mission {
    Mission {
        id: MissionId(id.to_string()),
        title: format!("Mission {id}"),
        description: "Share a photo of your herd".to_string(),
        points_reward: points,
        coins_reward: coins,
        targeting: MissionTargeting::default(),
        reward_overrides: Vec::new(),
        active: true,
        starts_at: None,
        ends_at: None,
        requires_review: false,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store wrapper injecting the failures a shared database produces under load.
#[derive(Default)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryRewardStore,
    conflicts: AtomicU32,
    outage: AtomicBool,
    hide_checkins: AtomicBool,
    revoke_next_commit: AtomicBool,
    commits: AtomicU32,
}

impl FlakyStore {
    /// The next `count` commits fail with a version conflict.
    pub(super) fn inject_conflicts(&self, count: u32) {
        self.conflicts.store(count, Ordering::SeqCst);
    }

    pub(super) fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    /// Makes `checkin_on` miss, as if another request inserted the row after our read.
    pub(super) fn hide_checkins(&self, hidden: bool) {
        self.hide_checkins.store(hidden, Ordering::SeqCst);
    }

    /// An administrator rejects the member just before the next commit lands.
    pub(super) fn revoke_approval_before_next_commit(&self) {
        self.revoke_next_commit.store(true, Ordering::SeqCst);
    }

    pub(super) fn commit_attempts(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl RewardStore for FlakyStore {
    fn next_member_id(&self) -> Result<MemberId, StoreError> {
        self.inner.next_member_id()
    }

    fn insert_member(&self, member: Member) -> Result<Member, StoreError> {
        self.inner.insert_member(member)
    }

    fn fetch_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError> {
        self.inner.fetch_member(id)
    }

    fn ledger_entries(
        &self,
        id: &MemberId,
        currency: Currency,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.ledger_entries(id, currency)
    }

    fn checkin_on(
        &self,
        id: &MemberId,
        date: NaiveDate,
    ) -> Result<Option<CheckinRecord>, StoreError> {
        if self.hide_checkins.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.checkin_on(id, date)
    }

    fn latest_checkin(&self, id: &MemberId) -> Result<Option<CheckinRecord>, StoreError> {
        self.inner.latest_checkin(id)
    }

    fn checkin_rewards(&self) -> Result<BTreeMap<u8, i64>, StoreError> {
        self.inner.checkin_rewards()
    }

    fn missions(&self) -> Result<Vec<Mission>, StoreError> {
        self.inner.missions()
    }

    fn fetch_mission(&self, id: &MissionId) -> Result<Option<Mission>, StoreError> {
        self.inner.fetch_mission(id)
    }

    fn upsert_mission(&self, mission: Mission) -> Result<Mission, StoreError> {
        self.inner.upsert_mission(mission)
    }

    fn completions_for(&self, id: &MemberId) -> Result<Vec<MissionCompletion>, StoreError> {
        self.inner.completions_for(id)
    }

    fn completion(
        &self,
        member_id: &MemberId,
        mission_id: &MissionId,
    ) -> Result<Option<MissionCompletion>, StoreError> {
        self.inner.completion(member_id, mission_id)
    }

    fn tier_definitions(&self) -> Result<Vec<TierDefinition>, StoreError> {
        self.inner.tier_definitions()
    }

    fn replace_tier_definitions(&self, tiers: Vec<TierDefinition>) -> Result<(), StoreError> {
        self.inner.replace_tier_definitions(tiers)
    }

    fn exchange_config(&self) -> Result<ExchangeConfig, StoreError> {
        self.inner.exchange_config()
    }

    fn update_exchange_config(
        &self,
        config: ExchangeConfig,
    ) -> Result<ExchangeConfig, StoreError> {
        self.inner.update_exchange_config(config)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.outage.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database offline".to_string()));
        }
        if self.revoke_next_commit.swap(false, Ordering::SeqCst) {
            if let Some(member) = self.inner.fetch_member(&unit.member_id)? {
                let revoke = UnitOfWork::for_member(&member, unit.recorded_at)
                    .set_approval(ApprovalStatus::Rejected);
                self.inner.commit(revoke)?;
            }
        }
        let pending = self.conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::VersionConflict {
                member_id: unit.member_id.clone(),
                expected: unit.expected_version,
                found: unit.expected_version + 1,
            });
        }
        self.inner.commit(unit)
    }
}
