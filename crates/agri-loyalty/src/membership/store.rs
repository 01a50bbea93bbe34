use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use super::domain::{
    CheckinRecord, CompletionStatus, Currency, ExchangeConfig, LedgerEntry, Member, MemberId,
    Mission, MissionCompletion, MissionId, TierDefinition,
};
use super::repository::{CommitReceipt, CompletionWrite, RewardStore, StoreError, UnitOfWork};
use super::tiers::TierTable;

#[derive(Debug, Default)]
struct StoreState {
    members: HashMap<MemberId, Member>,
    ledger: Vec<LedgerEntry>,
    checkins: BTreeMap<(MemberId, NaiveDate), CheckinRecord>,
    missions: BTreeMap<MissionId, Mission>,
    completions: BTreeMap<(MemberId, MissionId), MissionCompletion>,
    tiers: Vec<TierDefinition>,
    checkin_rewards: BTreeMap<u8, i64>,
    exchange: ExchangeConfig,
    last_entry_id: u64,
    last_member_seq: u64,
}

/// Process-local store honouring the all-or-nothing unit-of-work contract.
///
/// Every unit is validated in full under the state lock before the first write,
/// so readers never observe a ledger row without its balance change.
#[derive(Debug)]
pub struct InMemoryRewardStore {
    state: Mutex<StoreState>,
}

impl Default for InMemoryRewardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRewardStore {
    pub fn new() -> Self {
        let state = StoreState {
            tiers: TierTable::standard().into_definitions(),
            ..StoreState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_exchange_config(self, config: ExchangeConfig) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.exchange = config;
        }
        self
    }

    pub fn with_checkin_rewards(self, rewards: BTreeMap<u8, i64>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.checkin_rewards = rewards;
        }
        self
    }

    pub fn with_tiers(self, tiers: Vec<TierDefinition>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.tiers = tiers;
        }
        self
    }

    /// Pre-loads members, e.g. when migrating an existing roster.
    pub fn with_members(self, members: Vec<Member>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            for member in members {
                state.members.insert(member.id.clone(), member);
            }
        }
        self
    }

    pub fn with_missions(self, missions: Vec<Mission>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            for mission in missions {
                state.missions.insert(mission.id.clone(), mission);
            }
        }
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl RewardStore for InMemoryRewardStore {
    fn next_member_id(&self) -> Result<MemberId, StoreError> {
        let mut state = self.lock()?;
        loop {
            state.last_member_seq += 1;
            let id = MemberId(format!("mem-{:06}", state.last_member_seq));
            if !state.members.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    fn insert_member(&self, member: Member) -> Result<Member, StoreError> {
        let mut state = self.lock()?;
        if state.members.contains_key(&member.id) {
            return Err(StoreError::Conflict);
        }
        state.members.insert(member.id.clone(), member.clone());
        Ok(member)
    }

    fn fetch_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError> {
        Ok(self.lock()?.members.get(id).cloned())
    }

    fn ledger_entries(
        &self,
        id: &MemberId,
        currency: Currency,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .ledger
            .iter()
            .filter(|entry| &entry.member_id == id && entry.currency == currency)
            .cloned()
            .collect())
    }

    fn checkin_on(
        &self,
        id: &MemberId,
        date: NaiveDate,
    ) -> Result<Option<CheckinRecord>, StoreError> {
        Ok(self.lock()?.checkins.get(&(id.clone(), date)).cloned())
    }

    fn latest_checkin(&self, id: &MemberId) -> Result<Option<CheckinRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .checkins
            .values()
            .filter(|record| &record.member_id == id)
            .max_by_key(|record| record.date)
            .cloned())
    }

    fn checkin_rewards(&self) -> Result<BTreeMap<u8, i64>, StoreError> {
        Ok(self.lock()?.checkin_rewards.clone())
    }

    fn missions(&self) -> Result<Vec<Mission>, StoreError> {
        Ok(self.lock()?.missions.values().cloned().collect())
    }

    fn fetch_mission(&self, id: &MissionId) -> Result<Option<Mission>, StoreError> {
        Ok(self.lock()?.missions.get(id).cloned())
    }

    fn upsert_mission(&self, mission: Mission) -> Result<Mission, StoreError> {
        let mut state = self.lock()?;
        state.missions.insert(mission.id.clone(), mission.clone());
        Ok(mission)
    }

    fn completions_for(&self, id: &MemberId) -> Result<Vec<MissionCompletion>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .completions
            .values()
            .filter(|completion| &completion.member_id == id)
            .cloned()
            .collect())
    }

    fn completion(
        &self,
        member_id: &MemberId,
        mission_id: &MissionId,
    ) -> Result<Option<MissionCompletion>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .completions
            .get(&(member_id.clone(), mission_id.clone()))
            .cloned())
    }

    fn tier_definitions(&self) -> Result<Vec<TierDefinition>, StoreError> {
        Ok(self.lock()?.tiers.clone())
    }

    fn replace_tier_definitions(&self, tiers: Vec<TierDefinition>) -> Result<(), StoreError> {
        self.lock()?.tiers = tiers;
        Ok(())
    }

    fn exchange_config(&self) -> Result<ExchangeConfig, StoreError> {
        Ok(self.lock()?.exchange)
    }

    fn update_exchange_config(
        &self,
        config: ExchangeConfig,
    ) -> Result<ExchangeConfig, StoreError> {
        let mut state = self.lock()?;
        if state.exchange.version != config.version {
            return Err(StoreError::StaleConfig {
                expected: config.version,
                found: state.exchange.version,
            });
        }
        let stored = ExchangeConfig {
            version: config.version + 1,
            ..config
        };
        state.exchange = stored;
        Ok(stored)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        let mut state = self.lock()?;

        let member = state
            .members
            .get(&unit.member_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        if member.version != unit.expected_version {
            return Err(StoreError::VersionConflict {
                member_id: member.id,
                expected: unit.expected_version,
                found: member.version,
            });
        }

        let mut updated = member.clone();
        for currency in [Currency::Points, Currency::Coins] {
            let balance = member.balance(currency);
            let delta = unit.net(currency);
            let Some(next) = delta.and_then(|delta| balance.checked_add(delta)) else {
                return Err(StoreError::BalanceOverflow { currency, balance });
            };
            if next < 0 {
                return Err(StoreError::NegativeBalance {
                    currency,
                    balance,
                    delta: next - balance,
                });
            }
            match currency {
                Currency::Points => updated.total_points = next,
                Currency::Coins => updated.total_coins = next,
            }
        }

        if let Some(record) = &unit.checkin {
            if state
                .checkins
                .contains_key(&(record.member_id.clone(), record.date))
            {
                return Err(StoreError::DuplicateCheckin(record.date));
            }
        }

        if let Some(write) = &unit.completion {
            match write {
                CompletionWrite::Insert(completion) => {
                    let key = (completion.member_id.clone(), completion.mission_id.clone());
                    if state.completions.contains_key(&key) {
                        return Err(StoreError::DuplicateCompletion(
                            completion.mission_id.clone(),
                        ));
                    }
                }
                CompletionWrite::Resolve(completion) => {
                    let key = (completion.member_id.clone(), completion.mission_id.clone());
                    let pending = state
                        .completions
                        .get(&key)
                        .map(|existing| existing.status == CompletionStatus::Pending)
                        .unwrap_or(false);
                    if !pending {
                        return Err(StoreError::MissingCompletion(
                            completion.mission_id.clone(),
                        ));
                    }
                }
            }
        }

        if let Some(tier) = unit.tier {
            updated.tier = tier;
        }
        if let Some(status) = unit.approval_status {
            updated.approval_status = status;
        }
        updated.version = member.version + 1;

        let mut entries = Vec::with_capacity(unit.postings.len());
        for posting in unit.postings {
            state.last_entry_id += 1;
            entries.push(LedgerEntry {
                id: state.last_entry_id,
                member_id: updated.id.clone(),
                currency: posting.currency,
                amount: posting.amount,
                kind: posting.kind,
                source: posting.source,
                description: posting.description,
                reference: posting.reference,
                created_at: unit.recorded_at,
            });
        }
        state.ledger.extend(entries.iter().cloned());

        if let Some(record) = &unit.checkin {
            state
                .checkins
                .insert((record.member_id.clone(), record.date), record.clone());
        }
        let completion = match unit.completion {
            Some(CompletionWrite::Insert(completion) | CompletionWrite::Resolve(completion)) => {
                state.completions.insert(
                    (completion.member_id.clone(), completion.mission_id.clone()),
                    completion.clone(),
                );
                Some(completion)
            }
            None => None,
        };
        state.members.insert(updated.id.clone(), updated.clone());

        Ok(CommitReceipt {
            member: updated,
            entries,
            checkin: unit.checkin,
            completion,
        })
    }
}
