use agri_loyalty::config::RewardsConfig;
use agri_loyalty::membership::{
    InMemoryRewardStore, MemberType, Mission, MissionId, MissionTargeting, OverrideRule,
    RewardOverride, Tier,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Store seeded with the configured exchange terms, check-in schedule and launch missions.
pub(crate) fn seeded_store(rewards: &RewardsConfig, now: DateTime<Utc>) -> InMemoryRewardStore {
    InMemoryRewardStore::new()
        .with_exchange_config(rewards.exchange_config())
        .with_checkin_rewards(rewards.checkin_schedule.clone())
        .with_missions(launch_missions(now))
}

pub(crate) fn launch_missions(now: DateTime<Utc>) -> Vec<Mission> {
    vec![
        Mission {
            id: MissionId("herd-health-survey".to_string()),
            title: "Herd health survey".to_string(),
            description: "Answer five questions about vaccination and feed.".to_string(),
            points_reward: 150,
            coins_reward: 10,
            targeting: MissionTargeting::default(),
            reward_overrides: vec![
                RewardOverride {
                    rule: OverrideRule::Tier(Tier::Silver),
                    points: 200,
                },
                RewardOverride {
                    rule: OverrideRule::MemberType(MemberType::Farm),
                    points: 250,
                },
            ],
            active: true,
            starts_at: Some(now - Duration::days(1)),
            ends_at: Some(now + Duration::days(60)),
            requires_review: false,
        },
        Mission {
            id: MissionId("feed-receipt-upload".to_string()),
            title: "Upload a feed receipt".to_string(),
            description: "Photograph a receipt from a partner feed mill.".to_string(),
            points_reward: 400,
            coins_reward: 40,
            targeting: MissionTargeting {
                member_types: Some(vec![MemberType::Farm, MemberType::LivestockShop]),
                tiers: None,
            },
            reward_overrides: Vec::new(),
            active: true,
            starts_at: None,
            ends_at: None,
            requires_review: true,
        },
        Mission {
            id: MissionId("gold-field-day".to_string()),
            title: "Host a field day".to_string(),
            description: "Invite neighbouring farms to a product demonstration.".to_string(),
            points_reward: 1_500,
            coins_reward: 100,
            targeting: MissionTargeting {
                member_types: None,
                tiers: Some(vec![Tier::Gold, Tier::Platinum]),
            },
            reward_overrides: Vec::new(),
            active: true,
            starts_at: None,
            ends_at: None,
            requires_review: true,
        },
    ]
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_member_type(raw: &str) -> Result<MemberType, String> {
    raw.parse::<MemberType>().map_err(|err| err.to_string())
}
