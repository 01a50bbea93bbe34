use serde::Serialize;

use super::super::domain::{Member, Mission, OverrideRule};

/// Override axes in precedence order; the first axis with a matching override wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OverrideAxis {
    MemberType,
    Tier,
}

pub(crate) const OVERRIDE_PRECEDENCE: [OverrideAxis; 2] =
    [OverrideAxis::MemberType, OverrideAxis::Tier];

impl OverrideAxis {
    fn matches(&self, rule: &OverrideRule, member: &Member) -> bool {
        match (self, rule) {
            (OverrideAxis::MemberType, OverrideRule::MemberType(member_type)) => {
                *member_type == member.member_type
            }
            (OverrideAxis::Tier, OverrideRule::Tier(tier)) => *tier == member.tier,
            _ => false,
        }
    }
}

/// Reward a specific member would receive for a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedReward {
    pub points: i64,
    pub coins: i64,
    /// Override that replaced the flat points reward, if any.
    pub applied_override: Option<OverrideRule>,
}

pub fn resolve_reward(mission: &Mission, member: &Member) -> ResolvedReward {
    let matched = OVERRIDE_PRECEDENCE.iter().find_map(|axis| {
        mission
            .reward_overrides
            .iter()
            .find(|candidate| axis.matches(&candidate.rule, member))
    });

    match matched {
        Some(reward_override) => ResolvedReward {
            points: reward_override.points,
            coins: mission.coins_reward,
            applied_override: Some(reward_override.rule),
        },
        None => ResolvedReward {
            points: mission.points_reward,
            coins: mission.coins_reward,
            applied_override: None,
        },
    }
}
