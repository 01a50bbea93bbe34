use chrono::{DateTime, Utc};

use super::super::domain::{Member, Mission};

/// Active and inside its optional `[starts_at, ends_at]` window.
pub fn is_available(mission: &Mission, now: DateTime<Utc>) -> bool {
    if !mission.active {
        return false;
    }
    let started = mission.starts_at.map(|start| start <= now).unwrap_or(true);
    let not_expired = mission.ends_at.map(|end| end >= now).unwrap_or(true);
    started && not_expired
}

/// Member matches every targeting axis the mission declares.
pub fn is_targeted(mission: &Mission, member: &Member) -> bool {
    let targeting = &mission.targeting;
    let type_allowed = targeting
        .member_types
        .as_ref()
        .map(|allowed| allowed.contains(&member.member_type))
        .unwrap_or(true);
    let tier_allowed = targeting
        .tiers
        .as_ref()
        .map(|allowed| allowed.contains(&member.tier))
        .unwrap_or(true);
    type_allowed && tier_allowed
}

pub fn eligible_missions<'a>(
    missions: &'a [Mission],
    member: &'a Member,
    now: DateTime<Utc>,
) -> impl Iterator<Item = &'a Mission> + 'a {
    missions
        .iter()
        .filter(move |mission| is_available(mission, now) && is_targeted(mission, member))
}
