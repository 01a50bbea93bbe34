use super::super::domain::{BusinessType, MemberType, OccupationProfile, VetType};

/// Outcome a matching rule assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Approve,
    Reject,
}

/// Occupation predicate evaluated against the sub-attributes of a registrant.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Condition {
    Always,
    VetTypeIs(VetType),
    BusinessTypeIn(&'static [BusinessType]),
    AffiliatedWith(BusinessType),
    BusinessTypeIs(BusinessType),
}

impl Condition {
    fn holds(&self, occupation: &OccupationProfile) -> bool {
        match self {
            Condition::Always => true,
            Condition::VetTypeIs(vet_type) => occupation.vet_type == Some(*vet_type),
            Condition::BusinessTypeIn(allowed) => occupation
                .business_type
                .map(|business| allowed.contains(&business))
                .unwrap_or(false),
            Condition::AffiliatedWith(business) => {
                occupation.business_type == Some(*business)
                    && occupation.is_affiliated_staff == Some(true)
            }
            Condition::BusinessTypeIs(business) => occupation.business_type == Some(*business),
        }
    }
}

pub(crate) struct ApprovalRule {
    pub member_type: MemberType,
    pub condition: Condition,
    pub verdict: Verdict,
}

const AUTO_APPROVED_BUSINESSES: &[BusinessType] = &[
    BusinessType::AnimalProduction,
    BusinessType::AnimalFeed,
    BusinessType::Other,
];

/// Registration rules, evaluated top to bottom; the first match for a member type wins.
pub(crate) const APPROVAL_RULES: &[ApprovalRule] = &[
    ApprovalRule {
        member_type: MemberType::Farm,
        condition: Condition::Always,
        verdict: Verdict::Approve,
    },
    ApprovalRule {
        member_type: MemberType::LivestockShop,
        condition: Condition::Always,
        verdict: Verdict::Approve,
    },
    ApprovalRule {
        member_type: MemberType::Veterinarian,
        condition: Condition::VetTypeIs(VetType::Livestock),
        verdict: Verdict::Approve,
    },
    ApprovalRule {
        member_type: MemberType::Veterinarian,
        condition: Condition::VetTypeIs(VetType::HospitalClinic),
        verdict: Verdict::Reject,
    },
    ApprovalRule {
        member_type: MemberType::CompanyEmployee,
        condition: Condition::BusinessTypeIn(AUTO_APPROVED_BUSINESSES),
        verdict: Verdict::Approve,
    },
    ApprovalRule {
        member_type: MemberType::CompanyEmployee,
        condition: Condition::AffiliatedWith(BusinessType::VeterinaryDistribution),
        verdict: Verdict::Approve,
    },
    ApprovalRule {
        member_type: MemberType::CompanyEmployee,
        condition: Condition::BusinessTypeIs(BusinessType::VeterinaryDistribution),
        verdict: Verdict::Reject,
    },
    ApprovalRule {
        member_type: MemberType::Government,
        condition: Condition::Always,
        verdict: Verdict::Reject,
    },
    ApprovalRule {
        member_type: MemberType::Other,
        condition: Condition::Always,
        verdict: Verdict::Reject,
    },
];

/// Returns the verdict of the first rule matching the registrant, if any.
pub(crate) fn first_match(
    rules: &[ApprovalRule],
    member_type: MemberType,
    occupation: &OccupationProfile,
) -> Option<Verdict> {
    rules
        .iter()
        .filter(|rule| rule.member_type == member_type)
        .find(|rule| rule.condition.holds(occupation))
        .map(|rule| rule.verdict)
}
