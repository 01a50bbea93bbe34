mod rules;

use serde::{Deserialize, Serialize};

use super::domain::{ApprovalStatus, MemberType, OccupationProfile};
use rules::{first_match, Verdict, APPROVAL_RULES};

pub const APPROVED_MESSAGE: &str = "Registration approved. Welcome to the rewards program.";
pub const DECLINED_MESSAGE: &str =
    "Thank you for your interest. This program is reserved for livestock producers and their partners.";
pub const MANUAL_REVIEW_MESSAGE: &str =
    "Registration received and needs manual review by the program team.";

/// Registration verdict persisted as the member's initial approval status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub status: ApprovalStatus,
    pub message: String,
}

impl ApprovalDecision {
    pub fn approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}

/// Decides whether a registrant is auto-approved from their occupation alone.
pub fn decide(member_type: MemberType, occupation: &OccupationProfile) -> ApprovalDecision {
    match first_match(APPROVAL_RULES, member_type, occupation) {
        Some(Verdict::Approve) => ApprovalDecision {
            status: ApprovalStatus::Approved,
            message: APPROVED_MESSAGE.to_string(),
        },
        Some(Verdict::Reject) => ApprovalDecision {
            status: ApprovalStatus::Rejected,
            message: DECLINED_MESSAGE.to_string(),
        },
        None => ApprovalDecision {
            status: ApprovalStatus::Pending,
            message: MANUAL_REVIEW_MESSAGE.to_string(),
        },
    }
}
