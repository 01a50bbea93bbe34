use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registered members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for published missions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionId(pub String);

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raised when loose input (CSV cells, query strings) names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field} '{value}'")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

/// Occupation classification captured at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberType {
    Farm,
    CompanyEmployee,
    Veterinarian,
    LivestockShop,
    Government,
    Other,
}

impl MemberType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::Farm => "farm",
            MemberType::CompanyEmployee => "company_employee",
            MemberType::Veterinarian => "veterinarian",
            MemberType::LivestockShop => "livestock_shop",
            MemberType::Government => "government",
            MemberType::Other => "other",
        }
    }
}

impl FromStr for MemberType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "farm" => Ok(MemberType::Farm),
            "company_employee" => Ok(MemberType::CompanyEmployee),
            "veterinarian" => Ok(MemberType::Veterinarian),
            "livestock_shop" => Ok(MemberType::LivestockShop),
            "government" => Ok(MemberType::Government),
            "other" => Ok(MemberType::Other),
            _ => Err(UnknownVariant::new("member type", value)),
        }
    }
}

/// Line of business declared by company employees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    AnimalProduction,
    AnimalFeed,
    VeterinaryDistribution,
    Other,
}

impl FromStr for BusinessType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "animal_production" => Ok(BusinessType::AnimalProduction),
            "animal_feed" => Ok(BusinessType::AnimalFeed),
            "veterinary_distribution" => Ok(BusinessType::VeterinaryDistribution),
            "other" => Ok(BusinessType::Other),
            _ => Err(UnknownVariant::new("business type", value)),
        }
    }
}

/// Practice type declared by veterinarians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetType {
    Livestock,
    HospitalClinic,
}

impl FromStr for VetType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "livestock" => Ok(VetType::Livestock),
            "hospital_clinic" => Ok(VetType::HospitalClinic),
            _ => Err(UnknownVariant::new("vet type", value)),
        }
    }
}

/// Occupation sub-attributes; which fields matter depends on the member type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupationProfile {
    #[serde(default)]
    pub business_type: Option<BusinessType>,
    #[serde(default)]
    pub vet_type: Option<VetType>,
    #[serde(default)]
    pub is_affiliated_staff: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// Membership rank derived from accumulated points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
        }
    }
}

impl FromStr for Tier {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "bronze" => Ok(Tier::Bronze),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            "platinum" => Ok(Tier::Platinum),
            _ => Err(UnknownVariant::new("tier", value)),
        }
    }
}

/// Registered program member with denormalized balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub display_name: String,
    pub phone: Option<String>,
    pub member_type: MemberType,
    pub occupation: OccupationProfile,
    pub approval_status: ApprovalStatus,
    pub tier: Tier,
    pub total_points: i64,
    pub total_coins: i64,
    /// Bumped by every committed unit of work; used for optimistic concurrency.
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn balance(&self, currency: Currency) -> i64 {
        match currency {
            Currency::Points => self.total_points,
            Currency::Coins => self.total_coins,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }
}

/// The two parallel balance series a member holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Points,
    Coins,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Points => "points",
            Currency::Coins => "coins",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "points" | "point" => Ok(Currency::Points),
            "coins" | "coin" => Ok(Currency::Coins),
            _ => Err(UnknownVariant::new("currency", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earn,
    Redeem,
    Expire,
    Adjust,
}

/// What caused a balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSource {
    DailyCheckin,
    Mission,
    Receipt,
    AdminAdjustment,
    Exchange,
    Expiration,
}

/// Immutable record of a single signed balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub member_id: MemberId,
    pub currency: Currency,
    pub amount: i64,
    pub kind: TransactionKind,
    pub source: LedgerSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row per member per calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub member_id: MemberId,
    pub date: NaiveDate,
    pub streak_count: u32,
    pub coins_earned: i64,
}

/// Point range owned by a tier; `max_points` is exclusive and `None` for the top tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDefinition {
    pub tier: Tier,
    pub display_name: String,
    pub min_points: i64,
    pub max_points: Option<i64>,
}

impl TierDefinition {
    pub fn new(tier: Tier, display_name: &str, min_points: i64, max_points: Option<i64>) -> Self {
        Self {
            tier,
            display_name: display_name.to_string(),
            min_points,
            max_points,
        }
    }
}

/// Optional eligibility restriction; `None` on an axis means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionTargeting {
    #[serde(default)]
    pub member_types: Option<Vec<MemberType>>,
    #[serde(default)]
    pub tiers: Option<Vec<Tier>>,
}

/// Attribute an override keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OverrideRule {
    MemberType(MemberType),
    Tier(Tier),
}

/// Replaces a mission's flat points reward for matching members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardOverride {
    pub rule: OverrideRule,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub points_reward: i64,
    #[serde(default)]
    pub coins_reward: i64,
    #[serde(default)]
    pub targeting: MissionTargeting,
    #[serde(default)]
    pub reward_overrides: Vec<RewardOverride>,
    pub active: bool,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Claims wait for an administrator instead of being awarded immediately.
    #[serde(default)]
    pub requires_review: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionCompletion {
    pub member_id: MemberId,
    pub mission_id: MissionId,
    pub status: CompletionStatus,
    pub points_awarded: i64,
    pub coins_awarded: i64,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Process-wide coins→points conversion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub version: u64,
    pub coins_per_point: i64,
    pub minimum_coins: i64,
    pub enabled: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            coins_per_point: 10,
            minimum_coins: 100,
            enabled: true,
        }
    }
}

/// Caller identity supplied by the upstream authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub member_id: MemberId,
    pub is_admin: bool,
}

impl Actor {
    pub fn member(member_id: MemberId) -> Self {
        Self {
            member_id,
            is_admin: false,
        }
    }

    pub fn admin(member_id: MemberId) -> Self {
        Self {
            member_id,
            is_admin: true,
        }
    }
}
