//! Common types used across Leadforge

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User (device session owner) ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-generated transaction ID.
///
/// Generated once per logical payment and carried unchanged through every
/// retry, so the backend can recognise repeated saves of the same payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn generate() -> Self {
        Self(format!(
            "TXN-{}",
            Uuid::new_v4().simple().to_string().to_uppercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Subscription tier, ordered from least to most capable
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Essentials,
    Standard,
    Premium,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Free,
        PlanTier::Essentials,
        PlanTier::Standard,
        PlanTier::Premium,
    ];

    /// Parse a tier, falling back to Free for anything unrecognised
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Essentials => write!(f, "essentials"),
            Self::Standard => write!(f, "standard"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "essentials" => Ok(Self::Essentials),
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            _ => Err(format!("Invalid plan tier: {}", s)),
        }
    }
}

/// Gated product feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Crm,
    EmailCampaign,
    MultimediaCampaign,
    Automation,
    Analytics,
    Verification,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Crm,
        Feature::EmailCampaign,
        Feature::MultimediaCampaign,
        Feature::Automation,
        Feature::Analytics,
        Feature::Verification,
    ];
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crm => write!(f, "crm"),
            Self::EmailCampaign => write!(f, "email_campaign"),
            Self::MultimediaCampaign => write!(f, "multimedia_campaign"),
            Self::Automation => write!(f, "automation"),
            Self::Analytics => write!(f, "analytics"),
            Self::Verification => write!(f, "verification"),
        }
    }
}

impl std::str::FromStr for Feature {
    type Err = String;

    /// Accepts both snake_case and the camelCase names used by the dashboard
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "crm" | "CRM" => Ok(Self::Crm),
            "email_campaign" | "emailCampaign" => Ok(Self::EmailCampaign),
            "multimedia_campaign" | "multimediaCampaign" => Ok(Self::MultimediaCampaign),
            "automation" => Ok(Self::Automation),
            "analytics" => Ok(Self::Analytics),
            "verification" => Ok(Self::Verification),
            _ => Err(format!("Unknown feature: {}", s)),
        }
    }
}

/// A quota ceiling that may be unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quota {
    Limited(u64),
    Unlimited,
}

impl Quota {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// The bounded ceiling, if any
    pub fn limit(&self) -> Option<u64> {
        match self {
            Self::Limited(n) => Some(*n),
            Self::Unlimited => None,
        }
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self::Limited(0)
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{}", n),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl std::str::FromStr for Quota {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unlimited") || s.eq_ignore_ascii_case("infinity") {
            return Ok(Self::Unlimited);
        }
        s.parse::<u64>()
            .map(Self::Limited)
            .map_err(|_| format!("Invalid quota: {}", s))
    }
}

/// Payment gateway that confirmed a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Card,
    Razorpay,
    Stripe,
    Paypal,
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Card => write!(f, "card"),
            Self::Razorpay => write!(f, "razorpay"),
            Self::Stripe => write!(f, "stripe"),
            Self::Paypal => write!(f, "paypal"),
        }
    }
}

impl std::str::FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "razorpay" => Ok(Self::Razorpay),
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            _ => Err(format!("Invalid gateway: {}", s)),
        }
    }
}
