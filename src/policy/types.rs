//! Wallet and pool policy types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::amount::Amount;

/// Policy fields. Unset fields fall through to the next policy in priority order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRules {
    pub min_approvers: Option<u32>,
    /// Per currency, in base units.
    pub daily_limit: Option<Amount>,
    pub per_tx_limit: Option<Amount>,
    pub address_whitelist: Option<Vec<String>>,
    /// Minimum seconds between two admitted outbound transactions.
    pub cooldown_secs: Option<u64>,
    pub require_mfa: Option<bool>,
}

/// A wallet's own policy. Always wins over inherited pool policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPolicy {
    pub wallet_id: Uuid,
    #[serde(flatten)]
    pub rules: PolicyRules,
    /// Anchor of the daily-limit windows.
    pub last_reset_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    ParentOnly,
    ChildrenOnly,
    Both,
}

impl PolicyScope {
    pub fn covers_parent(&self) -> bool {
        matches!(self, PolicyScope::ParentOnly | PolicyScope::Both)
    }

    pub fn covers_children(&self) -> bool {
        matches!(self, PolicyScope::ChildrenOnly | PolicyScope::Both)
    }
}

/// Policy attached to a parent wallet, optionally narrowed to one relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolPolicy {
    pub id: Uuid,
    pub parent_wallet_id: Uuid,
    pub relationship_id: Option<Uuid>,
    pub name: String,
    pub applies_to: PolicyScope,
    pub priority: i32,
    /// Inert policies are resolved for audit but never gate anything.
    pub is_enforced: bool,
    #[serde(flatten)]
    pub rules: PolicyRules,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) sequence: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPoolPolicy {
    pub parent_wallet_id: Uuid,
    #[serde(default)]
    pub relationship_id: Option<Uuid>,
    pub name: String,
    pub applies_to: PolicyScope,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "enforced_by_default")]
    pub is_enforced: bool,
    #[serde(flatten)]
    pub rules: PolicyRules,
}

fn enforced_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolPolicyFilter {
    pub parent_wallet_id: Option<Uuid>,
    pub relationship_id: Option<Uuid>,
}

/// Where an effective field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PolicySource {
    Default,
    Wallet,
    Pool { policy_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSources {
    pub min_approvers: PolicySource,
    pub daily_limit: PolicySource,
    pub per_tx_limit: PolicySource,
    pub address_whitelist: PolicySource,
    pub cooldown_secs: PolicySource,
    pub require_mfa: PolicySource,
}

impl Default for FieldSources {
    fn default() -> Self {
        Self {
            min_approvers: PolicySource::Default,
            daily_limit: PolicySource::Default,
            per_tx_limit: PolicySource::Default,
            address_whitelist: PolicySource::Default,
            cooldown_secs: PolicySource::Default,
            require_mfa: PolicySource::Default,
        }
    }
}

/// Merged policy for one wallet at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct EffectivePolicy {
    pub wallet_id: Uuid,
    pub min_approvers: u32,
    pub daily_limit: Option<Amount>,
    pub per_tx_limit: Option<Amount>,
    pub address_whitelist: Option<Vec<String>>,
    pub cooldown_secs: Option<u64>,
    pub require_mfa: bool,
    pub sources: FieldSources,
    /// Enforced pool policies that were candidates, in evaluation order.
    pub applied_policies: Vec<Uuid>,
    /// Candidates with `is_enforced = false`.
    pub inert_policies: Vec<Uuid>,
    pub window_started_at: DateTime<Utc>,
    pub spent_today: BTreeMap<String, Amount>,
    /// Remaining allowance per currency with usage in the window.
    pub remaining_daily: BTreeMap<String, Amount>,
}

impl EffectivePolicy {
    /// Remaining allowance for `currency`; `None` when no daily limit applies.
    pub fn remaining_for(&self, currency: &str) -> Option<Amount> {
        let limit = self.daily_limit?;
        let spent = self
            .spent_today
            .get(&currency.to_ascii_uppercase())
            .copied()
            .unwrap_or_default();
        Some(limit.saturating_sub(spent))
    }
}

/// One transaction asking for admission.
#[derive(Debug, Clone)]
pub struct Admission {
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub amount: Amount,
    pub currency: String,
    pub to_address: Option<String>,
    /// Limits, whitelist and cooldown only gate outbound types.
    pub outbound: bool,
    /// Pool-internal transfers skip the whitelist.
    pub internal: bool,
}

/// Approval requirements granted to an admitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub min_approvers: u32,
    pub require_mfa: bool,
}
