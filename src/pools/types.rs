//! Pooled wallet relationship types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    ViewOnly,
    Limited,
    Full,
}

impl PermissionLevel {
    pub fn can_move_funds(&self) -> bool {
        !matches!(self, PermissionLevel::ViewOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Active,
    Inactive,
    Archived,
    Suspended,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Active => "active",
            RelationshipStatus::Inactive => "inactive",
            RelationshipStatus::Archived => "archived",
            RelationshipStatus::Suspended => "suspended",
        }
    }
}

/// Parent to child edge of the pool forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PooledWalletRelationship {
    pub id: Uuid,
    pub parent_wallet_id: Uuid,
    pub child_wallet_id: Uuid,
    pub relation_type: String,
    pub permission_level: PermissionLevel,
    pub status: RelationshipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    pub parent_wallet_id: Uuid,
    pub child_wallet_id: Uuid,
    #[serde(default = "default_relation_type")]
    pub relation_type: String,
    #[serde(default = "default_permission")]
    pub permission_level: PermissionLevel,
}

fn default_relation_type() -> String {
    "sub_account".to_string()
}

fn default_permission() -> PermissionLevel {
    PermissionLevel::Limited
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipFilter {
    pub parent_wallet_id: Option<Uuid>,
    pub child_wallet_id: Option<Uuid>,
    pub status: Option<RelationshipStatus>,
}

impl RelationshipFilter {
    pub fn matches(&self, rel: &PooledWalletRelationship) -> bool {
        self.parent_wallet_id.is_none_or(|p| rel.parent_wallet_id == p)
            && self.child_wallet_id.is_none_or(|c| rel.child_wallet_id == c)
            && self.status.is_none_or(|s| rel.status == s)
    }
}

/// Read-only tree view rooted at a parent wallet.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyNode {
    pub wallet_id: Uuid,
    /// Edge linking this node to its parent; `None` at the root.
    pub relationship: Option<PooledWalletRelationship>,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Every wallet in the tree, root first.
    pub fn wallet_ids(&self) -> Vec<Uuid> {
        let mut out = vec![self.wallet_id];
        for child in &self.children {
            out.extend(child.wallet_ids());
        }
        out
    }
}

/// Fund movement between two pool-linked wallets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalTransfer {
    pub id: Uuid,
    pub relationship_id: Uuid,
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub transaction_id: Uuid,
    pub amount: crate::amount::Amount,
    pub currency: String,
    pub memo: Option<String>,
    pub initiated_by: Option<String>,
    /// Mirrors the underlying transaction at read time.
    pub status: crate::transactions::TransactionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalTransferRequest {
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub amount: crate::amount::Amount,
    pub currency: String,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub initiated_by: Option<String>,
}
