//! Cold storage request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStorageRequestType {
    Withdrawal,
    ColdToWarmTransfer,
    KeyRecovery,
}

impl ColdStorageRequestType {
    /// Approval needs the wallet's MPC threshold online.
    pub fn requires_signing(&self) -> bool {
        matches!(
            self,
            ColdStorageRequestType::Withdrawal | ColdStorageRequestType::ColdToWarmTransfer
        )
    }

    pub fn moves_funds(&self) -> bool {
        self.requires_signing()
    }
}

/// ```text
/// pending → waiting_period → ready_for_approval → approved → completed
/// waiting_period | ready_for_approval → rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStorageStatus {
    Pending,
    WaitingPeriod,
    ReadyForApproval,
    Approved,
    Completed,
    Rejected,
}

impl ColdStorageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColdStorageStatus::Pending => "pending",
            ColdStorageStatus::WaitingPeriod => "waiting_period",
            ColdStorageStatus::ReadyForApproval => "ready_for_approval",
            ColdStorageStatus::Approved => "approved",
            ColdStorageStatus::Completed => "completed",
            ColdStorageStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdStorageRequest {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub request_type: ColdStorageRequestType,
    pub amount: Option<Amount>,
    pub currency: Option<String>,
    pub destination_address: Option<String>,
    pub requested_by: String,
    pub reason: Option<String>,
    pub status: ColdStorageStatus,
    pub required_approvers: u32,
    pub current_approvers: u32,
    /// Distinct approvers in approval order.
    pub approver_ids: Vec<String>,
    pub waiting_period_secs: u64,
    /// Fixed at creation; config reloads never move it.
    pub waiting_period_ends_at: DateTime<Utc>,
    pub physical_verification_required: bool,
    pub physical_verification_completed: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ColdStorageRequest {
    pub fn remaining_approvals(&self) -> u32 {
        self.required_approvers.saturating_sub(self.current_approvers)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewColdStorageRequest {
    pub wallet_id: Uuid,
    pub request_type: ColdStorageRequestType,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub destination_address: Option<String>,
    pub requested_by: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColdStorageFilter {
    pub wallet_id: Option<Uuid>,
    pub status: Option<ColdStorageStatus>,
    pub request_type: Option<ColdStorageRequestType>,
}

impl ColdStorageFilter {
    pub fn matches(&self, request: &ColdStorageRequest) -> bool {
        self.wallet_id.is_none_or(|w| request.wallet_id == w)
            && self.status.is_none_or(|s| request.status == s)
            && self.request_type.is_none_or(|t| request.request_type == t)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColdApprovalOutcome {
    pub request: ColdStorageRequest,
    /// Approver was already in the set; nothing changed.
    pub duplicate: bool,
    pub remaining_approvals: u32,
}
