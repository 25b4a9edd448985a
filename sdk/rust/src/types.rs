//! Wire types as the API returns them. Fields the client does not need are
//! left out; amounts stay decimal strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRequest {
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,
    pub risk_score: u8,
}

impl TransactionRequest {
    pub fn withdrawal(wallet_id: Uuid, amount: u64, currency: &str) -> Self {
        Self {
            wallet_id,
            tx_type: "withdrawal".to_string(),
            amount: amount.to_string(),
            currency: currency.to_string(),
            to_address: None,
            initiated_by: None,
            risk_score: 0,
        }
    }

    pub fn to(mut self, address: &str) -> Self {
        self.to_address = Some(address.to_string());
        self
    }

    pub fn initiated_by(mut self, user: &str) -> Self {
        self.initiated_by = Some(user.to_string());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub batch_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub requires_approvals: u32,
    pub current_approvals: u32,
    pub attempt: u32,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalResult {
    pub transaction: Transaction,
    pub duplicate: bool,
    pub quorum_reached: bool,
    pub remaining_approvals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub status: String,
    pub total_count: usize,
    pub approved_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub transaction_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColdStorageRequest {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub request_type: String,
    pub status: String,
    pub required_approvers: u32,
    pub current_approvers: u32,
    pub approver_ids: Vec<String>,
    pub waiting_period_ends_at: String,
    pub physical_verification_required: bool,
    pub physical_verification_completed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColdApprovalResult {
    pub request: ColdStorageRequest,
    pub duplicate: bool,
    pub remaining_approvals: u32,
}

/// Error body returned for every failed call.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}
