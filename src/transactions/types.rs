//! Transaction entity and request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::amount::Amount;
use crate::approvals::VoteOutcome;
use crate::error::{EngineError, EngineResult};

/// Kind of fund movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Stake,
    Unstake,
    Governance,
}

impl TransactionType {
    /// Funds leave the wallet; limits, whitelist and cooldown apply.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            TransactionType::Withdrawal | TransactionType::Transfer | TransactionType::Stake
        )
    }

    /// Execution needs an MPC signature from the wallet.
    pub fn requires_signing(&self) -> bool {
        !matches!(self, TransactionType::Deposit)
    }
}

/// Transaction lifecycle.
///
/// ```text
/// pending → approved → processing → completed
/// pending/approved → rejected | cancelled
/// processing → failed → (retry) pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Processing,
    Completed,
    Rejected,
    Cancelled,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Failed => "failed",
        }
    }

    /// No further progress without an explicit retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Rejected
                | TransactionStatus::Cancelled
                | TransactionStatus::Failed
        )
    }

    /// Ended without moving funds.
    pub fn is_unsuccessful(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Rejected | TransactionStatus::Cancelled | TransactionStatus::Failed
        )
    }

    /// Quorum was reached in the current round.
    pub fn passed_quorum(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Approved | TransactionStatus::Processing | TransactionStatus::Completed
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custody transaction.
///
/// `status`, `current_approvals` and the outcome fields only change through
/// [`crate::transactions::TransactionService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub batch_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Amount,
    pub currency: String,
    pub to_address: Option<String>,
    pub estimated_fee: Option<Amount>,
    pub actual_fee: Option<Amount>,
    pub risk_score: u8,
    pub requires_approvals: u32,
    pub current_approvals: u32,
    /// MFA requirement frozen from the resolved policy at admission.
    pub requires_mfa: bool,
    pub status: TransactionStatus,
    /// Approval round, bumped by every retry.
    pub attempt: u32,
    pub initiated_by: Option<String>,
    pub memo: Option<String>,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Pool-internal transfer: destination is a linked wallet, whitelist is skipped.
    #[serde(default)]
    pub internal: bool,
}

impl Transaction {
    pub fn remaining_approvals(&self) -> u32 {
        self.requires_approvals.saturating_sub(self.current_approvals)
    }
}

/// Submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Amount,
    pub currency: String,
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub estimated_fee: Option<Amount>,
    #[serde(default)]
    pub risk_score: u8,
    #[serde(default)]
    pub initiated_by: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TransactionRequest {
    /// Minimal request, mostly for tests and the SDK.
    pub fn new(wallet_id: Uuid, tx_type: TransactionType, amount: Amount, currency: &str) -> Self {
        Self {
            wallet_id,
            tx_type,
            amount,
            currency: currency.to_string(),
            to_address: None,
            estimated_fee: None,
            risk_score: 0,
            initiated_by: None,
            memo: None,
            expires_at: None,
        }
    }

    pub fn to(mut self, address: &str) -> Self {
        self.to_address = Some(address.to_string());
        self
    }

    pub fn risk(mut self, score: u8) -> Self {
        self.risk_score = score;
        self
    }

    pub fn initiated_by(mut self, user: &str) -> Self {
        self.initiated_by = Some(user.to_string());
        self
    }

    pub(crate) fn validate(&self, now: DateTime<Utc>) -> EngineResult<()> {
        if self.currency.trim().is_empty() {
            return Err(EngineError::Validation("currency must not be empty".into()));
        }
        if self.risk_score > 100 {
            return Err(EngineError::Validation(format!(
                "risk_score {} outside 0..=100",
                self.risk_score
            )));
        }
        if self.tx_type.is_outbound() && self.amount.is_zero() {
            return Err(EngineError::Validation("outbound amount must be positive".into()));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(EngineError::Validation("expires_at is in the past".into()));
            }
        }
        Ok(())
    }
}

/// List filter; every field is optional and fields combine with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub wallet_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    #[serde(rename = "type")]
    pub tx_type: Option<TransactionType>,
    pub currency: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.wallet_id.is_none_or(|w| tx.wallet_id == w)
            && self.batch_id.is_none_or(|b| tx.batch_id == Some(b))
            && self.status.is_none_or(|s| tx.status == s)
            && self.tx_type.is_none_or(|t| tx.tx_type == t)
            && self
                .currency
                .as_deref()
                .is_none_or(|c| tx.currency.eq_ignore_ascii_case(c))
            && self.from.is_none_or(|from| tx.created_at >= from)
            && self.to.is_none_or(|to| tx.created_at <= to)
    }
}

/// Result of an approval call.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub transaction: Transaction,
    pub vote: VoteOutcome,
    /// Same approver repeated an identical vote; nothing changed.
    pub duplicate: bool,
    /// This call performed the post-quorum transition.
    pub quorum_reached: bool,
    pub remaining_approvals: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Failed.is_unsuccessful());
        assert!(!TransactionStatus::Processing.is_terminal());
        assert!(TransactionStatus::Processing.passed_quorum());
        assert!(!TransactionStatus::Pending.passed_quorum());
    }

    #[test]
    fn test_request_json_uses_type_key() {
        let wallet = Uuid::new_v4();
        let json = serde_json::json!({
            "wallet_id": wallet,
            "type": "withdrawal",
            "amount": "1000000000",
            "currency": "BTC"
        });
        let request: TransactionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.tx_type, TransactionType::Withdrawal);
        assert_eq!(request.amount, Amount::from(1_000_000_000u64));
        assert_eq!(request.risk_score, 0);
    }

    #[test]
    fn test_request_validation() {
        let now = Utc::now();
        let wallet = Uuid::new_v4();
        let ok = TransactionRequest::new(wallet, TransactionType::Withdrawal, Amount::from(1u64), "ETH");
        assert!(ok.validate(now).is_ok());

        let zero = TransactionRequest::new(wallet, TransactionType::Withdrawal, Amount::ZERO, "ETH");
        assert!(zero.validate(now).is_err());

        let governance = TransactionRequest::new(wallet, TransactionType::Governance, Amount::ZERO, "ETH");
        assert!(governance.validate(now).is_ok());

        let risky = ok.clone().risk(101);
        assert!(risky.validate(now).is_err());
    }
}
