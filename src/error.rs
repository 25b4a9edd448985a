//! Engine error taxonomy.
//!
//! Validation failures are returned synchronously and never leave partial
//! state behind. Execution failures (broadcast, signing) happen after a request
//! was accepted and are recorded on the entity instead of surfacing here.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Policy rule that rejected an admission or an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    PerTransactionLimit,
    DailyLimit,
    Whitelist,
    Cooldown,
    SelfApproval,
    PoolPermission,
}

impl PolicyRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyRule::PerTransactionLimit => "per_tx_limit",
            PolicyRule::DailyLimit => "daily_limit",
            PolicyRule::Whitelist => "whitelist",
            PolicyRule::Cooldown => "cooldown",
            PolicyRule::SelfApproval => "self_approval",
            PolicyRule::PoolPermission => "pool_permission",
        }
    }
}

impl std::fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Limit, whitelist, cooldown or permission failure. The caller must adjust the request.
    #[error("policy violation ({rule}): {reason}")]
    PolicyViolation { rule: PolicyRule, reason: String },

    /// Action not valid from the entity's current status.
    #[error("cannot {action} {entity} {id} in status {from}")]
    InvalidStateTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        action: &'static str,
    },

    /// Cold storage approval attempted before the waiting period ended.
    #[error("waiting period active until {ends_at}")]
    WaitingPeriodActive { ends_at: DateTime<Utc> },

    /// Relationship would close a loop in the pool hierarchy.
    #[error("relationship {parent} -> {child} would create a cycle")]
    CycleDetected { parent: Uuid, child: Uuid },

    /// Child wallet is still bound to another parent.
    #[error("wallet {child} is already bound to parent {existing_parent}")]
    ParentAlreadyAssigned { child: Uuid, existing_parent: Uuid },

    /// Ancestor walk exceeded the configured depth.
    #[error("pool hierarchy deeper than {max_depth} levels")]
    HierarchyDepthExceeded { max_depth: usize },

    /// Not enough MPC key shares online to sign.
    #[error("wallet {wallet_id} has {online} of {threshold} required key shares online")]
    ThresholdUnavailable {
        wallet_id: Uuid,
        online: u16,
        threshold: u16,
    },

    /// Physical verification has to complete before approval.
    #[error("physical verification pending for request {request_id}")]
    VerificationRequired { request_id: Uuid },

    /// Pending transaction passed its expiry and was cancelled.
    #[error("transaction {id} expired")]
    TransactionExpired { id: Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid request: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn policy(rule: PolicyRule, reason: impl Into<String>) -> Self {
        EngineError::PolicyViolation {
            rule,
            reason: reason.into(),
        }
    }

    /// Machine readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::PolicyViolation { .. } => "policy_violation",
            EngineError::InvalidStateTransition { .. } => "invalid_state_transition",
            EngineError::WaitingPeriodActive { .. } => "waiting_period_active",
            EngineError::CycleDetected { .. } => "cycle_detected",
            EngineError::ParentAlreadyAssigned { .. } => "parent_already_assigned",
            EngineError::HierarchyDepthExceeded { .. } => "hierarchy_depth_exceeded",
            EngineError::ThresholdUnavailable { .. } => "threshold_unavailable",
            EngineError::VerificationRequired { .. } => "verification_required",
            EngineError::TransactionExpired { .. } => "transaction_expired",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Validation(_) => "validation",
        }
    }

    /// Whether retrying the same request later can succeed without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ThresholdUnavailable { .. })
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::policy(PolicyRule::DailyLimit, "remaining 5, requested 10");
        assert_eq!(
            err.to_string(),
            "policy violation (daily_limit): remaining 5, requested 10"
        );
        assert_eq!(err.kind(), "policy_violation");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_threshold_is_retryable() {
        let err = EngineError::ThresholdUnavailable {
            wallet_id: Uuid::nil(),
            online: 1,
            threshold: 2,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("1 of 2"));
    }
}
