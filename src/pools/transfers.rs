//! Internal transfers between pool-linked wallets.
//!
//! A transfer is a `transfer` transaction admitted with the whitelist
//! bypassed; it then follows the ordinary approval lifecycle. The transfer
//! record only links the relationship to that transaction.

use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult, PolicyRule};
use crate::observability::metrics;
use crate::pagination::{Page, PageRequest};
use crate::pools::hierarchy::PoolHierarchy;
use crate::pools::types::{InternalTransfer, InternalTransferRequest};
use crate::transactions::{TransactionRequest, TransactionService, TransactionType};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferFilter {
    pub wallet_id: Option<Uuid>,
    pub relationship_id: Option<Uuid>,
}

pub struct InternalTransferService {
    transfers: DashMap<Uuid, InternalTransfer>,
    pools: Arc<PoolHierarchy>,
    transactions: Arc<TransactionService>,
    clock: Arc<dyn Clock>,
}

impl InternalTransferService {
    pub fn new(pools: Arc<PoolHierarchy>, transactions: Arc<TransactionService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transfers: DashMap::new(),
            pools,
            transactions,
            clock,
        }
    }

    pub fn create(&self, request: InternalTransferRequest) -> EngineResult<InternalTransfer> {
        if request.from_wallet_id == request.to_wallet_id {
            return Err(EngineError::Validation("source and destination wallet are the same".into()));
        }
        let relationship = self
            .pools
            .relationship_between(request.from_wallet_id, request.to_wallet_id)
            .ok_or_else(|| {
                metrics::record_policy_violation(PolicyRule::PoolPermission.as_str());
                EngineError::policy(
                    PolicyRule::PoolPermission,
                    format!(
                        "no active pool relationship between {} and {}",
                        request.from_wallet_id, request.to_wallet_id
                    ),
                )
            })?;
        if !relationship.permission_level.can_move_funds() {
            metrics::record_policy_violation(PolicyRule::PoolPermission.as_str());
            return Err(EngineError::policy(
                PolicyRule::PoolPermission,
                format!("relationship {} is view only", relationship.id),
            ));
        }

        let mut tx_request = TransactionRequest::new(
            request.from_wallet_id,
            TransactionType::Transfer,
            request.amount,
            &request.currency,
        )
        .to(&request.to_wallet_id.to_string());
        tx_request.initiated_by = request.initiated_by.clone();
        tx_request.memo = request.memo.clone();
        let tx = self.transactions.submit_internal(tx_request)?;

        let transfer = InternalTransfer {
            id: Uuid::new_v4(),
            relationship_id: relationship.id,
            from_wallet_id: request.from_wallet_id,
            to_wallet_id: request.to_wallet_id,
            transaction_id: tx.id,
            amount: tx.amount,
            currency: tx.currency.clone(),
            memo: request.memo,
            initiated_by: request.initiated_by,
            status: tx.status,
            created_at: self.clock.now(),
        };
        self.transfers.insert(transfer.id, transfer.clone());
        tracing::info!(
            transfer_id = %transfer.id,
            relationship_id = %relationship.id,
            transaction_id = %tx.id,
            "Internal transfer created"
        );
        Ok(transfer)
    }

    /// Transfer with the status of its transaction as of now.
    pub fn get(&self, id: Uuid) -> EngineResult<InternalTransfer> {
        let transfer = self
            .transfers
            .get(&id)
            .map(|t| t.clone())
            .ok_or_else(|| EngineError::not_found("internal transfer", id))?;
        Ok(self.with_current_status(transfer))
    }

    pub fn list(&self, filter: &TransferFilter, page: PageRequest) -> Page<InternalTransfer> {
        let mut items: Vec<_> = self
            .transfers
            .iter()
            .filter(|t| {
                filter
                    .wallet_id
                    .is_none_or(|w| t.from_wallet_id == w || t.to_wallet_id == w)
                    && filter.relationship_id.is_none_or(|r| t.relationship_id == r)
            })
            .map(|t| t.clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let mut page = Page::from_vec(items, page);
        page.items = page
            .items
            .into_iter()
            .map(|t| self.with_current_status(t))
            .collect();
        page
    }

    fn with_current_status(&self, mut transfer: InternalTransfer) -> InternalTransfer {
        if let Ok(tx) = self.transactions.get(transfer.transaction_id) {
            transfer.status = tx.status;
        }
        transfer
    }
}
