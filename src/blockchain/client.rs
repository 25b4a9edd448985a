//! Read-only JSON-RPC access for confirmation tracking.
//!
//! Providers are tried in configured order; each call has its own timeout.

use alloy::primitives::TxHash;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::types::{
    classify_receipt, BlockchainConfig, BlockchainError, BlockchainResult, ChainId,
    ConfirmationStatus,
};

#[derive(Clone)]
pub struct BlockchainClient {
    /// Primary first, then failovers.
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    config: BlockchainConfig,
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Build the client. An unreachable chain is logged, not fatal.
    pub async fn new(config: BlockchainConfig) -> BlockchainResult<Self> {
        let primary: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e| BlockchainError::Rpc(format!("invalid rpc_url '{}': {}", config.rpc_url, e)))?;
        let failovers = config.failover_urls.iter().filter_map(|raw| match raw.parse::<url::Url>() {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(url = %raw, error = %e, "Skipping invalid failover RPC URL");
                None
            }
        });
        let providers = std::iter::once(primary)
            .chain(failovers)
            .map(|url| Arc::new(ProviderBuilder::new().connect_http(url)) as Arc<dyn Provider + Send + Sync>)
            .collect();

        let client = Self {
            providers,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs.max(1)),
            config,
        };

        if let Err(e) = client.verify_chain_id().await {
            tracing::warn!(chain_id = client.config.chain_id, error = %e, "Chain verification failed; confirmations wait for the RPC");
        } else {
            tracing::info!(rpc_url = %client.config.rpc_url, chain_id = client.config.chain_id, "Blockchain client ready");
        }
        Ok(client)
    }

    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        self.with_failover("chain_id", |p| p.get_chain_id()).await.map(ChainId)
    }

    pub async fn get_block_number(&self) -> BlockchainResult<u64> {
        self.with_failover("block_number", |p| p.get_block_number()).await
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> BlockchainResult<Option<TransactionReceipt>> {
        self.with_failover("receipt", |p| p.get_transaction_receipt(tx_hash)).await
    }

    /// Run `call` against each provider in order until one answers in time.
    async fn with_failover<T, E, F, Fut>(&self, method: &'static str, call: F) -> BlockchainResult<T>
    where
        F: Fn(&(dyn Provider + Send + Sync)) -> Fut,
        Fut: IntoFuture<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        for (idx, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.as_ref())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => tracing::warn!(provider_idx = idx, method, error = %e, "RPC call failed"),
                Err(_) => tracing::warn!(provider_idx = idx, method, "RPC call timed out"),
            }
        }
        Err(BlockchainError::Rpc(format!(
            "{} failed on all {} providers",
            method,
            self.providers.len()
        )))
    }

    /// One non-blocking confirmation check.
    pub async fn confirmation_status(&self, tx_hash: TxHash) -> BlockchainResult<ConfirmationStatus> {
        let Some(receipt) = self.get_transaction_receipt(tx_hash).await? else {
            return Ok(ConfirmationStatus::Pending);
        };
        let current_block = self.get_block_number().await?;
        Ok(classify_receipt(
            receipt.status(),
            receipt.block_number.unwrap_or(current_block),
            current_block,
            self.config.confirmation_blocks,
            receipt.gas_used,
            receipt.effective_gas_price,
        ))
    }

    /// True when the block height can be read from any provider.
    pub async fn is_healthy(&self) -> bool {
        self.get_block_number().await.is_ok()
    }

    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> BlockchainConfig {
        BlockchainConfig {
            enabled: true,
            rpc_url: "http://127.0.0.1:1".to_string(),
            failover_urls: vec!["not a url".to_string()],
            chain_id: 31337,
            rpc_timeout_secs: 1,
            confirmation_blocks: 1,
            poll_interval_ms: 100,
        }
    }

    #[tokio::test]
    async fn test_unreachable_rpc_degrades_gracefully() {
        let client = BlockchainClient::new(unreachable_config()).await.unwrap();
        assert!(!client.is_healthy().await);
        let err = client.get_chain_id().await.unwrap_err();
        assert!(err.to_string().contains("chain_id failed on all 1 providers"));
    }

    #[tokio::test]
    async fn test_invalid_primary_url_rejected() {
        let mut config = unreachable_config();
        config.rpc_url = "::nope::".to_string();
        assert!(matches!(BlockchainClient::new(config).await, Err(BlockchainError::Rpc(_))));
    }
}
