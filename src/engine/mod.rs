//! Engine composition root.
//!
//! # Data Flow
//! ```text
//! TransactionService ──admit──► PolicyResolver ──► PoolHierarchy
//!        │ vote                      ▲
//!        ▼                           │
//!   ApprovalLedger ◄──── ColdStorageWorkflow ──► ShareRegistry (MPC)
//!        │ quorum
//!        ▼
//!   ExecutionGate ──► Dispatcher ──► Broadcaster ──► ConfirmationWatcher
//!        │
//!        └──► BatchBook (refresh on member change) ──► EventBus
//! ```
//!
//! Every component shares one [`Clock`], one [`EventBus`] and the hot
//! reloadable [`RuntimeSettings`].

pub mod events;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::approvals::ApprovalLedger;
use crate::batches::{BatchBook, BatchCoordinator};
use crate::blockchain::{BlockchainClient, ConfirmationWatcher};
use crate::clock::{Clock, SystemClock};
use crate::cold_storage::{ColdStorageTimer, ColdStorageWorkflow};
use crate::config::{BlockchainConfig, EngineConfig, RuntimeSettings};
use crate::execution::{Broadcaster, DefaultGate, Dispatcher, ExternalBroadcaster};
use crate::lifecycle::Shutdown;
use crate::mpc::ShareRegistry;
use crate::policy::PolicyResolver;
use crate::pools::{InternalTransferService, PoolHierarchy};
use crate::transactions::{TransactionService, TransactionStats};

pub use events::{EngineEvent, EventBus};

/// Counters for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub started_at: DateTime<Utc>,
    pub transactions: TransactionStats,
    pub batches: usize,
    pub cold_storage_requests: usize,
    pub pool_relationships: usize,
    pub event_subscribers: usize,
}

pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
}

impl EngineBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the default event-publishing broadcaster.
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn build(self) -> CustodyEngine {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let settings = Arc::new(ArcSwap::from_pointee(config.runtime_settings()));
        let events = EventBus::new(config.events.channel_capacity);

        let (broadcaster, readiness): (Arc<dyn Broadcaster>, Option<Arc<AtomicBool>>) =
            match self.broadcaster {
                Some(custom) => (custom, None),
                None => {
                    let external = ExternalBroadcaster::new(events.clone(), clock.clone());
                    let readiness = external.readiness();
                    (Arc::new(external), Some(readiness))
                }
            };

        let ledger = Arc::new(ApprovalLedger::new(clock.clone()));
        let pools = Arc::new(PoolHierarchy::new(config.pools.max_depth, clock.clone(), events.clone()));
        let policies = Arc::new(PolicyResolver::new(pools.clone(), settings.clone(), clock.clone()));
        let shares = Arc::new(ShareRegistry::new(clock.clone()));
        let gate = Arc::new(DefaultGate::new(broadcaster.clone(), shares.clone()));
        let book = Arc::new(BatchBook::new(events.clone(), clock.clone()));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let transactions = Arc::new(TransactionService::new(
            ledger.clone(),
            policies.clone(),
            book.clone(),
            gate,
            queue_tx,
            events.clone(),
            settings.clone(),
            clock.clone(),
        ));
        let batches = Arc::new(BatchCoordinator::new(
            book,
            transactions.clone(),
            settings.clone(),
            clock.clone(),
        ));
        let cold_storage = Arc::new(ColdStorageWorkflow::new(
            ledger,
            shares.clone(),
            events.clone(),
            settings.clone(),
            clock.clone(),
        ));
        let transfers = Arc::new(InternalTransferService::new(
            pools.clone(),
            transactions.clone(),
            clock.clone(),
        ));

        CustodyEngine {
            started_at: clock.now(),
            settings,
            clock,
            events,
            pools,
            policies,
            shares,
            broadcaster,
            readiness,
            transactions,
            batches,
            cold_storage,
            transfers,
            queue: Mutex::new(Some(queue_rx)),
            blockchain: config.blockchain,
            timer_poll_interval_ms: config.cold_storage.timer_poll_interval_ms,
        }
    }
}

pub struct CustodyEngine {
    started_at: DateTime<Utc>,
    settings: Arc<ArcSwap<RuntimeSettings>>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    pools: Arc<PoolHierarchy>,
    policies: Arc<PolicyResolver>,
    shares: Arc<ShareRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    readiness: Option<Arc<AtomicBool>>,
    transactions: Arc<TransactionService>,
    batches: Arc<BatchCoordinator>,
    cold_storage: Arc<ColdStorageWorkflow>,
    transfers: Arc<InternalTransferService>,
    queue: Mutex<Option<mpsc::UnboundedReceiver<Uuid>>>,
    blockchain: BlockchainConfig,
    timer_poll_interval_ms: u64,
}

impl CustodyEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            clock: None,
            broadcaster: None,
        }
    }

    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    /// Start the dispatcher, cold storage timer and (when enabled) the
    /// confirmation watcher. Calling it twice starts no second dispatcher.
    pub async fn spawn_background(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let queue = self.queue.lock().expect("dispatch queue mutex poisoned").take();
        if let Some(queue) = queue {
            let dispatcher = Dispatcher::new(
                self.transactions.clone(),
                self.broadcaster.clone(),
                self.settings.clone(),
                queue,
            );
            handles.push(tokio::spawn(dispatcher.run(shutdown.subscribe())));
        }

        let timer = ColdStorageTimer::new(self.cold_storage.clone(), self.timer_poll_interval_ms);
        handles.push(tokio::spawn(timer.run(shutdown.subscribe())));

        if self.blockchain.enabled {
            match BlockchainClient::new(self.blockchain.clone()).await {
                Ok(client) => {
                    let readiness = self
                        .readiness
                        .clone()
                        .unwrap_or_else(|| Arc::new(AtomicBool::new(true)));
                    let watcher = ConfirmationWatcher::new(client, self.transactions.clone(), readiness);
                    handles.push(tokio::spawn(watcher.run(shutdown.subscribe())));
                }
                Err(e) => tracing::error!(error = %e, "Blockchain client unavailable; confirmations disabled"),
            }
        }

        handles
    }

    pub fn transactions(&self) -> &Arc<TransactionService> {
        &self.transactions
    }

    pub fn batches(&self) -> &Arc<BatchCoordinator> {
        &self.batches
    }

    pub fn cold_storage(&self) -> &Arc<ColdStorageWorkflow> {
        &self.cold_storage
    }

    pub fn pools(&self) -> &Arc<PoolHierarchy> {
        &self.pools
    }

    pub fn transfers(&self) -> &Arc<InternalTransferService> {
        &self.transfers
    }

    pub fn policies(&self) -> &Arc<PolicyResolver> {
        &self.policies
    }

    pub fn shares(&self) -> &Arc<ShareRegistry> {
        &self.shares
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &Arc<ArcSwap<RuntimeSettings>> {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            started_at: self.started_at,
            transactions: self.transactions.stats(),
            batches: self.batches.len(),
            cold_storage_requests: self.cold_storage.len(),
            pool_relationships: self.pools.len(),
            event_subscribers: self.events.subscriber_count(),
        }
    }
}
