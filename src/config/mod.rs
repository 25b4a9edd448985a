//! Engine configuration.
//!
//! ```text
//! TOML file ─► loader.rs ─► validation.rs ─► EngineConfig
//!                                               │ runtime_settings()
//!                                               ▼
//!                          Arc<ArcSwap<RuntimeSettings>> shared by the engine
//!
//! watcher.rs (notify) ─► reload + validate ─► apply_updates swaps settings
//! ```
//!
//! Only policy defaults, risk escalation, cold storage rules and execution
//! tuning are hot. Listener, admin, blockchain and event channel settings are
//! read once at startup. Every field has a default so an empty file is valid.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, BlockchainConfig, ColdStorageConfig, ColdStorageRule, EngineConfig,
    ExecutionConfig, ListenerConfig, LogFormat, ObservabilityConfig, PolicyConfig, RiskConfig,
    RuntimeSettings,
};
