//! Custody transaction approval and policy engine.
//!
//! Wallet and pool policies gate admission, approvers vote toward a quorum,
//! approved transactions are handed to an external signer, and cold storage
//! requests pass through waiting periods and physical verification.

pub mod admin;
pub mod amount;
pub mod approvals;
pub mod batches;
pub mod blockchain;
pub mod clock;
pub mod cold_storage;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod http;
pub mod lifecycle;
pub mod mpc;
pub mod observability;
pub mod pagination;
pub mod policy;
pub mod pools;
pub mod resilience;
pub mod transactions;

pub use config::EngineConfig;
pub use engine::CustodyEngine;
pub use error::{EngineError, EngineResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
