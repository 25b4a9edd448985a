//! TOML configuration types. Every section is optional.

use serde::{Deserialize, Serialize};

/// Root configuration for the custody engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the HTTP API listens.
    pub listener: ListenerConfig,

    /// Per-request deadline.
    pub timeouts: TimeoutConfig,

    /// Body size cap.
    pub security: SecurityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Transaction admission policy defaults.
    pub policy: PolicyConfig,

    /// Risk-based approval escalation.
    pub risk: RiskConfig,

    /// Cold storage workflow rules per request type.
    pub cold_storage: ColdStorageConfig,

    /// Pool hierarchy limits.
    pub pools: PoolConfig,

    /// Execution dispatch and broadcast retries.
    pub execution: ExecutionConfig,

    /// Confirmation tracking over JSON-RPC.
    pub blockchain: BlockchainConfig,

    /// Change notification stream.
    pub events: EventsConfig,

    /// Log format and the Prometheus exporter.
    pub observability: ObservabilityConfig,
}

impl EngineConfig {
    /// Settings that may change at runtime through hot reload.
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            policy: self.policy.clone(),
            risk: self.risk.clone(),
            cold_storage: self.cold_storage.clone(),
            execution: self.execution.clone(),
        }
    }
}

/// Subset of the configuration that is swapped atomically on reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeSettings {
    pub policy: PolicyConfig,
    pub risk: RiskConfig,
    pub cold_storage: ColdStorageConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// `host:port` for the API.
    pub bind_address: String,

    /// Serve HTTPS when set.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// PEM certificate chain and private key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    pub cert_path: String,

    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole request, including the handler, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Largest accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024,
        }
    }
}

/// Upper bound for configured and policy periods in seconds (ten years).
pub const MAX_PERIOD_SECS: u64 = 10 * 365 * 24 * 3600;

/// Placeholder key; the server warns at startup while it is in use.
pub const DEFAULT_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/admin` routes.
    pub enabled: bool,

    /// Expected `Authorization: Bearer` value.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: DEFAULT_ADMIN_KEY.to_string(),
        }
    }
}

/// Transaction admission defaults.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Approvals required when no wallet or pool policy sets `min_approvers`.
    pub default_min_approvers: u32,

    /// Length of the daily-limit accounting window in seconds.
    pub daily_window_secs: u64,

    /// Whether the initiator of a transaction may approve it.
    pub allow_self_approval: bool,

    /// Maximum number of transactions in one batch.
    pub max_batch_size: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_min_approvers: 1,
            daily_window_secs: 24 * 3600,
            allow_self_approval: false,
            max_batch_size: 100,
        }
    }
}

/// Risk escalation configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    /// Risk score (0-100) at or above which approvals are escalated.
    pub escalation_threshold: u8,

    /// Minimum approvals for escalated transactions.
    pub escalated_min_approvers: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: 70,
            escalated_min_approvers: 3,
        }
    }
}

/// Rules frozen onto a cold storage request when it is created.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ColdStorageRule {
    /// Mandatory wait before approvals are accepted, in seconds.
    pub waiting_period_secs: u64,

    /// Distinct approvers needed.
    pub required_approvers: u32,

    /// Whether a physical verification step must complete before approval.
    pub physical_verification_required: bool,
}

impl Default for ColdStorageRule {
    fn default() -> Self {
        Self {
            waiting_period_secs: 24 * 3600,
            required_approvers: 3,
            physical_verification_required: true,
        }
    }
}

/// Cold storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ColdStorageConfig {
    /// How often the timer poller promotes expired waiting periods, in milliseconds.
    pub timer_poll_interval_ms: u64,

    pub withdrawal: ColdStorageRule,
    pub cold_to_warm_transfer: ColdStorageRule,
    pub key_recovery: ColdStorageRule,
}

impl Default for ColdStorageConfig {
    fn default() -> Self {
        Self {
            timer_poll_interval_ms: 1000,
            withdrawal: ColdStorageRule::default(),
            cold_to_warm_transfer: ColdStorageRule {
                waiting_period_secs: 12 * 3600,
                required_approvers: 2,
                physical_verification_required: false,
            },
            key_recovery: ColdStorageRule {
                waiting_period_secs: 72 * 3600,
                required_approvers: 3,
                physical_verification_required: true,
            },
        }
    }
}

/// Pool hierarchy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum ancestor chain walked when validating a new relationship.
    pub max_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_depth: 16 }
    }
}

/// Execution dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Interval of the dispatcher sweep (promotion and expiry), in milliseconds.
    pub dispatch_interval_ms: u64,

    /// Broadcast attempts before a transaction is marked failed.
    pub max_attempts: u32,

    /// First retry delay in milliseconds, doubled per attempt.
    pub base_delay_ms: u64,

    /// Retry delay ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 1000,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// JSON-RPC confirmation tracking. Disabled by default; completion is then
/// reported through the API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// Enable the RPC client and confirmation watcher.
    pub enabled: bool,

    /// Primary endpoint.
    pub rpc_url: String,

    /// Tried in order when the primary fails.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Expected chain id, checked once at startup.
    pub chain_id: u64,

    /// Per-call deadline in seconds.
    pub rpc_timeout_secs: u64,

    /// Blocks on top of the inclusion block before a transaction completes.
    pub confirmation_blocks: u32,

    /// Receipt polling interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            confirmation_blocks: 3,
            poll_interval_ms: 5000,
        }
    }
}

/// Change notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers skip lagged events.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default level when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Install the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter listen address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [risk]
            escalation_threshold = 80
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.risk.escalation_threshold, 80);
        assert_eq!(config.risk.escalated_min_approvers, 3);
        assert_eq!(config.policy.default_min_approvers, 1);
        assert_eq!(config.cold_storage.key_recovery.waiting_period_secs, 72 * 3600);
    }

    #[test]
    fn test_cold_storage_rule_section() {
        let config: EngineConfig = toml::from_str(
            r#"
            [cold_storage.withdrawal]
            waiting_period_secs = 60
            required_approvers = 2
            physical_verification_required = false
            "#,
        )
        .unwrap();

        assert_eq!(config.cold_storage.withdrawal.waiting_period_secs, 60);
        assert!(!config.cold_storage.withdrawal.physical_verification_required);
        // untouched sections keep their defaults
        assert_eq!(config.cold_storage.cold_to_warm_transfer.required_approvers, 2);
    }
}
