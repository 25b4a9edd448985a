//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, risk threshold within 0..=100)
//! - Reject rule combinations that can never be satisfied
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, including on hot reload

use std::fmt;
use crate::config::schema::{ColdStorageRule, EngineConfig, MAX_PERIOD_SECS};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.policy.daily_window_secs == 0 || config.policy.daily_window_secs > MAX_PERIOD_SECS {
        errors.push(ValidationError::new(
            "policy.daily_window_secs",
            format!("must be between 1 and {}", MAX_PERIOD_SECS),
        ));
    }

    if config.policy.max_batch_size == 0 {
        errors.push(ValidationError::new("policy.max_batch_size", "must be greater than 0"));
    }

    if config.risk.escalation_threshold > 100 {
        errors.push(ValidationError::new(
            "risk.escalation_threshold",
            "must be between 0 and 100",
        ));
    }

    if config.risk.escalated_min_approvers == 0 {
        errors.push(ValidationError::new(
            "risk.escalated_min_approvers",
            "must be at least 1",
        ));
    }

    if config.cold_storage.timer_poll_interval_ms == 0 {
        errors.push(ValidationError::new(
            "cold_storage.timer_poll_interval_ms",
            "must be greater than 0",
        ));
    }

    validate_cold_rule("cold_storage.withdrawal", &config.cold_storage.withdrawal, &mut errors);
    validate_cold_rule(
        "cold_storage.cold_to_warm_transfer",
        &config.cold_storage.cold_to_warm_transfer,
        &mut errors,
    );
    validate_cold_rule("cold_storage.key_recovery", &config.cold_storage.key_recovery, &mut errors);

    if config.pools.max_depth == 0 {
        errors.push(ValidationError::new("pools.max_depth", "must be at least 1"));
    }

    if config.execution.dispatch_interval_ms == 0 {
        errors.push(ValidationError::new(
            "execution.dispatch_interval_ms",
            "must be greater than 0",
        ));
    }

    if config.execution.max_attempts == 0 {
        errors.push(ValidationError::new("execution.max_attempts", "must be at least 1"));
    }

    if config.execution.base_delay_ms > config.execution.max_delay_ms {
        errors.push(ValidationError::new(
            "execution.base_delay_ms",
            "must not exceed execution.max_delay_ms",
        ));
    }

    if config.blockchain.enabled && config.blockchain.rpc_url.parse::<url::Url>().is_err() {
        errors.push(ValidationError::new(
            "blockchain.rpc_url",
            format!("'{}' is not a valid URL", config.blockchain.rpc_url),
        ));
    }

    if config.events.channel_capacity == 0 {
        errors.push(ValidationError::new("events.channel_capacity", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_cold_rule(prefix: &str, rule: &ColdStorageRule, errors: &mut Vec<ValidationError>) {
    if rule.required_approvers == 0 {
        errors.push(ValidationError::new(
            format!("{}.required_approvers", prefix),
            "must be at least 1",
        ));
    }
    if rule.waiting_period_secs > MAX_PERIOD_SECS {
        errors.push(ValidationError::new(
            format!("{}.waiting_period_secs", prefix),
            format!("must not exceed {}", MAX_PERIOD_SECS),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_problem() {
        let mut config = EngineConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.cold_storage.key_recovery.required_approvers = 0;
        config.execution.base_delay_ms = 5000;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "cold_storage.key_recovery.required_approvers",
                "execution.base_delay_ms",
            ]
        );
    }

    #[test]
    fn test_periods_are_bounded() {
        let mut config = EngineConfig::default();
        config.policy.daily_window_secs = u64::MAX;
        config.cold_storage.withdrawal.waiting_period_secs = MAX_PERIOD_SECS + 1;
        config.cold_storage.key_recovery.waiting_period_secs = MAX_PERIOD_SECS;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["policy.daily_window_secs", "cold_storage.withdrawal.waiting_period_secs"]
        );
    }
}
