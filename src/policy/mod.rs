//! Policy resolution and daily allowance accounting.

pub mod allowance;
pub mod resolver;
pub mod types;

pub use resolver::PolicyResolver;
pub use types::{
    Admission, EffectivePolicy, Grant, NewPoolPolicy, PolicyRules, PolicyScope, PolicySource,
    PoolPolicy, PoolPolicyFilter, WalletPolicy,
};
