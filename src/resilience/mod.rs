//! Resilience helpers for calls to external collaborators.
//!
//! The dispatcher retries broadcaster submissions with [`backoff`]; after the
//! configured attempts the transaction is marked failed and waits for an
//! explicit retry.

pub mod backoff;
