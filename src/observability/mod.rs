//! Logs and metrics.
//!
//! Engine components log state changes through `tracing` with entity ids as
//! fields and record counters and histograms through [`metrics`]. The
//! binary installs the subscriber and the Prometheus exporter; library users
//! and tests get no-op recorders unless they install their own.

pub mod logging;
pub mod metrics;
