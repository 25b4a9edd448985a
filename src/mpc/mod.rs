//! MPC signing coordination.

pub mod shares;

pub use shares::{MpcKeyShare, ShareRegistry, ThresholdOracle, ThresholdStatus};
