//! Cold storage workflow: waiting period, physical verification and
//! multi-party approval for cold wallet operations.

pub mod timer;
pub mod types;
pub mod workflow;

pub use timer::ColdStorageTimer;
pub use types::{
    ColdApprovalOutcome, ColdStorageFilter, ColdStorageRequest, ColdStorageRequestType,
    ColdStorageStatus, NewColdStorageRequest,
};
pub use workflow::ColdStorageWorkflow;
