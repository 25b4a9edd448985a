//! API handlers grouped by resource.

pub mod batches;
pub mod cold_storage;
pub mod health;
pub mod mpc;
pub mod policies;
pub mod pools;
pub mod transactions;

use serde::Deserialize;

use crate::pagination::PageRequest;

/// `offset` / `limit` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        PageRequest::new(params.offset, params.limit)
    }
}

/// Body of approve actions.
#[derive(Debug, Clone, Deserialize)]
pub struct ApproveBody {
    pub approver_id: String,
    #[serde(default)]
    pub mfa_verified: bool,
}

/// Body of reject actions.
#[derive(Debug, Clone, Deserialize)]
pub struct RejectBody {
    pub approver_id: String,
    pub reason: String,
}

/// Body of cancel actions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: Option<String>,
}
