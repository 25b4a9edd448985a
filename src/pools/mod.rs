//! Pooled wallets: the parent/child forest, and transfers along its edges.

pub mod hierarchy;
pub mod transfers;
pub mod types;

pub use hierarchy::PoolHierarchy;
pub use transfers::{InternalTransferService, TransferFilter};
pub use types::{
    HierarchyNode, InternalTransfer, InternalTransferRequest, NewRelationship, PermissionLevel,
    PooledWalletRelationship, RelationshipFilter, RelationshipStatus,
};
