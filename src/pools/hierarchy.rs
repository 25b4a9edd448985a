//! Pool hierarchy index.
//!
//! # Responsibilities
//! - Keep the parent to children adjacency of pooled wallets
//! - Refuse edges that would close a cycle or give a child a second parent
//! - Serve tree snapshots that never observe a half-applied edit
//!
//! # Concurrency
//! Readers load an immutable snapshot through `ArcSwap`. Writers serialize on
//! a mutex, copy the snapshot, apply one edit and publish the new version.

use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::events::{EngineEvent, EventBus};
use crate::error::{EngineError, EngineResult};
use crate::observability::metrics;
use crate::pagination::{Page, PageRequest};
use crate::pools::types::{
    HierarchyNode, NewRelationship, PooledWalletRelationship, RelationshipFilter,
    RelationshipStatus,
};

#[derive(Debug, Clone, Default)]
struct Snapshot {
    relationships: HashMap<Uuid, PooledWalletRelationship>,
    /// parent wallet -> relationship ids, archived ones included
    children: HashMap<Uuid, Vec<Uuid>>,
    /// child wallet -> its single non-archived relationship
    bound_parent: HashMap<Uuid, Uuid>,
}

impl Snapshot {
    fn parent_of(&self, wallet_id: Uuid) -> Option<Uuid> {
        self.bound_parent
            .get(&wallet_id)
            .and_then(|rel_id| self.relationships.get(rel_id))
            .map(|rel| rel.parent_wallet_id)
    }
}

pub struct PoolHierarchy {
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    max_depth: usize,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl PoolHierarchy {
    pub fn new(max_depth: usize, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
            max_depth,
            clock,
            events,
        }
    }

    /// Link `child` under `parent`.
    pub fn create_relationship(&self, request: NewRelationship) -> EngineResult<PooledWalletRelationship> {
        let parent = request.parent_wallet_id;
        let child = request.child_wallet_id;
        if parent == child {
            return Err(EngineError::CycleDetected { parent, child });
        }
        if request.relation_type.trim().is_empty() {
            return Err(EngineError::Validation("relation_type must not be empty".into()));
        }

        let _guard = self.writer.lock().expect("pool hierarchy writer mutex poisoned");
        let snapshot = self.current.load_full();

        if let Some(existing) = snapshot.parent_of(child) {
            return Err(EngineError::ParentAlreadyAssigned {
                child,
                existing_parent: existing,
            });
        }

        // ancestor walk from the new parent; reaching the child means a loop
        let mut cursor = parent;
        let mut depth = 1;
        while let Some(ancestor) = snapshot.parent_of(cursor) {
            if ancestor == child {
                return Err(EngineError::CycleDetected { parent, child });
            }
            depth += 1;
            if depth > self.max_depth {
                return Err(EngineError::HierarchyDepthExceeded {
                    max_depth: self.max_depth,
                });
            }
            cursor = ancestor;
        }

        let now = self.clock.now();
        let relationship = PooledWalletRelationship {
            id: Uuid::new_v4(),
            parent_wallet_id: parent,
            child_wallet_id: child,
            relation_type: request.relation_type,
            permission_level: request.permission_level,
            status: RelationshipStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut next = (*snapshot).clone();
        next.relationships.insert(relationship.id, relationship.clone());
        next.children.entry(parent).or_default().push(relationship.id);
        next.bound_parent.insert(child, relationship.id);
        self.current.store(Arc::new(next));

        tracing::info!(
            relationship_id = %relationship.id,
            parent_wallet_id = %parent,
            child_wallet_id = %child,
            "Pool relationship created"
        );
        metrics::record_transition("relationship", "none", RelationshipStatus::Active.as_str());
        self.publish(&relationship);
        Ok(relationship)
    }

    /// Change a relationship's status. Archived edges stay archived.
    pub fn update_status(
        &self,
        relationship_id: Uuid,
        status: RelationshipStatus,
    ) -> EngineResult<PooledWalletRelationship> {
        let _guard = self.writer.lock().expect("pool hierarchy writer mutex poisoned");
        let snapshot = self.current.load_full();
        let existing = snapshot
            .relationships
            .get(&relationship_id)
            .ok_or_else(|| EngineError::not_found("relationship", relationship_id))?;

        if existing.status == status {
            return Ok(existing.clone());
        }
        if existing.status == RelationshipStatus::Archived {
            return Err(EngineError::InvalidStateTransition {
                entity: "relationship",
                id: relationship_id,
                from: existing.status.as_str().to_string(),
                action: "update",
            });
        }

        let from = existing.status;
        let mut updated = existing.clone();
        updated.status = status;
        updated.updated_at = self.clock.now();

        let mut next = (*snapshot).clone();
        if status == RelationshipStatus::Archived {
            next.bound_parent.remove(&updated.child_wallet_id);
        }
        next.relationships.insert(relationship_id, updated.clone());
        self.current.store(Arc::new(next));

        tracing::info!(
            relationship_id = %relationship_id,
            from = from.as_str(),
            to = status.as_str(),
            "Pool relationship status changed"
        );
        metrics::record_transition("relationship", from.as_str(), status.as_str());
        self.publish(&updated);
        Ok(updated)
    }

    pub fn get(&self, relationship_id: Uuid) -> EngineResult<PooledWalletRelationship> {
        self.current
            .load()
            .relationships
            .get(&relationship_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("relationship", relationship_id))
    }

    pub fn list(&self, filter: &RelationshipFilter, page: PageRequest) -> Page<PooledWalletRelationship> {
        let snapshot = self.current.load();
        let mut items: Vec<_> = snapshot
            .relationships
            .values()
            .filter(|rel| filter.matches(rel))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Page::from_vec(items, page)
    }

    /// Tree of non-archived edges under `parent`, from one consistent snapshot.
    pub fn hierarchy(&self, parent: Uuid) -> HierarchyNode {
        let snapshot = self.current.load();
        let mut visited = HashSet::new();
        build_node(&snapshot, parent, None, &mut visited)
    }

    /// The child's active relationship, if any.
    pub fn active_parent(&self, child: Uuid) -> Option<PooledWalletRelationship> {
        let snapshot = self.current.load();
        snapshot
            .bound_parent
            .get(&child)
            .and_then(|rel_id| snapshot.relationships.get(rel_id))
            .filter(|rel| rel.status == RelationshipStatus::Active)
            .cloned()
    }

    /// Active relationship linking the two wallets in either direction.
    pub fn relationship_between(&self, a: Uuid, b: Uuid) -> Option<PooledWalletRelationship> {
        self.active_parent(b)
            .filter(|rel| rel.parent_wallet_id == a)
            .or_else(|| self.active_parent(a).filter(|rel| rel.parent_wallet_id == b))
    }

    pub fn len(&self) -> usize {
        self.current.load().relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, rel: &PooledWalletRelationship) {
        self.events.publish(EngineEvent::RelationshipChanged {
            relationship_id: rel.id,
            parent_wallet_id: rel.parent_wallet_id,
            child_wallet_id: rel.child_wallet_id,
            status: rel.status,
            at: rel.updated_at,
        });
    }
}

fn build_node(
    snapshot: &Snapshot,
    wallet_id: Uuid,
    relationship: Option<PooledWalletRelationship>,
    visited: &mut HashSet<Uuid>,
) -> HierarchyNode {
    visited.insert(wallet_id);
    let mut children = Vec::new();
    if let Some(rel_ids) = snapshot.children.get(&wallet_id) {
        for rel_id in rel_ids {
            let Some(rel) = snapshot.relationships.get(rel_id) else { continue };
            if rel.status == RelationshipStatus::Archived || visited.contains(&rel.child_wallet_id) {
                continue;
            }
            children.push(build_node(snapshot, rel.child_wallet_id, Some(rel.clone()), visited));
        }
    }
    HierarchyNode {
        wallet_id,
        relationship,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pools::types::PermissionLevel;
    use proptest::prelude::*;

    fn index(max_depth: usize) -> PoolHierarchy {
        PoolHierarchy::new(max_depth, Arc::new(ManualClock::starting_now()), EventBus::new(16))
    }

    fn link(parent: Uuid, child: Uuid) -> NewRelationship {
        NewRelationship {
            parent_wallet_id: parent,
            child_wallet_id: child,
            relation_type: "sub_account".into(),
            permission_level: PermissionLevel::Full,
        }
    }

    #[test]
    fn test_cycle_rejected() {
        let pools = index(16);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        pools.create_relationship(link(a, b)).unwrap();
        pools.create_relationship(link(b, c)).unwrap();

        let err = pools.create_relationship(link(c, a)).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
        let err = pools.create_relationship(link(a, a)).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
    }

    #[test]
    fn test_second_parent_needs_archive() {
        let pools = index(16);
        let (p1, p2, child) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let first = pools.create_relationship(link(p1, child)).unwrap();

        let err = pools.create_relationship(link(p2, child)).unwrap_err();
        assert!(matches!(err, EngineError::ParentAlreadyAssigned { existing_parent, .. } if existing_parent == p1));

        // suspended still binds the child
        pools.update_status(first.id, RelationshipStatus::Suspended).unwrap();
        assert!(pools.create_relationship(link(p2, child)).is_err());

        pools.update_status(first.id, RelationshipStatus::Archived).unwrap();
        pools.create_relationship(link(p2, child)).unwrap();
        assert_eq!(pools.active_parent(child).unwrap().parent_wallet_id, p2);
    }

    #[test]
    fn test_archived_is_final() {
        let pools = index(16);
        let rel = pools.create_relationship(link(Uuid::new_v4(), Uuid::new_v4())).unwrap();
        pools.update_status(rel.id, RelationshipStatus::Archived).unwrap();
        let err = pools.update_status(rel.id, RelationshipStatus::Active).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_depth_guard() {
        let pools = index(2);
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        pools.create_relationship(link(a, b)).unwrap();
        pools.create_relationship(link(b, c)).unwrap();
        let err = pools.create_relationship(link(c, d)).unwrap_err();
        assert!(matches!(err, EngineError::HierarchyDepthExceeded { max_depth: 2 }));
    }

    #[test]
    fn test_hierarchy_snapshot() {
        let pools = index(16);
        let (root, a, b, a1) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        pools.create_relationship(link(root, a)).unwrap();
        let rel_b = pools.create_relationship(link(root, b)).unwrap();
        pools.create_relationship(link(a, a1)).unwrap();

        let tree = pools.hierarchy(root);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.wallet_ids().len(), 4);

        pools.update_status(rel_b.id, RelationshipStatus::Archived).unwrap();
        let tree = pools.hierarchy(root);
        assert_eq!(tree.wallet_ids(), vec![root, a, a1]);
    }

    #[test]
    fn test_relationship_between_either_direction() {
        let pools = index(16);
        let (parent, child) = (Uuid::new_v4(), Uuid::new_v4());
        let rel = pools.create_relationship(link(parent, child)).unwrap();
        assert_eq!(pools.relationship_between(parent, child).unwrap().id, rel.id);
        assert_eq!(pools.relationship_between(child, parent).unwrap().id, rel.id);

        pools.update_status(rel.id, RelationshipStatus::Inactive).unwrap();
        assert!(pools.relationship_between(parent, child).is_none());
    }

    proptest! {
        #[test]
        fn prop_hierarchy_never_revisits(edges in proptest::collection::vec((0usize..8, 0usize..8), 0..40)) {
            let pools = index(16);
            let wallets: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
            for (p, c) in edges {
                let _ = pools.create_relationship(link(wallets[p], wallets[c]));
            }
            for root in &wallets {
                let ids = pools.hierarchy(*root).wallet_ids();
                let unique: HashSet<_> = ids.iter().collect();
                prop_assert_eq!(unique.len(), ids.len());
            }
        }
    }
}
