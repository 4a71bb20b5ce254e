//! # Transaction
//!
//! A copy-on-write view over one committed graph snapshot.
//!
//! Every write goes to the transaction's [`Overlay`] and is recorded in its
//! [`MutationLog`]; reads consult the overlay first and fall back to the
//! snapshot. Nothing is visible to other readers until the store commits the
//! transaction. Dropping a transaction discards it without a trace.
//!
//! Identity keys are enforced on creation: a second live node with the same
//! [`NodeKey`] is a `ConstraintViolation`.

use crate::graph::{Graph, GraphView, Overlay};
use crate::mutation::{Mutation, MutationLog};
use crate::{
    BodyId, EntityKind, NeuroError, Node, NodeId, NodeKey, Properties, PropertyValue, RelId,
    RelKind, Relationship, Timestamp,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// ID ALLOCATION
// =============================================================================

/// Store-wide id counters shared by all transactions.
///
/// Ids taken by an aborted transaction are never reused.
#[derive(Debug)]
pub struct IdAllocator {
    next_node: AtomicU64,
    next_rel: AtomicU64,
}

impl IdAllocator {
    #[must_use]
    pub fn new(next_node: u64, next_rel: u64) -> Self {
        Self {
            next_node: AtomicU64::new(next_node),
            next_rel: AtomicU64::new(next_rel),
        }
    }

    fn node(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    fn rel(&self) -> RelId {
        RelId(self.next_rel.fetch_add(1, Ordering::Relaxed))
    }

    /// Current `(next_node, next_rel)` counters.
    #[must_use]
    pub fn peek(&self) -> (u64, u64) {
        (
            self.next_node.load(Ordering::Relaxed),
            self.next_rel.load(Ordering::Relaxed),
        )
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// An open unit of work against the store.
#[derive(Debug)]
pub struct Transaction {
    base: Arc<Graph>,
    base_version: u64,
    timestamp: Timestamp,
    ids: Arc<IdAllocator>,
    overlay: Overlay,
    log: MutationLog,
}

impl Transaction {
    pub(crate) fn new(
        base: Arc<Graph>,
        base_version: u64,
        timestamp: Timestamp,
        ids: Arc<IdAllocator>,
    ) -> Self {
        Self {
            base,
            base_version,
            timestamp,
            ids,
            overlay: Overlay::default(),
            log: MutationLog::new(),
        }
    }

    /// The time every entity touched by this transaction is stamped with.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Store version of the snapshot this transaction reads from.
    #[must_use]
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// The committed snapshot, without this transaction's writes.
    #[must_use]
    pub fn base(&self) -> &Graph {
        &self.base
    }

    #[must_use]
    pub fn log(&self) -> &MutationLog {
        &self.log
    }

    #[must_use]
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub(crate) fn into_parts(self) -> (Overlay, MutationLog) {
        (self.overlay, self.log)
    }

    /// Replace a node's staged copy with a newer committed version. Not logged.
    pub(crate) fn rebase_node(&mut self, node: Node) {
        self.overlay.nodes.insert(node.id, Some(node));
    }

    // -------------------------------------------------------------------------
    // Staging helpers
    // -------------------------------------------------------------------------

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, NeuroError> {
        if !self.overlay.nodes.contains_key(&id) {
            let node = self.base.node(id).cloned().ok_or(NeuroError::NodeNotFound(id))?;
            self.overlay.nodes.insert(id, Some(node));
        }
        self.overlay
            .nodes
            .get_mut(&id)
            .and_then(Option::as_mut)
            .ok_or(NeuroError::NodeNotFound(id))
    }

    fn relationship_mut(&mut self, id: RelId) -> Result<&mut Relationship, NeuroError> {
        if !self.overlay.relationships.contains_key(&id) {
            let rel = self
                .base
                .relationship(id)
                .cloned()
                .ok_or(NeuroError::RelationshipNotFound(id))?;
            self.overlay.relationships.insert(id, Some(rel));
        }
        self.overlay
            .relationships
            .get_mut(&id)
            .and_then(Option::as_mut)
            .ok_or(NeuroError::RelationshipNotFound(id))
    }

    fn outgoing_mut(&mut self, id: NodeId) -> &mut BTreeSet<RelId> {
        let base = &self.base;
        self.overlay
            .outgoing
            .entry(id)
            .or_insert_with(|| base.outgoing_ids(id))
    }

    fn incoming_mut(&mut self, id: NodeId) -> &mut BTreeSet<RelId> {
        let base = &self.base;
        self.overlay
            .incoming
            .entry(id)
            .or_insert_with(|| base.incoming_ids(id))
    }

    fn ghosts_mut(&mut self, dataset: &str, body_id: BodyId) -> &mut BTreeSet<NodeId> {
        let base = &self.base;
        self.overlay
            .ghosts
            .entry((dataset.to_string(), body_id))
            .or_insert_with(|| base.ghosts(dataset, body_id))
    }

    fn require_node(&self, id: NodeId) -> Result<&Node, NeuroError> {
        self.node(id).ok_or(NeuroError::NodeNotFound(id))
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    /// Create a node. Fails if `key` is already held by a live node.
    pub fn create_node(
        &mut self,
        kind: EntityKind,
        dataset: &str,
        key: Option<NodeKey>,
        labels: impl IntoIterator<Item = String>,
        properties: Properties,
    ) -> Result<NodeId, NeuroError> {
        if let Some(key) = &key
            && self.find(key).is_some()
        {
            return Err(NeuroError::ConstraintViolation(format!(
                "{} already exists",
                key
            )));
        }

        let id = self.ids.node();
        let mut node = Node::new(id, kind, dataset);
        node.labels = labels.into_iter().collect();
        node.properties = properties;
        node.key = key.clone();

        self.log.record(Mutation::NodeCreated {
            node: id,
            kind,
            dataset: dataset.to_string(),
        });
        for label in &node.labels {
            self.log.record(Mutation::LabelAssigned {
                node: id,
                label: label.clone(),
            });
        }
        for prop in node.properties.keys() {
            self.log.record(Mutation::NodePropertyAssigned {
                node: id,
                key: prop.clone(),
            });
        }

        if let Some(key) = key {
            self.overlay.keys.insert(key, Some(id));
        }
        self.overlay.nodes.insert(id, Some(node));
        Ok(id)
    }

    /// Delete a node that has no relationships left.
    pub fn delete_node(&mut self, id: NodeId) -> Result<Node, NeuroError> {
        let node = self.require_node(id)?.clone();
        if !self.relationship_ids_of(id).is_empty() {
            return Err(NeuroError::ConstraintViolation(format!(
                "node {:?} still has relationships",
                id
            )));
        }

        if let Some(key) = &node.key {
            self.overlay.keys.insert(key.clone(), None);
        }
        if let Some(body_id) = crate::graph::ghost_body_id(&node) {
            self.ghosts_mut(&node.dataset, body_id).remove(&id);
        }
        self.overlay.outgoing.insert(id, BTreeSet::new());
        self.overlay.incoming.insert(id, BTreeSet::new());
        self.overlay.nodes.insert(id, None);
        self.log.record(Mutation::NodeDeleted { node: node.clone() });
        Ok(node)
    }

    /// Delete a node together with every relationship incident on it.
    pub fn detach_delete_node(&mut self, id: NodeId) -> Result<Node, NeuroError> {
        self.require_node(id)?;
        for rel in self.relationship_ids_of(id) {
            self.delete_relationship(rel)?;
        }
        self.delete_node(id)
    }

    /// Returns `false` if the label was already present.
    pub fn add_label(&mut self, id: NodeId, label: &str) -> Result<bool, NeuroError> {
        let added = self.node_mut(id)?.labels.insert(label.to_string());
        if added {
            self.log.record(Mutation::LabelAssigned {
                node: id,
                label: label.to_string(),
            });
        }
        Ok(added)
    }

    /// Returns `false` if the label was not present.
    pub fn remove_label(&mut self, id: NodeId, label: &str) -> Result<bool, NeuroError> {
        let removed = self.node_mut(id)?.labels.remove(label);
        if removed {
            self.log.record(Mutation::LabelRemoved {
                node: id,
                label: label.to_string(),
            });
        }
        Ok(removed)
    }

    /// Set a node property. Writing the value it already has is not logged.
    pub fn set_property(
        &mut self,
        id: NodeId,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), NeuroError> {
        let value = value.into();
        if self.require_node(id)?.property(key) == Some(&value) {
            return Ok(());
        }
        self.node_mut(id)?.properties.insert(key.to_string(), value);
        self.log.record(Mutation::NodePropertyAssigned {
            node: id,
            key: key.to_string(),
        });
        Ok(())
    }

    pub fn remove_property(
        &mut self,
        id: NodeId,
        key: &str,
    ) -> Result<Option<PropertyValue>, NeuroError> {
        if self.require_node(id)?.property(key).is_none() {
            return Ok(None);
        }
        let old = self.node_mut(id)?.properties.remove(key);
        self.log.record(Mutation::NodePropertyRemoved {
            node: id,
            key: key.to_string(),
        });
        Ok(old)
    }

    /// Turn a node into a ghost of `body_id`.
    ///
    /// The kind marker becomes the ghost marker, every extra label is
    /// stripped and the identity key is released so the body id can no
    /// longer be resolved to a live segment. Properties are left alone.
    pub fn convert_to_ghost(&mut self, id: NodeId, body_id: BodyId) -> Result<(), NeuroError> {
        let node = self.node_mut(id)?;
        let old_kind = node.kind;
        let labels = std::mem::take(&mut node.labels);
        let key = node.key.take();
        node.kind = EntityKind::Ghost;
        let dataset = node.dataset.clone();

        self.log.record(Mutation::LabelRemoved {
            node: id,
            label: old_kind.label().to_string(),
        });
        for label in labels {
            self.log.record(Mutation::LabelRemoved { node: id, label });
        }
        self.log.record(Mutation::LabelAssigned {
            node: id,
            label: EntityKind::Ghost.label().to_string(),
        });

        if let Some(key) = key {
            self.overlay.keys.insert(key, None);
        }
        self.ghosts_mut(&dataset, body_id).insert(id);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------------

    pub fn create_relationship(
        &mut self,
        kind: RelKind,
        from: NodeId,
        to: NodeId,
        properties: Properties,
    ) -> Result<RelId, NeuroError> {
        self.require_node(from)?;
        self.require_node(to)?;

        let id = self.ids.rel();
        self.log.record(Mutation::RelationshipCreated {
            rel: id,
            kind,
            from,
            to,
        });
        for key in properties.keys() {
            self.log.record(Mutation::RelationshipPropertyAssigned {
                rel: id,
                from,
                to,
                key: key.clone(),
            });
        }

        self.outgoing_mut(from).insert(id);
        self.incoming_mut(to).insert(id);
        self.overlay.relationships.insert(
            id,
            Some(Relationship {
                id,
                kind,
                from,
                to,
                properties,
            }),
        );
        Ok(id)
    }

    pub fn delete_relationship(&mut self, id: RelId) -> Result<Relationship, NeuroError> {
        let rel = self
            .relationship(id)
            .cloned()
            .ok_or(NeuroError::RelationshipNotFound(id))?;
        self.outgoing_mut(rel.from).remove(&id);
        self.incoming_mut(rel.to).remove(&id);
        self.overlay.relationships.insert(id, None);
        self.log
            .record(Mutation::RelationshipDeleted { rel: rel.clone() });
        Ok(rel)
    }

    pub fn set_relationship_property(
        &mut self,
        id: RelId,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), NeuroError> {
        let value = value.into();
        let rel = self.relationship_mut(id)?;
        if rel.properties.get(key) == Some(&value) {
            return Ok(());
        }
        rel.properties.insert(key.to_string(), value);
        let (from, to) = (rel.from, rel.to);
        self.log.record(Mutation::RelationshipPropertyAssigned {
            rel: id,
            from,
            to,
            key: key.to_string(),
        });
        Ok(())
    }

    pub fn remove_relationship_property(
        &mut self,
        id: RelId,
        key: &str,
    ) -> Result<Option<PropertyValue>, NeuroError> {
        let rel = self.relationship_mut(id)?;
        let old = rel.properties.remove(key);
        if old.is_some() {
            let (from, to) = (rel.from, rel.to);
            self.log.record(Mutation::RelationshipPropertyRemoved {
                rel: id,
                from,
                to,
                key: key.to_string(),
            });
        }
        Ok(old)
    }
}

impl GraphView for Transaction {
    fn node(&self, id: NodeId) -> Option<&Node> {
        match self.overlay.nodes.get(&id) {
            Some(staged) => staged.as_ref(),
            None => self.base.node(id),
        }
    }

    fn relationship(&self, id: RelId) -> Option<&Relationship> {
        match self.overlay.relationships.get(&id) {
            Some(staged) => staged.as_ref(),
            None => self.base.relationship(id),
        }
    }

    fn outgoing_ids(&self, id: NodeId) -> BTreeSet<RelId> {
        match self.overlay.outgoing.get(&id) {
            Some(staged) => staged.clone(),
            None => self.base.outgoing_ids(id),
        }
    }

    fn incoming_ids(&self, id: NodeId) -> BTreeSet<RelId> {
        match self.overlay.incoming.get(&id) {
            Some(staged) => staged.clone(),
            None => self.base.incoming_ids(id),
        }
    }

    fn find(&self, key: &NodeKey) -> Option<NodeId> {
        match self.overlay.keys.get(key) {
            Some(staged) => *staged,
            None => self.base.find(key),
        }
    }

    fn ghosts(&self, dataset: &str, body_id: BodyId) -> BTreeSet<NodeId> {
        match self.overlay.ghosts.get(&(dataset.to_string(), body_id)) {
            Some(staged) => staged.clone(),
            None => self.base.ghosts(dataset, body_id),
        }
    }

    fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: BTreeSet<NodeId> = self.base.node_ids().into_iter().collect();
        for (id, staged) in &self.overlay.nodes {
            if staged.is_some() {
                ids.insert(*id);
            } else {
                ids.remove(id);
            }
        }
        ids.into_iter().collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
