//! # Graph Engine
//!
//! The committed, in-memory property graph for neuroproof.
//!
//! `Graph` is an arena of nodes and relationships indexed by id, with
//! adjacency sets per node, a dataset-scoped identity-key index and an index
//! of retired donors (ghosts) by former body id. All data structures use
//! `BTreeMap`/`BTreeSet` for deterministic ordering.
//!
//! A `Graph` is never mutated in place by engine code. Writers stage changes
//! in a [`crate::Transaction`], whose [`Overlay`] the store applies to a fresh
//! copy of the graph at commit time.

use crate::{BodyId, EntityKind, Node, NodeId, NodeKey, RelId, RelKind, Relationship};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// GRAPHVIEW TRAIT
// =============================================================================

/// Read access to a property graph.
///
/// Implemented by the committed [`Graph`] and by an open transaction, which
/// answers from its own staged writes first.
pub trait GraphView {
    /// Lookup a node by id.
    fn node(&self, id: NodeId) -> Option<&Node>;

    /// Lookup a relationship by id.
    fn relationship(&self, id: RelId) -> Option<&Relationship>;

    /// Ids of relationships starting at `id`.
    fn outgoing_ids(&self, id: NodeId) -> BTreeSet<RelId>;

    /// Ids of relationships ending at `id`.
    fn incoming_ids(&self, id: NodeId) -> BTreeSet<RelId>;

    /// Resolve an identity key to the live node holding it.
    fn find(&self, key: &NodeKey) -> Option<NodeId>;

    /// Ghost nodes left behind by merges of `body_id`.
    fn ghosts(&self, dataset: &str, body_id: BodyId) -> BTreeSet<NodeId>;

    /// All node ids in ascending order.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Outgoing relationships of the given kind.
    fn outgoing(&self, id: NodeId, kind: RelKind) -> Vec<&Relationship> {
        self.outgoing_ids(id)
            .into_iter()
            .filter_map(|rel| self.relationship(rel))
            .filter(|rel| rel.kind == kind)
            .collect()
    }

    /// Incoming relationships of the given kind.
    fn incoming(&self, id: NodeId, kind: RelKind) -> Vec<&Relationship> {
        self.incoming_ids(id)
            .into_iter()
            .filter_map(|rel| self.relationship(rel))
            .filter(|rel| rel.kind == kind)
            .collect()
    }

    /// Every relationship incident on `id`, each listed once.
    fn relationship_ids_of(&self, id: NodeId) -> BTreeSet<RelId> {
        let mut ids = self.outgoing_ids(id);
        ids.extend(self.incoming_ids(id));
        ids
    }

    /// The live segment with this body id.
    fn segment(&self, dataset: &str, body_id: BodyId) -> Option<&Node> {
        self.find(&NodeKey::segment(dataset, body_id))
            .and_then(|id| self.node(id))
    }

    /// All nodes of one kind in one dataset, in id order.
    fn nodes_of_kind(&self, dataset: &str, kind: EntityKind) -> Vec<&Node> {
        self.node_ids()
            .into_iter()
            .filter_map(|id| self.node(id))
            .filter(|n| n.kind == kind && n.dataset == dataset)
            .collect()
    }
}

// =============================================================================
// OVERLAY
// =============================================================================

/// Staged writes of a transaction.
///
/// Every map holds the full post-transaction value for the entries it
/// contains; `None` marks a deletion. The keys of the maps double as the
/// transaction's write set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub nodes: BTreeMap<NodeId, Option<Node>>,
    pub relationships: BTreeMap<RelId, Option<Relationship>>,
    pub outgoing: BTreeMap<NodeId, BTreeSet<RelId>>,
    pub incoming: BTreeMap<NodeId, BTreeSet<RelId>>,
    pub keys: BTreeMap<NodeKey, Option<NodeId>>,
    pub ghosts: BTreeMap<(String, BodyId), BTreeSet<NodeId>>,
}

impl Overlay {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.relationships.is_empty()
            && self.keys.is_empty()
            && self.ghosts.is_empty()
    }
}

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

/// The main Graph structure.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
/// No `HashMap` allowed.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node storage: NodeId -> Node
    nodes: BTreeMap<NodeId, Node>,

    /// Relationship storage: RelId -> Relationship
    relationships: BTreeMap<RelId, Relationship>,

    /// Adjacency: node -> relationships starting there
    outgoing: BTreeMap<NodeId, BTreeSet<RelId>>,

    /// Adjacency: node -> relationships ending there
    incoming: BTreeMap<NodeId, BTreeSet<RelId>>,

    /// Identity index: NodeKey -> NodeId
    keys: BTreeMap<NodeKey, NodeId>,

    /// Retired donors by (dataset, former body id)
    ghosts: BTreeMap<(String, BodyId), BTreeSet<NodeId>>,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all nodes in deterministic order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all relationships in deterministic order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// One past the largest node id in use.
    #[must_use]
    pub fn next_node_id(&self) -> u64 {
        self.nodes
            .keys()
            .next_back()
            .map(|id| id.0.saturating_add(1))
            .unwrap_or(0)
    }

    /// One past the largest relationship id in use.
    #[must_use]
    pub fn next_rel_id(&self) -> u64 {
        self.relationships
            .keys()
            .next_back()
            .map(|id| id.0.saturating_add(1))
            .unwrap_or(0)
    }

    /// Insert a node and index it. Used when loading persisted rows.
    pub fn insert_node(&mut self, node: Node) {
        if let Some(key) = &node.key {
            self.keys.insert(key.clone(), node.id);
        }
        if let Some(body_id) = ghost_body_id(&node) {
            self.ghosts
                .entry((node.dataset.clone(), body_id))
                .or_default()
                .insert(node.id);
        }
        self.nodes.insert(node.id, node);
    }

    /// Insert a relationship and index it. Used when loading persisted rows.
    ///
    /// Relationships whose endpoints are missing are skipped.
    pub fn insert_relationship(&mut self, rel: Relationship) -> bool {
        if !self.nodes.contains_key(&rel.from) || !self.nodes.contains_key(&rel.to) {
            return false;
        }
        self.outgoing.entry(rel.from).or_default().insert(rel.id);
        self.incoming.entry(rel.to).or_default().insert(rel.id);
        self.relationships.insert(rel.id, rel);
        true
    }

    /// Publish a transaction's staged writes.
    pub fn apply(&mut self, overlay: &Overlay) {
        for (id, node) in &overlay.nodes {
            match node {
                Some(node) => {
                    self.nodes.insert(*id, node.clone());
                }
                None => {
                    self.nodes.remove(id);
                }
            }
        }
        for (id, rel) in &overlay.relationships {
            match rel {
                Some(rel) => {
                    self.relationships.insert(*id, rel.clone());
                }
                None => {
                    self.relationships.remove(id);
                }
            }
        }
        replace_sets(&mut self.outgoing, &overlay.outgoing);
        replace_sets(&mut self.incoming, &overlay.incoming);
        for (key, id) in &overlay.keys {
            match id {
                Some(id) => {
                    self.keys.insert(key.clone(), *id);
                }
                None => {
                    self.keys.remove(key);
                }
            }
        }
        replace_sets(&mut self.ghosts, &overlay.ghosts);
    }
}

fn replace_sets<K: Ord + Clone, V: Clone>(
    target: &mut BTreeMap<K, BTreeSet<V>>,
    staged: &BTreeMap<K, BTreeSet<V>>,
) {
    for (key, set) in staged {
        if set.is_empty() {
            target.remove(key);
        } else {
            target.insert(key.clone(), set.clone());
        }
    }
}

/// The former body id of a ghost node, from its renamed `bodyId` property.
#[must_use]
pub fn ghost_body_id(node: &Node) -> Option<BodyId> {
    if node.kind != EntityKind::Ghost {
        return None;
    }
    node.int(&crate::merged_property_name(crate::primitives::BODY_ID))
        .map(BodyId)
}

impl GraphView for Graph {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn relationship(&self, id: RelId) -> Option<&Relationship> {
        self.relationships.get(&id)
    }

    fn outgoing_ids(&self, id: NodeId) -> BTreeSet<RelId> {
        self.outgoing.get(&id).cloned().unwrap_or_default()
    }

    fn incoming_ids(&self, id: NodeId) -> BTreeSet<RelId> {
        self.incoming.get(&id).cloned().unwrap_or_default()
    }

    fn find(&self, key: &NodeKey) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    fn ghosts(&self, dataset: &str, body_id: BodyId) -> BTreeSet<NodeId> {
        self.ghosts
            .get(&(dataset.to_string(), body_id))
            .cloned()
            .unwrap_or_default()
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
