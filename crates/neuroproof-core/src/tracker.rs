//! # Change Tracker
//!
//! Classifies a transaction's mutation log into the set of nodes that need a
//! fresh `timeStamp` and the staleness signals for the per-dataset summary.
//!
//! Classification of every touched node `n`:
//! - skip `n` if it is a Summary record (its own bookkeeping must never
//!   trigger timestamping)
//! - skip writes to the `timeStamp` property itself
//! - skip `n` if it no longer exists when the transaction ends
//! - otherwise `n` joins the timestamp set
//!
//! Relationship events touch both endpoints.
//!
//! The tracker is a pure function of the log and a kind lookup. It is run by
//! the store for every committing transaction, whoever opened it.

use crate::graph::{Graph, GraphView};
use crate::mutation::{Mutation, MutationLog};
use crate::primitives::TIME_STAMP;
use crate::transaction::Transaction;
use crate::{EntityKind, Node, NodeId, RelId, RelKind};
use std::collections::{BTreeMap, BTreeSet};

/// Resolves the final (end of transaction) kind and dataset of a node.
pub trait KindLookup {
    /// `None` if the node does not exist at the end of the transaction.
    fn kind_of(&self, id: NodeId) -> Option<EntityKind>;

    fn dataset_of(&self, id: NodeId) -> Option<String>;
}

impl KindLookup for Transaction {
    fn kind_of(&self, id: NodeId) -> Option<EntityKind> {
        self.node(id).map(|n| n.kind)
    }

    fn dataset_of(&self, id: NodeId) -> Option<String> {
        self.node(id).map(|n| n.dataset.clone())
    }
}

impl KindLookup for Graph {
    fn kind_of(&self, id: NodeId) -> Option<EntityKind> {
        self.node(id).map(|n| n.kind)
    }

    fn dataset_of(&self, id: NodeId) -> Option<String> {
        self.node(id).map(|n| n.dataset.clone())
    }
}

/// Output of one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Live, non-summary nodes that need the transaction timestamp.
    pub timestamp_set: BTreeSet<NodeId>,
    /// A synapse was created, relabelled or otherwise touched, or a synapse
    /// that existed before the transaction was deleted.
    pub region_counts_may_be_stale: bool,
    /// A `ConnectsTo` relationship was created or deleted.
    pub connection_counts_may_be_stale: bool,
    /// Datasets whose summary counters may be stale.
    pub stale_datasets: BTreeSet<String>,
    /// Datasets with at least one timestamped node.
    pub touched_datasets: BTreeSet<String>,
}

impl ChangeSet {
    /// Whether the summary maintainer has anything to do.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.timestamp_set.is_empty()
            && !self.region_counts_may_be_stale
            && !self.connection_counts_may_be_stale
    }
}

/// The change tracker.
pub struct ChangeTracker;

impl ChangeTracker {
    /// Classify `log` against the end-of-transaction state `lookup`.
    pub fn classify(log: &MutationLog, lookup: &impl KindLookup) -> ChangeSet {
        let mut created_nodes: BTreeSet<NodeId> = BTreeSet::new();
        let mut deleted_nodes: BTreeMap<NodeId, &Node> = BTreeMap::new();
        let mut created_connections: BTreeSet<RelId> = BTreeSet::new();
        let mut deleted_connections: BTreeSet<RelId> = BTreeSet::new();
        let mut connection_endpoints: BTreeMap<RelId, (NodeId, NodeId)> = BTreeMap::new();
        let mut touched: BTreeSet<NodeId> = BTreeSet::new();

        for mutation in log.iter() {
            match mutation {
                Mutation::NodeCreated { node, .. } => {
                    created_nodes.insert(*node);
                    touched.insert(*node);
                }
                Mutation::NodeDeleted { node } => {
                    deleted_nodes.insert(node.id, node);
                }
                Mutation::LabelAssigned { node, .. } | Mutation::LabelRemoved { node, .. } => {
                    touched.insert(*node);
                }
                Mutation::NodePropertyAssigned { node, key }
                | Mutation::NodePropertyRemoved { node, key } => {
                    if key != TIME_STAMP {
                        touched.insert(*node);
                    }
                }
                Mutation::RelationshipCreated {
                    rel, kind, from, to,
                } => {
                    touched.insert(*from);
                    touched.insert(*to);
                    if *kind == RelKind::ConnectsTo {
                        created_connections.insert(*rel);
                        connection_endpoints.insert(*rel, (*from, *to));
                    }
                }
                Mutation::RelationshipDeleted { rel } => {
                    touched.insert(rel.from);
                    touched.insert(rel.to);
                    if rel.kind == RelKind::ConnectsTo {
                        deleted_connections.insert(rel.id);
                        connection_endpoints.insert(rel.id, (rel.from, rel.to));
                    }
                }
                Mutation::RelationshipPropertyAssigned { from, to, key, .. }
                | Mutation::RelationshipPropertyRemoved { from, to, key, .. } => {
                    if key != TIME_STAMP {
                        touched.insert(*from);
                        touched.insert(*to);
                    }
                }
            }
        }

        let dataset_of = |id: NodeId| -> Option<String> {
            lookup
                .dataset_of(id)
                .or_else(|| deleted_nodes.get(&id).map(|n| n.dataset.clone()))
        };

        let mut changes = ChangeSet::default();

        for id in &touched {
            let Some(kind) = lookup.kind_of(*id) else {
                continue;
            };
            match kind {
                EntityKind::Summary => continue,
                EntityKind::Synapse => {
                    changes.region_counts_may_be_stale = true;
                    changes.stale_datasets.extend(dataset_of(*id));
                }
                EntityKind::Segment
                | EntityKind::SynapseSet
                | EntityKind::NeuronPart
                | EntityKind::History
                | EntityKind::Skeleton
                | EntityKind::SkelNode
                | EntityKind::Ghost => {}
            }
            changes.timestamp_set.insert(*id);
            changes.touched_datasets.extend(dataset_of(*id));
        }

        // removing a pre-existing synapse also moves the summary totals
        for (id, node) in &deleted_nodes {
            if node.kind == EntityKind::Synapse
                && !created_nodes.contains(id)
                && lookup.kind_of(*id).is_none()
            {
                changes.region_counts_may_be_stale = true;
                changes.stale_datasets.insert(node.dataset.clone());
            }
        }

        for rel in created_connections.symmetric_difference(&deleted_connections) {
            changes.connection_counts_may_be_stale = true;
            if let Some((from, _)) = connection_endpoints.get(rel) {
                changes.stale_datasets.extend(dataset_of(*from));
            }
        }

        changes
    }
}

// =============================================================================
// TESTS
// =============================================================================
