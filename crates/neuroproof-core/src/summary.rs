//! # Summary Counter Maintainer
//!
//! Keeps the per-dataset summary record (`Meta`) in step with the graph
//! without ever rescanning it:
//!
//! 1. every node of the change set's timestamp set gets the transaction
//!    timestamp
//! 2. for every dataset with a stale signal, the net deltas of the
//!    transaction (synapses by polarity, `ConnectsTo` relationships) are added
//!    to the summary counters, and `lastDatabaseEdit` is set
//!
//! Step 2 runs under the store's commit lock against the latest committed
//! summary row, so two transactions that both add synapses never lose each
//! other's increments. A summary record created by the transaction itself is
//! filled by a full recount instead.

use crate::graph::{Graph, GraphView};
use crate::mutation::{Mutation, MutationLog};
use crate::primitives::{
    LAST_DATABASE_EDIT, POST_HP_THRESHOLD, PRE_HP_THRESHOLD, SYNAPSE_TYPE, TIME_STAMP,
    TOTAL_CONNECTION_COUNT, TOTAL_POST_COUNT, TOTAL_PRE_COUNT, TOTAL_SYNAPSE_COUNT,
};
use crate::roi_info::HpThresholds;
use crate::tracker::ChangeSet;
use crate::transaction::Transaction;
use crate::{EntityKind, NeuroError, Node, NodeId, NodeKey, Polarity, RelKind, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// COUNTS
// =============================================================================

/// The counters of one summary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub pre: i64,
    pub post: i64,
    pub connections: i64,
}

impl SummaryCounts {
    #[must_use]
    pub const fn synapses(&self) -> i64 {
        self.pre.saturating_add(self.post)
    }

    /// Read the counters stored on a summary node.
    #[must_use]
    pub fn from_node(node: &Node) -> Self {
        Self {
            pre: node.int(TOTAL_PRE_COUNT).unwrap_or(0),
            post: node.int(TOTAL_POST_COUNT).unwrap_or(0),
            connections: node.int(TOTAL_CONNECTION_COUNT).unwrap_or(0),
        }
    }

    /// Count everything from scratch. Linear in the size of the graph.
    pub fn recount(view: &impl GraphView, dataset: &str) -> Self {
        let mut counts = Self::default();
        for synapse in view.nodes_of_kind(dataset, EntityKind::Synapse) {
            match synapse_polarity(synapse) {
                Some(Polarity::Pre) => counts.pre += 1,
                Some(Polarity::Post) => counts.post += 1,
                None => {}
            }
        }
        for segment in view.nodes_of_kind(dataset, EntityKind::Segment) {
            counts.connections += view.outgoing(segment.id, RelKind::ConnectsTo).len() as i64;
        }
        counts
    }

    #[must_use]
    pub fn apply(self, delta: &SummaryDelta) -> Self {
        Self {
            pre: self.pre.saturating_add(delta.pre),
            post: self.post.saturating_add(delta.post),
            connections: self.connections.saturating_add(delta.connections),
        }
    }
}

/// Net change to a dataset's counters within one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryDelta {
    pub pre: i64,
    pub post: i64,
    pub connections: i64,
}

impl SummaryDelta {
    fn add(&mut self, polarity: Option<Polarity>, amount: i64) {
        match polarity {
            Some(Polarity::Pre) => self.pre += amount,
            Some(Polarity::Post) => self.post += amount,
            None => {}
        }
    }
}

pub(crate) fn synapse_polarity(node: &Node) -> Option<Polarity> {
    node.text(SYNAPSE_TYPE).and_then(|t| t.parse().ok())
}

/// HP thresholds recorded on a summary node, defaulting when absent.
#[must_use]
pub fn thresholds_of(node: &Node) -> HpThresholds {
    let defaults = HpThresholds::default();
    HpThresholds::new(
        node.float(PRE_HP_THRESHOLD).unwrap_or(defaults.pre),
        node.float(POST_HP_THRESHOLD).unwrap_or(defaults.post),
    )
}

/// HP thresholds of a dataset, from its summary record.
pub fn dataset_thresholds(view: &impl GraphView, dataset: &str) -> HpThresholds {
    view.find(&NodeKey::summary(dataset))
        .and_then(|id| view.node(id))
        .map(thresholds_of)
        .unwrap_or_default()
}

// =============================================================================
// DELTAS
// =============================================================================

/// Net counter deltas per dataset, derived from the mutation log.
///
/// `tx` supplies the end-of-transaction state, `tx.base()` the state before.
pub fn compute_deltas(log: &MutationLog, tx: &Transaction) -> BTreeMap<String, SummaryDelta> {
    let base = tx.base();
    let mut deltas: BTreeMap<String, SummaryDelta> = BTreeMap::new();
    let mut retyped: BTreeSet<NodeId> = BTreeSet::new();
    let mut seen_rels = BTreeSet::new();

    for mutation in log.iter() {
        match mutation {
            Mutation::NodeCreated {
                node,
                kind: EntityKind::Synapse,
                dataset,
            } => {
                if let Some(live) = tx.node(*node) {
                    deltas
                        .entry(dataset.clone())
                        .or_default()
                        .add(synapse_polarity(live), 1);
                }
            }
            Mutation::NodeDeleted { node } if node.kind == EntityKind::Synapse => {
                if let Some(before) = base.node(node.id) {
                    deltas
                        .entry(node.dataset.clone())
                        .or_default()
                        .add(synapse_polarity(before), -1);
                }
            }
            Mutation::NodePropertyAssigned { node, key }
            | Mutation::NodePropertyRemoved { node, key }
                if key == SYNAPSE_TYPE =>
            {
                retyped.insert(*node);
            }
            Mutation::RelationshipCreated {
                rel,
                kind: RelKind::ConnectsTo,
                from,
                ..
            } => {
                if seen_rels.insert(*rel) && tx.relationship(*rel).is_some() {
                    if let Some(node) = tx.node(*from) {
                        deltas.entry(node.dataset.clone()).or_default().connections += 1;
                    }
                }
            }
            Mutation::RelationshipDeleted { rel } if rel.kind == RelKind::ConnectsTo => {
                if seen_rels.insert(rel.id) && base.relationship(rel.id).is_some() {
                    if let Some(node) = base.node(rel.from) {
                        deltas.entry(node.dataset.clone()).or_default().connections -= 1;
                    }
                }
            }
            _ => {}
        }
    }

    // Polarity changes of synapses that live through the transaction.
    for id in retyped {
        if let (Some(before), Some(after)) = (base.node(id), tx.node(id))
            && before.kind == EntityKind::Synapse
            && after.kind == EntityKind::Synapse
        {
            let delta = deltas.entry(after.dataset.clone()).or_default();
            delta.add(synapse_polarity(before), -1);
            delta.add(synapse_polarity(after), 1);
        }
    }

    deltas
}

// =============================================================================
// MAINTAINER
// =============================================================================

/// Applies a change set to a transaction before it is published.
pub struct SummaryMaintainer;

impl SummaryMaintainer {
    /// Stamp every node of the timestamp set. Runs before the commit lock.
    pub fn stamp(tx: &mut Transaction, changes: &ChangeSet) -> Result<(), NeuroError> {
        let now = tx.timestamp();
        for id in &changes.timestamp_set {
            tx.set_property(*id, TIME_STAMP, now)?;
        }
        Ok(())
    }

    /// Bring each affected dataset's summary record up to date.
    ///
    /// `latest` is the most recently committed graph; counters are rebased on
    /// its summary row. Called with the commit lock held.
    pub fn rebase(
        tx: &mut Transaction,
        latest: &Graph,
        changes: &ChangeSet,
        deltas: &BTreeMap<String, SummaryDelta>,
    ) -> Result<Vec<NodeId>, NeuroError> {
        if changes.is_quiet() {
            return Ok(Vec::new());
        }

        let now: Timestamp = tx.timestamp();
        let mut datasets = changes.touched_datasets.clone();
        datasets.extend(changes.stale_datasets.iter().cloned());

        let mut updated = Vec::new();
        for dataset in datasets {
            let Some(id) = tx.find(&NodeKey::summary(&dataset)) else {
                tracing::debug!(dataset = %dataset, "no summary record, skipping counters");
                continue;
            };
            let stale = changes.stale_datasets.contains(&dataset);

            let counts = match latest.node(id) {
                Some(committed) => {
                    let merged = carry_local_writes(committed, tx.base().node(id), tx.node(id));
                    tx.rebase_node(merged);
                    let delta = deltas.get(&dataset).copied().unwrap_or_default();
                    SummaryCounts::from_node(committed).apply(&delta)
                }
                // created by this transaction
                None => SummaryCounts::recount(&*tx, &dataset),
            };

            if stale {
                tx.set_property(id, TOTAL_PRE_COUNT, counts.pre)?;
                tx.set_property(id, TOTAL_POST_COUNT, counts.post)?;
                tx.set_property(id, TOTAL_SYNAPSE_COUNT, counts.synapses())?;
                tx.set_property(id, TOTAL_CONNECTION_COUNT, counts.connections)?;
            }
            tx.set_property(id, LAST_DATABASE_EDIT, now)?;
            tracing::debug!(
                dataset = %dataset,
                pre = counts.pre,
                post = counts.post,
                connections = counts.connections,
                stale,
                "summary record updated"
            );
            updated.push(id);
        }
        Ok(updated)
    }
}

/// The latest committed summary node with this transaction's own edits to it
/// replayed on top.
fn carry_local_writes(latest: &Node, before: Option<&Node>, staged: Option<&Node>) -> Node {
    let mut node = latest.clone();
    let (Some(before), Some(staged)) = (before, staged) else {
        return node;
    };
    for (key, value) in &staged.properties {
        if before.property(key) != Some(value) {
            node.properties.insert(key.clone(), value.clone());
        }
    }
    for key in before.properties.keys() {
        if staged.property(key).is_none() {
            node.properties.remove(key);
        }
    }
    node
}

// =============================================================================
// TESTS
// =============================================================================
