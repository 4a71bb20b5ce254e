//! # History Forest
//!
//! Read model of a body's merge provenance.
//!
//! In the graph, every merge event is one History node `H`:
//!
//! ```text
//! survivor ──From──► H ◄──MergedTo── ghost(donor) ──From──► H_donor_prev
//!                    ▲
//!                    └──MergedTo── H_prev (the survivor's previous event)
//! ```
//!
//! `HistoryForest` walks that structure from a live segment and flattens it
//! into an arena of records indexed by History node id. Records refer to each
//! other by node id, never by pointer, so the forest can be built
//! breadth-first without any back-references.

use crate::graph::GraphView;
use crate::primitives::{
    BODY_ID, POST, PRE, PRIOR_POST, PRIOR_PRE, PRIOR_SIZE, RESULT_BODY_ID, SIZE, TIME_STAMP,
};
use crate::{BodyId, EntityKind, Node, NodeId, RelKind, Timestamp, merged_property_name};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// One donor of a merge event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonorRecord {
    pub ghost: NodeId,
    pub body_id: Option<BodyId>,
    pub pre: Option<i64>,
    pub post: Option<i64>,
    pub size: Option<i64>,
    /// The donor's own earlier merge event, if it had been a survivor before.
    pub history: Option<NodeId>,
}

/// One merge event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub node: NodeId,
    pub result_body_id: Option<BodyId>,
    pub timestamp: Option<Timestamp>,
    pub prior_pre: Option<i64>,
    pub prior_post: Option<i64>,
    pub prior_size: Option<i64>,
    pub donors: Vec<DonorRecord>,
    /// The survivor's previous merge event.
    pub previous: Option<NodeId>,
}

impl HistoryRecord {
    fn read(node: &Node) -> Self {
        Self {
            node: node.id,
            result_body_id: node.int(RESULT_BODY_ID).map(BodyId),
            timestamp: node.int(TIME_STAMP).map(Timestamp),
            prior_pre: node.int(PRIOR_PRE),
            prior_post: node.int(PRIOR_POST),
            prior_size: node.int(PRIOR_SIZE),
            donors: Vec::new(),
            previous: None,
        }
    }
}

/// Arena of merge events reachable from one body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryForest {
    /// Records in breadth-first order; `records[0]` is the latest event.
    records: Vec<HistoryRecord>,
    #[serde(skip)]
    index: BTreeMap<NodeId, usize>,
}

impl HistoryForest {
    /// Collect the provenance of a live segment. Empty if it was never a
    /// merge survivor.
    pub fn for_body(view: &impl GraphView, dataset: &str, body_id: BodyId) -> Self {
        let root = view
            .segment(dataset, body_id)
            .and_then(|s| view.outgoing(s.id, RelKind::From).first().map(|r| r.to));
        match root {
            Some(root) => Self::from_root(view, root),
            None => Self::default(),
        }
    }

    /// Collect every merge event reachable from the History node `root`.
    pub fn from_root(view: &impl GraphView, root: NodeId) -> Self {
        let mut forest = Self::default();
        let mut queue = VecDeque::from([root]);

        while let Some(id) = queue.pop_front() {
            if forest.index.contains_key(&id) {
                continue;
            }
            let Some(node) = view.node(id).filter(|n| n.kind == EntityKind::History) else {
                continue;
            };
            let mut record = HistoryRecord::read(node);

            for rel in view.incoming(id, RelKind::MergedTo) {
                let Some(source) = view.node(rel.from) else {
                    continue;
                };
                match source.kind {
                    EntityKind::History => {
                        record.previous = Some(source.id);
                        queue.push_back(source.id);
                    }
                    EntityKind::Ghost => {
                        let history = view
                            .outgoing(source.id, RelKind::From)
                            .first()
                            .map(|r| r.to);
                        if let Some(h) = history {
                            queue.push_back(h);
                        }
                        record.donors.push(DonorRecord {
                            ghost: source.id,
                            body_id: source.int(&merged_property_name(BODY_ID)).map(BodyId),
                            pre: source.int(&merged_property_name(PRE)),
                            post: source.int(&merged_property_name(POST)),
                            size: source.int(&merged_property_name(SIZE)),
                            history,
                        });
                    }
                    EntityKind::Segment
                    | EntityKind::Synapse
                    | EntityKind::SynapseSet
                    | EntityKind::NeuronPart
                    | EntityKind::Summary
                    | EntityKind::Skeleton
                    | EntityKind::SkelNode => {}
                }
            }

            forest.index.insert(id, forest.records.len());
            forest.records.push(record);
        }
        forest
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// The latest merge event.
    #[must_use]
    pub fn root(&self) -> Option<&HistoryRecord> {
        self.records.first()
    }

    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&HistoryRecord> {
        self.index.get(&node).and_then(|i| self.records.get(*i))
    }

    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    /// Length of the longest chain of merge events, 0 for no history.
    #[must_use]
    pub fn depth(&self) -> usize {
        // children always sit after their parent in breadth-first order
        let mut depth = vec![1_usize; self.records.len()];
        for (i, record) in self.records.iter().enumerate().rev() {
            let children = record
                .previous
                .iter()
                .chain(record.donors.iter().filter_map(|d| d.history.as_ref()));
            for child in children {
                if let Some(&c) = self.index.get(child)
                    && c > i
                {
                    depth[i] = depth[i].max(depth[c] + 1);
                }
            }
        }
        depth.first().copied().unwrap_or(0)
    }

    /// Every body id ever merged into this body, directly or transitively.
    #[must_use]
    pub fn merged_body_ids(&self) -> BTreeSet<BodyId> {
        self.records
            .iter()
            .flat_map(|r| r.donors.iter().filter_map(|d| d.body_id))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
