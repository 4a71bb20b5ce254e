//! # Weighted Edge Reconciler
//!
//! When several segments collapse into one, every `ConnectsTo` edge incident
//! on a member is re-pointed at the survivor. Edges that land on the same
//! `(from, to)` pair are combined:
//!
//! - `weight` is the sum of the contributing weights
//! - `roiInfo` is the region-wise sum
//! - `weightHP` is recomputed from the summed `roiInfo` as the total of its
//!   `postHP` counts. It is never derived from the contributors' own
//!   `weightHP` values.
//!
//! An edge with a single contributor keeps its stored `weightHP`.
//!
//! Edges that map onto survivor -> survivor are dropped, except when one of
//! the contributors was already a self-loop before the merge. Then a single
//! self-loop survives carrying the sum of every collapsing edge.
//!
//! The reconciler is pure: it reads contributions and returns the target edge
//! set. Applying the result to the graph is the merge engine's job.

use crate::roi_info::RoiInfo;
use crate::{NodeId, RelId};
use std::collections::{BTreeMap, BTreeSet};

/// The weight-bearing properties of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionWeights {
    pub weight: i64,
    pub weight_hp: Option<i64>,
    pub roi_info: RoiInfo,
}

impl ConnectionWeights {
    #[must_use]
    pub fn new(weight: i64) -> Self {
        Self {
            weight,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_weight_hp(mut self, weight_hp: i64) -> Self {
        self.weight_hp = Some(weight_hp);
        self
    }

    #[must_use]
    pub fn with_roi_info(mut self, roi_info: RoiInfo) -> Self {
        self.roi_info = roi_info;
        self
    }

    fn absorb(&mut self, other: &Self) {
        self.weight = self.weight.saturating_add(other.weight);
        let carried_hp = self.weight_hp.is_some() || other.weight_hp.is_some();
        self.roi_info.merge_from(&other.roi_info);
        self.weight_hp = if carried_hp || !self.roi_info.is_empty() {
            Some(self.roi_info.post_hp_total())
        } else {
            None
        };
    }
}

/// One existing `ConnectsTo` edge incident on a member of the merged set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeContribution {
    pub rel: RelId,
    pub from: NodeId,
    pub to: NodeId,
    pub weights: ConnectionWeights,
}

/// One edge of the reconciled edge set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub weights: ConnectionWeights,
    /// Relationships that collapsed into this edge, in ascending id order.
    pub contributors: Vec<RelId>,
}

impl ReconciledEdge {
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Result of reconciling a merged set's edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The target edge set, ordered by `(from, to)`.
    pub edges: Vec<ReconciledEdge>,
    /// Contributors that disappear without a replacement (dropped self-edges).
    pub dropped: Vec<RelId>,
}

/// Collapse `contributions` onto `survivor`.
///
/// `members` is the merged identity set (survivor and donors). Contributions
/// are deduplicated by relationship id, so an edge between two members may be
/// passed once from each endpoint.
#[must_use]
pub fn reconcile(
    survivor: NodeId,
    members: &BTreeSet<NodeId>,
    contributions: &[EdgeContribution],
) -> Reconciliation {
    let map = |id: NodeId| if members.contains(&id) { survivor } else { id };

    let mut seen = BTreeSet::new();
    let mut grouped: BTreeMap<(NodeId, NodeId), ReconciledEdge> = BTreeMap::new();
    let mut genuine_self_loop = false;

    for contribution in contributions {
        if !seen.insert(contribution.rel) {
            continue;
        }
        if contribution.from == contribution.to && members.contains(&contribution.from) {
            genuine_self_loop = true;
        }
        let key = (map(contribution.from), map(contribution.to));
        grouped
            .entry(key)
            .and_modify(|edge| {
                edge.weights.absorb(&contribution.weights);
                edge.contributors.push(contribution.rel);
            })
            .or_insert_with(|| ReconciledEdge {
                from: key.0,
                to: key.1,
                weights: contribution.weights.clone(),
                contributors: vec![contribution.rel],
            });
    }

    let mut result = Reconciliation::default();
    for (_, mut edge) in grouped {
        edge.contributors.sort();
        if edge.is_self_loop() && !genuine_self_loop {
            result.dropped.extend(edge.contributors);
            continue;
        }
        result.edges.push(edge);
    }
    result
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Polarity;

    fn contribution(rel: u64, from: u64, to: u64, weight: i64) -> EdgeContribution {
        EdgeContribution {
            rel: RelId(rel),
            from: NodeId(from),
            to: NodeId(to),
            weights: ConnectionWeights::new(weight),
        }
    }

    fn members(ids: &[u64]) -> BTreeSet<NodeId> {
        ids.iter().copied().map(NodeId).collect()
    }

    fn edge(result: &Reconciliation, from: u64, to: u64) -> Option<&ReconciledEdge> {
        result
            .edges
            .iter()
            .find(|e| e.from == NodeId(from) && e.to == NodeId(to))
    }

    #[test]
    fn parallel_edges_are_summed() {
        // 2 merges into 1; 4 is an unrelated third body
        let contributions = vec![
            contribution(1, 1, 4, 10),
            contribution(2, 2, 4, 20),
            contribution(3, 4, 1, 8),
            contribution(4, 4, 2, 10),
        ];
        let result = reconcile(NodeId(1), &members(&[1, 2]), &contributions);

        assert_eq!(edge(&result, 1, 4).map(|e| e.weights.weight), Some(30));
        assert_eq!(edge(&result, 4, 1).map(|e| e.weights.weight), Some(18));
        assert_eq!(result.edges.len(), 2);
        assert_eq!(
            edge(&result, 1, 4).map(|e| e.contributors.clone()),
            Some(vec![RelId(1), RelId(2)])
        );
    }

    #[test]
    fn edges_between_members_are_dropped_without_genuine_loop() {
        let contributions = vec![contribution(1, 1, 2, 5), contribution(2, 2, 1, 7)];
        let result = reconcile(NodeId(1), &members(&[1, 2]), &contributions);
        assert!(result.edges.is_empty());
        assert_eq!(result.dropped, vec![RelId(1), RelId(2)]);
    }

    #[test]
    fn genuine_self_loop_absorbs_internal_edges() {
        let contributions = vec![
            contribution(1, 1, 2, 5),
            contribution(2, 2, 1, 7),
            contribution(3, 2, 2, 35),
        ];
        let result = reconcile(NodeId(1), &members(&[1, 2]), &contributions);
        assert_eq!(edge(&result, 1, 1).map(|e| e.weights.weight), Some(47));
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn duplicate_contributions_count_once() {
        let c = contribution(1, 1, 3, 4);
        let result = reconcile(NodeId(1), &members(&[1, 2]), &[c.clone(), c]);
        assert_eq!(edge(&result, 1, 3).map(|e| e.weights.weight), Some(4));
    }

    fn post_hp_info(roi: &str, count: usize) -> RoiInfo {
        let mut info = RoiInfo::new();
        for _ in 0..count {
            info.increment(roi, Polarity::Post, true);
        }
        info
    }

    #[test]
    fn weight_hp_follows_merged_roi_info() {
        // contributors disagree with their own aggregates
        let mut a = contribution(1, 3, 1, 2);
        a.weights = a.weights.with_roi_info(post_hp_info("roiA", 2));
        let mut b = contribution(2, 3, 2, 1);
        b.weights = b
            .weights
            .with_roi_info(post_hp_info("roiB", 1))
            .with_weight_hp(0);

        let result = reconcile(NodeId(1), &members(&[1, 2]), &[a, b]);
        let merged = edge(&result, 3, 1).expect("collapsed edge");
        assert_eq!(merged.weights.weight, 3);
        assert_eq!(merged.weights.weight_hp, Some(3));
    }

    #[test]
    fn weight_hp_ignores_contributor_values() {
        let mut a = contribution(1, 1, 3, 2);
        a.weights = a.weights.with_weight_hp(2);
        let mut b = contribution(2, 2, 3, 1);
        b.weights = b.weights.with_weight_hp(5);
        let c = contribution(3, 1, 4, 3);

        let result = reconcile(NodeId(1), &members(&[1, 2]), &[a, b, c]);
        assert_eq!(edge(&result, 1, 3).and_then(|e| e.weights.weight_hp), Some(0));
        assert_eq!(edge(&result, 1, 4).and_then(|e| e.weights.weight_hp), None);
    }

    #[test]
    fn single_contributor_keeps_weight_hp() {
        let mut a = contribution(1, 2, 3, 4);
        a.weights = a.weights.with_weight_hp(3);
        let result = reconcile(NodeId(1), &members(&[1, 2]), &[a]);
        assert_eq!(edge(&result, 1, 3).and_then(|e| e.weights.weight_hp), Some(3));
    }

    #[test]
    fn roi_info_is_summed_regionwise() {
        let mut a_info = RoiInfo::new();
        a_info.increment("roiA", Polarity::Post, false);
        let mut b_info = RoiInfo::new();
        b_info.increment("roiA", Polarity::Post, true);
        b_info.increment("roiB", Polarity::Pre, false);

        let mut a = contribution(1, 3, 1, 1);
        a.weights = a.weights.with_roi_info(a_info);
        let mut b = contribution(2, 3, 2, 1);
        b.weights = b.weights.with_roi_info(b_info);

        let result = reconcile(NodeId(1), &members(&[1, 2]), &[a, b]);
        let merged = edge(&result, 3, 1).map(|e| e.weights.roi_info.clone());
        let merged = merged.unwrap_or_default();
        assert_eq!(merged.get("roiA").post, 2);
        assert_eq!(merged.get("roiA").post_hp, 1);
        assert_eq!(merged.get("roiB").pre, 1);
    }
}
