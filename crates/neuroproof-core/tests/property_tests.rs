//! # Property-Based Tests
//!
//! Invariants of the merge engine and the region aggregate, checked with
//! proptest over generated datasets and instructions.

use neuroproof_core::loader::{ConnectionRecord, SegmentRecord, SynapseRecord, SynapseSetRecord};
use neuroproof_core::primitives::WEIGHT;
use neuroproof_core::{
    BodyId, DatasetFixture, GraphView, HpThresholds, Loader, Location, MergeAction, MergeEngine,
    Polarity, RelKind, RoiInfo, Store, SummaryCounts, SummaryRecord, SynapseCounter,
    SynapseEntry, apply_observation,
};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

const DATASET: &str = "prop";

fn polarity() -> impl Strategy<Value = Polarity> {
    prop_oneof![Just(Polarity::Pre), Just(Polarity::Post)]
}

fn counter() -> impl Strategy<Value = SynapseCounter> {
    (0u64..50, 0u64..50).prop_flat_map(|(pre, post)| {
        (0..=pre, 0..=post).prop_map(move |(pre_hp, post_hp)| SynapseCounter {
            pre_hp,
            post_hp,
            pre,
            post,
        })
    })
}

/// Survivor 1, donors 2 and 3, common neighbour 4.
fn star(weights: [i64; 6], sites: &[(i64, Polarity)]) -> DatasetFixture {
    let [s_out, d1_out, d2_out, s_in, d1_in, d2_in] = weights;
    let connection = |pre: i64, post: i64, weight: i64| ConnectionRecord {
        pre: BodyId(pre),
        post: BodyId(post),
        weight,
    };
    DatasetFixture {
        dataset: DATASET.to_string(),
        pre_hp_threshold: None,
        post_hp_threshold: None,
        segments: (1..=4).map(|b| SegmentRecord::new(BodyId(b))).collect(),
        synapses: sites
            .iter()
            .map(|(x, polarity)| SynapseRecord {
                location: Location::new(*x, 0, 0),
                polarity: *polarity,
                confidence: Some(0.9),
                rois: vec!["roiA".to_string()],
            })
            .collect(),
        synapses_to: Vec::new(),
        synapse_sets: vec![SynapseSetRecord {
            body_id: BodyId(2),
            synapses: sites.iter().map(|(x, _)| Location::new(*x, 0, 0)).collect(),
        }],
        connections: vec![
            connection(1, 4, s_out),
            connection(2, 4, d1_out),
            connection(3, 4, d2_out),
            connection(4, 1, s_in),
            connection(4, 2, d1_in),
            connection(4, 3, d2_in),
        ],
        skeletons: Vec::new(),
    }
}

fn weight(store: &Store, from: i64, to: i64) -> i64 {
    let graph = store.snapshot();
    let (Some(from), Some(to)) = (
        graph.segment(DATASET, BodyId(from)).map(|n| n.id),
        graph.segment(DATASET, BodyId(to)).map(|n| n.id),
    ) else {
        return -1;
    };
    graph
        .outgoing(from, RelKind::ConnectsTo)
        .into_iter()
        .filter(|r| r.to == to)
        .map(|r| r.int(WEIGHT).unwrap_or(0))
        .sum()
}

// =============================================================================
// REGION AGGREGATE
// =============================================================================

proptest! {
    /// decode(encode(x)) == x for every consistent aggregate.
    #[test]
    fn roi_info_round_trips(regions in btree_map("[a-zA-Z0-9()']{1,12}", counter(), 0..8)) {
        let info: RoiInfo = regions.into_iter().collect();
        let text = info.encode().expect("encode");
        prop_assert_eq!(RoiInfo::decode(&text).expect("decode"), info);
    }

    /// Observations applied one at a time, in any order, give the same
    /// aggregate as applying them in one pass.
    #[test]
    fn observations_are_order_independent(
        observations in vec(("roi[ABC]", polarity(), 0.0f64..=1.0), 0..20),
        split in 0usize..20,
    ) {
        let thresholds = HpThresholds::new(0.5, 0.7);
        let mut one_pass = RoiInfo::new();
        for (roi, polarity, confidence) in &observations {
            one_pass.observe(roi, *polarity, Some(*confidence), thresholds);
        }

        let split = split.min(observations.len());
        let mut text = String::new();
        for (roi, polarity, confidence) in observations[split..].iter().chain(&observations[..split]) {
            text = apply_observation(&text, roi, *polarity, *confidence, thresholds.pre, thresholds.post)
                .expect("apply");
        }
        prop_assert_eq!(RoiInfo::decode(&text).expect("decode"), one_pass);
    }
}

// =============================================================================
// MERGE
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Connections to a common neighbour add up across donors.
    #[test]
    fn common_neighbour_weights_add_up(weights in prop::array::uniform6(1i64..1000)) {
        let store = Store::in_memory();
        Loader::load_fixture(&store, &star(weights, &[])).expect("load");

        let action = MergeAction::new(BodyId(1), vec![BodyId(2), BodyId(3)], 10, Vec::new());
        MergeEngine::merge_entities(&store, DATASET, &action).expect("merge");

        let [s_out, d1_out, d2_out, s_in, d1_in, d2_in] = weights;
        prop_assert_eq!(weight(&store, 1, 4), s_out + d1_out + d2_out);
        prop_assert_eq!(weight(&store, 4, 1), s_in + d1_in + d2_in);
    }

    /// pre + post of the survivor equals the length of the final list, and
    /// the summary agrees with a full recount.
    #[test]
    fn counts_follow_any_final_list(
        sites in btree_map(0i64..200, polarity(), 1..30),
        keep in vec(any::<bool>(), 30),
    ) {
        let sites: Vec<(i64, Polarity)> = sites.into_iter().collect();
        let store = Store::in_memory();
        Loader::load_fixture(&store, &star([1; 6], &sites)).expect("load");

        let synapses: Vec<SynapseEntry> = sites
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|((x, polarity), _)| SynapseEntry {
                polarity: *polarity,
                location: Location::new(*x, 0, 0),
            })
            .collect();
        let action = MergeAction::new(BodyId(1), vec![BodyId(2)], 10, synapses.clone());
        let merged = MergeEngine::merge_entities(&store, DATASET, &action).expect("merge");

        prop_assert_eq!((merged.pre + merged.post) as usize, synapses.len());

        let graph = store.snapshot();
        let summary = SummaryRecord::load(&*graph, DATASET).expect("summary");
        prop_assert_eq!(summary.counts(), SummaryCounts::recount(&*graph, DATASET));
    }
}
