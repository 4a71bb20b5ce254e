//! # Merge Scenario Tests
//!
//! End-to-end merges against a small loaded dataset.
//!
//! ## Fixture
//! - bodies 1..4, connections 1→3 (7), 2→3 (23), 3→1 (13), 3→2 (5),
//!   1→2 (5), 2→1 (37)
//! - bodies 1, 2 and 3 own synapse sets; body 2 owns a skeleton

use neuroproof_core::graph::ghost_body_id;
use neuroproof_core::loader::{
    ConnectionRecord, SegmentRecord, SkelNodeRecord, SkeletonRecord, SynapseRecord,
    SynapseSetRecord,
};
use neuroproof_core::primitives::{
    BODY_ID, NAME, POST, PRE, RESULT_BODY_ID, ROI_INFO, SIZE, SYNAPSE_TYPE, TIME_STAMP,
    WEIGHT,
};
use neuroproof_core::{
    BodyId, DatasetFixture, EntityKind, FixedClock, GraphView, HistoryForest, Loader, Location,
    MergeAction, MergeEngine, NeuroError, NodeId, Polarity, RelKind, RoiInfo, Segment, Store,
    SummaryCounts, SummaryRecord, SynapseEntry,
};
use std::sync::Arc;

const DATASET: &str = "test";

fn site(x: i64) -> Location {
    Location::new(x, 0, 0)
}

fn synapse(x: i64, polarity: Polarity, confidence: f64, roi: &str) -> SynapseRecord {
    SynapseRecord {
        location: site(x),
        polarity,
        confidence: Some(confidence),
        rois: vec![roi.to_string()],
    }
}

fn segment(body: i64, rois: &[&str]) -> SegmentRecord {
    let mut record = SegmentRecord::new(BodyId(body));
    record.name = Some(format!("neuron{}", body));
    record.size = Some(body * 100);
    record.rois = rois.iter().map(|r| r.to_string()).collect();
    record
}

fn fixture() -> DatasetFixture {
    let connection = |pre: i64, post: i64, weight: i64| ConnectionRecord {
        pre: BodyId(pre),
        post: BodyId(post),
        weight,
    };
    DatasetFixture {
        dataset: DATASET.to_string(),
        pre_hp_threshold: Some(0.5),
        post_hp_threshold: Some(0.5),
        segments: vec![
            segment(1, &["roiA"]),
            segment(2, &["roiB"]),
            segment(3, &["roiA"]),
            segment(4, &[]),
        ],
        synapses: vec![
            synapse(1, Polarity::Pre, 0.9, "roiA"),
            synapse(2, Polarity::Post, 0.3, "roiA"),
            synapse(3, Polarity::Pre, 0.9, "roiB"),
            synapse(4, Polarity::Post, 0.8, "roiB"),
            synapse(5, Polarity::Post, 0.8, "roiA"),
        ],
        synapses_to: Vec::new(),
        synapse_sets: vec![
            SynapseSetRecord {
                body_id: BodyId(1),
                synapses: vec![site(1), site(2)],
            },
            SynapseSetRecord {
                body_id: BodyId(2),
                synapses: vec![site(3), site(4)],
            },
            SynapseSetRecord {
                body_id: BodyId(3),
                synapses: vec![site(5)],
            },
        ],
        connections: vec![
            connection(1, 3, 7),
            connection(2, 3, 23),
            connection(3, 1, 13),
            connection(3, 2, 5),
            connection(1, 2, 5),
            connection(2, 1, 37),
        ],
        skeletons: vec![SkeletonRecord {
            body_id: BodyId(2),
            nodes: vec![
                SkelNodeRecord {
                    location: site(10),
                    radius: Some(2.0),
                    parent: None,
                },
                SkelNodeRecord {
                    location: site(11),
                    radius: Some(1.5),
                    parent: Some(site(10)),
                },
            ],
        }],
    }
}

fn loaded() -> (Store, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(1_000));
    let store = Store::in_memory().with_clock(clock.clone());
    Loader::load_fixture(&store, &fixture()).expect("load");
    clock.advance(1_000);
    (store, clock)
}

fn entries(sites: &[(i64, Polarity)]) -> Vec<SynapseEntry> {
    sites
        .iter()
        .map(|(x, polarity)| SynapseEntry {
            polarity: *polarity,
            location: site(*x),
        })
        .collect()
}

/// Merge body 2 into body 1, keeping all four of their synapses.
fn merge_two_into_one() -> MergeAction {
    MergeAction::new(
        BodyId(1),
        vec![BodyId(2)],
        300,
        entries(&[
            (1, Polarity::Pre),
            (2, Polarity::Post),
            (3, Polarity::Pre),
            (4, Polarity::Post),
        ]),
    )
}

fn node_of(store: &Store, body: i64) -> NodeId {
    store
        .snapshot()
        .segment(DATASET, BodyId(body))
        .map(|n| n.id)
        .expect("segment")
}

fn weight_between(store: &Store, from: i64, to: i64) -> Vec<i64> {
    let graph = store.snapshot();
    let from = graph.segment(DATASET, BodyId(from)).expect("from").id;
    let to = graph.segment(DATASET, BodyId(to)).expect("to").id;
    graph
        .outgoing(from, RelKind::ConnectsTo)
        .into_iter()
        .filter(|r| r.to == to)
        .map(|r| r.int(WEIGHT).unwrap_or(0))
        .collect()
}

// =============================================================================
// CONNECTIONS
// =============================================================================

mod connections {
    use super::*;

    #[test]
    fn calibration_weights_are_summed() {
        let (store, _) = loaded();
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        assert_eq!(weight_between(&store, 1, 3), vec![30]);
        assert_eq!(weight_between(&store, 3, 1), vec![18]);
    }

    #[test]
    fn merge_created_self_edges_are_dropped() {
        let (store, _) = loaded();
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        assert!(weight_between(&store, 1, 1).is_empty());
        let graph = store.snapshot();
        let connections = graph
            .relationships()
            .filter(|r| r.kind == RelKind::ConnectsTo)
            .count();
        assert_eq!(connections, 2);
    }

    #[test]
    fn donor_keeps_no_connections() {
        let (store, _) = loaded();
        let donor = node_of(&store, 2);
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        let graph = store.snapshot();
        assert!(graph.outgoing(donor, RelKind::ConnectsTo).is_empty());
        assert!(graph.incoming(donor, RelKind::ConnectsTo).is_empty());
    }

    #[test]
    fn malformed_connection_aggregate_aborts_merge() {
        let (store, _) = loaded();
        store
            .write(|tx| {
                let from = tx.segment(DATASET, BodyId(2)).map(|n| n.id).expect("donor");
                let rel = tx.outgoing(from, RelKind::ConnectsTo)[0].id;
                tx.set_relationship_property(rel, ROI_INFO, "not json")
            })
            .expect("corrupt");
        let version = store.version();

        let result = MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one());
        assert!(matches!(result, Err(NeuroError::MalformedAggregate(_))));
        assert_eq!(store.version(), version);
        assert!(store.snapshot().segment(DATASET, BodyId(2)).is_some());
    }
}

// =============================================================================
// SYNAPSES AND REGIONS
// =============================================================================

mod synapses {
    use super::*;
    use neuroproof_core::model::synapses_of;

    #[test]
    fn counts_follow_final_list() {
        let (store, _) = loaded();
        let action = merge_two_into_one();
        let merged = MergeEngine::merge_entities(&store, DATASET, &action).expect("merge");

        assert_eq!(
            (merged.pre + merged.post) as usize,
            action.result_body_synapses.len()
        );
        assert_eq!((merged.pre, merged.post), (2, 2));
        assert_eq!(merged.size, Some(300));
    }

    #[test]
    fn one_synapse_set_survives_with_the_union() {
        let (store, _) = loaded();
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        let graph = store.snapshot();
        let survivor = node_of(&store, 1);
        let sets: Vec<_> = graph
            .outgoing(survivor, RelKind::Contains)
            .into_iter()
            .filter(|r| {
                graph
                    .node(r.to)
                    .is_some_and(|n| n.kind == EntityKind::SynapseSet)
            })
            .collect();
        assert_eq!(sets.len(), 1);

        let locations: Vec<Location> = synapses_of(&*graph, survivor)
            .into_iter()
            .map(|s| s.location)
            .collect();
        assert_eq!(locations, vec![site(1), site(2), site(3), site(4)]);

        // body 3 keeps its own set, the donor's is gone
        assert_eq!(
            graph.nodes_of_kind(DATASET, EntityKind::SynapseSet).len(),
            2
        );
    }

    #[test]
    fn dropped_synapse_leaves_the_set() {
        let (store, _) = loaded();
        let action = MergeAction::new(
            BodyId(1),
            vec![BodyId(2)],
            300,
            entries(&[(1, Polarity::Pre), (3, Polarity::Pre), (4, Polarity::Post)]),
        );
        let merged = MergeEngine::merge_entities(&store, DATASET, &action).expect("merge");
        assert_eq!((merged.pre, merged.post), (2, 1));

        let graph = store.snapshot();
        let locations: Vec<Location> = synapses_of(&*graph, merged.id)
            .into_iter()
            .map(|s| s.location)
            .collect();
        assert_eq!(locations, vec![site(1), site(3), site(4)]);
        assert!(graph.find(&neuroproof_core::NodeKey::synapse(DATASET, site(2))).is_none());
    }

    #[test]
    fn polarity_disagreeing_with_stored_synapse_is_rejected() {
        let (store, _) = loaded();
        let version = store.version();
        let action = MergeAction::new(
            BodyId(1),
            vec![BodyId(2)],
            300,
            entries(&[
                (1, Polarity::Post),
                (2, Polarity::Post),
                (3, Polarity::Pre),
                (4, Polarity::Post),
            ]),
        );

        let result = MergeEngine::merge_entities(&store, DATASET, &action);
        assert!(matches!(result, Err(NeuroError::InvalidMergeInstruction(_))));
        assert_eq!(store.version(), version);

        let graph = store.snapshot();
        let synapse = graph
            .find(&neuroproof_core::NodeKey::synapse(DATASET, site(1)))
            .expect("synapse");
        assert_eq!(
            graph.node(synapse).and_then(|n| n.text(SYNAPSE_TYPE)),
            Some("pre")
        );
    }

    #[test]
    fn synapse_of_body_outside_merge_is_rejected() {
        let (store, _) = loaded();
        let version = store.version();
        let action = MergeAction::new(
            BodyId(1),
            vec![BodyId(2)],
            300,
            entries(&[
                (1, Polarity::Pre),
                (2, Polarity::Post),
                (3, Polarity::Pre),
                (4, Polarity::Post),
                (5, Polarity::Post),
            ]),
        );

        let result = MergeEngine::merge_entities(&store, DATASET, &action);
        assert!(matches!(result, Err(NeuroError::InvalidMergeInstruction(_))));
        assert_eq!(store.version(), version);

        // body 3 still holds its synapse
        let graph = store.snapshot();
        let locations: Vec<Location> = synapses_of(&*graph, node_of(&store, 3))
            .into_iter()
            .map(|s| s.location)
            .collect();
        assert_eq!(locations, vec![site(5)]);
    }

    #[test]
    fn unowned_listed_location_is_created_with_its_polarity() {
        let (store, _) = loaded();
        let action = MergeAction::new(
            BodyId(1),
            vec![BodyId(2)],
            300,
            entries(&[(1, Polarity::Pre), (6, Polarity::Post)]),
        );
        let merged = MergeEngine::merge_entities(&store, DATASET, &action).expect("merge");
        assert_eq!((merged.pre, merged.post), (1, 1));

        let graph = store.snapshot();
        let synapse = graph
            .find(&neuroproof_core::NodeKey::synapse(DATASET, site(6)))
            .expect("created synapse");
        assert_eq!(
            graph.node(synapse).and_then(|n| n.text(SYNAPSE_TYPE)),
            Some("post")
        );
    }

    #[test]
    fn neuron_parts_are_rebuilt_per_region() {
        let (store, _) = loaded();
        let merged =
            MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        let graph = store.snapshot();
        let mut parts: Vec<(String, i64, i64, i64)> = graph
            .incoming(merged.id, RelKind::PartOf)
            .into_iter()
            .filter_map(|r| graph.node(r.from))
            .map(|p| {
                (
                    p.text("roi").unwrap_or_default().to_string(),
                    p.int(PRE).unwrap_or(0),
                    p.int(POST).unwrap_or(0),
                    p.int(SIZE).unwrap_or(0),
                )
            })
            .collect();
        parts.sort();
        assert_eq!(
            parts,
            vec![
                ("roiA".to_string(), 1, 1, 2),
                ("roiB".to_string(), 1, 1, 2)
            ]
        );
        // body 3 keeps its part, the donor's is gone
        assert_eq!(graph.nodes_of_kind(DATASET, EntityKind::NeuronPart).len(), 3);
    }

    #[test]
    fn region_labels_and_aggregate_follow_synapses() {
        let (store, _) = loaded();
        let merged =
            MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        assert_eq!(merged.regions, vec!["roiA".to_string(), "roiB".to_string()]);
        let roi_a = merged.roi_info.get("roiA");
        assert_eq!((roi_a.pre, roi_a.pre_hp, roi_a.post, roi_a.post_hp), (1, 1, 1, 0));
        let roi_b = merged.roi_info.get("roiB");
        assert_eq!((roi_b.pre, roi_b.pre_hp, roi_b.post, roi_b.post_hp), (1, 1, 1, 1));
    }

    #[test]
    fn region_label_removed_when_no_synapse_remains() {
        let (store, _) = loaded();
        let action = MergeAction::new(
            BodyId(1),
            vec![BodyId(2)],
            300,
            entries(&[(3, Polarity::Pre), (4, Polarity::Post)]),
        );
        let merged = MergeEngine::merge_entities(&store, DATASET, &action).expect("merge");
        assert_eq!(merged.regions, vec!["roiB".to_string()]);
        assert_eq!(merged.roi_info.len(), 1);
    }
}

// =============================================================================
// DONORS AND PROVENANCE
// =============================================================================

mod provenance {
    use super::*;

    #[test]
    fn donor_becomes_ghost_with_merged_properties() {
        let (store, _) = loaded();
        let donor = node_of(&store, 2);
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        let graph = store.snapshot();
        assert!(graph.segment(DATASET, BodyId(2)).is_none());
        let ghost = graph.node(donor).expect("ghost");
        assert_eq!(ghost.kind, EntityKind::Ghost);
        assert!(ghost.labels.is_empty());
        assert_eq!(ghost_body_id(ghost), Some(BodyId(2)));
        assert_eq!(ghost.int("mergedSize"), Some(200));
        assert_eq!(ghost.text("mergedName"), Some("neuron2"));
        assert!(ghost.property(BODY_ID).is_none());
        assert!(ghost.property(NAME).is_none());
        assert!(graph.ghosts(DATASET, BodyId(2)).contains(&donor));
    }

    #[test]
    fn ghost_has_exactly_one_merged_to_edge() {
        let (store, _) = loaded();
        let donor = node_of(&store, 2);
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        let graph = store.snapshot();
        let rels = graph.relationship_ids_of(donor);
        assert_eq!(rels.len(), 1);
        let merged_to = graph.outgoing(donor, RelKind::MergedTo);
        assert_eq!(merged_to.len(), 1);
        let history = graph.node(merged_to[0].to).expect("history");
        assert_eq!(history.kind, EntityKind::History);
        assert_eq!(history.int(RESULT_BODY_ID), Some(1));
        assert_eq!(history.int("priorPre"), Some(1));
        assert_eq!(history.int("priorSize"), Some(100));
    }

    #[test]
    fn donor_skeleton_is_deleted() {
        let (store, _) = loaded();
        assert_eq!(
            store
                .snapshot()
                .nodes_of_kind(DATASET, EntityKind::SkelNode)
                .len(),
            2
        );
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");

        let graph = store.snapshot();
        assert!(graph.nodes_of_kind(DATASET, EntityKind::Skeleton).is_empty());
        assert!(graph.nodes_of_kind(DATASET, EntityKind::SkelNode).is_empty());
    }

    #[test]
    fn resubmitted_merge_is_already_merged() {
        let (store, _) = loaded();
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");
        let version = store.version();

        let result = MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one());
        assert!(matches!(result, Err(NeuroError::AlreadyMerged(_))));
        assert_eq!(store.version(), version);
    }

    #[test]
    fn unknown_body_is_invalid() {
        let (store, _) = loaded();
        let version = store.version();
        let action = MergeAction::new(BodyId(1), vec![BodyId(99)], 0, Vec::new());

        let result = MergeEngine::merge_entities(&store, DATASET, &action);
        assert!(matches!(result, Err(NeuroError::InvalidMergeInstruction(_))));
        assert_eq!(store.version(), version);
    }

    #[test]
    fn recursive_merge_builds_depth_two_history() {
        let (store, _) = loaded();
        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("first");

        let second = MergeAction::new(
            BodyId(1),
            vec![BodyId(3)],
            600,
            entries(&[
                (1, Polarity::Pre),
                (2, Polarity::Post),
                (3, Polarity::Pre),
                (4, Polarity::Post),
                (5, Polarity::Post),
            ]),
        );
        let merged = MergeEngine::merge_entities(&store, DATASET, &second).expect("second");
        assert_eq!((merged.pre, merged.post), (2, 3));

        let graph = store.snapshot();
        let forest = HistoryForest::for_body(&*graph, DATASET, BodyId(1));
        assert_eq!(forest.len(), 2);
        assert_eq!(forest.depth(), 2);
        assert_eq!(
            forest.merged_body_ids(),
            [BodyId(2), BodyId(3)].into_iter().collect()
        );
        let root = forest.root().expect("root");
        assert_eq!(root.prior_pre, Some(2));
        assert!(root.previous.is_some());

        // every connection of the survivor collapsed into self-edges
        assert!(weight_between(&store, 1, 1).is_empty());
    }

    #[test]
    fn donor_history_is_kept_when_survivor_absorbs_it() {
        let (store, _) = loaded();
        // 3 absorbs 4 first, then 1 absorbs 3
        let first = MergeAction::new(BodyId(3), vec![BodyId(4)], 300, entries(&[(5, Polarity::Post)]));
        MergeEngine::merge_entities(&store, DATASET, &first).expect("first");
        let second = MergeAction::new(
            BodyId(1),
            vec![BodyId(3)],
            400,
            entries(&[(1, Polarity::Pre), (2, Polarity::Post), (5, Polarity::Post)]),
        );
        MergeEngine::merge_entities(&store, DATASET, &second).expect("second");

        let graph = store.snapshot();
        let forest = HistoryForest::for_body(&*graph, DATASET, BodyId(1));
        assert_eq!(forest.depth(), 2);
        let donor = &forest.root().expect("root").donors[0];
        assert_eq!(donor.body_id, Some(BodyId(3)));
        assert!(donor.history.is_some());
    }
}

// =============================================================================
// TRANSACTIONS, TIMESTAMPS, SUMMARY
// =============================================================================

mod bookkeeping {
    use super::*;

    #[test]
    fn merge_stamps_touched_entities() {
        let (store, _) = loaded();
        let untouched = node_of(&store, 4);
        let merged =
            MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");
        assert_eq!(merged.time_stamp.map(|t| t.millis()), Some(2_000));

        let graph = store.snapshot();
        assert_eq!(
            graph.node(untouched).and_then(|n| n.int(TIME_STAMP)),
            Some(1_000)
        );
        for rel in graph.outgoing(merged.id, RelKind::ConnectsTo) {
            assert_eq!(rel.int(TIME_STAMP), Some(2_000));
        }
        let summary = SummaryRecord::load(&*graph, DATASET).expect("summary");
        assert_eq!(summary.last_database_edit.map(|t| t.millis()), Some(2_000));
    }

    #[test]
    fn summary_matches_recount_after_merges() {
        let (store, _) = loaded();
        let before = SummaryRecord::load(&*store.snapshot(), DATASET).expect("summary");
        assert_eq!(before.total_connection_count, 6);
        assert_eq!(before.total_synapse_count, 5);

        MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");
        let dropping = MergeAction::new(
            BodyId(1),
            vec![BodyId(4)],
            300,
            entries(&[(1, Polarity::Pre), (3, Polarity::Pre)]),
        );
        MergeEngine::merge_entities(&store, DATASET, &dropping).expect("merge");

        let graph = store.snapshot();
        let summary = SummaryRecord::load(&*graph, DATASET).expect("summary");
        assert_eq!(summary.counts(), SummaryCounts::recount(&*graph, DATASET));
        assert_eq!(summary.total_connection_count, 2);
        assert_eq!(summary.total_synapse_count, 3);
    }

    #[test]
    fn overlapping_merges_conflict_once() {
        let (store, _) = loaded();
        let mut first = store.begin();
        let mut second = store.begin();

        MergeEngine::apply(&mut first, DATASET, &merge_two_into_one()).expect("stage first");
        let other = MergeAction::new(BodyId(3), vec![BodyId(2)], 10, entries(&[(5, Polarity::Post)]));
        MergeEngine::apply(&mut second, DATASET, &other).expect("stage second");

        store.commit(first).expect("commit first");
        let result = store.commit(second);
        let error = result.expect_err("conflict");
        assert!(matches!(error, NeuroError::ConcurrentModification(_)));
        assert!(error.is_retryable());

        let graph = store.snapshot();
        assert!(graph.segment(DATASET, BodyId(3)).is_some());
        assert!(graph.segment(DATASET, BodyId(2)).is_none());
    }

    #[test]
    fn merge_from_json_applies_instruction() {
        let (store, _) = loaded();
        let json = r#"{"Action":"merge","ResultBodyID":1,"BodiesMerged":[2],"ResultBodySize":300,
            "ResultBodySynapses":[{"Type":"pre","Location":[1,0,0]},{"Type":"post","Location":[4,0,0]}]}"#;
        let merged = MergeEngine::merge_from_json(&store, DATASET, json).expect("merge");
        assert_eq!((merged.pre, merged.post), (1, 1));
        assert_eq!(merged.body_id, BodyId(1));
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

mod persistence {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn merged_graph_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("neuroproof.redb");

        // Phase 1: load and merge
        let (survivor, donor) = {
            let store = Store::open(&path).expect("open");
            Loader::load_fixture(&store, &fixture()).expect("load");
            let donor = node_of(&store, 2);
            let merged =
                MergeEngine::merge_entities(&store, DATASET, &merge_two_into_one()).expect("merge");
            (merged, donor)
        };

        // Phase 2: reopen and verify
        let store = Store::open(&path).expect("reopen");
        assert_eq!(store.version(), 2);
        let graph = store.snapshot();
        let reloaded = Segment::load(&*graph, DATASET, BodyId(1))
            .expect("decode")
            .expect("segment");
        assert_eq!(reloaded, survivor);
        assert_eq!(
            graph.node(donor).map(|n| n.kind),
            Some(EntityKind::Ghost)
        );
        assert_eq!(weight_between(&store, 1, 3), vec![30]);
        assert_eq!(HistoryForest::for_body(&*graph, DATASET, BodyId(1)).len(), 1);

        // new ids do not collide with persisted ones
        let (created, _) = store
            .write(|tx| Loader::add_segment(tx, DATASET, &segment(9, &[])))
            .expect("write");
        assert!(graph.node(created).is_none());
    }

    #[test]
    fn roi_info_on_reloaded_segment_decodes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("neuroproof.redb");
        {
            let store = Store::open(&path).expect("open");
            Loader::load_fixture(&store, &fixture()).expect("load");
        }
        let store = Store::open(&path).expect("reopen");
        let graph = store.snapshot();
        let node = graph.segment(DATASET, BodyId(1)).expect("segment");
        let info = RoiInfo::decode(node.text(ROI_INFO).expect("roiInfo")).expect("decode");
        assert_eq!(info.get("roiA").pre, 1);
    }
}
