//! # Merge Benchmarks
//!
//! Performance benchmarks for neuroproof-core merges and aggregate upkeep.
//!
//! Run with: `cargo bench -p neuroproof-core`

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use neuroproof_core::loader::{ConnectionRecord, SegmentRecord, SynapseRecord, SynapseSetRecord};
use neuroproof_core::{
    BodyId, DatasetFixture, Loader, Location, MergeAction, MergeEngine, Polarity, RoiInfo, Store,
    SummaryCounts, SynapseEntry,
};
use std::hint::black_box;

const DATASET: &str = "bench";

/// `donors` bodies each owning `per_body` synapses and connected to a hub.
fn fixture(donors: i64, per_body: i64) -> DatasetFixture {
    let bodies = donors + 1;
    let mut fixture = DatasetFixture {
        dataset: DATASET.to_string(),
        pre_hp_threshold: None,
        post_hp_threshold: None,
        segments: Vec::new(),
        synapses: Vec::new(),
        synapses_to: Vec::new(),
        synapse_sets: Vec::new(),
        connections: Vec::new(),
        skeletons: Vec::new(),
    };
    fixture.segments.push(SegmentRecord::new(BodyId(0)));
    for body in 1..=bodies {
        fixture.segments.push(SegmentRecord::new(BodyId(body)));
        let mut set = Vec::new();
        for i in 0..per_body {
            let location = Location::new(body, i, 0);
            fixture.synapses.push(SynapseRecord {
                location,
                polarity: if i % 2 == 0 { Polarity::Pre } else { Polarity::Post },
                confidence: Some(0.9),
                rois: vec![format!("roi{}", i % 4)],
            });
            set.push(location);
        }
        fixture.synapse_sets.push(SynapseSetRecord {
            body_id: BodyId(body),
            synapses: set,
        });
        fixture.connections.push(ConnectionRecord {
            pre: BodyId(body),
            post: BodyId(0),
            weight: body,
        });
    }
    fixture
}

fn action(fixture: &DatasetFixture, donors: i64) -> MergeAction {
    let synapses = fixture
        .synapses
        .iter()
        .map(|s| SynapseEntry {
            polarity: s.polarity,
            location: s.location,
        })
        .collect();
    MergeAction::new(
        BodyId(1),
        (2..=donors + 1).map(BodyId).collect(),
        1000,
        synapses,
    )
}

fn loaded(fixture: &DatasetFixture) -> Store {
    let store = Store::in_memory();
    Loader::load_fixture(&store, fixture).expect("load");
    store
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_entities");

    for donors in [1_i64, 10, 50].iter() {
        let fixture = fixture(*donors, 20);
        let action = action(&fixture, *donors);

        group.bench_with_input(BenchmarkId::from_parameter(donors), donors, |b, _| {
            b.iter_batched(
                || loaded(&fixture),
                |store| black_box(MergeEngine::merge_entities(&store, DATASET, &action)),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_recount(c: &mut Criterion) {
    let mut group = c.benchmark_group("summary_recount");

    for bodies in [10_i64, 100].iter() {
        let store = loaded(&fixture(*bodies, 20));
        let graph = store.snapshot();

        group.bench_with_input(BenchmarkId::from_parameter(bodies), bodies, |b, _| {
            b.iter(|| black_box(SummaryCounts::recount(&*graph, DATASET)));
        });
    }

    group.finish();
}

fn bench_roi_info_codec(c: &mut Criterion) {
    let mut info = RoiInfo::new();
    for i in 0..64 {
        info.increment(&format!("roi{}", i), Polarity::Pre, i % 3 == 0);
        info.increment(&format!("roi{}", i), Polarity::Post, i % 2 == 0);
    }
    let text = info.encode().expect("encode");

    c.bench_function("roi_info_decode", |b| {
        b.iter(|| black_box(RoiInfo::decode(black_box(&text))))
    });
    c.bench_function("roi_info_encode", |b| b.iter(|| black_box(info.encode())));
}

criterion_group!(benches, bench_merge, bench_recount, bench_roi_info_codec);
criterion_main!(benches);
