//! # neuroproof-core
//!
//! The transactional merge engine for connectome property graphs.
//!
//! A dataset is a property graph of segments, synapses, synapse sets,
//! neuron parts, skeletons and provenance records. Proofreaders submit merge
//! instructions; the engine folds donor segments into a survivor, keeps every
//! derived aggregate consistent and leaves an auditable history behind.
//!
//! ## Architecture
//!
//! - `store` holds the committed graph and runs the commit pipeline
//! - `transaction` stages writes copy-on-write and logs every mutation
//! - `tracker` and `summary` observe the log and maintain timestamps and
//!   per-dataset counters before anything is published
//! - `merge` is the merge state machine, `reconcile` and `roi_info` its
//!   aggregate arithmetic
//! - `storage` persists committed graphs in redb
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - Deterministic: BTreeMap/BTreeSet only
//! - Every write goes through a `Transaction`; an aborted transaction leaves
//!   no trace

// =============================================================================
// MODULES
// =============================================================================

pub mod clock;
pub mod graph;
pub mod history;
pub mod loader;
pub mod merge;
pub mod model;
pub mod mutation;
pub mod primitives;
pub mod reconcile;
pub mod roi_info;
pub mod storage;
pub mod store;
pub mod summary;
pub mod tracker;
pub mod transaction;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    BodyId, EntityKind, Location, NeuroError, Node, NodeId, NodeKey, Polarity, Properties,
    PropertyValue, RelId, RelKind, Relationship, Timestamp, merged_property_name,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use clock::{Clock, FixedClock, SystemClock};
pub use graph::{Graph, GraphView, Overlay};
pub use history::{DonorRecord, HistoryForest, HistoryRecord};
pub use loader::{DatasetFixture, LoadReport, Loader};
pub use merge::{MergeAction, MergeEngine, SynapseEntry};
pub use model::{ConnectionView, Segment, SummaryRecord, SynapseView};
pub use mutation::{Mutation, MutationLog};
pub use reconcile::{ConnectionWeights, reconcile};
pub use roi_info::{HpThresholds, RoiInfo, SynapseCounter, apply_observation};
pub use storage::RedbGraph;
pub use store::{CommitReport, Store};
pub use summary::{SummaryCounts, SummaryMaintainer};
pub use tracker::{ChangeSet, ChangeTracker};
pub use transaction::Transaction;
