//! # Store
//!
//! Owns the committed graph and runs the commit pipeline.
//!
//! ```text
//! begin ─► Transaction (snapshot + overlay)
//!              │
//! commit ─► change tracker ─► timestamping ─┐
//!                                           ▼  (commit lock)
//!           conflict check ─► summary rebase ─► redb write ─► publish
//! ```
//!
//! Concurrency is optimistic. A transaction's write set is every node,
//! relationship and identity key it staged; a relationship write also counts
//! as a write to both endpoints. If any of them was committed by another
//! transaction after this one's snapshot was taken, the commit fails with
//! `ConcurrentModification` and nothing is published. Summary records are
//! exempt because their counters are rebased at commit.

use crate::clock::{Clock, SystemClock};
use crate::graph::{Graph, GraphView};
use crate::storage::RedbGraph;
use crate::summary::{SummaryMaintainer, compute_deltas};
use crate::tracker::{ChangeSet, ChangeTracker};
use crate::transaction::{IdAllocator, Transaction};
use crate::{EntityKind, NeuroError, NodeId, NodeKey, RelId, Timestamp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// Outcome of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Store version after the commit. Unchanged for an empty transaction.
    pub version: u64,
    pub timestamp: Timestamp,
    pub mutations: usize,
    pub changes: ChangeSet,
    /// Summary records written by the maintainer.
    pub summaries: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct StoreState {
    graph: Arc<Graph>,
    version: u64,
    node_versions: BTreeMap<NodeId, u64>,
    rel_versions: BTreeMap<RelId, u64>,
    key_versions: BTreeMap<NodeKey, u64>,
    persistence: Option<RedbGraph>,
}

/// Everything a transaction wrote, for conflict detection.
#[derive(Debug, Default)]
struct WriteSet {
    nodes: BTreeSet<NodeId>,
    relationships: BTreeSet<RelId>,
    keys: BTreeSet<NodeKey>,
}

impl WriteSet {
    fn of(tx: &Transaction) -> Self {
        let overlay = tx.overlay();
        let mut set = Self::default();

        set.nodes.extend(overlay.nodes.keys().copied());
        set.nodes.extend(overlay.outgoing.keys().copied());
        set.nodes.extend(overlay.incoming.keys().copied());
        for id in overlay.relationships.keys() {
            set.relationships.insert(*id);
            let rel = tx.relationship(*id).or_else(|| tx.base().relationship(*id));
            if let Some(rel) = rel {
                set.nodes.insert(rel.from);
                set.nodes.insert(rel.to);
            }
        }
        set.keys.extend(overlay.keys.keys().cloned());

        let is_summary = |id: &NodeId| {
            tx.node(*id)
                .or_else(|| tx.base().node(*id))
                .is_some_and(|n| n.kind == EntityKind::Summary)
        };
        set.nodes.retain(|id| !is_summary(id));
        set
    }
}

/// The transactional property-graph store.
pub struct Store {
    state: RwLock<StoreState>,
    ids: Arc<IdAllocator>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Store")
            .field("version", &state.version)
            .field("nodes", &state.graph.node_count())
            .field("persistent", &state.persistence.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Store {
    /// An empty store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            ids: Arc::new(IdAllocator::new(0, 0)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Open (or create) a store persisted in a redb database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NeuroError> {
        let db = RedbGraph::open(path)?;
        let persisted = db.load()?;
        Ok(Self {
            state: RwLock::new(StoreState {
                graph: Arc::new(persisted.graph),
                version: persisted.version,
                persistence: Some(db),
                ..StoreState::default()
            }),
            ids: Arc::new(IdAllocator::new(
                persisted.next_node_id,
                persisted.next_rel_id,
            )),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the timestamp source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The latest committed graph.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Graph> {
        Arc::clone(&self.state.read().graph)
    }

    /// Number of commits so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Open a transaction on the latest committed graph.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        let (graph, version) = {
            let state = self.state.read();
            (Arc::clone(&state.graph), state.version)
        };
        Transaction::new(graph, version, self.clock.now(), Arc::clone(&self.ids))
    }

    /// Run `f` in a fresh transaction and commit it. Any error aborts.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&mut Transaction) -> Result<T, NeuroError>,
    ) -> Result<(T, CommitReport), NeuroError> {
        let mut tx = self.begin();
        let value = f(&mut tx)?;
        let report = self.commit(tx)?;
        Ok((value, report))
    }

    /// Publish a transaction.
    pub fn commit(&self, mut tx: Transaction) -> Result<CommitReport, NeuroError> {
        let timestamp = tx.timestamp();
        if tx.log().is_empty() {
            return Ok(CommitReport {
                version: tx.base_version(),
                timestamp,
                ..CommitReport::default()
            });
        }

        let changes = ChangeTracker::classify(tx.log(), &tx);
        let deltas = compute_deltas(tx.log(), &tx);
        SummaryMaintainer::stamp(&mut tx, &changes)?;

        let mut state = self.state.write();

        let writes = WriteSet::of(&tx);
        check_conflicts(&state, &writes, tx.base_version())?;

        let summaries = SummaryMaintainer::rebase(&mut tx, &state.graph, &changes, &deltas)?;
        let version = state.version.saturating_add(1);
        let mutations = tx.log().len();
        let (overlay, _log) = tx.into_parts();

        if let Some(db) = &state.persistence {
            db.persist(&overlay, self.ids.peek(), version)?;
        }

        Arc::make_mut(&mut state.graph).apply(&overlay);
        state.version = version;
        for id in writes.nodes {
            state.node_versions.insert(id, version);
        }
        for id in writes.relationships {
            state.rel_versions.insert(id, version);
        }
        for key in writes.keys {
            state.key_versions.insert(key, version);
        }

        tracing::debug!(
            version,
            mutations,
            stamped = changes.timestamp_set.len(),
            "transaction committed"
        );

        Ok(CommitReport {
            version,
            timestamp,
            mutations,
            changes,
            summaries,
        })
    }
}

fn check_conflicts(state: &StoreState, writes: &WriteSet, base: u64) -> Result<(), NeuroError> {
    let conflict = |what: String, committed: u64| {
        tracing::info!(%what, committed, snapshot = base, "write conflict");
        NeuroError::ConcurrentModification(format!(
            "{} was modified at version {} after snapshot {}",
            what, committed, base
        ))
    };

    for id in &writes.nodes {
        if let Some(&v) = state.node_versions.get(id)
            && v > base
        {
            return Err(conflict(format!("node {}", id.0), v));
        }
    }
    for id in &writes.relationships {
        if let Some(&v) = state.rel_versions.get(id)
            && v > base
        {
            return Err(conflict(format!("relationship {}", id.0), v));
        }
    }
    for key in &writes.keys {
        if let Some(&v) = state.key_versions.get(key)
            && v > base
        {
            return Err(conflict(key.to_string(), v));
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
