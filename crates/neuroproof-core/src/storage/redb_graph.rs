//! # redb-backed Graph Storage
//!
//! Durable copy of the committed graph in a redb embedded database, providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! The in-memory [`Graph`] stays the source of truth for reads. On open, the
//! whole graph is loaded from disk; on every store commit, the transaction's
//! overlay is written in a single redb write transaction *before* it is
//! published in memory, so a failed write leaves both copies unchanged.
//!
//! Rows are postcard-encoded `Node` and `Relationship` values keyed by id.

use crate::graph::{Graph, Overlay};
use crate::{NeuroError, Node, Relationship};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for nodes: NodeId(u64) -> serialized Node bytes
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for relationships: RelId(u64) -> serialized Relationship bytes
const RELATIONSHIPS: TableDefinition<u64, &[u8]> = TableDefinition::new("relationships");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_NODE_ID: &str = "next_node_id";
const NEXT_REL_ID: &str = "next_rel_id";
const VERSION: &str = "version";

/// Everything needed to resume a store from disk.
#[derive(Debug, Default)]
pub struct PersistedGraph {
    pub graph: Graph,
    pub next_node_id: u64,
    pub next_rel_id: u64,
    pub version: u64,
}

/// A redb database holding one property graph.
pub struct RedbGraph {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph").finish_non_exhaustive()
    }
}

fn io(e: impl std::fmt::Display) -> NeuroError {
    NeuroError::IoError(e.to_string())
}

fn ser(e: impl std::fmt::Display) -> NeuroError {
    NeuroError::SerializationError(e.to_string())
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NeuroError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io)?;
            let _ = write_txn.open_table(NODES).map_err(io)?;
            let _ = write_txn.open_table(RELATIONSHIPS).map_err(io)?;
            let _ = write_txn.open_table(METADATA).map_err(io)?;
            write_txn.commit().map_err(io)?;
        }

        Ok(Self { db })
    }

    /// Read the full graph back into memory.
    pub fn load(&self) -> Result<PersistedGraph, NeuroError> {
        let read_txn = self.db.begin_read().map_err(io)?;

        let mut graph = Graph::new();
        {
            let table = read_txn.open_table(NODES).map_err(io)?;
            for entry in table.iter().map_err(io)? {
                let (_, value) = entry.map_err(io)?;
                let node: Node = postcard::from_bytes(value.value()).map_err(ser)?;
                graph.insert_node(node);
            }
        }
        {
            let table = read_txn.open_table(RELATIONSHIPS).map_err(io)?;
            for entry in table.iter().map_err(io)? {
                let (key, value) = entry.map_err(io)?;
                let rel: Relationship = postcard::from_bytes(value.value()).map_err(ser)?;
                if !graph.insert_relationship(rel) {
                    tracing::warn!(rel = key.value(), "skipping relationship with missing endpoint");
                }
            }
        }

        let meta = read_txn.open_table(METADATA).map_err(io)?;
        let read = |key: &str| -> Result<Option<u64>, NeuroError> {
            Ok(meta.get(key).map_err(io)?.map(|v| v.value()))
        };
        let next_node_id = read(NEXT_NODE_ID)?
            .unwrap_or(0)
            .max(graph.next_node_id());
        let next_rel_id = read(NEXT_REL_ID)?.unwrap_or(0).max(graph.next_rel_id());
        let version = read(VERSION)?.unwrap_or(0);

        tracing::info!(
            nodes = graph.node_count(),
            relationships = graph.relationship_count(),
            version,
            "graph loaded from disk"
        );

        Ok(PersistedGraph {
            graph,
            next_node_id,
            next_rel_id,
            version,
        })
    }

    /// Write a transaction's staged changes in one ACID write.
    pub fn persist(
        &self,
        overlay: &Overlay,
        next_ids: (u64, u64),
        version: u64,
    ) -> Result<(), NeuroError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut nodes = write_txn.open_table(NODES).map_err(io)?;
            for (id, node) in &overlay.nodes {
                match node {
                    Some(node) => {
                        let bytes = postcard::to_allocvec(node).map_err(ser)?;
                        nodes.insert(id.0, bytes.as_slice()).map_err(io)?;
                    }
                    None => {
                        nodes.remove(id.0).map_err(io)?;
                    }
                }
            }

            let mut rels = write_txn.open_table(RELATIONSHIPS).map_err(io)?;
            for (id, rel) in &overlay.relationships {
                match rel {
                    Some(rel) => {
                        let bytes = postcard::to_allocvec(rel).map_err(ser)?;
                        rels.insert(id.0, bytes.as_slice()).map_err(io)?;
                    }
                    None => {
                        rels.remove(id.0).map_err(io)?;
                    }
                }
            }

            let mut meta = write_txn.open_table(METADATA).map_err(io)?;
            meta.insert(NEXT_NODE_ID, next_ids.0).map_err(io)?;
            meta.insert(NEXT_REL_ID, next_ids.1).map_err(io)?;
            meta.insert(VERSION, version).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    /// Number of persisted node rows.
    pub fn node_count(&self) -> Result<usize, NeuroError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(NODES).map_err(io)?;
        Ok(table.len().map_err(io)? as usize)
    }

    /// Number of persisted relationship rows.
    pub fn relationship_count(&self) -> Result<usize, NeuroError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(RELATIONSHIPS).map_err(io)?;
        Ok(table.len().map_err(io)? as usize)
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), NeuroError> {
        self.db.compact().map_err(io)?;
        Ok(())
    }
}
