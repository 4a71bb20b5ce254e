//! # Storage
//!
//! Disk persistence for the committed graph.

pub mod redb_graph;

pub use redb_graph::{PersistedGraph, RedbGraph};
