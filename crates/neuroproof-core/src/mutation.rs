//! # Mutation Log
//!
//! The low-level record of everything a transaction did to the graph, in the
//! order it happened. The store hands it to the change tracker at commit.
//!
//! Deletions carry a snapshot of the removed element so the tracker can
//! classify it without looking into a graph where it no longer exists.

use crate::{EntityKind, Node, NodeId, RelId, RelKind, Relationship};

/// One low-level graph mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    NodeCreated {
        node: NodeId,
        kind: EntityKind,
        dataset: String,
    },
    NodeDeleted {
        node: Node,
    },
    LabelAssigned {
        node: NodeId,
        label: String,
    },
    LabelRemoved {
        node: NodeId,
        label: String,
    },
    NodePropertyAssigned {
        node: NodeId,
        key: String,
    },
    NodePropertyRemoved {
        node: NodeId,
        key: String,
    },
    RelationshipCreated {
        rel: RelId,
        kind: RelKind,
        from: NodeId,
        to: NodeId,
    },
    RelationshipDeleted {
        rel: Relationship,
    },
    RelationshipPropertyAssigned {
        rel: RelId,
        from: NodeId,
        to: NodeId,
        key: String,
    },
    RelationshipPropertyRemoved {
        rel: RelId,
        from: NodeId,
        to: NodeId,
        key: String,
    },
}

/// Ordered list of a transaction's mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationLog {
    entries: Vec<Mutation>,
}

impl MutationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, mutation: Mutation) {
        self.entries.push(mutation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Mutation> for MutationLog {
    fn from_iter<I: IntoIterator<Item = Mutation>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
