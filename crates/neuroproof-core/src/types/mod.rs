//! # Core Type Definitions
//!
//! This module contains all core types for the neuroproof property graph:
//! - Graph identifiers (`NodeId`, `RelId`) and domain identifiers
//!   (`BodyId`, `Location`)
//! - Entity and relationship tags (`EntityKind`, `RelKind`)
//! - Dataset-scoped identity keys (`NodeKey`)
//! - Property values, nodes and relationships
//! - Error types (`NeuroError`)
//!
//! ## Determinism Guarantees
//!
//! All identifier types implement `Ord` so they can live in `BTreeMap`/`BTreeSet`,
//! which keeps every iteration order in the engine reproducible.

use crate::primitives::{GHOST_LABEL, MERGED_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// GRAPH IDENTIFIERS
// =============================================================================

/// Internal identifier of a node in the property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Internal identifier of a relationship in the property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelId(pub u64);

// =============================================================================
// DOMAIN IDENTIFIERS
// =============================================================================

/// Dataset-scoped identifier of a segment (neuron body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub i64);

impl BodyId {
    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer 3D location. The identity of a synapse within a dataset.
///
/// Serialized as a `[x, y, z]` array, which is the form used by merge
/// instructions and fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "[i64; 3]", into = "[i64; 3]")]
pub struct Location {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Location {
    #[must_use]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Coordinates as a list, the form stored in node properties.
    #[must_use]
    pub fn to_vec(self) -> Vec<i64> {
        vec![self.x, self.y, self.z]
    }

    /// Parse a location back from a stored coordinate list.
    #[must_use]
    pub fn from_slice(coords: &[i64]) -> Option<Self> {
        match coords {
            [x, y, z] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }
}

impl From<[i64; 3]> for Location {
    fn from([x, y, z]: [i64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Location> for [i64; 3] {
    fn from(loc: Location) -> Self {
        [loc.x, loc.y, loc.z]
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.x, self.y, self.z)
    }
}

/// Synapse polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Pre,
    Post,
}

impl Polarity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }
}

impl FromStr for Polarity {
    type Err = NeuroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre" => Ok(Self::Pre),
            "post" => Ok(Self::Post),
            other => Err(NeuroError::SerializationError(format!(
                "unknown synapse type '{}'",
                other
            ))),
        }
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    #[must_use]
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Render as RFC 3339 (UTC). Out-of-range values render as the raw millis.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        chrono::DateTime::from_timestamp_millis(self.0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| self.0.to_string())
    }
}

// =============================================================================
// ENTITY & RELATIONSHIP KINDS
// =============================================================================

/// The kind of a node. Replaces label-based dispatch with an explicit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Segment,
    Synapse,
    SynapseSet,
    NeuronPart,
    History,
    Summary,
    Skeleton,
    SkelNode,
    /// A retired merge donor, kept only for provenance.
    Ghost,
}

impl EntityKind {
    /// The marker label this kind carries in the mutation log.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Segment => "Segment",
            Self::Synapse => "Synapse",
            Self::SynapseSet => "SynapseSet",
            Self::NeuronPart => "NeuronPart",
            Self::History => "History",
            Self::Summary => "Meta",
            Self::Skeleton => "Skeleton",
            Self::SkelNode => "SkelNode",
            Self::Ghost => GHOST_LABEL,
        }
    }
}

/// The type of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelKind {
    /// Segment -> Segment weighted connection.
    ConnectsTo,
    /// Segment -> SynapseSet, SynapseSet -> Synapse, Segment -> Skeleton, Skeleton -> SkelNode.
    Contains,
    /// NeuronPart -> Segment.
    PartOf,
    /// Presynaptic site -> postsynaptic site.
    SynapsesTo,
    /// SkelNode -> SkelNode.
    LinksTo,
    /// Segment (or ghost) -> History.
    From,
    /// Ghost or History -> later History.
    MergedTo,
}

impl RelKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConnectsTo => "ConnectsTo",
            Self::Contains => "Contains",
            Self::PartOf => "PartOf",
            Self::SynapsesTo => "SynapsesTo",
            Self::LinksTo => "LinksTo",
            Self::From => "From",
            Self::MergedTo => "MergedTo",
        }
    }

    /// Provenance relationships survive the retirement of a donor.
    #[must_use]
    pub const fn is_provenance(self) -> bool {
        matches!(self, Self::From | Self::MergedTo)
    }
}

// =============================================================================
// IDENTITY KEYS
// =============================================================================

/// Dataset-scoped uniqueness key. The store rejects a second live node with
/// the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    Segment {
        dataset: String,
        body_id: BodyId,
    },
    Synapse {
        dataset: String,
        location: Location,
    },
    SynapseSet {
        dataset: String,
        body_id: BodyId,
    },
    NeuronPart {
        dataset: String,
        body_id: BodyId,
        roi: String,
    },
    Summary {
        dataset: String,
    },
    Skeleton {
        dataset: String,
        body_id: BodyId,
    },
    SkelNode {
        dataset: String,
        body_id: BodyId,
        location: Location,
    },
}

impl NodeKey {
    #[must_use]
    pub fn segment(dataset: &str, body_id: BodyId) -> Self {
        Self::Segment {
            dataset: dataset.to_string(),
            body_id,
        }
    }

    #[must_use]
    pub fn synapse(dataset: &str, location: Location) -> Self {
        Self::Synapse {
            dataset: dataset.to_string(),
            location,
        }
    }

    #[must_use]
    pub fn synapse_set(dataset: &str, body_id: BodyId) -> Self {
        Self::SynapseSet {
            dataset: dataset.to_string(),
            body_id,
        }
    }

    #[must_use]
    pub fn neuron_part(dataset: &str, body_id: BodyId, roi: &str) -> Self {
        Self::NeuronPart {
            dataset: dataset.to_string(),
            body_id,
            roi: roi.to_string(),
        }
    }

    #[must_use]
    pub fn summary(dataset: &str) -> Self {
        Self::Summary {
            dataset: dataset.to_string(),
        }
    }

    #[must_use]
    pub fn skeleton(dataset: &str, body_id: BodyId) -> Self {
        Self::Skeleton {
            dataset: dataset.to_string(),
            body_id,
        }
    }

    #[must_use]
    pub fn skel_node(dataset: &str, body_id: BodyId, location: Location) -> Self {
        Self::SkelNode {
            dataset: dataset.to_string(),
            body_id,
            location,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segment { dataset, body_id } => write!(f, "Segment {}:{}", dataset, body_id),
            Self::Synapse { dataset, location } => write!(f, "Synapse {}:{}", dataset, location),
            Self::SynapseSet { dataset, body_id } => {
                write!(f, "SynapseSet {}:{}", dataset, body_id)
            }
            Self::NeuronPart {
                dataset,
                body_id,
                roi,
            } => write!(f, "NeuronPart {}:{}:{}", dataset, body_id, roi),
            Self::Summary { dataset } => write!(f, "Meta {}", dataset),
            Self::Skeleton { dataset, body_id } => write!(f, "Skeleton {}:{}", dataset, body_id),
            Self::SkelNode {
                dataset,
                body_id,
                location,
            } => write!(f, "SkelNode {}:{}:{}", dataset, body_id, location),
        }
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// A property value stored on a node or relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    IntList(Vec<i64>),
}

impl PropertyValue {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            Self::IntList(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<i64>> for PropertyValue {
    fn from(v: Vec<i64>) -> Self {
        Self::IntList(v)
    }
}

impl From<Timestamp> for PropertyValue {
    fn from(v: Timestamp) -> Self {
        Self::Int(v.0)
    }
}

/// Property map. Ordered so that persisted rows are byte-stable.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Name a donor property takes after retirement: `bodyId` -> `mergedBodyId`.
#[must_use]
pub fn merged_property_name(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", MERGED_PREFIX, first.to_uppercase(), chars.as_str()),
        None => MERGED_PREFIX.to_string(),
    }
}

// =============================================================================
// NODE & RELATIONSHIP
// =============================================================================

/// A node of the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: EntityKind,
    pub dataset: String,
    /// Uniqueness key, `None` for History and Ghost nodes.
    pub key: Option<NodeKey>,
    /// Extra labels: region names and similar markers.
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

impl Node {
    #[must_use]
    pub fn new(id: NodeId, kind: EntityKind, dataset: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            dataset: dataset.into(),
            key: None,
            labels: BTreeSet::new(),
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    #[must_use]
    pub fn int(&self, key: &str) -> Option<i64> {
        self.property(key).and_then(PropertyValue::as_int)
    }

    #[must_use]
    pub fn float(&self, key: &str) -> Option<f64> {
        self.property(key).and_then(PropertyValue::as_float)
    }

    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(PropertyValue::as_text)
    }

    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// A directed, typed relationship with properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub kind: RelKind,
    pub from: NodeId,
    pub to: NodeId,
    pub properties: Properties,
}

impl Relationship {
    #[must_use]
    pub fn int(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(PropertyValue::as_int)
    }

    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(PropertyValue::as_text)
    }

    /// The endpoint that is not `node`. Returns `node` itself for self-loops.
    #[must_use]
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.from == node { self.to } else { self.from }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the neuroproof engine.
///
/// Every error aborts the enclosing transaction; nothing staged in it is
/// published.
#[derive(Debug, Error)]
pub enum NeuroError {
    /// Bad instruction shape, self-reference or unknown id. Rejected before
    /// any mutation.
    #[error("Invalid merge instruction: {0}")]
    InvalidMergeInstruction(String),

    /// A body named in the instruction has already been retired by a merge.
    #[error("Already merged: {0}")]
    AlreadyMerged(String),

    /// A write conflict with a transaction that committed first.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Region aggregate text could not be parsed.
    #[error("Malformed region aggregate: {0}")]
    MalformedAggregate(String),

    /// A uniqueness constraint or structural rule of the store was violated.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The requested node was not found in the graph.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// The requested relationship was not found in the graph.
    #[error("Relationship not found: {0:?}")]
    RelationshipNotFound(RelId),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl NeuroError {
    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidMergeInstruction(_) => "invalid_merge_instruction",
            Self::AlreadyMerged(_) => "already_merged",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::MalformedAggregate(_) => "malformed_aggregate",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::NodeNotFound(_) => "node_not_found",
            Self::RelationshipNotFound(_) => "relationship_not_found",
            Self::SerializationError(_) => "serialization_error",
            Self::IoError(_) => "io_error",
        }
    }

    /// Only write conflicts can succeed by resubmitting the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================
