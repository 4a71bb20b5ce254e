//! # Read Models
//!
//! Typed views over graph nodes, used by the CLI, the HTTP API and tests.

use crate::graph::GraphView;
use crate::primitives::{
    BODY_ID, CONFIDENCE, LAST_DATABASE_EDIT, LOCATION, NAME, NEURON_TYPE, POST, PRE, ROI_INFO,
    SIZE, SOMA_LOCATION, SOMA_RADIUS, STATUS, SYNAPSE_TYPE, TIME_STAMP, WEIGHT, WEIGHT_HP,
};
use crate::roi_info::{HpThresholds, RoiInfo};
use crate::summary::{SummaryCounts, thresholds_of};
use crate::{
    BodyId, EntityKind, Location, NeuroError, Node, NodeId, NodeKey, Polarity, RelKind, Timestamp,
};
use serde::Serialize;

/// A live segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub id: NodeId,
    pub dataset: String,
    pub body_id: BodyId,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub neuron_type: Option<String>,
    pub status: Option<String>,
    pub size: Option<i64>,
    pub soma_location: Option<Location>,
    pub soma_radius: Option<f64>,
    pub pre: i64,
    pub post: i64,
    pub roi_info: RoiInfo,
    /// Region labels.
    pub regions: Vec<String>,
    pub time_stamp: Option<Timestamp>,
}

impl Segment {
    /// Build the view from a segment node. The stored `roiInfo` must decode.
    pub fn from_node(node: &Node) -> Result<Self, NeuroError> {
        if node.kind != EntityKind::Segment {
            return Err(NeuroError::ConstraintViolation(format!(
                "node {:?} is a {:?}, not a segment",
                node.id, node.kind
            )));
        }
        let body_id = node.int(BODY_ID).map(BodyId).ok_or_else(|| {
            NeuroError::ConstraintViolation(format!("segment {:?} has no bodyId", node.id))
        })?;
        Ok(Self {
            id: node.id,
            dataset: node.dataset.clone(),
            body_id,
            name: node.text(NAME).map(str::to_string),
            neuron_type: node.text(NEURON_TYPE).map(str::to_string),
            status: node.text(STATUS).map(str::to_string),
            size: node.int(SIZE),
            soma_location: node
                .property(SOMA_LOCATION)
                .and_then(|v| v.as_int_list())
                .and_then(Location::from_slice),
            soma_radius: node.float(SOMA_RADIUS),
            pre: node.int(PRE).unwrap_or(0),
            post: node.int(POST).unwrap_or(0),
            roi_info: RoiInfo::decode(node.text(ROI_INFO).unwrap_or_default())?,
            regions: node.labels.iter().cloned().collect(),
            time_stamp: node.int(TIME_STAMP).map(Timestamp),
        })
    }

    /// Look up a live segment by body id.
    pub fn load(
        view: &impl GraphView,
        dataset: &str,
        body_id: BodyId,
    ) -> Result<Option<Self>, NeuroError> {
        view.segment(dataset, body_id)
            .map(Self::from_node)
            .transpose()
    }
}

/// A synapse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynapseView {
    pub location: Location,
    #[serde(rename = "type")]
    pub polarity: Option<Polarity>,
    pub confidence: Option<f64>,
    pub regions: Vec<String>,
}

impl SynapseView {
    #[must_use]
    pub fn from_node(node: &Node) -> Option<Self> {
        let location = node
            .property(LOCATION)
            .and_then(|v| v.as_int_list())
            .and_then(Location::from_slice)?;
        Some(Self {
            location,
            polarity: node.text(SYNAPSE_TYPE).and_then(|t| t.parse().ok()),
            confidence: node.float(CONFIDENCE),
            regions: node.labels.iter().cloned().collect(),
        })
    }
}

/// Synapses in a segment's synapse set, ordered by location.
pub fn synapses_of(view: &impl GraphView, segment: NodeId) -> Vec<SynapseView> {
    let mut synapses: Vec<SynapseView> = view
        .outgoing(segment, RelKind::Contains)
        .into_iter()
        .filter(|r| view.node(r.to).is_some_and(|n| n.kind == EntityKind::SynapseSet))
        .flat_map(|set| view.outgoing(set.to, RelKind::Contains))
        .filter_map(|r| view.node(r.to))
        .filter(|n| n.kind == EntityKind::Synapse)
        .filter_map(SynapseView::from_node)
        .collect();
    synapses.sort_by_key(|s| s.location);
    synapses
}

/// Direction of a connection relative to the segment it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One `ConnectsTo` relationship seen from a segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionView {
    pub direction: Direction,
    pub partner: Option<BodyId>,
    pub weight: i64,
    #[serde(rename = "weightHP")]
    pub weight_hp: Option<i64>,
}

/// All connections of a segment, outgoing first.
pub fn connections_of(view: &impl GraphView, segment: NodeId) -> Vec<ConnectionView> {
    let partner = |id: NodeId| view.node(id).and_then(|n| n.int(BODY_ID)).map(BodyId);
    let read = |direction, other: NodeId, rel: &crate::Relationship| ConnectionView {
        direction,
        partner: partner(other),
        weight: rel.int(WEIGHT).unwrap_or(0),
        weight_hp: rel.int(WEIGHT_HP),
    };

    let mut out: Vec<ConnectionView> = view
        .outgoing(segment, RelKind::ConnectsTo)
        .into_iter()
        .map(|r| read(Direction::Outgoing, r.to, r))
        .collect();
    out.extend(
        view.incoming(segment, RelKind::ConnectsTo)
            .into_iter()
            .map(|r| read(Direction::Incoming, r.from, r)),
    );
    out
}

/// A dataset's summary record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub dataset: String,
    pub total_synapse_count: i64,
    pub total_pre_count: i64,
    pub total_post_count: i64,
    pub total_connection_count: i64,
    pub last_database_edit: Option<Timestamp>,
    pub thresholds: HpThresholds,
}

impl SummaryRecord {
    #[must_use]
    pub fn from_node(node: &Node) -> Self {
        let counts = SummaryCounts::from_node(node);
        Self {
            dataset: node.dataset.clone(),
            total_synapse_count: counts.synapses(),
            total_pre_count: counts.pre,
            total_post_count: counts.post,
            total_connection_count: counts.connections,
            last_database_edit: node.int(LAST_DATABASE_EDIT).map(Timestamp),
            thresholds: thresholds_of(node),
        }
    }

    pub fn load(view: &impl GraphView, dataset: &str) -> Option<Self> {
        view.find(&NodeKey::summary(dataset))
            .and_then(|id| view.node(id))
            .map(Self::from_node)
    }

    #[must_use]
    pub fn counts(&self) -> SummaryCounts {
        SummaryCounts {
            pre: self.total_pre_count,
            post: self.total_post_count,
            connections: self.total_connection_count,
        }
    }
}
