//! # Loader
//!
//! Producer-side writes for well-formed records: the operations a bulk
//! importer uses to bring a dataset into the store before any proofreading
//! happens.
//!
//! Every operation works inside a caller-owned [`Transaction`], so a failed
//! import leaves nothing behind. [`Loader::load_fixture`] drives the whole
//! sequence from one JSON document.

use crate::graph::GraphView;
use crate::primitives::{
    BODY_ID, CONFIDENCE, LOCATION, NAME, NEURON_TYPE, POST, POST_HP_THRESHOLD, PRE,
    PRE_HP_THRESHOLD, RADIUS, ROI, ROI_INFO, SIZE, SOMA_LOCATION, SOMA_RADIUS, STATUS,
    SYNAPSE_TYPE, TOTAL_CONNECTION_COUNT, TOTAL_POST_COUNT, TOTAL_PRE_COUNT, TOTAL_SYNAPSE_COUNT,
    WEIGHT, WEIGHT_HP,
};
use crate::roi_info::{HpThresholds, RoiInfo};
use crate::store::Store;
use crate::summary::dataset_thresholds;
use crate::transaction::Transaction;
use crate::{
    BodyId, EntityKind, Location, NeuroError, NodeId, NodeKey, Polarity, Properties,
    PropertyValue, RelId, RelKind,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// RECORDS
// =============================================================================

/// A segment as produced by the importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRecord {
    pub body_id: BodyId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub neuron_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub soma_location: Option<Location>,
    #[serde(default)]
    pub soma_radius: Option<f64>,
    /// Region labels.
    #[serde(default)]
    pub rois: Vec<String>,
}

impl SegmentRecord {
    #[must_use]
    pub fn new(body_id: BodyId) -> Self {
        Self {
            body_id,
            name: None,
            neuron_type: None,
            status: None,
            size: None,
            soma_location: None,
            soma_radius: None,
            rois: Vec::new(),
        }
    }
}

/// A synapse site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynapseRecord {
    pub location: Location,
    #[serde(rename = "type")]
    pub polarity: Polarity,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rois: Vec<String>,
}

/// A pre site feeding a post site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynapticPair {
    pub pre: Location,
    pub post: Location,
}

/// A weighted connection between two segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub pre: BodyId,
    pub post: BodyId,
    pub weight: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynapseSetRecord {
    pub body_id: BodyId,
    pub synapses: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkelNodeRecord {
    pub location: Location,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub parent: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonRecord {
    pub body_id: BodyId,
    pub nodes: Vec<SkelNodeRecord>,
}

/// A whole dataset in one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFixture {
    pub dataset: String,
    #[serde(default)]
    pub pre_hp_threshold: Option<f64>,
    #[serde(default)]
    pub post_hp_threshold: Option<f64>,
    #[serde(default)]
    pub segments: Vec<SegmentRecord>,
    #[serde(default)]
    pub synapses: Vec<SynapseRecord>,
    #[serde(default)]
    pub synapses_to: Vec<SynapticPair>,
    #[serde(default)]
    pub synapse_sets: Vec<SynapseSetRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    #[serde(default)]
    pub skeletons: Vec<SkeletonRecord>,
}

impl DatasetFixture {
    pub fn from_json(json: &str) -> Result<Self, NeuroError> {
        serde_json::from_str(json).map_err(|e| NeuroError::SerializationError(e.to_string()))
    }

    #[must_use]
    pub fn thresholds(&self) -> HpThresholds {
        let defaults = HpThresholds::default();
        HpThresholds::new(
            self.pre_hp_threshold.unwrap_or(defaults.pre),
            self.post_hp_threshold.unwrap_or(defaults.post),
        )
    }
}

/// What a fixture load produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoadReport {
    pub version: u64,
    pub segments: usize,
    pub synapses: usize,
    pub connections: usize,
    pub skeletons: usize,
}

// =============================================================================
// LOADER
// =============================================================================

/// Record-level write operations.
pub struct Loader;

impl Loader {
    /// Create the dataset's summary record, or update its thresholds.
    pub fn prepare_dataset(
        tx: &mut Transaction,
        dataset: &str,
        thresholds: HpThresholds,
    ) -> Result<NodeId, NeuroError> {
        if let Some(id) = tx.find(&NodeKey::summary(dataset)) {
            tx.set_property(id, PRE_HP_THRESHOLD, thresholds.pre)?;
            tx.set_property(id, POST_HP_THRESHOLD, thresholds.post)?;
            return Ok(id);
        }

        let mut props = Properties::new();
        props.insert(PRE_HP_THRESHOLD.to_string(), PropertyValue::Float(thresholds.pre));
        props.insert(POST_HP_THRESHOLD.to_string(), PropertyValue::Float(thresholds.post));
        for counter in [
            TOTAL_PRE_COUNT,
            TOTAL_POST_COUNT,
            TOTAL_SYNAPSE_COUNT,
            TOTAL_CONNECTION_COUNT,
        ] {
            props.insert(counter.to_string(), PropertyValue::Int(0));
        }
        let id = tx.create_node(
            EntityKind::Summary,
            dataset,
            Some(NodeKey::summary(dataset)),
            Vec::new(),
            props,
        )?;
        tracing::info!(dataset, pre = thresholds.pre, post = thresholds.post, "dataset prepared");
        Ok(id)
    }

    pub fn add_segment(
        tx: &mut Transaction,
        dataset: &str,
        record: &SegmentRecord,
    ) -> Result<NodeId, NeuroError> {
        let mut props = Properties::new();
        props.insert(BODY_ID.to_string(), PropertyValue::Int(record.body_id.value()));
        props.insert(PRE.to_string(), PropertyValue::Int(0));
        props.insert(POST.to_string(), PropertyValue::Int(0));
        if let Some(name) = &record.name {
            props.insert(NAME.to_string(), PropertyValue::from(name.as_str()));
        }
        if let Some(neuron_type) = &record.neuron_type {
            props.insert(NEURON_TYPE.to_string(), PropertyValue::from(neuron_type.as_str()));
        }
        if let Some(status) = &record.status {
            props.insert(STATUS.to_string(), PropertyValue::from(status.as_str()));
        }
        if let Some(size) = record.size {
            props.insert(SIZE.to_string(), PropertyValue::Int(size));
        }
        if let Some(location) = record.soma_location {
            props.insert(SOMA_LOCATION.to_string(), PropertyValue::from(location.to_vec()));
        }
        if let Some(radius) = record.soma_radius {
            props.insert(SOMA_RADIUS.to_string(), PropertyValue::Float(radius));
        }
        tx.create_node(
            EntityKind::Segment,
            dataset,
            Some(NodeKey::segment(dataset, record.body_id)),
            record.rois.iter().cloned(),
            props,
        )
    }

    pub fn add_synapse(
        tx: &mut Transaction,
        dataset: &str,
        record: &SynapseRecord,
    ) -> Result<NodeId, NeuroError> {
        let mut props = Properties::new();
        props.insert(LOCATION.to_string(), PropertyValue::from(record.location.to_vec()));
        props.insert(SYNAPSE_TYPE.to_string(), PropertyValue::from(record.polarity.as_str()));
        if let Some(confidence) = record.confidence {
            props.insert(CONFIDENCE.to_string(), PropertyValue::Float(confidence));
        }
        tx.create_node(
            EntityKind::Synapse,
            dataset,
            Some(NodeKey::synapse(dataset, record.location)),
            record.rois.iter().cloned(),
            props,
        )
    }

    pub fn add_synapses_to(
        tx: &mut Transaction,
        dataset: &str,
        pair: SynapticPair,
    ) -> Result<RelId, NeuroError> {
        let pre = require_synapse(tx, dataset, pair.pre)?;
        let post = require_synapse(tx, dataset, pair.post)?;
        tx.create_relationship(RelKind::SynapsesTo, pre, post, Properties::new())
    }

    /// Attach a synapse set to a segment and fold its synapses into the
    /// segment's `pre`/`post` counts and `roiInfo`.
    pub fn add_synapse_set(
        tx: &mut Transaction,
        dataset: &str,
        record: &SynapseSetRecord,
    ) -> Result<NodeId, NeuroError> {
        let segment = require_segment(tx, dataset, record.body_id)?;
        let set = tx.create_node(
            EntityKind::SynapseSet,
            dataset,
            Some(NodeKey::synapse_set(dataset, record.body_id)),
            Vec::new(),
            Properties::new(),
        )?;
        tx.create_relationship(RelKind::Contains, segment, set, Properties::new())?;

        let thresholds = dataset_thresholds(&*tx, dataset);
        let (mut pre, mut post, mut roi_info) = {
            let node = tx.node(segment).ok_or(NeuroError::NodeNotFound(segment))?;
            (
                node.int(PRE).unwrap_or(0),
                node.int(POST).unwrap_or(0),
                RoiInfo::decode_or_reset(node.text(ROI_INFO).unwrap_or_default()),
            )
        };

        for location in &record.synapses {
            let synapse = require_synapse(tx, dataset, *location)?;
            tx.create_relationship(RelKind::Contains, set, synapse, Properties::new())?;

            let Some(node) = tx.node(synapse) else {
                continue;
            };
            let Some(polarity) = node.text(SYNAPSE_TYPE).and_then(|t| t.parse::<Polarity>().ok())
            else {
                continue;
            };
            match polarity {
                Polarity::Pre => pre += 1,
                Polarity::Post => post += 1,
            }
            let confidence = node.float(CONFIDENCE);
            for region in &node.labels {
                roi_info.observe(region, polarity, confidence, thresholds);
            }
        }

        tx.set_property(segment, PRE, pre)?;
        tx.set_property(segment, POST, post)?;
        tx.set_property(segment, ROI_INFO, roi_info.encode()?)?;
        Ok(set)
    }

    pub fn add_connects_to(
        tx: &mut Transaction,
        dataset: &str,
        record: ConnectionRecord,
    ) -> Result<RelId, NeuroError> {
        let pre = require_segment(tx, dataset, record.pre)?;
        let post = require_segment(tx, dataset, record.post)?;
        let mut props = Properties::new();
        props.insert(WEIGHT.to_string(), PropertyValue::Int(record.weight));
        tx.create_relationship(RelKind::ConnectsTo, pre, post, props)
    }

    /// One NeuronPart per region of the segment's `roiInfo`.
    pub fn add_neuron_parts(
        tx: &mut Transaction,
        dataset: &str,
        body_id: BodyId,
    ) -> Result<Vec<NodeId>, NeuroError> {
        let segment = require_segment(tx, dataset, body_id)?;
        let roi_info = {
            let node = tx.node(segment).ok_or(NeuroError::NodeNotFound(segment))?;
            RoiInfo::decode(node.text(ROI_INFO).unwrap_or_default())?
        };

        let mut parts = Vec::new();
        for (roi, counter) in roi_info.regions() {
            if counter.is_zero() {
                continue;
            }
            let mut props = Properties::new();
            props.insert(ROI.to_string(), PropertyValue::from(roi));
            props.insert(PRE.to_string(), PropertyValue::Int(counter.pre as i64));
            props.insert(POST.to_string(), PropertyValue::Int(counter.post as i64));
            props.insert(SIZE.to_string(), PropertyValue::Int(counter.total() as i64));
            let part = tx.create_node(
                EntityKind::NeuronPart,
                dataset,
                Some(NodeKey::neuron_part(dataset, body_id, roi)),
                Vec::new(),
                props,
            )?;
            tx.create_relationship(RelKind::PartOf, part, segment, Properties::new())?;
            parts.push(part);
        }
        Ok(parts)
    }

    /// A skeleton tree; `parent` links become `LinksTo` edges.
    pub fn add_skeleton(
        tx: &mut Transaction,
        dataset: &str,
        record: &SkeletonRecord,
    ) -> Result<NodeId, NeuroError> {
        let segment = require_segment(tx, dataset, record.body_id)?;
        let skeleton = tx.create_node(
            EntityKind::Skeleton,
            dataset,
            Some(NodeKey::skeleton(dataset, record.body_id)),
            Vec::new(),
            Properties::new(),
        )?;
        tx.create_relationship(RelKind::Contains, segment, skeleton, Properties::new())?;

        let mut placed: BTreeMap<Location, NodeId> = BTreeMap::new();
        for node in &record.nodes {
            let mut props = Properties::new();
            props.insert(LOCATION.to_string(), PropertyValue::from(node.location.to_vec()));
            if let Some(radius) = node.radius {
                props.insert(RADIUS.to_string(), PropertyValue::Float(radius));
            }
            let id = tx.create_node(
                EntityKind::SkelNode,
                dataset,
                Some(NodeKey::skel_node(dataset, record.body_id, node.location)),
                Vec::new(),
                props,
            )?;
            tx.create_relationship(RelKind::Contains, skeleton, id, Properties::new())?;
            placed.insert(node.location, id);
        }

        for node in &record.nodes {
            let Some(parent) = node.parent else {
                continue;
            };
            let Some(&parent_id) = placed.get(&parent) else {
                return Err(NeuroError::ConstraintViolation(format!(
                    "skeleton of body {} has no node at parent {}",
                    record.body_id, parent
                )));
            };
            if let Some(&child) = placed.get(&node.location) {
                tx.create_relationship(RelKind::LinksTo, parent_id, child, Properties::new())?;
            }
        }
        Ok(skeleton)
    }

    /// Derive `roiInfo` and `weightHP` of the `pre -> post` connection from
    /// the `SynapsesTo` pairs between the two bodies' synapse sets.
    ///
    /// Pre sites feed `pre`/`preHP`, post sites feed `post`/`postHP`, and
    /// `weightHP` is the number of distinct high-precision post sites.
    pub fn set_connection_roi_info_and_weight_hp(
        tx: &mut Transaction,
        dataset: &str,
        pre_body: BodyId,
        post_body: BodyId,
        thresholds: HpThresholds,
    ) -> Result<RelId, NeuroError> {
        let pre = require_segment(tx, dataset, pre_body)?;
        let post = require_segment(tx, dataset, post_body)?;
        let connection = tx
            .outgoing(pre, RelKind::ConnectsTo)
            .iter()
            .find(|r| r.to == post)
            .map(|r| r.id)
            .ok_or_else(|| {
                NeuroError::ConstraintViolation(format!(
                    "no connection from body {} to body {}",
                    pre_body, post_body
                ))
            })?;

        let post_members = set_members(&*tx, post);
        let mut pre_sites = BTreeSet::new();
        let mut post_sites = BTreeSet::new();
        for site in set_members(&*tx, pre) {
            for rel in tx.outgoing(site, RelKind::SynapsesTo) {
                if post_members.contains(&rel.to) {
                    pre_sites.insert(site);
                    post_sites.insert(rel.to);
                }
            }
        }

        let mut roi_info = RoiInfo::new();
        let mut weight_hp = 0_i64;
        for (sites, polarity) in [(&pre_sites, Polarity::Pre), (&post_sites, Polarity::Post)] {
            for site in sites {
                let Some(node) = tx.node(*site) else {
                    continue;
                };
                let confidence = node.float(CONFIDENCE);
                for region in &node.labels {
                    roi_info.observe(region, polarity, confidence, thresholds);
                }
                if polarity == Polarity::Post && thresholds.is_high_precision(polarity, confidence)
                {
                    weight_hp += 1;
                }
            }
        }

        tx.set_relationship_property(connection, ROI_INFO, roi_info.encode()?)?;
        tx.set_relationship_property(connection, WEIGHT_HP, weight_hp)?;
        tracing::debug!(
            pre = %pre_body,
            post = %post_body,
            pairs = pre_sites.len().max(post_sites.len()),
            weight_hp,
            "connection aggregates derived"
        );
        Ok(connection)
    }

    /// Load a whole dataset document in one transaction.
    pub fn load_fixture(store: &Store, fixture: &DatasetFixture) -> Result<LoadReport, NeuroError> {
        let dataset = fixture.dataset.as_str();
        let (mut report, commit) = store.write(|tx| {
            Self::prepare_dataset(tx, dataset, fixture.thresholds())?;
            for segment in &fixture.segments {
                Self::add_segment(tx, dataset, segment)?;
            }
            for synapse in &fixture.synapses {
                Self::add_synapse(tx, dataset, synapse)?;
            }
            for pair in &fixture.synapses_to {
                Self::add_synapses_to(tx, dataset, *pair)?;
            }
            for set in &fixture.synapse_sets {
                Self::add_synapse_set(tx, dataset, set)?;
            }
            for connection in &fixture.connections {
                Self::add_connects_to(tx, dataset, *connection)?;
            }
            if !fixture.synapses_to.is_empty() {
                for connection in &fixture.connections {
                    Self::set_connection_roi_info_and_weight_hp(
                        tx,
                        dataset,
                        connection.pre,
                        connection.post,
                        fixture.thresholds(),
                    )?;
                }
            }
            for set in &fixture.synapse_sets {
                Self::add_neuron_parts(tx, dataset, set.body_id)?;
            }
            for skeleton in &fixture.skeletons {
                Self::add_skeleton(tx, dataset, skeleton)?;
            }
            Ok(LoadReport {
                segments: fixture.segments.len(),
                synapses: fixture.synapses.len(),
                connections: fixture.connections.len(),
                skeletons: fixture.skeletons.len(),
                ..LoadReport::default()
            })
        })?;
        report.version = commit.version;
        tracing::info!(
            dataset,
            version = report.version,
            segments = report.segments,
            synapses = report.synapses,
            "fixture loaded"
        );
        Ok(report)
    }

    pub fn load_fixture_json(store: &Store, json: &str) -> Result<LoadReport, NeuroError> {
        Self::load_fixture(store, &DatasetFixture::from_json(json)?)
    }
}

fn require_segment(tx: &Transaction, dataset: &str, body_id: BodyId) -> Result<NodeId, NeuroError> {
    tx.segment(dataset, body_id).map(|n| n.id).ok_or_else(|| {
        NeuroError::ConstraintViolation(format!("no segment {} in dataset '{}'", body_id, dataset))
    })
}

fn require_synapse(tx: &Transaction, dataset: &str, location: Location) -> Result<NodeId, NeuroError> {
    tx.find(&NodeKey::synapse(dataset, location)).ok_or_else(|| {
        NeuroError::ConstraintViolation(format!(
            "no synapse at {} in dataset '{}'",
            location, dataset
        ))
    })
}

/// Synapses held by any synapse set of `segment`.
fn set_members(view: &impl GraphView, segment: NodeId) -> BTreeSet<NodeId> {
    view.outgoing(segment, RelKind::Contains)
        .into_iter()
        .filter(|r| view.node(r.to).is_some_and(|n| n.kind == EntityKind::SynapseSet))
        .flat_map(|set| view.outgoing(set.to, RelKind::Contains))
        .map(|r| r.to)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
