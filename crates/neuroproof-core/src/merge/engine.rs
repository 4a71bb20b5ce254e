//! The merge state machine.
//!
//! Every step runs inside one [`Transaction`]; an error at any step aborts
//! the transaction and nothing of the merge becomes visible.

use super::{MergeAction, SynapseEntry};
use crate::graph::GraphView;
use crate::model::Segment;
use crate::primitives::{
    BODY_ID, CONFIDENCE, LOCATION, POST, PRE, PRIOR_POST, PRIOR_PRE, PRIOR_SIZE, RESULT_BODY_ID, ROI,
    ROI_INFO, SIZE, SYNAPSE_TYPE, TIME_STAMP, WEIGHT, WEIGHT_HP,
};
use crate::reconcile::{ConnectionWeights, EdgeContribution, reconcile};
use crate::roi_info::RoiInfo;
use crate::store::Store;
use crate::summary::{dataset_thresholds, synapse_polarity};
use crate::transaction::Transaction;
use crate::{
    BodyId, EntityKind, Location, NeuroError, Node, NodeId, NodeKey, Polarity, Properties,
    PropertyValue, RelId, RelKind, Relationship, merged_property_name,
};
use std::collections::{BTreeMap, BTreeSet};

/// Survivor counters before the merge, recorded on the History node.
#[derive(Debug, Clone, Copy)]
struct PriorCounts {
    pre: Option<i64>,
    post: Option<i64>,
    size: Option<i64>,
}

/// The entity merge engine.
pub struct MergeEngine;

impl MergeEngine {
    /// Apply a merge instruction in its own transaction and commit it.
    ///
    /// Returns the survivor as committed.
    pub fn merge_entities(
        store: &Store,
        dataset: &str,
        action: &MergeAction,
    ) -> Result<Segment, NeuroError> {
        let span = tracing::info_span!(
            "merge",
            dataset = %dataset,
            survivor = %action.result_body_id,
            donors = action.bodies_merged.len()
        );
        let _guard = span.enter();
        tracing::debug!(synapses = action.result_body_synapses.len(), "merge started");

        let mut tx = store.begin();
        let survivor = Self::apply(&mut tx, dataset, action)?;
        let report = store.commit(tx)?;

        let graph = store.snapshot();
        let node = graph
            .node(survivor)
            .ok_or(NeuroError::NodeNotFound(survivor))?;
        let segment = Segment::from_node(node)?;
        tracing::info!(
            version = report.version,
            pre = segment.pre,
            post = segment.post,
            "merge applied"
        );
        Ok(segment)
    }

    /// Parse a JSON merge instruction and apply it.
    pub fn merge_from_json(
        store: &Store,
        dataset: &str,
        json: &str,
    ) -> Result<Segment, NeuroError> {
        let action = MergeAction::from_json(json)?;
        Self::merge_entities(store, dataset, &action)
    }

    /// Stage a merge in a caller-owned transaction. Returns the survivor id.
    pub fn apply(
        tx: &mut Transaction,
        dataset: &str,
        action: &MergeAction,
    ) -> Result<NodeId, NeuroError> {
        action.validate()?;

        // 1. resolve every body before touching anything
        let survivor = resolve(tx, dataset, action.result_body_id)?;
        let donors = action
            .bodies_merged
            .iter()
            .map(|body| resolve(tx, dataset, *body))
            .collect::<Result<Vec<_>, _>>()?;

        let prior = {
            let node = require(tx, survivor)?;
            PriorCounts {
                pre: node.int(PRE),
                post: node.int(POST),
                size: node.int(SIZE),
            }
        };
        let mut order = Vec::with_capacity(donors.len() + 1);
        order.push(survivor);
        order.extend(donors.iter().copied());
        let members: BTreeSet<NodeId> = order.iter().copied().collect();
        let old_regions = previous_regions(tx, &order)?;
        check_listed_synapses(tx, dataset, action, &members)?;

        // 2. connections
        Self::reconcile_connections(tx, survivor, &members)?;

        // 3. synapse sets
        let set = Self::union_synapse_sets(tx, dataset, action, &order)?;

        // 4. polarity counts
        let (pre, post) = action.polarity_counts();
        tx.set_property(survivor, PRE, pre)?;
        tx.set_property(survivor, POST, post)?;

        // 5. neuron parts, region labels, roiInfo
        let parts = Self::rebuild_neuron_parts(tx, dataset, action, &order, &old_regions)?;

        // 6. skeletons, donors, provenance
        Self::delete_skeletons(tx, &order)?;
        let history = Self::record_history(tx, dataset, action, survivor, &donors, prior)?;

        // 7. size
        tx.set_property(survivor, SIZE, action.result_body_size)?;

        // 8. timestamps
        let now = tx.timestamp();
        for id in [survivor, set, history].into_iter().chain(parts) {
            tx.set_property(id, TIME_STAMP, now)?;
        }

        Ok(survivor)
    }

    // -------------------------------------------------------------------------
    // Step 2
    // -------------------------------------------------------------------------

    fn reconcile_connections(
        tx: &mut Transaction,
        survivor: NodeId,
        members: &BTreeSet<NodeId>,
    ) -> Result<(), NeuroError> {
        let mut rel_ids = BTreeSet::new();
        for member in members {
            rel_ids.extend(tx.outgoing(*member, RelKind::ConnectsTo).iter().map(|r| r.id));
            rel_ids.extend(tx.incoming(*member, RelKind::ConnectsTo).iter().map(|r| r.id));
        }
        let contributions = rel_ids
            .into_iter()
            .filter_map(|id| tx.relationship(id))
            .map(|rel| {
                Ok(EdgeContribution {
                    rel: rel.id,
                    from: rel.from,
                    to: rel.to,
                    weights: read_weights(rel)?,
                })
            })
            .collect::<Result<Vec<_>, NeuroError>>()?;

        let result = reconcile(survivor, members, &contributions);
        let now = tx.timestamp();

        for edge in &result.edges {
            let kept = edge.contributors.iter().copied().find(|id| {
                tx.relationship(*id)
                    .is_some_and(|r| r.from == edge.from && r.to == edge.to)
            });
            let target = match kept {
                Some(id) => id,
                None => tx.create_relationship(
                    RelKind::ConnectsTo,
                    edge.from,
                    edge.to,
                    Properties::new(),
                )?,
            };
            for id in &edge.contributors {
                if Some(*id) != kept {
                    tx.delete_relationship(*id)?;
                }
            }
            write_weights(tx, target, &edge.weights)?;
            tx.set_relationship_property(target, TIME_STAMP, now)?;
        }
        for id in &result.dropped {
            tx.delete_relationship(*id)?;
        }

        tracing::debug!(
            connections = result.edges.len(),
            dropped = result.dropped.len(),
            "connections reconciled"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Step 3
    // -------------------------------------------------------------------------

    /// Returns the surviving synapse set.
    fn union_synapse_sets(
        tx: &mut Transaction,
        dataset: &str,
        action: &MergeAction,
        order: &[NodeId],
    ) -> Result<NodeId, NeuroError> {
        let survivor = order[0];

        // (owner, Contains rel, set) in instruction order
        let mut sets: Vec<(NodeId, RelId, NodeId)> = Vec::new();
        for owner in order {
            for rel in tx.outgoing(*owner, RelKind::Contains) {
                if kind_of(tx, rel.to) == Some(EntityKind::SynapseSet) {
                    sets.push((*owner, rel.id, rel.to));
                }
            }
        }

        let kept = match sets.first().copied() {
            Some((owner, rel, set)) => {
                if owner != survivor {
                    tx.delete_relationship(rel)?;
                    tx.create_relationship(RelKind::Contains, survivor, set, Properties::new())?;
                }
                set
            }
            None => {
                let set = tx.create_node(
                    EntityKind::SynapseSet,
                    dataset,
                    Some(NodeKey::synapse_set(dataset, action.result_body_id)),
                    Vec::new(),
                    Properties::new(),
                )?;
                tx.create_relationship(RelKind::Contains, survivor, set, Properties::new())?;
                set
            }
        };

        // current members of the kept set, and the union of all others
        let mut kept_members: BTreeMap<Location, (RelId, NodeId)> = BTreeMap::new();
        let mut union: BTreeMap<Location, NodeId> = BTreeMap::new();
        let mut absorbed_sets = BTreeSet::new();
        for (_, _, set) in &sets {
            for rel in tx.outgoing(*set, RelKind::Contains) {
                let Some(location) = tx.node(rel.to).and_then(synapse_location) else {
                    continue;
                };
                union.insert(location, rel.to);
                if *set == kept {
                    kept_members.insert(location, (rel.id, rel.to));
                }
            }
            if *set != kept {
                absorbed_sets.insert(*set);
            }
        }
        for set in absorbed_sets {
            tx.detach_delete_node(set)?;
        }

        let target: BTreeMap<Location, Polarity> = action
            .result_body_synapses
            .iter()
            .map(|SynapseEntry { polarity, location }| (*location, *polarity))
            .collect();

        // detach what the instruction no longer lists
        let mut detached = 0_usize;
        for (location, synapse) in &union {
            if target.contains_key(location) {
                continue;
            }
            if let Some((rel, _)) = kept_members.get(location) {
                tx.delete_relationship(*rel)?;
            }
            if tx.relationship_ids_of(*synapse).is_empty() {
                tx.delete_node(*synapse)?;
            }
            detached += 1;
        }

        // attach what it adds
        let mut attached = 0_usize;
        for (location, polarity) in &target {
            if kept_members.contains_key(location) {
                continue;
            }
            let synapse = match union.get(location).copied() {
                Some(synapse) => synapse,
                None => claim_or_create_synapse(tx, dataset, *location, *polarity)?,
            };
            tx.create_relationship(RelKind::Contains, kept, synapse, Properties::new())?;
            attached += 1;
        }

        tracing::debug!(
            sets = sets.len(),
            synapses = target.len(),
            attached,
            detached,
            "synapse sets united"
        );
        Ok(kept)
    }

    // -------------------------------------------------------------------------
    // Step 5
    // -------------------------------------------------------------------------

    /// Returns the new NeuronPart ids.
    fn rebuild_neuron_parts(
        tx: &mut Transaction,
        dataset: &str,
        action: &MergeAction,
        order: &[NodeId],
        old_regions: &BTreeSet<String>,
    ) -> Result<Vec<NodeId>, NeuroError> {
        let survivor = order[0];

        let mut old_parts = Vec::new();
        for owner in order {
            for rel in tx.incoming(*owner, RelKind::PartOf) {
                if kind_of(tx, rel.from) == Some(EntityKind::NeuronPart) {
                    old_parts.push(rel.from);
                }
            }
        }
        for part in old_parts {
            tx.detach_delete_node(part)?;
        }

        let thresholds = dataset_thresholds(&*tx, dataset);
        let mut roi_info = RoiInfo::new();
        for entry in &action.result_body_synapses {
            let Some(synapse) = tx
                .find(&NodeKey::synapse(dataset, entry.location))
                .and_then(|id| tx.node(id))
            else {
                continue;
            };
            let confidence = synapse.float(CONFIDENCE);
            for region in &synapse.labels {
                roi_info.observe(region, entry.polarity, confidence, thresholds);
            }
        }

        let mut parts = Vec::new();
        for (roi, counter) in roi_info.regions() {
            if counter.total() == 0 {
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
                Some(NodeKey::neuron_part(dataset, action.result_body_id, roi)),
                Vec::new(),
                props,
            )?;
            tx.create_relationship(RelKind::PartOf, part, survivor, Properties::new())?;
            parts.push(part);
        }

        let new_regions: BTreeSet<String> = roi_info.regions().map(|(r, _)| r.to_string()).collect();
        for region in old_regions.difference(&new_regions) {
            tx.remove_label(survivor, region)?;
        }
        for region in &new_regions {
            tx.add_label(survivor, region)?;
        }
        tx.set_property(survivor, ROI_INFO, roi_info.encode()?)?;

        tracing::debug!(parts = parts.len(), "neuron parts rebuilt");
        Ok(parts)
    }

    // -------------------------------------------------------------------------
    // Step 6
    // -------------------------------------------------------------------------

    fn delete_skeletons(tx: &mut Transaction, order: &[NodeId]) -> Result<(), NeuroError> {
        let mut skeletons = Vec::new();
        for owner in order {
            for rel in tx.outgoing(*owner, RelKind::Contains) {
                if kind_of(tx, rel.to) == Some(EntityKind::Skeleton) {
                    skeletons.push(rel.to);
                }
            }
        }
        for skeleton in skeletons {
            let skel_nodes: Vec<NodeId> = tx
                .outgoing(skeleton, RelKind::Contains)
                .iter()
                .map(|r| r.to)
                .filter(|id| kind_of(tx, *id) == Some(EntityKind::SkelNode))
                .collect();
            for node in skel_nodes {
                tx.detach_delete_node(node)?;
            }
            tx.detach_delete_node(skeleton)?;
        }
        Ok(())
    }

    /// Returns the new History node.
    fn record_history(
        tx: &mut Transaction,
        dataset: &str,
        action: &MergeAction,
        survivor: NodeId,
        donors: &[NodeId],
        prior: PriorCounts,
    ) -> Result<NodeId, NeuroError> {
        let mut props = Properties::new();
        props.insert(
            RESULT_BODY_ID.to_string(),
            PropertyValue::Int(action.result_body_id.value()),
        );
        for (key, value) in [
            (PRIOR_PRE, prior.pre),
            (PRIOR_POST, prior.post),
            (PRIOR_SIZE, prior.size),
        ] {
            if let Some(value) = value {
                props.insert(key.to_string(), PropertyValue::Int(value));
            }
        }
        let history = tx.create_node(EntityKind::History, dataset, None, Vec::new(), props)?;

        // the survivor's previous event becomes the parent of this one
        let previous: Vec<(RelId, NodeId)> = tx
            .outgoing(survivor, RelKind::From)
            .iter()
            .map(|r| (r.id, r.to))
            .collect();
        for (rel, prev) in previous {
            tx.delete_relationship(rel)?;
            tx.create_relationship(RelKind::MergedTo, prev, history, Properties::new())?;
        }
        tx.create_relationship(RelKind::From, survivor, history, Properties::new())?;

        for (donor, body) in donors.iter().zip(&action.bodies_merged) {
            retire(tx, *donor, *body)?;
            tx.create_relationship(RelKind::MergedTo, *donor, history, Properties::new())?;
        }
        Ok(history)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn require(tx: &Transaction, id: NodeId) -> Result<&Node, NeuroError> {
    tx.node(id).ok_or(NeuroError::NodeNotFound(id))
}

fn kind_of(tx: &Transaction, id: NodeId) -> Option<EntityKind> {
    tx.node(id).map(|n| n.kind)
}

/// Resolve a body id to its live segment.
fn resolve(tx: &Transaction, dataset: &str, body_id: BodyId) -> Result<NodeId, NeuroError> {
    if let Some(node) = tx.segment(dataset, body_id) {
        return Ok(node.id);
    }
    if !tx.ghosts(dataset, body_id).is_empty() {
        return Err(NeuroError::AlreadyMerged(format!(
            "body {} in dataset '{}' was merged into another body",
            body_id, dataset
        )));
    }
    Err(NeuroError::InvalidMergeInstruction(format!(
        "unknown body {} in dataset '{}'",
        body_id, dataset
    )))
}

fn synapse_location(node: &Node) -> Option<Location> {
    match &node.key {
        Some(NodeKey::Synapse { location, .. }) => Some(*location),
        _ => node
            .property(LOCATION)
            .and_then(PropertyValue::as_int_list)
            .and_then(Location::from_slice),
    }
}

/// Regions the survivor or a donor could carry as labels before the merge.
fn previous_regions(tx: &Transaction, order: &[NodeId]) -> Result<BTreeSet<String>, NeuroError> {
    let mut regions = BTreeSet::new();
    for id in order {
        let node = require(tx, *id)?;
        let info = RoiInfo::decode(node.text(ROI_INFO).unwrap_or_default())?;
        regions.extend(info.regions().map(|(r, _)| r.to_string()));
        for rel in tx.incoming(*id, RelKind::PartOf) {
            if let Some(roi) = tx.node(rel.from).and_then(|p| p.text(ROI)) {
                regions.insert(roi.to_string());
            }
        }
    }
    Ok(regions)
}

/// Reject listed synapses the merge may not take: an existing synapse whose
/// stored polarity differs from its entry, or one held by a body outside the
/// merged set. Runs before any mutation.
fn check_listed_synapses(
    tx: &Transaction,
    dataset: &str,
    action: &MergeAction,
    members: &BTreeSet<NodeId>,
) -> Result<(), NeuroError> {
    for SynapseEntry { polarity, location } in &action.result_body_synapses {
        let Some(synapse) = tx.find(&NodeKey::synapse(dataset, *location)) else {
            continue;
        };
        let node = require(tx, synapse)?;
        match synapse_polarity(node) {
            Some(stored) if stored != *polarity => {
                return Err(NeuroError::InvalidMergeInstruction(format!(
                    "synapse at {} is {}, instruction lists it as {}",
                    location,
                    stored.as_str(),
                    polarity.as_str()
                )));
            }
            Some(_) => {}
            None => {
                return Err(NeuroError::ConstraintViolation(format!(
                    "synapse at {} has no polarity",
                    location
                )));
            }
        }

        for set in tx.incoming(synapse, RelKind::Contains) {
            if kind_of(tx, set.from) != Some(EntityKind::SynapseSet) {
                continue;
            }
            for owner in tx.incoming(set.from, RelKind::Contains) {
                if members.contains(&owner.from) {
                    continue;
                }
                let Some(body) = tx
                    .node(owner.from)
                    .filter(|n| n.kind == EntityKind::Segment)
                    .and_then(|n| n.int(BODY_ID))
                else {
                    continue;
                };
                return Err(NeuroError::InvalidMergeInstruction(format!(
                    "synapse at {} belongs to body {}, which is not part of the merge",
                    location, body
                )));
            }
        }
    }
    Ok(())
}

/// Take an existing synapse out of any unowned set, or create it.
fn claim_or_create_synapse(
    tx: &mut Transaction,
    dataset: &str,
    location: Location,
    polarity: Polarity,
) -> Result<NodeId, NeuroError> {
    if let Some(synapse) = tx.find(&NodeKey::synapse(dataset, location)) {
        let owners: Vec<RelId> = tx
            .incoming(synapse, RelKind::Contains)
            .iter()
            .filter(|r| kind_of(tx, r.from) == Some(EntityKind::SynapseSet))
            .map(|r| r.id)
            .collect();
        for rel in owners {
            tracing::debug!(%location, "synapse ownership transferred");
            tx.delete_relationship(rel)?;
        }
        return Ok(synapse);
    }

    let mut props = Properties::new();
    props.insert(LOCATION.to_string(), PropertyValue::from(location.to_vec()));
    props.insert(SYNAPSE_TYPE.to_string(), PropertyValue::from(polarity.as_str()));
    tx.create_node(
        EntityKind::Synapse,
        dataset,
        Some(NodeKey::synapse(dataset, location)),
        Vec::new(),
        props,
    )
}

/// Demote a donor to an inert ghost.
///
/// Every non-provenance relationship is deleted, every property `p` except
/// `timeStamp` becomes `mergedP`, and all labels make way for the ghost
/// marker.
fn retire(tx: &mut Transaction, donor: NodeId, body_id: BodyId) -> Result<(), NeuroError> {
    for rel in tx.relationship_ids_of(donor) {
        let provenance = tx
            .relationship(rel)
            .is_some_and(|r: &Relationship| r.kind.is_provenance());
        if !provenance {
            tx.delete_relationship(rel)?;
        }
    }

    let properties = require(tx, donor)?.properties.clone();
    for (key, value) in properties {
        if key == TIME_STAMP {
            continue;
        }
        tx.remove_property(donor, &key)?;
        tx.set_property(donor, &merged_property_name(&key), value)?;
    }
    tx.convert_to_ghost(donor, body_id)?;
    tracing::debug!(body = %body_id, "donor retired");
    Ok(())
}

fn read_weights(rel: &Relationship) -> Result<ConnectionWeights, NeuroError> {
    Ok(ConnectionWeights {
        weight: rel.int(WEIGHT).unwrap_or(0),
        weight_hp: rel.int(WEIGHT_HP),
        roi_info: RoiInfo::decode(rel.text(ROI_INFO).unwrap_or_default())?,
    })
}

fn write_weights(
    tx: &mut Transaction,
    rel: RelId,
    weights: &ConnectionWeights,
) -> Result<(), NeuroError> {
    tx.set_relationship_property(rel, WEIGHT, weights.weight)?;
    match weights.weight_hp {
        Some(hp) => tx.set_relationship_property(rel, WEIGHT_HP, hp)?,
        None => {
            tx.remove_relationship_property(rel, WEIGHT_HP)?;
        }
    }
    if weights.roi_info.is_empty() {
        tx.remove_relationship_property(rel, ROI_INFO)?;
    } else {
        tx.set_relationship_property(rel, ROI_INFO, weights.roi_info.encode()?)?;
    }
    Ok(())
}
