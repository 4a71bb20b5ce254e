//! # Entity Merge
//!
//! Merge instructions and the engine that applies them.
//!
//! A merge instruction names one surviving body, one or more donor bodies and
//! the authoritative final synapse list of the survivor:
//!
//! ```json
//! {"Action":"merge","ResultBodyID":8426959,"BodiesMerged":[26311,2589725],
//!  "ResultBodySize":2778831,
//!  "ResultBodySynapses":[{"Type":"pre","Location":[4287,2277,1542]}]}
//! ```

mod engine;

pub use engine::MergeEngine;

use crate::primitives::{MAX_MERGE_DONORS, MAX_MERGE_SYNAPSES, MERGE_ACTION};
use crate::{BodyId, Location, NeuroError, Polarity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One entry of the final synapse list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynapseEntry {
    #[serde(rename = "Type")]
    pub polarity: Polarity,
    #[serde(rename = "Location")]
    pub location: Location,
}

/// A merge instruction as submitted by a proofreading client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeAction {
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "ResultBodyID")]
    pub result_body_id: BodyId,
    #[serde(rename = "BodiesMerged")]
    pub bodies_merged: Vec<BodyId>,
    #[serde(rename = "ResultBodySize")]
    pub result_body_size: i64,
    #[serde(rename = "ResultBodySynapses")]
    pub result_body_synapses: Vec<SynapseEntry>,
}

impl MergeAction {
    /// Build a merge instruction.
    #[must_use]
    pub fn new(
        survivor: BodyId,
        donors: Vec<BodyId>,
        size: i64,
        synapses: Vec<SynapseEntry>,
    ) -> Self {
        Self {
            action: MERGE_ACTION.to_string(),
            result_body_id: survivor,
            bodies_merged: donors,
            result_body_size: size,
            result_body_synapses: synapses,
        }
    }

    /// Parse the JSON form. Any shape error is an invalid instruction.
    pub fn from_json(json: &str) -> Result<Self, NeuroError> {
        serde_json::from_str(json).map_err(|e| NeuroError::InvalidMergeInstruction(e.to_string()))
    }

    /// Checks that need no graph access.
    pub fn validate(&self) -> Result<(), NeuroError> {
        let invalid = |msg: String| Err(NeuroError::InvalidMergeInstruction(msg));

        if self.action != MERGE_ACTION {
            return invalid(format!("unsupported action '{}'", self.action));
        }
        if self.bodies_merged.is_empty() {
            return invalid("no bodies to merge".to_string());
        }
        if self.bodies_merged.len() > MAX_MERGE_DONORS {
            return invalid(format!(
                "{} donors exceeds the limit of {}",
                self.bodies_merged.len(),
                MAX_MERGE_DONORS
            ));
        }
        if self.result_body_synapses.len() > MAX_MERGE_SYNAPSES {
            return invalid(format!(
                "{} synapses exceeds the limit of {}",
                self.result_body_synapses.len(),
                MAX_MERGE_SYNAPSES
            ));
        }
        if self.result_body_size < 0 {
            return invalid(format!("negative size {}", self.result_body_size));
        }

        let mut donors = BTreeSet::new();
        for donor in &self.bodies_merged {
            if *donor == self.result_body_id {
                return invalid(format!("body {} cannot be merged into itself", donor));
            }
            if !donors.insert(*donor) {
                return invalid(format!("body {} listed twice", donor));
            }
        }

        let mut locations = BTreeSet::new();
        for synapse in &self.result_body_synapses {
            if !locations.insert(synapse.location) {
                return invalid(format!("synapse {} listed twice", synapse.location));
            }
        }
        Ok(())
    }

    /// `(pre, post)` counts of the final synapse list.
    #[must_use]
    pub fn polarity_counts(&self) -> (i64, i64) {
        self.result_body_synapses
            .iter()
            .fold((0, 0), |(pre, post), s| match s.polarity {
                Polarity::Pre => (pre + 1, post),
                Polarity::Post => (pre, post + 1),
            })
    }
}
