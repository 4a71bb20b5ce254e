//! # Engine Primitives
//!
//! Hardcoded constants shared by the merge engine, the change tracker and
//! the persistence layer. These are compiled into the binary and immutable
//! at runtime.

// =============================================================================
// PROPERTY NAMES
// =============================================================================

/// Property written by the summary maintainer on every touched node.
///
/// Writes to this property alone never make a node eligible for timestamping,
/// otherwise every timestamp write would trigger another one.
pub const TIME_STAMP: &str = "timeStamp";

/// Prefix given to every property of a retired donor.
pub const MERGED_PREFIX: &str = "merged";

/// Marker label of a retired donor.
pub const GHOST_LABEL: &str = "Ghost";

pub const BODY_ID: &str = "bodyId";
pub const NAME: &str = "name";
pub const NEURON_TYPE: &str = "type";
pub const STATUS: &str = "status";
pub const SIZE: &str = "size";
pub const SOMA_LOCATION: &str = "somaLocation";
pub const SOMA_RADIUS: &str = "somaRadius";
pub const PRE: &str = "pre";
pub const POST: &str = "post";
pub const ROI_INFO: &str = "roiInfo";

pub const LOCATION: &str = "location";
pub const SYNAPSE_TYPE: &str = "type";
pub const CONFIDENCE: &str = "confidence";

pub const WEIGHT: &str = "weight";
pub const WEIGHT_HP: &str = "weightHP";

pub const ROI: &str = "roi";
pub const RADIUS: &str = "radius";

pub const RESULT_BODY_ID: &str = "resultBodyId";
pub const PRIOR_PRE: &str = "priorPre";
pub const PRIOR_POST: &str = "priorPost";
pub const PRIOR_SIZE: &str = "priorSize";

pub const TOTAL_SYNAPSE_COUNT: &str = "totalSynapseCount";
pub const TOTAL_PRE_COUNT: &str = "totalPreCount";
pub const TOTAL_POST_COUNT: &str = "totalPostCount";
pub const TOTAL_CONNECTION_COUNT: &str = "totalConnectionCount";
pub const LAST_DATABASE_EDIT: &str = "lastDatabaseEdit";
pub const PRE_HP_THRESHOLD: &str = "preHPThreshold";
pub const POST_HP_THRESHOLD: &str = "postHPThreshold";

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default confidence a presynaptic site needs to count as high precision.
pub const DEFAULT_PRE_HP_THRESHOLD: f64 = 0.5;

/// Default confidence a postsynaptic site needs to count as high precision.
pub const DEFAULT_POST_HP_THRESHOLD: f64 = 0.5;

/// The only merge action a merge instruction may carry.
pub const MERGE_ACTION: &str = "merge";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of donors in a single merge instruction.
pub const MAX_MERGE_DONORS: usize = 10_000;

/// Maximum number of synapses in a merge instruction's final synapse list.
pub const MAX_MERGE_SYNAPSES: usize = 5_000_000;

/// Maximum length of a region name.
pub const MAX_ROI_NAME_LENGTH: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_property_name() {
        assert_eq!(TIME_STAMP, "timeStamp");
    }

    #[test]
    fn default_thresholds_are_probabilities() {
        assert!((0.0..=1.0).contains(&DEFAULT_PRE_HP_THRESHOLD));
        assert!((0.0..=1.0).contains(&DEFAULT_POST_HP_THRESHOLD));
    }
}
