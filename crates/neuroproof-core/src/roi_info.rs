//! # Region Aggregate Codec
//!
//! Per-region synapse counters (`pre`, `post`, `preHP`, `postHP`) and their
//! compact JSON text form, as stored in `roiInfo` properties:
//!
//! ```text
//! {"roiA":{"preHP":1,"postHP":0,"pre":1,"post":1}}
//! ```
//!
//! Keys are region names in lexicographic order and counter fields are always
//! written in the order above, so `encode(decode(text))` is byte-identical for
//! any text this module produced. A region that is absent counts as zero on all
//! four counters.
//!
//! Incremental updates must never silently drop data: `apply_observation`
//! fails with `MalformedAggregate` on corrupt input. Bulk loading may opt into
//! `decode_or_reset`, which logs and starts over from an empty aggregate.

use crate::{NeuroError, Polarity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence thresholds for the high-precision sub-counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HpThresholds {
    pub pre: f64,
    pub post: f64,
}

impl HpThresholds {
    #[must_use]
    pub const fn new(pre: f64, post: f64) -> Self {
        Self { pre, post }
    }

    /// Whether an observation with this confidence counts as high precision.
    /// Sites without a confidence never do.
    #[must_use]
    pub fn is_high_precision(&self, polarity: Polarity, confidence: Option<f64>) -> bool {
        let threshold = match polarity {
            Polarity::Pre => self.pre,
            Polarity::Post => self.post,
        };
        confidence.is_some_and(|c| c >= threshold)
    }
}

impl Default for HpThresholds {
    fn default() -> Self {
        Self::new(
            crate::primitives::DEFAULT_PRE_HP_THRESHOLD,
            crate::primitives::DEFAULT_POST_HP_THRESHOLD,
        )
    }
}

/// The four counters of one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SynapseCounter {
    #[serde(rename = "preHP", default)]
    pub pre_hp: u64,
    #[serde(rename = "postHP", default)]
    pub post_hp: u64,
    #[serde(default)]
    pub pre: u64,
    #[serde(default)]
    pub post: u64,
}

impl SynapseCounter {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pre.saturating_add(self.post)
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.pre == 0 && self.post == 0 && self.pre_hp == 0 && self.post_hp == 0
    }

    /// High-precision counts never exceed their totals.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.pre_hp <= self.pre && self.post_hp <= self.post
    }

    fn absorb(&mut self, other: &Self) {
        self.pre = self.pre.saturating_add(other.pre);
        self.post = self.post.saturating_add(other.post);
        self.pre_hp = self.pre_hp.saturating_add(other.pre_hp);
        self.post_hp = self.post_hp.saturating_add(other.post_hp);
    }
}

/// Region name -> counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoiInfo(BTreeMap<String, SynapseCounter>);

impl RoiInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse aggregate text. Empty text is an empty aggregate.
    pub fn decode(text: &str) -> Result<Self, NeuroError> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let info: Self = serde_json::from_str(text)
            .map_err(|e| NeuroError::MalformedAggregate(format!("{}: {}", e, text)))?;
        if let Some((roi, _)) = info.0.iter().find(|(_, c)| !c.is_consistent()) {
            return Err(NeuroError::MalformedAggregate(format!(
                "high-precision count exceeds total for region '{}'",
                roi
            )));
        }
        Ok(info)
    }

    /// Parse aggregate text, falling back to an empty aggregate when it is
    /// corrupt. Only for bulk loading, where the aggregate is rebuilt anyway.
    #[must_use]
    pub fn decode_or_reset(text: &str) -> Self {
        match Self::decode(text) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "resetting malformed region aggregate");
                Self::new()
            }
        }
    }

    /// Encode to the canonical text form.
    pub fn encode(&self) -> Result<String, NeuroError> {
        serde_json::to_string(self).map_err(|e| NeuroError::SerializationError(e.to_string()))
    }

    /// Counters for a region (zero if absent).
    #[must_use]
    pub fn get(&self, roi: &str) -> SynapseCounter {
        self.0.get(roi).copied().unwrap_or_default()
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, &SynapseCounter)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Record one synapse observation in `roi`.
    pub fn increment(&mut self, roi: &str, polarity: Polarity, high_precision: bool) {
        let counter = self.0.entry(roi.to_string()).or_default();
        match polarity {
            Polarity::Pre => {
                counter.pre = counter.pre.saturating_add(1);
                if high_precision {
                    counter.pre_hp = counter.pre_hp.saturating_add(1);
                }
            }
            Polarity::Post => {
                counter.post = counter.post.saturating_add(1);
                if high_precision {
                    counter.post_hp = counter.post_hp.saturating_add(1);
                }
            }
        }
    }

    /// Record an observation, deciding high precision from `confidence`.
    pub fn observe(
        &mut self,
        roi: &str,
        polarity: Polarity,
        confidence: Option<f64>,
        thresholds: HpThresholds,
    ) {
        self.increment(
            roi,
            polarity,
            thresholds.is_high_precision(polarity, confidence),
        );
    }

    /// Region-wise sum of another aggregate into this one.
    pub fn merge_from(&mut self, other: &Self) {
        for (roi, counter) in &other.0 {
            self.0.entry(roi.clone()).or_default().absorb(counter);
        }
    }

    /// `postHP` summed over every region.
    #[must_use]
    pub fn post_hp_total(&self) -> i64 {
        let total = self
            .0
            .values()
            .fold(0_u64, |acc, c| acc.saturating_add(c.post_hp));
        i64::try_from(total).unwrap_or(i64::MAX)
    }

    /// Drop regions whose counters are all zero.
    pub fn prune(&mut self) {
        self.0.retain(|_, c| !c.is_zero());
    }
}

impl FromIterator<(String, SynapseCounter)> for RoiInfo {
    fn from_iter<I: IntoIterator<Item = (String, SynapseCounter)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Decode `existing`, add one observation and re-encode.
///
/// Counts for other regions are untouched. Fails with `MalformedAggregate` if
/// `existing` is non-empty and cannot be parsed.
pub fn apply_observation(
    existing: &str,
    roi: &str,
    polarity: Polarity,
    confidence: f64,
    pre_hp_threshold: f64,
    post_hp_threshold: f64,
) -> Result<String, NeuroError> {
    let mut info = RoiInfo::decode(existing)?;
    info.observe(
        roi,
        polarity,
        Some(confidence),
        HpThresholds::new(pre_hp_threshold, post_hp_threshold),
    );
    info.encode()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_sequence_matches_expected_text() {
        let mut info = RoiInfo::new();
        info.increment("roiA", Polarity::Pre, true);
        info.increment("roiA", Polarity::Post, false);
        let initial = info.encode().expect("encode");

        let next = apply_observation(&initial, "roiB", Polarity::Post, 0.5, 0.9, 0.4)
            .expect("apply");
        assert_eq!(
            next,
            r#"{"roiA":{"preHP":1,"postHP":0,"pre":1,"post":1},"roiB":{"preHP":0,"postHP":1,"pre":0,"post":1}}"#
        );

        let next = apply_observation(&next, "roiB", Polarity::Pre, 0.98, 0.9, 0.4).expect("apply");
        assert_eq!(
            next,
            r#"{"roiA":{"preHP":1,"postHP":0,"pre":1,"post":1},"roiB":{"preHP":1,"postHP":1,"pre":1,"post":1}}"#
        );
    }

    #[test]
    fn empty_text_is_empty_aggregate() {
        assert!(RoiInfo::decode("").expect("decode").is_empty());
        let text = apply_observation("", "roiA", Polarity::Pre, 0.1, 0.5, 0.5).expect("apply");
        assert_eq!(text, r#"{"roiA":{"preHP":0,"postHP":0,"pre":1,"post":0}}"#);
    }

    #[test]
    fn missing_high_precision_fields_default_to_zero() {
        let info = RoiInfo::decode(r#"{"roiA":{"pre":1,"post":2}}"#).expect("decode");
        assert_eq!(
            info.get("roiA"),
            SynapseCounter {
                pre_hp: 0,
                post_hp: 0,
                pre: 1,
                post: 2
            }
        );
    }

    #[test]
    fn malformed_text_fails_loudly() {
        let result = apply_observation("{not json", "roiA", Polarity::Pre, 1.0, 0.5, 0.5);
        assert!(matches!(result, Err(NeuroError::MalformedAggregate(_))));
    }

    #[test]
    fn inconsistent_high_precision_is_malformed() {
        let result = RoiInfo::decode(r#"{"roiA":{"preHP":3,"postHP":0,"pre":1,"post":0}}"#);
        assert!(matches!(result, Err(NeuroError::MalformedAggregate(_))));
    }

    #[test]
    fn decode_or_reset_recovers() {
        assert!(RoiInfo::decode_or_reset("[1,2,3]").is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let t = HpThresholds::new(0.5, 0.8);
        assert!(t.is_high_precision(Polarity::Pre, Some(0.5)));
        assert!(!t.is_high_precision(Polarity::Post, Some(0.79)));
        assert!(!t.is_high_precision(Polarity::Pre, None));
    }

    #[test]
    fn post_hp_total_sums_regions() {
        let mut info = RoiInfo::new();
        info.increment("roiA", Polarity::Post, true);
        info.increment("roiA", Polarity::Post, false);
        info.increment("roiB", Polarity::Post, true);
        info.increment("roiB", Polarity::Pre, true);
        assert_eq!(info.post_hp_total(), 2);
        assert_eq!(RoiInfo::new().post_hp_total(), 0);
    }

    #[test]
    fn merge_from_sums_regionwise() {
        let mut a = RoiInfo::new();
        a.increment("roiA", Polarity::Pre, true);
        let mut b = RoiInfo::new();
        b.increment("roiA", Polarity::Pre, false);
        b.increment("roiB", Polarity::Post, true);
        a.merge_from(&b);
        assert_eq!(a.get("roiA").pre, 2);
        assert_eq!(a.get("roiA").pre_hp, 1);
        assert_eq!(a.get("roiB").post_hp, 1);
    }
}
