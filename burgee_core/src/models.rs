//! Flag configuration data model.
//!
//! These types mirror the export wire format (camelCase JSON) and are shared by the server-side
//! cache and the offline SDK, so both sides evaluate the exact same structure.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `TryParse` allows a subfield to fail parsing without failing the parsing of the whole
/// document.
///
/// Used for flag entries in the export document: an entry produced by a newer server (or a
/// damaged one) parses as `ParseFailed` and is skipped, instead of poisoning every other flag.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// A feature flag: ranked segments plus the variant list they distribute over.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: i64,
    pub key: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl Flag {
    /// Look up a variant of this flag by id.
    pub fn variant(&self, variant_id: i64) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}

/// A targeting segment: constraints gate entry, distributions split matched entities over
/// variants.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: i64,
    /// Evaluation order within the flag; lower ranks are visited first.
    #[serde(default = "Segment::default_rank")]
    pub rank: i32,
    /// Percentage of the bucket space (0..=100) this segment rolls out to.
    #[serde(default)]
    pub rollout_percent: i32,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub distributions: Vec<Distribution>,
}

impl Segment {
    /// Rank assigned to segments whose export entry carries none.
    pub const DEFAULT_RANK: i32 = 999;

    fn default_rank() -> i32 {
        Segment::DEFAULT_RANK
    }

    /// Prepare the accumulated distribution table used by the rollout algorithm.
    ///
    /// Distributions are sorted by percent ascending (stable, so ties keep authoring order) and
    /// accumulated on the 1000-bucket scale.
    pub fn distribution_table(&self) -> DistributionTable {
        let mut sorted: Vec<&Distribution> = self.distributions.iter().collect();
        sorted.sort_by_key(|d| d.percent);

        let mut variant_ids = Vec::with_capacity(sorted.len());
        let mut percents_accumulated = Vec::with_capacity(sorted.len());
        let mut total = 0;
        for distribution in sorted {
            variant_ids.push(distribution.variant_id);
            total += distribution.percent * 10;
            percents_accumulated.push(total);
        }

        DistributionTable {
            variant_ids,
            percents_accumulated,
        }
    }
}

/// A segment's distributions in the form the rollout algorithm consumes.
///
/// `percents_accumulated[i]` is the inclusive upper bound (on the one-indexed 1..=1000 bucket
/// scale) of the bucket range assigned to `variant_ids[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTable {
    pub variant_ids: Vec<i64>,
    pub percents_accumulated: Vec<i32>,
}

/// A single targeting rule within a segment. All of a segment's constraints must match.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub id: i64,
    /// Entity context property the rule applies to.
    pub property: String,
    pub operator: Operator,
    pub value: String,
}

/// Constraint operators, spelled as on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Full-string regular expression match.
    Ereg,
    /// Full-string regular expression non-match.
    Nereg,
    /// Membership in a comma-separated list.
    In,
    NotIn,
    /// Substring match.
    Contains,
    NotContains,
}

/// Share of a segment's matched entities assigned to one variant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub id: i64,
    /// Older exporters spell this `variantID`; both spellings are accepted.
    #[serde(alias = "variantID")]
    pub variant_id: i64,
    #[serde(default)]
    pub percent: i32,
}

/// A variant an entity can be assigned to, with an optional payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: i64,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<HashMap<String, String>>,
}
