//! Flag evaluation: the segment walk, variant selection, and the serving entry points shared by
//! the server cache and the offline SDK.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constraints;
use crate::context::{EvalContext, EvalRequest};
use crate::models::{Flag, Segment};
use crate::rollout;
use crate::snapshot::Snapshot;
use crate::{Error, Result};

/// Outcome of evaluating one flag for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// Id of the evaluated flag (0 for a blank result when the request named no id).
    #[serde(rename = "flagID")]
    pub flag_id: i64,
    /// Key of the evaluated flag.
    #[serde(rename = "flagKey")]
    pub flag_key: String,
    /// Segment that decided the outcome; on exhaustion, the last segment visited.
    #[serde(rename = "segmentID")]
    pub segment_id: Option<i64>,
    /// Assigned variant, if any.
    #[serde(rename = "variantID")]
    pub variant_id: Option<i64>,
    /// Key of the assigned variant.
    #[serde(rename = "variantKey")]
    pub variant_key: Option<String>,
    /// Attachment of the assigned variant.
    #[serde(rename = "variantAttachment")]
    pub variant_attachment: Option<HashMap<String, String>>,
    /// Step-by-step walk records; empty unless the request enabled debug.
    #[serde(rename = "evalDebugLog", default)]
    pub debug_log: Vec<SegmentDebugLog>,
}

impl EvalResult {
    /// Whether a variant was assigned.
    pub fn is_match(&self) -> bool {
        self.variant_id.is_some()
    }

    fn blank(flag_id: i64, flag_key: &str) -> EvalResult {
        EvalResult {
            flag_id,
            flag_key: flag_key.to_owned(),
            segment_id: None,
            variant_id: None,
            variant_key: None,
            variant_attachment: None,
            debug_log: Vec::new(),
        }
    }
}

/// One record of the evaluation walk. Flag-level records (disabled flag, unknown flag) use
/// segment id 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDebugLog {
    #[serde(rename = "segmentID")]
    pub segment_id: i64,
    pub msg: String,
}

/// Run the rollout algorithm for one segment, salted with the flag id.
///
/// Returns the selected variant id (or `None`) and the rollout debug message.
pub fn select_variant(segment: &Segment, entity_id: &str, flag_id: i64) -> (Option<i64>, String) {
    let table = segment.distribution_table();
    rollout::rollout(
        entity_id,
        &flag_id.to_string(),
        segment.rollout_percent,
        &table.variant_ids,
        &table.percents_accumulated,
    )
}

/// Evaluate a single flag against a context.
///
/// Pure and infallible: misconfigured data degrades to "no variant" rather than erroring.
/// Segments are visited in ascending rank; a matched segment whose rollout declines lets the
/// walk continue with the next segment.
pub fn evaluate_flag(flag: &Flag, context: &EvalContext, enable_debug: bool) -> EvalResult {
    let mut result = EvalResult::blank(flag.id, &flag.key);

    if !flag.enabled {
        if enable_debug {
            result.debug_log.push(SegmentDebugLog {
                segment_id: 0,
                msg: format!("flagID {} is not enabled", flag.id),
            });
        }
        return result;
    }

    if flag.segments.is_empty() {
        if enable_debug {
            result.debug_log.push(SegmentDebugLog {
                segment_id: 0,
                msg: format!("flagID {} has no segments", flag.id),
            });
        }
        return result;
    }

    let mut segments: Vec<&Segment> = flag.segments.iter().collect();
    segments.sort_by_key(|segment| segment.rank);

    let mut last_segment_id = None;
    for segment in segments {
        last_segment_id = Some(segment.id);

        if !constraints::matches_all(&segment.constraints, &context.entity_context) {
            if enable_debug {
                result.debug_log.push(SegmentDebugLog {
                    segment_id: segment.id,
                    msg: format!("segment_id {} did not match constraints", segment.id),
                });
            }
            continue;
        }

        let (selected, rollout_msg) = select_variant(segment, &context.entity_id, flag.id);
        log::trace!(target: "burgee", flag_id = flag.id, segment_id = segment.id; "{rollout_msg}");

        match selected {
            Some(variant_id) => {
                if enable_debug {
                    result.debug_log.push(SegmentDebugLog {
                        segment_id: segment.id,
                        msg: format!(
                            "matched all constraints. rollout yes. variantID: {variant_id}"
                        ),
                    });
                }
                result.segment_id = Some(segment.id);
                result.variant_id = Some(variant_id);
                if let Some(variant) = flag.variant(variant_id) {
                    result.variant_key = Some(variant.key.clone());
                    result.variant_attachment = variant.attachment.clone();
                }
                return result;
            }
            None => {
                if enable_debug {
                    result.debug_log.push(SegmentDebugLog {
                        segment_id: segment.id,
                        msg: "matched all constraints. rollout no.".to_owned(),
                    });
                }
                // Rollout declined; the next segment may still assign.
            }
        }
    }

    result.segment_id = last_segment_id;
    result
}

/// Evaluate a request against a snapshot.
///
/// `None` snapshot means the cache has no data yet and is reported as [`Error::NotReady`]. An
/// unknown flag is not an error: it yields a blank result, optionally noting the miss in the
/// debug log.
pub fn evaluate(snapshot: Option<&Snapshot>, request: &EvalRequest) -> Result<EvalResult> {
    let snapshot = snapshot.ok_or(Error::NotReady)?;
    Ok(evaluate_in(snapshot, request))
}

/// Evaluate a batch of requests against one consistent snapshot.
pub fn evaluate_batch(
    snapshot: Option<&Snapshot>,
    requests: &[EvalRequest],
) -> Result<Vec<EvalResult>> {
    let snapshot = snapshot.ok_or(Error::NotReady)?;
    Ok(requests
        .iter()
        .map(|request| evaluate_in(snapshot, request))
        .collect())
}

fn evaluate_in(snapshot: &Snapshot, request: &EvalRequest) -> EvalResult {
    let flag = match (request.flag_id, request.flag_key.as_deref()) {
        (Some(flag_id), _) => match snapshot.get_by_id(flag_id) {
            Some(flag) => flag,
            None => {
                return blank_with_msg(
                    flag_id,
                    request.flag_key.as_deref().unwrap_or(""),
                    format!("flagID {flag_id} not found or deleted"),
                    request.enable_debug,
                );
            }
        },
        (None, Some(flag_key)) => match snapshot.get_by_key(flag_key) {
            Some(flag) => flag,
            None => {
                return blank_with_msg(
                    0,
                    flag_key,
                    format!("flagKey {flag_key} not found or deleted"),
                    request.enable_debug,
                );
            }
        },
        (None, None) => {
            return blank_with_msg(0, "", "flag id or key required".to_owned(), request.enable_debug);
        }
    };

    let result = evaluate_flag(flag, &request.context, request.enable_debug);
    log::trace!(target: "burgee", result:serde = result; "evaluated flag");
    result
}

fn blank_with_msg(flag_id: i64, flag_key: &str, msg: String, enable_debug: bool) -> EvalResult {
    log::debug!(target: "burgee", flag_id = flag_id, flag_key = flag_key; "{msg}");
    let mut result = EvalResult::blank(flag_id, flag_key);
    if enable_debug {
        result.debug_log.push(SegmentDebugLog { segment_id: 0, msg });
    }
    result
}
