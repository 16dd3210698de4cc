//! Entity context types used as input to flag evaluation.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// String-keyed entity properties that constraints are matched against.
///
/// Values are stored as strings; numeric operators parse both sides as floating point at
/// evaluation time, so `"42"` compares equal to `"42.0"` under `GTE`/`LTE` but not under `EQ`.
pub type EntityContext = HashMap<String, String>;

/// Identifies the entity a flag is evaluated for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvalContext {
    /// Stable entity identifier used for bucketing.
    ///
    /// An empty id disables rollout for the request: constraints are still checked, but no
    /// variant is ever assigned. No random fallback id is generated.
    #[serde(rename = "entityID", default)]
    pub entity_id: String,

    /// Optional entity kind (e.g. `"user"`, `"org"`). Not used by evaluation itself; carried
    /// through for logging.
    #[serde(rename = "entityType", default)]
    pub entity_type: Option<String>,

    /// Properties that constraints are matched against.
    #[serde(rename = "entityContext", default)]
    pub entity_context: EntityContext,
}

impl EvalContext {
    /// Create a context for `entity_id` with no properties.
    pub fn new(entity_id: impl Into<String>) -> EvalContext {
        EvalContext {
            entity_id: entity_id.into(),
            ..EvalContext::default()
        }
    }

    /// Builder-style helper to set the entity type.
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> EvalContext {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Builder-style helper to add a single context property.
    pub fn with_property(
        mut self,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> EvalContext {
        self.entity_context.insert(property.into(), value.into());
        self
    }
}

/// A single evaluation request: which flag, for which entity.
///
/// The flag may be referenced by id or by key. When both are present, the id wins. Field names
/// follow the evaluation API wire format.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvalRequest {
    /// Flag id to evaluate.
    #[serde(rename = "flagID", default)]
    pub flag_id: Option<i64>,

    /// Flag key to evaluate. Ignored if `flag_id` is set.
    #[serde(rename = "flagKey", default)]
    pub flag_key: Option<String>,

    /// Entity the flag is evaluated for.
    #[serde(flatten)]
    pub context: EvalContext,

    /// When set, the result carries a step-by-step debug log of the segment walk.
    #[serde(rename = "enableDebug", default)]
    pub enable_debug: bool,
}

impl EvalRequest {
    /// Request evaluation of a flag by id.
    pub fn by_flag_id(flag_id: i64, context: EvalContext) -> EvalRequest {
        EvalRequest {
            flag_id: Some(flag_id),
            context,
            ..EvalRequest::default()
        }
    }

    /// Request evaluation of a flag by key.
    pub fn by_flag_key(flag_key: impl Into<String>, context: EvalContext) -> EvalRequest {
        EvalRequest {
            flag_key: Some(flag_key.into()),
            context,
            ..EvalRequest::default()
        }
    }

    /// Builder-style helper to request a debug log.
    pub fn with_debug(mut self) -> EvalRequest {
        self.enable_debug = true;
        self
    }
}
