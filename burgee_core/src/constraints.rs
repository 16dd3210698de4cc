//! Constraint matching against entity contexts.
use regex::Regex;

use crate::context::EntityContext;
use crate::models::{Constraint, Operator};

/// Evaluate a segment's constraints against an entity context.
///
/// All constraints must match (AND semantics); an empty list is vacuously true. This function
/// never fails: any misconfiguration degrades to `false` for the affected constraint.
pub fn matches_all(constraints: &[Constraint], context: &EntityContext) -> bool {
    constraints
        .iter()
        .all(|constraint| constraint.matches(context))
}

impl Constraint {
    /// Whether this single constraint matches the context.
    ///
    /// A property absent from the context never matches, including under negated operators.
    pub fn matches(&self, context: &EntityContext) -> bool {
        let Some(property_value) = context.get(&self.property) else {
            return false;
        };
        self.operator.eval(property_value, &self.value)
    }
}

impl Operator {
    /// Apply the operator to a property value and the constraint value. Returns `false` if the
    /// operator cannot be applied or there's a misconfiguration.
    pub fn eval(self, property_value: &str, constraint_value: &str) -> bool {
        self.try_eval(property_value, constraint_value)
            .unwrap_or(false)
    }

    /// Try applying the operator, returning `None` if the values cannot be interpreted (bad
    /// number, invalid regex pattern).
    fn try_eval(self, property_value: &str, constraint_value: &str) -> Option<bool> {
        match self {
            Self::Eq | Self::Neq => {
                let eq = property_value == constraint_value;
                Some(if self == Self::Eq { eq } else { !eq })
            }

            Self::Lt | Self::Lte | Self::Gt | Self::Gte => {
                let property: f64 = property_value.parse().ok()?;
                let constraint: f64 = constraint_value.parse().ok()?;
                Some(match self {
                    Self::Lt => property < constraint,
                    Self::Lte => property <= constraint,
                    Self::Gt => property > constraint,
                    Self::Gte => property >= constraint,
                    _ => return None,
                })
            }

            Self::Ereg | Self::Nereg => {
                // Anchored so the whole property value must match the pattern, not a substring.
                let regex = Regex::new(&format!("^(?:{constraint_value})$")).ok()?;
                let matches = regex.is_match(property_value);
                Some(if self == Self::Ereg { matches } else { !matches })
            }

            Self::In | Self::NotIn => {
                let is_in = constraint_value
                    .split(',')
                    .any(|item| item.trim() == property_value);
                Some(if self == Self::In { is_in } else { !is_in })
            }

            Self::Contains | Self::NotContains => {
                let contains = property_value.contains(constraint_value);
                Some(if self == Self::Contains {
                    contains
                } else {
                    !contains
                })
            }
        }
    }
}
