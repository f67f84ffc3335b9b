//! Attribute rule engine.
//!
//! - [`expand`]: sub-attribute expansion into composite values
//! - [`rules`]: rule model and per-step evaluation
//! - [`generate`]: depth-first enumeration of valid combinations
//!
//! Catalog and rule data are loaded once per call into a [`GenerationContext`]
//! and passed down read-only; nothing is re-queried during recursion.

pub mod expand;
pub mod generate;
pub mod rules;

use tracing::warn;

use crate::attribute::AttributeDefinition;
use crate::engine::expand::{ExpandedAttribute, SubAttributeIndex};
use crate::engine::generate::Generated;
use crate::engine::rules::{Rule, RuleAction};

/// Immutable inputs for one generation or preview run.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    attributes: Vec<ExpandedAttribute>,
    rules: Vec<Rule>,
}

impl GenerationContext {
    /// Expand `attributes` (already in display order) and keep `rules`
    /// (already filtered and priority-ordered).
    ///
    /// With `include_sub_attributes == false` every base value passes through.
    pub fn new(
        attributes: &[AttributeDefinition],
        subs: &SubAttributeIndex,
        rules: Vec<Rule>,
        include_sub_attributes: bool,
    ) -> Self {
        let attributes = attributes
            .iter()
            .map(|a| {
                if include_sub_attributes {
                    expand::expand(a, subs)
                } else {
                    expand::passthrough(a)
                }
            })
            .collect();

        for rule in &rules {
            let unknown = rule
                .actions
                .iter()
                .filter(|a| matches!(a, RuleAction::Unrecognized(_)))
                .count();
            if unknown > 0 {
                warn!(
                    rule = %rule.id,
                    unknown,
                    "rule has unrecognized actions; they will be ignored"
                );
            }
        }

        Self { attributes, rules }
    }

    /// Expanded attributes in display order.
    pub fn attributes(&self) -> &[ExpandedAttribute] {
        &self.attributes
    }

    /// Applicable rules, priority-descending.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Upper bound on combinations if no rule pruned anything.
    pub fn cartesian_upper_bound(&self) -> u128 {
        self.attributes
            .iter()
            .fold(1u128, |acc, a| acc.saturating_mul(a.values.len() as u128))
    }

    /// Run the generator.
    pub fn generate(&self) -> Generated {
        generate::generate(&self.attributes, &self.rules)
    }
}
