//! Constrained combination generation.
//!
//! Depth-first over attributes in display order. At each attribute the
//! committed assignment is evaluated against the rules before any value is
//! tried, so hidden attributes are skipped and unsatisfiable subtrees are cut
//! before their descendants are expanded. Work is bounded by the number of
//! valid combinations rather than the full cartesian product.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::expand::ExpandedAttribute;
use crate::engine::rules::{Rule, evaluate_step};
use crate::key::{Assignment, CombinationKey, encode};

/// Display labels for one attribute of a combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeLabel {
    /// Attribute display name.
    pub attribute: String,
    /// Value display label (concatenated for composite values).
    pub value: String,
}

/// Attribute id -> labels.
pub type LabelMap = BTreeMap<String, AttributeLabel>;

/// One valid point of the expanded attribute space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    /// Canonical key of `assignment`.
    pub key: CombinationKey,
    /// Attribute id -> value. Hidden attributes are absent.
    pub assignment: Assignment,
    /// Attribute id -> labels.
    pub labels: LabelMap,
    /// Emission order, starting at 0.
    pub sort_order: i32,
}

/// What pruning did during one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Times an attribute was skipped because a `HIDE` rule fired.
    pub hidden_skips: usize,
    /// Paths dropped because `SHOW_ONLY` rules left no value.
    pub abandoned_paths: usize,
    /// Attribute id -> rules whose `SHOW_ONLY` emptied it on some path.
    pub emptied_by: BTreeMap<String, BTreeSet<String>>,
}

impl GenerationReport {
    /// Human-readable summary of the attributes and rules that emptied paths.
    pub fn describe_empty_paths(&self) -> String {
        if self.emptied_by.is_empty() {
            return "no path was abandoned".to_string();
        }
        self.emptied_by
            .iter()
            .map(|(attr, rules)| {
                let rules: Vec<&str> = rules.iter().map(String::as_str).collect();
                format!("'{attr}' emptied by rules [{}]", rules.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Generator output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    /// Valid combinations in emission order.
    pub combinations: Vec<Combination>,
    /// Pruning statistics.
    pub report: GenerationReport,
}

struct Walker<'a> {
    attributes: &'a [ExpandedAttribute],
    rules: &'a [Rule],
    assignment: Assignment,
    labels: LabelMap,
    out: Generated,
}

impl Walker<'_> {
    fn visit(&mut self, index: usize) {
        let attributes = self.attributes;
        let Some(attribute) = attributes.get(index) else {
            let sort_order = i32::try_from(self.out.combinations.len()).unwrap_or(i32::MAX);
            self.out.combinations.push(Combination {
                key: encode(&self.assignment),
                assignment: self.assignment.clone(),
                labels: self.labels.clone(),
                sort_order,
            });
            return;
        };

        let step = evaluate_step(&self.assignment, &attribute.id, &attribute.values, self.rules);

        if let Some(rule) = &step.hidden_by {
            debug!(attribute = %attribute.id, rule = %rule, "attribute hidden on this path");
            self.out.report.hidden_skips += 1;
            self.visit(index + 1);
            return;
        }

        if step.allowed.is_empty() {
            debug!(attribute = %attribute.id, rules = ?step.narrowed_by, "path abandoned");
            self.out.report.abandoned_paths += 1;
            self.out
                .report
                .emptied_by
                .entry(attribute.id.clone())
                .or_default()
                .extend(step.narrowed_by);
            return;
        }

        for value in step.allowed {
            self.assignment
                .insert(attribute.id.clone(), value.value.clone());
            self.labels.insert(
                attribute.id.clone(),
                AttributeLabel {
                    attribute: attribute.name.clone(),
                    value: value.label.clone(),
                },
            );
            self.visit(index + 1);
        }
        self.assignment.remove(&attribute.id);
        self.labels.remove(&attribute.id);
    }
}

/// Enumerate every valid combination.
///
/// `attributes` must be in display order: a rule only fires against
/// attributes positioned after its condition attribute. `rules` should already
/// be filtered to the applicable set.
pub fn generate(attributes: &[ExpandedAttribute], rules: &[Rule]) -> Generated {
    let mut walker = Walker {
        attributes,
        rules,
        assignment: Assignment::new(),
        labels: LabelMap::new(),
        out: Generated::default(),
    };
    walker.visit(0);
    walker.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::expand::ExpandedValue;
    use crate::engine::rules::{Applicability, Condition, RuleAction};

    fn attr(id: &str, values: &[&str]) -> ExpandedAttribute {
        ExpandedAttribute {
            id: id.into(),
            name: id.to_uppercase(),
            values: values
                .iter()
                .map(|v| ExpandedValue {
                    value: (*v).into(),
                    label: (*v).into(),
                    provenance: None,
                })
                .collect(),
        }
    }

    fn rule(id: &str, when: (&str, &str), actions: Vec<RuleAction>) -> Rule {
        Rule {
            id: id.into(),
            name: id.into(),
            priority: 0,
            active: true,
            applies_to: Applicability::Global,
            when: Condition {
                attribute: when.0.into(),
                value: when.1.into(),
            },
            actions,
        }
    }

    #[test]
    fn no_rules_is_cartesian_product() {
        let attrs = [attr("x", &["a", "b"]), attr("y", &["1", "2", "3"])];
        let out = generate(&attrs, &[]);
        assert_eq!(out.combinations.len(), 6);
        let orders: Vec<i32> = out.combinations.iter().map(|c| c.sort_order).collect();
        assert_eq!(orders, (0..6).collect::<Vec<_>>());
        assert_eq!(out.combinations[0].key.as_str(), "x:a|y:1");
        assert_eq!(out.combinations[5].key.as_str(), "x:b|y:3");
    }

    #[test]
    fn hide_removes_attribute_only_on_matching_paths() {
        let attrs = [attr("x", &["a", "b", "c"]), attr("y", &["p", "q"])];
        let rules = [rule("hide-y", ("x", "a"), vec![RuleAction::Hide { target: "y".into() }])];
        let out = generate(&attrs, &rules);

        let with_a: Vec<&Combination> = out
            .combinations
            .iter()
            .filter(|c| c.assignment["x"] == "a")
            .collect();
        assert_eq!(with_a.len(), 1);
        assert!(!with_a[0].assignment.contains_key("y"));
        assert!(!with_a[0].labels.contains_key("y"));

        for c in out.combinations.iter().filter(|c| c.assignment["x"] != "a") {
            assert!(c.assignment.contains_key("y"));
        }
        assert_eq!(out.combinations.len(), 5);
        assert_eq!(out.report.hidden_skips, 1);
    }

    #[test]
    fn disjoint_show_only_prunes_whole_subtree() {
        let attrs = [
            attr("x", &["a", "b"]),
            attr("y", &["p", "q", "r", "s"]),
            attr("z", &["1", "2", "3"]),
        ];
        let rules = [
            rule(
                "r1",
                ("x", "a"),
                vec![RuleAction::ShowOnly {
                    target: "y".into(),
                    allowed_values: vec!["p".into()],
                }],
            ),
            rule(
                "r2",
                ("x", "a"),
                vec![RuleAction::ShowOnly {
                    target: "y".into(),
                    allowed_values: vec!["s".into()],
                }],
            ),
        ];
        let out = generate(&attrs, &rules);
        assert!(out.combinations.iter().all(|c| c.assignment["x"] == "b"));
        assert_eq!(out.combinations.len(), 12);
        assert_eq!(out.report.abandoned_paths, 1);
        assert_eq!(
            out.report.emptied_by["y"],
            BTreeSet::from(["r1".to_string(), "r2".to_string()])
        );
        assert!(out.report.describe_empty_paths().contains("'y' emptied by rules [r1, r2]"));
    }

    #[test]
    fn intersecting_show_only_restricts_target() {
        let attrs = [attr("x", &["a"]), attr("y", &["p", "q", "r", "s"])];
        let show = |id: &str, vs: &[&str]| {
            rule(
                id,
                ("x", "a"),
                vec![RuleAction::ShowOnly {
                    target: "y".into(),
                    allowed_values: vs.iter().map(|s| s.to_string()).collect(),
                }],
            )
        };
        let rules = [show("r1", &["p", "q", "r"]), show("r2", &["q", "r", "s"])];
        let out = generate(&attrs, &rules);
        let ys: Vec<&str> = out
            .combinations
            .iter()
            .map(|c| c.assignment["y"].as_str())
            .collect();
        assert_eq!(ys, vec!["q", "r"]);
    }

    #[test]
    fn rule_positioned_after_its_target_never_fires() {
        // y comes first, so "when x=a hide y" cannot see x yet.
        let attrs = [attr("y", &["p", "q"]), attr("x", &["a", "b"])];
        let rules = [rule("late", ("x", "a"), vec![RuleAction::Hide { target: "y".into() }])];
        let out = generate(&attrs, &rules);
        assert_eq!(out.combinations.len(), 4);
        assert!(out.combinations.iter().all(|c| c.assignment.contains_key("y")));
    }

    #[test]
    fn keys_round_trip_through_assignment() {
        let attrs = [attr("b", &["1", "2"]), attr("a", &["x"])];
        for c in generate(&attrs, &[]).combinations {
            assert_eq!(encode(&c.assignment), c.key);
            assert_eq!(c.key.decode(), c.assignment);
        }
    }

    #[test]
    fn no_attributes_yields_one_empty_combination() {
        let out = generate(&[], &[]);
        assert_eq!(out.combinations.len(), 1);
        assert!(out.combinations[0].assignment.is_empty());
    }
}
