//! Rule model and per-step evaluation.
//!
//! Rules are flat tagged data: one `When` condition and an ordered list of
//! actions. Evaluation only ever looks at the assignment committed so far, so a
//! rule whose condition attribute is positioned after its target never fires.
//! No cycle detection is attempted; the fixed attribute order is what makes
//! evaluation well defined.

use anyhow::bail;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::debug;

use crate::engine::expand::{ExpandedValue, value_matches};
use crate::key::Assignment;

/// Where a rule applies. The variants are mutually exclusive.
///
/// TOML: `applies_to = "global"`, `applies_to = { category = "cards" }` or
/// `applies_to = { product = "card-85x55" }`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applicability {
    /// Every product.
    #[default]
    Global,
    /// Products in one category.
    Category(String),
    /// One product.
    Product(String),
}

impl Applicability {
    /// Scope code stored in `rule.scope`.
    pub fn scope_code(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Category(_) => "category",
            Self::Product(_) => "product",
        }
    }

    /// Scope reference stored in `rule.scope_ref`.
    pub fn scope_ref(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Category(c) => Some(c.as_str()),
            Self::Product(p) => Some(p.as_str()),
        }
    }

    /// Rebuild from the two stored columns.
    pub fn from_parts(scope: &str, scope_ref: Option<&str>) -> anyhow::Result<Self> {
        Ok(match (scope, scope_ref) {
            ("global", None) => Self::Global,
            ("category", Some(c)) => Self::Category(c.to_string()),
            ("product", Some(p)) => Self::Product(p.to_string()),
            (s, r) => bail!("invalid rule scope '{s}' with reference {r:?}"),
        })
    }

    /// True if a rule with this scope applies to the product.
    pub fn applies_to(&self, product_id: &str, category_id: Option<&str>) -> bool {
        match self {
            Self::Global => true,
            Self::Category(c) => category_id == Some(c.as_str()),
            Self::Product(p) => p == product_id,
        }
    }
}

/// `When{attribute, value}`. `value` matches a full stored value or the base
/// component of a composite one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    /// Attribute whose committed value is tested.
    pub attribute: String,
    /// Expected value.
    pub value: String,
}

/// One `Then` action.
///
/// Unknown `type` tags deserialize to [`RuleAction::Unrecognized`] so that a
/// malformed or future action never blocks generation. The raw object is
/// kept and serialized back verbatim, so a sync round trip loses nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleAction {
    /// Skip the target attribute entirely.
    Hide {
        /// Target attribute id.
        target: String,
    },
    /// Restrict the target attribute to these values (full or base match).
    ShowOnly {
        /// Target attribute id.
        target: String,
        /// Allowed values.
        allowed_values: Vec<String>,
    },
    /// Preselect a value in the UI. No effect on generation.
    SetDefault {
        /// Target attribute id.
        target: String,
        /// Default value.
        default_value: String,
    },
    /// Handled by the pricing engine. Opaque here.
    TriggerPricing {
        /// Pricing engine payload.
        params: serde_json::Value,
    },
    /// Any other tag, as written.
    Unrecognized(serde_json::Value),
}

/// Wire form of the actions this crate understands.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownAction {
    Hide {
        target: String,
    },
    ShowOnly {
        target: String,
        allowed_values: Vec<String>,
    },
    SetDefault {
        target: String,
        default_value: String,
    },
    TriggerPricing {
        #[serde(default)]
        params: serde_json::Value,
    },
}

const KNOWN_TAGS: [&str; 4] = ["hide", "show_only", "set_default", "trigger_pricing"];

impl From<KnownAction> for RuleAction {
    fn from(a: KnownAction) -> Self {
        match a {
            KnownAction::Hide { target } => Self::Hide { target },
            KnownAction::ShowOnly {
                target,
                allowed_values,
            } => Self::ShowOnly {
                target,
                allowed_values,
            },
            KnownAction::SetDefault {
                target,
                default_value,
            } => Self::SetDefault {
                target,
                default_value,
            },
            KnownAction::TriggerPricing { params } => Self::TriggerPricing { params },
        }
    }
}

impl Serialize for RuleAction {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let known = match self {
            Self::Unrecognized(raw) => return raw.serialize(s),
            Self::Hide { target } => KnownAction::Hide {
                target: target.clone(),
            },
            Self::ShowOnly {
                target,
                allowed_values,
            } => KnownAction::ShowOnly {
                target: target.clone(),
                allowed_values: allowed_values.clone(),
            },
            Self::SetDefault {
                target,
                default_value,
            } => KnownAction::SetDefault {
                target: target.clone(),
                default_value: default_value.clone(),
            },
            Self::TriggerPricing { params } => KnownAction::TriggerPricing {
                params: params.clone(),
            },
        };
        known.serialize(s)
    }
}

impl<'de> Deserialize<'de> for RuleAction {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(d)?;
        let tag = raw.get("type").and_then(serde_json::Value::as_str);
        if tag.is_some_and(|t| KNOWN_TAGS.contains(&t)) {
            KnownAction::deserialize(raw)
                .map(Self::from)
                .map_err(de::Error::custom)
        } else {
            Ok(Self::Unrecognized(raw))
        }
    }
}

impl RuleAction {
    /// Attribute this action targets, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Hide { target }
            | Self::ShowOnly { target, .. }
            | Self::SetDefault { target, .. } => Some(target.as_str()),
            Self::TriggerPricing { .. } | Self::Unrecognized(_) => None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A When/Then rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Rule id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Higher wins on tie-break.
    #[serde(default)]
    pub priority: i32,
    /// Inactive rules never apply.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Scope.
    #[serde(default)]
    pub applies_to: Applicability,
    /// Condition.
    pub when: Condition,
    /// Actions in author order.
    pub actions: Vec<RuleAction>,
}

impl Rule {
    /// True if the condition holds for the committed assignment.
    pub fn condition_holds(&self, committed: &Assignment) -> bool {
        committed
            .get(&self.when.attribute)
            .is_some_and(|actual| value_matches(actual, &self.when.value))
    }
}

/// Active rules for a product, ordered by priority descending.
///
/// `rules` must be in insertion order; the sort is stable, so ties keep it.
pub fn applicable_rules(rules: &[Rule], product_id: &str, category_id: Option<&str>) -> Vec<Rule> {
    let mut out: Vec<Rule> = rules
        .iter()
        .filter(|r| r.active && r.applies_to.applies_to(product_id, category_id))
        .cloned()
        .collect();
    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

/// Result of evaluating one attribute against the committed assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome<'v> {
    /// Rule that hid the attribute, if any.
    pub hidden_by: Option<String>,
    /// Surviving candidates, in candidate order. Empty when hidden.
    pub allowed: Vec<&'v ExpandedValue>,
    /// Rules whose `SHOW_ONLY` narrowed the candidates.
    pub narrowed_by: Vec<String>,
}

impl StepOutcome<'_> {
    /// The attribute contributes nothing on this path.
    pub fn is_hidden(&self) -> bool {
        self.hidden_by.is_some()
    }

    /// Not hidden, and no candidate survived narrowing.
    pub fn is_unsatisfiable(&self) -> bool {
        !self.is_hidden() && self.allowed.is_empty()
    }
}

/// Evaluate `attribute_id` with `candidates` against `committed`.
///
/// - `HIDE` marks the attribute hidden and stops any further narrowing.
/// - `SHOW_ONLY` intersects the running allowed set; several of them compose
///   by intersection and may empty it.
/// - Other actions, including unrecognized ones, are ignored.
pub fn evaluate_step<'v>(
    committed: &Assignment,
    attribute_id: &str,
    candidates: &'v [ExpandedValue],
    rules: &[Rule],
) -> StepOutcome<'v> {
    let mut allowed: Vec<&ExpandedValue> = candidates.iter().collect();
    let mut narrowed_by = Vec::new();

    for rule in rules.iter().filter(|r| r.condition_holds(committed)) {
        for action in &rule.actions {
            match action {
                RuleAction::Hide { target } if target == attribute_id => {
                    return StepOutcome {
                        hidden_by: Some(rule.id.clone()),
                        allowed: Vec::new(),
                        narrowed_by,
                    };
                }
                RuleAction::ShowOnly {
                    target,
                    allowed_values,
                } if target == attribute_id => {
                    allowed.retain(|v| allowed_values.iter().any(|a| value_matches(&v.value, a)));
                    narrowed_by.push(rule.id.clone());
                }
                RuleAction::Unrecognized(_) => {
                    debug!(rule = %rule.id, "ignoring unrecognized rule action");
                }
                _ => {}
            }
        }
    }

    StepOutcome {
        hidden_by: None,
        allowed,
        narrowed_by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(vs: &[&str]) -> Vec<ExpandedValue> {
        vs.iter()
            .map(|v| ExpandedValue {
                value: (*v).into(),
                label: (*v).into(),
                provenance: None,
            })
            .collect()
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

    fn show_only(target: &str, allowed: &[&str]) -> RuleAction {
        RuleAction::ShowOnly {
            target: target.into(),
            allowed_values: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn committed(pairs: &[(&str, &str)]) -> Assignment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn allowed_values<'a>(o: &'a StepOutcome<'_>) -> Vec<&'a str> {
        o.allowed.iter().map(|v| v.value.as_str()).collect()
    }

    #[test]
    fn show_only_rules_intersect() {
        let cands = values(&["p", "q", "r", "s", "t"]);
        let rules = vec![
            rule("r1", ("x", "a"), vec![show_only("y", &["p", "q", "r"])]),
            rule("r2", ("x", "a"), vec![show_only("y", &["q", "r", "s"])]),
        ];
        let out = evaluate_step(&committed(&[("x", "a")]), "y", &cands, &rules);
        assert_eq!(allowed_values(&out), vec!["q", "r"]);
        assert_eq!(out.narrowed_by, vec!["r1", "r2"]);
    }

    #[test]
    fn disjoint_show_only_is_unsatisfiable() {
        let cands = values(&["p", "q", "s"]);
        let rules = vec![
            rule("r1", ("x", "a"), vec![show_only("y", &["p"])]),
            rule("r2", ("x", "a"), vec![show_only("y", &["s"])]),
        ];
        let out = evaluate_step(&committed(&[("x", "a")]), "y", &cands, &rules);
        assert!(out.is_unsatisfiable());
    }

    #[test]
    fn hide_short_circuits_narrowing() {
        let cands = values(&["p", "q"]);
        let rules = vec![
            rule("narrow", ("x", "a"), vec![show_only("y", &["p"])]),
            rule("hide", ("x", "a"), vec![RuleAction::Hide { target: "y".into() }]),
        ];
        let out = evaluate_step(&committed(&[("x", "a")]), "y", &cands, &rules);
        assert!(out.is_hidden());
        assert!(!out.is_unsatisfiable());
        assert_eq!(out.hidden_by.as_deref(), Some("hide"));
    }

    #[test]
    fn condition_matches_base_component() {
        let cands = values(&["glossy", "matte"]);
        let rules = vec![rule("r", ("uv", "Spot UV"), vec![show_only("lam", &["matte"])])];
        let out = evaluate_step(&committed(&[("uv", "Spot UV§Logo")]), "lam", &cands, &rules);
        assert_eq!(allowed_values(&out), vec!["matte"]);
    }

    #[test]
    fn show_only_matches_base_of_composite_candidates() {
        let cands = values(&["None", "Spot UV§Logo", "Spot UV§Full"]);
        let rules = vec![rule("r", ("x", "a"), vec![show_only("uv", &["Spot UV"])])];
        let out = evaluate_step(&committed(&[("x", "a")]), "uv", &cands, &rules);
        assert_eq!(allowed_values(&out), vec!["Spot UV§Logo", "Spot UV§Full"]);
    }

    #[test]
    fn uncommitted_condition_never_fires() {
        let cands = values(&["p"]);
        let rules = vec![rule("r", ("later", "a"), vec![RuleAction::Hide { target: "y".into() }])];
        let out = evaluate_step(&committed(&[]), "y", &cands, &rules);
        assert!(!out.is_hidden());
        assert_eq!(allowed_values(&out), vec!["p"]);
    }

    #[test]
    fn unrecognized_and_non_generation_actions_are_ignored() {
        let cands = values(&["p", "q"]);
        let rules = vec![rule(
            "r",
            ("x", "a"),
            vec![
                RuleAction::Unrecognized(serde_json::json!({ "type": "teleport" })),
                RuleAction::SetDefault {
                    target: "y".into(),
                    default_value: "q".into(),
                },
                RuleAction::TriggerPricing {
                    params: serde_json::Value::Null,
                },
            ],
        )];
        let out = evaluate_step(&committed(&[("x", "a")]), "y", &cands, &rules);
        assert_eq!(allowed_values(&out), vec!["p", "q"]);
    }

    #[test]
    fn unknown_action_tag_deserializes() {
        let actions: Vec<RuleAction> = serde_json::from_str(
            r#"[{"type":"hide","target":"uv"},{"type":"teleport","target":"uv","speed":3}]"#,
        )
        .unwrap();
        let unknown = serde_json::json!({ "type": "teleport", "target": "uv", "speed": 3 });
        assert_eq!(
            actions,
            vec![
                RuleAction::Hide { target: "uv".into() },
                RuleAction::Unrecognized(unknown.clone())
            ]
        );

        // Written back as it came in.
        let back: serde_json::Value = serde_json::to_value(&actions).unwrap();
        assert_eq!(
            back,
            serde_json::json!([{ "type": "hide", "target": "uv" }, unknown])
        );
    }

    #[test]
    fn known_tag_with_bad_fields_is_an_error() {
        let err = serde_json::from_str::<Vec<RuleAction>>(r#"[{"type":"hide"}]"#).unwrap_err();
        assert!(err.to_string().contains("target"), "{err}");
    }

    #[test]
    fn applicable_rules_filters_and_orders() {
        let mut low = rule("low", ("x", "a"), vec![]);
        low.priority = 1;
        let mut high = rule("high", ("x", "a"), vec![]);
        high.priority = 5;
        let mut tie = rule("tie", ("x", "a"), vec![]);
        tie.priority = 5;
        tie.applies_to = Applicability::Category("cards".into());
        let mut other_product = rule("other", ("x", "a"), vec![]);
        other_product.applies_to = Applicability::Product("flyer".into());
        let mut inactive = rule("inactive", ("x", "a"), vec![]);
        inactive.active = false;

        let all = vec![low, high, tie, other_product, inactive];
        let ids: Vec<String> = applicable_rules(&all, "card", Some("cards"))
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["high", "tie", "low"]);

        let ids: Vec<String> = applicable_rules(&all, "flyer", None)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["high", "low", "other"]);
    }

    #[test]
    fn applicability_round_trips_through_columns() {
        for a in [
            Applicability::Global,
            Applicability::Category("cards".into()),
            Applicability::Product("card".into()),
        ] {
            let back = Applicability::from_parts(a.scope_code(), a.scope_ref()).unwrap();
            assert_eq!(back, a);
        }
        assert!(Applicability::from_parts("global", Some("x")).is_err());
    }
}
