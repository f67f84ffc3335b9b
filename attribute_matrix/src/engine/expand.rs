//! Sub-attribute expansion.
//!
//! A base value with live, enabled sub-attributes is replaced by one composite
//! value per sub-attribute (`parent§sub`); any other value passes through.
//! An attribute with N values, M of which carry S sub-attributes each, expands
//! to `(N - M) + M * S` effective values.

use std::collections::HashMap;

use crate::attribute::{AttributeDefinition, SubAttributeDefinition};

/// Separator between the parent and sub component of a composite value.
pub const COMPOSITE_SEPARATOR: char = '§';

/// Separator between parent and sub labels in a composite label.
const LABEL_SEPARATOR: &str = " - ";

/// Which parent/sub pair a composite value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Base value of the parent attribute.
    pub parent_value: String,
    /// Sub-attribute value.
    pub sub_value: String,
}

/// One effective value of an attribute after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedValue {
    /// Full value as stored in assignments (composite when `provenance` is set).
    pub value: String,
    /// Display label.
    pub label: String,
    /// Set for composite values.
    pub provenance: Option<Provenance>,
}

impl ExpandedValue {
    /// Component before the composite separator (the whole value otherwise).
    pub fn base(&self) -> &str {
        base_value(&self.value)
    }
}

/// An attribute with its effective values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedAttribute {
    /// Attribute id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Effective values in display order.
    pub values: Vec<ExpandedValue>,
}

/// Enabled sub-attributes grouped by `(attribute_id, parent_value)`.
///
/// Built from one batched query per attribute rather than one per value.
#[derive(Debug, Default, Clone)]
pub struct SubAttributeIndex {
    by_parent: HashMap<(String, String), Vec<SubAttributeDefinition>>,
}

impl SubAttributeIndex {
    /// Group sub-attributes by parent. Disabled ones are dropped; input order
    /// is kept within each parent.
    pub fn new(subs: impl IntoIterator<Item = SubAttributeDefinition>) -> Self {
        let mut by_parent: HashMap<(String, String), Vec<SubAttributeDefinition>> =
            HashMap::new();
        for sub in subs.into_iter().filter(|s| s.enabled) {
            by_parent
                .entry((sub.parent_attribute_id.clone(), sub.parent_value.clone()))
                .or_default()
                .push(sub);
        }
        Self { by_parent }
    }

    /// Live sub-attributes under one parent value.
    pub fn lookup(&self, attribute_id: &str, parent_value: &str) -> &[SubAttributeDefinition] {
        self.by_parent
            .get(&(attribute_id.to_string(), parent_value.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of parent values with at least one live sub-attribute.
    pub fn parent_count(&self) -> usize {
        self.by_parent.len()
    }
}

/// Expand one attribute's base values.
///
/// The advisory `has_sub_attributes` flag is ignored: a value flagged `true`
/// with no live sub-attributes passes through, and a value flagged `false`
/// with live ones is expanded.
pub fn expand(attribute: &AttributeDefinition, subs: &SubAttributeIndex) -> ExpandedAttribute {
    let mut values = Vec::with_capacity(attribute.values.len());
    for base in &attribute.values {
        let live = subs.lookup(&attribute.id, &base.value);
        if live.is_empty() {
            values.push(ExpandedValue {
                value: base.value.clone(),
                label: base.label.clone(),
                provenance: None,
            });
            continue;
        }
        for sub in live {
            values.push(ExpandedValue {
                value: composite_value(&base.value, &sub.value),
                label: format!("{}{LABEL_SEPARATOR}{}", base.label, sub.label),
                provenance: Some(Provenance {
                    parent_value: base.value.clone(),
                    sub_value: sub.value.clone(),
                }),
            });
        }
    }
    ExpandedAttribute {
        id: attribute.id.clone(),
        name: attribute.name.clone(),
        values,
    }
}

/// Pass values through unchanged (sub-attributes disabled for this run).
pub fn passthrough(attribute: &AttributeDefinition) -> ExpandedAttribute {
    expand(attribute, &SubAttributeIndex::default())
}

/// Build `parent§sub`.
pub fn composite_value(parent: &str, sub: &str) -> String {
    format!("{parent}{COMPOSITE_SEPARATOR}{sub}")
}

/// Component before the composite separator.
pub fn base_value(value: &str) -> &str {
    value
        .split_once(COMPOSITE_SEPARATOR)
        .map_or(value, |(base, _)| base)
}

/// Full-or-base match used by rule conditions and `SHOW_ONLY` lists.
pub fn value_matches(actual: &str, expected: &str) -> bool {
    actual == expected || base_value(actual) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeValue, InputType};
    use crate::key::{Assignment, encode};

    fn attr(id: &str, values: &[(&str, bool)]) -> AttributeDefinition {
        AttributeDefinition {
            id: id.into(),
            name: id.to_uppercase(),
            input_type: InputType::Dropdown,
            values: values
                .iter()
                .map(|(v, flag)| AttributeValue {
                    value: (*v).into(),
                    label: (*v).into(),
                    has_sub_attributes: *flag,
                })
                .collect(),
        }
    }

    fn sub(
        id: i32,
        attr: &str,
        parent: &str,
        value: &str,
        enabled: bool,
    ) -> SubAttributeDefinition {
        SubAttributeDefinition {
            id,
            parent_attribute_id: attr.into(),
            parent_value: parent.into(),
            value: value.into(),
            label: value.into(),
            enabled,
        }
    }

    #[test]
    fn one_plain_and_one_nested_value_expand_to_three() {
        let a = attr("uv", &[("v1", false), ("v2", true)]);
        let idx = SubAttributeIndex::new([
            sub(1, "uv", "v2", "s1", true),
            sub(2, "uv", "v2", "s2", true),
        ]);

        let out = expand(&a, &idx);
        let values: Vec<&str> = out.values.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(values, vec!["v1", "v2§s1", "v2§s2"]);
        assert_eq!(out.values[1].label, "v2 - s1");
        assert_eq!(
            out.values[2].provenance,
            Some(Provenance {
                parent_value: "v2".into(),
                sub_value: "s2".into()
            })
        );

        let keys: std::collections::BTreeSet<String> = out
            .values
            .iter()
            .map(|v| {
                let mut a = Assignment::new();
                a.insert("uv".into(), v.value.clone());
                encode(&a).to_string()
            })
            .collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn advisory_flag_is_not_trusted() {
        // Flag says "has subs" but none are live; flag says "none" but one is.
        let a = attr("uv", &[("flagged", true), ("unflagged", false)]);
        let idx = SubAttributeIndex::new([sub(1, "uv", "unflagged", "x", true)]);

        let out = expand(&a, &idx);
        let values: Vec<&str> = out.values.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(values, vec!["flagged", "unflagged§x"]);
    }

    #[test]
    fn disabled_sub_attributes_are_ignored() {
        let a = attr("uv", &[("v", true)]);
        let idx = SubAttributeIndex::new([sub(1, "uv", "v", "off", false)]);
        assert_eq!(idx.parent_count(), 0);
        assert_eq!(expand(&a, &idx).values[0].value, "v");
    }

    #[test]
    fn expansion_count_formula() {
        // N = 4, M = 2, S = 3 -> (4 - 2) + 2 * 3 = 8
        let a = attr("x", &[("a", false), ("b", false), ("c", false), ("d", false)]);
        let subs = ["c", "d"].into_iter().flat_map(|p| {
            (0..3).map(move |i| sub(i, "x", p, &format!("s{i}"), true))
        });
        let out = expand(&a, &SubAttributeIndex::new(subs));
        assert_eq!(out.values.len(), 8);
    }

    #[test]
    fn base_and_matching() {
        assert_eq!(base_value("Spot UV§Logo"), "Spot UV");
        assert_eq!(base_value("None"), "None");
        assert!(value_matches("Spot UV§Logo", "Spot UV"));
        assert!(value_matches("Spot UV§Logo", "Spot UV§Logo"));
        assert!(!value_matches("Spot UV§Logo", "Logo"));
        assert!(!value_matches("Spot UV", "Spot UV§Logo"));
    }
}
