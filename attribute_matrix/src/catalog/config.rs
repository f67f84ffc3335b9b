//! Catalog configuration: parsing, normalization, and loading.
//!
//! This module defines a TOML-backed catalog that describes:
//! - Attributes (lowercase ids, display names, input types, ordered values)
//! - Sub-attributes nested under one parent value of an attribute
//! - Products (optional category, ordered attribute list = display order)
//! - Rules (`When` condition, ordered actions, scope, priority)
//!
//! Key behaviors:
//! - Normalization lowercases and trims attribute and product ids, trims values
//!   and labels, and de-duplicates while preserving first-occurrence order.
//! - Ids and values are checked against the key codec's reserved characters.
//! - Sub-attributes whose parent value is not declared can be dropped or
//!   treated as an error via [`UnknownParentValuePolicy`].
//! - Rules and products that reference unknown attributes (or rules that
//!   reference unknown products) fail with
//!   [`MatrixError::NotFound`](crate::error::MatrixError::NotFound) before
//!   anything is persisted.
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_catalog_str`]
//! - Parse + normalize from a file path: [`load_catalog_path`]
//! - Normalization with explicit policy: [`normalize_catalog_with_policy`]
//!
//! Example TOML:
//! ```toml
//! [attributes.paper]
//! name = "Paper"
//! values = [{ value = "300" }, { value = "350" }]
//!
//! [attributes.uv]
//! name = "UV"
//! input_type = "radio"
//! values = [{ value = "None" }, { value = "Spot UV", has_sub_attributes = true }]
//! sub_attributes = [
//!   { parent_value = "Spot UV", value = "Logo" },
//!   { parent_value = "Spot UV", value = "Full" },
//! ]
//!
//! [products.card]
//! name = "Business card"
//! category = "cards"
//! attributes = ["paper", "uv"]
//!
//! [[rules]]
//! id = "no-uv-on-300"
//! name = "300gsm cannot take UV"
//! when = { attribute = "paper", value = "300" }
//! actions = [{ type = "hide", target = "uv" }]
//! ```

use std::{collections::HashSet, mem};

use anyhow::{Context, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::attribute::InputType;
use crate::engine::expand::{COMPOSITE_SEPARATOR, base_value, composite_value};
use crate::engine::rules::{Applicability, Rule};
use crate::error::{MatrixError, RecordKind};
use crate::key::{is_valid_attribute_id, is_valid_value};

/// Top-level catalog.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Attribute id -> definition. Ids are normalized lowercase.
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeCfg>,
    /// Product id -> definition. Ids are normalized lowercase.
    #[serde(default)]
    pub products: IndexMap<String, ProductCfg>,
    /// Rules in author order; the position breaks priority ties.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// One attribute definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeCfg {
    /// Display name.
    pub name: String,
    /// Presentation; only selection-style inputs are used for generation.
    #[serde(default)]
    pub input_type: InputType,
    /// Values in display order; de-duplicated by `value`.
    pub values: Vec<ValueCfg>,
    /// Nested choices under individual values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_attributes: Vec<SubAttributeCfg>,
}

/// One attribute value.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ValueCfg {
    /// Stored value.
    pub value: String,
    /// Display label; defaults to `value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Advisory UI hint.
    #[serde(default)]
    pub has_sub_attributes: bool,
}

fn default_enabled() -> bool {
    true
}

/// A sub-attribute under `parent_value`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubAttributeCfg {
    /// Parent value; must be declared in the attribute's `values`.
    pub parent_value: String,
    /// Sub value.
    pub value: String,
    /// Display label; defaults to `value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Disabled sub-attributes are synced but never expanded.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// One product.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProductCfg {
    /// Display name.
    pub name: String,
    /// Category for category-scoped rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Attribute ids in display order.
    pub attributes: Vec<String>,
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default)]
pub struct NormalizationReport {
    /// Attribute or product ids changed by lowercasing/trimming.
    pub ids_renamed: usize,
    /// Duplicate attribute values removed.
    pub values_deduped: usize,
    /// Duplicate `(parent_value, value)` sub-attributes removed.
    pub sub_attributes_deduped: usize,
    /// Sub-attributes dropped for an undeclared parent value (Drop policy).
    pub sub_attributes_unknown_parent_dropped: usize,
    /// Duplicate attribute references removed from products.
    pub product_attributes_deduped: usize,
    /// Rule conditions naming a value the attribute does not declare.
    pub rule_conditions_unmatched: usize,
}

/// Policy for sub-attributes whose parent value is not declared.
#[derive(Copy, Clone, Debug)]
pub enum UnknownParentValuePolicy {
    /// Drop the sub-attribute.
    Drop,
    /// Treat as an error.
    Error,
}

fn normalize_id(raw: &str, what: &str) -> anyhow::Result<String> {
    let id = raw.trim().to_lowercase();
    if id.is_empty() {
        bail!("{what} id cannot be empty after trimming");
    }
    if !is_valid_attribute_id(&id) {
        bail!("{what} id '{id}' contains a reserved character (':', '|' or '§')");
    }
    Ok(id)
}

fn normalize_value(raw: &str, what: &str) -> anyhow::Result<String> {
    let v = raw.trim().to_string();
    if v.is_empty() {
        bail!("{what} cannot be empty after trimming");
    }
    if !is_valid_value(&v) {
        bail!("{what} '{v}' contains a reserved character ('|' or '§')");
    }
    Ok(v)
}

fn normalize_label(label: Option<String>, fallback: &str) -> Option<String> {
    Some(
        label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| fallback.to_string()),
    )
}

/// Normalize a catalog in-place with an explicit policy for sub-attributes
/// under undeclared parent values.
///
/// What normalization does:
/// - Lowercase + trim attribute and product ids; reject duplicates after normalization
/// - Trim values; de-duplicate by value preserving the first occurrence; fill empty labels
/// - For sub-attributes: trim; enforce the parent value is declared (`Drop` vs `Error`);
///   de-duplicate by `(parent_value, value)`
/// - For products: lowercase attribute references, de-duplicate them, and require
///   every referenced attribute to exist
/// - For rules: trim ids (unique), lowercase attribute references, and require the
///   condition attribute, every action target, and product scopes to exist
///
/// Errors:
/// - Empty or duplicate ids after normalization, reserved characters
/// - Unknown parent values when policy is [`UnknownParentValuePolicy::Error`]
/// - [`MatrixError::NotFound`] for dangling attribute or product references
pub fn normalize_catalog_with_policy(
    cat: &mut Catalog,
    policy: UnknownParentValuePolicy,
) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    // --- attributes
    let mut attributes: IndexMap<String, AttributeCfg> = IndexMap::new();
    for (raw_id, mut cfg) in mem::take(&mut cat.attributes) {
        let id = normalize_id(&raw_id, "attribute")?;
        if id != raw_id {
            report.ids_renamed += 1;
        }
        if attributes.contains_key(&id) {
            bail!("duplicate attribute id after normalization: {id}");
        }
        cfg.name = cfg.name.trim().to_string();

        let before = cfg.values.len();
        let mut seen = HashSet::new();
        let mut values = Vec::with_capacity(before);
        for mut v in mem::take(&mut cfg.values) {
            v.value = normalize_value(&v.value, &format!("value of attribute '{id}'"))?;
            v.label = normalize_label(v.label, &v.value);
            if seen.insert(v.value.clone()) {
                values.push(v);
            }
        }
        report.values_deduped += before.saturating_sub(values.len());

        let declared: HashSet<&str> = values.iter().map(|v| v.value.as_str()).collect();
        let before = cfg.sub_attributes.len();
        let mut seen_pair = HashSet::new();
        let mut subs = Vec::with_capacity(before);
        for mut s in mem::take(&mut cfg.sub_attributes) {
            s.parent_value = s.parent_value.trim().to_string();
            s.value = normalize_value(&s.value, &format!("sub-attribute of '{id}'"))?;
            s.label = normalize_label(s.label, &s.value);

            if !declared.contains(s.parent_value.as_str()) {
                match policy {
                    UnknownParentValuePolicy::Drop => {
                        report.sub_attributes_unknown_parent_dropped += 1;
                        continue;
                    }
                    UnknownParentValuePolicy::Error => {
                        bail!(
                            "sub-attribute '{}' of '{id}' names undeclared parent value '{}'",
                            s.value,
                            s.parent_value
                        );
                    }
                }
            }
            if seen_pair.insert((s.parent_value.clone(), s.value.clone())) {
                subs.push(s);
            } else {
                report.sub_attributes_deduped += 1;
            }
        }

        cfg.values = values;
        cfg.sub_attributes = subs;
        attributes.insert(id, cfg);
    }
    cat.attributes = attributes;

    // --- products
    let mut products: IndexMap<String, ProductCfg> = IndexMap::new();
    for (raw_id, mut cfg) in mem::take(&mut cat.products) {
        let id = normalize_id(&raw_id, "product")?;
        if id != raw_id {
            report.ids_renamed += 1;
        }
        if products.contains_key(&id) {
            bail!("duplicate product id after normalization: {id}");
        }
        cfg.name = cfg.name.trim().to_string();
        cfg.category = cfg
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let before = cfg.attributes.len();
        let mut seen = HashSet::new();
        let mut refs = Vec::with_capacity(before);
        for a in mem::take(&mut cfg.attributes) {
            let a = a.trim().to_lowercase();
            if !cat.attributes.contains_key(&a) {
                return Err(MatrixError::dangling(
                    RecordKind::Attribute,
                    a,
                    format!("product '{id}'"),
                )
                .into());
            }
            if seen.insert(a.clone()) {
                refs.push(a);
            }
        }
        report.product_attributes_deduped += before.saturating_sub(refs.len());
        cfg.attributes = refs;
        products.insert(id, cfg);
    }
    cat.products = products;

    // --- rules
    let mut seen_rules = HashSet::new();
    for rule in &mut cat.rules {
        rule.id = rule.id.trim().to_string();
        if rule.id.is_empty() {
            bail!("rule id cannot be empty after trimming");
        }
        if !seen_rules.insert(rule.id.clone()) {
            bail!("duplicate rule id: {}", rule.id);
        }
        rule.name = rule.name.trim().to_string();
        normalize_rule_refs(cat.attributes.keys(), rule)?;

        match &mut rule.applies_to {
            Applicability::Global => {}
            Applicability::Category(c) => {
                *c = c.trim().to_string();
                if c.is_empty() {
                    bail!("rule '{}' has an empty category scope", rule.id);
                }
            }
            Applicability::Product(p) => {
                *p = p.trim().to_lowercase();
                if !cat.products.contains_key(p.as_str()) {
                    return Err(MatrixError::dangling(
                        RecordKind::Product,
                        p.clone(),
                        format!("rule '{}' scope", rule.id),
                    )
                    .into());
                }
            }
        }

        let cond = &rule.when;
        if let Some(attr) = cat.attributes.get(&cond.attribute) {
            let base = base_value(&cond.value);
            if !attr.values.iter().any(|v| v.value == base) {
                report.rule_conditions_unmatched += 1;
                warn!(
                    rule = %rule.id,
                    attribute = %cond.attribute,
                    value = %cond.value,
                    "rule condition names a value the attribute does not declare"
                );
            }
        }
    }

    debug!(?report, "catalog normalized");
    Ok(report)
}

fn normalize_rule_refs<'a>(
    known: impl Iterator<Item = &'a String> + Clone,
    rule: &mut Rule,
) -> anyhow::Result<()> {
    let exists = |id: &str| known.clone().any(|k| k == id);

    rule.when.attribute = rule.when.attribute.trim().to_lowercase();
    rule.when.value = rule.when.value.trim().to_string();
    if !exists(&rule.when.attribute) {
        return Err(MatrixError::dangling(
            RecordKind::Attribute,
            rule.when.attribute.clone(),
            format!("rule '{}' condition", rule.id),
        )
        .into());
    }

    for action in &mut rule.actions {
        use crate::engine::rules::RuleAction::*;
        let target = match action {
            Hide { target } | ShowOnly { target, .. } | SetDefault { target, .. } => target,
            TriggerPricing { .. } | Unrecognized(_) => continue,
        };
        *target = target.trim().to_lowercase();
        if !exists(target) {
            return Err(MatrixError::dangling(
                RecordKind::Attribute,
                target.clone(),
                format!("rule '{}' action target", rule.id),
            )
            .into());
        }

        match action {
            ShowOnly { allowed_values, .. } => {
                let mut seen = HashSet::new();
                let mut out = Vec::with_capacity(allowed_values.len());
                for v in mem::take(allowed_values) {
                    let v = normalize_match_value(&v, &rule.id)?;
                    if seen.insert(v.clone()) {
                        out.push(v);
                    }
                }
                *allowed_values = out;
            }
            SetDefault { default_value, .. } => {
                *default_value = normalize_match_value(default_value, &rule.id)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// A value a rule compares against: a base value or `parent§sub`.
fn normalize_match_value(raw: &str, rule_id: &str) -> anyhow::Result<String> {
    let v = raw.trim();
    let what = format!("value in rule '{rule_id}'");
    match v.split_once(COMPOSITE_SEPARATOR) {
        Some((base, sub)) => Ok(composite_value(
            &normalize_value(base, &what)?,
            &normalize_value(sub, &what)?,
        )),
        None => normalize_value(v, &what),
    }
}

/// This calls [`normalize_catalog_with_policy`] using [`UnknownParentValuePolicy::Drop`].
pub fn normalize_catalog(cat: &mut Catalog) -> anyhow::Result<NormalizationReport> {
    normalize_catalog_with_policy(cat, UnknownParentValuePolicy::Drop)
}

/// Parse and normalize a catalog from a TOML string.
///
/// Errors:
/// - TOML parse failures
/// - Normalization errors (see [`normalize_catalog_with_policy`])
pub fn load_catalog_str(toml_str: &str) -> anyhow::Result<Catalog> {
    let mut cat: Catalog = toml::from_str(toml_str).context("failed to parse catalog TOML")?;
    let report = normalize_catalog(&mut cat).context("normalize_catalog failed")?;
    if report.sub_attributes_unknown_parent_dropped > 0 {
        warn!(
            dropped = report.sub_attributes_unknown_parent_dropped,
            "sub-attributes with undeclared parent values were dropped"
        );
    }
    Ok(cat)
}

/// Read a catalog TOML file from disk, parse, and normalize it.
pub fn load_catalog_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Catalog> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read catalog file {}", path.as_ref().display()))?;
    load_catalog_str(&text)
}
