//! Read side of the catalog: what generation and resolution need.
//!
//! Everything is loaded up front in a handful of queries; the engine never
//! goes back to the database while it recurses.
use std::collections::BTreeMap;

use anyhow::Context;
use diesel::prelude::*;
use tracing::warn;

use crate::attribute::{
    AttributeDefinition, AttributeValue, InputType, Product, SubAttributeDefinition,
};
use crate::engine::rules::{Applicability, Condition, Rule, RuleAction, applicable_rules};
use crate::models::catalog::{AttributeRow, AttributeValueRow, ProductRow, RuleRow, SubAttributeRow};
use crate::schema::{attribute, attribute_value, product, product_attribute, rule, sub_attribute};

/// Result type used by catalog readers.
pub type SourceResult<T> = anyhow::Result<T>;

/// Portable surface, SQLite implementation below.
pub trait CatalogSource {
    /// Look up a product; `None` if it does not exist.
    fn product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> SourceResult<Option<Product>>;

    /// Selection-type attributes of a product that have at least one value,
    /// in display order, each id once.
    fn list_eligible_attributes(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> SourceResult<Vec<AttributeDefinition>>;

    /// Enabled sub-attributes under any value of `attribute_id`, in position
    /// order. One query per attribute.
    fn list_sub_attributes(
        &self,
        conn: &mut SqliteConnection,
        attribute_id: &str,
    ) -> SourceResult<Vec<SubAttributeDefinition>>;

    /// Active rules applicable to the product, priority-descending with
    /// author order breaking ties.
    fn list_applicable_rules(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
    ) -> SourceResult<Vec<Rule>>;
}

/// Catalog reader over the SQLite tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteCatalog;

impl SqliteCatalog {
    /// New reader.
    pub fn new() -> Self {
        Self
    }
}

/// Decode a stored rule row. Unparseable actions degrade to an empty list.
pub fn rule_from_row(row: RuleRow) -> anyhow::Result<Rule> {
    let applies_to = Applicability::from_parts(&row.scope, row.scope_ref.as_deref())
        .with_context(|| format!("rule '{}'", row.id))?;
    let actions: Vec<RuleAction> = match serde_json::from_str(&row.actions) {
        Ok(a) => a,
        Err(e) => {
            warn!(rule = %row.id, error = %e, "rule actions are not valid JSON; ignoring them");
            Vec::new()
        }
    };
    Ok(Rule {
        id: row.id,
        name: row.name,
        priority: row.priority,
        active: row.active,
        applies_to,
        when: Condition {
            attribute: row.when_attribute_id,
            value: row.when_value,
        },
        actions,
    })
}

impl CatalogSource for SqliteCatalog {
    fn product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> SourceResult<Option<Product>> {
        let row = product::table
            .find(product_id)
            .select(ProductRow::as_select())
            .first(conn)
            .optional()?;
        Ok(row.map(|r| Product {
            id: r.id,
            name: r.name,
            category_id: r.category_id,
        }))
    }

    fn list_eligible_attributes(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> SourceResult<Vec<AttributeDefinition>> {
        let attrs: Vec<AttributeRow> = product_attribute::table
            .inner_join(attribute::table)
            .filter(product_attribute::product_id.eq(product_id))
            .order((product_attribute::position.asc(), attribute::id.asc()))
            .select(AttributeRow::as_select())
            .load(conn)?;

        let ids: Vec<&str> = attrs.iter().map(|a| a.id.as_str()).collect();
        let mut values: BTreeMap<String, Vec<AttributeValue>> = BTreeMap::new();
        for v in attribute_value::table
            .filter(attribute_value::attribute_id.eq_any(ids))
            .order((
                attribute_value::attribute_id.asc(),
                attribute_value::position.asc(),
                attribute_value::value.asc(),
            ))
            .select(AttributeValueRow::as_select())
            .load(conn)?
        {
            values.entry(v.attribute_id).or_default().push(AttributeValue {
                value: v.value,
                label: v.label,
                has_sub_attributes: v.has_sub_attributes,
            });
        }

        let mut out: Vec<AttributeDefinition> = Vec::with_capacity(attrs.len());
        for a in attrs {
            if out.iter().any(|d| d.id == a.id) {
                continue;
            }
            let input_type: InputType = a.input_type.parse()?;
            if !input_type.is_selection() {
                continue;
            }
            let Some(vals) = values.remove(&a.id) else {
                continue;
            };
            out.push(AttributeDefinition {
                id: a.id,
                name: a.name,
                input_type,
                values: vals,
            });
        }
        Ok(out)
    }

    fn list_sub_attributes(
        &self,
        conn: &mut SqliteConnection,
        attribute_id: &str,
    ) -> SourceResult<Vec<SubAttributeDefinition>> {
        let rows = sub_attribute::table
            .filter(sub_attribute::parent_attribute_id.eq(attribute_id))
            .filter(sub_attribute::enabled.eq(true))
            .order((
                sub_attribute::parent_value.asc(),
                sub_attribute::position.asc(),
                sub_attribute::id.asc(),
            ))
            .select(SubAttributeRow::as_select())
            .load(conn)?;
        Ok(rows
            .into_iter()
            .map(|r| SubAttributeDefinition {
                id: r.id,
                parent_attribute_id: r.parent_attribute_id,
                parent_value: r.parent_value,
                value: r.value,
                label: r.label,
                enabled: r.enabled,
            })
            .collect())
    }

    fn list_applicable_rules(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
    ) -> SourceResult<Vec<Rule>> {
        let rows = rule::table
            .filter(rule::active.eq(true))
            .order((rule::seq.asc(), rule::id.asc()))
            .select(RuleRow::as_select())
            .load(conn)?;
        let rules = rows
            .into_iter()
            .map(rule_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(applicable_rules(
            &rules,
            &product.id,
            product.category_id.as_deref(),
        ))
    }
}
