use diesel::prelude::*;

use crate::catalog::sync::{
    AttributeRecord, CatalogSnapshot, ProductRecord, RuleRecord, SubAttributeRecord, ValueRecord,
};
use crate::models::catalog::{
    AttributeRow, AttributeValueRow, ProductAttributeRow, ProductRow, RuleRow, SubAttributeRow,
};

/// State currently stored in the database.
pub type Current = CatalogSnapshot;

pub fn read_current(conn: &mut SqliteConnection) -> anyhow::Result<Current> {
    use crate::schema::{
        attribute, attribute_value, product, product_attribute, rule, sub_attribute,
    };

    let products = product::table
        .select(ProductRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|r| {
            (
                r.id,
                ProductRecord {
                    name: r.name,
                    category: r.category_id,
                },
            )
        })
        .collect();

    let attributes = attribute::table
        .select(AttributeRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|r| {
            (
                r.id,
                AttributeRecord {
                    name: r.name,
                    input_type: r.input_type,
                },
            )
        })
        .collect();

    let values = attribute_value::table
        .select(AttributeValueRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|r| {
            (
                (r.attribute_id, r.value),
                ValueRecord {
                    label: r.label,
                    has_sub_attributes: r.has_sub_attributes,
                    position: r.position,
                },
            )
        })
        .collect();

    let product_attributes = product_attribute::table
        .select(ProductAttributeRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|r| ((r.product_id, r.attribute_id), r.position))
        .collect();

    let sub_attributes = sub_attribute::table
        .select(SubAttributeRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|r| {
            (
                (r.parent_attribute_id, r.parent_value, r.value),
                SubAttributeRecord {
                    label: r.label,
                    enabled: r.enabled,
                    position: r.position,
                },
            )
        })
        .collect();

    let rules = rule::table
        .select(RuleRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|r| {
            (
                r.id,
                RuleRecord {
                    name: r.name,
                    priority: r.priority,
                    active: r.active,
                    scope: r.scope,
                    scope_ref: r.scope_ref,
                    when_attribute_id: r.when_attribute_id,
                    when_value: r.when_value,
                    actions: r.actions,
                    seq: r.seq,
                },
            )
        })
        .collect();

    Ok(Current {
        products,
        attributes,
        values,
        product_attributes,
        sub_attributes,
        rules,
    })
}
