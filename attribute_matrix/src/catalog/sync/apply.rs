use diesel::prelude::*;

use crate::catalog::repo::*;
use crate::catalog::sync::diff::CatalogDiff;
use crate::models::catalog::{
    NewAttribute, NewAttributeValue, NewProduct, NewProductAttribute, NewRule, NewSubAttribute,
};

/// Apply the diff inside the current transaction.
/// Note: delete order honors FKs: rules -> sub-attributes -> product links -> values
/// -> attributes/products. A product that still has matrix entries is RESTRICTed.
pub fn apply_diff(conn: &mut SqliteConnection, diff: &CatalogDiff) -> anyhow::Result<()> {
    // Upserts (parents first)
    for (id, p) in &diff.products_upsert {
        upsert_product(
            conn,
            &NewProduct {
                id,
                name: &p.name,
                category_id: p.category.as_deref(),
            },
        )?;
    }
    for (id, a) in &diff.attributes_upsert {
        upsert_attribute(
            conn,
            &NewAttribute {
                id,
                name: &a.name,
                input_type: &a.input_type,
            },
        )?;
    }
    for ((attr, value), v) in &diff.values_upsert {
        upsert_attribute_value(
            conn,
            &NewAttributeValue {
                attribute_id: attr,
                value,
                label: &v.label,
                has_sub_attributes: v.has_sub_attributes,
                position: v.position,
            },
        )?;
    }
    for ((prod, attr), pos) in &diff.product_attributes_upsert {
        upsert_product_attribute(
            conn,
            &NewProductAttribute {
                product_id: prod,
                attribute_id: attr,
                position: *pos,
            },
        )?;
    }
    for ((attr, parent, value), s) in &diff.sub_attributes_upsert {
        upsert_sub_attribute(
            conn,
            &NewSubAttribute {
                parent_attribute_id: attr,
                parent_value: parent,
                value,
                label: &s.label,
                enabled: s.enabled,
                position: s.position,
            },
        )?;
    }
    for (id, r) in &diff.rules_upsert {
        upsert_rule(
            conn,
            &NewRule {
                id,
                name: &r.name,
                priority: r.priority,
                active: r.active,
                scope: &r.scope,
                scope_ref: r.scope_ref.as_deref(),
                when_attribute_id: &r.when_attribute_id,
                when_value: &r.when_value,
                actions: &r.actions,
                seq: r.seq,
            },
        )?;
    }

    // Prune (reverse dependency order)
    use crate::schema::{
        attribute as at, attribute_value as av, product as pr, product_attribute as pa, rule as ru,
        sub_attribute as sa,
    };

    for id in &diff.rules_delete {
        diesel::delete(ru::table.filter(ru::id.eq(id))).execute(conn)?;
    }

    for (attr, parent, value) in &diff.sub_attributes_delete {
        diesel::delete(
            sa::table.filter(
                sa::parent_attribute_id
                    .eq(attr)
                    .and(sa::parent_value.eq(parent))
                    .and(sa::value.eq(value)),
            ),
        )
        .execute(conn)?;
    }

    for (prod, attr) in &diff.product_attributes_delete {
        diesel::delete(pa::table.filter(pa::product_id.eq(prod).and(pa::attribute_id.eq(attr))))
            .execute(conn)?;
    }

    for (attr, value) in &diff.values_delete {
        diesel::delete(av::table.filter(av::attribute_id.eq(attr).and(av::value.eq(value))))
            .execute(conn)?;
    }

    for id in &diff.attributes_delete {
        diesel::delete(at::table.filter(at::id.eq(id))).execute(conn)?;
    }
    for id in &diff.products_delete {
        diesel::delete(pr::table.filter(pr::id.eq(id))).execute(conn)?;
    }

    Ok(())
}
