//! upsert statements
use diesel::prelude::*;
use diesel::{ExpressionMethods, RunQueryDsl, SqliteConnection, insert_into};

use crate::schema::{
    attribute, attribute_value as av, product, product_attribute as pa, rule, sub_attribute as sa,
};

use crate::models::catalog::{
    NewAttribute, NewAttributeValue, NewProduct, NewProductAttribute, NewRule, NewSubAttribute,
    SubAttributeUpdate,
};

/// upsert product
pub fn upsert_product(conn: &mut SqliteConnection, row: &NewProduct<'_>) -> anyhow::Result<usize> {
    let n = insert_into(product::table)
        .values(row)
        .on_conflict(product::id)
        .do_update()
        .set(row)
        .execute(conn)?;
    Ok(n)
}

/// upsert attribute definition
pub fn upsert_attribute(
    conn: &mut SqliteConnection,
    row: &NewAttribute<'_>,
) -> anyhow::Result<usize> {
    let n = insert_into(attribute::table)
        .values(row)
        .on_conflict(attribute::id)
        .do_update()
        .set(row)
        .execute(conn)?;
    Ok(n)
}

/// attribute value upsert
pub fn upsert_attribute_value(
    conn: &mut SqliteConnection,
    row: &NewAttributeValue<'_>,
) -> anyhow::Result<usize> {
    let n = insert_into(av::table)
        .values(row)
        .on_conflict((av::attribute_id, av::value))
        .do_update()
        .set((
            av::label.eq(row.label),
            av::has_sub_attributes.eq(row.has_sub_attributes),
            av::position.eq(row.position),
        ))
        .execute(conn)?;
    Ok(n)
}

/// product <--> attribute link
pub fn upsert_product_attribute(
    conn: &mut SqliteConnection,
    row: &NewProductAttribute<'_>,
) -> anyhow::Result<usize> {
    let n = insert_into(pa::table)
        .values(row)
        .on_conflict((pa::product_id, pa::attribute_id))
        .do_update()
        .set(pa::position.eq(row.position))
        .execute(conn)?;
    Ok(n)
}

/// sub-attribute upsert, keyed by (parent attribute, parent value, value)
pub fn upsert_sub_attribute(
    conn: &mut SqliteConnection,
    row: &NewSubAttribute<'_>,
) -> anyhow::Result<usize> {
    let n = insert_into(sa::table)
        .values(row)
        .on_conflict((sa::parent_attribute_id, sa::parent_value, sa::value))
        .do_update()
        .set(SubAttributeUpdate {
            label: row.label,
            enabled: row.enabled,
            position: row.position,
        })
        .execute(conn)?;
    Ok(n)
}

/// rule upsert
pub fn upsert_rule(conn: &mut SqliteConnection, row: &NewRule<'_>) -> anyhow::Result<usize> {
    let n = insert_into(rule::table)
        .values(row)
        .on_conflict(rule::id)
        .do_update()
        .set(row)
        .execute(conn)?;
    Ok(n)
}
