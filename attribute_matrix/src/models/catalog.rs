//! Catalog models for products, attributes, sub-attributes and rules.
//!
//! These types mirror the catalog tables defined in the schema and are used to
//! seed them from a TOML catalog and to read them back for generation:
//! - [`crate::schema::product`]: products with an optional category
//! - [`crate::schema::attribute`]: attribute definitions (id, name, input type)
//! - [`crate::schema::attribute_value`]: ordered values per attribute
//! - [`crate::schema::product_attribute`]: which attributes a product shows, in display order
//! - [`crate::schema::sub_attribute`]: second-level choices under one parent value
//! - [`crate::schema::rule`]: When/Then rules with JSON-encoded actions
//!
//! Example (no_run)
//! ```no_run
//! use attribute_matrix::schema;
//! use attribute_matrix::models::catalog::*;
//! use diesel::prelude::*;
//!
//! fn seed(conn: &mut SqliteConnection) -> diesel::QueryResult<()> {
//!     diesel::insert_into(schema::attribute::table)
//!         .values(NewAttribute { id: "paper", name: "Paper", input_type: "dropdown" })
//!         .execute(conn)?;
//!     diesel::insert_into(schema::attribute_value::table)
//!         .values(NewAttributeValue {
//!             attribute_id: "paper",
//!             value: "300",
//!             label: "300gsm",
//!             has_sub_attributes: false,
//!             position: 0,
//!         })
//!         .execute(conn)?;
//!     diesel::insert_into(schema::product::table)
//!         .values(NewProduct { id: "card", name: "Business card", category_id: Some("cards") })
//!         .execute(conn)?;
//!     diesel::insert_into(schema::product_attribute::table)
//!         .values(NewProductAttribute { product_id: "card", attribute_id: "paper", position: 0 })
//!         .execute(conn)?;
//!     Ok(())
//! }
//! ```

use diesel::prelude::*;

// ----------------------- product -----------------------

/// A product row in [`crate::schema::product`](crate::schema::product).
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::schema::product)]
pub struct ProductRow {
    /// Product id (primary key).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional category used for category-scoped rules.
    pub category_id: Option<String>,
}

/// Insertable/changeset form of [`ProductRow`].
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::product, treat_none_as_null = true)]
pub struct NewProduct<'a> {
    /// Product id (primary key).
    pub id: &'a str,
    /// Display name.
    pub name: &'a str,
    /// Optional category.
    pub category_id: Option<&'a str>,
}

// ----------------------- attribute ---------------------

/// An attribute definition row in [`crate::schema::attribute`](crate::schema::attribute).
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::schema::attribute)]
pub struct AttributeRow {
    /// Attribute id (primary key), normalized lowercase.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Input type code, e.g. "dropdown".
    pub input_type: String,
}

/// Insertable/changeset form of [`AttributeRow`].
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::attribute)]
pub struct NewAttribute<'a> {
    /// Attribute id.
    pub id: &'a str,
    /// Display name.
    pub name: &'a str,
    /// Input type code.
    pub input_type: &'a str,
}

// -------------------- attribute_value ------------------
// Composite PK => must declare both columns.

/// One selectable value of an attribute.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::schema::attribute_value)]
#[diesel(primary_key(attribute_id, value))]
pub struct AttributeValueRow {
    /// Foreign key to [`AttributeRow::id`].
    pub attribute_id: String,
    /// Stored value, unique within the attribute.
    pub value: String,
    /// Display label.
    pub label: String,
    /// Advisory UI hint; never used to decide expansion.
    pub has_sub_attributes: bool,
    /// Position within the attribute.
    pub position: i32,
}

/// Insertable/changeset form of [`AttributeValueRow`].
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::attribute_value)]
pub struct NewAttributeValue<'a> {
    /// Foreign key to [`AttributeRow::id`].
    pub attribute_id: &'a str,
    /// Stored value.
    pub value: &'a str,
    /// Display label.
    pub label: &'a str,
    /// Advisory UI hint.
    pub has_sub_attributes: bool,
    /// Position within the attribute.
    pub position: i32,
}

// ------------------- product_attribute -----------------

/// Assignment of an attribute to a product at a display position.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::schema::product_attribute)]
#[diesel(primary_key(product_id, attribute_id))]
pub struct ProductAttributeRow {
    /// Foreign key to [`ProductRow::id`].
    pub product_id: String,
    /// Foreign key to [`AttributeRow::id`].
    pub attribute_id: String,
    /// Display position; generation walks attributes in this order.
    pub position: i32,
}

/// Insertable/changeset form of [`ProductAttributeRow`].
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::product_attribute)]
pub struct NewProductAttribute<'a> {
    /// Foreign key to [`ProductRow::id`].
    pub product_id: &'a str,
    /// Foreign key to [`AttributeRow::id`].
    pub attribute_id: &'a str,
    /// Display position.
    pub position: i32,
}

// --------------------- sub_attribute -------------------
// Surrogate PK plus UNIQUE (parent_attribute_id, parent_value, value).

/// A second-level choice that exists only when its parent value is selected.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::schema::sub_attribute)]
pub struct SubAttributeRow {
    /// Database primary key.
    pub id: i32,
    /// Parent attribute id.
    pub parent_attribute_id: String,
    /// Parent value; must exist in `attribute_value`.
    pub parent_value: String,
    /// Sub value.
    pub value: String,
    /// Display label.
    pub label: String,
    /// Disabled sub-attributes are ignored by expansion.
    pub enabled: bool,
    /// Position under the parent value.
    pub position: i32,
}

/// Insertable form of [`SubAttributeRow`].
#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::sub_attribute)]
pub struct NewSubAttribute<'a> {
    /// Parent attribute id.
    pub parent_attribute_id: &'a str,
    /// Parent value.
    pub parent_value: &'a str,
    /// Sub value.
    pub value: &'a str,
    /// Display label.
    pub label: &'a str,
    /// Enabled flag.
    pub enabled: bool,
    /// Position under the parent value.
    pub position: i32,
}

/// Changeset for the mutable columns of a sub-attribute.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = crate::schema::sub_attribute)]
pub struct SubAttributeUpdate<'a> {
    /// Display label.
    pub label: &'a str,
    /// Enabled flag.
    pub enabled: bool,
    /// Position under the parent value.
    pub position: i32,
}

// ------------------------- rule ------------------------

/// A rule row in [`crate::schema::rule`](crate::schema::rule).
///
/// `actions` is the JSON encoding of `Vec<`[`crate::engine::rules::RuleAction`]`>`.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::schema::rule)]
pub struct RuleRow {
    /// Rule id (primary key).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Higher wins on tie-break.
    pub priority: i32,
    /// Inactive rules are never applicable.
    pub active: bool,
    /// "global" | "category" | "product".
    pub scope: String,
    /// Category or product id; NULL for global rules.
    pub scope_ref: Option<String>,
    /// Condition attribute.
    pub when_attribute_id: String,
    /// Condition value (full or base component).
    pub when_value: String,
    /// JSON array of actions.
    pub actions: String,
    /// Author order; breaks priority ties.
    pub seq: i32,
}

/// Insertable/changeset form of [`RuleRow`].
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::rule, treat_none_as_null = true)]
pub struct NewRule<'a> {
    /// Rule id.
    pub id: &'a str,
    /// Display name.
    pub name: &'a str,
    /// Priority.
    pub priority: i32,
    /// Active flag.
    pub active: bool,
    /// Scope code.
    pub scope: &'a str,
    /// Scope reference.
    pub scope_ref: Option<&'a str>,
    /// Condition attribute.
    pub when_attribute_id: &'a str,
    /// Condition value.
    pub when_value: &'a str,
    /// JSON array of actions.
    pub actions: &'a str,
    /// Author order.
    pub seq: i32,
}
