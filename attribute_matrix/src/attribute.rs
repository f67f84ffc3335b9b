//! Read-only catalog types handed to the engine.
//!
//! These are the decoded forms of the catalog tables; the engine never touches
//! Diesel rows directly.

use std::{fmt, str::FromStr};

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// How an attribute is presented to the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// Single choice from a list.
    #[default]
    Dropdown,
    /// Single choice from radio buttons.
    Radio,
    /// Single choice from a popup gallery.
    Popup,
    /// Free text.
    Text,
    /// Free number.
    Number,
    /// Boolean toggle.
    Checkbox,
}

impl InputType {
    /// Only selection-style inputs take part in combination generation.
    pub const fn is_selection(self) -> bool {
        matches!(self, Self::Dropdown | Self::Radio | Self::Popup)
    }

    /// Database code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dropdown => "dropdown",
            Self::Radio => "radio",
            Self::Popup => "popup",
            Self::Text => "text",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "dropdown" => Self::Dropdown,
            "radio" => Self::Radio,
            "popup" => Self::Popup,
            "text" => Self::Text,
            "number" => Self::Number,
            "checkbox" => Self::Checkbox,
            other => bail!("unknown input type '{other}'"),
        })
    }
}

/// One selectable value of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    /// Stored value, unique within the attribute.
    pub value: String,
    /// Display label.
    pub label: String,
    /// UI hint only. Expansion always re-checks the live sub-attribute set.
    pub has_sub_attributes: bool,
}

/// An attribute with its ordered values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    /// Attribute id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Presentation.
    pub input_type: InputType,
    /// Values in display order.
    pub values: Vec<AttributeValue>,
}

/// A nested choice available only under one parent value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAttributeDefinition {
    /// Database id.
    pub id: i32,
    /// Parent attribute.
    pub parent_attribute_id: String,
    /// Parent value; equals an [`AttributeValue::value`] of the parent.
    pub parent_value: String,
    /// Sub value.
    pub value: String,
    /// Display label.
    pub label: String,
    /// Disabled entries never expand.
    pub enabled: bool,
}

/// A product and the category its category-scoped rules come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Product id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional category.
    pub category_id: Option<String>,
}
