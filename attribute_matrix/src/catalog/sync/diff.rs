use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use crate::catalog::sync::{
    AttributeRecord, ProductRecord, RuleRecord, SubAttributeRecord, ValueRecord, read::Current,
    want::Wanted,
};

/// `(attribute, value)`
pub type ValueKey = (String, String);
/// `(product, attribute)`
pub type ProductAttributeKey = (String, String);
/// `(parent attribute, parent value, value)`
pub type SubAttributeKey = (String, String, String);

/// What needs to change to make DB == TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    // Upserts (absent or changed rows only)
    /// Products to insert or update.
    pub products_upsert: BTreeMap<String, ProductRecord>,
    /// Attributes to insert or update.
    pub attributes_upsert: BTreeMap<String, AttributeRecord>,
    /// Attribute values to insert or update.
    pub values_upsert: BTreeMap<ValueKey, ValueRecord>,
    /// Product links to insert or reposition.
    pub product_attributes_upsert: BTreeMap<ProductAttributeKey, i32>,
    /// Sub-attributes to insert or update.
    pub sub_attributes_upsert: BTreeMap<SubAttributeKey, SubAttributeRecord>,
    /// Rules to insert or update.
    pub rules_upsert: BTreeMap<String, RuleRecord>,

    // Prunes
    /// Products to delete.
    pub products_delete: BTreeSet<String>,
    /// Attributes to delete.
    pub attributes_delete: BTreeSet<String>,
    /// Attribute values to delete.
    pub values_delete: BTreeSet<ValueKey>,
    /// Product links to delete.
    pub product_attributes_delete: BTreeSet<ProductAttributeKey>,
    /// Sub-attributes to delete.
    pub sub_attributes_delete: BTreeSet<SubAttributeKey>,
    /// Rules to delete.
    pub rules_delete: BTreeSet<String>,
}

impl CatalogDiff {
    /// True if there is nothing to upsert or delete.
    pub fn is_noop(&self) -> bool {
        self.products_upsert.is_empty()
            && self.attributes_upsert.is_empty()
            && self.values_upsert.is_empty()
            && self.product_attributes_upsert.is_empty()
            && self.sub_attributes_upsert.is_empty()
            && self.rules_upsert.is_empty()
            && self.products_delete.is_empty()
            && self.attributes_delete.is_empty()
            && self.values_delete.is_empty()
            && self.product_attributes_delete.is_empty()
            && self.sub_attributes_delete.is_empty()
            && self.rules_delete.is_empty()
    }
}

impl fmt::Display for CatalogDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // helper: section header with underline
        let mut wrote_any = false;
        let mut section = |title: &str,
                           body: &mut dyn FnMut(&mut fmt::Formatter<'_>) -> fmt::Result|
         -> fmt::Result {
            if wrote_any {
                writeln!(f)?;
            }
            writeln!(f, "{title}")?;
            for _ in 0..title.len() {
                write!(f, "-")?;
            }
            writeln!(f)?;
            body(f)?;
            wrote_any = true;
            Ok(())
        };

        // UPSERTS
        if !self.products_upsert.is_empty() {
            section("Products (UPSERT)", &mut |f| {
                for (id, p) in &self.products_upsert {
                    match &p.category {
                        Some(c) => writeln!(f, "+ {id}  \"{}\" [{c}]", p.name)?,
                        None => writeln!(f, "+ {id}  \"{}\"", p.name)?,
                    }
                }
                Ok(())
            })?;
        }
        if !self.attributes_upsert.is_empty() {
            section("Attributes (UPSERT)", &mut |f| {
                for (id, a) in &self.attributes_upsert {
                    writeln!(f, "+ {id}  \"{}\" ({})", a.name, a.input_type)?;
                }
                Ok(())
            })?;
        }
        if !self.values_upsert.is_empty() {
            section("Attribute Values (UPSERT)", &mut |f| {
                for ((attr, value), v) in &self.values_upsert {
                    if &v.label == value {
                        writeln!(f, "+ {attr}  {value}")?;
                    } else {
                        writeln!(f, "+ {attr}  {value} \"{}\"", v.label)?;
                    }
                }
                Ok(())
            })?;
        }
        if !self.product_attributes_upsert.is_empty() {
            section("Product - Attribute (UPSERT)", &mut |f| {
                for ((prod, attr), pos) in &self.product_attributes_upsert {
                    writeln!(f, "+ {prod} - {attr}  #{pos}")?;
                }
                Ok(())
            })?;
        }
        if !self.sub_attributes_upsert.is_empty() {
            section("Sub-attributes (UPSERT)", &mut |f| {
                for ((attr, parent, value), s) in &self.sub_attributes_upsert {
                    let off = if s.enabled { "" } else { "  (disabled)" };
                    writeln!(f, "+ {attr}/{parent}  {value}{off}")?;
                }
                Ok(())
            })?;
        }
        if !self.rules_upsert.is_empty() {
            section("Rules (UPSERT)", &mut |f| {
                for (id, r) in &self.rules_upsert {
                    writeln!(
                        f,
                        "+ {id}  when {}={} priority {}",
                        r.when_attribute_id, r.when_value, r.priority
                    )?;
                }
                Ok(())
            })?;
        }

        // DELETES
        if !self.rules_delete.is_empty() {
            section("Rules (DELETE)", &mut |f| {
                for id in &self.rules_delete {
                    writeln!(f, "- {id}")?;
                }
                Ok(())
            })?;
        }
        if !self.sub_attributes_delete.is_empty() {
            section("Sub-attributes (DELETE)", &mut |f| {
                for (attr, parent, value) in &self.sub_attributes_delete {
                    writeln!(f, "- {attr}/{parent}  {value}")?;
                }
                Ok(())
            })?;
        }
        if !self.product_attributes_delete.is_empty() {
            section("Product - Attribute (DELETE)", &mut |f| {
                for (prod, attr) in &self.product_attributes_delete {
                    writeln!(f, "- {prod} - {attr}")?;
                }
                Ok(())
            })?;
        }
        if !self.values_delete.is_empty() {
            section("Attribute Values (DELETE)", &mut |f| {
                for (attr, value) in &self.values_delete {
                    writeln!(f, "- {attr}  {value}")?;
                }
                Ok(())
            })?;
        }
        if !self.attributes_delete.is_empty() {
            section("Attributes (DELETE)", &mut |f| {
                for id in &self.attributes_delete {
                    writeln!(f, "- {id}")?;
                }
                Ok(())
            })?;
        }
        if !self.products_delete.is_empty() {
            section("Products (DELETE)", &mut |f| {
                for id in &self.products_delete {
                    writeln!(f, "- {id}")?;
                }
                Ok(())
            })?;
        }

        if !wrote_any {
            write!(f, "No changes")
        } else {
            Ok(())
        }
    }
}

fn changed<K: Ord + Clone, V: PartialEq + Clone>(
    want: &BTreeMap<K, V>,
    have: &BTreeMap<K, V>,
) -> BTreeMap<K, V> {
    want.iter()
        .filter(|(k, v)| have.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn stale<K: Ord + Clone, V, W>(want: &BTreeMap<K, V>, have: &BTreeMap<K, W>) -> BTreeSet<K> {
    have.keys().filter(|k| !want.contains_key(*k)).cloned().collect()
}

pub fn make_diff(w: &Wanted, c: &Current, prune: bool) -> CatalogDiff {
    let mut d = CatalogDiff {
        products_upsert: changed(&w.products, &c.products),
        attributes_upsert: changed(&w.attributes, &c.attributes),
        values_upsert: changed(&w.values, &c.values),
        product_attributes_upsert: changed(&w.product_attributes, &c.product_attributes),
        sub_attributes_upsert: changed(&w.sub_attributes, &c.sub_attributes),
        rules_upsert: changed(&w.rules, &c.rules),
        ..Default::default()
    };

    // prunes (only when requested)
    if prune {
        d.products_delete = stale(&w.products, &c.products);
        d.attributes_delete = stale(&w.attributes, &c.attributes);
        d.values_delete = stale(&w.values, &c.values);
        d.product_attributes_delete = stale(&w.product_attributes, &c.product_attributes);
        d.sub_attributes_delete = stale(&w.sub_attributes, &c.sub_attributes);
        d.rules_delete = stale(&w.rules, &c.rules);
    }

    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wanted_min() -> Wanted {
        let mut w = Wanted::default();
        w.products.insert(
            "card".into(),
            ProductRecord {
                name: "Business card".into(),
                category: Some("cards".into()),
            },
        );
        w.attributes.insert(
            "paper".into(),
            AttributeRecord {
                name: "Paper".into(),
                input_type: "dropdown".into(),
            },
        );
        w.values.insert(
            ("paper".into(), "300".into()),
            ValueRecord {
                label: "300".into(), // same -> prints without label
                has_sub_attributes: false,
                position: 0,
            },
        );
        w.product_attributes
            .insert(("card".into(), "paper".into()), 0);
        w
    }

    #[test]
    fn display_no_changes() {
        let w = Wanted::default();
        let c = Current::default();
        let d = make_diff(&w, &c, false);
        assert!(d.is_noop());
        assert_eq!(d.to_string(), "No changes");
    }

    #[test]
    fn display_upserts_expected() {
        let w = wanted_min();
        let d = make_diff(&w, &Current::default(), false);
        let got = d.to_string();

        // Expected layout (headers underlined to the exact length).
        let expected = "\
Products (UPSERT)
-----------------
+ card  \"Business card\" [cards]

Attributes (UPSERT)
-------------------
+ paper  \"Paper\" (dropdown)

Attribute Values (UPSERT)
-------------------------
+ paper  300

Product - Attribute (UPSERT)
----------------------------
+ card - paper  #0
";
        assert_eq!(got, expected, "pretty diff did not match");
    }

    #[test]
    fn identical_state_is_noop_even_with_prune() {
        let w = wanted_min();
        let c: Current = w.clone();
        assert!(make_diff(&w, &c, true).is_noop());
    }

    #[test]
    fn only_changed_rows_are_upserted() {
        let w = wanted_min();
        let mut c: Current = w.clone();
        c.values
            .get_mut(&("paper".to_string(), "300".to_string()))
            .unwrap()
            .label = "old".into();
        let d = make_diff(&w, &c, false);
        assert_eq!(d.values_upsert.len(), 1);
        assert!(d.products_upsert.is_empty());
        assert!(d.attributes_upsert.is_empty());
    }

    #[test]
    fn prune_lists_rows_missing_from_wanted() {
        let w = wanted_min();
        let mut c: Current = w.clone();
        c.values.insert(
            ("paper".into(), "350".into()),
            ValueRecord {
                label: "350".into(),
                has_sub_attributes: false,
                position: 1,
            },
        );

        assert!(make_diff(&w, &c, false).values_delete.is_empty());
        let d = make_diff(&w, &c, true);
        assert_eq!(
            d.values_delete,
            BTreeSet::from([("paper".to_string(), "350".to_string())])
        );
        assert!(d.to_string().contains("Attribute Values (DELETE)"));
    }
}
