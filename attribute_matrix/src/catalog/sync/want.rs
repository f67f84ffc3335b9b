use anyhow::Context;

use crate::catalog::config::Catalog;
use crate::catalog::sync::{
    AttributeRecord, CatalogSnapshot, ProductRecord, RuleRecord, SubAttributeRecord, ValueRecord,
};

/// Desired state built from a normalized catalog.
pub type Wanted = CatalogSnapshot;

fn position(i: usize) -> i32 {
    i32::try_from(i).unwrap_or(i32::MAX)
}

pub fn wanted_from_catalog(cat: &Catalog) -> anyhow::Result<Wanted> {
    let mut w = Wanted::default();

    for (id, acfg) in &cat.attributes {
        w.attributes.insert(
            id.clone(),
            AttributeRecord {
                name: acfg.name.clone(),
                input_type: acfg.input_type.as_str().to_string(),
            },
        );
        for (i, v) in acfg.values.iter().enumerate() {
            w.values.insert(
                (id.clone(), v.value.clone()),
                ValueRecord {
                    label: v.label.clone().unwrap_or_else(|| v.value.clone()),
                    has_sub_attributes: v.has_sub_attributes,
                    position: position(i),
                },
            );
        }
        for (i, s) in acfg.sub_attributes.iter().enumerate() {
            w.sub_attributes.insert(
                (id.clone(), s.parent_value.clone(), s.value.clone()),
                SubAttributeRecord {
                    label: s.label.clone().unwrap_or_else(|| s.value.clone()),
                    enabled: s.enabled,
                    position: position(i),
                },
            );
        }
    }

    for (id, pcfg) in &cat.products {
        w.products.insert(
            id.clone(),
            ProductRecord {
                name: pcfg.name.clone(),
                category: pcfg.category.clone(),
            },
        );
        for (i, a) in pcfg.attributes.iter().enumerate() {
            w.product_attributes
                .insert((id.clone(), a.clone()), position(i));
        }
    }

    for (seq, r) in cat.rules.iter().enumerate() {
        let actions = serde_json::to_string(&r.actions)
            .with_context(|| format!("encode actions of rule '{}'", r.id))?;
        w.rules.insert(
            r.id.clone(),
            RuleRecord {
                name: r.name.clone(),
                priority: r.priority,
                active: r.active,
                scope: r.applies_to.scope_code().to_string(),
                scope_ref: r.applies_to.scope_ref().map(str::to_string),
                when_attribute_id: r.when.attribute.clone(),
                when_value: r.when.value.clone(),
                actions,
                seq: position(seq),
            },
        );
    }

    Ok(w)
}
