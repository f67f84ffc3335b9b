mod common;
use common::{CARDS_TOML, count, fk_check_empty, setup_db, sync_toml};

use attribute_matrix::blob::MemoryBlobStore;
use attribute_matrix::catalog::config::{Catalog, load_catalog_str};
use attribute_matrix::catalog::sync::{SyncOptions, sync_catalog};
use attribute_matrix::catalog::{CatalogSource, SqliteCatalog};
use attribute_matrix::engine::rules::RuleAction;
use attribute_matrix::error::{MatrixError, RecordKind};
use attribute_matrix::schema;
use attribute_matrix::service::{AdminService, GenerateOptions, Limits};

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error};

#[test]
fn sync_happy_path_and_idempotent() {
    let (_db, mut conn) = setup_db();

    let cat = load_catalog_str(CARDS_TOML).unwrap();

    // First run (apply)
    let diff = sync_catalog(
        &mut conn,
        cat.clone(),
        SyncOptions {
            dry_run: false,
            prune: false,
        },
    )
    .expect("sync");

    assert_eq!(diff.products_upsert.len(), 1);
    assert_eq!(diff.attributes_upsert.len(), 2);
    assert_eq!(diff.values_upsert.len(), 5);
    assert_eq!(diff.sub_attributes_upsert.len(), 2);
    assert_eq!(diff.rules_upsert.len(), 1);

    // Idempotence: second run is a no-op
    let diff2 = sync_catalog(
        &mut conn,
        cat,
        SyncOptions {
            dry_run: false,
            prune: false,
        },
    )
    .expect("sync-2");
    assert!(diff2.is_noop(), "second sync should be a no-op:\n{diff2}");

    assert_eq!(count(&mut conn, "product"), 1);
    assert_eq!(count(&mut conn, "attribute"), 2);
    assert_eq!(count(&mut conn, "attribute_value"), 5);
    assert_eq!(count(&mut conn, "product_attribute"), 2);
    assert_eq!(count(&mut conn, "sub_attribute"), 2);
    assert_eq!(count(&mut conn, "rule"), 1);

    fk_check_empty(&mut conn);
}

#[test]
fn dry_run_does_not_write() {
    let (_db, mut conn) = setup_db();

    let cat = load_catalog_str(CARDS_TOML).unwrap();
    let diff = sync_catalog(
        &mut conn,
        cat,
        SyncOptions {
            dry_run: true,
            prune: true,
        },
    )
    .expect("dry-run");

    // Diff should not be empty…
    assert!(!diff.is_noop());
    // …but DB remains empty.
    assert_eq!(count(&mut conn, "product"), 0);
    assert_eq!(count(&mut conn, "attribute"), 0);
    assert_eq!(count(&mut conn, "attribute_value"), 0);
    assert_eq!(count(&mut conn, "rule"), 0);
}

#[test]
fn changed_label_is_the_only_upsert() {
    let (_db, mut conn) = setup_db();
    sync_toml(&mut conn, CARDS_TOML);

    let relabeled = CARDS_TOML.replace(r#"label = "350gsm""#, r#"label = "350gsm silk""#);
    let diff = sync_toml(&mut conn, &relabeled);

    assert_eq!(diff.values_upsert.len(), 1);
    assert!(
        diff.values_upsert
            .contains_key(&("paper".to_string(), "350".to_string()))
    );
    assert!(diff.products_upsert.is_empty());
    assert!(diff.rules_upsert.is_empty());

    use schema::attribute_value::dsl as av;
    let label: String = av::attribute_value
        .filter(av::attribute_id.eq("paper").and(av::value.eq("350")))
        .select(av::label)
        .first(&mut conn)
        .unwrap();
    assert_eq!(label, "350gsm silk");

    fk_check_empty(&mut conn);
}

#[test]
fn prune_removes_rows_missing_from_toml() {
    let (_db, mut conn) = setup_db();
    sync_toml(&mut conn, CARDS_TOML);

    // Drop the rule and the "Logo" sub-attribute.
    let trimmed = r#"
[attributes.paper]
name = "Paper"
values = [
  { value = "300", label = "300gsm" },
  { value = "350", label = "350gsm" },
  { value = "400", label = "400gsm" },
]

[attributes.uv]
name = "UV"
input_type = "radio"
values = [{ value = "None" }, { value = "Spot UV", has_sub_attributes = true }]
sub_attributes = [{ parent_value = "Spot UV", value = "Full" }]

[products.card]
name = "Business card"
category = "cards"
attributes = ["paper", "uv"]
"#;
    let diff = sync_catalog(
        &mut conn,
        load_catalog_str(trimmed).unwrap(),
        SyncOptions {
            dry_run: false,
            prune: true,
        },
    )
    .unwrap();

    assert_eq!(diff.rules_delete.len(), 1);
    assert_eq!(diff.sub_attributes_delete.len(), 1);
    assert_eq!(count(&mut conn, "rule"), 0);
    assert_eq!(count(&mut conn, "sub_attribute"), 1);
    assert_eq!(count(&mut conn, "attribute_value"), 5);
    fk_check_empty(&mut conn);
}

#[test]
fn prune_respects_fk_restrict() {
    let (_db, mut conn) = setup_db();
    sync_toml(&mut conn, CARDS_TOML);

    // Matrix entries reference the product, so RESTRICT will bite on prune.
    let svc = AdminService::new(MemoryBlobStore::new(), Limits::default());
    svc.generate(&mut conn, "card", GenerateOptions::default())
        .unwrap();
    let entries = count(&mut conn, "matrix_entry");
    assert!(entries > 0);

    // New TOML *omits* the product → prune should attempt delete and fail by FK.
    let without_card = r#"
[attributes.paper]
name = "Paper"
values = [{ value = "300" }]
"#;
    let err = sync_catalog(
        &mut conn,
        load_catalog_str(without_card).unwrap(),
        SyncOptions {
            dry_run: false,
            prune: true,
        },
    )
    .unwrap_err();

    let msg = format!("{err:#}");
    let is_fk = matches!(
        err.downcast_ref::<Error>(),
        Some(Error::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            _
        ))
    );
    assert!(is_fk || msg.to_lowercase().contains("foreign key constraint failed"));

    // Whole sync rolled back.
    assert_eq!(count(&mut conn, "product"), 1);
    assert_eq!(count(&mut conn, "rule"), 1);
    assert_eq!(count(&mut conn, "attribute_value"), 5);
    assert_eq!(count(&mut conn, "matrix_entry"), entries);
    fk_check_empty(&mut conn);
}

#[test]
fn dangling_reference_aborts_before_any_write() {
    let (_db, mut conn) = setup_db();

    // Parse without normalizing so sync_catalog sees the bad reference.
    let cat: Catalog = toml::from_str(
        r#"
[attributes.paper]
name = "Paper"
values = [{ value = "300" }]

[products.card]
name = "Business card"
attributes = ["paper", "finish"]
"#,
    )
    .unwrap();

    let err = sync_catalog(&mut conn, cat, SyncOptions::default()).unwrap_err();
    match err.downcast_ref::<MatrixError>() {
        Some(MatrixError::NotFound { kind, id, context }) => {
            assert_eq!(*kind, RecordKind::Attribute);
            assert_eq!(id, "finish");
            assert_eq!(context.as_deref(), Some("product 'card'"));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }

    assert_eq!(count(&mut conn, "product"), 0);
    assert_eq!(count(&mut conn, "attribute"), 0);
}

#[test]
fn rule_targeting_unknown_attribute_is_rejected() {
    let toml_str = format!(
        r#"{CARDS_TOML}
[[rules]]
id = "bad"
name = "bad"
when = {{ attribute = "paper", value = "350" }}
actions = [{{ type = "hide", target = "lamination" }}]
"#
    );
    let err = load_catalog_str(&toml_str).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MatrixError>(),
        Some(MatrixError::NotFound {
            kind: RecordKind::Attribute,
            ..
        })
    ));
}

#[test]
fn unrecognized_actions_survive_a_round_trip() {
    let (_db, mut conn) = setup_db();
    let toml_str = format!(
        r#"{CARDS_TOML}
[[rules]]
id = "future"
name = "Newer action kind"
when = {{ attribute = "paper", value = "400" }}
actions = [{{ type = "fancy_new", target = "uv", weight = 3 }}]
"#
    );
    sync_toml(&mut conn, &toml_str);

    let catalog = SqliteCatalog::new();
    let card = catalog.product(&mut conn, "card").unwrap().unwrap();
    let rules = catalog.list_applicable_rules(&mut conn, &card).unwrap();
    let future = rules.iter().find(|r| r.id == "future").unwrap();
    assert_eq!(
        future.actions,
        vec![RuleAction::Unrecognized(serde_json::json!({
            "type": "fancy_new",
            "target": "uv",
            "weight": 3,
        }))]
    );

    // Stored JSON matches the catalog, so nothing is rewritten.
    assert!(sync_toml(&mut conn, &toml_str).is_noop());
}
