use std::cell::RefCell;
use std::rc::Rc;

use semver::{Version, VersionReq};
use serde_json::json;

use super::*;

fn products_table() -> Table {
    Table::new(vec![
        Column::new("id", ColumnKind::Integer),
        Column::new("title", ColumnKind::Text),
        Column::new("price", ColumnKind::Decimal).with_default(0),
        Column::new("note", ColumnKind::Text).nullable(),
    ])
}

fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[test]
fn parse_config_with_overrides() {
    let content = r#"
legacy_product = "Market"
upgrade_source_version = "0.8.09"
min_host_version = ">=2.5"
site_locales = ["en-US", "de"]
console = true
"#;

    let parsed = EngineConfig::from_toml_str(content).expect("config should parse");
    assert_eq!(parsed.legacy_product, "Market");
    assert_eq!(parsed.upgrade_source_version, "0.8.09");
    assert_eq!(
        parsed.min_host_version,
        VersionReq::parse(">=2.5").expect("valid version req")
    );
    assert_eq!(parsed.site_locales, vec!["en-US", "de"]);
    assert!(parsed.console);
}

#[test]
fn empty_config_uses_defaults() {
    let parsed = EngineConfig::from_toml_str("").expect("empty config should parse");
    assert_eq!(parsed, EngineConfig::default());
    assert!(parsed
        .min_host_version
        .matches(&Version::parse("2.5.0").expect("valid version")));
    assert!(!parsed
        .min_host_version
        .matches(&Version::parse("2.4.9").expect("valid version")));
}

#[test]
fn config_rejects_duplicate_locales() {
    let err = EngineConfig::from_toml_str("site_locales = [\"en-US\", \"en-US\"]")
        .expect_err("duplicate locales must fail");
    assert!(err.to_string().contains("duplicate site locale"));
}

#[test]
fn config_rejects_empty_legacy_product() {
    let err = EngineConfig::from_toml_str("legacy_product = \"  \"")
        .expect_err("blank legacy product must fail");
    assert!(err.to_string().contains("legacy_product"));
}

#[test]
fn missing_config_file_yields_defaults() {
    let path = std::env::temp_dir().join(format!(
        "commerce-core-missing-config-{}.toml",
        std::process::id()
    ));
    let config = EngineConfig::load(&path).expect("missing file should default");
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn plugin_context_carries_handle_and_locales() {
    let config = EngineConfig {
        site_locales: vec!["en-US".to_string(), "fr".to_string()],
        ..EngineConfig::default()
    };
    let context = PluginContext::from_config(&config);
    assert_eq!(context.handle, PLUGIN_HANDLE);
    assert_eq!(context.site_locales, vec!["en-US", "fr"]);
}

#[test]
fn create_table_rejects_duplicate_columns() {
    let mut schema = Schema::default();
    let err = schema
        .create_table(
            "broken",
            Table::new(vec![
                Column::new("id", ColumnKind::Integer),
                Column::new("id", ColumnKind::Text),
            ]),
        )
        .expect_err("duplicate column must fail");
    assert!(format!("{err:#}").contains("duplicate column 'id'"));
    assert!(!schema.has_table("broken"));
}

#[test]
fn insert_row_assigns_ids_and_defaults() {
    let mut schema = Schema::default();
    schema
        .create_table("products", products_table())
        .expect("must create table");

    let first = schema
        .insert_row("products", row(&[("title", json!("Shirt"))]))
        .expect("must insert");
    let second = schema
        .insert_row("products", row(&[("title", json!("Hat")), ("price", json!(12.5))]))
        .expect("must insert");

    assert_eq!((first, second), (1, 2));
    let rows = &schema.table("products").expect("table exists").rows;
    assert_eq!(rows[0]["price"], json!(0));
    assert_eq!(rows[0]["note"], serde_json::Value::Null);
    assert_eq!(rows[1]["price"], json!(12.5));
}

#[test]
fn insert_row_rejects_missing_required_value() {
    let mut schema = Schema::default();
    schema
        .create_table("products", products_table())
        .expect("must create table");

    let err = schema
        .insert_row("products", row(&[("price", json!(1))]))
        .expect_err("title is required");
    assert!(err.to_string().contains("column 'title' requires a value"));
    assert!(schema.table("products").expect("table exists").rows.is_empty());
}

#[test]
fn insert_row_enforces_unique_indexes() {
    let mut schema = Schema::default();
    schema
        .create_table(
            "products",
            products_table().with_index(Index::unique("products_title_unq", &["title"])),
        )
        .expect("must create table");
    schema
        .insert_row("products", row(&[("title", json!("Shirt"))]))
        .expect("must insert");

    let err = schema
        .insert_row("products", row(&[("title", json!("Shirt"))]))
        .expect_err("duplicate title must fail");
    assert!(format!("{err:#}").contains("products_title_unq"));
    assert_eq!(schema.table("products").expect("table exists").rows.len(), 1);
}

#[test]
fn add_column_backfills_rows_with_default() {
    let mut schema = Schema::default();
    schema
        .create_table("products", products_table())
        .expect("must create table");
    schema
        .insert_row("products", row(&[("title", json!("Shirt"))]))
        .expect("must insert");

    schema
        .add_column(
            "products",
            Column::new("hasDimensions", ColumnKind::Boolean).with_default(false),
        )
        .expect("must add column");
    assert_eq!(
        schema.table("products").expect("table exists").rows[0]["hasDimensions"],
        json!(false)
    );

    let err = schema
        .add_column("products", Column::new("sku", ColumnKind::Text))
        .expect_err("non-null column without default must fail on populated table");
    assert!(err.to_string().contains("without a default"));
}

#[test]
fn rename_column_updates_rows_and_indexes() {
    let mut schema = Schema::default();
    schema
        .create_table(
            "products",
            products_table().with_index(Index::new("products_title_idx", &["title"])),
        )
        .expect("must create table");
    schema
        .insert_row("products", row(&[("title", json!("Shirt"))]))
        .expect("must insert");

    schema
        .rename_column("products", "title", "name")
        .expect("must rename column");

    let table = schema.table("products").expect("table exists");
    assert!(table.has_column("name"));
    assert!(!table.has_column("title"));
    assert_eq!(table.rows[0]["name"], json!("Shirt"));
    assert_eq!(table.indexes[0].columns, vec!["name"]);
}

#[test]
fn drop_column_refuses_indexed_column() {
    let mut schema = Schema::default();
    schema
        .create_table(
            "products",
            products_table().with_index(Index::new("products_title_idx", &["title"])),
        )
        .expect("must create table");

    let err = schema
        .drop_column("products", "title")
        .expect_err("indexed column must not drop");
    assert!(err.to_string().contains("products_title_idx"));

    schema
        .drop_column("products", "note")
        .expect("unindexed column drops");
    assert!(!schema.table("products").expect("table exists").has_column("note"));
}

#[test]
fn alter_column_to_non_null_requires_values() {
    let mut schema = Schema::default();
    schema
        .create_table("products", products_table())
        .expect("must create table");
    schema
        .insert_row("products", row(&[("title", json!("Shirt"))]))
        .expect("must insert");

    let err = schema
        .alter_column("products", "note", |column| column.nullable = false)
        .expect_err("null rows block non-null change");
    assert!(err.to_string().contains("existing rows hold NULL"));
    assert!(
        schema
            .table("products")
            .expect("table exists")
            .column("note")
            .expect("column exists")
            .nullable
    );
}

#[test]
fn rename_table_refuses_existing_target() {
    let mut schema = Schema::default();
    schema
        .create_table("market_products", products_table())
        .expect("must create table");
    schema
        .create_table("commerce_products", products_table())
        .expect("must create table");

    let err = schema
        .rename_table("market_products", "commerce_products")
        .expect_err("target exists");
    assert!(err.to_string().contains("target already exists"));
    assert!(schema.has_table("market_products"));
}

#[test]
fn schema_json_round_trip_keeps_fingerprint() {
    let mut schema = Schema::default();
    schema
        .create_table("products", products_table())
        .expect("must create table");
    schema
        .insert_row("products", row(&[("title", json!("Shirt"))]))
        .expect("must insert");

    let raw = schema.to_json_pretty().expect("must serialize");
    let parsed = Schema::from_json_str(&raw).expect("must parse");
    assert_eq!(parsed, schema);
    assert_eq!(
        parsed.fingerprint().expect("fingerprint"),
        schema.fingerprint().expect("fingerprint")
    );

    schema
        .insert_row("products", row(&[("title", json!("Hat"))]))
        .expect("must insert");
    assert_ne!(
        parsed.fingerprint().expect("fingerprint"),
        schema.fingerprint().expect("fingerprint")
    );
}

#[test]
fn dispatch_runs_handlers_in_registration_order() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let first = Rc::clone(&calls);
    let second = Rc::clone(&calls);
    let subscriptions = EventSubscriptions::<Vec<String>>::builder(false)
        .on(HostEventKind::OrderCompleted, "discounts", move |_, _| {
            first.borrow_mut().push("discounts");
            Ok(())
        })
        .on(HostEventKind::OrderCompleted, "variants", move |event, log| {
            second.borrow_mut().push("variants");
            log.push(format!("{event:?}"));
            Ok(())
        })
        .build();

    let mut log = Vec::new();
    let ran = subscriptions
        .dispatch(&HostEvent::OrderCompleted { order_id: 7 }, &mut log)
        .expect("dispatch should succeed");

    assert_eq!(ran, 2);
    assert_eq!(*calls.borrow(), vec!["discounts", "variants"]);
    assert_eq!(log, vec!["OrderCompleted { order_id: 7 }"]);
    assert_eq!(
        subscriptions.subscriber_names(HostEventKind::OrderCompleted),
        vec!["discounts", "variants"]
    );
}

#[test]
fn console_builder_skips_web_session_events() {
    let subscriptions = EventSubscriptions::<()>::builder(true)
        .on(HostEventKind::UserLoggedIn, "customers", |_, _| Ok(()))
        .on(HostEventKind::LocaleAdded, "product-types", |_, _| Ok(()))
        .build();

    assert!(subscriptions
        .subscriber_names(HostEventKind::UserLoggedIn)
        .is_empty());
    assert_eq!(
        subscriptions
            .dispatch(&HostEvent::UserLoggedIn { user_id: 1 }, &mut ())
            .expect("dispatch without subscribers succeeds"),
        0
    );
    assert_eq!(
        subscriptions.subscriber_names(HostEventKind::LocaleAdded),
        vec!["product-types"]
    );
}

#[test]
fn dispatch_names_failing_handler() {
    let subscriptions = EventSubscriptions::<()>::builder(false)
        .on(HostEventKind::LocaleAdded, "product-types", |_, _| {
            Err(anyhow::anyhow!("locale table missing"))
        })
        .build();

    let err = subscriptions
        .dispatch(
            &HostEvent::LocaleAdded {
                locale: "fr".to_string(),
            },
            &mut (),
        )
        .expect_err("handler failure must surface");
    let rendered = format!("{err:#}");
    assert!(rendered.contains("handler 'product-types' failed for event 'locale-added'"));
    assert!(rendered.contains("locale table missing"));
}
