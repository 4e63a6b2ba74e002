use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use commerce_core::{Column, ColumnKind, Index, PluginContext, Row, Schema, Table};
use serde_json::{json, Value};

pub(crate) const PRODUCT_TYPE_LOCALES: &str = "commerce_producttypes_i18n";
pub(crate) const CUSTOMER_ADDRESSES: &str = "commerce_customers_addresses";

pub(crate) fn row(values: Vec<(&str, Value)>) -> Row {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

pub(crate) fn row_id(row: &Row) -> Result<i64> {
    row.get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("row is missing an integer id"))
}

pub(crate) fn id() -> Column {
    Column::new("id", ColumnKind::Integer)
}

pub(crate) fn int(name: &str) -> Column {
    Column::new(name, ColumnKind::Integer)
}

pub(crate) fn text(name: &str) -> Column {
    Column::new(name, ColumnKind::Text)
}

pub(crate) fn decimal(name: &str) -> Column {
    Column::new(name, ColumnKind::Decimal)
}

pub(crate) fn flag(name: &str, default: bool) -> Column {
    Column::new(name, ColumnKind::Boolean).with_default(default)
}

pub(crate) fn product_type_locales_table() -> Table {
    Table::new(vec![
        id(),
        int("productTypeId"),
        text("locale"),
        text("urlFormat").nullable(),
    ])
    .with_index(Index::unique(
        "commerce_producttypes_i18n_productTypeId_locale_unq",
        &["productTypeId", "locale"],
    ))
}

pub(crate) fn customer_addresses_table() -> Table {
    Table::new(vec![id(), int("customerId"), int("addressId")]).with_index(Index::unique(
        "commerce_customers_addresses_customerId_addressId_unq",
        &["customerId", "addressId"],
    ))
}

/// The Commerce schema a fresh install creates. Matches the shape the
/// legacy upgrade plan leaves behind.
pub fn base_schema() -> Schema {
    let mut tables = BTreeMap::new();

    tables.insert(
        "commerce_products".to_string(),
        Table::new(vec![
            id(),
            int("typeId"),
            int("taxCategoryId"),
            Column::new("postDate", ColumnKind::DateTime).nullable(),
            Column::new("expiryDate", ColumnKind::DateTime).nullable(),
            flag("promotable", true),
            flag("freeShipping", false),
            int("defaultVariantId").nullable(),
        ]),
    );
    tables.insert(
        "commerce_producttypes".to_string(),
        Table::new(vec![
            id(),
            text("name"),
            text("handle"),
            flag("hasUrls", false),
            flag("hasVariants", false),
            text("template").nullable(),
            text("titleFormat").nullable(),
            flag("hasDimensions", false),
            flag("hasVariantTitleField", true),
            text("skuFormat").nullable(),
        ]),
    );
    tables.insert(PRODUCT_TYPE_LOCALES.to_string(), product_type_locales_table());
    tables.insert(
        "commerce_variants".to_string(),
        Table::new(vec![
            id(),
            int("productId"),
            text("sku"),
            decimal("price"),
            decimal("width").nullable(),
            decimal("height").nullable(),
            decimal("length").nullable(),
            decimal("weight").nullable(),
            int("stock").with_default(0),
            flag("unlimitedStock", false),
            int("minQty").nullable(),
            int("maxQty").nullable(),
            int("sortOrder").nullable(),
            flag("isDefault", false),
        ])
        .with_index(Index::unique("commerce_variants_sku_unq", &["sku"])),
    );
    tables.insert(
        "commerce_taxcategories".to_string(),
        Table::new(vec![
            id(),
            text("name"),
            text("handle"),
            text("description").nullable(),
            flag("default", false),
        ]),
    );
    tables.insert(
        "commerce_taxrates".to_string(),
        Table::new(vec![
            id(),
            text("name"),
            decimal("rate"),
            flag("include", false),
            int("taxCategoryId"),
            int("taxZoneId").nullable(),
            text("taxable").with_default("price"),
        ]),
    );
    tables.insert(
        "commerce_emails".to_string(),
        Table::new(vec![
            id(),
            text("name"),
            text("subject"),
            text("to"),
            text("bcc").nullable(),
            flag("enabled", true),
            text("templatePath"),
        ]),
    );
    tables.insert(
        "commerce_paymentmethods".to_string(),
        Table::new(vec![
            id(),
            text("class"),
            text("name"),
            Column::new("settings", ColumnKind::Json).with_default(json!({})),
            flag("frontendEnabled", true),
            text("paymentType").with_default("purchase"),
        ])
        .with_index(Index::unique("commerce_paymentmethods_name_unq", &["name"])),
    );
    tables.insert(
        "commerce_discounts".to_string(),
        Table::new(vec![
            id(),
            text("name"),
            text("code").nullable(),
            decimal("perItemDiscount").with_default(0),
            flag("enabled", true),
        ]),
    );
    tables.insert(
        "commerce_shippingmethods".to_string(),
        Table::new(vec![
            id(),
            text("name"),
            flag("enabled", true),
            flag("default", false),
            text("handle"),
        ])
        .with_index(Index::unique("commerce_shippingmethods_handle_unq", &["handle"])),
    );
    tables.insert(
        "commerce_addresses".to_string(),
        Table::new(vec![
            id(),
            text("firstName"),
            text("lastName"),
            text("address1").nullable(),
            text("city").nullable(),
            text("zipCode").nullable(),
            int("countryId").nullable(),
            text("businessName").nullable(),
            text("businessTaxId").nullable(),
        ]),
    );
    tables.insert(
        "commerce_customers".to_string(),
        Table::new(vec![
            id(),
            text("email"),
            int("userId").nullable(),
            int("lastUsedBillingAddressId").nullable(),
            int("lastUsedShippingAddressId").nullable(),
        ]),
    );
    tables.insert(CUSTOMER_ADDRESSES.to_string(), customer_addresses_table());
    tables.insert(
        "commerce_orders".to_string(),
        Table::new(vec![
            id(),
            text("number"),
            text("email").nullable(),
            int("customerId").nullable(),
            int("billingAddressId").nullable(),
            int("shippingAddressId").nullable(),
            decimal("itemTotal").with_default(0),
        ]),
    );
    tables.insert(
        "commerce_lineitems".to_string(),
        Table::new(vec![
            id(),
            int("orderId"),
            int("purchasableId"),
            decimal("price"),
            int("qty"),
            decimal("weight").with_default(0),
            decimal("height").with_default(0),
            decimal("width").with_default(0),
            decimal("length").with_default(0),
            Column::new("snapshot", ColumnKind::Json).nullable(),
            Column::new("options", ColumnKind::Json).with_default(json!({})),
            text("optionsSignature"),
            decimal("taxIncluded").with_default(0),
        ]),
    );
    tables.insert(
        "commerce_orderstatuses".to_string(),
        Table::new(vec![
            id(),
            text("name"),
            text("handle"),
            text("color").with_default("green"),
            flag("default", false),
        ]),
    );

    Schema { tables }
}

/// Default records for a fresh install. Never run after an upgrade.
pub fn seed_defaults(schema: &mut Schema, context: &PluginContext) -> Result<()> {
    schema.insert_row(
        "commerce_orderstatuses",
        row(vec![
            ("name", json!("Processing")),
            ("handle", json!("processing")),
            ("default", json!(true)),
        ]),
    )?;
    schema.insert_row(
        "commerce_orderstatuses",
        row(vec![
            ("name", json!("Shipped")),
            ("handle", json!("shipped")),
            ("color", json!("blue")),
        ]),
    )?;
    schema.insert_row(
        "commerce_taxcategories",
        row(vec![
            ("name", json!("General")),
            ("handle", json!("general")),
            ("default", json!(true)),
        ]),
    )?;
    schema.insert_row(
        "commerce_shippingmethods",
        row(vec![
            ("name", json!("Free Shipping")),
            ("handle", json!("freeShipping")),
            ("default", json!(true)),
        ]),
    )?;
    schema.insert_row(
        "commerce_paymentmethods",
        row(vec![("class", json!("Dummy")), ("name", json!("Dummy"))]),
    )?;

    let product_type_id = schema.insert_row(
        "commerce_producttypes",
        row(vec![
            ("name", json!("Clothing")),
            ("handle", json!("clothing")),
            ("hasUrls", json!(true)),
            ("hasDimensions", json!(true)),
            ("template", json!("shop/products/_product")),
        ]),
    )?;
    for locale in &context.site_locales {
        schema.insert_row(
            PRODUCT_TYPE_LOCALES,
            row(vec![
                ("productTypeId", json!(product_type_id)),
                ("locale", json!(locale)),
                ("urlFormat", json!("shop/products/{slug}")),
            ]),
        )?;
    }
    Ok(())
}

/// Gives every product type a locale row for `locale`, copying the URL
/// format of the type's first existing locale. Returns the rows added.
pub fn add_product_type_locale(schema: &mut Schema, locale: &str) -> Result<usize> {
    let locale = locale.trim();
    if locale.is_empty() {
        return Err(anyhow!("locale must not be empty"));
    }

    let mut url_formats: BTreeMap<i64, Option<Value>> = BTreeMap::new();
    for product_type in &schema.table("commerce_producttypes")?.rows {
        url_formats.insert(row_id(product_type)?, None);
    }
    for existing in &schema.table(PRODUCT_TYPE_LOCALES)?.rows {
        let Some(type_id) = existing.get("productTypeId").and_then(Value::as_i64) else {
            continue;
        };
        let Some(slot) = url_formats.get_mut(&type_id) else {
            continue;
        };
        if existing.get("locale").and_then(Value::as_str) == Some(locale) {
            url_formats.remove(&type_id);
            continue;
        }
        if slot.is_none() {
            *slot = Some(existing.get("urlFormat").cloned().unwrap_or(Value::Null));
        }
    }

    let mut added = 0;
    for (type_id, url_format) in url_formats {
        schema.insert_row(
            PRODUCT_TYPE_LOCALES,
            row(vec![
                ("productTypeId", json!(type_id)),
                ("locale", json!(locale)),
                ("urlFormat", url_format.unwrap_or(Value::Null)),
            ]),
        )?;
        added += 1;
    }
    Ok(added)
}
