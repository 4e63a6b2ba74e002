use anyhow::{Context, Result};
use commerce_core::{Column, ColumnKind, Index, Schema, Table};
use serde_json::{json, Value};

use crate::base::{decimal, flag, id, int, row, text};

/// A populated schema as Market 0.8.09 leaves it, used to rehearse the
/// upgrade.
pub fn market_legacy_schema() -> Result<Schema> {
    let mut schema = Schema::default();
    for (name, table) in legacy_tables() {
        schema
            .create_table(name, table)
            .with_context(|| format!("failed to create legacy table '{name}'"))?;
    }

    for (table, values) in legacy_rows() {
        schema
            .insert_row(table, row(values))
            .with_context(|| format!("failed to seed legacy table '{table}'"))?;
    }
    Ok(schema)
}

fn legacy_tables() -> Vec<(&'static str, Table)> {
    vec![
        (
            "market_products",
            Table::new(vec![
                id(),
                int("typeId"),
                int("taxCategoryId"),
                Column::new("availableOn", ColumnKind::DateTime).nullable(),
                Column::new("expiresOn", ColumnKind::DateTime).nullable(),
                flag("promotable", true),
                flag("freeShipping", false),
            ]),
        ),
        (
            "market_producttypes",
            Table::new(vec![
                id(),
                text("name"),
                text("handle"),
                flag("hasUrls", false),
                flag("hasVariants", false),
                text("urlFormat").nullable(),
                text("template").nullable(),
                text("titleFormat").nullable(),
            ]),
        ),
        (
            "market_variants",
            Table::new(vec![
                id(),
                int("productId"),
                text("sku"),
                flag("isMaster", false),
                decimal("price"),
                decimal("width").nullable(),
                decimal("height").nullable(),
                decimal("length").nullable(),
                decimal("weight").nullable(),
                int("stock").with_default(0),
                flag("unlimitedStock", false),
                int("minQty").nullable(),
                int("maxQty").nullable(),
            ])
            .with_index(Index::unique("market_variants_sku_unq", &["sku"])),
        ),
        (
            "market_taxcategories",
            Table::new(vec![
                id(),
                text("name"),
                text("code"),
                text("description").nullable(),
                flag("default", false),
            ]),
        ),
        (
            "market_taxrates",
            Table::new(vec![
                id(),
                text("name"),
                decimal("rate"),
                flag("include", false),
                int("taxCategoryId"),
                int("taxZoneId").nullable(),
            ]),
        ),
        (
            "market_emails",
            Table::new(vec![
                id(),
                text("name"),
                text("subject"),
                text("to"),
                text("bcc").nullable(),
                flag("enabled", true),
                text("templatePath"),
                text("type").with_default("html"),
            ]),
        ),
        (
            "market_paymentmethods",
            Table::new(vec![
                id(),
                text("class"),
                text("name"),
                Column::new("settings", ColumnKind::Json).with_default(json!({})),
                flag("frontendEnabled", true),
            ]),
        ),
        (
            "market_discounts",
            Table::new(vec![
                id(),
                text("name"),
                text("code"),
                decimal("perItemDiscount").with_default(0),
                flag("enabled", true),
            ]),
        ),
        (
            "market_shippingmethods",
            Table::new(vec![
                id(),
                text("name"),
                flag("enabled", true),
                flag("default", false),
            ]),
        ),
        (
            "market_addresses",
            Table::new(vec![
                id(),
                text("firstName"),
                text("lastName"),
                text("address1").nullable(),
                text("city").nullable(),
                text("zipCode").nullable(),
                int("countryId").nullable(),
                text("company").nullable(),
            ]),
        ),
        (
            "market_customers",
            Table::new(vec![id(), text("email"), int("userId").nullable()]),
        ),
        (
            "market_orders",
            Table::new(vec![
                id(),
                text("number"),
                text("email").nullable(),
                int("customerId").nullable(),
                int("billingAddressId").nullable(),
                int("shippingAddressId").nullable(),
                decimal("itemTotal").with_default(0),
            ]),
        ),
        (
            "market_lineitems",
            Table::new(vec![
                id(),
                int("orderId"),
                int("purchasableId"),
                decimal("price"),
                int("qty"),
                decimal("weight").nullable(),
                decimal("height").nullable(),
                decimal("width").nullable(),
                decimal("length").nullable(),
                Column::new("snapshot", ColumnKind::Json).nullable(),
            ]),
        ),
        (
            "market_orderstatuses",
            Table::new(vec![
                id(),
                text("name"),
                text("handle"),
                text("color").with_default("green"),
                flag("default", false),
            ]),
        ),
    ]
}

fn legacy_rows() -> Vec<(&'static str, Vec<(&'static str, Value)>)> {
    vec![
        (
            "market_producttypes",
            vec![
                ("name", json!("Clothing")),
                ("handle", json!("clothing")),
                ("hasUrls", json!(true)),
                ("hasVariants", json!(true)),
                ("urlFormat", json!("clothing/{slug}")),
                ("template", json!("shop/_product")),
                ("titleFormat", json!("{product.title}")),
            ],
        ),
        (
            "market_producttypes",
            vec![("name", json!("Gift Cards")), ("handle", json!("giftCards"))],
        ),
        (
            "market_products",
            vec![
                ("typeId", json!(1)),
                ("taxCategoryId", json!(1)),
                ("availableOn", json!("2015-08-01T00:00:00Z")),
            ],
        ),
        (
            "market_products",
            vec![
                ("typeId", json!(2)),
                ("taxCategoryId", json!(1)),
                ("availableOn", json!("2015-09-01T00:00:00Z")),
                ("expiresOn", json!("2016-01-01T00:00:00Z")),
                ("freeShipping", json!(true)),
            ],
        ),
        (
            "market_variants",
            vec![
                ("productId", json!(1)),
                ("sku", json!("SHIRT-S")),
                ("isMaster", json!(true)),
                ("price", json!(20.0)),
                ("weight", json!(0.3)),
                ("stock", json!(10)),
            ],
        ),
        (
            "market_variants",
            vec![
                ("productId", json!(1)),
                ("sku", json!("SHIRT-L")),
                ("price", json!(22.0)),
                ("stock", json!(5)),
            ],
        ),
        (
            "market_variants",
            vec![
                ("productId", json!(2)),
                ("sku", json!("GIFT-50")),
                ("price", json!(50.0)),
                ("unlimitedStock", json!(true)),
            ],
        ),
        (
            "market_taxcategories",
            vec![
                ("name", json!("General")),
                ("code", json!("general")),
                ("default", json!(true)),
            ],
        ),
        (
            "market_taxrates",
            vec![
                ("name", json!("VAT")),
                ("rate", json!(0.2)),
                ("include", json!(true)),
                ("taxCategoryId", json!(1)),
            ],
        ),
        (
            "market_emails",
            vec![
                ("name", json!("Order confirmation")),
                ("subject", json!("Thanks for your order")),
                ("to", json!("{{ order.email }}")),
                ("templatePath", json!("emails/confirmation")),
            ],
        ),
        (
            "market_paymentmethods",
            vec![
                ("class", json!("Dummy")),
                ("name", json!("Dummy")),
                ("settings", json!({"paymentType": "authorize", "testMode": true})),
            ],
        ),
        (
            "market_paymentmethods",
            vec![("class", json!("Stripe")), ("name", json!("Stripe"))],
        ),
        (
            "market_discounts",
            vec![("name", json!("Summer")), ("code", json!("SUMMER15"))],
        ),
        (
            "market_discounts",
            vec![("name", json!("Staff")), ("code", json!(""))],
        ),
        (
            "market_shippingmethods",
            vec![("name", json!("Free Shipping")), ("default", json!(true))],
        ),
        (
            "market_shippingmethods",
            vec![("name", json!("Express Post"))],
        ),
        (
            "market_shippingmethods",
            vec![("name", json!("Express-Post")), ("enabled", json!(false))],
        ),
        (
            "market_addresses",
            vec![
                ("firstName", json!("Ada")),
                ("lastName", json!("Lovelace")),
                ("address1", json!("12 St James's Square")),
                ("city", json!("London")),
                ("zipCode", json!("SW1Y 4JH")),
                ("company", json!("Analytical Engines Ltd")),
            ],
        ),
        (
            "market_addresses",
            vec![
                ("firstName", json!("Ada")),
                ("lastName", json!("Lovelace")),
                ("city", json!("Ockham")),
            ],
        ),
        (
            "market_customers",
            vec![("email", json!("ada@example.test"))],
        ),
        (
            "market_customers",
            vec![("email", json!("guest@example.test"))],
        ),
        (
            "market_orders",
            vec![
                ("number", json!("a1b2c3")),
                ("email", json!("ada@example.test")),
                ("customerId", json!(1)),
                ("billingAddressId", json!(1)),
                ("shippingAddressId", json!(2)),
                ("itemTotal", json!(42.0)),
            ],
        ),
        (
            "market_orders",
            vec![
                ("number", json!("d4e5f6")),
                ("email", json!("ada@example.test")),
                ("customerId", json!(1)),
                ("billingAddressId", json!(1)),
                ("shippingAddressId", json!(1)),
                ("itemTotal", json!(20.0)),
            ],
        ),
        ("market_orders", vec![("number", json!("g7h8i9"))]),
        (
            "market_lineitems",
            vec![
                ("orderId", json!(1)),
                ("purchasableId", json!(1)),
                ("price", json!(20.0)),
                ("qty", json!(1)),
                ("weight", json!(0.3)),
                ("snapshot", json!({"sku": "SHIRT-S"})),
            ],
        ),
        (
            "market_lineitems",
            vec![
                ("orderId", json!(1)),
                ("purchasableId", json!(2)),
                ("price", json!(22.0)),
                ("qty", json!(1)),
            ],
        ),
        (
            "market_lineitems",
            vec![
                ("orderId", json!(2)),
                ("purchasableId", json!(1)),
                ("price", json!(20.0)),
                ("qty", json!(1)),
                ("weight", json!(0.3)),
            ],
        ),
        (
            "market_orderstatuses",
            vec![
                ("name", json!("Processing")),
                ("handle", json!("processing")),
                ("default", json!(true)),
            ],
        ),
        (
            "market_orderstatuses",
            vec![
                ("name", json!("Shipped")),
                ("handle", json!("shipped")),
                ("color", json!("blue")),
            ],
        ),
    ]
}
