//! Market 0.8.09 to Commerce 1.0 schema steps.
//!
//! Steps run in the order listed in [`MARKET_UPGRADE_STEPS`]; that list is
//! authoritative even where identifiers would sort differently.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::{anyhow, bail, Context, Result};
use commerce_core::{Column, ColumnKind, Index, PluginContext, Row, Schema};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::base::{
    customer_addresses_table, product_type_locales_table, row, row_id, CUSTOMER_ADDRESSES,
    PRODUCT_TYPE_LOCALES,
};
use crate::plan::{MigrationStep, UpgradePlan};

const LEGACY_PREFIX: &str = "market_";
const TABLE_PREFIX: &str = "commerce_";

const ADDRESSES: &str = "commerce_addresses";
const CUSTOMERS: &str = "commerce_customers";
const DISCOUNTS: &str = "commerce_discounts";
const EMAILS: &str = "commerce_emails";
const LINE_ITEMS: &str = "commerce_lineitems";
const ORDERS: &str = "commerce_orders";
const PAYMENT_METHODS: &str = "commerce_paymentmethods";
const PRODUCTS: &str = "commerce_products";
const PRODUCT_TYPES: &str = "commerce_producttypes";
const SHIPPING_METHODS: &str = "commerce_shippingmethods";
const TAX_CATEGORIES: &str = "commerce_taxcategories";
const TAX_RATES: &str = "commerce_taxrates";
const VARIANTS: &str = "commerce_variants";

const DIMENSIONS: [&str; 4] = ["weight", "height", "width", "length"];

pub static MARKET_UPGRADE_STEPS: &[MigrationStep] = &[
    MigrationStep::new("m150916_010101_Commerce_Rename", rename_legacy_tables),
    MigrationStep::new(
        "m150917_010101_Commerce_DropEmailTypeColumn",
        drop_email_type_column,
    ),
    MigrationStep::new(
        "m150917_010102_Commerce_RenameCodeToHandletaxCatColumn",
        rename_tax_category_code,
    ),
    MigrationStep::new(
        "m150918_010101_Commerce_AddProductTypeLocales",
        add_product_type_locales,
    ),
    MigrationStep::new(
        "m150918_010102_Commerce_RemoveNonLocaleBasedUrlFormat",
        drop_product_type_url_format,
    ),
    MigrationStep::new(
        "m150919_010101_Commerce_AddHasDimensionsToProductType",
        add_product_type_dimensions_flag,
    ),
    MigrationStep::new(
        "m151004_142113_commerce_PaymentMethods_name_unique",
        unique_payment_method_names,
    ),
    MigrationStep::new(
        "m151018_010101_Commerce_DiscountCodeNull",
        nullable_discount_codes,
    ),
    MigrationStep::new(
        "m151025_010101_Commerce_AddHandleToShippingMethod",
        add_shipping_method_handles,
    ),
    MigrationStep::new("m151027_010101_Commerce_NewVariantUI", add_variant_sort_order),
    MigrationStep::new(
        "m151027_010102_Commerce_ProductDateNames",
        rename_product_dates,
    ),
    MigrationStep::new(
        "m151102_010101_Commerce_PaymentTypeInMethodNotSettings",
        move_payment_type_out_of_settings,
    ),
    MigrationStep::new("m151103_010101_Commerce_DefaultVariant", add_default_variants),
    MigrationStep::new(
        "m151109_010101_Commerce_AddCompanyNumberToAddress",
        add_address_company_number,
    ),
    MigrationStep::new(
        "m151110_010101_Commerce_RenameCompanyToAddress",
        rename_address_company_columns,
    ),
    MigrationStep::new(
        "m151111_010101_Commerce_ShowVariantTitleField",
        add_variant_title_field_flag,
    ),
    MigrationStep::new("m151112_010101_Commerce_AutoSkuFormat", add_sku_format),
    MigrationStep::new(
        "m151109_010102_Commerce_AddOptionsToLineItems",
        add_line_item_options,
    ),
    MigrationStep::new("m151117_010101_Commerce_TaxIncluded", add_line_item_tax_included),
    MigrationStep::new(
        "m151124_010101_Commerce_AddressManagement",
        add_customer_address_book,
    ),
    MigrationStep::new(
        "m151127_010101_Commerce_TaxRateTaxableOptions",
        add_tax_rate_taxable,
    ),
    MigrationStep::new(
        "m151210_010101_Commerce_FixMissingLineItemDimensionData",
        fill_line_item_dimensions,
    ),
];

pub fn market_upgrade_plan() -> Result<UpgradePlan> {
    UpgradePlan::new(MARKET_UPGRADE_STEPS.iter().copied())
}

/// Stable digest of a line item's options, used to tell apart line items for
/// the same purchasable.
pub fn options_signature(options: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(options).context("failed to encode line item options")?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn rename_legacy_tables(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    let legacy = schema
        .table_names()
        .filter(|name| name.starts_with(LEGACY_PREFIX))
        .map(str::to_string)
        .collect::<Vec<_>>();
    if legacy.is_empty() {
        bail!("no {LEGACY_PREFIX}* tables found to rename");
    }

    for name in legacy {
        let renamed = format!("{TABLE_PREFIX}{}", &name[LEGACY_PREFIX.len()..]);
        schema.rename_table(&name, &renamed)?;
        for index in &mut schema.table_mut(&renamed)?.indexes {
            if let Some(rest) = index.name.strip_prefix(LEGACY_PREFIX) {
                index.name = format!("{TABLE_PREFIX}{rest}");
            }
        }
    }
    Ok(())
}

fn drop_email_type_column(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.drop_column(EMAILS, "type")
}

fn rename_tax_category_code(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.rename_column(TAX_CATEGORIES, "code", "handle")
}

fn add_product_type_locales(schema: &mut Schema, context: &PluginContext) -> Result<()> {
    if context.site_locales.is_empty() {
        bail!("at least one site locale is required to localise product types");
    }
    schema.create_table(PRODUCT_TYPE_LOCALES, product_type_locales_table())?;

    let product_types = schema
        .table(PRODUCT_TYPES)?
        .rows
        .iter()
        .map(|row| {
            let url_format = row.get("urlFormat").cloned().unwrap_or(Value::Null);
            Ok((row_id(row)?, url_format))
        })
        .collect::<Result<Vec<_>>>()?;

    for (product_type_id, url_format) in product_types {
        for locale in &context.site_locales {
            schema.insert_row(
                PRODUCT_TYPE_LOCALES,
                row(vec![
                    ("productTypeId", json!(product_type_id)),
                    ("locale", json!(locale)),
                    ("urlFormat", url_format.clone()),
                ]),
            )?;
        }
    }
    Ok(())
}

fn drop_product_type_url_format(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.drop_column(PRODUCT_TYPES, "urlFormat")
}

fn add_product_type_dimensions_flag(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        PRODUCT_TYPES,
        Column::new("hasDimensions", ColumnKind::Boolean).with_default(false),
    )?;

    let dimensioned_products = schema
        .table(VARIANTS)?
        .rows
        .iter()
        .filter(|variant| {
            DIMENSIONS
                .iter()
                .any(|name| variant.get(*name).is_some_and(|value| !value.is_null()))
        })
        .filter_map(|variant| variant.get("productId").and_then(Value::as_i64))
        .collect::<HashSet<_>>();

    let mut dimensioned_types = HashSet::new();
    for product in &schema.table(PRODUCTS)?.rows {
        if dimensioned_products.contains(&row_id(product)?) {
            if let Some(type_id) = product.get("typeId").and_then(Value::as_i64) {
                dimensioned_types.insert(type_id);
            }
        }
    }

    for product_type in &mut schema.table_mut(PRODUCT_TYPES)?.rows {
        if dimensioned_types.contains(&row_id(product_type)?) {
            product_type.insert("hasDimensions".to_string(), Value::Bool(true));
        }
    }
    Ok(())
}

fn unique_payment_method_names(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.create_index(
        PAYMENT_METHODS,
        Index::unique("commerce_paymentmethods_name_unq", &["name"]),
    )
}

fn nullable_discount_codes(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.alter_column(DISCOUNTS, "code", |column| column.nullable = true)?;
    for discount in &mut schema.table_mut(DISCOUNTS)?.rows {
        let blank = discount
            .get("code")
            .and_then(Value::as_str)
            .is_some_and(|code| code.trim().is_empty());
        if blank {
            discount.insert("code".to_string(), Value::Null);
        }
    }
    Ok(())
}

fn add_shipping_method_handles(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        SHIPPING_METHODS,
        Column::new("handle", ColumnKind::Text).nullable(),
    )?;

    let mut taken = HashSet::new();
    for method in &mut schema.table_mut(SHIPPING_METHODS)?.rows {
        let name = method
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("shipping method {} has no name", row_id(method).unwrap_or(0)))?;
        let mut stem = handle_from_name(name);
        if stem.is_empty() {
            stem = "shippingMethod".to_string();
        }

        let mut handle = stem.clone();
        let mut suffix = 2;
        while !taken.insert(handle.clone()) {
            handle = format!("{stem}{suffix}");
            suffix += 1;
        }
        method.insert("handle".to_string(), Value::from(handle));
    }

    schema.alter_column(SHIPPING_METHODS, "handle", |column| column.nullable = false)?;
    schema.create_index(
        SHIPPING_METHODS,
        Index::unique("commerce_shippingmethods_handle_unq", &["handle"]),
    )
}

fn add_variant_sort_order(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(VARIANTS, Column::new("sortOrder", ColumnKind::Integer).nullable())?;

    let mut positions: HashMap<i64, i64> = HashMap::new();
    for variant in &mut schema.table_mut(VARIANTS)?.rows {
        let product_id = variant
            .get("productId")
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("variant {} has no productId", row_id(variant).unwrap_or(0)))?;
        let position = positions.entry(product_id).or_insert(0);
        *position += 1;
        variant.insert("sortOrder".to_string(), json!(*position));
    }
    Ok(())
}

fn rename_product_dates(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.rename_column(PRODUCTS, "availableOn", "postDate")?;
    schema.rename_column(PRODUCTS, "expiresOn", "expiryDate")
}

fn move_payment_type_out_of_settings(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        PAYMENT_METHODS,
        Column::new("paymentType", ColumnKind::Text).with_default("purchase"),
    )?;

    for method in &mut schema.table_mut(PAYMENT_METHODS)?.rows {
        let moved = match method.get_mut("settings") {
            Some(Value::Object(settings)) => settings.remove("paymentType"),
            _ => None,
        };
        let Some(payment_type) = moved else {
            continue;
        };

        let payment_type = payment_type
            .as_str()
            .ok_or_else(|| anyhow!("paymentType setting must be a string"))?
            .to_string();
        if !matches!(payment_type.as_str(), "authorize" | "purchase") {
            bail!("unsupported payment type '{payment_type}'");
        }
        method.insert("paymentType".to_string(), Value::from(payment_type));
    }
    Ok(())
}

fn add_default_variants(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        VARIANTS,
        Column::new("isDefault", ColumnKind::Boolean).with_default(false),
    )?;
    schema.add_column(
        PRODUCTS,
        Column::new("defaultVariantId", ColumnKind::Integer).nullable(),
    )?;

    // The master variant becomes the default; products without one fall
    // back to their first variant.
    let variants = &schema.table(VARIANTS)?.rows;
    let mut defaults: BTreeMap<i64, i64> = BTreeMap::new();
    for variant in variants {
        if variant.get("isMaster").and_then(Value::as_bool) != Some(true) {
            continue;
        }
        let product_id = variant_product(variant)?;
        if defaults.insert(product_id, row_id(variant)?).is_some() {
            bail!("product {product_id} has more than one master variant");
        }
    }
    for variant in variants {
        let product_id = variant_product(variant)?;
        let variant_id = row_id(variant)?;
        defaults.entry(product_id).or_insert(variant_id);
    }

    let default_ids = defaults.values().copied().collect::<HashSet<_>>();
    for variant in &mut schema.table_mut(VARIANTS)?.rows {
        if default_ids.contains(&row_id(variant)?) {
            variant.insert("isDefault".to_string(), Value::Bool(true));
        }
    }
    for product in &mut schema.table_mut(PRODUCTS)?.rows {
        if let Some(variant_id) = defaults.get(&row_id(product)?) {
            product.insert("defaultVariantId".to_string(), json!(variant_id));
        }
    }

    schema.drop_column(VARIANTS, "isMaster")
}

fn variant_product(variant: &Row) -> Result<i64> {
    variant
        .get("productId")
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("variant {} has no productId", row_id(variant).unwrap_or(0)))
}

fn add_address_company_number(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        ADDRESSES,
        Column::new("companyNumber", ColumnKind::Text).nullable(),
    )
}

fn rename_address_company_columns(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.rename_column(ADDRESSES, "company", "businessName")?;
    schema.rename_column(ADDRESSES, "companyNumber", "businessTaxId")
}

fn add_variant_title_field_flag(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        PRODUCT_TYPES,
        Column::new("hasVariantTitleField", ColumnKind::Boolean).with_default(true),
    )?;
    for product_type in &mut schema.table_mut(PRODUCT_TYPES)?.rows {
        let has_variants = product_type
            .get("hasVariants")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        product_type.insert(
            "hasVariantTitleField".to_string(),
            Value::Bool(has_variants),
        );
    }
    Ok(())
}

fn add_sku_format(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        PRODUCT_TYPES,
        Column::new("skuFormat", ColumnKind::Text).nullable(),
    )
}

fn add_line_item_options(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        LINE_ITEMS,
        Column::new("options", ColumnKind::Json).with_default(json!({})),
    )?;
    schema.add_column(
        LINE_ITEMS,
        Column::new("optionsSignature", ColumnKind::Text).nullable(),
    )?;

    for line_item in &mut schema.table_mut(LINE_ITEMS)?.rows {
        let signature = options_signature(line_item.get("options").unwrap_or(&Value::Null))?;
        line_item.insert("optionsSignature".to_string(), Value::from(signature));
    }
    schema.alter_column(LINE_ITEMS, "optionsSignature", |column| {
        column.nullable = false
    })
}

fn add_line_item_tax_included(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        LINE_ITEMS,
        Column::new("taxIncluded", ColumnKind::Decimal).with_default(0),
    )
}

fn add_customer_address_book(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.create_table(CUSTOMER_ADDRESSES, customer_addresses_table())?;
    schema.add_column(
        CUSTOMERS,
        Column::new("lastUsedBillingAddressId", ColumnKind::Integer).nullable(),
    )?;
    schema.add_column(
        CUSTOMERS,
        Column::new("lastUsedShippingAddressId", ColumnKind::Integer).nullable(),
    )?;

    let mut links = BTreeSet::new();
    let mut last_used: BTreeMap<i64, (i64, Option<i64>, Option<i64>)> = BTreeMap::new();
    for order in &schema.table(ORDERS)?.rows {
        let Some(customer_id) = order.get("customerId").and_then(Value::as_i64) else {
            continue;
        };
        let order_id = row_id(order)?;
        let billing = order.get("billingAddressId").and_then(Value::as_i64);
        let shipping = order.get("shippingAddressId").and_then(Value::as_i64);
        for address_id in [billing, shipping].into_iter().flatten() {
            links.insert((customer_id, address_id));
        }

        let latest = last_used
            .entry(customer_id)
            .or_insert((order_id, billing, shipping));
        if order_id > latest.0 {
            *latest = (order_id, billing, shipping);
        }
    }

    for (customer_id, address_id) in links {
        schema.insert_row(
            CUSTOMER_ADDRESSES,
            row(vec![
                ("customerId", json!(customer_id)),
                ("addressId", json!(address_id)),
            ]),
        )?;
    }
    for customer in &mut schema.table_mut(CUSTOMERS)?.rows {
        if let Some((_, billing, shipping)) = last_used.get(&row_id(customer)?) {
            customer.insert("lastUsedBillingAddressId".to_string(), json!(billing));
            customer.insert("lastUsedShippingAddressId".to_string(), json!(shipping));
        }
    }
    Ok(())
}

fn add_tax_rate_taxable(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    schema.add_column(
        TAX_RATES,
        Column::new("taxable", ColumnKind::Text).with_default("price"),
    )
}

fn fill_line_item_dimensions(schema: &mut Schema, _context: &PluginContext) -> Result<()> {
    for line_item in &mut schema.table_mut(LINE_ITEMS)?.rows {
        for name in DIMENSIONS {
            if line_item.get(name).map_or(true, Value::is_null) {
                line_item.insert(name.to_string(), json!(0));
            }
        }
    }
    for name in DIMENSIONS {
        schema.alter_column(LINE_ITEMS, name, |column| {
            column.nullable = false;
            column.default = Some(json!(0));
        })?;
    }
    Ok(())
}

/// `"Express Post"` becomes `"expressPost"`.
pub(crate) fn handle_from_name(name: &str) -> String {
    let mut handle = String::new();
    let words = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty());
    for (position, word) in words.enumerate() {
        let lower = word.to_ascii_lowercase();
        if position == 0 {
            handle.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            handle.push(first.to_ascii_uppercase());
            handle.push_str(chars.as_str());
        }
    }
    handle
}
