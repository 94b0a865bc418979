//! Customer accounts with shipping addresses and bank debit details.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::fields;
use super::{Outcome, ResourceAdapter, Step, StepContext, StepRun};
use crate::config::StepConfig;
use crate::connectors::{decode_identity, ImportKind, Record, SourceQuery};
use crate::error::Result;
use crate::mapping::EntityType;

const SHIPPING_NAME_FIELDS: [&str; 3] = ["shipping_company", "shipping_firstname", "shipping_lastname"];

const SHIPPING_ADDRESS_FIELDS: [&str; 8] = [
    "company",
    "department",
    "salutation",
    "firstname",
    "lastname",
    "street",
    "zipcode",
    "city",
];

const DEBIT_FIELDS: [&str; 4] = ["account", "bankcode", "bankholder", "bankname"];

/// Imports customer accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerAdapter;

#[derive(Deserialize)]
struct ImportedCustomer {
    user_id: String,
}

/// Replaces `key` by its mapped value, or removes it when unmapped.
fn remap_or_drop(map: &BTreeMap<String, String>, row: &mut Record, key: &str) {
    let mapped = fields::id(row, key)
        .and_then(|value| StepConfig::lookup(map, &value).map(str::to_string));
    match mapped {
        Some(value) => fields::set_text(row, key, value),
        None => {
            row.remove(key);
        }
    }
}

async fn resolve_country(ctx: &StepContext<'_>, row: &mut Record, prefix: &str) -> Result<()> {
    let Some(iso) = fields::text(row, &format!("{}_countryiso", prefix)) else {
        return Ok(());
    };
    match ctx.target.country_id(&iso).await? {
        Some(id) => fields::set_text(row, &format!("{}_countryID", prefix), id),
        None => debug!("Unknown {} country '{}'", prefix, iso),
    }
    Ok(())
}

/// Splits a separate shipping address off the row.
fn take_shipping_address(row: &mut Record) -> Option<Record> {
    if SHIPPING_NAME_FIELDS.iter().all(|key| fields::is_blank(row, key)) {
        return None;
    }
    let mut address = Record::new();
    for field in SHIPPING_ADDRESS_FIELDS {
        let value = fields::text(row, &format!("shipping_{}", field)).unwrap_or_default();
        fields::set_text(&mut address, field, value);
    }
    let country = fields::id(row, "shipping_countryID").map_or(Value::from(0), Value::from);
    address.insert("countryID".to_string(), country);
    for key in SHIPPING_NAME_FIELDS {
        fields::set_text(row, key, "");
    }
    Some(address)
}

fn debit_details(row: &Record) -> Option<Record> {
    if DEBIT_FIELDS.iter().any(|key| fields::is_blank(row, key)) {
        return None;
    }
    Some(
        DEBIT_FIELDS
            .iter()
            .filter_map(|key| row.get(*key).map(|value| ((*key).to_string(), value.clone())))
            .collect(),
    )
}

async fn import_customer(ctx: &StepContext<'_>, run: &mut StepRun, mut row: Record) -> Result<()> {
    let Some(customer_id) = fields::id(&row, "customerID") else {
        run.skip("customer without id");
        return Ok(());
    };
    let config = ctx.config;

    if let Some(group) = fields::id(&row, "customergroupID")
        .and_then(|group| StepConfig::lookup(&config.customer_group, &group).map(str::to_string))
    {
        fields::set_text(&mut row, "customergroup", group);
    }
    row.remove("customergroupID");
    remap_or_drop(&config.shop, &mut row, "subshopID");
    remap_or_drop(&config.language, &mut row, "language");

    resolve_country(ctx, &mut row, "billing").await?;
    resolve_country(ctx, &mut row, "shipping").await?;

    if !row.contains_key("paymentID") {
        if let Some(payment) = ctx.target.default_payment_id().await? {
            fields::set_text(&mut row, "paymentID", payment);
        }
    }

    if let (Some(hash), Some(salt)) = (fields::text(&row, "md5_password"), config.salt()) {
        fields::set_text(&mut row, "md5_password", format!("{}:{}", hash, salt));
    }

    if fields::is_blank(&row, "language") {
        if let Some(shop) = fields::id(&row, "subshopID") {
            if let Some(locale) = ctx.target.shop_locale(&shop).await? {
                fields::set_text(&mut row, "language", locale);
            }
        }
    }

    if let (Some(street), Some(number)) = (
        fields::text(&row, "billing_street"),
        fields::text(&row, "billing_streetnumber"),
    ) {
        fields::set_text(&mut row, "billing_street", format!("{} {}", street, number));
    }

    let shipping = take_shipping_address(&mut row);
    let debit = debit_details(&row);

    let imported: ImportedCustomer =
        decode_identity(ImportKind::Customer, ctx.target.import(ImportKind::Customer, row).await?)?;

    if let Some(address) = shipping {
        ctx.target
            .upsert_shipping_address(&imported.user_id, address)
            .await?;
    }
    if let Some(debit) = debit {
        ctx.target.upsert_debit(&imported.user_id, debit).await?;
    }

    ctx.mappings
        .put(EntityType::Customer, &customer_id, &imported.user_id)
        .await?;
    Ok(())
}

#[async_trait]
impl ResourceAdapter for CustomerAdapter {
    fn step(&self) -> Step {
        Step::Customers
    }

    async fn execute(&self, ctx: &StepContext<'_>, run: &mut StepRun) -> Result<Outcome> {
        let cursor = ctx.query(SourceQuery::Customers, run.offset()).await?;
        run.set_remaining(cursor.remaining_count());

        for row in cursor {
            import_customer(ctx, run, row).await?;
            if run.row_done() {
                return Ok(Outcome::Yield);
            }
        }
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
#[path = "customer_tests.rs"]
mod tests;
