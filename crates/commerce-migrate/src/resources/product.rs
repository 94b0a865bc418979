//! Articles and their variants.
//!
//! Some source systems model variants as children of a master product that is
//! not sellable itself. The master is imported first and becomes a placeholder
//! variant; when its first real child arrives and the placeholder carries no
//! configurator options, the child replaces it as the primary variant.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::fields;
use super::{Outcome, ResourceAdapter, Step, StepContext, StepRun};
use crate::config::{NumberValidationMode, StepConfig};
use crate::connectors::{decode_identity, ImportKind, Record, SourceQuery};
use crate::error::Result;
use crate::mapping::EntityType;

/// Longest accepted order number.
pub const MAX_ORDER_NUMBER_LEN: usize = 30;

/// Customer group of the product-level price.
const PRODUCT_PRICE_GROUP: &str = "EK";

/// Imports articles and variants.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductAdapter;

#[derive(Deserialize)]
struct ImportedArticle {
    article_id: String,
    detail_id: String,
    kind: u8,
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
}

/// Returns true if `number` is non-empty, short enough and uses only allowed characters.
#[must_use]
pub fn is_valid_order_number(number: &str) -> bool {
    !number.is_empty() && number.len() <= MAX_ORDER_NUMBER_LEN && number.chars().all(is_allowed)
}

fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| if is_allowed(c) { c } else { '-' })
        .collect()
}

/// Rewrites an invalid order number into a valid one.
///
/// Disallowed characters become `-`. An empty number becomes `sw-<source id>`.
/// A number that is too long is cut and suffixed with `-<source id>` so that
/// different products truncated to the same prefix stay distinct.
#[must_use]
pub fn make_valid_order_number(number: &str, source_id: &str) -> String {
    let base = sanitize(number);
    let id = sanitize(source_id);

    let mut valid = if base.is_empty() {
        format!("sw-{}", id)
    } else if base.len() <= MAX_ORDER_NUMBER_LEN {
        base
    } else {
        let suffix = format!("-{}", id);
        let keep = MAX_ORDER_NUMBER_LEN.saturating_sub(suffix.len());
        format!("{}{}", &base[..keep], suffix)
    };
    // sanitized strings are ASCII, so byte truncation is safe
    valid.truncate(MAX_ORDER_NUMBER_LEN);
    valid
}

fn invalid_number_message(number: &str) -> String {
    format!(
        "The product number '{}' is not valid. A valid product number is not empty, \
         has at most {} characters and only contains a-z A-Z 0-9 - _ . and space. \
         Use number_validation_mode make_valid to rewrite invalid numbers.",
        number, MAX_ORDER_NUMBER_LEN
    )
}

/// Moves attribute fields to their target names. An empty target name drops the field.
fn remap_attributes(config: &StepConfig, row: &mut Record) {
    for (source, target) in &config.attribute {
        let Some(value) = row.remove(source) else {
            continue;
        };
        if !target.is_empty() {
            row.insert(target.clone(), value);
        }
    }
}

fn remap_tax(config: &StepConfig, row: &mut Record) {
    if config.tax_rate.is_empty() {
        return;
    }
    let Some(tax_id) = fields::text(row, "taxID") else {
        return;
    };
    match StepConfig::lookup(&config.tax_rate, &tax_id) {
        Some(target) => fields::set_text(row, "taxID", target),
        None => {
            row.remove("taxID");
        }
    }
}

async fn import_product(
    ctx: &StepContext<'_>,
    run: &mut StepRun,
    mut row: Record,
) -> Result<Option<Outcome>> {
    let Some(product_id) = fields::id(&row, "productID") else {
        run.skip("product without id");
        return Ok(None);
    };

    if let Some(info) = ctx.source.additional_product_info(&product_id).await? {
        row.extend(info);
    }

    if fields::is_blank(&row, "variant_group_names") {
        if let Some(text) = fields::text(&row, "additionaltext") {
            if let Some(groups) =
                StepConfig::lookup(&ctx.config.configurator_mapping, &fields::title_case(&text))
            {
                fields::set_text(&mut row, "variant_group_names", groups);
            }
        }
    }

    let number = fields::text(&row, "ordernumber").unwrap_or_default();
    let mut synthetic_number = false;
    match ctx.config.number_validation_mode {
        NumberValidationMode::Ignore if number.is_empty() => {
            run.skip(format!("product {} has no order number", product_id));
            return Ok(None);
        }
        NumberValidationMode::Ignore => {}
        _ if is_valid_order_number(&number) => {}
        NumberValidationMode::Complain => {
            return Ok(Some(Outcome::Failed(invalid_number_message(&number))));
        }
        NumberValidationMode::MakeValid => {
            let valid = make_valid_order_number(&number, &product_id);
            debug!("Order number '{}' rewritten to '{}'", number, valid);
            fields::set_text(&mut row, "ordernumber", valid);
            synthetic_number = true;
        }
    }

    remap_attributes(ctx.config, &mut row);
    remap_tax(ctx.config, &mut row);

    if fields::is_blank(&row, "supplierID") && fields::is_blank(&row, "supplier") {
        if let Some(supplier) = ctx.config.default_supplier() {
            fields::set_text(&mut row, "supplier", supplier);
        }
    }

    let mut main_detail = None;
    if let Some(parent_id) = fields::id(&row, "parentID") {
        main_detail = ctx.mappings.get(EntityType::Article, &parent_id).await?;
        match &main_detail {
            Some(detail) => fields::set_text(&mut row, "maindetailsID", detail.as_str()),
            None => warn!(
                "Parent {} of product {} was not migrated, importing it standalone",
                parent_id, product_id
            ),
        }
    }

    let description_long = fields::text(&row, "description_long");
    row.remove("description_long");
    if let Some(description) = fields::text(&row, "description") {
        fields::set_text(&mut row, "description", fields::strip_tags(&description));
    }
    let meta_title = fields::text(&row, "meta_title");

    let imported: ImportedArticle = decode_identity(
        ImportKind::Article,
        ctx.target.import(ImportKind::Article, row.clone()).await?,
    )?;

    if let Some(placeholder) = main_detail.filter(|main| *main != imported.detail_id) {
        if !ctx.target.has_configurator_options(&placeholder).await? {
            promote_variant(ctx, &placeholder, &imported).await?;
        }
    }

    if imported.kind == 1 {
        if let Some(description_long) = &description_long {
            ctx.target
                .update_article_description(
                    &imported.article_id,
                    description_long,
                    meta_title.as_deref(),
                )
                .await?;
        }
    }

    fields::convert_net_price(&mut row, "net_price", "price");
    if let Some(price) = fields::number(&row, "price") {
        let mut tier = Record::new();
        fields::set_text(&mut tier, "articledetailsID", imported.detail_id.as_str());
        fields::set_text(&mut tier, "pricegroup", PRODUCT_PRICE_GROUP);
        tier.insert("price".to_string(), price.into());
        if let Some(pseudoprice) = fields::number(&row, "pseudoprice") {
            tier.insert("pseudoprice".to_string(), pseudoprice.into());
        }
        ctx.target.import(ImportKind::Price, tier).await?;
    }

    if row.contains_key("link") {
        let link = fields::text(&row, "link");
        let description = fields::text(&row, "link_description");
        let pair = link
            .as_deref()
            .map(|link| (link, description.as_deref().unwrap_or(link)));
        ctx.target
            .replace_article_link(&imported.article_id, pair)
            .await?;
    }

    if synthetic_number {
        debug!("Product {} has a rewritten number, mapping not stored", product_id);
    } else {
        ctx.mappings
            .put(EntityType::Article, &product_id, &imported.detail_id)
            .await?;
    }
    Ok(None)
}

/// Replaces a placeholder primary variant with a real one.
///
/// The target swap runs first and is repeatable, then every mapping that
/// pointed at the placeholder is moved to the new variant. A retry after a
/// failure between the two finds the placeholder gone and only redoes the
/// mapping rewrite.
async fn promote_variant(
    ctx: &StepContext<'_>,
    placeholder: &str,
    imported: &ImportedArticle,
) -> Result<()> {
    ctx.target
        .replace_main_detail(placeholder, &imported.detail_id, &imported.article_id)
        .await?;
    let moved = ctx
        .mappings
        .reassign_target(EntityType::Article, placeholder, &imported.detail_id)
        .await?;
    info!(
        "Variant {} replaced placeholder {} of article {} ({} mappings moved)",
        imported.detail_id, placeholder, imported.article_id, moved
    );
    Ok(())
}

#[async_trait]
impl ResourceAdapter for ProductAdapter {
    fn step(&self) -> Step {
        Step::Products
    }

    async fn execute(&self, ctx: &StepContext<'_>, run: &mut StepRun) -> Result<Outcome> {
        let cursor = ctx.query(SourceQuery::Products, run.offset()).await?;
        run.set_remaining(cursor.remaining_count());

        for row in cursor {
            if let Some(outcome) = import_product(ctx, run, row).await? {
                return Ok(outcome);
            }
            if run.row_done() {
                return Ok(Outcome::Yield);
            }
        }
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
#[path = "product_tests.rs"]
mod tests;
