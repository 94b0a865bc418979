//! Customer group prices.

use async_trait::async_trait;
use tracing::info;

use super::fields;
use super::{Outcome, ResourceAdapter, Step, StepContext, StepRun};
use crate::config::StepConfig;
use crate::connectors::{ImportKind, Record, SourceQuery};
use crate::error::Result;
use crate::mapping::EntityType;

/// Customer group used when a price row names none.
pub const DEFAULT_PRICE_GROUP: &str = "EK";

/// Imports prices of already migrated variants.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceAdapter;

/// Target customer group of a price row, or `None` if the row must be skipped.
fn customer_group(config: &StepConfig, row: &Record) -> Option<String> {
    match fields::id(row, "pricegroup") {
        Some(group) if !config.price_group.is_empty() => {
            StepConfig::lookup(&config.price_group, &group).map(str::to_string)
        }
        Some(group) => Some(group),
        None => Some(DEFAULT_PRICE_GROUP.to_string()),
    }
}

async fn import_price(ctx: &StepContext<'_>, run: &mut StepRun, mut row: Record) -> Result<()> {
    let Some(group) = customer_group(ctx.config, &row) else {
        run.skip(format!(
            "price group {} is not mapped",
            fields::text(&row, "pricegroup").unwrap_or_default()
        ));
        return Ok(());
    };
    let Some(product_id) = fields::id(&row, "productID") else {
        run.skip("price without product");
        return Ok(());
    };
    let Some(detail_id) = ctx.mappings.get(EntityType::Article, &product_id).await? else {
        run.skip(format!("product {} was not migrated", product_id));
        return Ok(());
    };
    let Some(context) = ctx.target.price_context(&detail_id, &group).await? else {
        run.skip(format!(
            "no price context for variant {} in group {}",
            detail_id, group
        ));
        return Ok(());
    };

    fields::set_text(&mut row, "pricegroup", group);
    fields::set_text(&mut row, "articledetailsID", context.detail_id);
    row.insert("tax".to_string(), context.tax.into());
    fields::convert_net_price(&mut row, "net_price", "price");
    fields::convert_net_price(&mut row, "net_pseudoprice", "pseudoprice");
    if fields::number(&row, "price").is_none() {
        run.skip(format!("price row of product {} has no amount", product_id));
        return Ok(());
    }

    ctx.target.import(ImportKind::Price, row).await?;
    Ok(())
}

#[async_trait]
impl ResourceAdapter for PriceAdapter {
    fn step(&self) -> Step {
        Step::Prices
    }

    async fn execute(&self, ctx: &StepContext<'_>, run: &mut StepRun) -> Result<Outcome> {
        if run.offset() == 0 {
            ctx.target.reset_block_prices().await?;
            info!("Reset block prices to a single tier");
        }

        let cursor = ctx.query(SourceQuery::ProductPrices, run.offset()).await?;
        run.set_remaining(cursor.remaining_count());

        for row in cursor {
            import_price(ctx, run, row).await?;
            if run.row_done() {
                return Ok(Outcome::Yield);
            }
        }
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
#[path = "price_tests.rs"]
mod tests;
