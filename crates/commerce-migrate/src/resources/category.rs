//! Category tree and article-category assignments.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::fields;
use super::{Outcome, ResourceAdapter, Step, StepContext, StepRun};
use crate::config::StepConfig;
use crate::connectors::{decode_identity, ImportKind, Record, SourceQuery};
use crate::error::Result;
use crate::mapping::{CompositeCategoryKey, EntityType, CATEGORY_LANGUAGE_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Categories,
    ArticleCategories,
}

#[derive(Deserialize)]
struct ImportedCategory {
    category_id: String,
}

/// Imports categories and, in a second step, assigns articles to them.
#[derive(Debug, Clone)]
pub struct CategoryAdapter {
    phase: Phase,
}

impl CategoryAdapter {
    /// Adapter for the category tree.
    #[must_use]
    pub fn categories() -> Self {
        Self {
            phase: Phase::Categories,
        }
    }

    /// Adapter for article-category assignments.
    #[must_use]
    pub fn article_categories() -> Self {
        Self {
            phase: Phase::ArticleCategories,
        }
    }

    async fn import_categories(&self, ctx: &StepContext<'_>, run: &mut StepRun) -> Result<Outcome> {
        if run.offset() == 0 {
            let removed = ctx
                .mappings
                .reset(&[EntityType::CategoryTarget, EntityType::Category])
                .await?;
            info!("Cleared {} category mappings from a previous run", removed);
        }

        let cursor = ctx.query(SourceQuery::Categories, run.offset()).await?;
        run.set_remaining(cursor.remaining_count());

        for row in cursor {
            import_category(ctx, run, row).await?;
            if run.row_done() {
                return Ok(Outcome::Yield);
            }
        }

        run.add_param(Step::ArticleCategories.as_str(), true);
        Ok(Outcome::Done)
    }

    async fn assign_articles(&self, ctx: &StepContext<'_>, run: &mut StepRun) -> Result<Outcome> {
        let cursor = ctx.query(SourceQuery::ProductCategories, run.offset()).await?;
        run.set_remaining(cursor.remaining_count());

        for row in cursor {
            assign_article(ctx, run, &row).await?;
            if run.row_done() {
                return Ok(Outcome::Yield);
            }
        }
        Ok(Outcome::Done)
    }
}

/// Finds the target id of a parent category.
///
/// Tries the exact (possibly localized) id, then the raw id, then any
/// language variant of the raw id.
async fn resolve_parent(ctx: &StepContext<'_>, parent_id: &str) -> Result<Option<String>> {
    if let Some(target) = ctx.mappings.get(EntityType::CategoryTarget, parent_id).await? {
        return Ok(Some(target));
    }
    let raw = CompositeCategoryKey::parse(parent_id);
    if raw.language().is_some() {
        if let Some(target) = ctx.mappings.get(EntityType::CategoryTarget, raw.raw()).await? {
            return Ok(Some(target));
        }
    }
    ctx.mappings
        .get_by_prefix(
            EntityType::CategoryTarget,
            &CompositeCategoryKey::language_prefix(raw.raw()),
        )
        .await
}

async fn import_category(ctx: &StepContext<'_>, run: &mut StepRun, mut row: Record) -> Result<()> {
    let Some(raw_id) = fields::id(&row, "categoryID") else {
        run.skip("category without id");
        return Ok(());
    };
    let language = fields::id(&row, "languageID");
    let mut parent_id = fields::id(&row, "parentID");

    let category_id = match language.as_deref() {
        Some(language) if !raw_id.contains(CATEGORY_LANGUAGE_SEPARATOR) => {
            parent_id = parent_id.map(|parent| CompositeCategoryKey::compose(&parent, language));
            CompositeCategoryKey::compose(&raw_id, language)
        }
        _ => raw_id,
    };

    if fields::is_blank(&row, "description") {
        run.skip(format!("category {} has no description", category_id));
        return Ok(());
    }

    let parent = match &parent_id {
        Some(parent_id) => match resolve_parent(ctx, parent_id).await? {
            Some(target) => Some(target),
            None => {
                run.skip(format!(
                    "parent category {} not found, '{}' not created",
                    parent_id,
                    fields::text(&row, "description").unwrap_or_default()
                ));
                return Ok(());
            }
        },
        None => match language
            .as_deref()
            .and_then(|language| StepConfig::lookup(&ctx.config.language, language))
        {
            Some(locale) => ctx.target.locale_root_category(locale).await?,
            None => None,
        },
    };

    fields::set_text(&mut row, "categoryID", category_id.as_str());
    match parent {
        Some(parent) => fields::set_text(&mut row, "parent", parent),
        None => {
            row.remove("parent");
        }
    }
    let meta_title = fields::text(&row, "meta_title");

    let imported: ImportedCategory =
        decode_identity(ImportKind::Category, ctx.target.import(ImportKind::Category, row).await?)?;
    ctx.mappings
        .put(EntityType::CategoryTarget, &category_id, &imported.category_id)
        .await?;
    if let Some(meta_title) = meta_title {
        ctx.target
            .update_category_meta_title(&imported.category_id, &meta_title)
            .await?;
    }
    ctx.mappings
        .put(EntityType::Category, &category_id, &imported.category_id)
        .await?;
    debug!("Category {} -> {}", category_id, imported.category_id);
    Ok(())
}

async fn assign_article(ctx: &StepContext<'_>, run: &mut StepRun, row: &Record) -> Result<()> {
    let (Some(product_id), Some(category_id)) =
        (fields::id(row, "productID"), fields::id(row, "categoryID"))
    else {
        run.skip("assignment without product or category");
        return Ok(());
    };

    let Some(detail_id) = ctx.mappings.get(EntityType::Article, &product_id).await? else {
        run.skip(format!("product {} was not migrated", product_id));
        return Ok(());
    };
    let Some(article_id) = ctx.target.article_for_detail(&detail_id).await? else {
        run.skip(format!("variant {} of product {} not found", detail_id, product_id));
        return Ok(());
    };

    let categories = ctx
        .mappings
        .find_by_id_or_prefix(
            EntityType::Category,
            &category_id,
            &CompositeCategoryKey::language_prefix(&category_id),
        )
        .await?;
    if categories.is_empty() {
        run.skip(format!("category {} was not migrated", category_id));
        return Ok(());
    }

    for category in categories {
        let mut link = Record::new();
        fields::set_text(&mut link, "articleID", article_id.as_str());
        fields::set_text(&mut link, "categoryID", category);
        ctx.target.import(ImportKind::ArticleCategory, link).await?;
    }
    Ok(())
}

#[async_trait]
impl ResourceAdapter for CategoryAdapter {
    fn step(&self) -> Step {
        match self.phase {
            Phase::Categories => Step::Categories,
            Phase::ArticleCategories => Step::ArticleCategories,
        }
    }

    async fn execute(&self, ctx: &StepContext<'_>, run: &mut StepRun) -> Result<Outcome> {
        match self.phase {
            Phase::Categories => self.import_categories(ctx, run).await,
            Phase::ArticleCategories => self.assign_articles(ctx, run).await,
        }
    }
}

#[cfg(test)]
#[path = "category_tests.rs"]
mod tests;
