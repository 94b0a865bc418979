//! Source and target profile connectors.
//!
//! A source profile answers ordered row queries starting at an offset. A
//! target profile accepts one record per `import` call and exposes the few
//! lookups and maintenance writes the resource adapters need.

pub mod json_file;
pub mod memory_target;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::error::{Error, Result};

/// A single source or target row.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Row sets a source profile can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceQuery {
    /// Category tree, parents before children.
    Categories,
    /// Product to category assignments.
    ProductCategories,
    /// Customer group prices.
    ProductPrices,
    /// Products and variants, parents before children.
    Products,
    /// Customer accounts.
    Customers,
}

impl SourceQuery {
    /// Key of the row set in a source document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::ProductCategories => "product_categories",
            Self::ProductPrices => "prices",
            Self::Products => "products",
            Self::Customers => "customers",
        }
    }
}

impl fmt::Display for SourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward-only cursor over the rows returned by one query.
#[derive(Debug, Clone, Default)]
pub struct RowCursor {
    rows: VecDeque<Record>,
}

impl RowCursor {
    /// Wraps already fetched rows.
    #[must_use]
    pub fn new(rows: impl IntoIterator<Item = Record>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    /// Rows not yet consumed.
    #[must_use]
    pub fn remaining_count(&self) -> u64 {
        self.rows.len() as u64
    }
}

impl Iterator for RowCursor {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.rows.pop_front()
    }
}

/// Trait for source profiles.
///
/// Implementations must return rows in a stable order so that an offset
/// identifies the same row across invocations.
#[async_trait]
pub trait SourceProfile: Send + Sync {
    /// Profile name of the source system.
    fn profile_name(&self) -> &str;

    /// Rows of `query`, skipping the first `offset`.
    async fn query(&self, query: SourceQuery, offset: u64) -> Result<RowCursor>;

    /// Extra fields to merge into a product row, if the source keeps any.
    async fn additional_product_info(&self, product_id: &str) -> Result<Option<Record>>;
}

/// Entity kinds accepted by [`TargetProfile::import`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    /// Category. Returns `category_id`.
    Category,
    /// Article to category link. Expects `articleID` and `categoryID`.
    ArticleCategory,
    /// Customer group price. Returns `price_id`.
    Price,
    /// Article or variant. Returns `article_id`, `detail_id` and `kind`.
    Article,
    /// Customer account. Returns `user_id`.
    Customer,
}

/// Price context of a mapped variant for one customer group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceContext {
    /// Target variant id.
    pub detail_id: String,
    /// Tax rate to add to net prices; zero when the group is not taxed on input.
    pub tax: f64,
}

/// Trait for target profiles.
#[async_trait]
pub trait TargetProfile: Send + Sync {
    /// Profile name of the target system.
    fn profile_name(&self) -> &str;

    /// Writes one record and returns the identity fields it was assigned.
    async fn import(&self, kind: ImportKind, record: Record) -> Result<Record>;

    /// Root category of the shop using `locale`.
    async fn locale_root_category(&self, locale: &str) -> Result<Option<String>>;

    /// Overwrites the meta title of a category.
    async fn update_category_meta_title(&self, category_id: &str, meta_title: &str) -> Result<()>;

    /// Article owning a variant.
    async fn article_for_detail(&self, detail_id: &str) -> Result<Option<String>>;

    /// Drops graduated prices, leaving one unconditional tier per variant and group.
    async fn reset_block_prices(&self) -> Result<()>;

    /// Tax context for pricing a variant in a customer group.
    async fn price_context(&self, detail_id: &str, customer_group: &str)
        -> Result<Option<PriceContext>>;

    /// Returns true if the variant carries configurator options.
    async fn has_configurator_options(&self, detail_id: &str) -> Result<bool>;

    /// Deletes `placeholder`, points `article_id` at `new_main` and marks it primary.
    ///
    /// When the placeholder belonged to another article that is now without
    /// variants, that article is deleted too. Must be atomic. Calling it again
    /// after success is a no-op.
    async fn replace_main_detail(
        &self,
        placeholder: &str,
        new_main: &str,
        article_id: &str,
    ) -> Result<()>;

    /// Writes the long description and meta title of an article.
    async fn update_article_description(
        &self,
        article_id: &str,
        description_long: &str,
        meta_title: Option<&str>,
    ) -> Result<()>;

    /// Replaces the links of an article. `None` only removes them.
    async fn replace_article_link(
        &self,
        article_id: &str,
        link: Option<(&str, &str)>,
    ) -> Result<()>;

    /// Country id for an ISO code.
    async fn country_id(&self, iso: &str) -> Result<Option<String>>;

    /// Payment method used when a customer has none.
    async fn default_payment_id(&self) -> Result<Option<String>>;

    /// Locale of a shop.
    async fn shop_locale(&self, shop_id: &str) -> Result<Option<String>>;

    /// Sets the shipping address of a customer, replacing an earlier one.
    async fn upsert_shipping_address(&self, user_id: &str, address: Record) -> Result<()>;

    /// Sets the bank debit details of a customer, replacing earlier ones.
    async fn upsert_debit(&self, user_id: &str, debit: Record) -> Result<()>;
}

/// Decodes the identity fields returned by [`TargetProfile::import`].
///
/// # Errors
///
/// Returns a target error if the fields are missing or mistyped.
pub fn decode_identity<T: DeserializeOwned>(kind: ImportKind, record: Record) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(record))
        .map_err(|e| Error::Target(format!("unexpected {:?} import result: {}", kind, e)))
}

/// Create a source profile from configuration.
///
/// # Errors
///
/// Returns an error if the source cannot be opened.
pub fn create_source(profile: &crate::config::ProfileConfig) -> Result<Box<dyn SourceProfile>> {
    match &profile.source {
        crate::config::SourceConfig::JsonFile(cfg) => Ok(Box::new(
            json_file::JsonFileSource::open(&profile.name, cfg)?,
        )),
    }
}
