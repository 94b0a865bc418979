//! In-memory target profile with JSON snapshots.
//!
//! Models the subset of a shop schema the resource adapters write to:
//! categories, articles with variants, customer group prices and customers.
//! Every operation runs under one lock, so multi-part writes are atomic.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

use crate::connectors::{ImportKind, PriceContext, Record, TargetProfile};
use crate::error::{Error, Result};

/// Customer group of the target shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerGroup {
    /// Prices of this group are entered gross and need tax added.
    pub tax_input: bool,
}

/// Shop of the target system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    /// Locale id.
    pub locale: String,
    /// Root category id.
    pub root_category: String,
}

/// Stored category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Display name.
    pub name: String,
    /// Parent category id.
    pub parent: Option<String>,
    /// Meta title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
}

/// Stored article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Primary variant.
    pub main_detail_id: String,
    /// Tax id.
    pub tax_id: Option<String>,
    /// Remaining article fields.
    #[serde(default)]
    pub fields: Record,
    /// Links as `(link, description)`.
    #[serde(default)]
    pub links: Vec<(String, String)>,
}

/// Stored variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detail {
    /// Owning article.
    pub article_id: String,
    /// Order number, unique across variants.
    pub ordernumber: String,
    /// 1 for the primary variant, 2 otherwise.
    pub kind: u8,
    /// Configurator option names.
    #[serde(default)]
    pub configurator_options: Vec<String>,
}

/// Stored price tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTier {
    /// Variant id.
    pub detail_id: String,
    /// Customer group key.
    pub customer_group: String,
    /// First quantity of the tier.
    pub from: u64,
    /// Last quantity; `None` is unbounded.
    pub to: Option<u64>,
    /// Gross price.
    pub price: f64,
    /// Gross pseudo price.
    pub pseudoprice: Option<f64>,
}

/// Complete state of the in-memory target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetState {
    /// ISO code -> country id.
    pub countries: BTreeMap<String, String>,
    /// Customer group key -> group.
    pub customer_groups: BTreeMap<String, CustomerGroup>,
    /// Tax id -> rate in percent.
    pub tax_rates: BTreeMap<String, f64>,
    /// Tax id used when an article has none.
    pub default_tax_id: Option<String>,
    /// Shop id -> shop.
    pub shops: BTreeMap<String, Shop>,
    /// Payment id used when a customer has none.
    pub default_payment_id: Option<String>,
    /// Categories by id.
    pub categories: BTreeMap<String, Category>,
    /// `(article_id, category_id)` links.
    pub article_categories: BTreeSet<(String, String)>,
    /// Articles by id.
    pub articles: BTreeMap<String, Article>,
    /// Variants by id.
    pub details: BTreeMap<String, Detail>,
    /// Price tiers by id.
    pub prices: BTreeMap<String, PriceTier>,
    /// Customers by id.
    pub customers: BTreeMap<String, Record>,
    /// Shipping address by customer id.
    pub shipping_addresses: BTreeMap<String, Record>,
    /// Debit record by customer id.
    pub debits: BTreeMap<String, Record>,
    next_id: u64,
}

impl TargetState {
    /// A small shop: one German store, `EK` and `H` customer groups, 19% and 7% tax.
    #[must_use]
    pub fn seeded() -> Self {
        let mut state = Self {
            next_id: 100,
            ..Self::default()
        };
        state.countries.insert("DE".to_string(), "2".to_string());
        state.countries.insert("AT".to_string(), "23".to_string());
        state
            .customer_groups
            .insert("EK".to_string(), CustomerGroup { tax_input: true });
        state
            .customer_groups
            .insert("H".to_string(), CustomerGroup { tax_input: false });
        state.tax_rates.insert("1".to_string(), 19.0);
        state.tax_rates.insert("4".to_string(), 7.0);
        state.default_tax_id = Some("1".to_string());
        state.shops.insert(
            "1".to_string(),
            Shop {
                locale: "1".to_string(),
                root_category: "3".to_string(),
            },
        );
        state.categories.insert(
            "3".to_string(),
            Category {
                name: "Deutsch".to_string(),
                parent: None,
                meta_title: None,
            },
        );
        state.default_payment_id = Some("5".to_string());
        state
    }

    fn allocate(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn detail_by_number(&self, ordernumber: &str) -> Option<String> {
        self.details
            .iter()
            .find(|(_, d)| d.ordernumber == ordernumber)
            .map(|(id, _)| id.clone())
    }
}

/// Target profile holding its state in memory.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    state: Mutex<TargetState>,
}

fn text(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(record: &Record, key: &str) -> Option<f64> {
    match record.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn identity(fields: &[(&str, serde_json::Value)]) -> Record {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn required(record: &Record, key: &str, kind: ImportKind) -> Result<String> {
    text(record, key).ok_or_else(|| Error::Target(format!("{:?} import needs '{}'", kind, key)))
}

impl MemoryTarget {
    /// Creates a target with the given state.
    #[must_use]
    pub fn new(state: TargetState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Creates a target with [`TargetState::seeded`].
    #[must_use]
    pub fn seeded() -> Self {
        Self::new(TargetState::seeded())
    }

    /// Loads a snapshot, or seeds a fresh target when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read.
    pub fn load_or_seed(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::seeded());
        }
        let reader = BufReader::new(File::open(path)?);
        let state: TargetState = serde_json::from_reader(reader)?;
        Ok(Self::new(state))
    }

    /// Writes the current state as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.lock().clone();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &state)?;
        Ok(())
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> TargetState {
        self.state.lock().clone()
    }

    fn import_category(state: &mut TargetState, record: &Record) -> Result<Record> {
        let name = required(record, "description", ImportKind::Category)?;
        let parent = text(record, "parent");
        if let Some(parent) = &parent {
            if !state.categories.contains_key(parent) {
                return Err(Error::Target(format!("parent category {} does not exist", parent)));
            }
        }
        let existing = state
            .categories
            .iter()
            .find(|(_, c)| c.name == name && c.parent == parent)
            .map(|(id, _)| id.clone());
        let id = match existing {
            Some(id) => id,
            None => {
                let id = state.allocate();
                state.categories.insert(
                    id.clone(),
                    Category {
                        name,
                        parent,
                        meta_title: None,
                    },
                );
                id
            }
        };
        Ok(identity(&[("category_id", id.into())]))
    }

    fn import_article(state: &mut TargetState, record: Record) -> Result<Record> {
        let ordernumber = required(&record, "ordernumber", ImportKind::Article)?;
        let options: Vec<String> = text(&record, "additionaltext").into_iter().collect();
        let tax_id = text(&record, "taxID");

        if let Some(detail_id) = state.detail_by_number(&ordernumber) {
            let detail = state
                .details
                .get_mut(&detail_id)
                .ok_or_else(|| Error::Target(format!("detail {} vanished", detail_id)))?;
            detail.configurator_options = options;
            let kind = detail.kind;
            let article_id = detail.article_id.clone();
            if let Some(article) = state.articles.get_mut(&article_id) {
                if kind == 1 {
                    article.fields.extend(record);
                    if tax_id.is_some() {
                        article.tax_id = tax_id;
                    }
                }
            }
            return Ok(identity(&[
                ("article_id", article_id.into()),
                ("detail_id", detail_id.into()),
                ("kind", kind.into()),
            ]));
        }

        let parent_article = text(&record, "maindetailsID")
            .and_then(|main| state.details.get(&main).map(|d| d.article_id.clone()));

        let detail_id = state.allocate();
        let (article_id, kind) = match parent_article {
            Some(article_id) => (article_id, 2u8),
            None => {
                let article_id = state.allocate();
                state.articles.insert(
                    article_id.clone(),
                    Article {
                        main_detail_id: detail_id.clone(),
                        tax_id,
                        fields: record,
                        links: Vec::new(),
                    },
                );
                (article_id, 1u8)
            }
        };
        state.details.insert(
            detail_id.clone(),
            Detail {
                article_id: article_id.clone(),
                ordernumber,
                kind,
                configurator_options: options,
            },
        );
        Ok(identity(&[
            ("article_id", article_id.into()),
            ("detail_id", detail_id.into()),
            ("kind", kind.into()),
        ]))
    }

    fn import_price(state: &mut TargetState, record: &Record) -> Result<Record> {
        let detail_id = required(record, "articledetailsID", ImportKind::Price)?;
        if !state.details.contains_key(&detail_id) {
            return Err(Error::Target(format!("variant {} does not exist", detail_id)));
        }
        let customer_group = text(record, "pricegroup").unwrap_or_else(|| "EK".to_string());
        let price = number(record, "price")
            .ok_or_else(|| Error::Target("Price import needs 'price'".to_string()))?;
        let from = number(record, "from").map_or(1, |f| f.max(1.0) as u64);
        let tier = PriceTier {
            detail_id,
            customer_group,
            from,
            to: number(record, "to").map(|t| t as u64),
            price,
            pseudoprice: number(record, "pseudoprice"),
        };
        let existing = state
            .prices
            .iter()
            .find(|(_, p)| {
                p.detail_id == tier.detail_id
                    && p.customer_group == tier.customer_group
                    && p.from == tier.from
            })
            .map(|(id, _)| id.clone());
        let id = existing.unwrap_or_else(|| state.allocate());
        state.prices.insert(id.clone(), tier);
        Ok(identity(&[("price_id", id.into())]))
    }

    fn import_customer(state: &mut TargetState, record: Record) -> Result<Record> {
        let email = text(&record, "email");
        let existing = email.as_ref().and_then(|email| {
            state
                .customers
                .iter()
                .find(|(_, c)| text(c, "email").as_ref() == Some(email))
                .map(|(id, _)| id.clone())
        });
        let id = existing.unwrap_or_else(|| state.allocate());
        state.customers.insert(id.clone(), record);
        Ok(identity(&[("user_id", id.into())]))
    }
}

#[async_trait]
impl TargetProfile for MemoryTarget {
    fn profile_name(&self) -> &str {
        "memory"
    }

    async fn import(&self, kind: ImportKind, record: Record) -> Result<Record> {
        let mut state = self.state.lock();
        let result = match kind {
            ImportKind::Category => Self::import_category(&mut state, &record),
            ImportKind::Article => Self::import_article(&mut state, record),
            ImportKind::Price => Self::import_price(&mut state, &record),
            ImportKind::Customer => Self::import_customer(&mut state, record),
            ImportKind::ArticleCategory => {
                let article_id = required(&record, "articleID", kind)?;
                let category_id = required(&record, "categoryID", kind)?;
                if !state.categories.contains_key(&category_id) {
                    return Err(Error::Target(format!(
                        "category {} does not exist",
                        category_id
                    )));
                }
                state.article_categories.insert((article_id, category_id));
                Ok(Record::new())
            }
        }?;
        debug!("Imported {:?}: {:?}", kind, result);
        Ok(result)
    }

    async fn locale_root_category(&self, locale: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .shops
            .values()
            .find(|shop| shop.locale == locale)
            .map(|shop| shop.root_category.clone()))
    }

    async fn update_category_meta_title(&self, category_id: &str, meta_title: &str) -> Result<()> {
        let mut state = self.state.lock();
        let category = state
            .categories
            .get_mut(category_id)
            .ok_or_else(|| Error::Target(format!("category {} does not exist", category_id)))?;
        category.meta_title = Some(meta_title.to_string());
        Ok(())
    }

    async fn article_for_detail(&self, detail_id: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .details
            .get(detail_id)
            .map(|d| d.article_id.clone()))
    }

    async fn reset_block_prices(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.prices.retain(|_, tier| tier.from <= 1);
        for tier in state.prices.values_mut() {
            tier.to = None;
        }
        Ok(())
    }

    async fn price_context(
        &self,
        detail_id: &str,
        customer_group: &str,
    ) -> Result<Option<PriceContext>> {
        let state = self.state.lock();
        let Some(group) = state.customer_groups.get(customer_group) else {
            return Ok(None);
        };
        let Some(article) = state
            .details
            .get(detail_id)
            .and_then(|d| state.articles.get(&d.article_id))
        else {
            return Ok(None);
        };
        let rate = article
            .tax_id
            .as_ref()
            .or(state.default_tax_id.as_ref())
            .and_then(|id| state.tax_rates.get(id))
            .copied()
            .unwrap_or(0.0);
        Ok(Some(PriceContext {
            detail_id: detail_id.to_string(),
            tax: if group.tax_input { rate } else { 0.0 },
        }))
    }

    async fn has_configurator_options(&self, detail_id: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .details
            .get(detail_id)
            .is_some_and(|d| !d.configurator_options.is_empty()))
    }

    async fn replace_main_detail(
        &self,
        placeholder: &str,
        new_main: &str,
        article_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !state.details.contains_key(new_main) {
            return Err(Error::Target(format!("variant {} does not exist", new_main)));
        }
        if !state.articles.contains_key(article_id) {
            return Err(Error::Target(format!("article {} does not exist", article_id)));
        }
        let orphaned = state
            .details
            .remove(placeholder)
            .map(|detail| detail.article_id)
            .filter(|owner| owner != article_id);
        state.prices.retain(|_, tier| tier.detail_id != placeholder);
        if let Some(article) = state.articles.get_mut(article_id) {
            article.main_detail_id = new_main.to_string();
        }
        if let Some(detail) = state.details.get_mut(new_main) {
            detail.kind = 1;
        }
        // a placeholder re-imported as its own article leaves that article empty
        if let Some(owner) = orphaned {
            if !state.details.values().any(|d| d.article_id == owner) {
                debug!("Removing article {} left without variants", owner);
                state.articles.remove(&owner);
                state.article_categories.retain(|(article, _)| *article != owner);
            }
        }
        Ok(())
    }

    async fn update_article_description(
        &self,
        article_id: &str,
        description_long: &str,
        meta_title: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let article = state
            .articles
            .get_mut(article_id)
            .ok_or_else(|| Error::Target(format!("article {} does not exist", article_id)))?;
        article
            .fields
            .insert("description_long".to_string(), description_long.into());
        if let Some(meta_title) = meta_title {
            article
                .fields
                .insert("metaTitle".to_string(), meta_title.into());
        }
        Ok(())
    }

    async fn replace_article_link(
        &self,
        article_id: &str,
        link: Option<(&str, &str)>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let article = state
            .articles
            .get_mut(article_id)
            .ok_or_else(|| Error::Target(format!("article {} does not exist", article_id)))?;
        article.links = link
            .map(|(link, description)| (link.to_string(), description.to_string()))
            .into_iter()
            .collect();
        Ok(())
    }

    async fn country_id(&self, iso: &str) -> Result<Option<String>> {
        Ok(self.state.lock().countries.get(iso).cloned())
    }

    async fn default_payment_id(&self) -> Result<Option<String>> {
        Ok(self.state.lock().default_payment_id.clone())
    }

    async fn shop_locale(&self, shop_id: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .shops
            .get(shop_id)
            .map(|shop| shop.locale.clone()))
    }

    async fn upsert_shipping_address(&self, user_id: &str, address: Record) -> Result<()> {
        let mut state = self.state.lock();
        if !state.customers.contains_key(user_id) {
            return Err(Error::Target(format!("customer {} does not exist", user_id)));
        }
        state.shipping_addresses.insert(user_id.to_string(), address);
        Ok(())
    }

    async fn upsert_debit(&self, user_id: &str, debit: Record) -> Result<()> {
        let mut state = self.state.lock();
        if !state.customers.contains_key(user_id) {
            return Err(Error::Target(format!("customer {} does not exist", user_id)));
        }
        state.debits.insert(user_id.to_string(), debit);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_target_tests.rs"]
mod tests;
