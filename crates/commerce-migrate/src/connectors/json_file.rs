//! JSON document source profile.
//!
//! Reads a pre-exported document of the form:
//!
//! ```json
//! {
//!   "categories": [{"categoryID": "1", "description": "Root"}],
//!   "product_categories": [],
//!   "prices": [],
//!   "products": [],
//!   "customers": [],
//!   "product_info": {"17": {"weight": 2.5}}
//! }
//! ```
//!
//! Missing row sets are treated as empty. Row order in the file is the query order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::connectors::{Record, RowCursor, SourceProfile, SourceQuery};
use crate::error::{Error, Result};

const PRODUCT_INFO_KEY: &str = "product_info";

const ALL_QUERIES: [SourceQuery; 5] = [
    SourceQuery::Categories,
    SourceQuery::ProductCategories,
    SourceQuery::ProductPrices,
    SourceQuery::Products,
    SourceQuery::Customers,
];

/// Configuration for a JSON document source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFileConfig {
    /// Path to the JSON document.
    pub path: PathBuf,
}

/// Source profile backed by a JSON document held in memory.
#[derive(Debug)]
pub struct JsonFileSource {
    profile: String,
    rows: HashMap<SourceQuery, Vec<Record>>,
    product_info: HashMap<String, Record>,
}

impl JsonFileSource {
    /// Reads and validates the document at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not have the expected shape.
    pub fn open(profile: &str, config: &JsonFileConfig) -> Result<Self> {
        let file = File::open(&config.path).map_err(|e| {
            Error::SourceConnection(format!(
                "cannot open source document {}: {}",
                config.path.display(),
                e
            ))
        })?;
        let root: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
        let source = Self::from_document(profile, root)?;
        info!(
            "Loaded source document {} ({} products, {} categories, {} customers)",
            config.path.display(),
            source.len(SourceQuery::Products),
            source.len(SourceQuery::Categories),
            source.len(SourceQuery::Customers)
        );
        Ok(source)
    }

    /// Builds a source from an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not an object or a row set is not an array of objects.
    pub fn from_document(profile: &str, root: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(mut root) = root else {
            return Err(Error::Extraction(
                "Source document root is not an object".to_string(),
            ));
        };

        let mut rows = HashMap::new();
        for query in ALL_QUERIES {
            let set = match root.remove(query.as_str()) {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(value) => Self::extract_rows(query.as_str(), value)?,
            };
            rows.insert(query, set);
        }

        let product_info = match root.remove(PRODUCT_INFO_KEY) {
            None | Some(serde_json::Value::Null) => HashMap::new(),
            Some(serde_json::Value::Object(map)) => map
                .into_iter()
                .map(|(id, value)| match value {
                    serde_json::Value::Object(record) => Ok((id, record)),
                    _ => Err(Error::Extraction(format!(
                        "'{}' entry '{}' is not an object",
                        PRODUCT_INFO_KEY, id
                    ))),
                })
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(Error::Extraction(format!(
                    "'{}' is not an object",
                    PRODUCT_INFO_KEY
                )))
            }
        };

        Ok(Self {
            profile: profile.to_string(),
            rows,
            product_info,
        })
    }

    fn extract_rows(key: &str, value: serde_json::Value) -> Result<Vec<Record>> {
        let serde_json::Value::Array(items) = value else {
            return Err(Error::Extraction(format!("'{}' is not an array", key)));
        };
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                serde_json::Value::Object(record) => Ok(record),
                _ => Err(Error::Extraction(format!(
                    "row {} of '{}' is not an object",
                    index, key
                ))),
            })
            .collect()
    }

    /// Total rows of a query.
    #[must_use]
    pub fn len(&self, query: SourceQuery) -> usize {
        self.rows.get(&query).map_or(0, Vec::len)
    }
}

#[async_trait]
impl SourceProfile for JsonFileSource {
    fn profile_name(&self) -> &str {
        &self.profile
    }

    async fn query(&self, query: SourceQuery, offset: u64) -> Result<RowCursor> {
        let rows = self.rows.get(&query).map(Vec::as_slice).unwrap_or_default();
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        debug!("Query '{}' from offset {} of {}", query, offset, rows.len());
        Ok(RowCursor::new(rows.iter().skip(skip).cloned()))
    }

    async fn additional_product_info(&self, product_id: &str) -> Result<Option<Record>> {
        Ok(self.product_info.get(product_id).cloned())
    }
}

#[cfg(test)]
#[path = "json_file_tests.rs"]
mod tests;
