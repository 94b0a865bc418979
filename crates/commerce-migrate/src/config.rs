//! Configuration types for commerce-migrate.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`COMMERCE_MIGRATE_*`, nested keys split on `__`)
//! 2. Configuration file (YAML)
//! 3. Default values

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connectors::json_file::JsonFileConfig;
use crate::error::{Error, Result};
use crate::progress::Budget;
use crate::resources::Step;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "COMMERCE_MIGRATE_";

/// Main migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source profile.
    pub profile: ProfileConfig,
    /// Target profile.
    #[serde(default)]
    pub target: TargetConfig,
    /// Steps in execution order.
    #[serde(default = "default_steps")]
    pub steps: Vec<Step>,
    /// Settings forwarded unchanged to every step invocation.
    #[serde(flatten)]
    pub step: StepConfig,
    /// Runner options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Source profile identity and connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Profile name of the source system (e.g. "magento").
    pub name: String,
    /// Database credentials of the source system.
    #[serde(default)]
    pub credentials: Credentials,
    /// Where the rows come from.
    pub source: SourceConfig,
}

/// Connection credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// User name.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Host name.
    #[serde(default)]
    pub host: String,
    /// Port; `None` uses the driver default.
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name.
    #[serde(default)]
    pub database: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

/// Source connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    /// Pre-exported JSON document.
    #[serde(rename = "json_file")]
    JsonFile(JsonFileConfig),
}

/// Target profile configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Snapshot file of the in-memory target. Loaded if present, written after each invocation.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

/// How non-conforming order numbers are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberValidationMode {
    /// No check.
    Ignore,
    /// The first invalid number stops the step with an error.
    #[default]
    Complain,
    /// Invalid numbers are rewritten; their mappings are not persisted.
    MakeValid,
}

/// Settings shared by every step of one job. Immutable for the job's lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Steps switched on by the operator.
    pub enabled: BTreeSet<Step>,
    /// Source language id -> target locale id.
    pub language: BTreeMap<String, String>,
    /// Source shop id -> target shop id.
    pub shop: BTreeMap<String, String>,
    /// Source customer group id -> target customer group key.
    pub customer_group: BTreeMap<String, String>,
    /// Source price group -> target customer group key.
    pub price_group: BTreeMap<String, String>,
    /// Source attribute field -> target attribute field (empty drops the field).
    pub attribute: BTreeMap<String, String>,
    /// Source tax class -> target tax id.
    pub tax_rate: BTreeMap<String, String>,
    /// Source order status -> target order status.
    pub order_status: BTreeMap<String, String>,
    /// Source payment method -> target payment id.
    pub payment_mean: BTreeMap<String, String>,
    /// Source property option -> target property option.
    pub property_options: BTreeMap<String, String>,
    /// Title-cased variant text -> configurator group names.
    pub configurator_mapping: BTreeMap<String, String>,
    /// Order number policy.
    pub number_validation_mode: NumberValidationMode,
    /// Supplier for products without one.
    pub supplier: Option<String>,
    /// Salt appended to legacy password hashes.
    pub salt: Option<String>,
    /// Base path of the source shop (media URLs).
    pub basepath: Option<String>,
}

impl StepConfig {
    /// Non-empty dictionary value for `key`.
    #[must_use]
    pub fn lookup<'a>(map: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
        map.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Returns true if the operator switched `step` on.
    #[must_use]
    pub fn is_enabled(&self, step: Step) -> bool {
        self.enabled.contains(&step)
    }

    /// Configured salt, if non-empty.
    #[must_use]
    pub fn salt(&self) -> Option<&str> {
        self.salt.as_deref().filter(|s| !s.is_empty())
    }

    /// Configured default supplier, if non-empty.
    #[must_use]
    pub fn default_supplier(&self) -> Option<&str> {
        self.supplier.as_deref().filter(|s| !s.is_empty())
    }
}

/// Runner options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Seconds one invocation may run before yielding.
    pub max_execution_secs: u64,
    /// Optional cap on rows per invocation.
    pub max_rows: Option<u64>,
    /// SQLite file holding the mapping table. `None` keeps mappings in memory.
    pub mapping_db: Option<PathBuf>,
    /// Enable checkpoint/resume support.
    pub checkpoint_enabled: bool,
    /// Checkpoint file path.
    pub checkpoint_path: Option<PathBuf>,
    /// Retries for transient source query failures.
    pub source_retries: u32,
    /// Dry run mode (nothing is persisted).
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            max_execution_secs: default_max_execution_secs(),
            max_rows: None,
            mapping_db: None,
            checkpoint_enabled: true,
            checkpoint_path: None,
            source_retries: 3,
            dry_run: false,
        }
    }
}

impl MigrationOptions {
    /// Per-invocation budget.
    #[must_use]
    pub fn budget(&self) -> Budget {
        Budget {
            max_execution: Duration::from_secs(self.max_execution_secs),
            max_rows: self.max_rows,
        }
    }

    /// Checkpoint file, if checkpointing is on.
    #[must_use]
    pub fn checkpoint_file(&self) -> Option<PathBuf> {
        if !self.checkpoint_enabled || self.dry_run {
            return None;
        }
        Some(
            self.checkpoint_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("migration.checkpoint.json")),
        )
    }
}

fn default_steps() -> Vec<Step> {
    Step::DEFAULT_ORDER.to_vec()
}

fn default_max_execution_secs() -> u64 {
    30
}

impl MigrationConfig {
    /// File the in-memory mapping store is kept in between processes.
    ///
    /// Used when no mapping database is available: next to the target
    /// snapshot, otherwise next to the checkpoint. `None` in dry runs and
    /// when the mapping database is used.
    #[must_use]
    pub fn mapping_file(&self) -> Option<PathBuf> {
        if self.options.dry_run {
            return None;
        }
        if let Some(db) = &self.options.mapping_db {
            return (!cfg!(feature = "sqlite")).then(|| db.with_extension("json"));
        }
        self.target
            .snapshot
            .clone()
            .or_else(|| self.options.checkpoint_file())
            .map(|path| path.with_extension("mappings.json"))
    }

    /// Loads configuration from a YAML file with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        Self::extract(Figment::new().merge(Yaml::file(path)))
    }

    /// Parses configuration from a YAML string with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::extract(Figment::new().merge(Yaml::string(yaml)))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Renders a configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.profile.name.trim().is_empty() {
            return Err(Error::Config("profile name cannot be empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(Error::Config("at least one step is required".to_string()));
        }
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(*step) {
                return Err(Error::Config(format!("step '{}' is listed twice", step)));
            }
        }
        for step in &self.steps {
            for dependency in step.depends_on() {
                let (Some(pos), Some(dep_pos)) = (self.position(*step), self.position(*dependency))
                else {
                    continue;
                };
                if dep_pos > pos {
                    return Err(Error::Config(format!(
                        "step '{}' must run after '{}'",
                        step, dependency
                    )));
                }
            }
        }
        for enabled in &self.step.enabled {
            if !self.steps.contains(enabled) {
                return Err(Error::Config(format!(
                    "step '{}' is enabled but not part of the step list",
                    enabled
                )));
            }
        }
        Ok(())
    }

    fn position(&self, step: Step) -> Option<usize> {
        self.steps.iter().position(|s| *s == step)
    }

    /// Example configuration used by `init`.
    #[must_use]
    pub fn example() -> Self {
        Self {
            profile: ProfileConfig {
                name: "magento".to_string(),
                credentials: Credentials {
                    username: "root".to_string(),
                    password: String::new(),
                    host: "localhost".to_string(),
                    port: None,
                    database: "shop".to_string(),
                },
                source: SourceConfig::JsonFile(JsonFileConfig {
                    path: PathBuf::from("./export.json"),
                }),
            },
            target: TargetConfig {
                snapshot: Some(PathBuf::from("./target.json")),
            },
            steps: default_steps(),
            step: StepConfig {
                enabled: [Step::Products, Step::Categories, Step::Prices, Step::Customers]
                    .into_iter()
                    .collect(),
                language: BTreeMap::from([("1".to_string(), "1".to_string())]),
                shop: BTreeMap::from([("1".to_string(), "1".to_string())]),
                price_group: BTreeMap::from([("0".to_string(), "EK".to_string())]),
                supplier: Some("Default".to_string()),
                ..StepConfig::default()
            },
            options: MigrationOptions {
                mapping_db: Some(PathBuf::from("./mappings.db")),
                ..MigrationOptions::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
profile:
  name: magento
  source:
    type: json_file
    path: ./export.json
"#;

    #[test]
    fn test_config_defaults() {
        let options = MigrationOptions::default();
        assert_eq!(options.max_execution_secs, 30);
        assert_eq!(options.source_retries, 3);
        assert!(options.checkpoint_enabled);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_config_yaml_parse() {
        let yaml = r#"
profile:
  name: magento
  credentials:
    username: root
    password: secret
    host: db.local
    port: 3306
    database: shop
  source:
    type: json_file
    path: ./export.json
enabled: [products, categories]
number_validation_mode: make_valid
price_group:
  "0": EK
  "8": H
attribute:
  color: attr1
  legacy: ""
salt: pepper
options:
  max_execution_secs: 5
  max_rows: 100
"#;
        let config = MigrationConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.profile.credentials.port, Some(3306));
        assert_eq!(config.step.number_validation_mode, NumberValidationMode::MakeValid);
        assert!(config.step.is_enabled(Step::Products));
        assert!(!config.step.is_enabled(Step::Customers));
        assert_eq!(StepConfig::lookup(&config.step.price_group, "8"), Some("H"));
        assert_eq!(StepConfig::lookup(&config.step.attribute, "legacy"), None);
        assert_eq!(config.step.salt(), Some("pepper"));
        assert_eq!(config.options.budget().max_rows, Some(100));
        assert_eq!(config.steps, Step::DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = MigrationConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.step.number_validation_mode, NumberValidationMode::Complain);
        assert!(config.step.enabled.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_prices_before_products() {
        let mut config = MigrationConfig::from_yaml(MINIMAL).unwrap();
        config.steps = vec![Step::Prices, Step::Products];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_steps() {
        let mut config = MigrationConfig::from_yaml(MINIMAL).unwrap();
        config.steps = vec![Step::Products, Step::Products];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials {
            password: "hunter2".to_string(),
            ..Credentials::default()
        };
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_example_round_trips_through_yaml() {
        let example = MigrationConfig::example();
        let yaml = example.to_yaml().unwrap();
        let parsed = MigrationConfig::from_yaml(&yaml).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.steps, example.steps);
        assert_eq!(parsed.step.enabled, example.step.enabled);
    }

    #[test]
    fn test_checkpoint_disabled_in_dry_run() {
        let options = MigrationOptions {
            dry_run: true,
            ..MigrationOptions::default()
        };
        assert!(options.checkpoint_file().is_none());
    }

    #[test]
    fn test_mapping_file_sits_next_to_snapshot_or_checkpoint() {
        let mut config = MigrationConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(
            config.mapping_file(),
            Some(PathBuf::from("migration.checkpoint.mappings.json"))
        );

        config.target.snapshot = Some(PathBuf::from("out/target.json"));
        assert_eq!(
            config.mapping_file(),
            Some(PathBuf::from("out/target.mappings.json"))
        );

        config.options.dry_run = true;
        assert!(config.mapping_file().is_none());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_no_mapping_file_with_mapping_db() {
        let mut config = MigrationConfig::from_yaml(MINIMAL).unwrap();
        config.options.mapping_db = Some(PathBuf::from("mappings.db"));
        assert!(config.mapping_file().is_none());
    }
}
