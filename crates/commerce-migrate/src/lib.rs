// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # Commerce Migration Engine
//!
//! `commerce-migrate` is a CLI tool and library for moving catalog, pricing
//! and customer data from a legacy shop system into a target shop, one
//! resumable step at a time.
//!
//! ## Steps
//!
//! | Step | Reads mappings of | Writes mappings |
//! |------|-------------------|-----------------|
//! | `products` | `products` (parents) | article |
//! | `categories` | `categories` (parents) | category, category target |
//! | `article_categories` | `products`, `categories` | - |
//! | `prices` | `products` | - |
//! | `customers` | - | customer |
//!
//! Every step yields when its time budget is used up and hands back a
//! [`Progress`] token; calling it again with that token continues at the
//! next row. Identifier mappings are upserts, so a resumed run converges on
//! the same result as an uninterrupted one.
//!
//! ## Quick Start
//!
//! ```bash
//! commerce-migrate init --output migration.yaml
//! commerce-migrate run --config migration.yaml --dry-run
//! commerce-migrate run --config migration.yaml
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! profile:
//!   name: legacy
//!   source:
//!     type: json_file
//!     path: ./export.json
//!
//! enabled: [products, categories, prices]
//! price_group:
//!   "0": EK
//!
//! options:
//!   max_execution_secs: 30
//!   mapping_db: ./mappings.db
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod error;
pub mod mapping;
pub mod orchestrator;
pub mod progress;
pub mod resources;
pub mod retry;

pub use config::{MigrationConfig, MigrationOptions, NumberValidationMode, StepConfig};
pub use connectors::{ImportKind, Record, SourceProfile, SourceQuery, TargetProfile};
pub use error::{Error, Result};
pub use mapping::{EntityType, MappingStore};
pub use orchestrator::{JobCheckpoint, JobReport, Migrator};
pub use progress::{Budget, Progress, ProgressState};
pub use resources::{create_adapter, ResourceAdapter, Step};
