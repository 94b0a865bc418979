//! Commerce Migration CLI
//!
//! CLI tool for migrating shop data step by step into a target shop.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use commerce_migrate::connectors::create_source;
use commerce_migrate::connectors::memory_target::MemoryTarget;
use commerce_migrate::mapping::MemoryMappingStore;
use commerce_migrate::{
    EntityType, Error, JobCheckpoint, MappingStore, MigrationConfig, MigrationOptions, Migrator,
    Progress, ProgressState, Step,
};

#[derive(Parser)]
#[command(name = "commerce-migrate")]
#[command(version)]
#[command(about = "Migrate catalog, prices and customers into a target shop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured step until done
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Dry run mode (nothing is persisted)
        #[arg(long)]
        dry_run: bool,

        /// Ignore an existing checkpoint and start over
        #[arg(long)]
        fresh: bool,
    },

    /// Run a single invocation of one step
    Step {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Step name (products, categories, article_categories, prices, customers)
        #[arg(short, long)]
        step: String,

        /// Progress token file, read before and written after the invocation
        #[arg(short, long, value_name = "FILE")]
        progress: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,
    },

    /// List stored identifier mappings
    Mappings {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Only this entity type (article, category, customer, category_target)
        #[arg(short, long)]
        entity: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            fresh,
        } => run_migration(&config, dry_run, fresh).await?,
        Commands::Step {
            config,
            step,
            progress,
        } => run_step(&config, &step, progress.as_deref()).await?,
        Commands::Validate { config } => validate_config(&config)?,
        Commands::Init { output } => generate_config(&output)?,
        Commands::Mappings { config, entity } => list_mappings(&config, entity.as_deref()).await?,
    }

    Ok(())
}

fn load_config(config_path: &Path) -> anyhow::Result<MigrationConfig> {
    info!("Loading configuration from {:?}", config_path);
    let config = MigrationConfig::from_file(config_path)?;
    config.validate()?;
    Ok(config)
}

/// Mapping store of one process and the file it is written back to.
enum Mappings {
    Memory {
        store: MemoryMappingStore,
        file: Option<PathBuf>,
    },
    #[cfg(feature = "sqlite")]
    Database(commerce_migrate::mapping::SqliteMappingStore),
}

impl Mappings {
    async fn open(config: &MigrationConfig) -> anyhow::Result<Self> {
        if let Some(database) = open_mapping_db(&config.options).await? {
            return Ok(database);
        }
        let file = config.mapping_file();
        let store = match &file {
            Some(path) => {
                info!("Using mapping file {:?}", path);
                MemoryMappingStore::load_or_new(path)?
            }
            None => {
                warn!("Mappings kept in memory only");
                MemoryMappingStore::new()
            }
        };
        Ok(Self::Memory { store, file })
    }

    fn store(&self) -> &dyn MappingStore {
        match self {
            Self::Memory { store, .. } => store,
            #[cfg(feature = "sqlite")]
            Self::Database(store) => store,
        }
    }

    /// Writes an in-memory store back to its file. Databases persist on every write.
    fn persist(&self) -> commerce_migrate::Result<()> {
        match self {
            Self::Memory {
                store,
                file: Some(path),
            } => store.save(path),
            _ => Ok(()),
        }
    }
}

#[cfg(feature = "sqlite")]
async fn open_mapping_db(options: &MigrationOptions) -> anyhow::Result<Option<Mappings>> {
    match &options.mapping_db {
        Some(path) if !options.dry_run => {
            info!("Using mapping database {:?}", path);
            Ok(Some(Mappings::Database(
                commerce_migrate::mapping::SqliteMappingStore::open(path).await?,
            )))
        }
        _ => Ok(None),
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_mapping_db(_options: &MigrationOptions) -> anyhow::Result<Option<Mappings>> {
    Ok(None)
}

fn open_target(config: &MigrationConfig) -> anyhow::Result<MemoryTarget> {
    Ok(match &config.target.snapshot {
        Some(path) => MemoryTarget::load_or_seed(path)?,
        None => MemoryTarget::seeded(),
    })
}

async fn run_migration(config_path: &Path, dry_run: bool, fresh: bool) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if dry_run {
        config.options.dry_run = true;
    }

    let source = create_source(&config.profile)?;
    let target = open_target(&config)?;
    let mappings = Mappings::open(&config).await?;

    let checkpoint_path = config.options.checkpoint_file();
    let resume = match (&checkpoint_path, fresh) {
        (Some(path), false) => JobCheckpoint::load(path)?,
        _ => None,
    };
    if let Some(checkpoint) = &resume {
        info!(
            "Resuming run {} ({} steps completed)",
            checkpoint.run_id,
            checkpoint.completed.len()
        );
    }

    let snapshot = config
        .target
        .snapshot
        .clone()
        .filter(|_| !config.options.dry_run);

    info!("Starting migration...");
    let mut migrator = Migrator::new(source.as_ref(), &target, mappings.store(), &config)
        .with_progress_bars(true);
    {
        let target = &target;
        let mappings = &mappings;
        migrator = migrator.after_invocation(move || {
            if let Some(path) = &snapshot {
                target.save(path)?;
            }
            mappings.persist()
        });
    }
    let report = migrator.run_job(resume).await?;

    println!("\n📦 Migration Report (run {})", report.run_id);
    for step in &report.steps {
        println!(
            "   {:<20} {:>8} rows  {:>6} skipped  {:>4} invocations  {:.2}s",
            step.step.as_str(),
            step.rows,
            step.skipped,
            step.invocations,
            step.duration_secs
        );
    }
    for step in &report.disabled {
        println!("   {:<20} disabled", step.as_str());
    }
    println!("   Duration:   {:.2}s", report.duration_secs);
    println!("   Throughput: {:.0} rows/sec", report.throughput());

    if let Some(failure) = report.failure() {
        return Err(Error::StepFailed {
            step: failure.step.to_string(),
            message: failure.error.clone().unwrap_or_default(),
        }
        .into());
    }
    if config.options.dry_run {
        println!("\n✅ Dry run complete, nothing was persisted");
    } else {
        println!("\n✅ Migration Complete!");
    }
    Ok(())
}

async fn run_step(config_path: &Path, step: &str, progress_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let step: Step = step.parse()?;

    let progress = match progress_path.filter(|path| path.exists()) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Progress::new(),
    };

    let source = create_source(&config.profile)?;
    let target = open_target(&config)?;
    let mappings = Mappings::open(&config).await?;

    let migrator = Migrator::new(source.as_ref(), &target, mappings.store(), &config);
    let invocation = migrator.invoke(step, progress).await;

    if let (Some(path), false) = (&config.target.snapshot, config.options.dry_run) {
        target.save(path)?;
    }
    mappings.persist()?;
    if let Some(path) = progress_path {
        std::fs::write(path, serde_json::to_string_pretty(&invocation.progress)?)?;
    }

    for diagnostic in &invocation.diagnostics {
        println!("   row {}: {}", diagnostic.offset, diagnostic.message);
    }
    let progress = &invocation.progress;
    println!(
        "{}: {:?} at {}/{} ({:.0}%)",
        step,
        progress.state,
        progress.offset,
        progress.count,
        progress.ratio() * 100.0
    );
    if progress.state == ProgressState::Error {
        return Err(Error::StepFailed {
            step: step.to_string(),
            message: progress.error_message.clone().unwrap_or_default(),
        }
        .into());
    }
    Ok(())
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("✅ Configuration is valid!");
    println!("   Profile: {}", config.profile.name);
    println!(
        "   Steps:   {}",
        config
            .steps
            .iter()
            .map(|step| {
                if config.step.is_enabled(*step) {
                    step.as_str().to_string()
                } else {
                    format!("({})", step)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("   Budget:  {}s per invocation", config.options.max_execution_secs);

    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    let yaml = MigrationConfig::example().to_yaml()?;
    std::fs::write(output, format!("# Commerce migration configuration\n{}", yaml))?;
    println!("✅ Generated configuration: {:?}", output);
    println!(
        "   Edit the file and run: commerce-migrate run --config {:?}",
        output
    );

    Ok(())
}

async fn list_mappings(config_path: &Path, entity: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let entities = match entity {
        Some(name) => vec![name.parse::<EntityType>()?],
        None => EntityType::ALL.to_vec(),
    };

    let mappings = Mappings::open(&config).await?;
    for entity in entities {
        let entries = mappings.store().entries(entity).await?;
        println!("{} ({} entries)", entity, entries.len());
        for entry in entries {
            println!("   {} -> {}", entry.source_id, entry.target_id);
        }
    }

    Ok(())
}
