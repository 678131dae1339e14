//! Carparts CLI - browse and edit the offline parts catalog

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use carparts::config::{self, CarpartsConfig};
use carparts::{
    ui, CatalogService, DirSnapshotSlot, EmptySeed, EntityKind, FileSeed, ModelId, PartId, SeedSource, SqliteStore,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "carparts")]
#[command(version)]
#[command(about = "Offline catalog of vehicle models and compatible replacement parts")]
#[command(long_about = r#"
Carparts keeps a catalog of vehicle models and parts in an embedded SQLite
snapshot. The snapshot is saved after every change, so the catalog survives
restarts without any server.

Example usage:
  carparts import parts.csv --out seed.db
  carparts --seed seed.db search model Corolla
  carparts add-part BP-1001 "Brake Pad" --model 1 --model 2
  carparts model-links 1
  carparts clean seed.db
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the persisted snapshot
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Seed SQLite file used when no snapshot has been persisted yet
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with the current settings
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Search models by name or parts by part number
    Search {
        /// What to search: model or part
        kind: String,

        /// Substring to match (lists everything when omitted)
        term: Option<String>,
    },

    /// List the parts compatible with a model
    ModelLinks {
        /// Model id
        id: i64,
    },

    /// List the models compatible with a part
    PartLinks {
        /// Part id
        id: i64,
    },

    /// Add a model, optionally linked to existing parts
    AddModel {
        name: String,

        /// Id of a compatible part (repeatable)
        #[arg(short, long = "part")]
        parts: Vec<i64>,
    },

    /// Add a part, optionally linked to existing models
    AddPart {
        part_number: String,

        name: String,

        /// Id of a compatible model (repeatable)
        #[arg(short, long = "model")]
        models: Vec<i64>,
    },

    /// Delete a model and all of its links
    DeleteModel {
        id: i64,
    },

    /// Delete a part and all of its links
    DeletePart {
        id: i64,
    },

    /// Show catalog statistics
    Stats,

    /// Build a seed snapshot from a CSV export of the parts spreadsheet
    Import {
        /// CSV file: id, part number, designed-for model, name, compatible models
        csv: PathBuf,

        /// Where to write the seed snapshot
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Remove every model, part and link from a seed snapshot
    Clean {
        /// Seed snapshot to empty
        seed: PathBuf,

        /// Write the emptied snapshot here instead of replacing the seed
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level(cli.verbose)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load_config(cli.config.as_deref())
        .context("reading config")?
        .unwrap_or_default();

    match &cli.command {
        Commands::Init { force } => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let written = CarpartsConfig {
                data_dir: Some(data_dir(&cli, &config).display().to_string()),
                seed: seed_path(&cli, &config).map(|p| p.display().to_string()),
                ..config.clone()
            };
            config::write_config(&path, &written, *force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }

        Commands::Search { kind, term } => {
            let kind: EntityKind = kind.parse()?;
            let catalog = open_catalog(&cli, &config)?;
            let hits = catalog.search(kind, term.as_deref().unwrap_or(""))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                ui::warn("No matches");
            } else {
                println!("{}", ui::entity_table(&hits));
            }
        }

        Commands::ModelLinks { id } => {
            let catalog = open_catalog(&cli, &config)?;
            let model = catalog
                .model(ModelId(*id))?
                .with_context(|| format!("model {} not found", id))?;
            let links = catalog.links_for_model(model.id)?;

            if cli.json {
                let data = serde_json::json!({ "model": model, "parts": links });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                ui::header(&model.name);
                if links.is_empty() {
                    ui::warn("No compatible parts");
                } else {
                    println!("{}", ui::part_link_table(&links));
                }
            }
        }

        Commands::PartLinks { id } => {
            let catalog = open_catalog(&cli, &config)?;
            let part = catalog
                .part(PartId(*id))?
                .with_context(|| format!("part {} not found", id))?;
            let links = catalog.links_for_part(part.id)?;

            if cli.json {
                let data = serde_json::json!({ "part": part, "models": links });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                ui::header(&format!("{} ({})", part.name, part.part_number));
                if links.is_empty() {
                    ui::warn("No compatible models");
                } else {
                    println!("{}", ui::model_link_table(&links));
                }
            }
        }

        Commands::AddModel { name, parts } => {
            let mut catalog = open_catalog(&cli, &config)?;
            let part_ids: BTreeSet<PartId> = parts.iter().copied().map(PartId).collect();
            let id = catalog.create_model(name, &part_ids)?;
            report_created(cli.json, EntityKind::Model, id.0)?;
        }

        Commands::AddPart { part_number, name, models } => {
            let mut catalog = open_catalog(&cli, &config)?;
            let model_ids: BTreeSet<ModelId> = models.iter().copied().map(ModelId).collect();
            let id = catalog.create_part(part_number, name, &model_ids)?;
            report_created(cli.json, EntityKind::Part, id.0)?;
        }

        Commands::DeleteModel { id } => {
            let mut catalog = open_catalog(&cli, &config)?;
            catalog.delete_model(ModelId(*id))?;
            report_deleted(cli.json, EntityKind::Model, *id)?;
        }

        Commands::DeletePart { id } => {
            let mut catalog = open_catalog(&cli, &config)?;
            catalog.delete_part(PartId(*id))?;
            report_deleted(cli.json, EntityKind::Part, *id)?;
        }

        Commands::Stats => {
            let catalog = open_catalog(&cli, &config)?;
            let stats = catalog.stats()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                ui::section("Catalog");
                println!("{}", ui::stats_table(&stats));
            }
        }

        Commands::Import { csv, out } => {
            let mut store = SqliteStore::create_empty()?;
            let summary = carparts::import::import_csv(&mut store, csv)
                .with_context(|| format!("importing {}", csv.display()))?;
            let snapshot = store.serialize()?;
            std::fs::write(out, &snapshot).with_context(|| format!("writing {}", out.display()))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                ui::success(&format!("Imported {}", summary));
                ui::info("Seed snapshot", &out.display().to_string());
            }
        }

        Commands::Clean { seed, out } => {
            let bytes = std::fs::read(seed).with_context(|| format!("reading {}", seed.display()))?;
            let mut store = SqliteStore::reconstruct(&bytes).with_context(|| format!("opening {}", seed.display()))?;
            let removed = carparts::import::clear_store(&mut store)?;

            let target = out.as_ref().unwrap_or(seed);
            std::fs::write(target, store.serialize()?).with_context(|| format!("writing {}", target.display()))?;

            if cli.json {
                println!("{}", serde_json::json!({ "removed": removed, "snapshot": target }));
            } else {
                ui::success(&format!(
                    "Removed {} models, {} parts and {} links",
                    removed.models, removed.parts, removed.links
                ));
                ui::info("Seed snapshot", &target.display().to_string());
            }
        }
    }

    Ok(())
}

fn default_log_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn data_dir(cli: &Cli, config: &CarpartsConfig) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(|| config.data_dir())
}

fn seed_path(cli: &Cli, config: &CarpartsConfig) -> Option<PathBuf> {
    cli.seed.clone().or_else(|| config.seed.as_ref().map(PathBuf::from))
}

fn open_catalog(cli: &Cli, config: &CarpartsConfig) -> anyhow::Result<CatalogService> {
    let data_dir = data_dir(cli, config);
    let seed: Arc<dyn SeedSource> = match seed_path(cli, config) {
        Some(path) => Arc::new(FileSeed::new(path)),
        None => Arc::new(EmptySeed),
    };

    let mut catalog = CatalogService::new(
        Arc::new(DirSnapshotSlot::new(data_dir.clone())),
        seed,
        config.catalog_options(),
    );
    let origin = catalog
        .initialize()
        .with_context(|| format!("loading catalog from {}", data_dir.display()))?;
    tracing::debug!("Catalog loaded from {:?} snapshot in {}", origin, data_dir.display());
    Ok(catalog)
}

fn report_created(json: bool, kind: EntityKind, id: i64) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::json!({ "created": kind, "id": id }));
    } else {
        ui::success(&format!("Added {} {}", kind, id));
    }
    Ok(())
}

fn report_deleted(json: bool, kind: EntityKind, id: i64) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::json!({ "deleted": kind, "id": id }));
    } else {
        ui::success(&format!("Deleted {} {} and its links", kind, id));
    }
    Ok(())
}
