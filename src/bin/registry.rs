//! Schema Registry CLI
//!
//! Operator tooling over a file-backed schema store: inspect rows, infer a
//! contract from a sample, validate documents, register contracts by hand.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use schema_registry::{
    infer_contract, Contract, Draft7Engine, FileSchemaStore, PipelineConfig, SchemaDocument, SchemaEnvelope,
    SchemaIdentity, SchemaKind, SchemaRegistry, SchemaStore, StoreId, ValidatorEngine,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-registry")]
#[command(about = "Inspect and maintain metadata schema stores")]
struct Cli {
    /// Config file (defaults to schema_registry.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Store root, overriding the config
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Which table to use, overriding the config
    #[arg(short, long, value_parser = parse_kind)]
    kind: Option<SchemaKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all rows in the store
    List,

    /// Print one row
    Show {
        id: u64,
    },

    /// Print the contract inferred from a sample document
    Infer {
        file: PathBuf,
    },

    /// Validate a document the way a pipeline registry would
    Validate {
        #[arg(short, long)]
        name: String,
        #[arg(short = 'V', long)]
        version: String,
        file: PathBuf,
    },

    /// Show the state a registry for this identity would start in
    Describe {
        #[arg(short, long)]
        name: String,
        #[arg(short = 'V', long)]
        version: String,
    },

    /// Register a contract for an identity (reuses an identical row)
    Promote {
        #[arg(short, long)]
        name: String,
        #[arg(short = 'V', long)]
        version: String,
        /// JSON Schema body
        file: PathBuf,
    },
}

fn parse_kind(s: &str) -> Result<SchemaKind, String> {
    match s {
        "raw" | "raw_data" => Ok(SchemaKind::RawData),
        "cleaned" | "cleaned_data" => Ok(SchemaKind::CleanedData),
        other => Err(format!("unknown schema kind '{}' (expected raw_data or cleaned_data)", other)),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if let Some(path) = cli.store {
        config.store.path = path;
    }
    if let Some(kind) = cli.kind {
        config.store.kind = kind;
    }

    let fields = config.identity_fields();
    let store = FileSchemaStore::open(config.store_path(), config.store.kind)?;

    match cli.command {
        Commands::List => {
            let rows = store.get_all()?;
            println!("{} row(s) in {}", rows.len(), store.dir().display());
            for row in rows {
                match SchemaDocument::from_stored(&row, &fields) {
                    Ok(doc) => println!(
                        "  {:>6}  {}  {}",
                        doc.store_id,
                        doc.identity,
                        doc.contract.checksum().short()
                    ),
                    Err(e) => println!("  {:>6}  (unreadable: {})", row.id, e),
                }
            }
            Ok(())
        }

        Commands::Show { id } => {
            let row = store
                .get_by_id(StoreId(id))?
                .with_context(|| format!("no schema with id {}", id))?;
            println!("{}", serde_json::to_string_pretty(&row)?);
            Ok(())
        }

        Commands::Infer { file } => {
            let sample = read_json(&file)?;
            println!("{}", serde_json::to_string_pretty(infer_contract(&sample).as_value())?);
            Ok(())
        }

        Commands::Validate { name, version, file } => {
            let document = read_json(&file)?;
            let registry = SchemaRegistry::from_config(SchemaIdentity::new(name, version), store, &config)?;

            let (valid, diagnostic) = registry.validate(&document);
            match registry.active_schema_id() {
                Some(id) => println!("Validated against schema {}", id),
                None => println!("No active schema, fallback validation used"),
            }

            if valid {
                println!("✅ valid");
                return Ok(());
            }
            if let Some(diagnostic) = diagnostic {
                println!("{}", serde_json::to_string_pretty(&diagnostic)?);
            }
            bail!("document rejected")
        }

        Commands::Describe { name, version } => {
            let registry = SchemaRegistry::from_config(SchemaIdentity::new(name, version), store, &config)?;
            println!("{}", serde_json::to_string_pretty(&registry.describe_state())?);
            Ok(())
        }

        Commands::Promote { name, version, file } => {
            let contract = Contract::new(read_json(&file)?);
            Draft7Engine
                .compile(&contract)
                .context("contract is not a valid Draft 7 schema")?;

            let checksum = contract.checksum();
            let envelope = SchemaEnvelope::new(SchemaIdentity::new(name, version), contract);

            // Identical contracts under another identity are not reused.
            let existing = store
                .find_by_identity(&envelope.identity, &fields)?
                .into_iter()
                .rev()
                .find(|row| row.contract_value().is_some_and(|v| checksum.verify_json(v)));

            match existing {
                Some(row) => println!("{} already registered as schema {}", envelope.identity, row.id),
                None => {
                    let id = store.create(&envelope.to_payload(&fields))?;
                    println!("✅ {} registered as schema {}", envelope.identity, id);
                }
            }
            Ok(())
        }
    }
}
