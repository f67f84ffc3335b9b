use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use attribute_matrix::{
    blob::FsBlobStore,
    catalog::{
        config::load_catalog_path,
        sync::{SyncOptions, sync_catalog},
    },
    db::{connection::connect_sqlite, migrate},
    logging,
    resolve::normalize_selection,
    service::{AdminService, GenerateOptions, Limits},
    settings::Settings,
};

#[derive(Parser)]
#[command(version, about = "Attribute matrix admin CLI")]
struct Cli {
    /// Settings file (defaults to $ATTRIBUTE_MATRIX_CONFIG, then built-in defaults).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    /// Catalog management.
    Catalog(CatalogCmd),
    /// Generate and persist the matrix of a product.
    Generate {
        #[arg(long)]
        product: String,
        /// Update a product that already has entries.
        #[arg(long)]
        regenerate: bool,
        /// Treat values with sub-attributes as plain values.
        #[arg(long)]
        no_sub_attributes: bool,
    },
    /// Show what generate would produce without writing.
    Preview {
        #[arg(long)]
        product: String,
        #[arg(long)]
        no_sub_attributes: bool,
        /// Combinations to list (all when omitted).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Resolve a selection to an uploaded image.
    Resolve {
        #[arg(long)]
        product: String,
        /// attribute=value, repeatable.
        #[arg(long = "select", value_name = "ATTR=VALUE", value_parser = parse_pair)]
        select: Vec<(String, String)>,
    },
    /// Upload a file and attach it to an entry.
    Attach {
        #[arg(long)]
        entry: i32,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Detach the image of an entry.
    Clear {
        #[arg(long)]
        entry: i32,
    },
    /// Delete one entry.
    Delete {
        #[arg(long)]
        entry: i32,
    },
    /// Delete every entry of a product.
    ClearAll {
        #[arg(long)]
        product: String,
    },
    /// List the entries of a product.
    Entries {
        #[arg(long)]
        product: String,
    },
}

#[derive(Args)]
struct CatalogCmd {
    #[command(subcommand)]
    sub: CatalogSub,
}

#[derive(Subcommand)]
enum CatalogSub {
    /// Sync a TOML catalog into the database.
    Sync {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        prune: bool,
    },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected ATTR=VALUE, got '{s}'"))
}

fn main() -> Result<()> {
    logging::init()?;
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_path(path)?.apply_overrides(|k| std::env::var(k).ok()),
        None => Settings::load()?,
    };
    let db_url = settings.require_database_url()?.to_string();

    if let Cmd::Migrate = cli.cmd {
        let applied = migrate::run_sqlite(&db_url)?;
        println!("{} migration(s) applied", applied.len());
        return Ok(());
    }

    let mut conn = connect_sqlite(&db_url)?;
    let blob = FsBlobStore::new(&settings.blob_dir, &settings.blob_base_url)
        .with_context(|| format!("open blob dir {}", settings.blob_dir.display()))?;
    let svc = AdminService::new(blob, Limits::from(&settings));

    match cli.cmd {
        Cmd::Migrate => {}
        Cmd::Catalog(CatalogCmd {
            sub:
                CatalogSub::Sync {
                    file,
                    dry_run,
                    prune,
                },
        }) => {
            let cat = load_catalog_path(&file)?;
            let diff = sync_catalog(&mut conn, cat, SyncOptions { dry_run, prune })?;
            println!("{diff}");
            if dry_run {
                println!("\n(dry run, nothing written)");
            }
        }
        Cmd::Generate {
            product,
            regenerate,
            no_sub_attributes,
        } => {
            let opts = GenerateOptions {
                regenerate,
                include_sub_attributes: !no_sub_attributes,
            };
            let summary = svc.generate(&mut conn, &product, opts)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Cmd::Preview {
            product,
            no_sub_attributes,
            limit,
        } => {
            let opts = GenerateOptions {
                regenerate: true,
                include_sub_attributes: !no_sub_attributes,
            };
            let p = svc.preview(&mut conn, &product, opts)?;
            println!(
                "{} attributes, {} valid of {} possible combinations, {} stored entries",
                p.attribute_count, p.total_combinations, p.cartesian_upper_bound, p.existing_entries
            );
            for w in &p.warnings {
                println!("warning: {w}");
            }
            for c in p.combinations.iter().take(limit.unwrap_or(usize::MAX)) {
                let labels: Vec<String> = c
                    .labels
                    .values()
                    .map(|l| format!("{}: {}", l.attribute, l.value))
                    .collect();
                println!("{:>5}  {}  ({})", c.sort_order, c.key, labels.join(", "));
            }
        }
        Cmd::Resolve { product, select } => {
            let selection =
                normalize_selection(select.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            match svc.resolve(&mut conn, &product, &selection)? {
                Some(r) => println!("{}", serde_json::to_string_pretty(&r)?),
                None => println!("no image for this selection"),
            }
        }
        Cmd::Attach { entry, file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("read {}", file.display()))?;
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload");
            let out = svc.attach_asset(&mut conn, entry, &bytes, name)?;
            println!(
                "entry {} -> {}",
                out.entry.id,
                out.entry.image_url.as_deref().unwrap_or_default()
            );
        }
        Cmd::Clear { entry } => {
            let e = svc.clear_asset(&mut conn, entry)?;
            println!("entry {} is {}", e.id, e.status);
        }
        Cmd::Delete { entry } => {
            svc.delete_entry(&mut conn, entry)?;
            println!("entry {entry} deleted");
        }
        Cmd::ClearAll { product } => {
            let n = svc.clear_all_for_product(&mut conn, &product)?;
            println!("{n} entries deleted");
        }
        Cmd::Entries { product } => {
            for e in svc.list_entries(&mut conn, &product)? {
                println!(
                    "{:>6}  {:<8}  {}  {}",
                    e.id,
                    e.status,
                    e.key,
                    e.image_url.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
