use clap::{Parser, Subcommand};
use receipt_compare::config::{self, Config};
use receipt_compare::heuristics::{self, ParsedItem};
use receipt_compare::ocr_client::OcrClient;
use receipt_compare::receipt_db::{ItemPatch, ReceiptStore, Supplier};
use receipt_compare::{compare, error, upload};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "receipts",
    version,
    about = "Read retail receipts through OCR and compare item prices across suppliers"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "RECEIPTS_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse OCR text from a file (`-` for stdin) into line items
    Parse { file: PathBuf },
    /// Check whether the OCR backend is reachable
    Health,
    /// Send a receipt image through OCR and parse the result
    Upload {
        image: PathBuf,
        #[arg(long)]
        title: Option<String>,
        /// Receipt date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Store the parsed items as a new receipt
        #[arg(long)]
        save: bool,
        /// Supplier id assigned to every parsed item
        #[arg(long)]
        supplier: Option<String>,
    },
    #[command(subcommand)]
    Supplier(SupplierCommand),
    #[command(subcommand)]
    Receipt(ReceiptCommand),
    #[command(subcommand)]
    Item(ItemCommand),
    /// Cheapest price per item across suppliers
    Compare,
    /// Row counts of the receipt database
    Stats,
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum SupplierCommand {
    Add { name: String },
    List,
    Rename { id: String, name: String },
    /// Remove a supplier; its items keep their prices but lose the supplier
    Remove { id: String },
}

#[derive(Subcommand)]
enum ReceiptCommand {
    List,
    Show {
        id: String,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    Remove {
        id: String,
    },
}

#[derive(Subcommand)]
enum ItemCommand {
    /// Append an item to a stored receipt
    Add {
        receipt: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 1)]
        qty: u32,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        supplier: Option<String>,
    },
    Edit {
        item: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        qty: Option<u32>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long, conflicts_with = "clear_supplier")]
        supplier: Option<String>,
        #[arg(long)]
        clear_supplier: bool,
    },
    Remove {
        item: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the OCR base URL into the config file
    SetOcrUrl { url: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut cfg = Config::load_or_default(&cli.config)?;
    cfg.apply_env_override(std::env::var("OCR_API_URL").ok());

    // init tracing; RUST_LOG wins over the config file
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    let json = cli.json;
    match cli.command {
        Command::Parse { file } => {
            let text = read_text(&file)?;
            let filter = cfg.noise.build_filter()?;
            let items = heuristics::parse_items_with(&text, &filter);
            info!(lines = text.lines().count(), items = items.len(), "Parsed text");
            if json {
                print_json(&items)?;
            } else {
                print_items(&items, &HashMap::new());
            }
        }
        Command::Health => {
            let status = ocr_client(&cfg)?.health().await;
            if json {
                print_json(&status)?;
            } else {
                println!(
                    "{} {}",
                    if status.connected { "OK" } else { "DOWN" },
                    status.message
                );
            }
            if !status.connected {
                std::process::exit(1);
            }
        }
        Command::Upload {
            image,
            title,
            date,
            save,
            supplier,
        } => {
            let client = ocr_client(&cfg)?;
            let filter = cfg.noise.build_filter()?;
            let db = open_store(&cfg)?;
            let options = upload::UploadOptions {
                save,
                title,
                date,
                supplier_id: supplier,
            };
            let outcome = upload::upload(&client, &filter, &db, &image, &options).await?;

            if json {
                print_json(&outcome)?;
            } else {
                if let Some(e) = &outcome.ocr_error {
                    println!("OCR failed: {e}");
                } else {
                    println!("--- OCR text ---\n{}\n--- End ---\n", outcome.raw_text);
                }
                if let Some(existing) = &outcome.duplicate_of {
                    println!("Note: this image was already stored as receipt {existing}");
                }
                print_items(&outcome.items, &supplier_names(&db)?);
                if let Some(id) = &outcome.receipt_id {
                    println!("\nSaved receipt {id}");
                }
            }
        }
        Command::Supplier(cmd) => run_supplier(cmd, &open_store(&cfg)?, json)?,
        Command::Receipt(cmd) => run_receipt(cmd, &open_store(&cfg)?, json)?,
        Command::Item(cmd) => run_item(cmd, &open_store(&cfg)?, json)?,
        Command::Compare => {
            let db = open_store(&cfg)?;
            let table = compare::build_table(&db.list_receipts()?, &db.list_suppliers()?);
            if json {
                print_json(&table)?;
            } else {
                print!("{}", compare::render_table(&table));
            }
        }
        Command::Stats => {
            let db = open_store(&cfg)?;
            let (suppliers, receipts, items) = db.get_counts()?;
            info!(suppliers, receipts, items, "Database statistics");
            if json {
                print_json(&serde_json::json!({
                    "suppliers": suppliers,
                    "receipts": receipts,
                    "items": items,
                }))?;
            } else {
                println!("suppliers: {suppliers}\nreceipts:  {receipts}\nitems:     {items}");
            }
        }
        Command::Config(ConfigCommand::SetOcrUrl { url }) => {
            Config::update_ocr_url(&cli.config, &url)?;
            println!("OCR base URL set to {url}");
        }
    }

    Ok(())
}

fn run_supplier(
    cmd: SupplierCommand,
    db: &ReceiptStore,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        SupplierCommand::Add { name } => {
            let id = db.add_supplier(&name)?;
            println!("{id}");
        }
        SupplierCommand::List => {
            let suppliers = db.list_suppliers()?;
            if json {
                print_json(&suppliers)?;
            } else if suppliers.is_empty() {
                println!("No suppliers yet. Add one with `supplier add <name>`.");
            } else {
                for s in &suppliers {
                    println!("{}  {}", s.id, s.name);
                }
            }
        }
        SupplierCommand::Rename { id, name } => db.rename_supplier(&id, &name)?,
        SupplierCommand::Remove { id } => db.remove_supplier(&id)?,
    }
    Ok(())
}

fn run_receipt(
    cmd: ReceiptCommand,
    db: &ReceiptStore,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ReceiptCommand::List => {
            let receipts = db.list_receipts()?;
            if json {
                print_json(&receipts)?;
            } else {
                for r in &receipts {
                    println!(
                        "{}  {}  {}  {} items ({} pcs)  {}",
                        r.id,
                        r.date,
                        r.title,
                        r.items.len(),
                        r.total_qty(),
                        compare::format_rupiah(r.total_price())
                    );
                }
            }
        }
        ReceiptCommand::Show { id } => {
            let receipt = db
                .get_receipt(&id)?
                .ok_or_else(|| error::AppError::not_found("receipt", id.as_str()))?;
            if json {
                print_json(&receipt)?;
            } else {
                println!("{}  ({})", receipt.title, receipt.date);
                if let Some(name) = &receipt.image_name {
                    println!("image: {name}");
                }
                println!();
                print_items(&receipt.items, &supplier_names(db)?);
            }
        }
        ReceiptCommand::Edit { id, title, date } => {
            db.update_receipt(&id, title.as_deref(), date.as_deref())?
        }
        ReceiptCommand::Remove { id } => db.remove_receipt(&id)?,
    }
    Ok(())
}

fn run_item(
    cmd: ItemCommand,
    db: &ReceiptStore,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ItemCommand::Add {
            receipt,
            name,
            qty,
            price,
            supplier,
        } => {
            let mut item = ParsedItem::new(name.trim(), qty, price);
            item.supplier_id = supplier;
            db.add_item(&receipt, &item)?;
            if json {
                print_json(&item)?;
            } else {
                println!("{}", item.id);
            }
        }
        ItemCommand::Edit {
            item,
            name,
            qty,
            price,
            supplier,
            clear_supplier,
        } => {
            let supplier_id = if clear_supplier {
                Some(None)
            } else {
                supplier.map(Some)
            };
            let patch = ItemPatch {
                name,
                qty,
                price,
                supplier_id,
            };
            let updated = db.update_item(&item, &patch)?;
            if json {
                print_json(&updated)?;
            }
        }
        ItemCommand::Remove { item } => db.remove_item(&item)?,
    }
    Ok(())
}

fn ocr_client(cfg: &Config) -> Result<OcrClient, error::OcrError> {
    OcrClient::new(
        &cfg.ocr.base_url,
        Duration::from_secs(cfg.ocr.timeout_secs),
        Duration::from_secs(cfg.ocr.health_timeout_secs),
    )
}

fn open_store(cfg: &Config) -> Result<ReceiptStore, Box<dyn std::error::Error>> {
    if let Some(parent) = Path::new(&cfg.db_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }
    info!(db_path = %cfg.db_path, "Opening receipt database");
    Ok(ReceiptStore::new(&cfg.db_path)?)
}

fn read_text(file: &Path) -> std::io::Result<String> {
    if file.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(file)
    }
}

fn supplier_names(db: &ReceiptStore) -> rusqlite::Result<HashMap<String, String>> {
    Ok(db
        .list_suppliers()?
        .into_iter()
        .map(|Supplier { id, name }| (id, name))
        .collect())
}

fn print_items(items: &[ParsedItem], suppliers: &HashMap<String, String>) {
    if items.is_empty() {
        println!("No items recognised.");
        return;
    }
    for item in items {
        let supplier = item
            .supplier_id
            .as_ref()
            .map(|id| suppliers.get(id).map_or("?", String::as_str))
            .unwrap_or("-");
        println!(
            "{}  {:>4} x {:<14} {:<30} {}",
            item.id,
            item.qty,
            compare::format_rupiah(item.price),
            item.name,
            supplier
        );
    }
    let total_qty: u64 = items.iter().map(|i| u64::from(i.qty)).sum();
    let total_price: f64 = items.iter().map(ParsedItem::line_total).sum();
    println!(
        "\nTotal items: {total_qty}  Total price: {}",
        compare::format_rupiah(total_price)
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
