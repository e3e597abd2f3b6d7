//! Dropline CLI - Database migrations and operational tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! dl-cli migrate
//!
//! # Seed or update a catalog product
//! dl-cli product upsert --sku MUG-01 --name "Camp Mug" --stock 40
//!
//! # Run a stored webhook payload through the pipeline (non-production only)
//! dl-cli replay event.json
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `product upsert` - Insert or overwrite a product by SKU
//! - `replay` - Reprocess a stored payment event

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dropline_webhooks::db::ProductUpsert;

mod commands;

#[derive(Parser)]
#[command(name = "dl-cli")]
#[command(author, version, about = "Dropline CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage catalog products
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Reprocess a stored webhook payload without signature verification
    Replay {
        /// Path to the raw event JSON
        file: PathBuf,

        /// Also call the configured dropshipping, CRM and email connectors
        #[arg(long)]
        with_connectors: bool,
    },
}

#[derive(Subcommand)]
enum ProductAction {
    /// Insert a product or overwrite the one with the same SKU
    Upsert {
        /// Catalog SKU
        #[arg(short, long)]
        sku: String,

        /// Product name
        #[arg(short, long)]
        name: String,

        /// Units in stock
        #[arg(long)]
        stock: i32,

        /// Dropshipping provider variant id
        #[arg(long)]
        variant_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Product { action } => match action {
            ProductAction::Upsert {
                sku,
                name,
                stock,
                variant_id,
            } => {
                commands::product::upsert(ProductUpsert {
                    sku,
                    name,
                    stock,
                    fulfillment_variant_id: variant_id,
                })
                .await?;
            }
        },
        Commands::Replay {
            file,
            with_connectors,
        } => commands::replay::run(&file, with_connectors).await?,
    }
    Ok(())
}
