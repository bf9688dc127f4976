//! Offers CLI
//!
//! Command-line interface for the Offers API.
//!
//! # Usage
//!
//! ```bash
//! # Configuration comes from the environment
//! export OFFERS_API_BASE_URL=https://offers.example.com/api/v1/
//! export AUTH_ENDPOINT=auth
//! export REFRESH_TOKEN=...
//! export PERSISTENT_TOKEN_KEY=offers-cli
//!
//! # Register a product and list its offers
//! offers register-product --name Widget --description "A widget"
//! offers get-offers 0191b5a6-6c1a-7cc2-9d3e-2f0b8a7b1c44
//!
//! # Inspect or reset the stored access token
//! offers token-status
//! offers forget-token
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use offers_core::{ApiConfig, CacheBackendKind, CacheConfig, TransportConfig};
use offers_sdk::{OffersClient, OffersClientBuilder};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(name = "offers")]
#[command(about = "Query and register products on the Offers API")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bypass the on-disk response cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Keep the access token in memory instead of the OS keyring
    #[arg(long, global = true)]
    memory_store: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the offers for a product
    GetOffers {
        /// Product identifier
        product_id: Uuid,
    },

    /// Register a new product
    RegisterProduct {
        /// Product name
        #[arg(long)]
        name: String,

        /// Product description
        #[arg(long)]
        description: String,

        /// Product identifier (a UUIDv7 is generated when omitted)
        #[arg(long)]
        id: Option<Uuid>,
    },

    /// Refresh the access token now
    Refresh,

    /// Show the stored access token's state
    TokenStatus,

    /// Remove the stored access token
    ForgetToken,

    /// Remove every cached response
    ClearCache,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(rendered) => {
                println!("{}", rendered);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: failed to render output: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<Value> {
    let config = ApiConfig::from_env().context("Incomplete API configuration")?;
    let client = client_builder(&cli)
        .build(&config)
        .await
        .context("Failed to set up the Offers client")?;

    dispatch(cli.command, &client).await
}

fn client_builder(cli: &Cli) -> OffersClientBuilder {
    let transport = TransportConfig {
        cache: CacheConfig {
            backend: CacheBackendKind::Filesystem { dir: None },
            ..CacheConfig::default()
        },
        ..TransportConfig::default()
    };

    let mut builder = OffersClient::builder().transport_config(transport);
    if cli.no_cache {
        builder = builder.no_cache();
    }
    if cli.memory_store {
        builder = builder.memory_store();
    }
    builder
}

async fn dispatch(command: Commands, client: &OffersClient) -> Result<Value> {
    match command {
        Commands::GetOffers { product_id } => commands::get_offers(client, product_id).await,
        Commands::RegisterProduct {
            name,
            description,
            id,
        } => commands::register_product(client, name, description, id).await,
        Commands::Refresh => commands::refresh(client.inner()).await,
        Commands::TokenStatus => commands::token_status(client.inner()),
        Commands::ForgetToken => commands::forget_token(client.inner()).await,
        Commands::ClearCache => commands::clear_cache(client.inner()),
    }
}
