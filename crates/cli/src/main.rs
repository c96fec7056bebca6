//! Suraj Jewels CLI - drive the storefront state layer from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart saved on this device
//! sj-cli cart show
//!
//! # Add two units of a product at a given unit price
//! sj-cli cart add 665f1c2e9b1d4a0012ab34cd --price 45999 -q 2
//!
//! # Sign in and merge this device's cart into the account cart
//! sj-cli sync -e asha@example.com -p secret
//!
//! # Toggle a product on the account's wishlist
//! sj-cli wishlist -e asha@example.com -p secret toggle 665f1c2e9b1d4a0012ab34cd
//! ```
//!
//! # Commands
//!
//! - `cart` - Show or change the device cart (no sign-in needed)
//! - `sync` - Sign in and merge the device cart
//! - `wishlist` - List or toggle wishlist entries

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use suraj_jewels_storefront::notify::TracingNotifier;
use suraj_jewels_storefront::{Storefront, StorefrontConfig};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "sj-cli")]
#[command(author, version, about = "Suraj Jewels storefront tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the cart saved on this device
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Sign in and merge this device's cart into the account cart
    Sync {
        #[command(flatten)]
        account: Account,
    },
    /// List or toggle wishlist entries
    Wishlist {
        #[command(flatten)]
        account: Account,

        #[command(subcommand)]
        action: WishlistAction,
    },
}

#[derive(Args)]
struct Account {
    /// Account email address
    #[arg(short, long)]
    email: String,

    /// Account password
    #[arg(short, long)]
    password: String,
}

#[derive(Subcommand)]
enum CartAction {
    /// Print every line and the totals
    Show,
    /// Add units of a product
    Add {
        product_id: String,

        /// Unit price in rupees
        #[arg(long)]
        price: Decimal,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a product's line
    Remove { product_id: String },
    /// Set a product's quantity (0 removes the line)
    Set { product_id: String, quantity: i64 },
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Print the wishlist
    List,
    /// Add or remove a product
    Toggle {
        product_id: String,

        /// Product name used in the confirmation
        #[arg(long, default_value = "Product")]
        title: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "suraj_jewels_storefront=info,suraj_jewels_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CommandError> {
    let storefront = Storefront::init(config, Arc::new(TracingNotifier)).await?;

    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&storefront),
            CartAction::Add {
                product_id,
                price,
                quantity,
            } => commands::cart::add(&storefront, &product_id, price, quantity).await?,
            CartAction::Remove { product_id } => {
                commands::cart::remove(&storefront, &product_id).await?;
            }
            CartAction::Set {
                product_id,
                quantity,
            } => commands::cart::set(&storefront, &product_id, quantity).await?,
        },
        Commands::Sync { account } => {
            commands::account::sync(&storefront, &account.email, &account.password).await?;
        }
        Commands::Wishlist { account, action } => {
            commands::account::sign_in(&storefront, &account.email, &account.password).await?;
            match action {
                WishlistAction::List => commands::account::list_wishlist(&storefront),
                WishlistAction::Toggle { product_id, title } => {
                    commands::account::toggle_wishlist(&storefront, &product_id, &title).await?;
                }
            }
            storefront.logout().await;
        }
    }

    storefront.teardown().await?;
    Ok(())
}
