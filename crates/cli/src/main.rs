//! Shopkeep CLI - Storefront client for the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Create an account and sign in
//! shopkeep register -u alice -p hunter22
//!
//! # Browse the catalog
//! shopkeep products list
//! shopkeep products search mug
//!
//! # Fill the cart and check out a line
//! shopkeep cart add 5 -q 2
//! shopkeep cart checkout 30
//!
//! # Review and cancel orders
//! shopkeep orders list --filter active
//! shopkeep orders cancel 12
//! ```
//!
//! The session is persisted to `SHOPKEEP_SESSION_FILE` between invocations.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use sentry::integrations::tracing as sentry_tracing;
use shopkeep_core::{CartItemId, OrderId, ProductId};
use shopkeep_storefront::StorefrontConfig;
use shopkeep_storefront::state::StorefrontState;
use shopkeep_storefront::store::FileSessionStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "shopkeep")]
#[command(author, version, about = "Shopkeep storefront client")]
struct Cli {
    /// Commerce API base URL (overrides `SHOPKEEP_API_URL`)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account, then sign in
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Sign in
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Browse the catalog
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Review orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum ProductsAction {
    /// List every product
    List,
    /// Show one product
    Show { id: ProductId },
    /// Search products by name or description
    Search { query: String },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart and its total
    Show,
    /// Add a product
    Add {
        product_id: ProductId,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Change the quantity of a cart line
    Update { item_id: CartItemId, quantity: u32 },
    /// Remove a cart line
    Remove { item_id: CartItemId },
    /// Check out a cart line
    Checkout { item_id: CartItemId },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List orders, newest first
    List {
        #[arg(short, long, value_enum, default_value_t = OrderFilter::All)]
        filter: OrderFilter,
    },
    /// Show one order
    Show { id: OrderId },
    /// Cancel an order
    Cancel { id: OrderId },
}

/// Which orders `orders list` shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OrderFilter {
    All,
    Active,
    Cancelled,
    Cancellable,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::debug!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_writer(std::io::stderr).init();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    // Logs go to stderr so command output stays pipeable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopkeep=info,shopkeep_storefront=warn".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<StorefrontConfig, shopkeep_storefront::config::ConfigError> {
    let config = StorefrontConfig::from_env()?;
    match &cli.api_url {
        Some(api_url) => config.with_api_url(api_url),
        None => Ok(config),
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CommandError> {
    let store = Arc::new(FileSessionStore::new(config.session_file.clone()));
    let state = StorefrontState::new(config, store);
    state.session().restore();

    match cli.command {
        Commands::Register { username, password } => {
            commands::auth::register(&state, &username, &password).await?;
        }
        Commands::Login { username, password } => {
            commands::auth::login(&state, &username, &password).await?;
        }
        Commands::Logout => commands::auth::logout(&state),
        Commands::Whoami => commands::auth::whoami(&state).await?,
        Commands::Products { action } => match action {
            ProductsAction::List => commands::products::list(&state).await?,
            ProductsAction::Show { id } => commands::products::show(&state, id).await?,
            ProductsAction::Search { query } => commands::products::search(&state, &query).await?,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&state).await?,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&state, product_id, quantity).await?,
            CartAction::Update { item_id, quantity } => {
                commands::cart::update(&state, item_id, quantity).await?;
            }
            CartAction::Remove { item_id } => commands::cart::remove(&state, item_id).await?,
            CartAction::Checkout { item_id } => commands::cart::checkout(&state, item_id).await?,
        },
        Commands::Orders { action } => match action {
            OrdersAction::List { filter } => commands::orders::list(&state, filter).await?,
            OrdersAction::Show { id } => commands::orders::show(&state, id).await?,
            OrdersAction::Cancel { id } => commands::orders::cancel(&state, id).await?,
        },
    }
    Ok(())
}
