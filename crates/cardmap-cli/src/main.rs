//! cardmap - command line client for the card-benefits service.
//!
//! Signs in against the backend, inspects the stored session, evaluates
//! route guards, and shows which nearby stores pay best with which card.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cardmap_core::auth::{
    AuthSession, Credentials, FileTokenStore, GuardKind, GuardRoutes, GuardView,
    KeyringTokenStore, RouteGuard, TokenStore,
};
use cardmap_core::config::{Config, TokenBackend};
use cardmap_core::models::Merchant;
use cardmap_core::proximity::{GeoPoint, ProximityNotifier};
use cardmap_core::ApiClient;

/// Password variable read when no terminal prompt is wanted
const PASSWORD_ENV: &str = "CARDMAP_PASSWORD";

#[derive(Parser)]
#[command(name = "cardmap", version, about = "Find the best card for every store around you")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session tokens
    Login {
        #[arg(long, env = "CARDMAP_EMAIL")]
        email: Option<String>,
        /// Stay signed in for 7 days and allow silent token refresh
        #[arg(long)]
        remember: bool,
    },
    /// Sign out and forget the stored tokens
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Evaluate a route guard against the current session
    Guard {
        #[arg(value_enum)]
        kind: GuardArg,
    },
    /// Announce stores within reach along a path of positions
    Nearby {
        /// JSON file with an array of stores
        #[arg(long)]
        stores: PathBuf,
        /// Position as LAT,LON; repeat to walk a path
        #[arg(long = "at", value_parser = parse_point, required = true)]
        positions: Vec<GeoPoint>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GuardArg {
    Authenticated,
    Public,
}

impl From<GuardArg> for GuardKind {
    fn from(arg: GuardArg) -> Self {
        match arg {
            GuardArg::Authenticated => GuardKind::AuthenticatedOnly,
            GuardArg::Public => GuardKind::PublicOnly,
        }
    }
}

fn parse_point(s: &str) -> Result<GeoPoint, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON but got '{}'", s))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude '{}'", lat))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("invalid longitude '{}'", lon))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("position out of range: {}", s));
    }
    Ok(GeoPoint::new(lat, lon))
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn token_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.token_backend {
        TokenBackend::File => Arc::new(FileTokenStore::new(&config.cache_dir()?)),
        TokenBackend::Keyring => Arc::new(KeyringTokenStore::new()),
    };
    Ok(store)
}

fn build_session(config: &Config) -> Result<AuthSession> {
    let api = ApiClient::new(config, token_store(config)?).context("Failed to create API client")?;
    Ok(AuthSession::new(api))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    info!(api = %config.api_url(), "cardmap starting");

    match cli.command {
        Command::Login { email, remember } => login(&mut config, email, remember).await,
        Command::Logout => {
            build_session(&config)?.logout().await;
            println!("Signed out.");
            Ok(())
        }
        Command::Whoami => whoami(&config).await,
        Command::Guard { kind } => guard(&config, kind.into()).await,
        Command::Nearby { stores, positions } => nearby(&config, &stores, &positions),
    }
}

async fn login(config: &mut Config, email: Option<String>, remember: bool) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let session = build_session(config)?;
    let credentials = Credentials::new(email, password);
    session.login(&credentials, remember).await?;

    config.last_email = Some(credentials.email.clone());
    config.remember_me = remember;
    config.save()?;

    println!("Signed in as {}.", credentials.email);
    Ok(())
}

async fn whoami(config: &Config) -> Result<()> {
    let session = build_session(config)?;
    if !session.check_auth().await {
        println!("Not signed in.");
        return Ok(());
    }
    match session.state().user {
        Some(user) => println!("{} <{}> (id {})", user.display_name(), user.user_email, user.user_id),
        None => println!("Signed in."),
    }
    Ok(())
}

async fn guard(config: &Config, kind: GuardKind) -> Result<()> {
    let session = build_session(config)?;
    let mut guard = RouteGuard::mount(kind, &session, GuardRoutes::from_config(config));
    match guard.settle().await {
        GuardView::Pending => println!("pending"),
        GuardView::Render => println!("render"),
        GuardView::Redirect(to) => println!("redirect {}", to),
    }
    Ok(())
}

fn nearby(config: &Config, stores: &Path, positions: &[GeoPoint]) -> Result<()> {
    let contents = std::fs::read_to_string(stores)
        .with_context(|| format!("Failed to read stores file {}", stores.display()))?;
    let merchants: Vec<Merchant> =
        serde_json::from_str(&contents).context("Failed to parse stores file")?;

    let mut notifier = ProximityNotifier::new(config.proximity.clone());
    for position in positions {
        for notice in notifier.update(*position, &merchants) {
            println!("{}", notice.message);
        }
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
