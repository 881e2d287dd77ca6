// ============================================================================
// signals — CLI front end for the live signals client core
// ============================================================================
// Usage:
//   signals login --email you@example.com --password secret
//   signals me | subscription | terms | accept-terms | sales
//   signals pay --plan premium       Create a checkout session
//   signals feed [--limit 50]        Tail the live signal feed
//   signals status                   Show session and cached prefs
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use signals_core::{
    ApiClient, ApiConfig, ConnectionState, FeedBuffer, KeyringTokenStore, PrefsDb, RenderDecision,
    SignalStreamManager, StreamConfig, StreamEvent, SubscriptionTier,
};

const KEYRING_SERVICE: &str = "signals-client";
const KEYRING_USER: &str = "session";

/// Live signals client
#[derive(Parser)]
#[command(name = "signals", version, about = "Authenticate and tail the live signal feed")]
struct Cli {
    /// Base URL of the API (default: SIGNALS_API_URL env var)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and persist the session tokens
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// Activate an account with an emailed code
    Activate {
        #[arg(long)]
        code: String,
    },

    /// Request a password reset email
    ResetPassword {
        #[arg(long)]
        email: String,
    },

    /// Clear the session and stored tokens
    Logout,

    /// Show the authenticated profile
    Me,

    /// Show the current subscription
    Subscription,

    /// Show the latest terms of use
    Terms,

    /// Accept the latest terms of use
    AcceptTerms,

    /// List current sale offers
    Sales,

    /// Create a payment checkout session
    Pay {
        #[arg(long)]
        plan: String,
    },

    /// Tail the live signal feed (ctrl-c to stop)
    Feed {
        /// Maximum visible feed entries
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show session state and cached prefs
    Status,
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = ApiConfig::from_env();
    if let Some(url) = cli.api_url {
        config.base_url = url;
    }
    let store = Arc::new(KeyringTokenStore::new(KEYRING_SERVICE, KEYRING_USER));
    let client = ApiClient::new(config, store)?;

    match cli.command {
        Commands::Login { email, password } => cmd_login(&client, &email, &password).await,
        Commands::Register {
            email,
            password,
            name,
        } => {
            client.register(&email, &password, name.as_deref()).await?;
            println!("Registered. Check your inbox for the activation code.");
            Ok(())
        }
        Commands::Activate { code } => {
            client.activate(&code).await?;
            println!("Account activated.");
            Ok(())
        }
        Commands::ResetPassword { email } => {
            client.request_password_reset(&email).await?;
            println!("Password reset requested for {}.", email);
            Ok(())
        }
        Commands::Logout => {
            client.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        Commands::Me => cmd_me(&client).await,
        Commands::Subscription => cmd_subscription(&client).await,
        Commands::Terms => {
            let terms = client.latest_terms().await?;
            println!("=== Terms of Use (version {}) ===\n", terms.version);
            println!("{}", terms.content);
            Ok(())
        }
        Commands::AcceptTerms => {
            client.accept_latest().await?;
            println!("Latest terms accepted.");
            Ok(())
        }
        Commands::Sales => cmd_sales(&client).await,
        Commands::Pay { plan } => {
            let session = client.create_payment(&plan).await?;
            println!("Open this URL to complete checkout:\n{}", session.checkout_url);
            Ok(())
        }
        Commands::Feed { limit } => cmd_feed(&client, limit).await,
        Commands::Status => cmd_status(&client).await,
    }
}

async fn cmd_login(client: &ApiClient, email: &str, password: &str) -> Result<()> {
    client.login(email, password).await?;
    if let Ok(prefs) = PrefsDb::open(None) {
        let _ = prefs.set_last_login(Utc::now().timestamp());
    }
    println!("Logged in as {}.", email);
    Ok(())
}

async fn cmd_me(client: &ApiClient) -> Result<()> {
    let profile = client.me().await?;
    println!("id:    {}", profile.id);
    println!("email: {}", profile.email);
    if let Some(name) = profile.name {
        println!("name:  {}", name);
    }
    Ok(())
}

async fn cmd_subscription(client: &ApiClient) -> Result<()> {
    let info = client.subscription().await?;
    println!("tier:    {}", info.tier.display_name());
    if let Some(expires) = info.expires_at {
        println!("expires: {}", expires.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Ok(prefs) = PrefsDb::open(None) {
        let _ = prefs.set_tier(info.tier);
    }
    Ok(())
}

async fn cmd_sales(client: &ApiClient) -> Result<()> {
    let sales = client.sales().await?;
    if sales.is_empty() {
        println!("No active offers.");
        return Ok(());
    }
    for sale in sales {
        println!(
            "{:<24}  R$ {:>8.2}  {}",
            sale.title,
            sale.price_cents as f64 / 100.0,
            sale.description
        );
    }
    Ok(())
}

async fn cmd_feed(client: &ApiClient, limit: usize) -> Result<()> {
    let token = client
        .access_token()
        .await
        .context("not logged in — run `signals login` first")?;

    // Resolve the tier before subscribing; gating happens locally.
    let tier = match client.fetch_subscription_tier().await {
        Ok(tier) => tier,
        Err(e) => {
            warn!("could not resolve subscription tier, gating as Free: {}", e);
            SubscriptionTier::Free
        }
    };
    if let Ok(prefs) = PrefsDb::open(None) {
        let _ = prefs.set_tier(tier);
    }

    let manager = Arc::new(SignalStreamManager::new(StreamConfig::from_env()));
    let mut events = manager.subscribe();
    manager.start(&token).await?;

    let mut feed = FeedBuffer::new(limit, tier);
    println!(
        "Tailing live feed as {} (ctrl-c to stop)...",
        tier.display_name()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => render_event(&mut feed, &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("... fell behind, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    manager.stop().await;
    println!("\nFeed stopped.");
    Ok(())
}

fn render_event(feed: &mut FeedBuffer, event: &StreamEvent) {
    let changed = feed.apply(event);
    match event {
        StreamEvent::Signal(_) if changed => {
            if let Some(entry) = feed.entries().front() {
                match entry.decision {
                    RenderDecision::Full => println!(
                        "[{}] {} — {} {}  :: {}",
                        entry.signal.match_clock,
                        entry.signal.competition,
                        entry.signal.teams,
                        entry.signal.score,
                        entry.signal.action,
                    ),
                    RenderDecision::LockedTeaser => println!(
                        "[locked] {} — upgrade to Premium to view this signal",
                        entry.signal.competition,
                    ),
                }
            }
        }
        StreamEvent::State(state) => match state {
            ConnectionState::Connected => println!("-- connected --"),
            ConnectionState::Disconnected => println!("-- disconnected, retrying --"),
            ConnectionState::Connecting | ConnectionState::Error => {}
        },
        _ => {}
    }
}

async fn cmd_status(client: &ApiClient) -> Result<()> {
    let snap = client.session_snapshot().await;
    println!("=== Session ===");
    println!("authenticated:     {}", snap.authenticated);
    println!("refresh token:     {}", snap.has_refresh_token);
    println!("refresh in flight: {}", snap.refresh_in_flight);

    if let Ok(prefs) = PrefsDb::open(None) {
        println!("\n=== Prefs ({}) ===", prefs.path().display());
        match prefs.get_tier()? {
            Some(cached) => println!(
                "tier: {} (cached {})",
                cached.tier.display_name(),
                format_timestamp(cached.cached_at)
            ),
            None => println!("tier: (not cached)"),
        }
        match prefs.get_last_login()? {
            Some(ts) => println!("last login: {}", format_timestamp(ts)),
            None => println!("last login: (never)"),
        }
    }
    Ok(())
}
