use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fanks_server::{store::Store, Config, PushDispatcher};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "fanks", about = "Fanks: share what you are thankful for", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Fanks HTTP server
    Serve {
        /// Port to listen on (default: $FANKS_PORT or 8080)
        #[arg(long, env = "FANKS_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $FANKS_HOST or 0.0.0.0)
        #[arg(long, env = "FANKS_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Send the daily reminder to every subscriber right now
    Notify,
    /// Print a random secret suitable for FANKS_COOKIE_STORE_SECRET
    GenSecret,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the filter so FANKS_LOG_LEVEL may live there too.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FANKS_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!(error = %e, "failed to load .env");
        }
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,
        Commands::Notify => cmd_notify().await,
        Commands::GenSecret => {
            println!("{}", gen_secret());
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let mut cfg = Config::from_env()?;
    cfg.host = host;
    cfg.port = port;
    fanks_server::run(cfg).await
}

async fn cmd_notify() -> Result<()> {
    let cfg = Config::from_env()?;
    let store = Store::open(&cfg.db_path).context("open store")?;
    let dispatcher = PushDispatcher::from_config(&cfg, store)?
        .context("FANKS_VAPID_PRIVATE_KEY_FILE is required to send notifications")?;

    let report = dispatcher.dispatch_all().await?;
    println!(
        "attempted {}, delivered {}, failed {}",
        report.attempted, report.delivered, report.failed
    );
    if report.failed > 0 {
        anyhow::bail!("{} notification(s) failed", report.failed);
    }
    Ok(())
}

fn gen_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
