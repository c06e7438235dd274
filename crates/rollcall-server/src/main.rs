//! Rollcall Server
//!
//! HTTP server for check-in tokens, offline sync, and event registration.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use rollcall_core::config::{Config, default_database_path, load_config};
use rollcall_core::tracing_init::init_tracing;

use rollcall_server::auth::CheckinTokenManager;
use rollcall_server::server::{AppState, build_router};
use rollcall_server::storage::{CreateEventParams, EventStatus, ServerDatabase};

#[derive(Parser, Debug)]
#[command(name = "rollcall-server")]
#[command(version, about = "Rollcall server - check-in tokens, offline sync, registration")]
struct Args {
    /// Path to a JSON config file layered over the global one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Address to listen on.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Server-wide check-in token signing key.
        #[arg(long, env = "ROLLCALL_TOKEN_SECRET", hide_env_values = true)]
        token_secret: Option<String>,

        /// Check-in token scan window in seconds.
        #[arg(long)]
        scan_window: Option<i64>,
    },

    /// Provision an event and print its id and shared secret.
    CreateEvent {
        /// Host user id.
        #[arg(long)]
        host: String,

        #[arg(long)]
        title: String,

        /// Start time, unix seconds.
        #[arg(long)]
        starts_at: i64,

        /// End time, unix seconds.
        #[arg(long)]
        ends_at: i64,

        /// Maximum confirmed registrations. Omit for unlimited.
        #[arg(long)]
        capacity: Option<i64>,

        /// Skill awarded on attendance. Repeatable.
        #[arg(long = "skill")]
        skills: Vec<String>,
    },

    /// Replace an event's shared secret, invalidating its issued tokens.
    RotateSecret {
        event_id: String,
    },

    /// Move an event to `upcoming`, `active` or `completed`.
    SetStatus {
        event_id: String,

        status: EventStatus,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("rollcall_server=info,tower_http=info", args.log_json);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(path) = args.db_path {
        config.server.database_path = Some(path);
    }

    match args.command {
        Command::Serve {
            addr,
            token_secret,
            scan_window,
        } => {
            if let Some(addr) = addr {
                config.server.listen_addr = addr.to_string();
            }
            if token_secret.is_some() {
                config.server.token_secret = token_secret;
            }
            if let Some(secs) = scan_window {
                anyhow::ensure!(secs > 0, "--scan-window must be positive");
                config.checkin.scan_window_secs = secs;
            }
            serve(config).await
        }
        Command::CreateEvent {
            host,
            title,
            starts_at,
            ends_at,
            capacity,
            skills,
        } => {
            anyhow::ensure!(ends_at >= starts_at, "--ends-at must not precede --starts-at");
            anyhow::ensure!(
                capacity.is_none_or(|c| c >= 0),
                "--capacity must not be negative"
            );
            let db = open_database(&config).await?;
            let id = uuid::Uuid::new_v4().to_string();
            let secret = new_event_secret();
            db.create_event(&CreateEventParams {
                id: &id,
                host_id: &host,
                title: &title,
                starts_at,
                ends_at,
                capacity,
                host_secret: &secret,
            })
            .await?;
            for name in &skills {
                let skill = db.ensure_skill(&uuid::Uuid::new_v4().to_string(), name).await?;
                db.link_event_skill(&id, &skill.id).await?;
            }

            let mut out = io::stdout();
            writeln!(out, "Event created.")?;
            writeln!(out, "  id:     {id}")?;
            writeln!(out, "  secret: {secret}")?;
            if !skills.is_empty() {
                writeln!(out, "  skills: {}", skills.join(", "))?;
            }
            Ok(())
        }
        Command::RotateSecret { event_id } => {
            let db = open_database(&config).await?;
            let secret = new_event_secret();
            db.rotate_event_secret(&event_id, &secret).await?;
            info!(event_id = %event_id, "Event secret rotated");
            writeln!(io::stdout(), "New secret for {event_id}: {secret}")?;
            Ok(())
        }
        Command::SetStatus { event_id, status } => {
            let db = open_database(&config).await?;
            db.update_event_status(&event_id, status).await?;
            info!(event_id = %event_id, status = %status, "Event status updated");
            writeln!(io::stdout(), "Event {event_id} is now {status}")?;
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let secret = config
        .server
        .token_secret
        .clone()
        .context("No token secret configured; set ROLLCALL_TOKEN_SECRET or --token-secret")?;
    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.listen_addr))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        scan_window_secs = config.checkin.scan_window_secs,
        accept_legacy = config.checkin.accept_legacy_payloads,
        "Starting rollcall-server"
    );

    let db = open_database(&config).await?;
    let tokens = Arc::new(CheckinTokenManager::new(
        secret.as_bytes(),
        config.checkin.scan_window_secs,
    ));
    let app = build_router(AppState::new(db, tokens, config.checkin));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn open_database(config: &Config) -> anyhow::Result<ServerDatabase> {
    let path = match &config.server.database_path {
        Some(path) => path.clone(),
        None => default_database_path().context("Cannot determine data directory")?,
    };
    info!(path = %path.display(), "Opening server database");
    Ok(ServerDatabase::open(&path).await?)
}

fn new_event_secret() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
