//! Rollcall CLI
//!
//! Captures check-ins and registration changes into the local queue and
//! syncs them with the server when it is reachable.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use rollcall_core::tracing_init::init_tracing;
use rollcall_core::wire::ActionKind;

use rollcall_client::config::ClientConfig;
use rollcall_client::drain::{DrainError, DrainReport, QueueDrainer};
use rollcall_client::queue::{QueueDatabase, QueueStatus, STALE_SYNC_SECS};
use rollcall_client::transport::HttpTransport;

#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(version, about = "Rollcall offline check-in client", long_about = None)]
struct Cli {
    /// Server URL for this invocation (overrides the saved one).
    #[arg(long, global = true, env = "ROLLCALL_SERVER")]
    server: Option<String>,

    /// Queue database path (defaults to ~/.rollcall/queue.db).
    #[arg(long, global = true)]
    queue_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set the user whose actions are captured and synced.
    Login {
        #[arg(long)]
        owner: String,
    },
    /// Show or change saved settings.
    Config {
        /// Server base URL to save.
        #[arg(long)]
        server: Option<String>,
    },
    /// Queue a scanned check-in payload.
    Capture {
        #[arg(long)]
        event: String,
        /// The scanned payload, verbatim.
        #[arg(long)]
        payload: String,
    },
    /// Queue a registration for an event.
    Register {
        #[arg(long)]
        event: String,
    },
    /// Queue withdrawal from an event.
    Unregister {
        #[arg(long)]
        event: String,
    },
    /// Submit everything pending now.
    Sync,
    /// List queued actions.
    Queue {
        /// Include verified and rejected actions.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("rollcall_client=warn", false);

    let mut config = ClientConfig::load();

    match cli.command {
        Command::Login { owner } => {
            config.owner_id = Some(owner.clone());
            config.save()?;
            writeln!(io::stdout(), "Signed in as {owner}")?;
            Ok(())
        }
        Command::Config { server } => {
            let mut out = io::stdout();
            if let Some(url) = server {
                HttpTransport::new(&url)?;
                config.server_url = Some(url);
                config.save()?;
                writeln!(out, "Configuration saved.")?;
            }
            writeln!(
                out,
                "server: {}",
                config.server_url.as_deref().unwrap_or("(not set)")
            )?;
            writeln!(
                out,
                "owner:  {}",
                config.owner_id.as_deref().unwrap_or("(not signed in)")
            )?;
            Ok(())
        }
        Command::Capture { event, payload } => {
            let server = cli.server.or_else(|| config.server_url.clone());
            let db = open_queue(cli.queue_path).await?;
            enqueue_and_drain(&db, &config, server, ActionKind::CheckIn, &event, &payload).await
        }
        Command::Register { event } => {
            let server = cli.server.or_else(|| config.server_url.clone());
            let db = open_queue(cli.queue_path).await?;
            enqueue_and_drain(&db, &config, server, ActionKind::Register, &event, "").await
        }
        Command::Unregister { event } => {
            let server = cli.server.or_else(|| config.server_url.clone());
            let db = open_queue(cli.queue_path).await?;
            enqueue_and_drain(&db, &config, server, ActionKind::Unregister, &event, "").await
        }
        Command::Sync => {
            let owner = config.require_owner()?;
            let server = cli
                .server
                .or_else(|| config.server_url.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!("No server configured. Run: rollcall config --server <url>")
                })?;
            let db = open_queue(cli.queue_path).await?;
            let drainer = QueueDrainer::new(db, HttpTransport::new(&server)?);
            let report = drainer.drain(owner).await?;
            print_report(report)
        }
        Command::Queue { all } => {
            let owner = config.require_owner()?;
            let db = open_queue(cli.queue_path).await?;
            print_queue(&db, owner, all).await
        }
    }
}

async fn open_queue(explicit: Option<PathBuf>) -> anyhow::Result<QueueDatabase> {
    let path = match explicit {
        Some(path) => path,
        None => ClientConfig::queue_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?,
    };
    let db = QueueDatabase::open(&path).await?;
    db.recover_interrupted(STALE_SYNC_SECS).await?;
    Ok(db)
}

/// Queue the action, then try to sync straight away if a server is known.
/// Being offline is not an error: the action stays queued.
async fn enqueue_and_drain(
    db: &QueueDatabase,
    config: &ClientConfig,
    server: Option<String>,
    action: ActionKind,
    event_id: &str,
    payload: &str,
) -> anyhow::Result<()> {
    let owner = config.require_owner()?;
    let enqueued = db.enqueue(owner, action, event_id, payload).await?;

    let mut out = io::stdout();
    if enqueued.created {
        writeln!(out, "Queued {action} for {event_id}.")?;
    } else if enqueued.item.queue_status()? == QueueStatus::Syncing {
        writeln!(
            out,
            "An earlier {action} for {event_id} is syncing now; this capture was not kept. \
             Capture again if that one is rejected."
        )?;
    } else {
        writeln!(out, "{action} for {event_id} is already queued; kept the newest capture.")?;
    }

    let Some(server) = server else {
        writeln!(out, "No server configured; will sync later.")?;
        return Ok(());
    };
    let drainer = QueueDrainer::new(db.clone(), HttpTransport::new(&server)?);
    match drainer.drain(owner).await {
        Ok(report) => print_report(report)?,
        Err(DrainError::Transport(e)) => writeln!(out, "Offline ({e}); will sync later.")?,
        Err(e) => return Err(e.into()),
    }

    let item = db.get_item(&enqueued.item.local_id).await?;
    let reason = item.reason.as_deref().unwrap_or("");
    writeln!(out, "{action} {event_id}: {} {reason}", item.status)?;
    Ok(())
}

fn print_report(report: DrainReport) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match report {
        DrainReport::AlreadyRunning => writeln!(out, "A sync is already running.")?,
        DrainReport::Empty => writeln!(out, "Nothing to sync.")?,
        DrainReport::Completed {
            verified,
            rejected,
            returned,
        } => {
            writeln!(out, "Synced: {verified} verified, {rejected} rejected.")?;
            if returned > 0 {
                writeln!(out, "{returned} action(s) left for the next sync.")?;
            }
        }
    }
    Ok(())
}

async fn print_queue(db: &QueueDatabase, owner: &str, all: bool) -> anyhow::Result<()> {
    let items = db.list_items(owner, all).await?;
    let mut out = io::stdout();
    if items.is_empty() {
        writeln!(out, "Queue is empty")?;
        return Ok(());
    }
    writeln!(
        out,
        "{:<36} {:<10} {:<24} {:<8} REASON",
        "ID", "ACTION", "EVENT", "STATUS"
    )?;
    for item in &items {
        writeln!(
            out,
            "{:<36} {:<10} {:<24} {:<8} {}",
            item.local_id,
            item.action,
            item.event_id,
            item.status,
            item.reason.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}
