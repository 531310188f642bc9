use chrono::{DateTime, Local, Utc};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use std::path::PathBuf;
use studystore::config::PlatformChoice;
use studystore::notify::DeliveryWorker;
use studystore::reminder::read_tasks;
use studystore::{Capabilities, Config, Envelope, MigrationOutcome, NOT_SCHEDULED, Notification, ScheduleRequest};
use tokio::sync::mpsc;
use tracing::{Level, warn};

#[derive(Parser)]
#[command(name = "studystore")]
#[command(about = "StudyStore CLI - Persistence and task reminders for web and native platforms")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the config file (default: <config dir>/studystore/studystore.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding local storage and the native host database
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Platform to run as: auto, native or web
    #[arg(short, long, value_parser = parse_platform)]
    platform: Option<PlatformChoice>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected platform and its capabilities
    Platform,

    /// Print the value stored under a key
    Get { key: String },

    /// Store a value (parsed as JSON unless --raw)
    Set {
        key: String,
        value: String,
        /// Store the value as an opaque string
        #[arg(long)]
        raw: bool,
    },

    /// Remove a key
    Rm { key: String },

    /// List stored keys
    Keys,

    /// Remove every stored entry
    Clear,

    /// Copy entries from a previous web run into native storage
    Migrate,

    /// Ask for permission to display notifications
    Permission,

    /// Schedule a notification
    Schedule {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        /// When to deliver (RFC 3339, e.g. 2025-03-24T18:00:00+01:00)
        #[arg(long)]
        at: String,
        #[arg(long)]
        id: Option<i64>,
    },

    /// Cancel a pending notification
    Cancel { id: i64 },

    /// Cancel every pending notification
    CancelAll,

    /// List pending notifications
    Pending,

    /// Schedule reminders for the tasks in a JSON file (one task or an array)
    Remind { tasks: PathBuf },

    /// Deliver due notifications until interrupted
    Watch,
}

fn parse_platform(raw: &str) -> Result<PlatformChoice, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(PlatformChoice::Auto),
        other => match studystore::Platform::parse(other) {
            Some(studystore::Platform::Native) => Ok(PlatformChoice::Native),
            Some(studystore::Platform::Web) => Ok(PlatformChoice::Web),
            None => Err(format!("unknown platform '{}' (expected auto, native or web)", raw)),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(platform) = cli.platform {
        config.platform = platform;
    }

    let caps = Capabilities::build(&config)?;

    // Every start migrates first; the explicit command reports the outcome
    let outcome = caps.migrate().await;

    match cli.command {
        Commands::Platform => {
            println!("platform: {}", caps.platform().to_string().bold());
            println!("storage:  {}", caps.store().backend_name());
            println!(
                "delivery: {}",
                if caps.scheduler().can_deliver() {
                    "available".green()
                } else {
                    "unavailable".yellow()
                }
            );
            println!("data dir: {}", config.data_dir().display());
        }
        Commands::Get { key } => match caps.store().entry(&key).await {
            Some(Envelope::Json(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
            Some(Envelope::Raw(text)) => println!("{}", text),
            None => println!("{}", "(not set)".dimmed()),
        },
        Commands::Set { key, value, raw } => {
            let parsed = if raw {
                None
            } else {
                serde_json::from_str::<serde_json::Value>(&value).ok()
            };
            match parsed {
                Some(json) => caps.store().set(&key, &json).await?,
                None => caps.store().set_raw(&key, &value).await?,
            }
            println!("{} {}", "Stored".green(), key);
        }
        Commands::Rm { key } => {
            caps.store().remove(&key).await?;
            println!("{} {}", "Removed".green(), key);
        }
        Commands::Keys => {
            for key in caps.store().list_keys().await? {
                println!("{}", key);
            }
        }
        Commands::Clear => {
            caps.store().clear().await?;
            println!("{}", "Storage cleared".green());
        }
        Commands::Migrate => print_migration(outcome),
        Commands::Permission => {
            if caps.scheduler().request_permission().await {
                println!("{}", "Notification permission granted".green());
            } else {
                println!("{}", "Notification permission not granted".yellow());
            }
        }
        Commands::Schedule { title, body, at, id } => {
            let scheduled_at = DateTime::parse_from_rfc3339(&at)
                .with_context(|| format!("Invalid date '{}'", at))?
                .with_timezone(&Utc);
            let id = caps
                .scheduler()
                .schedule(ScheduleRequest {
                    title,
                    body,
                    scheduled_at,
                    id,
                })
                .await;
            print_schedule_result(id);
        }
        Commands::Cancel { id } => {
            caps.scheduler().cancel(id).await;
            println!("{} {}", "Cancelled".green(), id);
        }
        Commands::CancelAll => {
            caps.scheduler().cancel_all().await;
            println!("{}", "Cancelled all notifications".green());
        }
        Commands::Pending => {
            let pending = caps.scheduler().list_pending().await;
            if pending.is_empty() {
                println!("{}", "No pending notifications".dimmed());
            }
            for n in &pending {
                print_notification(n);
            }
        }
        Commands::Remind { tasks } => {
            let content = std::fs::read_to_string(&tasks).context("Failed to read tasks file")?;
            let entries = read_tasks(&content).context("Failed to parse tasks file")?;

            let binder = caps.binder();
            for (index, entry) in entries.into_iter().enumerate() {
                let task = match entry {
                    Ok(task) => task,
                    Err(e) => {
                        warn!(index, error = %e, "Skipping unreadable task");
                        println!("task #{}: {} ({})", index, "no reminder".dimmed(), e);
                        continue;
                    }
                };

                match binder.bind(&task).await {
                    Some(id) => {
                        print!("task {}: ", task.id);
                        print_schedule_result(id);
                    }
                    None => println!("task {}: {}", task.id, "no reminder".dimmed()),
                }
            }
        }
        Commands::Watch => {
            let host = caps
                .host()
                .cloned()
                .ok_or_else(|| eyre!("Notification delivery requires the native platform"))?;

            let (tx, mut rx) = mpsc::unbounded_channel();
            let worker = DeliveryWorker::spawn(host, tx, config.notifications.poll_interval());
            println!("{}", "Watching for due notifications (Ctrl-C to stop)".dimmed());

            loop {
                tokio::select! {
                    delivered = rx.recv() => match delivered {
                        Some(n) => print_notification(&n),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            worker.stop().await;
        }
    }

    Ok(())
}

fn print_migration(outcome: MigrationOutcome) {
    match outcome {
        MigrationOutcome::NotNative => println!("{}", "Not running natively, nothing to migrate".dimmed()),
        MigrationOutcome::AlreadyMigrated => println!("Storage already migrated"),
        MigrationOutcome::Migrated { copied } => println!("{} {} entries", "Migrated".green(), copied),
        MigrationOutcome::Failed { copied } => println!(
            "{} after {} entries, will retry on next start",
            "Migration failed".red(),
            copied
        ),
    }
}

fn print_schedule_result(id: i64) {
    if id == NOT_SCHEDULED {
        println!("{}", "not scheduled (no delivery capability)".yellow());
    } else {
        println!("{} {}", "scheduled notification".green(), id);
    }
}

fn print_notification(n: &Notification) {
    println!(
        "{:>14}  {}  {}",
        n.id.to_string().cyan(),
        n.scheduled_at.with_timezone(&Local).format("%d/%m/%Y %H:%M"),
        n.title.bold()
    );
    if !n.body.is_empty() {
        println!("{:>14}  {}", "", n.body);
    }
}
