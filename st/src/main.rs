//! Solotab CLI
//!
//! Runs one instance of a session over a file-backed slot, or inspects and
//! repairs the slot from outside.

use std::fs::{self, OpenOptions};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use slotstore::{FileStore, Registry, SlotWatcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use solotab::cli::{Cli, Command};
use solotab::config::Config;
use solotab::signal::{FileSignalLog, SignalTail};
use solotab::{
    Coordinator, CoordinatorError, CoordinatorStatus, InstanceRuntime, Notice, ReleaseOutcome, SessionHook, State,
    process_identity, spawn_session_driver,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("solotab")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    // Several instances share one log, so append
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("solotab.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let dir = cli.dir.clone().unwrap_or_else(|| config.store.dir.clone());
    let key = cli.key.clone().unwrap_or_else(|| config.store.key.clone());

    debug!(command = ?cli.command, ?dir, %key, "main: dispatching command");
    match cli.command {
        Command::Run {
            no_transfer,
            no_reclaim_on_visible,
        } => cmd_run(&config, &dir, &key, no_transfer, no_reclaim_on_visible).await,
        Command::Status => cmd_status(&dir, &key),
        Command::Release { id } => cmd_release(&dir, &key, &id),
    }
}

fn cmd_status(dir: &Path, key: &str) -> Result<()> {
    let store = FileStore::open(dir).context("Failed to open slot store")?;
    match store.slot(key).read()? {
        Some(owner) => println!("{} {}", "Active instance:".bold(), owner.cyan()),
        None => println!("{} {}", "Active instance:".bold(), "none".dimmed()),
    }
    Ok(())
}

fn cmd_release(dir: &Path, key: &str, id: &str) -> Result<()> {
    let store = FileStore::open(dir).context("Failed to open slot store")?;
    if store.slot(key).clear_if_owned_by(id)? {
        info!(%id, %key, "Operator released stale claim");
        println!("{} Released {}", "✓".green(), id.cyan());
    } else {
        println!("{} {} does not hold {}, left unchanged", "✗".yellow(), key.cyan(), id);
    }
    Ok(())
}

/// Prints session lifecycle to the terminal
struct ConsoleSession;

#[async_trait]
impl SessionHook for ConsoleSession {
    async fn on_activated(&self, _status: CoordinatorStatus) -> Result<()> {
        println!("{} Session started", "▶".green());
        Ok(())
    }

    async fn on_deactivated(&self, _status: CoordinatorStatus) -> Result<()> {
        println!("{} Session stopped", "■".yellow());
        Ok(())
    }
}

fn print_status(status: &CoordinatorStatus) {
    let label = match status.state {
        State::Active => status.to_string().green(),
        State::Blocked => status.to_string().yellow(),
        State::Unavailable => status.to_string().red(),
        State::Claiming => status.to_string().normal(),
    };
    println!("{} {}", "Status:".bold(), label);
}

fn print_notice(status: &CoordinatorStatus) {
    if status.state == State::Unavailable {
        println!("{}", "Cannot coordinate instances: shared store unavailable".red());
        return;
    }
    if let Some(notice) = Notice::for_status(status) {
        match notice.action {
            Some(action) => println!("{} [{}: type 'force']", notice.message, action.bold()),
            None => println!("{}", notice.message),
        }
    }
}

async fn print_status_changes(mut rx: watch::Receiver<CoordinatorStatus>) {
    loop {
        let status = *rx.borrow_and_update();
        print_status(&status);
        print_notice(&status);
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Forward stdin lines from a plain thread; the channel closes on EOF
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

fn report(result: Result<CoordinatorStatus, CoordinatorError>) {
    if let Err(e) = result {
        println!("{} {}", "✗".red(), e);
    }
}

async fn cmd_run(config: &Config, dir: &Path, key: &str, no_transfer: bool, no_reclaim_on_visible: bool) -> Result<()> {
    let store = FileStore::open(dir).context("Failed to open slot store")?;
    let slot = Arc::new(store.slot(key));
    let signals = Arc::new(
        FileSignalLog::open(dir, config.signals.max_log_bytes, config.signals.capacity)
            .context("Failed to open signal log")?,
    );

    let _slot_watcher =
        SlotWatcher::new(Arc::clone(&slot), Duration::from_millis(config.watch.poll_interval_ms)).spawn();
    let _signal_tail =
        SignalTail::new(Arc::clone(&signals), Duration::from_millis(config.signals.poll_interval_ms)).spawn();

    let mut coordinator_config = config.coordinator.clone();
    if no_transfer {
        coordinator_config.transfer = false;
    }
    if no_reclaim_on_visible {
        coordinator_config.reclaim_on_visible = false;
    }

    let id = process_identity().clone();
    let coordinator = Coordinator::with_identity(id.clone(), coordinator_config, slot, signals);
    let (handle, task) = InstanceRuntime::spawn(coordinator);
    info!(%id, dir = %dir.display(), %key, "Instance started");
    println!("{} {} ({})", "Instance".bold(), id.short().cyan(), id.as_str().dimmed());

    let _session = spawn_session_driver(&handle, Arc::new(ConsoleSession));
    let _printer = tokio::spawn(print_status_changes(handle.watch_status()));

    let mut lines = spawn_stdin_reader();
    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => match line.trim() {
                    "force" => report(handle.force_activate().await),
                    "focus" => report(handle.visible().await),
                    "status" => print_status(&handle.status()),
                    "quit" => break,
                    "" => {}
                    other => println!("Unknown command '{}' (force, focus, status, quit)", other),
                },
                None => {
                    debug!("cmd_run: stdin closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let outcome = handle.shutdown().await?;
    task.await.context("Instance runtime panicked")?;

    match outcome {
        ReleaseOutcome::Released => println!("{} Released slot", "✓".green()),
        ReleaseOutcome::NotOwner | ReleaseOutcome::AlreadyReleased => {
            println!("{} Slot held by another instance, left unchanged", "•".dimmed())
        }
    }
    Ok(())
}
