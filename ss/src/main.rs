use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use slotstore::cli::{Cli, Command};
use slotstore::config::Config;
use slotstore::{FileStore, Registry, SlotEvent, SlotWatcher};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store_path = cli.dir.clone().unwrap_or(config.store_path.clone());

    info!("slotstore starting");

    let store = FileStore::open(&store_path).context("Failed to open slot store")?;

    match cli.command {
        Command::Get { key } => match store.slot(&key).read()? {
            Some(value) => println!("{}", value),
            None => println!("{}", "(empty)".dimmed()),
        },
        Command::Set { key, value } => {
            store.slot(&key).write(&value)?;
            println!("{} {} = {}", "✓".green(), key.cyan(), value);
        }
        Command::ClearIf { key, value } => {
            if store.slot(&key).clear_if_owned_by(&value)? {
                println!("{} Cleared {}", "✓".green(), key.cyan());
            } else {
                println!("{} {} does not hold {}, left unchanged", "✗".yellow(), key.cyan(), value);
            }
        }
        Command::List => {
            let keys = store.keys()?;
            if keys.is_empty() {
                println!("No slots found");
            } else {
                for key in keys {
                    let value = store.slot(&key).read()?.unwrap_or_default();
                    println!("{} {}", key.cyan(), value);
                }
            }
        }
        Command::Watch { key, interval_ms } => {
            let slot = Arc::new(store.slot(&key));
            let mut changes = slot.subscribe();
            let interval = Duration::from_millis(interval_ms.unwrap_or(config.poll_interval_ms));
            let _guard = SlotWatcher::new(Arc::clone(&slot), interval).spawn();

            println!("Watching {} (current: {})", key.cyan(), slot.read()?.unwrap_or_default());
            loop {
                tokio::select! {
                    event = changes.recv() => match event {
                        Some(SlotEvent::Changed(change)) => println!(
                            "{} {} -> {}",
                            key.cyan(),
                            change.old_value.unwrap_or_default().dimmed(),
                            change.new_value.unwrap_or_default()
                        ),
                        Some(SlotEvent::Missed(n)) => println!("{} missed {} changes", "!".yellow(), n),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}
