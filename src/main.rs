use std::{io, process};

use tracing::debug;
use tracing_subscriber::EnvFilter;

use merit::cli;
use merit::config::Config;
use merit::model::{Record, ReviewEvent};
use merit::storage::Storage;
use merit::workflow::Desk;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    let Some(path) = config.database.clone().or_else(Storage::default_path) else {
        eprintln!("Could not determine home directory.");
        process::exit(1);
    };

    let storage = match Storage::new(path) {
        Ok(s) => s.with_timeout(config.store_timeout()),
        Err(e) => {
            eprintln!("Failed to initialize storage: {e}");
            process::exit(1);
        }
    };

    let mut desk = Desk::new(storage)
        .with_authorizer(config.policy.clone())
        .with_conflict_retries(config.conflict_retries);
    desk.observe(|record: &Record, event: &ReviewEvent| {
        debug!(
            record = %record.id,
            stage = %event.stage,
            decision = %event.decision,
            reviewer = %event.reviewer,
            note = %event.note,
            "trail event"
        );
    });

    if let Err(e) = cli::run(&config, &desk) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
