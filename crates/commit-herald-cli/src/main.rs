// Rust guideline compliant 2026-10-19

//! CLI for the commit herald.
//!
//! Reads a JSON configuration, signs in to the chat network, clones every
//! configured repository into a scratch directory and then announces new
//! commits into the channel until interrupted.
//!
//! Usage:
//!  commit-herald [-v|-vv] config.json
//!
//! Notes:
//!  - The configuration is validated before any network activity; a bad file
//!    exits non-zero without connecting.
//!  - SIGINT/SIGTERM send the farewell, close the stream and exit with 0.
//!    A clone, fetch or batch in progress is abandoned, not drained.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{debug, error, info};

use commit_herald::watch::Cancel;
use commit_herald::{
    Config, Connection, Orchestrator, RepositoryWatcher, StopReason, StopSignal,
};

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "commit-herald",
    about = "Announce new commits of watched git repositories into a chat channel",
    version
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    debug!(
        "loaded {} repositories from {}",
        config.repos.len(),
        cli.config.display()
    );

    let stop = Arc::new(StopSignal::new());
    let connection = Arc::new(Connection::new(config.irc.clone()));
    install_signal_handlers(Arc::clone(&connection), Arc::clone(&stop))?;

    // Say goodbye on every exit path, including errors below.
    let connection = scopeguard::guard(connection, |c| c.disconnect());

    if let Err(e) = connection.connect().and_then(|()| connection.sign_in()) {
        if stop.reason() == Some(StopReason::Interrupted) {
            return Ok(());
        }
        return Err(e).context("signing in to the chat network");
    }

    info!("launching receive thread");
    let receiver = {
        let connection = Arc::clone(&*connection);
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("irc-receive".into())
            .spawn(move || {
                if let Err(e) = connection.run() {
                    error!("chat connection lost: {}", e);
                    stop.request(StopReason::ConnectionLost);
                }
            })
            .context("spawning receive thread")?
    };

    let cancel: Cancel = {
        let stop = Arc::clone(&stop);
        Arc::new(move || stop.is_requested())
    };
    let mut watchers = Vec::with_capacity(config.repos.len());
    for repo in &config.repos {
        if stop.is_requested() {
            break;
        }
        match RepositoryWatcher::open_with_cancel(repo, Arc::clone(&cancel)) {
            Ok(watcher) => watchers.push(watcher),
            Err(e) if stop.is_requested() => {
                debug!("clone of '{}' abandoned: {}", repo.name, e);
                break;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("preparing repository '{}'", repo.name))
            }
        }
    }

    let mut orchestrator =
        Orchestrator::new(Arc::clone(&*connection), watchers, config.announce.clone());
    let outcome = orchestrator.run(&stop);

    connection.disconnect();
    if receiver.join().is_err() {
        error!("receive thread panicked");
    }

    match (outcome, stop.reason()) {
        (_, Some(StopReason::Interrupted)) => {
            info!("interrupted, exiting");
            Ok(())
        }
        (Err(e), _) => Err(e).context("announcing commits"),
        (Ok(()), Some(StopReason::ConnectionLost)) => Err(anyhow!("chat connection lost")),
        (Ok(()), None) => Ok(()),
    }
}

/// Log level from `-v` count unless `RUST_LOG` is set.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_thread_names(verbose >= 1)
        .init();
}

/// On SIGINT/SIGTERM: farewell, close the stream, stop the poll loop.
fn install_signal_handlers(connection: Arc<Connection>, stop: Arc<StopSignal>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("received signal {}, disconnecting", sig);
                stop.request(StopReason::Interrupted);
                connection.disconnect();
            }
        })
        .context("spawning signal thread")?;
    Ok(())
}
