mod config;
mod digest;
mod fetch;
mod listing;
mod mail;
mod poller;
mod reload;
mod storage;
mod template;

use anyhow::Context;
use config::Generation;
use fetch::HttpFetcher;
use futures::StreamExt;
use mail::SmtpMailer;
use poller::ListingPoller;
use reload::ReloadController;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use std::{path::PathBuf, sync::Arc};
use storage::SeenSet;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with env-declared filters.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "adwatch=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    //
    // Load configuration. Without a config file there is nothing to do.
    let Some(config_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        let program = std::env::args().next().unwrap_or_else(|| "adwatch".into());
        eprintln!("Specify config-file:\n{program} adwatch.toml");
        std::process::exit(2);
    };

    tracing::info!("Starting adwatch");
    let generation = Generation::load(&config_path).context("Failed to load configuration")?;
    tracing::info!("Configuration loaded successfully");

    let seen = match &generation.config.state_file {
        Some(path) => SeenSet::load(path).context("Failed to load seen ads")?,
        None => SeenSet::new(),
    };

    //
    // Initialize components.
    let fetcher = HttpFetcher::new()?;
    let mailer = SmtpMailer::new(&generation.config.smtp_host, generation.config.smtp_port);
    let poller = Arc::new(ListingPoller::new(
        generation,
        seen,
        Box::new(fetcher),
        Box::new(mailer),
    ));

    //
    // Spawn the reload controller, fed by SIGHUP below.
    let (reload_send, reload_recv) = tokio::sync::mpsc::channel::<()>(1);
    let controller = ReloadController::new(poller.clone(), config_path, reload_recv);
    let reload_handle = tokio::spawn(controller.launch());

    //
    // Spawn our polling task.
    let poller_handle = tokio::spawn(async move { poller.launch().await });

    //
    // Handle signals.
    let mut signals = Signals::new(&[SIGHUP, SIGTERM, SIGINT, SIGQUIT])
        .context("Failed to register signal handlers")?;

    // Sends a message to shutdown_recv if any of the stop signals are received.
    let (shutdown_send, shutdown_recv) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            match signal {
                SIGHUP => {
                    // A reload already queued will pick up the latest file anyway.
                    if reload_send.try_send(()).is_err() {
                        tracing::debug!("Reload already pending, ignoring SIGHUP");
                    }
                }
                SIGTERM | SIGINT | SIGQUIT => {
                    let _ = shutdown_send.send(());
                    break;
                }
                _ => unreachable!(),
            }
        }
    });

    //
    // Wait for a signal, or for one of the tasks to exit prematurely.
    tokio::select! {
        biased;

        _ = shutdown_recv => tracing::info!("Received stop signal, shutting down"),
        _ = poller_handle => tracing::error!("Listing poller stopped unexpectedly, shutting down"),
        _ = reload_handle => tracing::error!("Reload controller stopped unexpectedly, shutting down"),
    }

    Ok(())
}
