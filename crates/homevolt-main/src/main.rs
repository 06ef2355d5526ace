// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Homevolt Monitor.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;
mod diagnostics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use homevolt_client::HomevoltClient;
use homevolt_core::{Coordinator, CoordinatorEvent, DeviceApi, FetchFailure};
use homevolt_types::{FieldGroup, TopologyChange};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "homevolt")]
#[command(author, version, about = "Homevolt battery system monitor")]
struct Cli {
    /// Path to the TOML configuration file (defaults to ./homevolt.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Poll the device until interrupted, logging topology and message changes
    Run,
    /// Check that the device is reachable and the credentials are accepted
    Check,
    /// Refresh everything once and print the redacted diagnostics export
    Diagnostics,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("homevolt=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    info!(host = %config.device.host, port = config.device.port, "Configuration loaded");

    let client = HomevoltClient::new(&config.client_settings())
        .context("Failed to create Homevolt client")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config, client).await,
        Commands::Check => check(&client).await,
        Commands::Diagnostics => print_diagnostics(&config, client).await,
    }
}

async fn run(config: &AppConfig, client: HomevoltClient) -> Result<()> {
    let api: Arc<dyn DeviceApi> = Arc::new(client);
    let coordinator = Arc::new(Coordinator::new(api, config.coordinator_config()));

    let logger = spawn_event_logger(&coordinator);
    let polling = Arc::clone(&coordinator).spawn();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("🛑 Shutting down");

    polling.abort();
    logger.abort();
    Ok(())
}

async fn check(client: &HomevoltClient) -> Result<()> {
    match client.validate_connection().await {
        Ok(ems) => {
            println!(
                "Connected to Homevolt at {} ({} battery modules, {} CT sensors)",
                client.base_url(),
                ems.aggregated.bms_info.len(),
                ems.sensors.iter().filter(|s| s.is_paired()).count()
            );
            Ok(())
        }
        Err(failure) => bail!(setup_message(&failure)),
    }
}

async fn print_diagnostics(config: &AppConfig, client: HomevoltClient) -> Result<()> {
    let api: Arc<dyn DeviceApi> = Arc::new(client);
    let coordinator = Coordinator::new(api, config.coordinator_config());
    coordinator.refresh().await;

    let snapshot = coordinator.snapshot();
    if !snapshot.freshness_state(FieldGroup::System).has_values() {
        warn!("Primary endpoint did not answer, export contains health records only");
    }

    let export = diagnostics::export(config, &coordinator.store().diagnostics_report())?;
    let pretty = serde_json::to_string_pretty(&export).context("Failed to format diagnostics")?;
    println!("{pretty}");
    Ok(())
}

/// User-facing explanation of a failed connectivity check
fn setup_message(failure: &FetchFailure) -> String {
    if failure.is_auth() {
        return "Authentication failed: check the device password".to_owned();
    }
    match failure {
        FetchFailure::Network { message, .. } => {
            format!("Cannot connect to the device: {message}")
        }
        FetchFailure::Timeout { .. } => "The device did not answer in time".to_owned(),
        FetchFailure::HttpStatus { status, .. } => {
            format!("The device returned HTTP status {status}")
        }
        FetchFailure::Decode { message, .. } => {
            format!("Unexpected response from the device, is this a Homevolt? ({message})")
        }
    }
}

/// Stand-in for the entity layer: log every coordinator event
fn spawn_event_logger(coordinator: &Coordinator) -> tokio::task::JoinHandle<()> {
    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CoordinatorEvent::Topology(event)) => match event.change {
                    TopologyChange::Added => {
                        info!(kind = %event.kind(), id = %event.id, "➕ Entity added");
                    }
                    TopologyChange::Removed => {
                        info!(kind = %event.kind(), id = %event.id, "➖ Entity removed");
                    }
                },
                Ok(CoordinatorEvent::MessagesChanged {
                    category,
                    previous,
                    current,
                }) => {
                    info!(%category, ?previous, ?current, "📨 Device messages changed");
                }
                Ok(CoordinatorEvent::SnapshotUpdated { cycle }) => {
                    debug!(cycle, "Snapshot updated");
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event logger lagging"),
                Err(RecvError::Closed) => {
                    error!("Coordinator event channel closed");
                    break;
                }
            }
        }
    })
}
