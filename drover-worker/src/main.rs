//! Drover Worker
//!
//! Handles a single event: decides which pipelines it triggers and runs them.
//!
//! Architecture:
//! - Configuration: flags with environment fallbacks
//! - Drakefile: locating and parsing the pipeline document
//! - Cluster: pod and volume claim lifecycle through kubectl
//! - Services: pipeline selection, concurrent execution, source provisioning
//!
//! The worker exits non-zero if any selected pipeline fails. SIGINT and
//! SIGTERM stop every pipeline's waits without counting as a failure.

mod cluster;
mod config;
mod drakefile;
mod error;
mod service;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use drover_core::domain::event::Event;
use drover_trigger::TriggerRegistry;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::drakefile::{DRAKEFILE_LOCATIONS, SUPPORTED_SPEC_VERSIONS};
use crate::service::{ExecutionSupervisor, PipelineSelector, SourceProvisioner};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drover_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Drover Worker {} (pipeline spec versions {})",
        env!("CARGO_PKG_VERSION"),
        SUPPORTED_SPEC_VERSIONS.join(", ")
    );

    let config = Config::parse();
    config.validate()?;

    let event = load_event(&config.event_path)?;
    info!(
        "Loaded event {} ({} from {}) for project {}",
        event.id, event.event_type, event.source, event.project.id
    );

    let drakefile_path = match &config.drakefile {
        Some(path) => path.clone(),
        None => drakefile::locate(&DRAKEFILE_LOCATIONS)?,
    };
    info!("Loading pipelines from {}", drakefile_path.display());
    let drakefile = drakefile::load_file(&drakefile_path)
        .with_context(|| format!("Failed to load {}", drakefile_path.display()))?;
    info!(
        "Loaded {} pipeline(s), spec version {}",
        drakefile.pipelines.len(),
        drakefile.spec_version
    );

    let registry = TriggerRegistry::with_defaults();
    info!("Supported triggers: {}", registry.spec_uris().join(", "));
    let selection = PipelineSelector::new(&registry).select(&drakefile.pipelines, &event)?;
    if selection.is_empty() {
        info!("Event {} triggers no pipelines", event.id);
        return Ok(());
    }

    let kubectl = config.kubectl_client();
    kubectl
        .check_available()
        .await
        .context("kubectl is not usable")?;

    let provisioner = SourceProvisioner::new(Arc::new(kubectl), config.sidecar_image.clone());
    let supervisor = ExecutionSupervisor::new(Arc::new(provisioner));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    if let Err(e) = supervisor.execute(&cancel, &event, selection).await {
        error!("Build failed:\n{}", e);
        return Err(e.into());
    }

    if cancel.is_cancelled() {
        info!("Build cancelled");
    } else {
        info!("Build succeeded");
    }
    Ok(())
}

/// Reads the event document handed to this worker
fn load_event(path: &Path) -> Result<Event> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse event from {}", path.display()))
}

/// Waits for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, cancelling build"),
        _ = terminate => info!("Received SIGTERM, cancelling build"),
    }
}
