//! Execution supervisor
//!
//! Runs every selected pipeline concurrently and gathers their results:
//! - One spawned task per pipeline (workspace, then source clone)
//! - Each task reports exactly one result over a shared channel
//! - The supervisor waits for every task before deciding the outcome
//!
//! The drain does not watch the cancellation token. Tasks stop on their own
//! once cancelled, so waiting for all of them never drops an error.

use drover_core::domain::event::Event;
use drover_trigger::{JobStatus, JobStatusNotifier};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{self, ExecutionError};
use crate::service::provisioner::{
    ProvisionError, SOURCE_CLONE_JOB, SourceOutcome, SourceProvisioner, validate_cluster_config,
};
use crate::service::selector::{SelectedPipeline, Selection};

/// Result reported by one pipeline task
struct Report {
    pipeline: String,
    result: Result<(), ExecutionError>,
}

/// Runs selected pipelines and aggregates their outcome
pub struct ExecutionSupervisor {
    provisioner: Arc<SourceProvisioner>,
}

impl ExecutionSupervisor {
    pub fn new(provisioner: Arc<SourceProvisioner>) -> Self {
        Self { provisioner }
    }

    /// Executes every pipeline in `selection`
    ///
    /// # Arguments
    /// * `cancel` - Stops every pipeline's waits when cancelled
    /// * `event` - The event being handled
    /// * `selection` - Pipelines to run, keyed by name
    ///
    /// # Returns
    /// `Ok(())` if every pipeline succeeded or stopped on cancellation, the
    /// only error if exactly one failed, and a multi-error otherwise
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        event: &Event,
        selection: Selection,
    ) -> Result<(), ExecutionError> {
        if selection.is_empty() {
            info!("No pipelines selected for event {}", event.id);
            return Ok(());
        }

        let project = &event.project;
        validate_cluster_config(&project.kubernetes).map_err(|source| {
            ExecutionError::ResourceConfig {
                project: project.id.clone(),
                source,
            }
        })?;

        info!(
            "Executing {} pipeline(s) for event {}",
            selection.len(),
            event.id
        );

        let event = Arc::new(event.clone());
        let (tx, mut rx) = mpsc::channel::<Report>(selection.len());
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(selection.len());

        for (name, selected) in selection {
            let provisioner = self.provisioner.clone();
            let cancel = cancel.clone();
            let event = event.clone();
            let tx = tx.clone();
            let pipeline = name.clone();

            let handle = tokio::spawn(async move {
                let result = run_pipeline(&provisioner, &cancel, &event, &selected).await;
                // The receiver outlives every task
                let _ = tx.send(Report { pipeline, result }).await;
            });
            handles.push((name, handle));
        }
        drop(tx);

        let mut errors = Vec::new();
        while let Some(report) = rx.recv().await {
            match report.result {
                Ok(()) => info!("Pipeline {} completed", report.pipeline),
                Err(e) => {
                    error!("Pipeline {} failed: {}", report.pipeline, e);
                    errors.push(e);
                }
            }
        }

        // A task that panicked never reported; its join error stands in
        for (pipeline, handle) in handles {
            if let Err(e) = handle.await {
                error!("Pipeline {} task ended abnormally: {}", pipeline, e);
                errors.push(ExecutionError::Panicked {
                    pipeline,
                    message: e.to_string(),
                });
            }
        }

        error::aggregate(errors)
    }
}

/// Runs one pipeline up to and including its source clone
async fn run_pipeline(
    provisioner: &SourceProvisioner,
    cancel: &CancellationToken,
    event: &Event,
    selected: &SelectedPipeline,
) -> Result<(), ExecutionError> {
    let name = selected.pipeline.name.as_str();
    let notifier = selected.notifier.as_ref();
    let project = &event.project;

    if cancel.is_cancelled() {
        info!("Run cancelled before pipeline {} started", name);
        notify(notifier, name, JobStatus::Cancelled).await;
        return Ok(());
    }

    notify(notifier, name, JobStatus::InProgress).await;

    let result = match provisioner.create_workspace(project, event, name).await {
        Ok(()) => provisioner.provision_source(cancel, project, event, name).await,
        Err(e) => Err(e),
    };
    notify(notifier, name, source_status(&result)).await;

    result
        .map(|_| ())
        .map_err(|source| ExecutionError::Provisioning {
            pipeline: name.to_string(),
            source,
        })
}

/// The job status a source clone ended with
fn source_status(result: &Result<SourceOutcome, ProvisionError>) -> JobStatus {
    match result {
        Ok(SourceOutcome::Cloned) => JobStatus::Success,
        Ok(SourceOutcome::Abandoned) => JobStatus::Cancelled,
        Err(ProvisionError::Timeout { .. }) => JobStatus::TimedOut,
        Err(_) => JobStatus::Failure,
    }
}

/// Reports a source clone status, logging instead of failing on errors
async fn notify(notifier: &dyn JobStatusNotifier, pipeline: &str, status: JobStatus) {
    if let Err(e) = notifier.notify(pipeline, SOURCE_CLONE_JOB, status).await {
        warn!(
            "Failed to report {} for job {} of pipeline {}: {}",
            status, SOURCE_CLONE_JOB, pipeline, e
        );
    }
}
