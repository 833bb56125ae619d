//! Job status notification
//!
//! A notifier is handed out by the trigger that claimed an event and is used
//! to report job progress back to the system that produced the event.

use async_trait::async_trait;
use std::fmt;
use tracing::info;

use crate::trigger::TriggerError;

/// Status of a job within a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    InProgress,
    Success,
    Failure,
    Cancelled,
    TimedOut,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::InProgress => write!(f, "in progress"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failure => write!(f, "failure"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Capability for reporting job status upstream
#[async_trait]
pub trait JobStatusNotifier: Send + Sync {
    /// Reports that `job` of `pipeline` has reached `status`
    async fn notify(&self, pipeline: &str, job: &str, status: JobStatus)
    -> Result<(), TriggerError>;
}

/// Notifier that records status transitions in the worker log
///
/// Used by triggers whose originating system has no status API.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    target: String,
}

impl LogNotifier {
    /// Creates a notifier labelled with `target` (an event id, a repo@commit, ...)
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl JobStatusNotifier for LogNotifier {
    async fn notify(
        &self,
        pipeline: &str,
        job: &str,
        status: JobStatus,
    ) -> Result<(), TriggerError> {
        info!(
            subject = %self.target,
            pipeline,
            job,
            "Job status: {}",
            status
        );
        Ok(())
    }
}
