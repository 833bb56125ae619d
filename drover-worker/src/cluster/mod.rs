//! Cluster backend
//!
//! The worker treats the cluster purely as a resource lifecycle backend: it
//! creates pods and volume claims and watches a single pod by name. The
//! `ClusterClient` trait is the seam; `KubectlClient` drives a real cluster
//! through the `kubectl` binary.

mod kubectl;

#[cfg(test)]
pub mod fake;

pub use kubectl::KubectlClient;

use async_trait::async_trait;
use drover_core::domain::workload::{PersistentVolumeClaim, Pod, WatchEvent};
use thiserror::Error;
use tokio::sync::mpsc;

/// Stream of watch events for one pod
///
/// The stream ends (`recv()` returns `None`) when the underlying watch closes.
/// A watch that breaks delivers its error as the last item.
pub type PodWatch = mpsc::Receiver<Result<WatchEvent, ClusterError>>;

/// Errors raised by cluster operations
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The cluster tool could not be started or talked to
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The cluster rejected the request
    #[error("{command} failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// An object could not be encoded for submission
    #[error("failed to encode object: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Operations the worker needs from the cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Creates a pod in `namespace`
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), ClusterError>;

    /// Creates a persistent volume claim in `namespace`
    async fn create_volume_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), ClusterError>;

    /// Opens a watch scoped to the pod called `name`
    ///
    /// The first event reflects the pod's current state.
    async fn watch_pod(&self, namespace: &str, name: &str) -> Result<PodWatch, ClusterError>;
}
