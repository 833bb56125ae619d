//! Source provisioner
//!
//! Clones a pipeline's source into the build's shared volume by running a
//! single-container pod and waiting for it to finish:
//! - Building the pod (labels, environment, secret references, resources)
//! - Creating it and watching it by name
//! - Waiting on the watch, a fixed timeout and the cancellation token
//!
//! Cancellation is not a failure: a cancelled wait returns
//! `Ok(SourceOutcome::Abandoned)` and the pod is left to the cluster, bounded
//! by its active deadline.

use drover_core::domain::event::Event;
use drover_core::domain::project::{DEFAULT_BUILD_STORAGE_SIZE, KubernetesConfig, Project};
use drover_core::domain::workload::{
    ClaimSpec, ClaimVolumeSource, Container, EnvVar, ImagePullPolicy, LocalObjectReference,
    ObjectMeta, PersistentVolumeClaim, Pod, PodPhase, PodSpec, ResourceRequirements,
    RestartPolicy, Volume, VolumeMount, WatchEventType, WatchObject,
};
use drover_core::quantity::{Quantity, QuantityError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterClient, ClusterError};

/// How long a source clone may take, measured from the start of provisioning
pub const SOURCE_CLONE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Image used for the clone container when the project names none
pub const DEFAULT_SIDECAR_IMAGE: &str = "brigadecore/git-sidecar:v1.1.0";

/// Job name suffix shared by every source clone pod
pub const SOURCE_CLONE_JOB: &str = "source-clone";

const SRC_DIR: &str = "/src";
const SRC_VOLUME_NAME: &str = "src";
const CONTAINER_NAME: &str = "source-cloner";
const HERITAGE: &str = "brigade";

const SSH_KEY_SECRET_KEY: &str = "sshKey";
const TOKEN_SECRET_KEY: &str = "github.token";

/// How a source clone ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    /// The clone pod succeeded
    Cloned,
    /// The run was cancelled before the clone finished (or started)
    Abandoned,
}

/// Errors raised while provisioning a pipeline's source
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("error parsing {field} quantity {value:?}: {source}")]
    InvalidQuantity {
        field: ResourceField,
        value: String,
        #[source]
        source: QuantityError,
    },

    #[error("error creating workspace volume claim {claim:?}: {source}")]
    CreateClaim {
        claim: String,
        #[source]
        source: ClusterError,
    },

    #[error("error creating source clone pod for pipeline {pipeline:?}: {source}")]
    CreatePod {
        pipeline: String,
        #[source]
        source: ClusterError,
    },

    #[error("error watching source clone pod {pod:?}: {source}")]
    Watch {
        pod: String,
        #[source]
        source: ClusterError,
    },

    #[error("source clone pod {pod:?} failed")]
    Failed { pod: String },

    #[error("source clone pod {pod:?} was deleted before completing")]
    Deleted { pod: String },

    #[error("received unexpected {kind:?} object when watching source clone pod {pod:?} for completion")]
    UnexpectedObject { pod: String, kind: String },

    #[error("watch on source clone pod {pod:?} ended before the pod completed")]
    WatchEnded { pod: String },

    #[error("timed out after {timeout:?} waiting for source clone pod {pod:?} to complete")]
    Timeout { pod: String, timeout: Duration },
}

/// A configurable resource amount in the project's cluster config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceField {
    LimitsCpu,
    LimitsMemory,
    RequestsCpu,
    RequestsMemory,
    BuildStorageSize,
}

impl ResourceField {
    const CLONE_CONTAINER: [ResourceField; 4] = [
        ResourceField::LimitsCpu,
        ResourceField::LimitsMemory,
        ResourceField::RequestsCpu,
        ResourceField::RequestsMemory,
    ];

    /// Resource name as used in requirement maps
    fn resource_name(self) -> &'static str {
        match self {
            ResourceField::LimitsCpu | ResourceField::RequestsCpu => "cpu",
            ResourceField::LimitsMemory | ResourceField::RequestsMemory => "memory",
            ResourceField::BuildStorageSize => "storage",
        }
    }

    fn configured(self, config: &KubernetesConfig) -> Option<&str> {
        let value = match self {
            ResourceField::LimitsCpu => config.vcs_sidecar_resources_limits_cpu.as_deref(),
            ResourceField::LimitsMemory => config.vcs_sidecar_resources_limits_memory.as_deref(),
            ResourceField::RequestsCpu => config.vcs_sidecar_resources_requests_cpu.as_deref(),
            ResourceField::RequestsMemory => {
                config.vcs_sidecar_resources_requests_memory.as_deref()
            }
            ResourceField::BuildStorageSize => Some(config.build_storage_size.as_str()),
        };
        value.filter(|v| !v.is_empty())
    }

    fn parse(self, value: &str) -> Result<Quantity, ProvisionError> {
        value
            .parse()
            .map_err(|source| ProvisionError::InvalidQuantity {
                field: self,
                value: value.to_string(),
                source,
            })
    }
}

impl fmt::Display for ResourceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceField::LimitsCpu => write!(f, "vcsSidecarResources.limits.cpu"),
            ResourceField::LimitsMemory => write!(f, "vcsSidecarResources.limits.memory"),
            ResourceField::RequestsCpu => write!(f, "vcsSidecarResources.requests.cpu"),
            ResourceField::RequestsMemory => write!(f, "vcsSidecarResources.requests.memory"),
            ResourceField::BuildStorageSize => write!(f, "buildStorageSize"),
        }
    }
}

/// Parses the clone container's resource limits and requests
///
/// Only configured values are applied; the first unparseable one aborts with
/// an error naming its field.
pub fn source_clone_resources(
    config: &KubernetesConfig,
) -> Result<ResourceRequirements, ProvisionError> {
    let mut resources = ResourceRequirements::default();

    for field in ResourceField::CLONE_CONTAINER {
        let Some(value) = field.configured(config) else {
            continue;
        };
        let quantity = field.parse(value)?;

        let target = match field {
            ResourceField::LimitsCpu | ResourceField::LimitsMemory => &mut resources.limits,
            _ => &mut resources.requests,
        };
        target.insert(field.resource_name().to_string(), quantity);
    }

    Ok(resources)
}

/// Parses the workspace claim's storage request
fn workspace_storage(config: &KubernetesConfig) -> Result<ResourceRequirements, ProvisionError> {
    let field = ResourceField::BuildStorageSize;
    let size = field
        .configured(config)
        .unwrap_or(DEFAULT_BUILD_STORAGE_SIZE);

    let mut resources = ResourceRequirements::default();
    resources
        .requests
        .insert(field.resource_name().to_string(), field.parse(size)?);
    Ok(resources)
}

/// Checks every resource quantity in the project's cluster config
///
/// Run once before any pipeline starts so a malformed project fails the
/// whole run instead of every pipeline separately.
pub fn validate_cluster_config(config: &KubernetesConfig) -> Result<(), ProvisionError> {
    source_clone_resources(config)?;
    workspace_storage(config)?;
    Ok(())
}

/// Name of the source clone pod for a pipeline within a build
pub fn source_clone_pod_name(pipeline_name: &str, build_id: &str) -> String {
    format!("{}-{}-{}", pipeline_name, SOURCE_CLONE_JOB, build_id)
}

/// Name of the claim backing a pipeline's shared source volume
pub fn source_claim_name(worker_id: &str, pipeline_name: &str) -> String {
    format!("{}-{}-src", worker_id, pipeline_name).to_lowercase()
}

/// Provisions pipeline source through the cluster
pub struct SourceProvisioner {
    cluster: Arc<dyn ClusterClient>,
    sidecar_image: String,
}

impl SourceProvisioner {
    /// Creates a new provisioner
    ///
    /// # Arguments
    /// * `cluster` - Cluster backend used to create and watch workloads
    /// * `sidecar_image` - Clone image used unless the project overrides it
    pub fn new(cluster: Arc<dyn ClusterClient>, sidecar_image: impl Into<String>) -> Self {
        Self {
            cluster,
            sidecar_image: sidecar_image.into(),
        }
    }

    /// Creates the claim backing the pipeline's shared source volume
    pub async fn create_workspace(
        &self,
        project: &Project,
        event: &Event,
        pipeline_name: &str,
    ) -> Result<(), ProvisionError> {
        let claim = self.build_claim(project, event, pipeline_name)?;
        self.cluster
            .create_volume_claim(&project.kubernetes.namespace, &claim)
            .await
            .map_err(|source| ProvisionError::CreateClaim {
                claim: claim.metadata.name.clone(),
                source,
            })
    }

    /// Clones the project's source for `pipeline_name` and waits for the clone
    ///
    /// Returns once the clone pod succeeds (`Cloned`), fails, times out, or
    /// the watch misbehaves (`Err`), or `cancel` fires (`Abandoned`).
    pub async fn provision_source(
        &self,
        cancel: &CancellationToken,
        project: &Project,
        event: &Event,
        pipeline_name: &str,
    ) -> Result<SourceOutcome, ProvisionError> {
        let deadline = Instant::now() + SOURCE_CLONE_TIMEOUT;

        if cancel.is_cancelled() {
            info!(
                "Run cancelled before source clone for pipeline {}",
                pipeline_name
            );
            return Ok(SourceOutcome::Abandoned);
        }

        let pod = self.build_pod(project, event, pipeline_name)?;
        let pod_name = pod.metadata.name.clone();
        let namespace = &project.kubernetes.namespace;

        self.cluster
            .create_pod(namespace, &pod)
            .await
            .map_err(|source| ProvisionError::CreatePod {
                pipeline: pipeline_name.to_string(),
                source,
            })?;

        let mut watch = self
            .cluster
            .watch_pod(namespace, &pod_name)
            .await
            .map_err(|source| ProvisionError::Watch {
                pod: pod_name.clone(),
                source,
            })?;

        info!("Waiting for source clone pod {}", pod_name);

        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                update = watch.recv() => {
                    let update = match update {
                        Some(Ok(update)) => update,
                        Some(Err(source)) => {
                            return Err(ProvisionError::Watch { pod: pod_name, source });
                        }
                        None => return Err(ProvisionError::WatchEnded { pod: pod_name }),
                    };
                    let pod = match update.object {
                        WatchObject::Pod(pod) => pod,
                        WatchObject::Other { kind } => {
                            return Err(ProvisionError::UnexpectedObject { pod: pod_name, kind });
                        }
                    };
                    match pod.phase {
                        PodPhase::Failed => return Err(ProvisionError::Failed { pod: pod_name }),
                        PodPhase::Succeeded => {
                            info!("Source clone pod {} succeeded", pod_name);
                            return Ok(SourceOutcome::Cloned);
                        }
                        phase if update.event_type == WatchEventType::Deleted => {
                            warn!("Source clone pod {} deleted in phase {:?}", pod_name, phase);
                            return Err(ProvisionError::Deleted { pod: pod_name });
                        }
                        phase => debug!("Source clone pod {} is {:?}", pod_name, phase),
                    }
                }
                _ = &mut timer => {
                    return Err(ProvisionError::Timeout {
                        pod: pod_name,
                        timeout: SOURCE_CLONE_TIMEOUT,
                    });
                }
                _ = cancel.cancelled() => {
                    info!("Stopped waiting for source clone pod {}: run cancelled", pod_name);
                    return Ok(SourceOutcome::Abandoned);
                }
            }
        }
    }

    /// Builds the source clone pod for a pipeline
    pub fn build_pod(
        &self,
        project: &Project,
        event: &Event,
        pipeline_name: &str,
    ) -> Result<Pod, ProvisionError> {
        let job_name = format!("{}-{}", pipeline_name, SOURCE_CLONE_JOB);
        let pod_name = source_clone_pod_name(pipeline_name, &event.worker.build_id);
        let kubernetes = &project.kubernetes;

        let labels = BTreeMap::from([
            ("heritage".to_string(), HERITAGE.to_string()),
            ("component".to_string(), "job".to_string()),
            ("jobname".to_string(), job_name),
            ("project".to_string(), project.id.clone()),
            ("worker".to_string(), event.worker.id.clone()),
            ("build".to_string(), event.worker.build_id.clone()),
        ]);

        let mut env = vec![
            EnvVar::literal("CI", "true"),
            EnvVar::literal("BRIGADE_BUILD_ID", &event.worker.build_id),
            EnvVar::literal("BRIGADE_COMMIT_ID", &event.revision.commit),
            EnvVar::literal("BRIGADE_COMMIT_REF", &event.revision.git_ref),
            EnvVar::literal("BRIGADE_EVENT_PROVIDER", &event.source),
            EnvVar::literal("BRIGADE_EVENT_TYPE", &event.event_type),
            EnvVar::literal("BRIGADE_PROJECT_ID", &project.id),
            EnvVar::literal("BRIGADE_REMOTE_URL", &project.repo.clone_url),
            EnvVar::literal("BRIGADE_WORKSPACE", SRC_DIR),
            EnvVar::literal("BRIGADE_PROJECT_NAMESPACE", &kubernetes.namespace),
            EnvVar::literal(
                "BRIGADE_SUBMODULES",
                project.repo.init_git_submodules.to_string(),
            ),
        ];
        // Credentials are referenced from the project's secret, never inlined
        if project.repo.has_ssh_key() {
            env.push(EnvVar::from_secret(
                "BRIGADE_REPO_KEY",
                &project.id,
                SSH_KEY_SECRET_KEY,
            ));
        }
        if project.repo.has_token() {
            env.push(EnvVar::from_secret(
                "BRIGADE_REPO_AUTH_TOKEN",
                &project.id,
                TOKEN_SECRET_KEY,
            ));
        }

        let container = Container {
            name: CONTAINER_NAME.to_string(),
            image: kubernetes
                .vcs_sidecar
                .clone()
                .filter(|image| !image.is_empty())
                .unwrap_or_else(|| self.sidecar_image.clone()),
            image_pull_policy: ImagePullPolicy::Always,
            env,
            volume_mounts: vec![VolumeMount {
                name: SRC_VOLUME_NAME.to_string(),
                mount_path: SRC_DIR.to_string(),
            }],
            resources: source_clone_resources(kubernetes)?,
        };

        let spec = PodSpec {
            restart_policy: RestartPolicy::Never,
            containers: vec![container],
            volumes: vec![Volume {
                name: SRC_VOLUME_NAME.to_string(),
                persistent_volume_claim: ClaimVolumeSource {
                    claim_name: source_claim_name(&event.worker.id, pipeline_name),
                },
            }],
            service_account_name: kubernetes.service_account.clone(),
            image_pull_secrets: kubernetes
                .image_pull_secrets
                .iter()
                .filter(|name| !name.is_empty())
                .map(|name| LocalObjectReference { name: name.clone() })
                .collect(),
            active_deadline_seconds: Some(SOURCE_CLONE_TIMEOUT.as_secs()),
        };

        Ok(Pod::new(
            ObjectMeta {
                name: pod_name,
                namespace: Some(kubernetes.namespace.clone()),
                labels,
            },
            spec,
        ))
    }

    fn build_claim(
        &self,
        project: &Project,
        event: &Event,
        pipeline_name: &str,
    ) -> Result<PersistentVolumeClaim, ProvisionError> {
        let kubernetes = &project.kubernetes;
        let resources = workspace_storage(kubernetes)?;

        Ok(PersistentVolumeClaim::new(
            ObjectMeta {
                name: source_claim_name(&event.worker.id, pipeline_name),
                namespace: Some(kubernetes.namespace.clone()),
                labels: BTreeMap::from([
                    ("heritage".to_string(), HERITAGE.to_string()),
                    ("component".to_string(), "workspace".to_string()),
                    ("project".to_string(), project.id.clone()),
                    ("worker".to_string(), event.worker.id.clone()),
                ]),
            },
            ClaimSpec {
                access_modes: vec!["ReadWriteOnce".to_string()],
                storage_class_name: kubernetes
                    .build_storage_class
                    .clone()
                    .filter(|class| !class.is_empty()),
                resources,
            },
        ))
    }
}
