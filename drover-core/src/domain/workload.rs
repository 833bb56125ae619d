//! Cluster workload model
//!
//! The subset of the cluster object model the worker creates and observes:
//! pods, persistent volume claims and watch events. Serialized field names
//! follow the cluster API so the objects can be handed to it verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::quantity::Quantity;

/// A single-run pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

impl Pod {
    pub fn new(metadata: ObjectMeta, spec: PodSpec) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            metadata,
            spec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub restart_policy: RestartPolicy,
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
    /// Wall-clock bound after which the cluster terminates the pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    Always,
    OnFailure,
    #[default]
    Never,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePullPolicy {
    #[default]
    Always,
    IfNotPresent,
    Never,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub image_pull_policy: ImagePullPolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

impl Container {
    /// Looks up an environment variable by name
    pub fn env_var(&self, name: &str) -> Option<&EnvVar> {
        self.env.iter().find(|e| e.name == name)
    }
}

/// An environment variable, given either literally or by secret reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    pub fn from_secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: SecretKeySelector {
                    name: secret.into(),
                    key: key.into(),
                },
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    pub secret_key_ref: SecretKeySelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub persistent_volume_claim: ClaimVolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimVolumeSource {
    pub claim_name: String,
}

/// Compute resources keyed by resource name ("cpu", "memory", "storage")
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,
}

impl ResourceRequirements {
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// A storage claim backing a shared build volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaim {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ClaimSpec,
}

impl PersistentVolumeClaim {
    pub fn new(metadata: ObjectMeta, spec: ClaimSpec) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "PersistentVolumeClaim".to_string(),
            metadata,
            spec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSpec {
    pub access_modes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    pub resources: ResourceRequirements,
}

/// Lifecycle phase reported for a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PodPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

/// Kind of change carried by a watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

/// One notification from a watch on a single pod
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub object: WatchObject,
}

/// The object carried by a watch event
#[derive(Debug, Clone, PartialEq)]
pub enum WatchObject {
    Pod(PodSnapshot),
    /// Anything that is not a pod, e.g. a `Status` accompanying an error event
    Other { kind: String },
}

impl WatchObject {
    /// Classifies a raw cluster object
    ///
    /// Objects whose kind is not `Pod`, or pods without a readable status,
    /// come back as [`WatchObject::Other`].
    pub fn from_value(value: serde_json::Value) -> Self {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default()
            .to_string();

        if kind != "Pod" {
            return WatchObject::Other { kind };
        }

        match serde_json::from_value::<RawPod>(value) {
            Ok(raw) => WatchObject::Pod(PodSnapshot {
                name: raw.metadata.name,
                phase: raw.status.phase.unwrap_or(PodPhase::Pending),
            }),
            Err(_) => WatchObject::Other { kind },
        }
    }
}

/// Observed state of a pod at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub name: String,
    pub phase: PodPhase,
}

#[derive(Deserialize)]
struct RawPod {
    metadata: RawMeta,
    #[serde(default)]
    status: RawPodStatus,
}

#[derive(Deserialize)]
struct RawMeta {
    name: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPodStatus {
    #[serde(default)]
    phase: Option<PodPhase>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pod_serializes_with_api_field_names() {
        let mut container = Container {
            name: "cloner".to_string(),
            image: "git:latest".to_string(),
            env: vec![EnvVar::from_secret("TOKEN", "proj", "github.token")],
            ..Default::default()
        };
        container
            .resources
            .limits
            .insert("cpu".to_string(), "500m".parse().unwrap());

        let pod = Pod::new(
            ObjectMeta {
                name: "p-source-clone-1".to_string(),
                ..Default::default()
            },
            PodSpec {
                containers: vec![container],
                ..Default::default()
            },
        );

        let value = serde_json::to_value(&pod).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["spec"]["restartPolicy"], "Never");
        assert_eq!(value["spec"]["containers"][0]["imagePullPolicy"], "Always");
        assert_eq!(
            value["spec"]["containers"][0]["env"][0]["valueFrom"]["secretKeyRef"]["key"],
            "github.token"
        );
        assert_eq!(
            value["spec"]["containers"][0]["resources"]["limits"]["cpu"],
            "500m"
        );
        assert!(value["spec"].get("volumes").is_none());
    }

    #[test]
    fn test_watch_object_pod_phase() {
        let object = WatchObject::from_value(json!({
            "kind": "Pod",
            "metadata": { "name": "clone" },
            "status": { "phase": "Succeeded", "startTime": "2024-01-01T00:00:00Z" }
        }));

        match object {
            WatchObject::Pod(pod) => {
                assert_eq!(pod.name, "clone");
                assert_eq!(pod.phase, PodPhase::Succeeded);
                assert!(pod.phase.is_terminal());
            }
            other => panic!("expected pod, got {:?}", other),
        }
    }

    #[test]
    fn test_watch_object_pending_without_status() {
        let object = WatchObject::from_value(json!({
            "kind": "Pod",
            "metadata": { "name": "clone" }
        }));
        assert!(matches!(
            object,
            WatchObject::Pod(PodSnapshot { phase: PodPhase::Pending, .. })
        ));
    }

    #[test]
    fn test_watch_object_unexpected_kind() {
        let object = WatchObject::from_value(json!({
            "kind": "Status",
            "message": "too old resource version"
        }));
        assert_eq!(
            object,
            WatchObject::Other {
                kind: "Status".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_phase_maps_to_unknown() {
        let phase: PodPhase = serde_json::from_str("\"Evicted\"").unwrap();
        assert_eq!(phase, PodPhase::Unknown);
        assert!(!phase.is_terminal());
    }
}
