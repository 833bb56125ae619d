//! Event domain types

use serde::{Deserialize, Serialize};

use crate::domain::project::Project;

/// An inbound event that may cause pipelines to run
///
/// Created once per orchestration run from the worker's event document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier for the event
    pub id: String,

    /// Identifier of the gateway that produced the event (e.g. "brigade.sh/github")
    pub source: String,

    /// Source-specific event type (e.g. "push", "check_suite:requested")
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub short_title: Option<String>,

    #[serde(default)]
    pub long_title: Option<String>,

    /// Source- and type-specific content, typically the raw webhook body
    #[serde(default)]
    pub payload: String,

    #[serde(default)]
    pub revision: Revision,

    /// The project that registered interest in this event
    pub project: Project,

    /// The worker assigned to handle this event
    pub worker: Worker,
}

impl Event {
    /// Returns the payload as raw bytes
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_bytes()
    }
}

/// VCS details for the event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    /// VCS commit id (e.g. the git SHA)
    #[serde(default)]
    pub commit: String,

    /// Full VCS reference, e.g. "refs/heads/main"
    #[serde(rename = "ref", default)]
    pub git_ref: String,
}

/// The worker handling the event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Worker identifier, also used to name per-build volume claims
    pub id: String,

    /// Build identifier, used to name per-build workloads
    #[serde(default = "generate_build_id")]
    pub build_id: String,

    #[serde(default)]
    pub log_level: Option<String>,
}

/// Generates a DNS-safe build id when the event document does not carry one
fn generate_build_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT_JSON: &str = r#"{
        "id": "evt-1",
        "source": "brigade.sh/github",
        "type": "push",
        "payload": "{\"ref\":\"refs/tags/v1.0.0\"}",
        "revision": { "commit": "abc123", "ref": "refs/tags/v1.0.0" },
        "project": {
            "id": "demo",
            "name": "demo",
            "repo": { "cloneURL": "https://github.com/example/demo.git" },
            "kubernetes": { "namespace": "builds" }
        },
        "worker": { "id": "evt-1-worker", "buildId": "b1" }
    }"#;

    #[test]
    fn test_event_deserialization() {
        let event: Event = serde_json::from_str(EVENT_JSON).unwrap();

        assert_eq!(event.event_type, "push");
        assert_eq!(event.revision.git_ref, "refs/tags/v1.0.0");
        assert_eq!(event.worker.build_id, "b1");
        assert_eq!(event.project.kubernetes.namespace, "builds");
        assert!(event.short_title.is_none());
        assert_eq!(event.payload_bytes(), br#"{"ref":"refs/tags/v1.0.0"}"#);
    }

    #[test]
    fn test_missing_build_id_is_generated() {
        let json = EVENT_JSON.replace(r#", "buildId": "b1""#, "");
        let event: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(event.worker.build_id.len(), 32);
        assert!(
            event
                .worker
                .build_id
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }
}
