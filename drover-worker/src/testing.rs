//! Shared fixtures for unit tests

use async_trait::async_trait;
use drover_core::domain::event::Event;
use drover_trigger::{JobStatus, JobStatusNotifier, TriggerError};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::cluster::KubectlClient;

pub const BUILD_ID: &str = "b1";
pub const WORKER_ID: &str = "evt-1";

/// An event for project `demo` in namespace `builds`
pub fn event() -> Event {
    serde_json::from_value(serde_json::json!({
        "id": "evt-1",
        "source": "brigade.sh/github",
        "type": "push",
        "payload": "{}",
        "revision": { "commit": "abc123", "ref": "refs/heads/main" },
        "project": {
            "id": "demo",
            "name": "demo",
            "repo": { "cloneURL": "https://github.com/example/demo.git" },
            "kubernetes": { "namespace": "builds" }
        },
        "worker": { "id": WORKER_ID, "buildId": BUILD_ID }
    }))
    .unwrap()
}

/// Notifier that remembers every status it was sent
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, JobStatus)>>,
}

impl RecordingNotifier {
    pub fn statuses(&self) -> Vec<JobStatus> {
        self.sent.lock().unwrap().iter().map(|(_, _, s)| *s).collect()
    }
}

#[async_trait]
impl JobStatusNotifier for RecordingNotifier {
    async fn notify(
        &self,
        pipeline: &str,
        job: &str,
        status: JobStatus,
    ) -> Result<(), TriggerError> {
        self.sent
            .lock()
            .unwrap()
            .push((pipeline.to_string(), job.to_string(), status));
        Ok(())
    }
}

/// A kubectl stand-in: a shell script in a temp dir, run through `sh`
pub struct ScriptedKubectl {
    dir: tempfile::TempDir,
}

impl ScriptedKubectl {
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kubectl.sh"), script).unwrap();
        Self { dir }
    }

    pub fn client(&self) -> KubectlClient {
        let script = self.path("kubectl.sh");
        KubectlClient::new("sh").with_args([script.to_string_lossy().into_owned()])
    }

    /// A path inside the script's directory
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
