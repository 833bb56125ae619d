//! In-memory cluster for tests

use async_trait::async_trait;
use drover_core::domain::workload::{
    PersistentVolumeClaim, Pod, PodPhase, PodSnapshot, WatchEvent, WatchEventType, WatchObject,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{ClusterClient, ClusterError, PodWatch};

/// What the fake does when a given pod is created and watched
#[derive(Debug, Clone)]
pub enum PodBehavior {
    /// Reports these phases in order, then keeps the watch open
    Phases(Vec<PodPhase>),
    /// Sends these watch events as-is, then keeps the watch open
    Events(Vec<WatchEvent>),
    /// Reports nothing and keeps the watch open forever
    Hang,
    /// Closes the watch without reporting anything
    EndStream,
    /// Rejects the pod creation
    RejectCreate,
    /// Ends the watch with a cluster error carrying this stderr
    WatchFails(String),
}

pub struct FakeCluster {
    behaviors: Mutex<HashMap<String, PodBehavior>>,
    default_behavior: PodBehavior,
    pub pods: Mutex<Vec<(String, Pod)>>,
    pub claims: Mutex<Vec<(String, PersistentVolumeClaim)>>,
    open_watches: Mutex<Vec<mpsc::Sender<Result<WatchEvent, ClusterError>>>>,
}

impl FakeCluster {
    /// Creates a fake where every pod succeeds unless told otherwise
    pub fn new() -> Self {
        Self::with_default(PodBehavior::Phases(vec![
            PodPhase::Pending,
            PodPhase::Running,
            PodPhase::Succeeded,
        ]))
    }

    pub fn with_default(default_behavior: PodBehavior) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            default_behavior,
            pods: Mutex::new(Vec::new()),
            claims: Mutex::new(Vec::new()),
            open_watches: Mutex::new(Vec::new()),
        }
    }

    /// Sets the behavior for the pod named `pod_name`
    pub fn on_pod(self, pod_name: impl Into<String>, behavior: PodBehavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(pod_name.into(), behavior);
        self
    }

    pub fn created_pods(&self) -> Vec<Pod> {
        self.pods.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    fn behavior(&self, pod_name: &str) -> PodBehavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(pod_name)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

pub fn pod_event(name: &str, phase: PodPhase) -> WatchEvent {
    WatchEvent {
        event_type: WatchEventType::Modified,
        object: WatchObject::Pod(PodSnapshot {
            name: name.to_string(),
            phase,
        }),
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), ClusterError> {
        if let PodBehavior::RejectCreate = self.behavior(&pod.metadata.name) {
            return Err(ClusterError::CommandFailed {
                command: "kubectl create pod".to_string(),
                exit_code: 1,
                stderr: format!("pods \"{}\" is forbidden", pod.metadata.name),
            });
        }
        self.pods
            .lock()
            .unwrap()
            .push((namespace.to_string(), pod.clone()));
        Ok(())
    }

    async fn create_volume_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), ClusterError> {
        self.claims
            .lock()
            .unwrap()
            .push((namespace.to_string(), claim.clone()));
        Ok(())
    }

    async fn watch_pod(&self, _namespace: &str, name: &str) -> Result<PodWatch, ClusterError> {
        let (tx, rx) = mpsc::channel(32);
        let events = match self.behavior(name) {
            PodBehavior::Phases(phases) => phases.into_iter().map(|p| pod_event(name, p)).collect(),
            PodBehavior::Events(events) => events,
            PodBehavior::Hang | PodBehavior::RejectCreate => Vec::new(),
            PodBehavior::EndStream => return Ok(rx),
            PodBehavior::WatchFails(stderr) => {
                tx.try_send(Err(ClusterError::CommandFailed {
                    command: "kubectl get pods --watch".to_string(),
                    exit_code: 1,
                    stderr,
                }))
                .expect("fake watch channel full");
                return Ok(rx);
            }
        };

        for event in events {
            tx.try_send(Ok(event)).expect("fake watch channel full");
        }
        self.open_watches.lock().unwrap().push(tx);
        Ok(rx)
    }
}
