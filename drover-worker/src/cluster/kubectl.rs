//! kubectl-backed cluster client
//!
//! Handles cluster access for the worker by shelling out to `kubectl`:
//! - Checking that kubectl is available
//! - Creating objects from JSON on stdin
//! - Watching a single pod and decoding the event stream
//!
//! A watch that kubectl ends with a non-zero exit is reported on the watch
//! stream as a [`ClusterError::CommandFailed`] carrying kubectl's stderr.

use async_trait::async_trait;
use drover_core::domain::workload::{
    PersistentVolumeClaim, Pod, WatchEvent, WatchEventType, WatchObject,
};
use serde::Deserialize;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ClusterClient, ClusterError, PodWatch};

/// Buffered watch events before the reader waits on the consumer
const WATCH_CHANNEL_CAPACITY: usize = 16;

const WATCH_COMMAND: &str = "kubectl get pods --watch";

/// Cluster client driving `kubectl`
#[derive(Debug, Clone)]
pub struct KubectlClient {
    program: String,
    global_args: Vec<String>,
}

impl KubectlClient {
    /// Creates a client using the given kubectl binary
    ///
    /// # Arguments
    /// * `program` - Path or name of the kubectl binary
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
        }
    }

    /// Adds arguments passed ahead of every command, e.g. `--context prod`
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.global_args);
        command
    }

    /// Checks that kubectl is installed and runnable
    pub async fn check_available(&self) -> Result<(), ClusterError> {
        let output = self
            .command()
            .args(["version", "--client"])
            .output()
            .await
            .map_err(|source| self.io_error(source))?;

        if !output.status.success() {
            return Err(command_failed("kubectl version", output.status, &output.stderr));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("kubectl is available: {}", version.trim());
        Ok(())
    }

    /// Submits a JSON-encoded object with `kubectl create`
    async fn create(&self, namespace: &str, kind: &str, body: Vec<u8>) -> Result<(), ClusterError> {
        let mut child = self
            .command()
            .args(["create", "--namespace", namespace, "--filename", "-", "--output", "name"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| self.io_error(source))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&body)
                .await
                .map_err(|source| self.io_error(source))?;
            // stdin is closed on drop so kubectl sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| self.io_error(source))?;

        if !output.status.success() {
            return Err(command_failed(
                &format!("kubectl create {}", kind),
                output.status,
                &output.stderr,
            ));
        }

        debug!(
            "Created {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> ClusterError {
        ClusterError::Io {
            program: self.program.clone(),
            source,
        }
    }
}

fn command_failed(command: &str, status: ExitStatus, stderr: &[u8]) -> ClusterError {
    ClusterError::CommandFailed {
        command: command.to_string(),
        exit_code: status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

/// Collects everything a child writes to one of its pipes
fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!("Failed to read kubectl stderr: {}", e);
        }
        buf
    })
}

#[async_trait]
impl ClusterClient for KubectlClient {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), ClusterError> {
        info!("Creating pod {} in namespace {}", pod.metadata.name, namespace);
        self.create(namespace, "pod", serde_json::to_vec(pod)?).await
    }

    async fn create_volume_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), ClusterError> {
        info!(
            "Creating volume claim {} in namespace {}",
            claim.metadata.name, namespace
        );
        self.create(namespace, "persistentvolumeclaim", serde_json::to_vec(claim)?)
            .await
    }

    async fn watch_pod(&self, namespace: &str, name: &str) -> Result<PodWatch, ClusterError> {
        let mut child = self
            .command()
            .args(["get", "pods", "--namespace", namespace])
            .arg(format!("--field-selector=metadata.name={}", name))
            .args(["--watch", "--output-watch-events", "--output", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| self.io_error(source))?;

        let (Some(mut stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(self.io_error(std::io::Error::other("kubectl output not captured")));
        };
        let stderr = drain(stderr);

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let pod_name = name.to_string();
        let program = self.program.clone();

        tokio::spawn(async move {
            // The child is owned here so kubectl is killed once the watcher goes away
            let mut child = child;
            let mut decoder = WatchDecoder::new();
            let mut chunk = vec![0u8; 8192];

            loop {
                let read = tokio::select! {
                    read = stdout.read(&mut chunk) => read,
                    _ = tx.closed() => {
                        debug!("Watch on pod {} dropped by consumer", pod_name);
                        return;
                    }
                };

                let n = match read {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(source) => {
                        warn!("Failed to read watch output for pod {}: {}", pod_name, source);
                        let _ = tx.send(Err(ClusterError::Io { program, source })).await;
                        return;
                    }
                };

                for event in decoder.push(&chunk[..n]) {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }

            let status = match child.wait().await {
                Ok(status) => status,
                Err(source) => {
                    let _ = tx.send(Err(ClusterError::Io { program, source })).await;
                    return;
                }
            };
            if status.success() {
                debug!("Watch on pod {} closed by kubectl", pod_name);
                return;
            }

            let stderr = stderr.await.unwrap_or_default();
            warn!("Watch on pod {} failed with {}", pod_name, status);
            let _ = tx
                .send(Err(command_failed(WATCH_COMMAND, status, &stderr)))
                .await;
        });

        Ok(rx)
    }
}

#[derive(Deserialize)]
struct RawWatchEvent {
    #[serde(rename = "type")]
    event_type: WatchEventType,
    object: serde_json::Value,
}

/// Incremental decoder for `kubectl --watch --output-watch-events -o json`
///
/// kubectl writes one JSON document per event with no framing, so bytes are
/// buffered until a complete document is available. Anything that is not a
/// watch event is surfaced as an error event carrying a non-pod object.
#[derive(Debug, Default)]
pub struct WatchDecoder {
    buffer: Vec<u8>,
}

impl WatchDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<WatchEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let consumed = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<RawWatchEvent>();
            let mut consumed = 0;
            loop {
                match stream.next() {
                    Some(Ok(raw)) => {
                        consumed = stream.byte_offset();
                        events.push(WatchEvent {
                            event_type: raw.event_type,
                            object: WatchObject::from_value(raw.object),
                        });
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        warn!("Undecodable watch output: {}", e);
                        consumed = self.buffer.len();
                        events.push(WatchEvent {
                            event_type: WatchEventType::Error,
                            object: WatchObject::Other {
                                kind: String::new(),
                            },
                        });
                        break;
                    }
                    None => {
                        consumed = self.buffer.len();
                        break;
                    }
                }
            }
            consumed
        };

        self.buffer.drain(..consumed);
        events
    }
}
