//! Worker configuration
//!
//! Every setting can be given as a flag or through its environment variable.

use clap::Parser;
use std::path::PathBuf;

use crate::cluster::KubectlClient;
use crate::service::provisioner::DEFAULT_SIDECAR_IMAGE;

/// Worker configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "drover-worker")]
#[command(about = "Runs the pipelines an event triggers", long_about = None)]
#[command(version)]
pub struct Config {
    /// Path of the event document handed to this worker
    #[arg(long, env = "DROVER_EVENT_PATH", default_value = "/var/event/event.json")]
    pub event_path: PathBuf,

    /// Pipeline document to use instead of searching the default locations
    #[arg(long, env = "DROVER_DRAKEFILE")]
    pub drakefile: Option<PathBuf>,

    /// kubectl binary used to talk to the cluster
    #[arg(long, env = "DROVER_KUBECTL", default_value = "kubectl")]
    pub kubectl: String,

    /// kubeconfig context to use instead of the current one
    #[arg(long, env = "DROVER_KUBECTL_CONTEXT")]
    pub kubectl_context: Option<String>,

    /// Image that clones pipeline source unless the project names its own
    #[arg(long, env = "DROVER_SIDECAR_IMAGE", default_value = DEFAULT_SIDECAR_IMAGE)]
    pub sidecar_image: String,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.event_path.as_os_str().is_empty() {
            anyhow::bail!("event_path cannot be empty");
        }

        if self
            .drakefile
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            anyhow::bail!("drakefile cannot be empty when given");
        }

        if self.kubectl.trim().is_empty() {
            anyhow::bail!("kubectl cannot be empty");
        }

        if self
            .kubectl_context
            .as_ref()
            .is_some_and(|context| context.trim().is_empty())
        {
            anyhow::bail!("kubectl_context cannot be empty when given");
        }

        if self.sidecar_image.trim().is_empty() {
            anyhow::bail!("sidecar_image cannot be empty");
        }

        Ok(())
    }

    /// Builds the kubectl client this configuration describes
    pub fn kubectl_client(&self) -> KubectlClient {
        let client = KubectlClient::new(self.kubectl.clone());
        match &self.kubectl_context {
            Some(context) => client.with_args(["--context", context.as_str()]),
            None => client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::try_parse_from(["drover-worker"]).unwrap();
        assert_eq!(config.kubectl, "kubectl");
        assert_eq!(config.sidecar_image, DEFAULT_SIDECAR_IMAGE);
        assert!(config.kubectl_context.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "drover-worker",
            "--event-path",
            "/tmp/event.json",
            "--drakefile",
            "/tmp/Drakefile.yaml",
            "--kubectl",
            "/usr/local/bin/kubectl",
        ])
        .unwrap();

        assert_eq!(config.event_path, PathBuf::from("/tmp/event.json"));
        assert_eq!(config.drakefile, Some(PathBuf::from("/tmp/Drakefile.yaml")));
        assert_eq!(config.kubectl, "/usr/local/bin/kubectl");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::try_parse_from(["drover-worker"]).unwrap();

        config.kubectl = String::new();
        assert!(config.validate().is_err());

        config.kubectl = "kubectl".to_string();
        config.sidecar_image = " ".to_string();
        assert!(config.validate().is_err());

        config.sidecar_image = DEFAULT_SIDECAR_IMAGE.to_string();
        config.drakefile = Some(PathBuf::new());
        assert!(config.validate().is_err());

        config.drakefile = None;
        config.kubectl_context = Some(String::new());
        assert!(config.validate().is_err());

        config.kubectl_context = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_kubectl_context_becomes_global_args() {
        let config = Config::try_parse_from(["drover-worker", "--kubectl-context", "staging"]).unwrap();
        assert_eq!(config.kubectl_context.as_deref(), Some("staging"));

        let client = format!("{:?}", config.kubectl_client());
        assert!(client.contains(r#"program: "kubectl""#));
        assert!(client.contains(r#"global_args: ["--context", "staging"]"#));

        let config = Config::try_parse_from(["drover-worker"]).unwrap();
        let client = format!("{:?}", config.kubectl_client());
        assert!(client.contains("global_args: []"));
    }
}
