//! Project domain types
//!
//! A project is the registered build target. It is owned by the external
//! project store and is read-only for the duration of a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Storage size requested for a build's workspace claim when the project sets none
pub const DEFAULT_BUILD_STORAGE_SIZE: &str = "50Mi";

/// Project configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub repo: Repository,

    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    /// Project secrets, never logged
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("repo", &self.repo)
            .field("kubernetes", &self.kubernetes)
            .field("secrets", &format_args!("<{} redacted>", self.secrets.len()))
            .finish()
    }
}

/// VCS repository configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "cloneURL")]
    pub clone_url: String,

    #[serde(default)]
    pub ssh_key: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub init_git_submodules: bool,
}

impl Repository {
    /// Whether a non-empty SSH key is configured
    pub fn has_ssh_key(&self) -> bool {
        self.ssh_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Whether a non-empty auth token is configured
    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("clone_url", &self.clone_url)
            .field("ssh_key", &self.has_ssh_key().then_some("<redacted>"))
            .field("token", &self.has_token().then_some("<redacted>"))
            .field("init_git_submodules", &self.init_git_submodules)
            .finish()
    }
}

/// Cluster placement configuration for a project's workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    /// Namespace in which build workloads are created
    #[serde(default)]
    pub namespace: String,

    /// Image used for the source clone container, overriding the worker default
    #[serde(default)]
    pub vcs_sidecar: Option<String>,

    #[serde(default)]
    pub vcs_sidecar_resources_limits_cpu: Option<String>,

    #[serde(default)]
    pub vcs_sidecar_resources_limits_memory: Option<String>,

    #[serde(default)]
    pub vcs_sidecar_resources_requests_cpu: Option<String>,

    #[serde(default)]
    pub vcs_sidecar_resources_requests_memory: Option<String>,

    #[serde(default = "default_build_storage_size")]
    pub build_storage_size: String,

    #[serde(default)]
    pub build_storage_class: Option<String>,

    #[serde(default)]
    pub service_account: Option<String>,

    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
}

fn default_build_storage_size() -> String {
    DEFAULT_BUILD_STORAGE_SIZE.to_string()
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            vcs_sidecar: None,
            vcs_sidecar_resources_limits_cpu: None,
            vcs_sidecar_resources_limits_memory: None,
            vcs_sidecar_resources_requests_cpu: None,
            vcs_sidecar_resources_requests_memory: None,
            build_storage_size: default_build_storage_size(),
            build_storage_class: None,
            service_account: None,
            image_pull_secrets: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let project: Project = serde_json::from_str(
            r#"{ "id": "p", "repo": { "cloneURL": "git@example.com:p.git" } }"#,
        )
        .unwrap();

        assert_eq!(project.kubernetes.build_storage_size, "50Mi");
        assert!(project.kubernetes.image_pull_secrets.is_empty());
        assert!(!project.repo.init_git_submodules);
        assert!(!project.repo.has_token());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let project = Project {
            id: "p".to_string(),
            name: "p".to_string(),
            repo: Repository {
                clone_url: "git@example.com:p.git".to_string(),
                ssh_key: Some("-----BEGIN KEY-----".to_string()),
                token: Some("ghp_supersecret".to_string()),
                ..Default::default()
            },
            kubernetes: KubernetesConfig::default(),
            secrets: HashMap::from([("DB_PASSWORD".to_string(), "hunter2".to_string())]),
        };

        let rendered = format!("{:?}", project);
        assert!(!rendered.contains("BEGIN KEY"));
        assert!(!rendered.contains("ghp_supersecret"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_empty_credentials_are_absent() {
        let repo = Repository {
            ssh_key: Some(String::new()),
            token: None,
            ..Default::default()
        };
        assert!(!repo.has_ssh_key());
        assert!(!repo.has_token());
    }
}
