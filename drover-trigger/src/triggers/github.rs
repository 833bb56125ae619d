//! Trigger for GitHub webhook events
//!
//! Supports two kinds of activation:
//! - check suite requests (`check_suite:requested`, `check_suite:rerequested`),
//!   filtered by head branch
//! - pushes of tags (`push` to `refs/tags/...`), filtered by tag name
//!
//! A section left out of the configuration never matches.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::notifier::{JobStatusNotifier, LogNotifier};
use crate::trigger::{Trigger, TriggerError};
use crate::triggers::filter::{RefFilter, RefFilterConfig};
use drover_core::domain::event::Event;

pub const GITHUB_SPEC_URI: &str = "github.com/lovethedrake/drakespec-github";

const GITHUB_SOURCE: &str = "brigade.sh/github";
const TAG_REF_PREFIX: &str = "refs/tags/";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GitHubConfig {
    #[serde(default)]
    check_suite: Option<CheckSuiteConfig>,
    #[serde(default)]
    tag: Option<RefFilterConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckSuiteConfig {
    #[serde(default)]
    branches: RefFilterConfig,
}

#[derive(Deserialize)]
struct CheckSuitePayload {
    check_suite: CheckSuite,
    repository: PayloadRepository,
}

#[derive(Deserialize)]
struct CheckSuite {
    head_branch: Option<String>,
    head_sha: String,
}

#[derive(Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    after: String,
    repository: PayloadRepository,
}

#[derive(Deserialize)]
struct PayloadRepository {
    full_name: String,
}

/// Which GitHub activity an event represents
enum Activity {
    CheckSuite,
    Push,
    Other,
}

impl Activity {
    fn of(event: &Event) -> Self {
        if event.source != GITHUB_SOURCE {
            return Activity::Other;
        }
        match event.event_type.as_str() {
            "check_suite:requested" | "check_suite:rerequested" => Activity::CheckSuite,
            "push" => Activity::Push,
            _ => Activity::Other,
        }
    }
}

/// Matches GitHub check suite requests and tag pushes
#[derive(Debug)]
pub struct GitHubTrigger {
    branches: Option<RefFilter>,
    tags: Option<RefFilter>,
}

impl GitHubTrigger {
    /// Builds the trigger from its JSON configuration
    pub fn from_config(config: &[u8]) -> Result<Self, TriggerError> {
        let config: GitHubConfig = if config.iter().all(u8::is_ascii_whitespace) {
            GitHubConfig::default()
        } else {
            serde_json::from_slice(config)?
        };

        Ok(Self {
            branches: config
                .check_suite
                .map(|cs| RefFilter::compile(&cs.branches))
                .transpose()?,
            tags: config
                .tag
                .map(|tags| RefFilter::compile(&tags))
                .transpose()?,
        })
    }

    fn parse<T: DeserializeOwned>(event: &Event) -> Result<T, TriggerError> {
        serde_json::from_slice(event.payload_bytes()).map_err(|source| {
            TriggerError::MalformedPayload {
                event_type: event.event_type.clone(),
                source,
            }
        })
    }
}

impl Trigger for GitHubTrigger {
    fn matches(&self, event: &Event) -> Result<bool, TriggerError> {
        match Activity::of(event) {
            Activity::CheckSuite => {
                let Some(branches) = &self.branches else {
                    return Ok(false);
                };
                let payload: CheckSuitePayload = Self::parse(event)?;
                // Check suites for forks without a branch carry no head_branch
                let Some(branch) = payload.check_suite.head_branch else {
                    debug!("Check suite for event {} has no head branch", event.id);
                    return Ok(false);
                };
                Ok(branches.allows(&branch))
            }
            Activity::Push => {
                let Some(tags) = &self.tags else {
                    return Ok(false);
                };
                let payload: PushPayload = Self::parse(event)?;
                match payload.git_ref.strip_prefix(TAG_REF_PREFIX) {
                    Some(tag) => Ok(tags.allows(tag)),
                    None => Ok(false),
                }
            }
            Activity::Other => Ok(false),
        }
    }

    fn job_status_notifier(
        &self,
        event: &Event,
    ) -> Result<Arc<dyn JobStatusNotifier>, TriggerError> {
        let (repo, commit) = match Activity::of(event) {
            Activity::CheckSuite => {
                let payload: CheckSuitePayload = Self::parse(event)?;
                (payload.repository.full_name, payload.check_suite.head_sha)
            }
            Activity::Push => {
                let payload: PushPayload = Self::parse(event)?;
                (payload.repository.full_name, payload.after)
            }
            Activity::Other => (event.project.repo.name.clone(), event.revision.commit.clone()),
        };

        Ok(Arc::new(LogNotifier::new(format!("{}@{}", repo, commit))))
    }
}
