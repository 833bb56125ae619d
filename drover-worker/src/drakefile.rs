//! Pipeline document loading
//!
//! Pipelines are declared in a YAML Drakefile:
//!
//! ```yaml
//! specVersion: v0.7.0
//! jobs:
//!   build:
//!     primaryContainer:
//!       image: rust:1
//! pipelines:
//!   ci:
//!     triggers:
//!     - specUri: github.com/lovethedrake/drakespec-github
//!       config:
//!         checkSuite:
//!           branches:
//!             only: [main]
//!     jobs:
//!     - build
//! ```
//!
//! Job definitions are opaque here; only their names are checked. Trigger
//! configs are handed to triggers as JSON.

use drover_core::domain::pipeline::{Pipeline, TriggerSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Pipeline document versions this worker understands
pub const SUPPORTED_SPEC_VERSIONS: [&str; 2] = ["v0.6.0", "v0.7.0"];

/// Where the worker looks for the pipeline document, in order
pub const DRAKEFILE_LOCATIONS: [&str; 4] = [
    // event-supplied script, e.g. a manual run
    "/etc/brigade/script",
    // checked out with the repository
    "/vcs/Drakefile.yaml",
    "/etc/brigade-project/defaultScript",
    "/etc/brigade-default-script/Drakefile.yaml",
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not locate Drakefile.yaml")]
    NotFound,

    #[error("error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing pipeline document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("error encoding config of trigger {index} of pipeline {pipeline:?}: {source}")]
    TriggerConfig {
        pipeline: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("pipeline {pipeline:?} references undefined job {job:?}")]
    UndefinedJob { pipeline: String, job: String },
}

/// A loaded pipeline document
#[derive(Debug, Clone)]
pub struct Drakefile {
    pub spec_version: String,
    /// Pipelines ordered by name
    pub pipelines: Vec<Pipeline>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDrakefile {
    #[serde(default)]
    spec_version: String,
    #[serde(default)]
    jobs: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pipelines: BTreeMap<String, RawPipeline>,
}

#[derive(Deserialize)]
struct RawPipeline {
    #[serde(default)]
    triggers: Vec<RawTrigger>,
    #[serde(default)]
    jobs: Vec<RawJobRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrigger {
    spec_uri: String,
    #[serde(default)]
    config: Option<serde_yaml::Value>,
}

/// A pipeline's job entry, either a bare name or a name with dependencies
#[derive(Deserialize)]
#[serde(untagged)]
enum RawJobRef {
    Name(String),
    Entry {
        name: String,
        #[serde(default)]
        dependencies: Vec<String>,
    },
}

/// Finds the first non-empty pipeline document among `locations`
pub fn locate<P: AsRef<Path>>(locations: &[P]) -> Result<PathBuf, LoadError> {
    for location in locations {
        let path = location.as_ref();
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.len() > 0 => return Ok(path.to_path_buf()),
            Ok(_) => debug!("Skipping empty pipeline document {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
    Err(LoadError::NotFound)
}

/// Reads and parses the pipeline document at `path`
pub fn load_file(path: &Path) -> Result<Drakefile, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content)
}

/// Parses a pipeline document
pub fn parse(content: &str) -> Result<Drakefile, LoadError> {
    let raw: RawDrakefile = serde_yaml::from_str(content)?;

    if !SUPPORTED_SPEC_VERSIONS.contains(&raw.spec_version.as_str()) {
        warn!(
            "Pipeline document declares spec version {:?}; supported versions are {:?}",
            raw.spec_version, SUPPORTED_SPEC_VERSIONS
        );
    }

    let mut pipelines = Vec::with_capacity(raw.pipelines.len());
    for (name, raw_pipeline) in raw.pipelines {
        let mut triggers = Vec::with_capacity(raw_pipeline.triggers.len());
        for (index, trigger) in raw_pipeline.triggers.into_iter().enumerate() {
            let config = match trigger.config {
                None | Some(serde_yaml::Value::Null) => Vec::new(),
                Some(value) => {
                    serde_json::to_vec(&value).map_err(|source| LoadError::TriggerConfig {
                        pipeline: name.clone(),
                        index,
                        source,
                    })?
                }
            };
            triggers.push(TriggerSpec::new(trigger.spec_uri, config));
        }

        let mut jobs = Vec::with_capacity(raw_pipeline.jobs.len());
        for job in raw_pipeline.jobs {
            let (job, dependencies) = match job {
                RawJobRef::Name(job) => (job, Vec::new()),
                RawJobRef::Entry { name, dependencies } => (name, dependencies),
            };
            for referenced in std::iter::once(&job).chain(&dependencies) {
                if !raw.jobs.contains_key(referenced) {
                    return Err(LoadError::UndefinedJob {
                        pipeline: name,
                        job: referenced.clone(),
                    });
                }
            }
            jobs.push(job);
        }

        let mut pipeline = Pipeline::new(name, triggers);
        pipeline.jobs = jobs;
        pipelines.push(pipeline);
    }

    Ok(Drakefile {
        spec_version: raw.spec_version,
        pipelines,
    })
}
