//! Pipeline domain types

use serde::{Deserialize, Serialize};

/// A declarative build definition loaded from the pipeline document
///
/// The name is unique within a document and serves as the pipeline's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub triggers: Vec<TriggerSpec>,
    /// Names of the jobs this pipeline runs, in order
    pub jobs: Vec<String>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, triggers: Vec<TriggerSpec>) -> Self {
        Self {
            name: name.into(),
            triggers,
            jobs: Vec::new(),
        }
    }
}

/// A trigger attached to a pipeline
///
/// The spec URI selects the trigger kind; the config bytes are JSON whose
/// shape only that kind understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    pub spec_uri: String,
    #[serde(default)]
    pub config: Vec<u8>,
}

impl TriggerSpec {
    pub fn new(spec_uri: impl Into<String>, config: impl Into<Vec<u8>>) -> Self {
        Self {
            spec_uri: spec_uri.into(),
            config: config.into(),
        }
    }
}
