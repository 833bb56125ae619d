//! Run-level errors
//!
//! Everything a run can fail with once the pipeline document and event are
//! loaded. Pipeline-scoped failures are collected by the supervisor and, when
//! there is more than one, returned together as a [`MultiError`].

use drover_trigger::TriggerError;
use std::fmt;
use thiserror::Error;

use crate::service::ProvisionError;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A trigger's configuration could not be turned into a trigger
    #[error("error parsing config for trigger {index} ({spec_uri}) of pipeline {pipeline:?}: {source}")]
    TriggerConfig {
        pipeline: String,
        index: usize,
        spec_uri: String,
        #[source]
        source: TriggerError,
    },

    /// A trigger could not decide whether the event matches it
    #[error("error evaluating trigger {index} ({spec_uri}) of pipeline {pipeline:?}: {source}")]
    TriggerEvaluation {
        pipeline: String,
        index: usize,
        spec_uri: String,
        #[source]
        source: TriggerError,
    },

    /// A matching trigger could not hand out its job status notifier
    #[error("error getting job status notifier from trigger {index} ({spec_uri}) of pipeline {pipeline:?}: {source}")]
    Notifier {
        pipeline: String,
        index: usize,
        spec_uri: String,
        #[source]
        source: TriggerError,
    },

    /// The project's cluster config holds an unusable resource amount
    #[error("invalid cluster config for project {project:?}: {source}")]
    ResourceConfig {
        project: String,
        #[source]
        source: ProvisionError,
    },

    #[error("pipeline {pipeline:?}: {source}")]
    Provisioning {
        pipeline: String,
        #[source]
        source: ProvisionError,
    },

    /// A pipeline's task panicked or was aborted before reporting
    #[error("pipeline {pipeline:?} did not complete: {message}")]
    Panicked { pipeline: String, message: String },

    #[error(transparent)]
    Multiple(#[from] MultiError),
}

/// Several errors from one run, kept in the order they were observed
#[derive(Debug)]
pub struct MultiError {
    errors: Vec<ExecutionError>,
}

impl MultiError {
    pub fn new(errors: Vec<ExecutionError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[ExecutionError] {
        &self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

/// Collapses a run's errors into its outcome
///
/// No errors is success, a single error is returned as-is and anything more
/// is wrapped in a [`MultiError`].
pub fn aggregate(mut errors: Vec<ExecutionError>) -> Result<(), ExecutionError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ExecutionError::Multiple(MultiError::new(errors))),
    }
}
