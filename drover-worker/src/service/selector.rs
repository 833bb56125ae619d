//! Pipeline selection
//!
//! Decides which pipelines an event activates by evaluating each pipeline's
//! triggers in declared order. The first matching trigger selects the
//! pipeline and supplies its job status notifier.

use drover_core::domain::event::Event;
use drover_core::domain::pipeline::Pipeline;
use drover_trigger::{JobStatusNotifier, TriggerRegistry};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;

/// A pipeline chosen to run, with the notifier its trigger handed out
#[derive(Clone)]
pub struct SelectedPipeline {
    pub pipeline: Pipeline,
    pub notifier: Arc<dyn JobStatusNotifier>,
}

/// Selected pipelines keyed by name
pub type Selection = BTreeMap<String, SelectedPipeline>;

impl fmt::Debug for SelectedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedPipeline")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

/// Evaluates pipeline triggers against an event
pub struct PipelineSelector<'a> {
    registry: &'a TriggerRegistry,
}

impl<'a> PipelineSelector<'a> {
    /// Creates a selector backed by `registry`
    pub fn new(registry: &'a TriggerRegistry) -> Self {
        Self { registry }
    }

    /// Evaluates one pipeline's triggers against the event
    ///
    /// Triggers whose spec URI is not registered are skipped. Evaluation
    /// stops at the first match; later triggers are never built.
    ///
    /// # Returns
    /// The matching trigger's notifier, or `None` if nothing matched
    pub fn evaluate(
        &self,
        pipeline: &Pipeline,
        event: &Event,
    ) -> Result<Option<Arc<dyn JobStatusNotifier>>, ExecutionError> {
        for (index, spec) in pipeline.triggers.iter().enumerate() {
            let Some(build) = self.registry.get(&spec.spec_uri) else {
                debug!(
                    "Pipeline {} trigger {} uses unsupported spec {}; skipping",
                    pipeline.name, index, spec.spec_uri
                );
                continue;
            };

            let trigger = build(&spec.config).map_err(|source| ExecutionError::TriggerConfig {
                pipeline: pipeline.name.clone(),
                index,
                spec_uri: spec.spec_uri.clone(),
                source,
            })?;

            let matched =
                trigger
                    .matches(event)
                    .map_err(|source| ExecutionError::TriggerEvaluation {
                        pipeline: pipeline.name.clone(),
                        index,
                        spec_uri: spec.spec_uri.clone(),
                        source,
                    })?;
            if !matched {
                continue;
            }

            let notifier =
                trigger
                    .job_status_notifier(event)
                    .map_err(|source| ExecutionError::Notifier {
                        pipeline: pipeline.name.clone(),
                        index,
                        spec_uri: spec.spec_uri.clone(),
                        source,
                    })?;
            return Ok(Some(notifier));
        }

        Ok(None)
    }

    /// Selects every pipeline the event activates
    ///
    /// Any trigger error aborts selection. A name seen twice keeps its first
    /// pipeline.
    pub fn select(
        &self,
        pipelines: &[Pipeline],
        event: &Event,
    ) -> Result<Selection, ExecutionError> {
        let mut selection = Selection::new();

        for pipeline in pipelines {
            if selection.contains_key(&pipeline.name) {
                warn!("Pipeline {} already selected; ignoring duplicate", pipeline.name);
                continue;
            }
            if let Some(notifier) = self.evaluate(pipeline, event)? {
                info!("Pipeline {} selected for event {}", pipeline.name, event.id);
                selection.insert(
                    pipeline.name.clone(),
                    SelectedPipeline {
                        pipeline: pipeline.clone(),
                        notifier,
                    },
                );
            }
        }

        Ok(selection)
    }
}
