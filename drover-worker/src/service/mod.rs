//! Service layer
//!
//! Services carry the worker's run logic: choosing pipelines for an event,
//! running them concurrently and provisioning their source through the
//! cluster backend.

pub mod provisioner;
mod selector;
mod supervisor;

pub use provisioner::{ProvisionError, SourceProvisioner};
pub use selector::{PipelineSelector, SelectedPipeline, Selection};
pub use supervisor::ExecutionSupervisor;
