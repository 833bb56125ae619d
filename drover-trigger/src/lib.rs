//! Drover Triggers
//!
//! This crate decides which pipelines an inbound event activates. It provides:
//! - The `Trigger` and `JobStatusNotifier` capabilities
//! - `TriggerRegistry`, mapping trigger spec URIs to constructors
//! - The built-in trigger kinds (manual `brig` runs and GitHub webhooks)

pub mod notifier;
pub mod trigger;
pub mod triggers;

pub use notifier::{JobStatus, JobStatusNotifier, LogNotifier};
pub use trigger::{Trigger, TriggerBuilder, TriggerError, TriggerRegistry};
pub use triggers::{BRIG_SPEC_URI, BrigTrigger, GITHUB_SPEC_URI, GitHubTrigger};

pub use drover_core::domain::event::Event;
