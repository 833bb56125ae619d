use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::notifier::JobStatusNotifier;
use crate::triggers::{BRIG_SPEC_URI, BrigTrigger, GITHUB_SPEC_URI, GitHubTrigger};
use drover_core::domain::event::Event;

/// Errors raised while building or evaluating a trigger
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The trigger's configuration could not be parsed
    #[error("invalid trigger configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// A filter pattern in the configuration is not a valid regex
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The event payload does not have the shape this trigger expects
    #[error("malformed {event_type:?} event payload: {source}")]
    MalformedPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// A status notification could not be delivered
    #[error("failed to send job status notification: {0}")]
    Notification(String),
}

/// A constructed trigger, deciding whether an event activates a pipeline.
///
/// Triggers hold only their parsed configuration; evaluating one never
/// mutates it.
///
/// # Example
///
/// ```rust
/// use drover_trigger::{Event, JobStatusNotifier, LogNotifier, Trigger, TriggerError};
/// use std::sync::Arc;
///
/// struct Always;
///
/// impl Trigger for Always {
///     fn matches(&self, _event: &Event) -> Result<bool, TriggerError> {
///         Ok(true)
///     }
///
///     fn job_status_notifier(
///         &self,
///         event: &Event,
///     ) -> Result<Arc<dyn JobStatusNotifier>, TriggerError> {
///         Ok(Arc::new(LogNotifier::new(event.id.clone())))
///     }
/// }
/// ```
pub trait Trigger: Send + Sync {
    /// Returns whether the event satisfies this trigger's criteria.
    ///
    /// An error means the event could not be evaluated safely; callers treat
    /// it as fatal rather than as a non-match.
    fn matches(&self, event: &Event) -> Result<bool, TriggerError>;

    /// Returns the notifier used to report job status back to the system
    /// that produced the event.
    fn job_status_notifier(&self, event: &Event)
    -> Result<Arc<dyn JobStatusNotifier>, TriggerError>;
}

/// Constructor turning trigger config bytes into a trigger
pub type TriggerBuilder =
    Box<dyn Fn(&[u8]) -> Result<Box<dyn Trigger>, TriggerError> + Send + Sync>;

/// Registry mapping trigger spec URIs to their constructors
///
/// Built explicitly by the caller and passed to the pipeline selector, so
/// different binaries can support different trigger kinds against the same
/// pipeline document.
pub struct TriggerRegistry {
    builders: HashMap<String, TriggerBuilder>,
}

impl TriggerRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in trigger kinds
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(BRIG_SPEC_URI, |config| {
            Ok(Box::new(BrigTrigger::from_config(config)?) as Box<dyn Trigger>)
        });
        registry.register(GITHUB_SPEC_URI, |config| {
            Ok(Box::new(GitHubTrigger::from_config(config)?) as Box<dyn Trigger>)
        });
        registry
    }

    /// Registers a constructor for a spec URI
    ///
    /// # Panics
    /// Panics if a constructor is already registered for the URI
    pub fn register<F>(&mut self, spec_uri: impl Into<String>, builder: F)
    where
        F: Fn(&[u8]) -> Result<Box<dyn Trigger>, TriggerError> + Send + Sync + 'static,
    {
        let spec_uri = spec_uri.into();
        if self.builders.contains_key(&spec_uri) {
            panic!("Trigger spec '{}' is already registered", spec_uri);
        }
        self.builders.insert(spec_uri, Box::new(builder));
    }

    /// Gets the constructor for a spec URI
    pub fn get(&self, spec_uri: &str) -> Option<&TriggerBuilder> {
        self.builders.get(spec_uri)
    }

    /// Returns the supported spec URIs, sorted
    pub fn spec_uris(&self) -> Vec<&str> {
        let mut uris: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        uris.sort_unstable();
        uris
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::LogNotifier;

    struct Never;

    impl Trigger for Never {
        fn matches(&self, _event: &Event) -> Result<bool, TriggerError> {
            Ok(false)
        }

        fn job_status_notifier(
            &self,
            event: &Event,
        ) -> Result<Arc<dyn JobStatusNotifier>, TriggerError> {
            Ok(Arc::new(LogNotifier::new(event.id.clone())))
        }
    }

    #[test]
    fn test_trigger_registration() {
        let mut registry = TriggerRegistry::new();
        registry.register("example.com/never", |_| Ok(Box::new(Never) as Box<dyn Trigger>));

        assert_eq!(registry.spec_uris(), vec!["example.com/never"]);
        assert!(registry.get("example.com/never").is_some());
        assert!(registry.get("example.com/other").is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration() {
        let mut registry = TriggerRegistry::new();
        registry.register("example.com/never", |_| Ok(Box::new(Never) as Box<dyn Trigger>));
        registry.register("example.com/never", |_| Ok(Box::new(Never) as Box<dyn Trigger>));
    }

    #[test]
    fn test_defaults() {
        let registry = TriggerRegistry::with_defaults();
        assert_eq!(registry.spec_uris(), vec![BRIG_SPEC_URI, GITHUB_SPEC_URI]);

        let builder = registry.get(GITHUB_SPEC_URI).unwrap();
        assert!(builder(b"{}").is_ok());
        assert!(builder(b"{\"checkSuite\": 42}").is_err());
    }
}
