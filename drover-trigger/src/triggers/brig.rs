//! Trigger for manual runs requested through the `brig` CLI

use serde::Deserialize;
use std::sync::Arc;

use crate::notifier::{JobStatusNotifier, LogNotifier};
use crate::trigger::{Trigger, TriggerError};
use drover_core::domain::event::Event;

pub const BRIG_SPEC_URI: &str = "github.com/lovethedrake/drakespec-brig";

const CLI_SOURCE: &str = "brigade.sh/cli";
const EXEC_EVENT_TYPE: &str = "exec";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BrigConfig {}

/// Matches `exec` events submitted from the CLI
#[derive(Debug)]
pub struct BrigTrigger {
    _config: BrigConfig,
}

impl BrigTrigger {
    /// Builds the trigger from its JSON configuration
    ///
    /// The trigger takes no options; empty configuration is accepted.
    pub fn from_config(config: &[u8]) -> Result<Self, TriggerError> {
        let config = if config.iter().all(u8::is_ascii_whitespace) {
            BrigConfig::default()
        } else {
            serde_json::from_slice(config)?
        };
        Ok(Self { _config: config })
    }
}

impl Trigger for BrigTrigger {
    fn matches(&self, event: &Event) -> Result<bool, TriggerError> {
        Ok(event.source == CLI_SOURCE && event.event_type == EXEC_EVENT_TYPE)
    }

    fn job_status_notifier(
        &self,
        event: &Event,
    ) -> Result<Arc<dyn JobStatusNotifier>, TriggerError> {
        // The CLI has nowhere to receive status; the worker log is the record
        Ok(Arc::new(LogNotifier::new(event.id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::test_event;

    #[test]
    fn test_matches_cli_exec() {
        let trigger = BrigTrigger::from_config(b"").unwrap();

        assert!(trigger.matches(&test_event(CLI_SOURCE, "exec", "")).unwrap());
        assert!(!trigger.matches(&test_event(CLI_SOURCE, "push", "")).unwrap());
        assert!(
            !trigger
                .matches(&test_event("brigade.sh/github", "exec", ""))
                .unwrap()
        );
    }

    #[test]
    fn test_config_parsing() {
        assert!(BrigTrigger::from_config(b"{}").is_ok());
        assert!(BrigTrigger::from_config(b"  \n").is_ok());
        assert!(matches!(
            BrigTrigger::from_config(b"{\"branches\": []}"),
            Err(TriggerError::InvalidConfig(_))
        ));
    }
}
