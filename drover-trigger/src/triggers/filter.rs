use regex::Regex;
use serde::Deserialize;

use crate::trigger::TriggerError;

/// `only` / `ignore` pattern lists as written in trigger configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RefFilterConfig {
    #[serde(default)]
    pub only: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Compiled branch or tag filter
///
/// A name passes when it matches at least one `only` pattern (or none are
/// given) and no `ignore` pattern. Patterns are anchored at both ends.
#[derive(Debug, Clone)]
pub(crate) struct RefFilter {
    only: Vec<Regex>,
    ignore: Vec<Regex>,
}

impl RefFilter {
    pub(crate) fn compile(config: &RefFilterConfig) -> Result<Self, TriggerError> {
        Ok(Self {
            only: compile_all(&config.only)?,
            ignore: compile_all(&config.ignore)?,
        })
    }

    pub(crate) fn allows(&self, name: &str) -> bool {
        let selected = self.only.is_empty() || self.only.iter().any(|re| re.is_match(name));
        selected && !self.ignore.iter().any(|re| re.is_match(name))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, TriggerError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
                TriggerError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                }
            })
        })
        .collect()
}
