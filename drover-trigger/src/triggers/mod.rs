//! Built-in trigger kinds

mod brig;
mod filter;
mod github;

pub use brig::{BRIG_SPEC_URI, BrigTrigger};
pub use github::{GITHUB_SPEC_URI, GitHubTrigger};

#[cfg(test)]
pub(crate) fn test_event(
    source: &str,
    event_type: &str,
    payload: &str,
) -> drover_core::domain::event::Event {
    serde_json::from_value(serde_json::json!({
        "id": "evt-1",
        "source": source,
        "type": event_type,
        "payload": payload,
        "project": {
            "id": "demo",
            "repo": { "cloneURL": "https://github.com/example/demo.git" }
        },
        "worker": { "id": "evt-1", "buildId": "b1" }
    }))
    .unwrap()
}
