use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const MARKER_VERSION: u32 = 1;

/// `AdapterMark::extra` key holding the adapter's own state.
pub const STATE_KEY: &str = "state";

/// Per-repository progress pointer. Unknown fields are ignored on read so
/// older binaries keep working against newer markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalMarker {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<String>,
    #[serde(default)]
    pub last_analyzed_unix_ms: u64,
    #[serde(default)]
    pub total_runs: u64,
    /// Per adapter instance id.
    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterMark>,
}

impl IncrementalMarker {
    /// Delta base for one adapter: the commit of its last successful run and
    /// the state it left there. `None` when it never succeeded or already
    /// ran at `target`.
    pub fn adapter_base(&self, adapter: &str, target: Option<&str>) -> Option<(&str, Option<&Value>)> {
        let mark = self.adapters.get(adapter)?;
        let commit = mark.commit.as_deref().filter(|c| Some(*c) != target)?;
        Some((commit, mark.state()))
    }
}

impl Default for IncrementalMarker {
    fn default() -> Self {
        Self {
            version: MARKER_VERSION,
            last_commit: None,
            last_run_id: None,
            last_analyzed_unix_ms: 0,
            total_runs: 0,
            adapters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterMark {
    pub status: String,
    #[serde(default)]
    pub findings: usize,
    #[serde(default)]
    pub duration_ms: u64,
    /// Commit of the last run in which this adapter succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl AdapterMark {
    pub fn state(&self) -> Option<&Value> {
        self.extra.get(STATE_KEY)
    }

    pub fn set_state(&mut self, state: Value) {
        self.extra.insert(STATE_KEY.to_string(), state);
    }

    /// A mark for a run that did not succeed keeps the commit and state of
    /// the previous success, so the adapter's delta base never moves past
    /// commits it has not analyzed.
    pub(crate) fn inherit(&mut self, previous: &AdapterMark) {
        if self.status == "ok" {
            return;
        }
        self.commit = previous.commit.clone();
        match previous.state() {
            Some(state) => self.set_state(state.clone()),
            None => {
                self.extra.remove(STATE_KEY);
            }
        }
    }
}

/// What a finished run records alongside the commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkMetadata {
    pub run_id: Option<String>,
    pub adapters: BTreeMap<String, AdapterMark>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{
            "version": 7,
            "last_commit": "abc",
            "total_runs": 3,
            "shiny_new_field": {"x": 1}
        }"#;
        let marker: IncrementalMarker = serde_json::from_str(json).unwrap();
        assert_eq!(marker.version, 7);
        assert_eq!(marker.last_commit.as_deref(), Some("abc"));
        assert_eq!(marker.total_runs, 3);
        assert!(marker.adapters.is_empty());
    }

    #[test]
    fn adapter_base_is_its_own_last_success() {
        let mut marker = IncrementalMarker::default();
        let mut mark = AdapterMark {
            status: "ok".to_string(),
            commit: Some("c1".to_string()),
            ..AdapterMark::default()
        };
        mark.set_state(serde_json::json!({"commits": 12}));
        marker.adapters.insert("history".to_string(), mark);
        marker.adapters.insert(
            "lint".to_string(),
            AdapterMark {
                status: "timeout".to_string(),
                ..AdapterMark::default()
            },
        );

        let (commit, state) = marker.adapter_base("history", Some("c2")).unwrap();
        assert_eq!(commit, "c1");
        assert_eq!(state, Some(&serde_json::json!({"commits": 12})));
        assert_eq!(marker.adapter_base("history", Some("c1")), None);
        assert_eq!(marker.adapter_base("lint", Some("c2")), None);
        assert_eq!(marker.adapter_base("unknown", Some("c2")), None);
    }
}
