use serde::{Deserialize, Serialize};

/// A workflow node as authored.
///
/// `node_type` is one of `start`, `end`, `delay`, `api`, `script` or
/// `command` (matched case-insensitively at compile time). `data` holds the
/// type-specific parameters, e.g. `{"command": 5}` for a delay or
/// `{"command": {"type": "get", "url": "http://..."}}` for an api call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub data: serde_json::Value,
}

impl NodeDef {
  /// Returns true for the structural `start`/`end` markers.
  pub fn is_marker(&self) -> bool {
    self.node_type.eq_ignore_ascii_case("start") || self.node_type.eq_ignore_ascii_case("end")
  }
}
