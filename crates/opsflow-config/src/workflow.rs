use serde::{Deserialize, Serialize};

use crate::node::NodeDef;

/// One entry of a stored execution order.
///
/// Older definitions store `{ "id": ..., "type": ... }` objects, newer ones
/// plain id strings. Only the id is authoritative; the referenced node's own
/// type decides how the entry is treated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderEntry {
  Id(String),
  Ref {
    id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    node_type: Option<String>,
  },
}

impl OrderEntry {
  pub fn id(&self) -> &str {
    match self {
      OrderEntry::Id(id) => id,
      OrderEntry::Ref { id, .. } => id,
    }
  }
}

impl From<&str> for OrderEntry {
  fn from(id: &str) -> Self {
    OrderEntry::Id(id.to_string())
  }
}

/// A workflow definition as authored and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDef {
  #[serde(alias = "_id")]
  pub id: String,
  pub name: String,
  /// Free-form lifecycle state used for filtering (e.g. "draft", "published").
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub execution_order: Vec<OrderEntry>,
}

impl WorkflowDef {
  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.id == node_id)
  }
}
