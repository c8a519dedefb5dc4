use std::collections::HashMap;

use opsflow_config::{NodeDef, OrderEntry};

use crate::error::WorkflowError;

/// Strip structural markers from an execution order.
///
/// Returns the ids of the nodes meant to run, in their stored order. The
/// node's own type decides whether an entry is a marker; the type recorded
/// on the order entry is ignored.
pub fn filter_execution_order(
  order: &[OrderEntry],
  nodes: &[NodeDef],
) -> Result<Vec<String>, WorkflowError> {
  let by_id: HashMap<&str, &NodeDef> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

  let mut runnable = Vec::with_capacity(order.len());
  for entry in order {
    let node = by_id
      .get(entry.id())
      .ok_or_else(|| WorkflowError::UnknownNode(entry.id().to_string()))?;
    if !node.is_marker() {
      runnable.push(node.id.clone());
    }
  }

  Ok(runnable)
}
