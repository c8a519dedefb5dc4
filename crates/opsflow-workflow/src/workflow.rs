use std::collections::HashSet;

use opsflow_config::WorkflowDef;

use crate::error::WorkflowError;
use crate::order::filter_execution_order;
use crate::step::{Step, StepNode};

/// A compiled workflow ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  /// Runnable steps in execution order.
  pub steps: Vec<StepNode>,
}

impl Workflow {
  /// Compile a stored definition.
  ///
  /// Only nodes that appear in the execution order are compiled; nodes the
  /// order never reaches are not validated.
  pub fn compile(def: &WorkflowDef) -> Result<Self, WorkflowError> {
    let mut seen = HashSet::new();
    for node in &def.nodes {
      if !seen.insert(node.id.as_str()) {
        return Err(WorkflowError::DuplicateNode(node.id.clone()));
      }
    }

    let steps = filter_execution_order(&def.execution_order, &def.nodes)?
      .into_iter()
      .map(|node_id| {
        // The filter guarantees the node exists.
        let node = def
          .get_node(&node_id)
          .ok_or_else(|| WorkflowError::UnknownNode(node_id.clone()))?;
        Ok(StepNode {
          step: Step::compile(node)?,
          node_id,
        })
      })
      .collect::<Result<Vec<_>, WorkflowError>>()?;

    Ok(Self {
      workflow_id: def.id.clone(),
      name: def.name.clone(),
      steps,
    })
  }
}
