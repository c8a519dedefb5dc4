use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("execution order references unknown node: {0}")]
  UnknownNode(String),

  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("node '{node_id}' has unknown type '{node_type}'")]
  UnknownNodeType { node_id: String, node_type: String },

  #[error("node '{node_id}' has invalid parameters: {message}")]
  InvalidParameters { node_id: String, message: String },
}
