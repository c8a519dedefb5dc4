use std::fmt;
use std::time::Duration;

use opsflow_config::NodeDef;
use serde::Deserialize;
use serde_json::Value;

use crate::error::WorkflowError;

/// HTTP verb of an api step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVerb {
  Get,
  Post,
  Put,
  Patch,
  Delete,
  Head,
}

impl HttpVerb {
  pub fn parse(verb: &str) -> Option<Self> {
    match verb.to_ascii_lowercase().as_str() {
      "get" => Some(HttpVerb::Get),
      "post" => Some(HttpVerb::Post),
      "put" => Some(HttpVerb::Put),
      "patch" => Some(HttpVerb::Patch),
      "delete" => Some(HttpVerb::Delete),
      "head" => Some(HttpVerb::Head),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      HttpVerb::Get => "GET",
      HttpVerb::Post => "POST",
      HttpVerb::Put => "PUT",
      HttpVerb::Patch => "PATCH",
      HttpVerb::Delete => "DELETE",
      HttpVerb::Head => "HEAD",
    }
  }
}

impl fmt::Display for HttpVerb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A runnable step.
///
/// There is deliberately no variant for `start`/`end`: markers are removed
/// when a workflow is compiled and cannot reach dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
  /// Pause the host's sequence.
  Delay(Duration),
  /// Outbound HTTP call.
  Api { verb: HttpVerb, url: String },
  /// Database script executed on the host.
  Script { script: String },
  /// Shell command executed on the host.
  Command { command: String },
}

impl Step {
  /// Short type tag, as used in stored definitions.
  pub fn kind(&self) -> &'static str {
    match self {
      Step::Delay(_) => "delay",
      Step::Api { .. } => "api",
      Step::Script { .. } => "script",
      Step::Command { .. } => "command",
    }
  }

  /// Compile a stored node into a typed step.
  pub fn compile(node: &NodeDef) -> Result<Self, WorkflowError> {
    let invalid = |message: String| WorkflowError::InvalidParameters {
      node_id: node.id.clone(),
      message,
    };
    let command = node.data.get("command").filter(|c| !c.is_null());

    match node.node_type.to_ascii_lowercase().as_str() {
      "delay" => {
        let seconds = command
          .and_then(delay_seconds)
          .ok_or_else(|| invalid("delay needs a non-negative number of seconds".to_string()))?;
        Duration::try_from_secs_f64(seconds)
          .map(Step::Delay)
          .map_err(|e| invalid(format!("invalid delay: {}", e)))
      }
      "api" => {
        let command = command.ok_or_else(|| invalid("api needs a command".to_string()))?;
        let api = ApiCommand::deserialize(command)
          .map_err(|e| invalid(format!("api command: {}", e)))?;
        let verb = HttpVerb::parse(&api.verb)
          .ok_or_else(|| invalid(format!("unsupported HTTP verb: {}", api.verb)))?;
        if api.url.trim().is_empty() {
          return Err(invalid("api url is empty".to_string()));
        }
        Ok(Step::Api { verb, url: api.url })
      }
      "script" => Ok(Step::Script {
        script: command_text(command).ok_or_else(|| invalid("script is empty".to_string()))?,
      }),
      "command" => Ok(Step::Command {
        command: command_text(command).ok_or_else(|| invalid("command is empty".to_string()))?,
      }),
      "start" | "end" => Err(invalid("start/end markers carry no action".to_string())),
      _ => Err(WorkflowError::UnknownNodeType {
        node_id: node.id.clone(),
        node_type: node.node_type.clone(),
      }),
    }
  }
}

/// A compiled step together with the node it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct StepNode {
  pub node_id: String,
  pub step: Step,
}

#[derive(Deserialize)]
struct ApiCommand {
  #[serde(rename = "type")]
  verb: String,
  url: String,
}

fn delay_seconds(value: &Value) -> Option<f64> {
  let seconds = match value {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse().ok()?,
    _ => return None,
  };
  (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

fn command_text(value: Option<&Value>) -> Option<String> {
  match value? {
    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
    Value::String(_) => None,
    // Structured payloads are passed through as their JSON text.
    other => Some(other.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn node(node_type: &str, data: Value) -> NodeDef {
    NodeDef {
      id: "n".to_string(),
      node_type: node_type.to_string(),
      data,
    }
  }

  #[test]
  fn test_delay_forms() {
    assert_eq!(
      Step::compile(&node("delay", json!({ "command": 2 }))).unwrap(),
      Step::Delay(Duration::from_secs(2))
    );
    assert_eq!(
      Step::compile(&node("Delay", json!({ "command": "0.5" }))).unwrap(),
      Step::Delay(Duration::from_millis(500))
    );
    assert!(Step::compile(&node("delay", json!({ "command": -1 }))).is_err());
    assert!(Step::compile(&node("delay", json!({}))).is_err());
  }

  #[test]
  fn test_api_step() {
    let step = Step::compile(&node(
      "API",
      json!({ "command": { "type": "POST", "url": "http://x/y" } }),
    ))
    .unwrap();
    assert_eq!(
      step,
      Step::Api {
        verb: HttpVerb::Post,
        url: "http://x/y".to_string()
      }
    );

    let err = Step::compile(&node(
      "api",
      json!({ "command": { "type": "teleport", "url": "http://x" } }),
    ))
    .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidParameters { .. }));
  }

  #[test]
  fn test_remote_steps() {
    assert_eq!(
      Step::compile(&node("script", json!({ "command": "select 1 from dual;" }))).unwrap(),
      Step::Script {
        script: "select 1 from dual;".to_string()
      }
    );
    assert_eq!(
      Step::compile(&node("COMMAND", json!({ "command": "df -h" })))
        .unwrap()
        .kind(),
      "command"
    );
    assert!(Step::compile(&node("command", json!({ "command": "  " }))).is_err());
  }

  #[test]
  fn test_unknown_type() {
    let err = Step::compile(&node("email", json!({}))).unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownNodeType { node_type, .. } if node_type == "email"));
  }
}
