//! The `python_repl` tool: descriptor, schemas and argument handling shared by
//! function-calling front-ends and the stdio tool server.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::execution::{ExecutionOutcome, ExecutionRequest, Executor};

pub const TOOL_NAME: &str = "python_repl";

const TOOL_DESCRIPTION: &str = "Execute Python code and return everything it prints. \
Use print(...) to see values. Code may be wrapped in a ```python fence. \
Variables holding JSON-compatible values persist between calls; re-import modules and \
re-define functions in each call. Set timeout (seconds) for anything that may run long.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub r#type: String, // must be "function"
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolDef {
    pub fn python_repl() -> Self {
        Self {
            name: TOOL_NAME.into(),
            description: Some(TOOL_DESCRIPTION.into()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Python source to execute, optionally inside a ```python fence"
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Wall-clock limit in seconds; the worker is killed when it is exceeded"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    /// Chat-completions `tools` entry.
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            r#type: "function".into(),
            function: FunctionSchema {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }

    /// `tools/list` entry for the stdio tool server.
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description.clone().unwrap_or_default(),
            "inputSchema": self.parameters,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    #[serde(alias = "code")]
    command: String,
    #[serde(default)]
    timeout: Option<Value>,
}

/// Turn tool arguments into a request. A missing or null `timeout` falls back to
/// `default_timeout`.
pub fn parse_args(args: &Value, default_timeout: Option<Duration>) -> Result<ExecutionRequest> {
    let parsed: ToolArgs = serde_json::from_value(args.clone())
        .with_context(|| format!("invalid {} arguments: {}", TOOL_NAME, args))?;

    let timeout = match parsed.timeout {
        None | Some(Value::Null) => default_timeout,
        Some(Value::Number(n)) => Some(seconds(n.as_f64().unwrap_or(f64::NAN))?),
        Some(Value::String(s)) => Some(seconds(
            s.trim()
                .parse::<f64>()
                .map_err(|_| anyhow!("timeout must be a number of seconds, got {:?}", s))?,
        )?),
        Some(other) => bail!("timeout must be a number of seconds, got {}", other),
    };

    Ok(ExecutionRequest::new(parsed.command, timeout))
}

fn seconds(value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        bail!("timeout must be a non-negative number of seconds, got {}", value);
    }
    Ok(Duration::from_secs_f64(value))
}

/// Execute a `python_repl` call whose arguments arrive as a JSON string.
pub async fn invoke(
    executor: &mut Executor,
    args_json: &str,
    default_timeout: Option<Duration>,
) -> Result<ExecutionOutcome> {
    let args: Value = serde_json::from_str(args_json)
        .with_context(|| format!("invalid tool args json: {}", args_json))?;
    let request = parse_args(&args, default_timeout)?;
    Ok(executor.execute(&request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_shape() {
        let schema = serde_json::to_value(ToolDef::python_repl().schema()).unwrap();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], TOOL_NAME);
        assert_eq!(schema["function"]["parameters"]["required"], json!(["command"]));
    }

    #[test]
    fn test_descriptor_shape() {
        let d = ToolDef::python_repl().descriptor();
        assert_eq!(d["name"], TOOL_NAME);
        assert_eq!(d["inputSchema"]["properties"]["timeout"]["type"], "number");
        assert!(d["description"].as_str().unwrap().contains("print"));
    }

    #[test]
    fn test_parse_args_timeouts() {
        let req = parse_args(&json!({"command": "print(1)", "timeout": 2}), None).unwrap();
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));

        let req = parse_args(&json!({"command": "x", "timeout": "0.5"}), None).unwrap();
        assert_eq!(req.timeout, Some(Duration::from_millis(500)));

        let fallback = Some(Duration::from_secs(30));
        let req = parse_args(&json!({"command": "x", "timeout": null}), fallback).unwrap();
        assert_eq!(req.timeout, fallback);

        let req = parse_args(&json!({"code": "x"}), None).unwrap();
        assert_eq!(req.command, "x");
        assert_eq!(req.timeout, None);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(&json!({"timeout": 1}), None).is_err());
        assert!(parse_args(&json!({"command": "x", "timeout": -1}), None).is_err());
        assert!(parse_args(&json!({"command": "x", "timeout": "soon"}), None).is_err());
        assert!(parse_args(&json!({"command": "x", "timeout": [1]}), None).is_err());
    }
}
