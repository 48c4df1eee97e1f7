//! Wire format between the executor and the Python bootstrap.

use serde::{Deserialize, Serialize};

use super::{BindingEnvironment, ExecutionOutcome, Fault};

#[derive(Debug, Serialize)]
pub struct WorkerRequest<'a> {
    pub code: &'a str,
    pub globals: &'a serde_json::Map<String, serde_json::Value>,
    pub locals: &'a serde_json::Map<String, serde_json::Value>,
}

impl<'a> WorkerRequest<'a> {
    pub fn new(code: &'a str, bindings: &'a BindingEnvironment) -> Self {
        Self {
            code,
            globals: &bindings.globals,
            locals: &bindings.locals,
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerReply {
    Ok {
        stdout: String,
        #[serde(default)]
        bindings: Option<BindingEnvironment>,
        #[serde(default)]
        skipped: Vec<String>,
    },
    Fault {
        kind: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        bindings: Option<BindingEnvironment>,
        #[serde(default)]
        skipped: Vec<String>,
    },
}

impl WorkerReply {
    /// Parse the last non-empty line of the channel text.
    pub fn decode(channel: &str) -> Option<Self> {
        let line = channel.lines().rev().find(|l| !l.trim().is_empty())?;
        serde_json::from_str(line.trim()).ok()
    }

    /// Split into the outcome and the bindings the worker left behind.
    pub fn into_parts(self) -> (ExecutionOutcome, Option<BindingEnvironment>, Vec<String>) {
        match self {
            WorkerReply::Ok {
                stdout,
                bindings,
                skipped,
            } => (ExecutionOutcome::Output(stdout), bindings, skipped),
            WorkerReply::Fault {
                kind,
                message,
                bindings,
                skipped,
            } => (
                ExecutionOutcome::Fault(Fault::new(kind, message)),
                bindings,
                skipped,
            ),
        }
    }
}
