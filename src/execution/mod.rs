//! Execution engine: request/outcome types and the session-holding executor.

use std::{fmt, time::Duration, time::Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::Config,
    errors::RunError,
    extract::extract_code,
    process::{Interpreter, WorkerExit},
};

pub mod python;

use python::{WorkerReply, WorkerRequest};

/// Result text returned when a worker is killed for overrunning its timeout.
pub const TIMEOUT_MESSAGE: &str = "Execution timed out";

/// Fault kind used when a worker exits without delivering a reply.
pub const CHANNEL_FAULT_KIND: &str = "ChannelError";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub command: String,
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

/// Name-to-value mappings the executed code reads and writes.
///
/// Only JSON-representable values live here. Anything else a snippet creates
/// (modules, functions, classes, open files) is gone by the next call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingEnvironment {
    #[serde(default)]
    pub globals: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub locals: serde_json::Map<String, serde_json::Value>,
}

impl BindingEnvironment {
    pub fn is_empty(&self) -> bool {
        self.globals.is_empty() && self.locals.is_empty()
    }

    /// Look a name up the way executed code does: locals first.
    pub fn lookup(&self, name: &str) -> Option<&serde_json::Value> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: String,
    pub message: String,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn channel(detail: impl Into<String>) -> Self {
        Self::new(CHANNEL_FAULT_KIND, detail)
    }

    pub fn is_channel(&self) -> bool {
        self.kind == CHANNEL_FAULT_KIND
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Exactly one of these per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Everything the code printed, verbatim.
    Output(String),
    Fault(Fault),
    TimedOut,
}

impl ExecutionOutcome {
    pub fn is_output(&self) -> bool {
        matches!(self, ExecutionOutcome::Output(_))
    }

    /// Flatten for text-only callers.
    pub fn into_text(self) -> String {
        match self {
            ExecutionOutcome::Output(text) => text,
            ExecutionOutcome::Fault(fault) => fault.to_string(),
            ExecutionOutcome::TimedOut => TIMEOUT_MESSAGE.to_string(),
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Output(text) => f.write_str(text),
            ExecutionOutcome::Fault(fault) => fault.fmt(f),
            ExecutionOutcome::TimedOut => f.write_str(TIMEOUT_MESSAGE),
        }
    }
}

/// Whether bindings changed by a timed call flow back into the session.
/// Untimed calls always merge; timed-out calls never do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPolicy {
    #[default]
    Shared,
    Isolated,
}

impl SessionPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "shared" => Some(Self::Shared),
            "isolated" => Some(Self::Isolated),
            _ => None,
        }
    }
}

/// Runs snippets in fresh worker processes against one long-lived
/// [`BindingEnvironment`].
///
/// Calls take `&mut self`, so one executor never runs two snippets at once.
/// A call without a timeout waits on its worker indefinitely; use it only for
/// trusted input.
#[derive(Debug, Clone)]
pub struct Executor {
    interpreter: Interpreter,
    bindings: BindingEnvironment,
    policy: SessionPolicy,
    channel_grace: Duration,
}

impl Executor {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            bindings: BindingEnvironment::default(),
            policy: SessionPolicy::default(),
            channel_grace: Duration::from_secs(2),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, RunError> {
        let interpreter = Interpreter::from_config(cfg)?;
        let policy = match cfg.get("REPL_SESSION") {
            Some(name) => SessionPolicy::from_name(&name).unwrap_or_else(|| {
                warn!(value = %name, "unknown REPL_SESSION; using shared");
                SessionPolicy::Shared
            }),
            None => SessionPolicy::Shared,
        };
        Ok(Self::new(interpreter)
            .with_policy(policy)
            .with_channel_grace(cfg.channel_grace()))
    }

    pub fn with_bindings(mut self, bindings: BindingEnvironment) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper bound on waiting for the result channel after the worker exits.
    pub fn with_channel_grace(mut self, grace: Duration) -> Self {
        self.channel_grace = grace;
        self
    }

    pub fn bindings(&self) -> &BindingEnvironment {
        &self.bindings
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Run `command` and return its printed output, fault text or
    /// [`TIMEOUT_MESSAGE`]. `Err` only when no worker could be started.
    pub async fn run(&mut self, command: &str, timeout: Option<Duration>) -> Result<String, RunError> {
        let outcome = self
            .execute(&ExecutionRequest::new(command, timeout))
            .await?;
        Ok(outcome.into_text())
    }

    pub async fn execute(&mut self, request: &ExecutionRequest) -> Result<ExecutionOutcome, RunError> {
        let code = extract_code(&request.command);
        let payload = WorkerRequest::new(&code, &self.bindings).encode()?;

        let started = Instant::now();
        let worker = self.interpreter.spawn()?;
        let exit = worker
            .finish(payload, request.timeout, self.channel_grace)
            .await?;

        let (status, reply) = match exit {
            WorkerExit::TimedOut => {
                debug!(elapsed = ?started.elapsed(), timeout = ?request.timeout, "execution timed out");
                return Ok(ExecutionOutcome::TimedOut);
            }
            WorkerExit::Completed { status, reply } => (status, reply),
        };

        let reply = match reply.as_deref().filter(|text| !text.trim().is_empty()) {
            None => {
                warn!(%status, "worker exited without a result");
                return Ok(ExecutionOutcome::Fault(Fault::channel(format!(
                    "worker exited ({}) without sending a result",
                    status
                ))));
            }
            Some(text) => match WorkerReply::decode(text) {
                Some(reply) => reply,
                None => {
                    warn!(%status, bytes = text.len(), "worker result could not be decoded");
                    return Ok(ExecutionOutcome::Fault(Fault::channel(format!(
                        "worker exited ({}) with an unreadable result",
                        status
                    ))));
                }
            },
        };

        let (outcome, bindings, skipped) = reply.into_parts();
        debug!(elapsed = ?started.elapsed(), success = outcome.is_output(), "execution finished");
        if !skipped.is_empty() {
            debug!(?skipped, "bindings not carried over");
        }

        if request.timeout.is_none() || self.policy == SessionPolicy::Shared {
            if let Some(bindings) = bindings {
                self.bindings = bindings;
            }
        }

        Ok(outcome)
    }
}
