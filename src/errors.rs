//! Errors that mean the execution service itself is unavailable.
//!
//! Faults raised by executed code, lost result channels and timeouts are not
//! errors here; they are reported through [`crate::execution::ExecutionOutcome`].

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("no Python interpreter found (tried {tried}); set REPL_PYTHON or pass --python")]
    InterpreterNotFound { tried: String },
    #[error("failed to spawn worker '{}': {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("worker pipe '{0}' was not captured")]
    MissingPipe(&'static str),
    #[error("failed to wait for worker: {0}")]
    Wait(#[source] io::Error),
    #[error("failed to encode worker request: {0}")]
    Encode(#[from] serde_json::Error),
}
