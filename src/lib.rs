//! Run untrusted Python snippets in killable worker processes.
//!
//! [`execution::Executor`] is the entry point: it extracts code from fenced
//! chat text, runs it in a fresh interpreter process with an optional
//! wall-clock limit, and reports printed output, a flattened fault, or a
//! timeout. [`server`] exposes the same operation as a JSON-RPC tool.

pub mod config;
pub mod errors;
pub mod execution;
pub mod extract;
pub mod functions;
pub mod handlers;
pub mod observability;
pub mod printer;
pub mod process;
pub mod server;

pub use errors::RunError;
pub use execution::{
    BindingEnvironment, ExecutionOutcome, ExecutionRequest, Executor, Fault, SessionPolicy,
    TIMEOUT_MESSAGE,
};
pub use extract::extract_code;
