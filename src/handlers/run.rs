//! One-shot handler: run a single command and print its outcome.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};

use crate::{
    execution::{BindingEnvironment, ExecutionRequest, Executor},
    printer::TextPrinter,
};

/// Returns `true` when the command produced output rather than a fault or timeout.
pub async fn run(
    executor: &mut Executor,
    code: &str,
    timeout: Option<Duration>,
    printer: &TextPrinter,
    show_bindings: bool,
) -> Result<bool> {
    let outcome = executor
        .execute(&ExecutionRequest::new(code, timeout))
        .await?;
    printer.print_outcome(&outcome, false)?;

    if show_bindings {
        eprintln!("{}", serde_json::to_string_pretty(executor.bindings())?);
    }
    Ok(outcome.is_output())
}

/// Read initial bindings from a JSON file shaped like `{"globals": {}, "locals": {}}`.
pub fn load_bindings(path: &Path) -> Result<BindingEnvironment> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading bindings file: {}", path.display()))?;
    let env: BindingEnvironment = serde_json::from_str(&text)
        .with_context(|| format!("parsing bindings file: {}", path.display()))?;
    Ok(env)
}
