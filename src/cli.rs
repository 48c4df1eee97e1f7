use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "repl-runner", about = "Run Python snippets in killable worker processes", version)]
#[command(group(ArgGroup::new("mode").args(["repl", "serve", "tool_schema"]).multiple(false)))]
pub struct Cli {
    /// Code to run; may contain a ```python fence. Read from stdin when omitted.
    #[arg(value_name = "CODE")]
    pub code: Option<String>,

    /// Kill the worker after this many seconds ("none" waits indefinitely).
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<String>,

    /// JSON file with initial bindings: {"globals": {...}, "locals": {...}}.
    #[arg(long, value_name = "FILE")]
    pub bindings: Option<PathBuf>,

    /// Python interpreter to use (overrides REPL_PYTHON).
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Discard binding changes made by timed calls.
    #[arg(long)]
    pub isolated: bool,

    /// Start an interactive session on one executor.
    #[arg(long)]
    pub repl: bool,

    /// Serve the python_repl tool as JSON-RPC over stdio.
    #[arg(long)]
    pub serve: bool,

    /// Print the function-calling schema of the python_repl tool and exit.
    #[arg(long = "tool-schema")]
    pub tool_schema: bool,

    /// Print the binding environment to stderr after a one-shot run.
    #[arg(long = "show-bindings")]
    pub show_bindings: bool,

    /// Debug logging for this crate.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
