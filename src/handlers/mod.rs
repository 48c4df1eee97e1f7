//! Command-line front-ends over a single executor.

pub mod repl;
pub mod run;
