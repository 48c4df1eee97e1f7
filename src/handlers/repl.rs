//! Interactive session: every command runs on the same executor, so variables
//! carry over from one prompt to the next.

use std::{
    io::{self, Write},
    time::Duration,
};

use anyhow::Result;
use is_terminal::IsTerminal;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    config::parse_secs,
    execution::{ExecutionRequest, Executor},
    extract::has_open_fence,
    printer::TextPrinter,
};

const HELP: &str = "\
Commands:
  :vars              show carried-over variables
  :timeout SECS|off  set or clear the per-command timeout
  :reset             drop all variables (back to the initial bindings)
  :quit, :exit       leave the session
A line ending in ':' or an opened ``` fence continues until a blank line or the closing fence.";

#[derive(Debug, Clone, PartialEq)]
pub enum MetaCommand {
    Quit,
    Help,
    Vars,
    Reset,
    Timeout(Option<Duration>),
    Invalid(String),
}

/// Parse the text after a leading ':'.
pub fn parse_meta(input: &str) -> MetaCommand {
    let mut parts = input.split_whitespace();
    let name = parts.next().unwrap_or("");
    let arg = parts.next();
    match (name, arg) {
        ("quit" | "exit" | "q", None) => MetaCommand::Quit,
        ("help" | "h", None) => MetaCommand::Help,
        ("vars", None) => MetaCommand::Vars,
        ("reset", None) => MetaCommand::Reset,
        ("timeout", Some(v)) if v.eq_ignore_ascii_case("off") || v.eq_ignore_ascii_case("none") => {
            MetaCommand::Timeout(None)
        }
        ("timeout", Some(v)) => match parse_secs(v) {
            Some(d) => MetaCommand::Timeout(Some(d)),
            None => MetaCommand::Invalid(format!("invalid timeout: {}", v)),
        },
        _ => MetaCommand::Invalid(format!("unknown command :{} (try :help)", input.trim())),
    }
}

/// Accumulates input lines until they form a complete command.
#[derive(Debug, Default)]
pub struct InputBuffer {
    lines: Vec<String>,
    block: bool,
}

impl InputBuffer {
    pub fn is_continuing(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Add a line; returns the command once it is complete.
    pub fn push(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let first = self.lines.is_empty();
        if first && line.trim().is_empty() {
            return None;
        }
        if self.block && line.trim().is_empty() && !has_open_fence(&self.lines.join("\n")) {
            return Some(self.take());
        }

        self.lines.push(line.to_string());
        if has_open_fence(&self.lines.join("\n")) {
            return None;
        }
        if first && line.trim_end().ends_with(':') {
            self.block = true;
        }
        if self.block {
            return None;
        }
        Some(self.take())
    }

    /// Whatever is pending, e.g. at end of input.
    pub fn take(&mut self) -> String {
        self.block = false;
        std::mem::take(&mut self.lines).join("\n")
    }
}

pub async fn run(executor: Executor, timeout: Option<Duration>, printer: &TextPrinter) -> Result<()> {
    let pristine = executor.clone();
    let mut executor = executor;
    let mut timeout = timeout;
    let interactive = io::stdin().is_terminal();
    let mut buffer = InputBuffer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if interactive {
        eprintln!(
            "repl-runner {} using {} (:help for commands)",
            env!("CARGO_PKG_VERSION"),
            executor.interpreter().program().display()
        );
    }

    loop {
        if interactive {
            eprint!("{}", if buffer.is_continuing() { "... " } else { ">>> " });
            let _ = io::stderr().flush();
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };

        if !buffer.is_continuing() {
            if let Some(meta) = line.trim().strip_prefix(':') {
                match parse_meta(meta) {
                    MetaCommand::Quit => return Ok(()),
                    MetaCommand::Help => eprintln!("{}", HELP),
                    MetaCommand::Vars => println!("{}", serde_json::to_string_pretty(executor.bindings())?),
                    MetaCommand::Reset => {
                        executor = pristine.clone();
                        eprintln!("bindings reset");
                    }
                    MetaCommand::Timeout(t) => {
                        timeout = t;
                        match t {
                            Some(d) => eprintln!("timeout: {:?}", d),
                            None => eprintln!("timeout: off"),
                        }
                    }
                    MetaCommand::Invalid(msg) => printer.print(&msg)?,
                }
                continue;
            }
        }

        if let Some(command) = buffer.push(&line) {
            let outcome = executor.execute(&ExecutionRequest::new(command, timeout)).await?;
            printer.print_outcome(&outcome, true)?;
        }
    }

    // EOF in the middle of a block still runs what was typed.
    if buffer.is_continuing() {
        let outcome = executor
            .execute(&ExecutionRequest::new(buffer.take(), timeout))
            .await?;
        printer.print_outcome(&outcome, true)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_completes() {
        let mut b = InputBuffer::default();
        assert_eq!(b.push("print(1)").as_deref(), Some("print(1)"));
        assert!(!b.is_continuing());
    }

    #[test]
    fn test_blank_lines_ignored_when_idle() {
        let mut b = InputBuffer::default();
        assert_eq!(b.push("   "), None);
        assert!(!b.is_continuing());
    }

    #[test]
    fn test_block_until_blank_line() {
        let mut b = InputBuffer::default();
        assert_eq!(b.push("for i in range(2):"), None);
        assert_eq!(b.push("    print(i)"), None);
        assert!(b.is_continuing());
        assert_eq!(b.push("").as_deref(), Some("for i in range(2):\n    print(i)"));
        assert!(!b.is_continuing());
    }

    #[test]
    fn test_fence_until_closed() {
        let mut b = InputBuffer::default();
        assert_eq!(b.push("```python"), None);
        assert_eq!(b.push("x = 1"), None);
        assert_eq!(b.push(""), None);
        assert_eq!(b.push("print(x)"), None);
        assert_eq!(b.push("```").as_deref(), Some("```python\nx = 1\n\nprint(x)\n```"));
    }

    #[test]
    fn test_take_pending() {
        let mut b = InputBuffer::default();
        b.push("if True:");
        b.push("    print('x')");
        assert_eq!(b.take(), "if True:\n    print('x')");
        assert!(!b.is_continuing());
    }

    #[test]
    fn test_parse_meta() {
        assert_eq!(parse_meta("quit"), MetaCommand::Quit);
        assert_eq!(parse_meta("exit"), MetaCommand::Quit);
        assert_eq!(parse_meta("vars"), MetaCommand::Vars);
        assert_eq!(parse_meta("reset"), MetaCommand::Reset);
        assert_eq!(parse_meta("timeout 2"), MetaCommand::Timeout(Some(Duration::from_secs(2))));
        assert_eq!(parse_meta("timeout off"), MetaCommand::Timeout(None));
        assert!(matches!(parse_meta("timeout soon"), MetaCommand::Invalid(_)));
        assert!(matches!(parse_meta("frobnicate"), MetaCommand::Invalid(_)));
    }
}
