//! Printers for execution outcomes.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::{config::Config, execution::ExecutionOutcome};

pub struct TextPrinter {
    pub color: Option<&'static str>,
}

impl TextPrinter {
    pub fn from_config(cfg: &Config, colorize: bool) -> Self {
        let color = if colorize {
            match cfg.get("REPL_FAULT_COLOR").as_deref() {
                Some("red") => Some("red"),
                Some("yellow") => Some("yellow"),
                Some("magenta") => Some("magenta"),
                Some("cyan") => Some("cyan"),
                _ => None,
            }
        } else {
            None
        };
        Self { color }
    }

    pub fn print(&self, text: &str) -> io::Result<()> {
        self.write_line(&mut io::stdout().lock(), text)
    }

    fn write_line<W: Write>(&self, out: &mut W, text: &str) -> io::Result<()> {
        match self.color {
            Some("red") => writeln!(out, "{}", text.red()),
            Some("yellow") => writeln!(out, "{}", text.yellow()),
            Some("magenta") => writeln!(out, "{}", text.magenta()),
            Some("cyan") => writeln!(out, "{}", text.cyan()),
            _ => writeln!(out, "{}", text),
        }
    }

    /// Program output verbatim; faults and timeouts on their own colored line.
    /// With `ensure_newline`, output lacking a final newline gets one so an
    /// interactive prompt starts on a fresh line.
    pub fn print_outcome(&self, outcome: &ExecutionOutcome, ensure_newline: bool) -> io::Result<()> {
        self.write_outcome(&mut io::stdout().lock(), outcome, ensure_newline)
    }

    pub fn write_outcome<W: Write>(
        &self,
        out: &mut W,
        outcome: &ExecutionOutcome,
        ensure_newline: bool,
    ) -> io::Result<()> {
        match outcome {
            ExecutionOutcome::Output(text) => {
                out.write_all(text.as_bytes())?;
                if ensure_newline && !text.is_empty() && !text.ends_with('\n') {
                    out.write_all(b"\n")?;
                }
            }
            other => self.write_line(out, &other.to_string())?,
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Fault;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_outcome() {
        let printer = TextPrinter { color: None };
        let mut out = Vec::new();
        printer
            .write_outcome(&mut out, &ExecutionOutcome::Output("a\nb".into()), false)
            .unwrap();
        assert_eq!(out, b"a\nb");

        let mut out = Vec::new();
        printer
            .write_outcome(&mut out, &ExecutionOutcome::Output("a".into()), true)
            .unwrap();
        assert_eq!(out, b"a\n");

        let mut out = Vec::new();
        let fault = ExecutionOutcome::Fault(Fault::new("ValueError", "bad"));
        printer.write_outcome(&mut out, &fault, false).unwrap();
        assert_eq!(out, b"ValueError: bad\n");
    }

    #[test]
    fn test_write_errors_are_returned() {
        let printer = TextPrinter { color: Some("red") };
        let err = printer
            .write_outcome(&mut ClosedPipe, &ExecutionOutcome::Output("4\n".into()), false)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(printer
            .write_outcome(&mut ClosedPipe, &ExecutionOutcome::TimedOut, false)
            .is_err());
    }
}
