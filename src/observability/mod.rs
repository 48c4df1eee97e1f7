//! Tracing initialization.
//!
//! Logs always go to stderr: stdout carries program output in one-shot mode and
//! JSON-RPC frames in `--serve` mode.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::Config;

/// Initialize tracing from `REPL_LOG_LEVEL` / `REPL_LOG_JSON`. `RUST_LOG` wins when set.
/// `verbose` raises the crate's own level to debug.
pub fn init_tracing(cfg: &Config, verbose: bool) {
    let mut level = cfg.get("REPL_LOG_LEVEL").unwrap_or_else(|| "warn".into());
    if verbose {
        level = format!("{},repl_runner=debug", level);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.get_bool("REPL_LOG_JSON") {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    };
}
