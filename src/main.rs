mod cli;

use std::{
    io::{self, Read},
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use is_terminal::IsTerminal;
use repl_runner::{
    config::{parse_secs, Config},
    execution::{BindingEnvironment, Executor},
    functions::ToolDef,
    handlers, observability,
    printer::TextPrinter,
    server,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // CLI flags override config before anything reads it
    let mut cfg = Config::load();
    if let Some(python) = &args.python {
        cfg.set("REPL_PYTHON", python.to_string_lossy());
    }
    if args.isolated {
        cfg.set("REPL_SESSION", "isolated");
    }
    observability::init_tracing(&cfg, args.verbose);

    if args.tool_schema {
        println!("{}", serde_json::to_string_pretty(&ToolDef::python_repl().schema())?);
        return Ok(());
    }

    let timeout = match args.timeout.as_deref() {
        Some(v) => parse_timeout_arg(v)?,
        None => cfg.default_timeout(),
    };
    let bindings = match &args.bindings {
        Some(path) => handlers::run::load_bindings(path)?,
        None => BindingEnvironment::default(),
    };
    let mut executor = Executor::from_config(&cfg)?.with_bindings(bindings);
    let printer = TextPrinter::from_config(&cfg, io::stdout().is_terminal());

    if args.serve {
        return server::serve_stdio(executor, timeout).await;
    }
    if args.repl {
        return handlers::repl::run(executor, timeout, &printer).await;
    }

    // One-shot: positional code, else piped stdin
    let code = match args.code {
        Some(code) => code,
        None if !io::stdin().is_terminal() => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
        None => bail!("Provide code as an argument or via stdin, or use --repl"),
    };

    let produced_output =
        handlers::run::run(&mut executor, &code, timeout, &printer, args.show_bindings).await?;
    if !produced_output {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_timeout_arg(v: &str) -> Result<Option<Duration>> {
    let t = v.trim();
    if t.eq_ignore_ascii_case("none") || t.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    parse_secs(t)
        .map(Some)
        .ok_or_else(|| anyhow!("invalid --timeout value: {}", v))
}
