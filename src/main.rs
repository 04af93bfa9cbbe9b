//! # trealla-driver
//!
//! Spawns the Trealla toplevel, consults a file, and proves one goal built
//! from the command line, printing every solution.
//!
//! ## Usage
//!
//! ```bash
//! # parent(tom, X)
//! trealla-driver tpl family.pl parent tom X
//!
//! # Interactive goals after consulting
//! trealla-driver tpl family.pl --repl
//! ```
//!
//! Arguments starting with an uppercase letter or `_` are variables; all
//! others are passed to the engine as term text.

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

use trealla_driver::config::LoggingConfig;
use trealla_driver::value::format_solution;
use trealla_driver::{Answer, Arg, Config, Session};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "trealla-driver")]
#[command(version, about = "Prove goals against a Prolog file with the Trealla toplevel")]
struct Cli {
    /// Trealla toplevel executable
    executable: PathBuf,

    /// Prolog source file to consult
    file: PathBuf,

    /// Predicate to prove (required unless --repl)
    predicate: Option<String>,

    /// Goal arguments: `X`/`_` prefixed are variables, others are terms
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Read goals interactively after consulting
    #[arg(long)]
    repl: bool,

    /// Configuration file (defaults to trealla.toml + trealla.local.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print solutions as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(&path.to_string_lossy())
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load().unwrap_or_default(),
    };
    init_tracing(&config.logging);

    config.engine.executable = cli.executable.clone();
    let session = Session::spawn_with(&config.engine)
        .with_context(|| format!("failed to start {}", cli.executable.display()))?;
    session.on_message(|text| {
        print!("{text}");
        let _ = std::io::stdout().flush();
    });

    session
        .load(&cli.file)
        .with_context(|| format!("failed to consult {}", cli.file.display()))?;

    if cli.repl {
        return repl(&session, cli.json);
    }

    let Some(predicate) = cli.predicate.as_deref() else {
        bail!("a predicate is required unless --repl is given");
    };
    let args: Vec<Arg> = cli.args.iter().map(|a| parse_cli_arg(a)).collect();

    let answer = session
        .query(predicate, &args)
        .with_context(|| format!("failed to query {predicate}"))?;
    print_answer(answer, cli.json)?;

    session.close();
    Ok(())
}

/// Command-line text to a goal argument.
fn parse_cli_arg(text: &str) -> Arg {
    match text.chars().next() {
        Some(c) if c == '_' || c.is_uppercase() => Arg::var(text),
        _ => Arg::raw(text),
    }
}

fn print_answer(answer: Answer, json: bool) -> anyhow::Result<()> {
    if !answer.proved {
        println!("false");
        return Ok(());
    }
    let Some(solutions) = answer.solutions else {
        println!("true");
        return Ok(());
    };

    for (i, solution) in solutions.enumerate() {
        let rendered = if json {
            serde_json::to_string(&solution)?
        } else {
            format_solution(&solution)
        };
        println!("solution #{}: {rendered}", i + 1);
    }
    Ok(())
}

fn repl(session: &Session, json: bool) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new().map_err(|e| anyhow!("failed to init rustyline: {e}"))?;
    println!("Enter goals; `:load <file>` consults, `halt.` exits.");

    loop {
        let line = match rl.readline("?- ") {
            Ok(l) => l,
            Err(ReadlineError::Eof) => break,
            Err(ReadlineError::Interrupted) => continue,
            Err(e) => return Err(anyhow!("readline error: {e}")),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        if line == "halt." || line == "halt" {
            break;
        }
        if let Some(path) = line.strip_prefix(":load") {
            match session.load(path.trim()) {
                Ok(()) => println!("true"),
                Err(e) => println!("{e}"),
            }
            continue;
        }

        match session.query_goal(line) {
            Ok(answer) => print_answer(answer, json)?,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => println!("{e}"),
        }
    }

    session.close();
    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // Environment variables take precedence over config file values
    let level = env::var("TREALLA_LOG").unwrap_or_else(|_| logging_config.level.clone());
    let json = env::var("TREALLA_LOG_JSON")
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0");

    // Engine output is already printed on stdout
    let filter = tracing_subscriber::EnvFilter::try_new(format!("{level},trealla_driver::engine=warn"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = TRACE_GUARD.set(guard);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(non_blocking);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_arg() {
        assert!(matches!(parse_cli_arg("X"), Arg::Var(ref v) if v == "X"));
        assert!(matches!(parse_cli_arg("_Rest"), Arg::Var(_)));
        assert!(matches!(parse_cli_arg("tom"), Arg::Raw(ref v) if v == "tom"));
        assert!(matches!(parse_cli_arg("-3"), Arg::Raw(_)));
        assert!(matches!(parse_cli_arg("[1,2]"), Arg::Raw(_)));
    }

    #[test]
    fn test_cli_parses_goal_args() {
        let cli = Cli::try_parse_from(["trealla-driver", "tpl", "f.pl", "p", "tom", "X"])
            .unwrap();
        assert_eq!(cli.predicate.as_deref(), Some("p"));
        assert_eq!(cli.args, vec!["tom", "X"]);
        assert!(!cli.repl);
    }
}
