// File: src/main.rs
//
// Main entry point for the Refl command-line runner.
// Handles command-line argument parsing and dispatches to the appropriate
// subcommand (run or check). Programs are read as JSON-encoded syntax trees.

use clap::{Parser as ClapParser, Subcommand};
use refl::ast::{JsonParser, SourceParser};
use refl::interpreter::{Environment, Interpreter, Options};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(
    name = "refl",
    about = "Refl: an embeddable scripting runtime",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Run a program file
    Run {
        /// Path to the JSON program
        file: PathBuf,

        /// Run without an event loop (disables the events namespace and refl)
        #[arg(long)]
        no_events: bool,

        /// Disable the eval builtin
        #[arg(long)]
        no_eval: bool,

        /// Disable the refl builtin
        #[arg(long)]
        no_refl: bool,

        /// Cancel the run after this many milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },

    /// Decode a program file without running it
    Check {
        /// Path to the JSON program
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let parser = Arc::new(JsonParser);

    match cli.command {
        Commands::Run { file, no_events, no_eval, no_refl, timeout_ms } => {
            let Some(program) = load(parser.as_ref(), &file) else {
                return ExitCode::FAILURE;
            };

            let token = CancellationToken::new();
            let mut options = Options::new().with_parser(parser).with_cancellation(token.clone());
            if no_events {
                options = options.disable_events();
            }
            if no_eval {
                options = options.disable_eval();
            }
            if no_refl {
                options = options.disable_refl();
            }
            if let Some(ms) = timeout_ms {
                let timer = token.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(ms));
                    timer.cancel();
                });
            }

            let interpreter = Interpreter::new(options);
            match interpreter.run(&program, &Environment::new()) {
                Ok(result) => {
                    if !result.is_nil() {
                        println!("{}", result);
                    }
                    ExitCode::SUCCESS
                }
                Err(panic) => {
                    eprint!("{}", panic.report());
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Check { file } => match load(parser.as_ref(), &file) {
            Some(program) => {
                println!("{}: {} top-level statements", file.display(), program.statements.len());
                ExitCode::SUCCESS
            }
            None => ExitCode::FAILURE,
        },
    }
}

fn load(parser: &dyn SourceParser, file: &Path) -> Option<refl::ast::Program> {
    let code = match fs::read_to_string(file) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Failed to read {}: {}", file.display(), e);
            return None;
        }
    };
    match parser.parse(&code) {
        Ok(program) => Some(program),
        Err(e) => {
            eprintln!("{}", e);
            None
        }
    }
}
