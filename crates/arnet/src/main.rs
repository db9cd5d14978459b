mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, resolve_level, LogFormat, LogLevel, DEBUG_ENV};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "arnet", version, about = "ARSDK drone protocol CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). Defaults to ARNET_DEBUG (0-4), then info.
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    /// Directory of catalog documents to use instead of the embedded catalog.
    #[arg(long, value_name = "DIR", env = "ARNET_CATALOG", global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let debug_env = std::env::var(DEBUG_ENV).ok();
    init_logging(cli.log_format, resolve_level(cli.log_level, debug_env.as_deref()));

    let context = Context {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        catalog_dir: cli.catalog,
    };
    let result = cmd::run(cli.command, &context);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
