use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use facegate_cli::cli::Cli;
use facegate_cli::commands::handler_for;
use facegate_cli::output::render_error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mode = cli.output_mode();
    init_tracing(cli.verbose);

    let handler = handler_for(cli.command, cli.config);
    match handler.execute(mode, cli.verbose > 0) {
        Ok(code) => code,
        Err(err) => {
            render_error(&err, mode);
            err.exit_code()
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(fmt_layer);
    if tracing::subscriber::set_global_default(registry).is_err() {
        // Already initialised (tests).
    }
}
