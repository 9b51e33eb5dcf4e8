//! nostr-bridge binary entry point.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use nostr_bridge::cli::{Cli, LogFormat, execute};
use tracing_subscriber::EnvFilter;

/// Installs the tracing subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(cli: &Cli) {
    let fallback = if cli.verbose {
        "nostr_bridge=debug,info"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let _ = match cli.log_format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .try_init(),
    };
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli);

    match execute(&cli) {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "Error: {e}")?;
            Ok(ExitCode::FAILURE)
        }
    }
}
