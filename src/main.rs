//! sqlping entry point.
//!
//! Parses the command line, resolves credentials, prints the run header and
//! drives the poll loop until it stops or the process is interrupted.

use anyhow::Result;
use clap::Parser;
use sqlping::cli::Cli;
use sqlping::credentials::{resolve, ProcessEnv};
use sqlping::descriptor::{build, ClientIdentity};
use sqlping::poll::PollLoop;
use sqlping::probe::{print_header, Prober};
use sqlping::reporter::{ConsoleReporter, Reporter};
use sqlping::shutdown::{install_signal_handlers, new_shutdown_controller};
use sqlping::TdsClient;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_filter());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ConsoleReporter::new().fatal(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.into_settings();
    settings.validate()?;
    debug!("Settings: {:?}", settings);

    let reporter = ConsoleReporter::new();

    let resolution = resolve(
        &settings.username,
        &settings.password,
        &ProcessEnv,
        &reporter,
    );
    resolution.report(&reporter);

    let built = build(&settings, &resolution.credentials, ClientIdentity::current());
    for warning in &built.warnings {
        reporter.warn(&warning.to_string());
    }
    let descriptor = built.descriptor;

    let query = settings.query();
    print_header(&reporter, &descriptor, query);

    let controller = new_shutdown_controller();
    install_signal_handlers(controller.clone());

    let client = TdsClient::new();
    let prober = &Prober::new(&client, &reporter);
    let descriptor = &descriptor;
    let mut poll = PollLoop::from_settings(&settings);

    poll.run(
        move || async move {
            prober.run(descriptor, query).await;
        },
        controller.signal(),
    )
    .await;

    if controller.is_shutting_down() {
        reporter.plain("");
        reporter.info("Stopped.");
    }

    Ok(())
}

/// Initialize tracing subscriber with stderr output.
///
/// Logs MUST go to stderr because stdout carries the probe report.
fn init_logging(default_filter: &str) {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
