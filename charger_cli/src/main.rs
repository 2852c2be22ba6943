//! charger CLI entry point: logging setup, signal wiring, dispatch.

mod cli;
mod heartbeat;
mod run;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD};
use eyre::{Result, WrapErr};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));

    let console = if cli.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let file = match &cli.log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("--log-file needs a file name"))?;
            let appender = tracing_appender::rolling::never(
                dir.unwrap_or_else(|| std::path::Path::new(".")),
                name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_writer(writer).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli).wrap_err("failed to initialize logging")?;

    match &cli.cmd {
        Commands::Run(opts) => run::run_single(&cli, opts),
        Commands::Multi => run::run_multi(&cli),
        Commands::SelfCheck => run::self_check(),
    }
}
