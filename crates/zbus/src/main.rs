mod config;
mod exit;
mod logging;

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use clap::Parser;
use tracing::info;
use zbus_gateway::{Gateway, ShutdownSignal};

use crate::config::DeviceArgs;
use crate::exit::{gateway_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::logging::{device_span, init_logging, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "zbus", version, about = "ZEN-bus gateway on stdin/stdout")]
struct Cli {
    #[command(flatten)]
    devices: DeviceArgs,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", env = "ZBUS_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", env = "ZBUS_LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version also arrive here
            let code = if err.use_stderr() { USAGE } else { SUCCESS };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_logging(cli.log_format, cli.log_level);

    // the gateway and its devices are dropped inside `run`, before exiting
    match run(&cli) {
        Ok(()) => std::process::exit(SUCCESS),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    let config = cli.devices.gateway_config();
    let _span = device_span(&config).entered();

    let shutdown = ShutdownSignal::new().map_err(|err| io_error("shutdown signal", err))?;
    install_ctrlc_handler(shutdown.clone())?;

    let input = duplicate(io::stdin().as_fd()).map_err(|err| io_error("stdin", err))?;
    let output = duplicate(io::stdout().as_fd()).map_err(|err| io_error("stdout", err))?;

    let mut gateway = Gateway::open(&config, input, output)
        .map_err(|err| gateway_error("startup failed", err))?
        .with_shutdown(shutdown);

    info!("gateway started");
    gateway
        .run()
        .map_err(|err| gateway_error("gateway failed", err))?;
    Ok(())
}

/// Unbuffered handle on a standard stream, so readiness reported by the
/// wait always matches what a read will return.
fn duplicate(fd: BorrowedFd<'_>) -> io::Result<File> {
    Ok(File::from(fd.try_clone_to_owned()?))
}

fn install_ctrlc_handler(shutdown: ShutdownSignal) -> CliResult<()> {
    ctrlc::set_handler(move || shutdown.trigger()).map_err(|err| {
        CliError::new(
            exit::IO_ERROR,
            format!("failed to install signal handler: {err}"),
        )
    })
}
