use clap::Parser;
use rover_driver::actuator::LoggingLink;
use rover_driver::{open_rover_link, run_rover, RoverConfig, RoverError};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// LiDAR obstacle avoidance for serial-driven rovers.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the LiDAR, overrides the configuration.
    #[arg(long)]
    lidar_port: Option<String>,

    /// Serial port of the motor controller, overrides the configuration.
    #[arg(long)]
    rover_port: Option<String>,

    /// Log motor commands instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

fn load_config(args: &Args) -> Result<RoverConfig, RoverError> {
    let mut config = match &args.config {
        Some(path) => RoverConfig::load(path)?,
        None => RoverConfig::default(),
    };
    if let Some(port) = &args.lidar_port {
        config.lidar.port = port.clone();
    }
    if let Some(port) = &args.rover_port {
        config.rover.port = port.clone();
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), RoverError> {
    let config = Arc::new(load_config(&args)?);

    let link: Box<dyn Write + Send> = if args.dry_run {
        info!("Dry run, motor commands are only logged");
        Box::new(LoggingLink)
    } else {
        Box::new(open_rover_link(&config)?)
    };

    let threads = run_rover(config, link)?;
    let shutdown = threads.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Interrupted, stopping the rover");
        shutdown.trigger();
    }) {
        error!("Cannot install the interrupt handler: {e}");
    }

    let report = threads.join()?;
    info!(
        "Decoded {} frames ({} checksum errors, {} length errors, {} bytes discarded)",
        report.sensing.decoder.frames,
        report.sensing.decoder.checksum_errors,
        report.sensing.decoder.length_errors,
        report.sensing.decoder.discarded_bytes
    );
    info!(
        "Ran {} cycles ({} degraded), sent {} commands, {} superseded",
        report.sensing.cycles,
        report.sensing.degraded_cycles,
        report.actuation.written,
        report.sensing.superseded
    );
    Ok(())
}

/// Used when `RUST_LOG` is unset. The binary logs under its own target.
const DEFAULT_LOG_FILTER: &str = "rover_driver=info,wrover=info";

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
