pub mod actuator;
pub mod aggregator;
pub mod channel;
pub mod config;
mod constants;
pub mod decision;
pub mod decoder;
mod error;
pub mod margin;
mod numeric;
pub mod packet;
pub mod pipeline;
mod serial;

pub use crate::config::RoverConfig;
pub use crate::error::{ConfigError, DecodeError, RoverError};
pub use crate::pipeline::{RoverThreads, SessionReport, ShutdownHandle};
pub use crate::serial::open_port;

use crate::pipeline::spawn_pipeline;
use crate::serial::flush;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

/// Function to launch the rover.
/// # Arguments
///
/// * `config` - Ports, sectors and tuning of the whole pipeline.
/// * `link` - Where motor commands go, usually the port returned by
///   [`open_rover_link`].
pub fn run_rover<W>(config: Arc<RoverConfig>, link: W) -> Result<RoverThreads, RoverError>
where
    W: Write + Send + 'static,
{
    let mut port = open_port(
        &config.lidar.port,
        config.lidar_baud_rate(),
        config.pipeline.read_timeout(),
    )?;
    // stale bytes would only cost a resync, but start on a clean stream
    flush(&mut port)?;
    info!(
        "Listening to the LiDAR on \"{}\" ({:?} window)",
        config.lidar.port, config.aggregation
    );
    spawn_pipeline(port, link, config)
}

/// Opens the motor controller port named in the configuration.
pub fn open_rover_link(
    config: &RoverConfig,
) -> Result<Box<dyn serialport::SerialPort>, RoverError> {
    open_port(
        &config.rover.port,
        config.rover_baud_rate(),
        config.pipeline.read_timeout(),
    )
}
