use crate::error::RoverError;
use serialport::SerialPort;
use std::io::{self, ErrorKind, Read};
use std::time::Duration;
use tracing::{debug, error};

pub fn open_port(
    port_name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, RoverError> {
    let port = serialport::new(port_name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| {
            error!("Failed to open \"{}\". Error: {}", port_name, e);
            e
        })?;
    debug!("Opened \"{}\" at {} baud", port_name, baud_rate);
    Ok(port)
}

pub(crate) fn get_n_read(port: &mut Box<dyn SerialPort>) -> Result<usize, RoverError> {
    let n_u32: u32 = port.bytes_to_read()?;
    Ok(n_u32.try_into().unwrap_or(0))
}

/// Drops whatever the device sent before we started listening.
pub fn flush(port: &mut Box<dyn SerialPort>) -> Result<(), RoverError> {
    let n_read: usize = get_n_read(port).unwrap_or(0);
    if n_read == 0 {
        return Ok(());
    }
    let mut packet: Vec<u8> = vec![0; n_read];
    port.read_exact(packet.as_mut_slice())?;
    Ok(())
}

/// Reads whatever is available. Timeouts and interruptions count as zero bytes.
pub(crate) fn read_available<R: Read + ?Sized>(
    source: &mut R,
    buf: &mut [u8],
) -> io::Result<usize> {
    match source.read(buf) {
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        }
        Err(e) => Err(e),
    }
}
