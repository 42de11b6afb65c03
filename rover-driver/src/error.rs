use std::io;
use thiserror::Error;

/// Recoverable conditions raised while framing the LiDAR byte stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Incomplete packet: {available} of {needed} bytes buffered.")]
    Incomplete { available: usize, needed: usize },
    #[error("Packet must start with 0x{expected:02X}. Observed = {observed}.")]
    InvalidHeader { expected: u8, observed: String },
    #[error("Invalid length field {0:#04X}.")]
    InvalidLength(u8),
    #[error("Checksum mismatched. Calculated = {calculated:02X}, expected = {expected:02X}.")]
    ChecksumMismatch { expected: u8, calculated: u8 },
}

impl DecodeError {
    /// `Incomplete` only means the caller has to feed more bytes.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::Incomplete { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    #[error("Sector boundaries must cover 360 degrees without overlap: {0}")]
    InvalidSectors(String),
    #[error("Invalid safety margin settings: {0}")]
    InvalidMargin(String),
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum RoverError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Actuator write failed {attempts} times in a row: {source}")]
    ActuatorFailed {
        attempts: usize,
        #[source]
        source: io::Error,
    },
    #[error("The {0} thread panicked")]
    ThreadPanicked(&'static str),
}
