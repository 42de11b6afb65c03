//! Motor controller wire format.
//!
//! Waveshare rovers take one JSON object per line: `{"T":1,"L":..,"R":..}`
//! sets both wheel speeds, `{"T":0}` stops.

use rover_data::{Command, CommandKind};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use tracing::info;

const CMD_STOP: u8 = 0;
const CMD_SPEED: u8 = 1;

#[derive(Serialize)]
struct WheelCommand {
    #[serde(rename = "T")]
    cmd: u8,
    #[serde(rename = "L", skip_serializing_if = "Option::is_none")]
    left: Option<i16>,
    #[serde(rename = "R", skip_serializing_if = "Option::is_none")]
    right: Option<i16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelSpeeds {
    pub left: i16,
    pub right: i16,
}

impl WheelSpeeds {
    pub const fn new(left: i16, right: i16) -> WheelSpeeds {
        WheelSpeeds { left, right }
    }

    fn with_magnitude(self, speed: u8) -> WheelSpeeds {
        let speed = speed as i16;
        WheelSpeeds {
            left: self.left.signum() * speed,
            right: self.right.signum() * speed,
        }
    }
}

/// Wheel speeds for every motion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveProfile {
    pub forward: WheelSpeeds,
    pub backward: WheelSpeeds,
    pub turn_left: WheelSpeeds,
    pub turn_right: WheelSpeeds,
    pub spin: WheelSpeeds,
}

impl Default for DriveProfile {
    fn default() -> Self {
        DriveProfile {
            forward: WheelSpeeds::new(150, 150),
            backward: WheelSpeeds::new(-200, -200),
            turn_left: WheelSpeeds::new(-255, 255),
            turn_right: WheelSpeeds::new(255, -255),
            spin: WheelSpeeds::new(-200, 200),
        }
    }
}

impl DriveProfile {
    pub fn wheel_speeds(&self, command: &Command) -> Option<WheelSpeeds> {
        let speeds = match command.kind {
            CommandKind::MoveForward => self.forward,
            CommandKind::MoveBackward => self.backward,
            CommandKind::TurnLeft => self.turn_left,
            CommandKind::TurnRight => self.turn_right,
            CommandKind::SpinInPlace => self.spin,
            CommandKind::Stop => return None,
        };
        Some(match command.speed {
            Some(speed) => speeds.with_magnitude(speed),
            None => speeds,
        })
    }
}

/// Serializes a command into one newline-terminated JSON line.
pub fn encode_command(
    command: &Command,
    profile: &DriveProfile,
) -> Result<Vec<u8>, serde_json::Error> {
    let wheel = match profile.wheel_speeds(command) {
        Some(speeds) => WheelCommand {
            cmd: CMD_SPEED,
            left: Some(speeds.left),
            right: Some(speeds.right),
        },
        None => WheelCommand {
            cmd: CMD_STOP,
            left: None,
            right: None,
        },
    };
    let mut line = serde_json::to_vec(&wheel)?;
    line.push(b'\n');
    Ok(line)
}

/// Writes exactly one command to the link and flushes it.
pub fn write_command<W: Write + ?Sized>(
    link: &mut W,
    command: &Command,
    profile: &DriveProfile,
) -> io::Result<()> {
    let line = encode_command(command, profile)?;
    link.write_all(&line)?;
    link.flush()
}

/// Link that logs commands instead of driving motors.
#[derive(Default)]
pub struct LoggingLink;

impl Write for LoggingLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        info!("rover <- {}", String::from_utf8_lossy(buf).trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
