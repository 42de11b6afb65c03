#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Motion the rover is asked to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CommandKind {
    MoveForward,
    MoveBackward,
    TurnLeft,
    TurnRight,
    SpinInPlace,
    Stop,
}

/// Motion command sent to the motor controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Command {
    pub kind: CommandKind,
    /// Wheel speed magnitude overriding the drive profile.
    pub speed: Option<u8>,
    /// How long the motion stays valid without a newer command.
    pub duration: Option<Duration>,
}

impl Command {
    pub const STOP: Command = Command::new(CommandKind::Stop);

    pub const fn new(kind: CommandKind) -> Command {
        Command {
            kind,
            speed: None,
            duration: None,
        }
    }

    pub fn with_speed(mut self, speed: u8) -> Command {
        self.speed = Some(speed);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Command {
        self.duration = Some(duration);
        self
    }

    pub fn is_stop(&self) -> bool {
        self.kind == CommandKind::Stop
    }

    pub fn is_turn(&self) -> bool {
        matches!(self.kind, CommandKind::TurnLeft | CommandKind::TurnRight)
    }
}

impl From<CommandKind> for Command {
    fn from(kind: CommandKind) -> Command {
        Command::new(kind)
    }
}
