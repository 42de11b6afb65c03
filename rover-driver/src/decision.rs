//! Reactive obstacle avoidance.
//!
//! Every cycle is classified from scratch into a [`Mode`]; only the previous
//! command (for turn hysteresis) and the count of stalled cycles carry over.

use crate::error::ConfigError;
use rover_data::{Command, CommandKind, SectorMap, SectorReading, SectorRole, NO_RETURN};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Front distance (mm) under which the rover stops whatever the margin.
    pub critical_stop_mm: u16,
    /// Consecutive cycles without any return before the rover is stopped.
    pub stall_cycle_threshold: u32,
    /// Keep the previous turn direction while both sides differ by no more
    /// than this (mm). 0 disables it.
    pub turn_hysteresis_mm: u16,
    /// How long a reverse maneuver lasts without a newer command.
    pub reverse_duration_ms: Option<u64>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        DecisionConfig {
            critical_stop_mm: 150,
            stall_cycle_threshold: 5,
            turn_hysteresis_mm: 0,
            reverse_duration_ms: Some(500),
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stall_cycle_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stall_cycle_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.critical_stop_mm == 0 || self.critical_stop_mm == NO_RETURN {
            return Err(ConfigError::InvalidValue {
                field: "critical_stop_mm",
                reason: format!("must be within 1..{}", NO_RETURN),
            });
        }
        Ok(())
    }
}

/// Situation of the rover in one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Something is closer ahead than the critical distance.
    Critical { front: u16 },
    /// No return at all in any sector.
    Stalled,
    /// The front sector was not swept this cycle.
    FrontUnseen,
    /// Nothing ahead within the margin.
    Clear,
    /// Blocked ahead, with at least one side open.
    FrontBlocked { left: u16, right: u16 },
    /// Blocked ahead and on both sides.
    BoxedIn { rear_clear: bool },
}

fn within(reading: &SectorReading, margin: f64) -> bool {
    !reading.is_clear() && (reading.distance as f64) < margin
}

fn nearest(a: &SectorReading, b: &SectorReading) -> u16 {
    let distance = |r: &SectorReading| if r.is_clear() { NO_RETURN } else { r.distance };
    distance(a).min(distance(b))
}

/// Classifies a cycle. Pure.
pub fn classify(sectors: &SectorMap, margin: f64, config: &DecisionConfig) -> Mode {
    let front = sectors.get(SectorRole::Front);
    if !front.is_clear() && front.distance < config.critical_stop_mm {
        return Mode::Critical {
            front: front.distance,
        };
    }
    if sectors.total_points() == 0 {
        return Mode::Stalled;
    }
    if !front.swept {
        return Mode::FrontUnseen;
    }
    if !within(front, margin) {
        return Mode::Clear;
    }

    let front_left = sectors.get(SectorRole::FrontLeft);
    let left = sectors.get(SectorRole::Left);
    let front_right = sectors.get(SectorRole::FrontRight);
    let right = sectors.get(SectorRole::Right);
    let left_blocked = within(front_left, margin) || within(left, margin);
    let right_blocked = within(front_right, margin) || within(right, margin);
    if left_blocked && right_blocked {
        return Mode::BoxedIn {
            rear_clear: !within(sectors.get(SectorRole::Rear), margin),
        };
    }
    Mode::FrontBlocked {
        left: nearest(front_left, left),
        right: nearest(front_right, right),
    }
}

/// Maps a mode to a command. `previous` matters for turn hysteresis and
/// for cycles that did not see the front.
///
/// `Mode::Stalled` maps to STOP here; the engine decides when to apply it.
pub fn command_for(mode: Mode, previous: Option<&Command>, config: &DecisionConfig) -> Command {
    match mode {
        Mode::Critical { .. } | Mode::Stalled => Command::STOP,
        Mode::FrontUnseen => previous.copied().unwrap_or(Command::STOP),
        Mode::Clear => Command::new(CommandKind::MoveForward),
        Mode::FrontBlocked { left, right } => {
            // turn away from the nearer side, ties go right
            let preferred = if right < left {
                CommandKind::TurnLeft
            } else {
                CommandKind::TurnRight
            };
            let kind = match previous {
                Some(prev)
                    if prev.is_turn()
                        && config.turn_hysteresis_mm > 0
                        && left.abs_diff(right) <= config.turn_hysteresis_mm =>
                {
                    prev.kind
                }
                _ => preferred,
            };
            Command::new(kind)
        }
        Mode::BoxedIn { rear_clear: true } => {
            let command = Command::new(CommandKind::MoveBackward);
            match config.reverse_duration_ms {
                Some(ms) => command.with_duration(Duration::from_millis(ms)),
                None => command,
            }
        }
        Mode::BoxedIn { rear_clear: false } => Command::new(CommandKind::SpinInPlace),
    }
}

/// Outcome of one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub mode: Mode,
    pub command: Command,
    /// Perception has been stalled for at least the configured number of cycles.
    pub degraded: bool,
}

pub struct DecisionEngine {
    config: DecisionConfig,
    previous: Option<Command>,
    stalled_cycles: u32,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> DecisionEngine {
        DecisionEngine {
            config,
            previous: None,
            stalled_cycles: 0,
        }
    }

    pub fn previous(&self) -> Option<&Command> {
        self.previous.as_ref()
    }

    pub fn stalled_cycles(&self) -> u32 {
        self.stalled_cycles
    }

    pub fn decide(&mut self, sectors: &SectorMap, margin: f64) -> Decision {
        let mode = classify(sectors, margin, &self.config);
        let mut degraded = false;

        let command = if mode == Mode::Stalled {
            self.stalled_cycles = self.stalled_cycles.saturating_add(1);
            if self.stalled_cycles >= self.config.stall_cycle_threshold {
                if self.stalled_cycles == self.config.stall_cycle_threshold {
                    warn!(
                        "No LiDAR return for {} cycles, perception degraded. Stopping.",
                        self.stalled_cycles
                    );
                }
                degraded = true;
                Command::STOP
            } else {
                // ride out short dropouts
                self.previous.unwrap_or(Command::STOP)
            }
        } else {
            if self.stalled_cycles >= self.config.stall_cycle_threshold {
                info!("LiDAR returns recovered after {} cycles", self.stalled_cycles);
            }
            self.stalled_cycles = 0;
            command_for(mode, self.previous.as_ref(), &self.config)
        };

        if self.previous.map(|p| p.kind) != Some(command.kind) {
            debug!("{:?} -> {:?} (margin {:.0} mm)", mode, command.kind, margin);
        }
        self.previous = Some(command);
        Decision {
            mode,
            command,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MARGIN: f64 = 1000.;

    fn all_at(distance: u16) -> SectorMap {
        SectorRole::ALL
            .iter()
            .fold(SectorMap::clear(), |map, role| map.with(*role, distance, 100))
    }

    fn kind(engine: &mut DecisionEngine, map: &SectorMap) -> CommandKind {
        engine.decide(map, MARGIN).command.kind
    }

    #[test]
    fn test_clear_moves_forward() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        assert_eq!(kind(&mut engine, &all_at(1500)), CommandKind::MoveForward);

        // a wall alongside does not prevent moving forward
        let map = all_at(1500).with(SectorRole::Left, 400, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::MoveForward);
    }

    #[test]
    fn test_critical_interlock() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        let map = SectorMap::clear().with(SectorRole::Front, 50, 100);
        let decision = engine.decide(&map, MARGIN);
        assert_eq!(decision.mode, Mode::Critical { front: 50 });
        assert_eq!(decision.command, Command::STOP);

        let map = all_at(3000).with(SectorRole::Front, 50, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::Stop);
    }

    #[test]
    fn test_turn_away_from_nearer_side() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        let map = all_at(3000)
            .with(SectorRole::Front, 600, 100)
            .with(SectorRole::Right, 1200, 100)
            .with(SectorRole::Left, 2000, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::TurnLeft);

        let map = all_at(3000)
            .with(SectorRole::Front, 600, 100)
            .with(SectorRole::FrontLeft, 1200, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::TurnRight);

        // one side blocked, the other open
        let map = all_at(3000)
            .with(SectorRole::Front, 600, 100)
            .with(SectorRole::FrontRight, 500, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::TurnLeft);
    }

    #[test]
    fn test_tie_prefers_right() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        let map = all_at(1500).with(SectorRole::Front, 600, 100);
        let first = engine.decide(&map, MARGIN);
        let second = engine.decide(&map, MARGIN);
        assert_eq!(first.command.kind, CommandKind::TurnRight);
        assert_eq!(first.command, second.command);
    }

    #[test]
    fn test_boxed_in() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        let map = all_at(500).with(SectorRole::Rear, 1500, 100);
        let decision = engine.decide(&map, MARGIN);
        assert_eq!(decision.mode, Mode::BoxedIn { rear_clear: true });
        assert_eq!(decision.command.kind, CommandKind::MoveBackward);
        assert_eq!(decision.command.duration, Some(Duration::from_millis(500)));

        let decision = engine.decide(&all_at(500), MARGIN);
        assert_eq!(decision.mode, Mode::BoxedIn { rear_clear: false });
        assert_eq!(decision.command.kind, CommandKind::SpinInPlace);

        // rear without any return counts as clear
        let map = SectorMap::clear()
            .with(SectorRole::Front, 500, 100)
            .with(SectorRole::Left, 500, 100)
            .with(SectorRole::Right, 500, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::MoveBackward);
    }

    #[test]
    fn test_stall_stops_after_threshold() {
        let config = DecisionConfig {
            stall_cycle_threshold: 3,
            ..DecisionConfig::default()
        };
        let mut engine = DecisionEngine::new(config);
        assert_eq!(kind(&mut engine, &all_at(1500)), CommandKind::MoveForward);

        let empty = SectorMap::clear();
        let d1 = engine.decide(&empty, MARGIN);
        let d2 = engine.decide(&empty, MARGIN);
        assert_eq!(d1.mode, Mode::Stalled);
        assert_eq!(d1.command.kind, CommandKind::MoveForward);
        assert_eq!(d2.command.kind, CommandKind::MoveForward);
        assert!(!d2.degraded);

        let d3 = engine.decide(&empty, MARGIN);
        assert_eq!(d3.command, Command::STOP);
        assert!(d3.degraded);
        let d4 = engine.decide(&empty, MARGIN);
        assert_eq!(d4.command, Command::STOP);
        assert_eq!(engine.stalled_cycles(), 4);

        assert_eq!(kind(&mut engine, &all_at(1500)), CommandKind::MoveForward);
        assert_eq!(engine.stalled_cycles(), 0);
    }

    #[test]
    fn test_unswept_front_holds_previous_command() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        let side_only = SectorMap::unseen().with(SectorRole::Right, 3000, 100);

        // nothing seen ahead yet
        let decision = engine.decide(&side_only, MARGIN);
        assert_eq!(decision.mode, Mode::FrontUnseen);
        assert_eq!(decision.command, Command::STOP);

        let wall = SectorMap::unseen().with(SectorRole::Front, 50, 100);
        assert_eq!(kind(&mut engine, &wall), CommandKind::Stop);
        assert_eq!(kind(&mut engine, &side_only), CommandKind::Stop);

        assert_eq!(kind(&mut engine, &all_at(1500)), CommandKind::MoveForward);
        assert_eq!(kind(&mut engine, &side_only), CommandKind::MoveForward);
        assert_eq!(engine.stalled_cycles(), 0);
    }

    #[test]
    fn test_stall_at_startup_stops() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        assert_eq!(kind(&mut engine, &SectorMap::clear()), CommandKind::Stop);
    }

    #[test]
    fn test_turn_hysteresis() {
        let config = DecisionConfig {
            turn_hysteresis_mm: 100,
            ..DecisionConfig::default()
        };
        let mut engine = DecisionEngine::new(config);
        let base = all_at(3000).with(SectorRole::Front, 600, 100);

        let map = base
            .clone()
            .with(SectorRole::Right, 1200, 100)
            .with(SectorRole::Left, 2000, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::TurnLeft);

        // the sides swap by less than the band: keep turning left
        let map = base
            .clone()
            .with(SectorRole::Right, 1550, 100)
            .with(SectorRole::Left, 1500, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::TurnLeft);

        // beyond the band: follow the clearer side
        let map = base.with(SectorRole::Right, 1800, 100).with(SectorRole::Left, 1500, 100);
        assert_eq!(kind(&mut engine, &map), CommandKind::TurnRight);
    }

    #[test]
    fn test_validate() {
        assert!(DecisionConfig::default().validate().is_ok());
        let config = DecisionConfig {
            stall_cycle_threshold: 0,
            ..DecisionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "stall_cycle_threshold",
                ..
            })
        ));
    }

    fn sector_map() -> impl Strategy<Value = SectorMap> {
        proptest::collection::vec(1u16..8000, 6).prop_map(|distances| {
            SectorRole::ALL
                .iter()
                .zip(distances)
                .fold(SectorMap::clear(), |map, (role, d)| map.with(*role, d, 100))
        })
    }

    proptest! {
        #[test]
        fn beyond_margin_moves_forward(distances in proptest::collection::vec(1001u16..8000, 6)) {
            let map = SectorRole::ALL
                .iter()
                .zip(distances)
                .fold(SectorMap::clear(), |map, (role, d)| map.with(*role, d, 100));
            let mut engine = DecisionEngine::new(DecisionConfig::default());
            prop_assert_eq!(engine.decide(&map, MARGIN).command.kind, CommandKind::MoveForward);
        }

        #[test]
        fn critical_front_always_stops(map in sector_map(), front in 1u16..150) {
            let map = map.with(SectorRole::Front, front, 100);
            let mut engine = DecisionEngine::new(DecisionConfig::default());
            prop_assert_eq!(engine.decide(&map, MARGIN).command, Command::STOP);
        }

        #[test]
        fn same_input_same_command(map in sector_map(), margin in 300.0..2000.0f64) {
            let mut engine = DecisionEngine::new(DecisionConfig::default());
            let first = engine.decide(&map, margin);
            let second = engine.decide(&map, margin);
            prop_assert_eq!(first.command, second.command);
        }
    }
}
