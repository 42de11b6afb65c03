#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distance reported for a sector without any qualifying return.
pub const NO_RETURN: u16 = u16::MAX;

/// Direction a sector summarizes, relative to the rover heading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SectorRole {
    Front,
    FrontRight,
    Right,
    Rear,
    Left,
    FrontLeft,
}

impl SectorRole {
    pub const ALL: [SectorRole; 6] = [
        SectorRole::Front,
        SectorRole::FrontRight,
        SectorRole::Right,
        SectorRole::Rear,
        SectorRole::Left,
        SectorRole::FrontLeft,
    ];

    fn index(self) -> usize {
        match self {
            SectorRole::Front => 0,
            SectorRole::FrontRight => 1,
            SectorRole::Right => 2,
            SectorRole::Rear => 3,
            SectorRole::Left => 4,
            SectorRole::FrontLeft => 5,
        }
    }
}

/// Nearest qualifying return in one sector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectorReading {
    /// Distance to the nearest return (in mm), `NO_RETURN` when clear.
    pub distance: u16,
    /// Intensity of the nearest return.
    pub intensity: u8,
    /// Number of returns above the noise floor.
    pub n_points: usize,
    /// The sensor swept this sector during the cycle. An unswept sector says
    /// nothing about obstacles, even without returns.
    pub swept: bool,
}

impl SectorReading {
    pub const CLEAR: SectorReading = SectorReading {
        distance: NO_RETURN,
        intensity: 0,
        n_points: 0,
        swept: true,
    };

    pub const UNSEEN: SectorReading = SectorReading {
        swept: false,
        ..SectorReading::CLEAR
    };

    pub fn is_clear(&self) -> bool {
        self.n_points == 0
    }

    /// Folds a return into the reading, keeping the nearest one.
    pub fn observe(&mut self, distance: u16, intensity: u8) {
        if self.n_points == 0 || distance < self.distance {
            self.distance = distance;
            self.intensity = intensity;
        }
        self.n_points += 1;
        self.swept = true;
    }
}

impl Default for SectorReading {
    fn default() -> Self {
        SectorReading::CLEAR
    }
}

/// Per-direction summary of one decision cycle. Every role always has a reading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectorMap {
    readings: [SectorReading; 6],
}

impl SectorMap {
    /// Map where every sector is clear.
    pub fn clear() -> SectorMap {
        SectorMap::default()
    }

    /// Map where no sector has been swept yet.
    pub fn unseen() -> SectorMap {
        SectorMap {
            readings: [SectorReading::UNSEEN; 6],
        }
    }

    pub fn get(&self, role: SectorRole) -> &SectorReading {
        &self.readings[role.index()]
    }

    pub fn get_mut(&mut self, role: SectorRole) -> &mut SectorReading {
        &mut self.readings[role.index()]
    }

    pub fn distance(&self, role: SectorRole) -> u16 {
        self.get(role).distance
    }

    /// Builder-style setter, handy for synthetic maps.
    pub fn with(mut self, role: SectorRole, distance: u16, intensity: u8) -> SectorMap {
        *self.get_mut(role) = SectorReading {
            distance,
            intensity,
            n_points: 1,
            swept: true,
        };
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectorRole, &SectorReading)> {
        SectorRole::ALL.iter().map(move |role| (*role, self.get(*role)))
    }

    pub fn total_points(&self) -> usize {
        self.readings.iter().map(|r| r.n_points).sum()
    }
}
