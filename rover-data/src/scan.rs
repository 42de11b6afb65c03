#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single range measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanPoint {
    /// Scan angle in degree, in `[0, 360)`.
    pub angle: f64,
    /// Distance to an object (in mm).
    pub distance: u16,
    /// Return strength of the laser pulse.
    pub intensity: u8,
}

/// Struct to hold the points of one LiDAR packet.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanFrame {
    /// Rotation speed of the sensor head in degree per second.
    pub rotation_speed: f64,
    /// Angle of the first sample in degree.
    pub start_angle: f64,
    /// Angle of the last sample in degree.
    pub end_angle: f64,
    /// Points in device angular order.
    pub points: Vec<ScanPoint>,
    /// Samples the device took, including the returns dropped as no echo or out of range.
    pub samples: usize,
    /// Device timestamp in milliseconds. Wraps around.
    pub timestamp: u16,
}

impl ScanFrame {
    /// Angle swept between the first and the last sample, in degree.
    pub fn angular_span(&self) -> f64 {
        let span = self.end_angle - self.start_angle;
        if span < 0. {
            span + 360.
        } else {
            span
        }
    }

    /// Number of samples per degree of sweep.
    ///
    /// Returns 0 when the frame does not span any angle.
    pub fn angular_density(&self) -> f64 {
        let span = self.angular_span();
        if span <= 0. || self.samples < 2 {
            return 0.;
        }
        ((self.samples - 1) as f64) / span
    }
}
