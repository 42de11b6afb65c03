use crate::constants::{
    ANGLE_UNITS_PER_DEGREE, LD19_HEADER, LD19_POINTS_OFFSET, LD19_POINT_SIZE, LD19_SPEED_OFFSET,
    LD19_START_ANGLE_OFFSET, LD19_TRAILER_SIZE, LD19_VER_LEN, POINT_COUNT_MASK,
};
use crate::error::DecodeError;
use crate::numeric::{calc_crc8, normalize_degree, to_angle, to_string, to_u16_le};
use rover_data::{ScanFrame, ScanPoint};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Field layout of a LiDAR packet. Defaults to the LD19.
///
/// All multi-byte fields are little-endian. Angles are in hundredths of a degree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLayout {
    /// Start marker of every packet.
    pub header: u8,
    /// Expected value of the byte following the header. Its lower five bits carry the point count.
    pub ver_len: u8,
    pub speed_offset: usize,
    pub start_angle_offset: usize,
    pub points_offset: usize,
    /// Bytes per point: distance (2) followed by intensity (1).
    pub point_size: usize,
    /// End angle (2), timestamp (2) and checksum (1).
    pub trailer_size: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        FrameLayout {
            header: LD19_HEADER,
            ver_len: LD19_VER_LEN,
            speed_offset: LD19_SPEED_OFFSET,
            start_angle_offset: LD19_START_ANGLE_OFFSET,
            points_offset: LD19_POINTS_OFFSET,
            point_size: LD19_POINT_SIZE,
            trailer_size: LD19_TRAILER_SIZE,
        }
    }
}

impl FrameLayout {
    pub fn n_points(&self) -> usize {
        (self.ver_len & POINT_COUNT_MASK) as usize
    }

    pub fn packet_size(&self) -> usize {
        self.points_offset + self.n_points() * self.point_size + self.trailer_size
    }

    fn end_angle_offset(&self) -> usize {
        self.points_offset + self.n_points() * self.point_size
    }

    fn timestamp_offset(&self) -> usize {
        self.end_angle_offset() + 2
    }

    fn scan_index(&self, idx: usize) -> usize {
        self.points_offset + idx * self.point_size
    }

    /// Serializes a packet in this layout, checksum included.
    ///
    /// Used to replay recorded scans and to drive simulated sensors.
    pub fn encode(
        &self,
        rotation_speed: u16,
        start_angle: f64,
        end_angle: f64,
        points: &[(u16, u8)],
        timestamp: u16,
    ) -> Vec<u8> {
        let mut packet = vec![0u8; self.packet_size()];
        packet[0] = self.header;
        packet[1] = self.ver_len;
        put_u16_le(&mut packet, self.speed_offset, rotation_speed);
        put_u16_le(&mut packet, self.start_angle_offset, to_angle_units(start_angle));
        for idx in 0..self.n_points() {
            let (distance, intensity) = points.get(idx).copied().unwrap_or((0, 0));
            let i = self.scan_index(idx);
            put_u16_le(&mut packet, i, distance);
            packet[i + 2] = intensity;
        }
        put_u16_le(&mut packet, self.end_angle_offset(), to_angle_units(end_angle));
        put_u16_le(&mut packet, self.timestamp_offset(), timestamp);
        let crc_index = packet.len() - 1;
        packet[crc_index] = calc_crc8(&packet[..crc_index]);
        packet
    }
}

fn put_u16_le(packet: &mut [u8], index: usize, value: u16) {
    packet[index..index + 2].copy_from_slice(&value.to_le_bytes());
}

fn to_angle_units(degree: f64) -> u16 {
    (normalize_degree(degree) * ANGLE_UNITS_PER_DEGREE).round() as u16
}

pub(crate) fn find_start_index(buffer: &VecDeque<u8>, header: u8) -> Option<usize> {
    buffer.iter().position(|e| *e == header)
}

pub(crate) fn validate_length_field(layout: &FrameLayout, ver_len: u8) -> Result<(), DecodeError> {
    if ver_len != layout.ver_len || layout.n_points() == 0 {
        return Err(DecodeError::InvalidLength(ver_len));
    }
    Ok(())
}

pub(crate) fn err_if_checksum_mismatched(packet: &[u8]) -> Result<(), DecodeError> {
    let (payload, crc) = packet.split_at(packet.len() - 1);
    let calculated = calc_crc8(payload);
    let expected = crc[0];
    match calculated != expected {
        true => Err(DecodeError::ChecksumMismatch {
            expected,
            calculated,
        }),
        false => Ok(()),
    }
}

/// Extracts a frame from a packet whose checksum has already been validated.
///
/// Returns with distance 0 (no echo) or above `max_distance` are dropped.
pub(crate) fn parse_packet(
    layout: &FrameLayout,
    packet: &[u8],
    max_distance: u16,
) -> Result<ScanFrame, DecodeError> {
    if packet.len() != layout.packet_size() || packet[0] != layout.header {
        return Err(DecodeError::InvalidHeader {
            expected: layout.header,
            observed: to_string(&packet[..packet.len().min(2)]),
        });
    }
    let speed = layout.speed_offset;
    let rotation_speed = to_u16_le(packet[speed], packet[speed + 1]) as f64;
    let start_angle = to_angle(
        packet[layout.start_angle_offset],
        packet[layout.start_angle_offset + 1],
    );
    let end_index = layout.end_angle_offset();
    let end_angle = to_angle(packet[end_index], packet[end_index + 1]);
    let ts_index = layout.timestamp_offset();
    let timestamp = to_u16_le(packet[ts_index], packet[ts_index + 1]);

    let n = layout.n_points();
    let angle_shift = if start_angle <= end_angle { 0f64 } else { 360. };
    let angle_rate = if n > 1 {
        (end_angle - start_angle + angle_shift) / ((n - 1) as f64)
    } else {
        0.
    };

    let points = (0..n)
        .filter_map(|idx| {
            let i = layout.scan_index(idx);
            let distance = to_u16_le(packet[i], packet[i + 1]);
            if distance == 0 || distance > max_distance {
                return None;
            }
            Some(ScanPoint {
                angle: normalize_degree(start_angle + (idx as f64) * angle_rate),
                distance,
                intensity: packet[i + 2],
            })
        })
        .collect();

    Ok(ScanFrame {
        rotation_speed,
        start_angle,
        end_angle,
        points,
        samples: n,
        timestamp,
    })
}
