use crate::constants::{ANGLE_UNITS_PER_DEGREE, CRC_TABLE};

pub(crate) fn to_u16_le(low: u8, high: u8) -> u16 {
    ((high as u16) << 8) + (low as u16)
}

pub(crate) fn to_angle(low: u8, high: u8) -> f64 {
    (to_u16_le(low, high) as f64) / ANGLE_UNITS_PER_DEGREE
}

pub(crate) fn normalize_degree(degree: f64) -> f64 {
    let d = degree % 360.;
    if d < 0. {
        d + 360.
    } else {
        d
    }
}

pub(crate) fn calc_crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, byte| CRC_TABLE[(crc ^ byte) as usize])
}

pub(crate) fn to_string(data: &[u8]) -> String {
    data.iter()
        .map(|e| format!("{:02X}", e))
        .collect::<Vec<_>>()
        .join(" ")
}
