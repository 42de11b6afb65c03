//! Incremental framing of the LiDAR byte stream.
//!
//! Bytes are fed as they arrive from the serial port; complete packets are
//! validated and decoded on demand. A bad candidate only costs its start
//! marker: scanning resumes from the byte that follows it.

use crate::error::DecodeError;
use crate::packet::{
    err_if_checksum_mismatched, find_start_index, parse_packet, validate_length_field,
    FrameLayout,
};
use rover_data::ScanFrame;
use std::collections::VecDeque;
use tracing::trace;

/// Counters of the framing layer. Framing errors surface nowhere else.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u64,
    pub checksum_errors: u64,
    pub length_errors: u64,
    pub discarded_bytes: u64,
}

pub struct FrameDecoder {
    layout: FrameLayout,
    max_distance: u16,
    buffer: VecDeque<u8>,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(layout: FrameLayout, max_distance: u16) -> FrameDecoder {
        let capacity = layout.packet_size() * 4;
        FrameDecoder {
            layout,
            max_distance,
            buffer: VecDeque::with_capacity(capacity),
            stats: DecoderStats::default(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next packet from the buffered bytes.
    ///
    /// `DecodeError::Incomplete` means more bytes are needed. Every other
    /// error has already resynchronized the stream and the call can be
    /// repeated immediately.
    pub fn decode_next(&mut self) -> Result<ScanFrame, DecodeError> {
        let needed = self.layout.packet_size();

        let start_index = match find_start_index(&self.buffer, self.layout.header) {
            Some(i) => i,
            None => {
                self.discard(self.buffer.len());
                return Err(DecodeError::Incomplete {
                    available: 0,
                    needed,
                });
            }
        };
        self.discard(start_index); // remove leading bytes

        if self.buffer.len() < 2 {
            return Err(self.incomplete());
        }
        if let Err(e) = validate_length_field(&self.layout, self.buffer[1]) {
            trace!("{e}");
            self.stats.length_errors += 1;
            self.discard(1);
            return Err(e);
        }
        if self.buffer.len() < needed {
            // insufficient buffer size to extract a packet
            return Err(self.incomplete());
        }

        let packet = self.buffer.range(..needed).copied().collect::<Vec<_>>();
        if let Err(e) = err_if_checksum_mismatched(&packet) {
            trace!("{e}");
            self.stats.checksum_errors += 1;
            self.discard(1);
            return Err(e);
        }
        self.buffer.drain(..needed);

        let frame = parse_packet(&self.layout, &packet, self.max_distance)?;
        self.stats.frames += 1;
        Ok(frame)
    }

    /// Lazily decodes buffered packets until more bytes are needed.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    fn incomplete(&self) -> DecodeError {
        DecodeError::Incomplete {
            available: self.buffer.len(),
            needed: self.layout.packet_size(),
        }
    }

    fn discard(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.buffer.drain(..n);
        self.stats.discarded_bytes += n as u64;
    }
}

pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<ScanFrame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.decoder.decode_next() {
            Err(e) if e.is_incomplete() => None,
            result => Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LIDAR_MAX_DISTANCE_VALUE;
    use crate::packet::tests::SAMPLE_PACKET;

    fn decoder() -> FrameDecoder {
        FrameDecoder::new(FrameLayout::default(), LIDAR_MAX_DISTANCE_VALUE)
    }

    #[test]
    fn test_single_packet() {
        let mut decoder = decoder();
        decoder.feed(&SAMPLE_PACKET);
        let frame = decoder.decode_next().unwrap();
        assert_eq!(frame.points.len(), 12);
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.decode_next().unwrap_err().is_incomplete());
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let mut decoder = decoder();
        decoder.feed(&[0x00, 0x12, 0xFF]);
        decoder.feed(&SAMPLE_PACKET);
        let frames = decoder.frames().collect::<Vec<_>>();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_ok());
        assert_eq!(decoder.stats().discarded_bytes, 3);
    }

    #[test]
    fn test_valid_packet_followed_by_garbage() {
        let mut decoder = decoder();
        decoder.feed(&SAMPLE_PACKET);
        // garbage that contains start markers
        let garbage = [
            0x54, 0x2C, 0x01, 0x02, 0x54, 0x99, 0x54, 0x2C, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
            0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
            0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, 0x20, 0x21, 0x22, 0x23, 0x24,
            0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, 0x30, 0x31, 0x32,
        ];
        decoder.feed(&garbage);

        let results = decoder.frames().collect::<Vec<_>>();
        let n_ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(n_ok, 1);
        assert!(results[0].is_ok());
        assert!(results[1..].iter().all(|r| r.is_err()));

        // the stream resynchronizes on the next good packet
        decoder.feed(&SAMPLE_PACKET);
        let frame = decoder.frames().find_map(|r| r.ok());
        assert!(frame.is_some());
        assert_eq!(decoder.stats().frames, 2);
    }

    #[test]
    fn test_checksum_failure_discards_only_the_marker() {
        let mut decoder = decoder();
        let mut corrupted = SAMPLE_PACKET;
        corrupted[20] ^= 0x40;
        decoder.feed(&corrupted);
        decoder.feed(&SAMPLE_PACKET);

        assert!(matches!(
            decoder.decode_next(),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
        assert_eq!(decoder.buffered(), 2 * SAMPLE_PACKET.len() - 1);

        let frame = decoder.frames().find_map(|r| r.ok()).unwrap();
        assert_eq!(frame.timestamp, 6714);
        assert_eq!(decoder.stats().checksum_errors, 1);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_invalid_length_field() {
        let mut decoder = decoder();
        decoder.feed(&[0x54, 0x2D]);
        assert_eq!(decoder.decode_next(), Err(DecodeError::InvalidLength(0x2D)));
        assert_eq!(decoder.stats().length_errors, 1);
        assert!(decoder.decode_next().unwrap_err().is_incomplete());
    }

    #[test]
    fn test_truncated_stream_is_incomplete() {
        let mut decoder = decoder();
        decoder.feed(&SAMPLE_PACKET[..30]);
        assert_eq!(
            decoder.decode_next(),
            Err(DecodeError::Incomplete {
                available: 30,
                needed: 47
            })
        );
        // nothing was lost while waiting
        decoder.feed(&SAMPLE_PACKET[30..]);
        assert!(decoder.decode_next().is_ok());
    }

    #[test]
    fn test_byte_by_byte_feed() {
        let mut decoder = decoder();
        let mut n_frames = 0;
        for byte in SAMPLE_PACKET.iter().chain(SAMPLE_PACKET.iter()) {
            decoder.feed(&[*byte]);
            n_frames += decoder.frames().filter(|r| r.is_ok()).count();
        }
        assert_eq!(n_frames, 2);
    }
}
