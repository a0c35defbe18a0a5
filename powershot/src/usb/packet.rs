//! Command packet layout and bulk chunking rules.
//!
//! ```text
//! 0x00  request size (payload + 0x10)      0x40  0x02
//! 0x04  cmd3 (0x201 fixed, 0x202 variable) 0x44  cmd1
//!                                          0x47  cmd2
//!                                          0x48  request size again
//!                                          0x4c  serial
//! 0x50  payload...
//! ```

use bytes::{BufMut, BytesMut};

use crate::catalog::CommandDescriptor;

pub const HEADER_LEN: usize = 0x50;
/// Size of the header the camera puts in front of every response.
pub const RESPONSE_HEADER_LEN: usize = 0x40;
/// Bulk reads never ask for more than this.
pub const MAX_CHUNK_SIZE: usize = 0x1400;
/// Bulk reads other than the last one are multiples of this.
pub const BLOCK_SIZE: usize = 0x40;

/// Offset of the response length (excluding the header) in a fixed response.
pub const RESPONSE_LEN_OFFSET: usize = 0x48;
/// Offset of the status word in a fixed response.
pub const RESPONSE_STATUS_OFFSET: usize = 0x50;
/// Offset of the "bytes to follow" word in a variable response.
pub const VARIABLE_LEN_OFFSET: usize = 0x06;

const SERIAL_WRAP: u32 = 65530;

/// The per-transport command serial number.
///
/// It does not count by one: each step adds `serial % 8`, or 5 when that is
/// zero, and it starts over once past 65530. Consecutive values always
/// differ, which is all the camera seems to care about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Serial(u32);

impl Serial {
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn advance(&mut self) -> u32 {
        let step = match self.0 % 8 {
            0 => 5,
            n => n,
        };
        self.0 += step;
        if self.0 > SERIAL_WRAP {
            self.0 = 0;
        }
        self.0
    }

    fn wire_bytes(&self) -> [u8; 4] {
        let mut raw = self.0.to_le_bytes();
        raw[2] = 0x12;
        raw
    }
}

/// Assemble the 0x50 byte header for `cmd` followed by `payload`.
pub fn build_packet(cmd: &CommandDescriptor, payload: &[u8], serial: Serial) -> BytesMut {
    let request_size = (payload.len() + 0x10) as u32;

    let mut packet = BytesMut::with_capacity(HEADER_LEN + payload.len());
    packet.put_u32_le(request_size);
    packet.put_u32_le(cmd.cmd3());
    packet.put_bytes(0, 0x40 - 8);
    packet.put_u8(0x02);
    packet.put_bytes(0, 3);
    packet.put_u8(cmd.cmd1);
    packet.put_bytes(0, 2);
    packet.put_u8(cmd.cmd2);
    packet.put_u32_le(request_size);
    packet.put_slice(&serial.wire_bytes());
    packet.put_slice(payload);
    packet
}

/// Size of the first bulk read for a fixed response of `expected` bytes.
pub fn first_chunk_size(expected: usize) -> usize {
    if expected > BLOCK_SIZE {
        expected.min(MAX_CHUNK_SIZE) / BLOCK_SIZE * BLOCK_SIZE
    } else {
        expected
    }
}

/// Size of the next bulk read with `remaining` bytes left to fetch.
///
/// The final read takes whatever is left; any other read is capped at
/// [`MAX_CHUNK_SIZE`] and kept on a [`BLOCK_SIZE`] boundary.
pub fn next_chunk_size(remaining: usize) -> usize {
    if remaining > MAX_CHUNK_SIZE {
        MAX_CHUNK_SIZE / BLOCK_SIZE * BLOCK_SIZE
    } else {
        remaining
    }
}

/// Iterator over the bulk read sizes needed to drain `remaining` bytes.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    remaining: usize,
}

impl ChunkPlan {
    pub fn new(remaining: usize) -> Self {
        Self { remaining }
    }
}

impl Iterator for ChunkPlan {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let chunk = next_chunk_size(self.remaining);
        self.remaining -= chunk;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GET_DIR, IDENTIFY_CAMERA};
    use crate::codec::le32;

    #[test]
    fn identify_packet_layout() {
        let packet = build_packet(&IDENTIFY_CAMERA, &[], Serial::default());
        assert_eq!(packet.len(), HEADER_LEN);
        assert_eq!(le32(&packet, 0x00).unwrap(), 0x10);
        assert_eq!(le32(&packet, 0x04).unwrap(), 0x201);
        assert_eq!(packet[0x40], 0x02);
        assert_eq!(packet[0x44], 0x01);
        assert_eq!(packet[0x47], 0x12);
        assert_eq!(le32(&packet, 0x48).unwrap(), 0x10);
        assert_eq!(&packet[0x4c..0x50], &[0x00, 0x00, 0x12, 0x00]);
    }

    #[test]
    fn payload_follows_header() {
        let payload = [0x0c, b'A', b':', 0, 0, 0];
        let mut serial = Serial::default();
        serial.advance();
        let packet = build_packet(&GET_DIR, &payload, serial);
        assert_eq!(packet.len(), HEADER_LEN + payload.len());
        assert_eq!(le32(&packet, 0x00).unwrap(), 0x16);
        assert_eq!(le32(&packet, 0x04).unwrap(), 0x202);
        assert_eq!(le32(&packet, 0x48).unwrap(), 0x16);
        assert_eq!(packet[0x4c], 5);
        assert_eq!(&packet[HEADER_LEN..], &payload);
    }

    #[test]
    fn serial_sequence() {
        let mut serial = Serial::default();
        let seq: Vec<u32> = (0..6).map(|_| serial.advance()).collect();
        assert_eq!(seq, vec![5, 10, 12, 16, 21, 26]);
    }

    #[test]
    fn serial_wraps_below_16_bits() {
        let mut serial = Serial(65528);
        assert_eq!(serial.advance(), 0);
        assert_eq!(serial.advance(), 5);
    }

    #[test]
    fn chunk_plans() {
        assert_eq!(ChunkPlan::new(0x1500).collect::<Vec<_>>(), vec![0x1400, 0x100]);
        assert_eq!(ChunkPlan::new(0x7f).collect::<Vec<_>>(), vec![0x7f]);
        assert_eq!(ChunkPlan::new(0x2800).collect::<Vec<_>>(), vec![0x1400, 0x1400]);
        assert_eq!(ChunkPlan::new(0).count(), 0);
    }

    #[test]
    fn first_chunks() {
        assert_eq!(first_chunk_size(0x54), 0x40);
        assert_eq!(first_chunk_size(0x9c), 0x80);
        assert_eq!(first_chunk_size(0x40), 0x40);
        assert_eq!(first_chunk_size(0x20), 0x20);
        assert_eq!(first_chunk_size(0x474), 0x440);
        assert_eq!(first_chunk_size(0x2000), 0x1400);
    }
}
