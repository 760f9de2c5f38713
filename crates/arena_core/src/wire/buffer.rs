//! Bit-packed, growable wire buffer.
//!
//! Fields are written MSB-first and packed from the most significant bit of
//! each byte, so writing `0b101` (3 bits) followed by `0b11` (2 bits) yields
//! the byte `0b1011_1000`. The same buffer is used for writing and reading;
//! reads consume from a cursor that never passes the written length.
//!
//! Invariants:
//! - `bytes.len() == ceil(bit_len / 8)`
//! - bits past `bit_len` in the last byte are zero
//! - `read_pos <= bit_len`

use crate::error::WireError;

/// Longest varint accepted on decode (ten 7-bit groups cover a `u64`).
const MAX_VARINT_GROUPS: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireBuffer {
    bytes: Vec<u8>,
    bit_len: usize,
    read_pos: usize,
}

impl WireBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            bit_len: 0,
            read_pos: 0,
        }
    }

    /// Wraps received bytes for reading. Every bit of every byte counts as
    /// written, including padding in the final byte.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let bit_len = bytes.len() * 8;
        Self {
            bytes,
            bit_len,
            read_pos: 0,
        }
    }

    /// Writes the lowest `bit_count` bits of `value`.
    ///
    /// # Panics
    ///
    /// Panics if `bit_count > 64`.
    pub fn write_bits(&mut self, value: u64, bit_count: u32) {
        assert!(bit_count <= 64, "cannot write {bit_count} bits in one field");
        if bit_count == 0 {
            return;
        }

        let value = if bit_count == 64 {
            value
        } else {
            value & ((1u64 << bit_count) - 1)
        };

        let mut remaining = bit_count as usize;
        while remaining > 0 {
            let bit_offset = self.bit_len % 8;
            if bit_offset == 0 {
                self.bytes.push(0);
            }

            let free = 8 - bit_offset;
            let take = remaining.min(free);
            let shift = remaining - take;
            let chunk = ((value >> shift) & ((1u64 << take) - 1)) as u8;

            let last = self.bytes.len() - 1;
            self.bytes[last] |= chunk << (free - take);

            self.bit_len += take;
            remaining -= take;
        }
    }

    /// Reads `bit_count` bits written by [`WireBuffer::write_bits`].
    ///
    /// # Panics
    ///
    /// Panics if `bit_count > 64`.
    pub fn read_bits(&mut self, bit_count: u32) -> Result<u64, WireError> {
        assert!(bit_count <= 64, "cannot read {bit_count} bits in one field");
        let requested = bit_count as usize;
        self.ensure_available(requested)?;

        let mut value = 0u64;
        let mut remaining = requested;
        while remaining > 0 {
            let byte = self.bytes[self.read_pos / 8];
            let bit_offset = self.read_pos % 8;
            let free = 8 - bit_offset;
            let take = remaining.min(free);
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (byte >> (free - take)) & mask;

            value = (value << take) | chunk as u64;
            self.read_pos += take;
            remaining -= take;
        }

        Ok(value)
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bits(value as u64, 1);
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Writes an unsigned integer as 7-bit groups, low group first, each
    /// preceded by a continuation bit.
    pub fn write_varint(&mut self, mut value: u64) {
        loop {
            let group = value & 0x7F;
            value >>= 7;
            self.write_bool(value != 0);
            self.write_bits(group, 7);
            if value == 0 {
                break;
            }
        }
    }

    pub fn read_varint(&mut self) -> Result<u64, WireError> {
        let mut value = 0u64;
        for group_index in 0..MAX_VARINT_GROUPS {
            let proceed = self.read_bool()?;
            let group = self.read_bits(7)?;
            value |= group << (7 * group_index);
            if !proceed {
                return Ok(value);
            }
        }
        Err(WireError::InvalidValue("varint longer than 64 bits".to_string()))
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_binary(value.as_bytes());
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let bytes = self.read_binary()?;
        String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    /// Writes a length-prefixed raw block.
    pub fn write_binary(&mut self, data: &[u8]) {
        self.write_varint(data.len() as u64);
        self.write_raw(data);
    }

    pub fn read_binary(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| WireError::InvalidValue(format!("block length {len} too large")))?;
        self.read_raw(len)
    }

    /// Writes a raw block whose size the reader learns some other way.
    pub fn write_raw(&mut self, data: &[u8]) {
        if self.bit_len % 8 == 0 {
            self.bytes.extend_from_slice(data);
            self.bit_len += data.len() * 8;
        } else {
            for byte in data {
                self.write_bits(*byte as u64, 8);
            }
        }
    }

    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>, WireError> {
        let requested = len
            .checked_mul(8)
            .ok_or_else(|| WireError::InvalidValue(format!("block length {len} too large")))?;
        self.ensure_available(requested)?;

        if self.read_pos % 8 == 0 {
            let start = self.read_pos / 8;
            self.read_pos += requested;
            return Ok(self.bytes[start..start + len].to_vec());
        }

        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    /// Appends everything written to `other` (not just its unread part).
    pub fn append(&mut self, other: &WireBuffer) {
        let full_bytes = other.bit_len / 8;
        self.write_raw(&other.bytes[..full_bytes]);
        let tail_bits = (other.bit_len % 8) as u32;
        if tail_bits > 0 {
            let tail = other.bytes[full_bytes] >> (8 - tail_bits);
            self.write_bits(tail as u64, tail_bits);
        }
    }

    /// Total bits written.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn remaining_bits(&self) -> usize {
        self.bit_len - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Moves the read cursor back to the first bit.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.bit_len = 0;
        self.read_pos = 0;
    }

    fn ensure_available(&self, requested: usize) -> Result<(), WireError> {
        let available = self.remaining_bits();
        if requested > available {
            return Err(WireError::BufferOverrun {
                requested,
                available,
            });
        }
        Ok(())
    }
}

impl From<Vec<u8>> for WireBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_order_is_msb_first() {
        let mut buffer = WireBuffer::new();
        buffer.write_bits(0b101, 3);
        buffer.write_bits(0b11, 2);
        assert_eq!(buffer.as_bytes(), &[0b1011_1000]);
        assert_eq!(buffer.bit_len(), 5);
    }

    #[test]
    fn test_mixed_width_fields() {
        let mut buffer = WireBuffer::new();
        buffer.write_bits(1, 1);
        buffer.write_bits(0x3FF, 10);
        buffer.write_bits(u64::MAX, 64);
        buffer.write_bits(0, 0);
        buffer.write_bits(42, 7);

        assert_eq!(buffer.read_bits(1).unwrap(), 1);
        assert_eq!(buffer.read_bits(10).unwrap(), 0x3FF);
        assert_eq!(buffer.read_bits(64).unwrap(), u64::MAX);
        assert_eq!(buffer.read_bits(0).unwrap(), 0);
        assert_eq!(buffer.read_bits(7).unwrap(), 42);
        assert_eq!(buffer.remaining_bits(), 0);
    }

    #[test]
    fn test_write_masks_high_bits() {
        let mut buffer = WireBuffer::new();
        buffer.write_bits(0xFF, 4);
        assert_eq!(buffer.read_bits(4).unwrap(), 0xF);
    }

    #[test]
    fn test_read_past_end_is_overrun() {
        let mut buffer = WireBuffer::new();
        buffer.write_bits(3, 2);
        let err = buffer.read_bits(3).unwrap_err();
        assert_eq!(
            err,
            WireError::BufferOverrun {
                requested: 3,
                available: 2
            }
        );
        // The failed read does not move the cursor.
        assert_eq!(buffer.read_bits(2).unwrap(), 3);
    }

    #[test]
    fn test_varint_edges() {
        let mut buffer = WireBuffer::new();
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            buffer.write_varint(value);
        }
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            assert_eq!(buffer.read_varint().unwrap(), value);
        }
    }

    #[test]
    fn test_strings_and_blocks_unaligned() {
        let mut buffer = WireBuffer::new();
        buffer.write_bool(true);
        buffer.write_string("héllo");
        buffer.write_binary(&[1, 2, 3]);
        buffer.write_raw(&[9, 8]);

        assert!(buffer.read_bool().unwrap());
        assert_eq!(buffer.read_string().unwrap(), "héllo");
        assert_eq!(buffer.read_binary().unwrap(), vec![1, 2, 3]);
        assert_eq!(buffer.read_raw(2).unwrap(), vec![9, 8]);
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut buffer = WireBuffer::new();
        buffer.write_binary(&[0xFF, 0xFE]);
        assert_eq!(buffer.read_string().unwrap_err(), WireError::InvalidUtf8);
    }

    #[test]
    fn test_oversized_length_prefix_is_overrun() {
        let mut buffer = WireBuffer::new();
        buffer.write_varint(1_000);
        buffer.write_raw(&[1, 2]);
        assert!(matches!(
            buffer.read_binary(),
            Err(WireError::BufferOverrun { .. })
        ));
    }

    #[test]
    fn test_append_keeps_bit_alignment() {
        let mut head = WireBuffer::new();
        head.write_bits(0b1, 1);

        let mut tail = WireBuffer::new();
        tail.write_bits(0b10110, 5);
        tail.write_string("ok");

        head.append(&tail);
        assert_eq!(head.read_bits(1).unwrap(), 1);
        assert_eq!(head.read_bits(5).unwrap(), 0b10110);
        assert_eq!(head.read_string().unwrap(), "ok");
    }

    #[test]
    fn test_from_bytes_reads_whole_bytes() {
        let mut buffer = WireBuffer::from_bytes(vec![0xAB, 0xCD]);
        assert_eq!(buffer.read_bits(16).unwrap(), 0xABCD);
        buffer.rewind();
        assert_eq!(buffer.read_bits(4).unwrap(), 0xA);
    }
}
