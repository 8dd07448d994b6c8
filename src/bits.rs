//! Bit level packing of variable length codes into a fixed capacity payload buffer.
//!
//! The [BitPacker] accumulates codes MSB first into 32-bit words. A code which does not fit
//! into the free space of the current word is split, with the remainder left-aligned in the
//! following word. When serialized, the words are written big-endian, so the resulting byte
//! stream is the plain concatenation of all code bits, padded with zero bits in the last byte.

const WORD_BITS: usize = u32::BITS as usize;

/// Result of adding a code to a [BitPacker].
#[must_use]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PackStatus {
    /// The code was committed to the buffer.
    Packed,
    /// The code would exceed the byte capacity. Nothing was committed, the caller should flush
    /// the buffer and retry the same code on the empty buffer.
    Full,
}

/// Packed buffer returned by [BitPacker::flush].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedBuffer {
    /// Full capacity buffer. Bytes after `len` are zero.
    pub data: Vec<u8>,
    /// Number of bytes touched by packed bits.
    pub len: usize,
}

impl FlushedBuffer {
    /// Bytes which carry packed bits.
    pub fn packed(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

#[derive(Debug, Clone)]
pub struct BitPacker {
    words: Vec<u32>,
    bits_used: usize,
    capacity: usize,
}

impl BitPacker {
    /// Create a packer which accepts at most `capacity` bytes of packed data.
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; (capacity + 3) / 4],
            bits_used: 0,
            capacity,
        }
    }

    pub fn reset(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.bits_used = 0;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn bits_used(&self) -> usize {
        self.bits_used
    }

    /// Number of bytes touched so far, including a partially filled last byte.
    #[inline]
    pub fn byte_len(&self) -> usize {
        (self.bits_used + 7) / 8
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits_used == 0
    }

    /// Add the `len` least significant bits of `value`, most significant bit first.
    ///
    /// Lengths must be in `1..=32`. The capacity check is done on the byte-rounded length
    /// after adding the code: a code ending exactly on the capacity is accepted.
    pub fn add_bits(&mut self, value: u32, len: u8) -> PackStatus {
        debug_assert!(len > 0 && len as usize <= WORD_BITS);
        let len = len as usize;
        if (self.bits_used + len + 7) / 8 > self.capacity {
            return PackStatus::Full;
        }
        let value = if len == WORD_BITS {
            value
        } else {
            value & ((1u32 << len) - 1)
        };
        let idx = self.bits_used / WORD_BITS;
        let free = WORD_BITS - (self.bits_used % WORD_BITS);
        if len < free {
            self.words[idx] |= value << (free - len);
        } else {
            let remainder = len - free;
            self.words[idx] |= ((value as u64) >> remainder) as u32;
            if remainder > 0 {
                self.words[idx + 1] |= ((value as u64) << (WORD_BITS - remainder)) as u32;
            }
        }
        self.bits_used += len;
        PackStatus::Packed
    }

    /// Add an uncompressed 16-bit value.
    pub fn add_raw16(&mut self, value: u16) -> PackStatus {
        self.add_bits(value as u32, 16)
    }

    /// Serialize the packed words and reset the packer.
    pub fn flush(&mut self) -> FlushedBuffer {
        let mut data = Vec::with_capacity(self.words.len() * 4);
        for word in &self.words {
            data.extend_from_slice(&word.to_be_bytes());
        }
        data.truncate(self.capacity);
        let len = self.byte_len();
        self.reset();
        FlushedBuffer { data, len }
    }
}

/// MSB first bit reader over a byte slice. This is the inverse of [BitPacker].
#[derive(Debug, Clone)]
pub struct BitReader<'buf> {
    buf: &'buf [u8],
    bit_pos: usize,
}

impl<'buf> BitReader<'buf> {
    pub fn new(buf: &'buf [u8]) -> Self {
        Self { buf, bit_pos: 0 }
    }

    #[inline]
    pub fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    #[inline]
    pub fn remaining_bits(&self) -> usize {
        self.buf.len() * 8 - self.bit_pos
    }

    pub fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.buf.get(self.bit_pos / 8)?;
        let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
        self.bit_pos += 1;
        Some(bit == 1)
    }

    /// Read `len` bits (at most 32) into the least significant bits of the result.
    pub fn read_bits(&mut self, len: u8) -> Option<u32> {
        if len as usize > WORD_BITS || len as usize > self.remaining_bits() {
            return None;
        }
        let mut value = 0u32;
        for _ in 0..len {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_within_one_word() {
        let mut packer = BitPacker::new(16);
        assert_eq!(packer.add_bits(0b101, 3), PackStatus::Packed);
        assert_eq!(packer.add_bits(0b1, 1), PackStatus::Packed);
        assert_eq!(packer.add_bits(0b0000_1111, 8), PackStatus::Packed);
        assert_eq!(packer.bits_used(), 12);
        let flushed = packer.flush();
        assert_eq!(flushed.len, 2);
        assert_eq!(flushed.packed(), &[0b1011_0000, 0b1111_0000]);
        assert_eq!(flushed.data.len(), 16);
        assert!(packer.is_empty());
    }

    #[test]
    fn test_code_straddles_word_boundary() {
        let mut packer = BitPacker::new(8);
        assert_eq!(packer.add_bits(0x3FFF_FFFF, 30), PackStatus::Packed);
        // 6 bits, 2 of which land in the first word
        assert_eq!(packer.add_bits(0b10_0111, 6), PackStatus::Packed);
        let flushed = packer.flush();
        assert_eq!(flushed.len, 5);
        assert_eq!(flushed.packed(), &[0xFF, 0xFF, 0xFF, 0xFE, 0x70]);
    }

    #[test]
    fn test_code_fills_word_exactly() {
        let mut packer = BitPacker::new(8);
        assert_eq!(packer.add_bits(0xABCD, 16), PackStatus::Packed);
        assert_eq!(packer.add_bits(0x1234, 16), PackStatus::Packed);
        assert_eq!(packer.add_bits(0x1, 1), PackStatus::Packed);
        let flushed = packer.flush();
        assert_eq!(flushed.packed(), &[0xAB, 0xCD, 0x12, 0x34, 0x80]);
    }

    #[test]
    fn test_full_word_code() {
        let mut packer = BitPacker::new(12);
        assert_eq!(packer.add_bits(0b1, 1), PackStatus::Packed);
        assert_eq!(packer.add_bits(0xFFFF_FFFF, 32), PackStatus::Packed);
        let flushed = packer.flush();
        assert_eq!(flushed.packed(), &[0xFF, 0xFF, 0xFF, 0xFF, 0x80]);
    }

    #[test]
    fn test_exact_capacity_is_accepted() {
        let mut packer = BitPacker::new(6);
        for value in [0x1111, 0x2222, 0x3333] {
            assert_eq!(packer.add_raw16(value), PackStatus::Packed);
        }
        assert_eq!(packer.byte_len(), 6);
        assert_eq!(packer.add_bits(0, 1), PackStatus::Full);
        // Rejected code was not committed.
        assert_eq!(packer.bits_used(), 48);
        let flushed = packer.flush();
        assert_eq!(flushed.packed(), &[0x11, 0x11, 0x22, 0x22, 0x33, 0x33]);
    }

    #[test]
    fn test_byte_rounded_overflow_check() {
        let mut packer = BitPacker::new(2);
        assert_eq!(packer.add_bits(0, 9), PackStatus::Packed);
        // 9 + 7 = 16 bits still rounds to 2 bytes
        assert_eq!(packer.add_bits(0x7F, 7), PackStatus::Packed);
        assert_eq!(packer.add_bits(0, 1), PackStatus::Full);
    }

    #[test]
    fn test_retry_after_flush() {
        let mut packer = BitPacker::new(2);
        assert_eq!(packer.add_bits(0x3FF, 10), PackStatus::Packed);
        assert_eq!(packer.add_bits(0x3FF, 10), PackStatus::Full);
        let first = packer.flush();
        assert_eq!(first.packed(), &[0xFF, 0xC0]);
        assert_eq!(packer.add_bits(0x3FF, 10), PackStatus::Packed);
        assert_eq!(packer.flush().packed(), &[0xFF, 0xC0]);
    }

    #[test]
    fn test_value_is_masked_to_length() {
        let mut packer = BitPacker::new(4);
        assert_eq!(packer.add_bits(0xFFFF_FFF0, 4), PackStatus::Packed);
        assert_eq!(packer.flush().packed(), &[0x00]);
    }

    #[test]
    fn test_reader_inverts_packer() {
        let codes: [(u32, u8); 6] = [
            (1, 1),
            (0b1101, 4),
            (0x1_2345, 17),
            (0, 3),
            (0xFFFF, 16),
            (0x2A, 7),
        ];
        let mut packer = BitPacker::new(32);
        for (value, len) in codes {
            assert_eq!(packer.add_bits(value, len), PackStatus::Packed);
        }
        let flushed = packer.flush();
        let mut reader = BitReader::new(flushed.packed());
        for (value, len) in codes {
            assert_eq!(reader.read_bits(len), Some(value));
        }
        assert!(reader.remaining_bits() < 8);
        assert_eq!(reader.read_bits(8), None);
    }
}
