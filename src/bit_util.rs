//! Unaligned bit-level reading and writing, and LEB128 / zig-zag integers.
//!
//! Values are packed least significant bit first, and multi-byte values are little
//! endian. The writer buffers up to 64 bits before committing them to its sink.

use crate::buffer::{Buffer, MutableBuffer, PoolRef};
use crate::error::{Error, Result};

/// The most bytes a 64-bit LEB128 integer occupies.
pub const MAX_VLQ_BYTE_LEN: usize = 10;

/// `ceil(value / divisor)`.
#[inline(always)]
pub fn ceil(value: usize, divisor: usize) -> usize { (value + divisor - 1) / divisor }

/// Bits required to represent `value`, with zero needing zero bits.
#[inline(always)]
pub fn num_required_bits(value: u64) -> usize { (64 - value.leading_zeros()) as usize }

/// `ceil(log2(value))`, with `log2(0) = log2(1) = 0`.
#[inline(always)]
pub fn log2(value: u64) -> usize {
    if value <= 1 { 0 } else { num_required_bits(value - 1) }
}

#[inline(always)]
pub fn zigzag_encode(value: i64) -> u64 { ((value << 1) ^ (value >> 63)) as u64 }

#[inline(always)]
pub fn zigzag_decode(value: u64) -> i64 { ((value >> 1) as i64) ^ -((value & 1) as i64) }

#[inline(always)]
fn mask(num_bits: usize) -> u64 {
    if num_bits >= 64 { u64::MAX } else { (1u64 << num_bits) - 1 }
}

/// Where a [`BitWriter`] puts its bytes.
#[derive(Debug)]
enum Sink<'a> {
    /// A caller-provided region that is never reallocated.
    Borrowed(&'a mut [u8]),
    /// An owned, pool accounted buffer that grows on demand.
    Owned(MutableBuffer),
}

/// Writes values of arbitrary bit width into a byte sink.
#[derive(Debug)]
pub struct BitWriter<'a> {
    sink: Sink<'a>,
    /// Bits not yet committed to the sink.
    buffered_values: u64,
    byte_offset: usize,
    bit_offset: usize,
}

impl<'a> BitWriter<'a> {
    /// A writer into `buffer`; writes past its end fail with `Capacity`.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { sink: Sink::Borrowed(buffer), buffered_values: 0, byte_offset: 0, bit_offset: 0 }
    }

    /// Bytes the sink can hold, unbounded for owned sinks.
    pub fn capacity(&self) -> usize {
        match &self.sink {
            Sink::Borrowed(buffer) => buffer.len(),
            Sink::Owned(_) => usize::MAX,
        }
    }

    /// Bytes written, counting a partially filled trailing byte.
    #[inline]
    pub fn bytes_written(&self) -> usize { self.byte_offset + ceil(self.bit_offset, 8) }

    /// Ensures the sink can take `bits` more bits, growing an owned sink to fit them.
    fn check_room(&mut self, bits: usize) -> Result<()> {
        let total = self.byte_offset * 8 + self.bit_offset + bits;
        match &mut self.sink {
            Sink::Borrowed(buffer) if total > buffer.len() * 8 => Err(Error::capacity(format!(
                "bit writer of {} bytes cannot fit {} more bits at byte {}", buffer.len(), bits, self.byte_offset
            ))),
            Sink::Borrowed(_) => Ok(()),
            Sink::Owned(buffer) if buffer.len() < ceil(total, 8) => buffer.resize(ceil(total, 8)),
            Sink::Owned(_) => Ok(()),
        }
    }

    /// Copies `bytes` to `at`, which `check_room` has made room for.
    fn write_bytes(&mut self, at: usize, bytes: &[u8]) {
        let sink = match &mut self.sink {
            Sink::Borrowed(buffer) => &mut buffer[..],
            Sink::Owned(buffer) => buffer.as_mut_slice(),
        };
        sink[at .. at + bytes.len()].copy_from_slice(bytes);
    }

    /// Appends the low `num_bits` bits of `value`.
    pub fn put_value(&mut self, value: u64, num_bits: usize) -> Result<()> {
        debug_assert!(num_bits <= 64);
        if num_bits == 0 {
            return Ok(());
        }
        self.check_room(num_bits)?;
        let value = value & mask(num_bits);
        self.buffered_values |= value << self.bit_offset;
        self.bit_offset += num_bits;
        if self.bit_offset >= 64 {
            let word = self.buffered_values.to_le_bytes();
            self.write_bytes(self.byte_offset, &word);
            self.byte_offset += 8;
            self.bit_offset -= 64;
            // The bits of `value` that did not fit in the committed word.
            self.buffered_values = if self.bit_offset == 0 { 0 } else { value >> (num_bits - self.bit_offset) };
        }
        Ok(())
    }

    /// Commits buffered bits and moves to the next byte boundary.
    pub fn flush(&mut self) {
        let num_bytes = ceil(self.bit_offset, 8);
        if num_bytes > 0 {
            let word = self.buffered_values.to_le_bytes();
            self.write_bytes(self.byte_offset, &word[.. num_bytes]);
        }
        self.byte_offset += num_bytes;
        self.bit_offset = 0;
        self.buffered_values = 0;
    }

    /// Reserves `num_bytes` at the next byte boundary, returning their position.
    pub fn skip_bytes(&mut self, num_bytes: usize) -> Result<usize> {
        self.flush();
        self.check_room(num_bytes * 8)?;
        let position = self.byte_offset;
        self.write_bytes(position, &vec![0; num_bytes]);
        self.byte_offset += num_bytes;
        Ok(position)
    }

    /// Overwrites a byte already reserved with [`BitWriter::skip_bytes`].
    pub fn write_byte_at(&mut self, position: usize, byte: u8) {
        debug_assert!(position < self.byte_offset);
        self.write_bytes(position, &[byte]);
    }

    /// Writes the low `num_bytes` bytes of `value` at the next byte boundary.
    pub fn put_aligned(&mut self, value: u64, num_bytes: usize) -> Result<()> {
        debug_assert!(num_bytes <= 8);
        self.flush();
        self.check_room(num_bytes * 8)?;
        let bytes = value.to_le_bytes();
        self.write_bytes(self.byte_offset, &bytes[.. num_bytes]);
        self.byte_offset += num_bytes;
        Ok(())
    }

    /// Writes `value` as an unsigned LEB128 integer.
    pub fn put_vlq(&mut self, mut value: u64) -> Result<()> {
        while value >= 0x80 {
            self.put_aligned((value & 0x7F) | 0x80, 1)?;
            value >>= 7;
        }
        self.put_aligned(value, 1)
    }

    /// Writes `value` as a zig-zag LEB128 integer.
    pub fn put_zigzag_vlq(&mut self, value: i64) -> Result<()> {
        self.put_vlq(zigzag_encode(value))
    }

    /// The bytes written so far; call [`BitWriter::flush`] first to include buffered bits.
    pub fn buffer(&self) -> &[u8] {
        match &self.sink {
            Sink::Borrowed(buffer) => &buffer[.. self.byte_offset],
            Sink::Owned(buffer) => &buffer.as_slice()[.. self.byte_offset],
        }
    }

    /// Flushes and returns the written bytes.
    ///
    /// An owned sink is frozen in place; a borrowed one is copied into `pool`.
    pub fn consume(mut self, pool: &PoolRef) -> Result<Buffer> {
        self.flush();
        let len = self.byte_offset;
        match self.sink {
            Sink::Borrowed(buffer) => Buffer::from_bytes(&buffer[.. len], pool),
            Sink::Owned(mut buffer) => {
                buffer.truncate(len);
                Ok(buffer.freeze())
            }
        }
    }

    /// Discards everything written, keeping the sink.
    pub fn clear(&mut self) {
        if let Sink::Owned(buffer) = &mut self.sink {
            buffer.clear();
        }
        self.buffered_values = 0;
        self.byte_offset = 0;
        self.bit_offset = 0;
    }
}

impl BitWriter<'static> {
    /// A writer into an empty buffer charged to `pool`, growing as needed.
    pub fn owned(pool: &PoolRef) -> Self {
        Self { sink: Sink::Owned(MutableBuffer::new(pool)), buffered_values: 0, byte_offset: 0, bit_offset: 0 }
    }

    /// An owned writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize, pool: &PoolRef) -> Result<Self> {
        let buffer = MutableBuffer::with_capacity(capacity, pool)?;
        Ok(Self { sink: Sink::Owned(buffer), buffered_values: 0, byte_offset: 0, bit_offset: 0 })
    }
}

/// Reads values of arbitrary bit width from a byte container.
#[derive(Clone, Debug)]
pub struct BitReader<B> {
    buffer: B,
    byte_offset: usize,
    bit_offset: usize,
}

impl<B: AsRef<[u8]>> BitReader<B> {
    pub fn new(buffer: B) -> Self {
        Self { buffer, byte_offset: 0, bit_offset: 0 }
    }

    pub fn reset(&mut self, buffer: B) {
        self.buffer = buffer;
        self.byte_offset = 0;
        self.bit_offset = 0;
    }

    #[inline]
    fn total_bits(&self) -> usize { self.buffer.as_ref().len() * 8 }

    /// The byte position, rounded up to include a partially read byte.
    pub fn position(&self) -> usize { self.byte_offset + ceil(self.bit_offset, 8) }

    pub fn bytes_left(&self) -> usize { self.buffer.as_ref().len().saturating_sub(self.position()) }

    /// Reads a `num_bits`-wide unsigned value.
    pub fn get_value(&mut self, num_bits: usize) -> Result<u64> {
        debug_assert!(num_bits <= 64);
        if num_bits == 0 {
            return Ok(0);
        }
        let start = self.byte_offset * 8 + self.bit_offset;
        if start + num_bits > self.total_bits() {
            return Err(Error::eof(format!("{} bits requested with {} remaining", num_bits, self.total_bits() - start)));
        }
        // At most 9 bytes cover `bit_offset + num_bits <= 71` bits.
        let bytes = self.buffer.as_ref();
        let end = std::cmp::min(bytes.len(), self.byte_offset + 16);
        let mut window = [0u8; 16];
        window[.. end - self.byte_offset].copy_from_slice(&bytes[self.byte_offset .. end]);
        let value = (u128::from_le_bytes(window) >> self.bit_offset) as u64 & mask(num_bits);

        let consumed = self.bit_offset + num_bits;
        self.byte_offset += consumed / 8;
        self.bit_offset = consumed % 8;
        Ok(value)
    }

    /// Reads `out.len()` values of `num_bits` each.
    pub fn get_batch(&mut self, num_bits: usize, out: &mut [u64]) -> Result<()> {
        for slot in out.iter_mut() {
            *slot = self.get_value(num_bits)?;
        }
        Ok(())
    }

    /// Reads a `num_bytes` little-endian value from the next byte boundary.
    pub fn get_aligned(&mut self, num_bytes: usize) -> Result<u64> {
        debug_assert!(num_bytes <= 8);
        self.byte_offset = self.position();
        self.bit_offset = 0;
        let bytes = self.buffer.as_ref();
        if self.byte_offset + num_bytes > bytes.len() {
            return Err(Error::eof(format!("{} aligned bytes requested with {} remaining", num_bytes, bytes.len().saturating_sub(self.byte_offset))));
        }
        let mut word = [0u8; 8];
        word[.. num_bytes].copy_from_slice(&bytes[self.byte_offset .. self.byte_offset + num_bytes]);
        self.byte_offset += num_bytes;
        Ok(u64::from_le_bytes(word))
    }

    /// Reads an unsigned LEB128 integer.
    pub fn get_vlq(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for index in 0 .. MAX_VLQ_BYTE_LEN {
            let byte = self.get_aligned(1)?;
            value |= (byte & 0x7F) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::invalid("variable-length integer longer than 10 bytes"))
    }

    pub fn get_zigzag_vlq(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.get_vlq()?))
    }

    /// Moves to the byte boundary `position`.
    pub fn seek(&mut self, position: usize) {
        self.byte_offset = position;
        self.bit_offset = 0;
    }
}
