//! The hybrid run-length / bit-packed codec for unsigned integers.
//!
//! A stream is a sequence of runs, each introduced by an LEB128 header:
//!
//! * `header & 1 == 0`: a repeated run of `header >> 1` copies of one value, which
//!   follows in `ceil(bit_width / 8)` little-endian bytes.
//! * `header & 1 == 1`: a literal run of `8 * (header >> 1)` values bit-packed at
//!   `bit_width` bits each, least significant bit first.
//!
//! The encoder buffers values in groups of eight. A group of eight equal values starts
//! a repeated run; anything else accumulates into a literal run of at most 63 groups,
//! whose header byte is reserved up front and filled in when the run closes.

use crate::bit_util::{self, BitReader, BitWriter, MAX_VLQ_BYTE_LEN};
use crate::bitmap;
use crate::buffer::{Buffer, PoolRef};
use crate::error::{Error, Result};

/// Values buffered before deciding between a repeated and a literal run.
const GROUP_SIZE: usize = 8;
/// A literal header is one byte, so at most 63 groups fit in one literal run.
const MAX_GROUPS_PER_LITERAL_RUN: usize = (1 << 6) - 1;
const MAX_VALUES_PER_LITERAL_RUN: usize = MAX_GROUPS_PER_LITERAL_RUN * GROUP_SIZE;

/// Encodes unsigned integers of a fixed bit width into a run stream.
#[derive(Debug)]
pub struct RleEncoder<'a> {
    bit_width: usize,
    writer: BitWriter<'a>,
    /// Set once another run might not fit in the writer's buffer.
    buffer_full: bool,
    max_run_byte_size: usize,
    buffered_values: [u64; GROUP_SIZE],
    num_buffered_values: usize,
    /// The value of the current repeated run, and its length so far.
    current_value: u64,
    repeat_count: usize,
    /// Values committed to the open literal run, and its reserved header byte.
    literal_count: usize,
    literal_indicator_byte: Option<usize>,
}

impl<'a> RleEncoder<'a> {
    /// An encoder writing into `buffer`, which must hold at least [`RleEncoder::min_buffer_size`] bytes.
    pub fn new(buffer: &'a mut [u8], bit_width: usize) -> Self {
        Self::from_writer(BitWriter::new(buffer), bit_width)
    }

    fn from_writer(writer: BitWriter<'a>, bit_width: usize) -> Self {
        debug_assert!(bit_width <= 64);
        let mut encoder = Self {
            bit_width,
            writer,
            buffer_full: false,
            max_run_byte_size: Self::min_buffer_size(bit_width),
            buffered_values: [0; GROUP_SIZE],
            num_buffered_values: 0,
            current_value: 0,
            repeat_count: 0,
            literal_count: 0,
            literal_indicator_byte: None,
        };
        encoder.check_buffer_full();
        encoder
    }

    /// Bytes that hold the largest single run at `bit_width`.
    pub fn min_buffer_size(bit_width: usize) -> usize {
        let max_literal_run_size = 1 + bit_util::ceil(MAX_VALUES_PER_LITERAL_RUN * bit_width, 8);
        let max_repeated_run_size = MAX_VLQ_BYTE_LEN + bit_util::ceil(bit_width, 8);
        std::cmp::max(max_literal_run_size, max_repeated_run_size)
    }

    /// An upper bound on the encoded size of `num_values` values at `bit_width`.
    pub fn max_buffer_size(bit_width: usize, num_values: usize) -> usize {
        let num_runs = bit_util::ceil(num_values, GROUP_SIZE);
        // Every group as its own literal run: a header byte plus `bit_width` bytes.
        let literal_max_size = num_runs + num_runs * bit_width;
        // Every group as its own repeated run: a header byte plus the value.
        let repeated_max_size = num_runs * (1 + bit_util::ceil(bit_width, 8));
        std::cmp::max(literal_max_size, repeated_max_size)
    }

    pub fn bit_width(&self) -> usize { self.bit_width }

    /// Encodes `value`, failing with `Capacity` once the buffer cannot take another run.
    pub fn put(&mut self, value: u64) -> Result<()> {
        debug_assert!(self.bit_width == 64 || value >> self.bit_width == 0);
        if self.buffer_full {
            return Err(Error::capacity("run-length encoder buffer is full"));
        }
        if self.current_value == value {
            self.repeat_count += 1;
            if self.repeat_count > GROUP_SIZE {
                // Continuation of an established repeated run; nothing to buffer.
                return Ok(());
            }
        } else {
            if self.repeat_count >= GROUP_SIZE {
                debug_assert_eq!(self.literal_count, 0);
                self.flush_repeated_run()?;
            }
            self.repeat_count = 1;
            self.current_value = value;
        }

        self.buffered_values[self.num_buffered_values] = value;
        self.num_buffered_values += 1;
        if self.num_buffered_values == GROUP_SIZE {
            debug_assert_eq!(self.literal_count % GROUP_SIZE, 0);
            self.flush_buffered_values(false)?;
        }
        Ok(())
    }

    /// Decides what to do with a full group of buffered values.
    fn flush_buffered_values(&mut self, done: bool) -> Result<()> {
        if self.repeat_count >= GROUP_SIZE {
            // The group is all one value and will be written as part of a repeated run.
            self.num_buffered_values = 0;
            if self.literal_count != 0 {
                debug_assert_eq!(self.literal_count % GROUP_SIZE, 0);
                self.flush_literal_run(true)?;
            }
            return Ok(());
        }

        self.literal_count += self.num_buffered_values;
        let num_groups = bit_util::ceil(self.literal_count, GROUP_SIZE);
        if num_groups >= MAX_GROUPS_PER_LITERAL_RUN {
            // The literal run cannot grow further; close it.
            self.flush_literal_run(true)?;
        } else {
            self.flush_literal_run(done)?;
        }
        self.repeat_count = 0;
        Ok(())
    }

    fn flush_literal_run(&mut self, update_indicator_byte: bool) -> Result<()> {
        let position = match self.literal_indicator_byte {
            Some(position) => position,
            None => {
                let position = self.writer.skip_bytes(1)?;
                self.literal_indicator_byte = Some(position);
                position
            }
        };
        for index in 0 .. self.num_buffered_values {
            self.writer.put_value(self.buffered_values[index], self.bit_width)?;
        }
        self.num_buffered_values = 0;

        if update_indicator_byte {
            let num_groups = bit_util::ceil(self.literal_count, GROUP_SIZE);
            self.writer.write_byte_at(position, ((num_groups << 1) | 1) as u8);
            tracing::trace!(groups = num_groups, bit_width = self.bit_width, "flushed literal run");
            self.literal_indicator_byte = None;
            self.literal_count = 0;
            self.check_buffer_full();
        }
        Ok(())
    }

    fn flush_repeated_run(&mut self) -> Result<()> {
        debug_assert!(self.repeat_count > 0);
        self.writer.put_vlq((self.repeat_count as u64) << 1)?;
        self.writer.put_aligned(self.current_value, bit_util::ceil(self.bit_width, 8))?;
        tracing::trace!(count = self.repeat_count, bit_width = self.bit_width, "flushed repeated run");
        self.num_buffered_values = 0;
        self.repeat_count = 0;
        self.check_buffer_full();
        Ok(())
    }

    fn check_buffer_full(&mut self) {
        let needed = self.writer.bytes_written().saturating_add(self.max_run_byte_size);
        if needed > self.writer.capacity() {
            self.buffer_full = true;
        }
    }

    /// Closes any open run and returns the total bytes written.
    pub fn flush(&mut self) -> Result<usize> {
        if self.literal_count > 0 || self.repeat_count > 0 || self.num_buffered_values > 0 {
            let all_repeat = self.literal_count == 0
                && (self.repeat_count == self.num_buffered_values || self.num_buffered_values == 0);
            if self.repeat_count > 0 && all_repeat {
                self.flush_repeated_run()?;
            } else {
                // Pad the last group of literals to a full group with zeros.
                while self.num_buffered_values != 0 && self.num_buffered_values < GROUP_SIZE {
                    self.buffered_values[self.num_buffered_values] = 0;
                    self.num_buffered_values += 1;
                }
                self.literal_count += self.num_buffered_values;
                self.flush_literal_run(true)?;
                self.repeat_count = 0;
            }
        }
        self.writer.flush();
        Ok(self.writer.bytes_written())
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize { self.writer.bytes_written() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// The encoded bytes; meaningful after [`RleEncoder::flush`].
    pub fn buffer(&self) -> &[u8] { self.writer.buffer() }

    /// Flushes and returns the encoded bytes, copied into `pool` if the writer borrowed its buffer.
    pub fn consume(mut self, pool: &PoolRef) -> Result<Buffer> {
        self.flush()?;
        self.writer.consume(pool)
    }

    /// Resets to encode a fresh stream into the same buffer.
    pub fn clear(&mut self) {
        self.buffer_full = false;
        self.current_value = 0;
        self.repeat_count = 0;
        self.num_buffered_values = 0;
        self.literal_count = 0;
        self.literal_indicator_byte = None;
        self.writer.clear();
        self.check_buffer_full();
    }
}

impl RleEncoder<'static> {
    /// An encoder into a growable buffer charged to `pool`, which never reports itself full.
    pub fn with_capacity(bit_width: usize, capacity: usize, pool: &PoolRef) -> Result<Self> {
        Ok(Self::from_writer(BitWriter::with_capacity(capacity, pool)?, bit_width))
    }
}

/// Decodes a run stream, resuming where the previous call stopped.
#[derive(Clone, Debug)]
pub struct RleDecoder<B> {
    reader: BitReader<B>,
    bit_width: usize,
    current_value: u64,
    repeat_count: usize,
    literal_count: usize,
}

impl<B: AsRef<[u8]>> RleDecoder<B> {
    pub fn new(buffer: B, bit_width: usize) -> Self {
        debug_assert!(bit_width <= 64);
        Self { reader: BitReader::new(buffer), bit_width, current_value: 0, repeat_count: 0, literal_count: 0 }
    }

    pub fn reset(&mut self, buffer: B, bit_width: usize) {
        self.reader.reset(buffer);
        self.bit_width = bit_width;
        self.current_value = 0;
        self.repeat_count = 0;
        self.literal_count = 0;
    }

    /// Reads the next run header; `false` at the end of the stream.
    fn next_counts(&mut self) -> Result<bool> {
        if self.reader.bytes_left() == 0 {
            return Ok(false);
        }
        let header = self.reader.get_vlq()?;
        let count = (header >> 1) as usize;
        if count == 0 {
            return Err(Error::invalid("run header with zero length"));
        }
        if header & 1 == 1 {
            self.literal_count = count * GROUP_SIZE;
        } else {
            self.repeat_count = count;
            self.current_value = self.reader.get_aligned(bit_util::ceil(self.bit_width, 8))?;
        }
        Ok(true)
    }

    /// Decodes one value, failing with `Eof` at the end of the stream.
    pub fn get(&mut self) -> Result<u64> {
        let mut value = [0u64];
        if self.get_batch(&mut value)? == 0 {
            return Err(Error::eof("run-length stream exhausted"));
        }
        Ok(value[0])
    }

    /// Decodes up to `out.len()` values, returning how many were produced.
    ///
    /// Fewer values are returned only when the stream ends. A zero bit width yields
    /// zeros without consuming input.
    pub fn get_batch(&mut self, out: &mut [u64]) -> Result<usize> {
        if self.bit_width == 0 {
            out.fill(0);
            return Ok(out.len());
        }
        let mut produced = 0;
        while produced < out.len() {
            if self.repeat_count > 0 {
                let count = std::cmp::min(self.repeat_count, out.len() - produced);
                out[produced .. produced + count].fill(self.current_value);
                self.repeat_count -= count;
                produced += count;
            } else if self.literal_count > 0 {
                let count = std::cmp::min(self.literal_count, out.len() - produced);
                self.reader.get_batch(self.bit_width, &mut out[produced .. produced + count])?;
                self.literal_count -= count;
                produced += count;
            } else if !self.next_counts()? {
                break;
            }
        }
        Ok(produced)
    }

    /// Decodes indices and translates each through `dictionary`.
    ///
    /// An index outside the dictionary is `Invalid`.
    pub fn get_batch_with_dict<T: Clone>(&mut self, dictionary: &[T], out: &mut [T]) -> Result<usize> {
        let mut indices = [0u64; 256];
        let mut produced = 0;
        while produced < out.len() {
            let wanted = std::cmp::min(indices.len(), out.len() - produced);
            let count = self.get_batch(&mut indices[.. wanted])?;
            if count == 0 {
                break;
            }
            for (slot, index) in out[produced .. produced + count].iter_mut().zip(&indices[.. count]) {
                let value = usize::try_from(*index).ok().and_then(|index| dictionary.get(index));
                match value {
                    Some(value) => *slot = value.clone(),
                    None => return Err(Error::invalid(format!(
                        "dictionary index {} out of range for {} values", index, dictionary.len()
                    ))),
                }
            }
            produced += count;
        }
        Ok(produced)
    }

    /// Fills the valid positions of `out` from the stream, leaving null positions untouched.
    ///
    /// `validity` is read from bit `offset`; `null_count` nulls are expected among `out.len()` slots.
    pub fn get_batch_with_dict_spaced<T: Clone>(
        &mut self,
        dictionary: &[T],
        out: &mut [T],
        null_count: usize,
        validity: &[u8],
        offset: usize,
    ) -> Result<usize> {
        let wanted = bitmap::valid_count(out.len(), null_count)?;
        let mut dense = Vec::with_capacity(wanted);
        if let Some(first) = dictionary.first() {
            dense.resize(wanted, first.clone());
        } else if wanted > 0 {
            return Err(Error::invalid("decoding values from an empty dictionary"));
        }
        let decoded = self.get_batch_with_dict(dictionary, &mut dense)?;
        let mut values = dense.into_iter().take(decoded);
        let mut produced = 0;
        for (index, slot) in out.iter_mut().enumerate() {
            if bitmap::get_bit(validity, offset + index) {
                match values.next() {
                    Some(value) => *slot = value,
                    None => break,
                }
            }
            produced += 1;
        }
        Ok(produced)
    }
}
