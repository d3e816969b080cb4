//! Delta encodings: bit-packed integer deltas, and the byte array layouts built on them.
//!
//! A delta-bit-packed page starts with one header
//!
//! ```text
//! block_size: vlq | num_mini_blocks: vlq | values_in_page: vlq | first_value: zigzag vlq
//! ```
//!
//! and continues with blocks of `block_size` deltas. Each block holds its minimum
//! delta as a zig-zag vlq, one bit-width byte per mini-block, and then its mini-blocks,
//! each `block_size / num_mini_blocks` deltas less the minimum, packed LSB-first.
//! Mini-blocks past the last delta are not written; the last one written is padded
//! with zeros. A decoder that exhausts a page reads the next header, so pages may be
//! concatenated.

use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::bit_util::{self, BitReader, BitWriter, MAX_VLQ_BYTE_LEN};
use crate::buffer::{Buffer, MutableBuffer, PoolRef};
use crate::error::{Error, Result};

use super::types::{take_bytes, ByteArray, ByteArrayType, DeltaType, Decoder, Encoder, Int32Type};

pub const DEFAULT_BLOCK_SIZE: usize = 128;
pub const DEFAULT_MINI_BLOCKS: usize = 4;

/// Checks a block geometry, returning the values per mini-block.
fn mini_block_size(block_size: usize, num_mini_blocks: usize) -> Result<usize> {
    if num_mini_blocks == 0 || block_size == 0 || block_size % num_mini_blocks != 0 {
        return Err(Error::invalid(format!("block size {} does not split into {} mini-blocks", block_size, num_mini_blocks)));
    }
    let values = block_size / num_mini_blocks;
    if values % 8 != 0 {
        return Err(Error::invalid(format!("{} values per mini-block is not a multiple of 8", values)));
    }
    Ok(values)
}

fn length_prefix(len: usize) -> Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| Error::capacity(format!("stream of {} bytes exceeds the length prefix", len)))
}

/// Reads a `u32` little-endian stream length and returns the stream it delimits.
fn prefixed_stream(data: &ByteArray, position: &mut usize) -> Result<ByteArray> {
    let prefix = take_bytes(data, position, 4)?;
    let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let start = *position;
    take_bytes(data, position, len)?;
    Ok(data.slice(start, len))
}

pub struct DeltaBitPackEncoder<P: DeltaType> {
    block_size: usize,
    num_mini_blocks: usize,
    values_per_mini_block: usize,
    first_value: i64,
    previous: i64,
    total_values: usize,
    /// Deltas of the block being filled.
    deltas: Vec<i64>,
    /// Completed blocks of the current page.
    blocks: BitWriter<'static>,
    pool: PoolRef,
    _marker: PhantomData<P>,
}

impl<P: DeltaType> DeltaBitPackEncoder<P> {
    /// An encoder with blocks of 128 deltas in 4 mini-blocks.
    pub fn new(pool: &PoolRef) -> Self {
        Self::from_geometry(DEFAULT_BLOCK_SIZE, DEFAULT_MINI_BLOCKS, DEFAULT_BLOCK_SIZE / DEFAULT_MINI_BLOCKS, pool)
    }

    /// An encoder with blocks of `block_size` deltas in `num_mini_blocks` mini-blocks.
    ///
    /// Each mini-block must hold a positive multiple of 8 deltas.
    pub fn with_block_size(block_size: usize, num_mini_blocks: usize, pool: &PoolRef) -> Result<Self> {
        let values_per_mini_block = mini_block_size(block_size, num_mini_blocks)?;
        Ok(Self::from_geometry(block_size, num_mini_blocks, values_per_mini_block, pool))
    }

    fn from_geometry(block_size: usize, num_mini_blocks: usize, values_per_mini_block: usize, pool: &PoolRef) -> Self {
        Self {
            block_size,
            num_mini_blocks,
            values_per_mini_block,
            first_value: 0,
            previous: 0,
            total_values: 0,
            deltas: Vec::with_capacity(block_size),
            blocks: BitWriter::owned(pool),
            pool: pool.clone(),
            _marker: PhantomData,
        }
    }

    fn flush_block(&mut self) -> Result<()> {
        let Some(&min_delta) = self.deltas.iter().min() else {
            return Ok(());
        };
        self.blocks.put_zigzag_vlq(min_delta)?;
        let widths = self.blocks.skip_bytes(self.num_mini_blocks)?;
        for (mini_block, deltas) in self.deltas.chunks(self.values_per_mini_block).enumerate() {
            let max = deltas.iter().map(|delta| delta.wrapping_sub(min_delta) as u64).max().unwrap_or(0);
            let width = bit_util::num_required_bits(max);
            self.blocks.write_byte_at(widths + mini_block, width as u8);
            for index in 0 .. self.values_per_mini_block {
                let raw = deltas.get(index).map_or(0, |delta| delta.wrapping_sub(min_delta) as u64);
                self.blocks.put_value(raw, width)?;
            }
        }
        self.blocks.flush();
        self.deltas.clear();
        Ok(())
    }
}

impl<P: DeltaType> Encoder<P> for DeltaBitPackEncoder<P> {
    fn put(&mut self, values: &[P::T]) -> Result<()> {
        for value in values {
            let value = P::to_i64(value);
            if self.total_values == 0 {
                self.first_value = value;
            } else {
                self.deltas.push(value.wrapping_sub(self.previous));
                if self.deltas.len() == self.block_size {
                    self.flush_block()?;
                }
            }
            self.previous = value;
            self.total_values += 1;
        }
        Ok(())
    }

    fn estimated_data_encoded_size(&self) -> usize {
        let header = 4 * MAX_VLQ_BYTE_LEN;
        let pending = MAX_VLQ_BYTE_LEN + self.num_mini_blocks + self.block_size * 8;
        header + self.blocks.bytes_written() + pending
    }

    fn flush_buffer(&mut self) -> Result<Buffer> {
        self.flush_block()?;
        let mut header_bytes = [0u8; 4 * MAX_VLQ_BYTE_LEN];
        let mut header = BitWriter::new(&mut header_bytes);
        header.put_vlq(self.block_size as u64)?;
        header.put_vlq(self.num_mini_blocks as u64)?;
        header.put_vlq(self.total_values as u64)?;
        header.put_zigzag_vlq(self.first_value)?;
        let blocks = std::mem::replace(&mut self.blocks, BitWriter::owned(&self.pool)).consume(&self.pool)?;
        let mut page = MutableBuffer::with_capacity(header.bytes_written() + blocks.len(), &self.pool)?;
        page.extend_from_slice(header.buffer())?;
        page.extend_from_slice(blocks.as_slice())?;
        self.first_value = 0;
        self.previous = 0;
        self.total_values = 0;
        Ok(page.freeze())
    }
}

pub struct DeltaBitPackDecoder<P: DeltaType> {
    reader: BitReader<ByteArray>,
    num_values: usize,
    /// Values of the current page not yet produced.
    page_values_left: usize,
    num_mini_blocks: usize,
    values_per_mini_block: usize,
    min_delta: i64,
    bit_widths: SmallVec<[u8; DEFAULT_MINI_BLOCKS]>,
    /// The next mini-block of the current block; `num_mini_blocks` once the block is spent.
    next_mini_block: usize,
    /// Unpacked deltas of the current mini-block, less `min_delta`.
    mini_block: Vec<u64>,
    mini_block_position: usize,
    previous: i64,
    _marker: PhantomData<P>,
}

impl<P: DeltaType> Default for DeltaBitPackDecoder<P> {
    fn default() -> Self { Self::new() }
}

impl<P: DeltaType> DeltaBitPackDecoder<P> {
    pub fn new() -> Self {
        Self {
            reader: BitReader::new(ByteArray::default()),
            num_values: 0,
            page_values_left: 0,
            num_mini_blocks: 0,
            values_per_mini_block: 0,
            min_delta: 0,
            bit_widths: SmallVec::new(),
            next_mini_block: 0,
            mini_block: Vec::new(),
            mini_block_position: 0,
            previous: 0,
            _marker: PhantomData,
        }
    }

    /// Bytes consumed from the data passed to `set_data`.
    pub fn get_offset(&self) -> usize { self.reader.position() }

    /// Reads a page header, returning the page's first value.
    fn read_page_header(&mut self) -> Result<i64> {
        let block_size = self.reader.get_vlq()? as usize;
        let num_mini_blocks = self.reader.get_vlq()? as usize;
        let values = self.reader.get_vlq()? as usize;
        let first_value = self.reader.get_zigzag_vlq()?;
        self.values_per_mini_block = mini_block_size(block_size, num_mini_blocks)?;
        if values == 0 {
            return Err(Error::invalid("delta page header declares no values"));
        }
        tracing::trace!(block_size, num_mini_blocks, values, "read delta page header");
        self.num_mini_blocks = num_mini_blocks;
        self.page_values_left = values;
        self.next_mini_block = num_mini_blocks;
        self.mini_block.clear();
        self.mini_block_position = 0;
        Ok(first_value)
    }

    fn next_delta(&mut self) -> Result<u64> {
        if self.mini_block_position == self.mini_block.len() {
            if self.next_mini_block == self.num_mini_blocks {
                self.min_delta = self.reader.get_zigzag_vlq()?;
                self.bit_widths.clear();
                for _ in 0 .. self.num_mini_blocks {
                    let width = self.reader.get_aligned(1)? as u8;
                    if width > 64 {
                        return Err(Error::invalid(format!("mini-block bit width {} exceeds 64", width)));
                    }
                    self.bit_widths.push(width);
                }
                self.next_mini_block = 0;
            }
            let width = self.bit_widths[self.next_mini_block] as usize;
            self.mini_block.resize(self.values_per_mini_block, 0);
            self.reader.get_batch(width, &mut self.mini_block)?;
            self.next_mini_block += 1;
            self.mini_block_position = 0;
        }
        let delta = self.mini_block[self.mini_block_position];
        self.mini_block_position += 1;
        Ok(delta)
    }
}

impl<P: DeltaType> Decoder<P> for DeltaBitPackDecoder<P> {
    fn set_data(&mut self, num_values: usize, data: ByteArray) -> Result<()> {
        self.reader.reset(data);
        self.num_values = num_values;
        self.page_values_left = 0;
        self.mini_block.clear();
        self.mini_block_position = 0;
        Ok(())
    }

    fn values_left(&self) -> usize { self.num_values }

    fn decode(&mut self, out: &mut [P::T]) -> Result<usize> {
        let count = std::cmp::min(out.len(), self.num_values);
        for slot in out[.. count].iter_mut() {
            let value = if self.page_values_left == 0 {
                self.read_page_header()?
            } else {
                let delta = self.next_delta()?;
                self.previous.wrapping_add(self.min_delta.wrapping_add(delta as i64))
            };
            self.previous = value;
            self.page_values_left -= 1;
            self.num_values -= 1;
            *slot = P::from_i64(value);
        }
        Ok(count)
    }
}

/// Byte arrays as a delta-packed stream of lengths followed by the concatenated bytes.
pub struct DeltaLengthByteArrayEncoder {
    lengths: DeltaBitPackEncoder<Int32Type>,
    data: Vec<u8>,
    pool: PoolRef,
}

impl DeltaLengthByteArrayEncoder {
    pub fn new(pool: &PoolRef) -> Self {
        Self { lengths: DeltaBitPackEncoder::new(pool), data: Vec::new(), pool: pool.clone() }
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = i32::try_from(bytes.len())
            .map_err(|_| Error::capacity(format!("byte array of {} bytes exceeds the length limit", bytes.len())))?;
        self.lengths.put(&[len])?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }
}

impl Encoder<ByteArrayType> for DeltaLengthByteArrayEncoder {
    fn put(&mut self, values: &[ByteArray]) -> Result<()> {
        values.iter().try_for_each(|value| self.put_bytes(value.data()))
    }
    fn estimated_data_encoded_size(&self) -> usize {
        4 + self.lengths.estimated_data_encoded_size() + self.data.len()
    }
    fn flush_buffer(&mut self) -> Result<Buffer> {
        let lengths = self.lengths.flush_buffer()?;
        let mut page = Vec::with_capacity(4 + lengths.len() + self.data.len());
        page.extend_from_slice(&length_prefix(lengths.len())?);
        page.extend_from_slice(lengths.as_slice());
        page.append(&mut self.data);
        Buffer::from_bytes(&page, &self.pool)
    }
}

/// Decodes byte arrays as views of the page.
#[derive(Default)]
pub struct DeltaLengthByteArrayDecoder {
    lengths: Vec<i32>,
    next: usize,
    data: ByteArray,
    position: usize,
    num_values: usize,
}

impl DeltaLengthByteArrayDecoder {
    pub fn new() -> Self { Self::default() }
}

/// Decodes the `num_values` integers of a delta-packed stream.
fn decode_lengths(num_values: usize, stream: ByteArray) -> Result<Vec<i32>> {
    let mut decoder = DeltaBitPackDecoder::<Int32Type>::new();
    decoder.set_data(num_values, stream)?;
    let mut lengths = vec![0; num_values];
    decoder.decode(&mut lengths)?;
    Ok(lengths)
}

impl Decoder<ByteArrayType> for DeltaLengthByteArrayDecoder {
    fn set_data(&mut self, num_values: usize, data: ByteArray) -> Result<()> {
        let mut position = 0;
        let stream = prefixed_stream(&data, &mut position)?;
        self.lengths = decode_lengths(num_values, stream)?;
        self.next = 0;
        self.data = data;
        self.position = position;
        self.num_values = num_values;
        Ok(())
    }

    fn values_left(&self) -> usize { self.num_values }

    fn decode(&mut self, out: &mut [ByteArray]) -> Result<usize> {
        let count = std::cmp::min(out.len(), self.num_values);
        for slot in out[.. count].iter_mut() {
            let len = usize::try_from(self.lengths[self.next])
                .map_err(|_| Error::invalid(format!("negative byte array length {}", self.lengths[self.next])))?;
            let start = self.position;
            take_bytes(&self.data, &mut self.position, len)?;
            *slot = self.data.slice(start, len);
            self.next += 1;
            self.num_values -= 1;
        }
        Ok(count)
    }
}

/// Byte arrays as the length of the prefix shared with the previous value, plus a suffix.
pub struct DeltaByteArrayEncoder {
    prefix_lengths: DeltaBitPackEncoder<Int32Type>,
    suffixes: DeltaLengthByteArrayEncoder,
    previous: Vec<u8>,
    pool: PoolRef,
}

impl DeltaByteArrayEncoder {
    pub fn new(pool: &PoolRef) -> Self {
        Self {
            prefix_lengths: DeltaBitPackEncoder::new(pool),
            suffixes: DeltaLengthByteArrayEncoder::new(pool),
            previous: Vec::new(),
            pool: pool.clone(),
        }
    }
}

impl Encoder<ByteArrayType> for DeltaByteArrayEncoder {
    fn put(&mut self, values: &[ByteArray]) -> Result<()> {
        for value in values {
            let bytes = value.data();
            let prefix = self.previous.iter().zip(bytes).take_while(|(a, b)| a == b).count();
            self.suffixes.put_bytes(&bytes[prefix ..])?;
            // The prefix is no longer than the suffix's value, whose length fit in an `i32`.
            self.prefix_lengths.put(&[prefix as i32])?;
            self.previous.clear();
            self.previous.extend_from_slice(bytes);
        }
        Ok(())
    }
    fn estimated_data_encoded_size(&self) -> usize {
        4 + self.prefix_lengths.estimated_data_encoded_size() + self.suffixes.estimated_data_encoded_size()
    }
    fn flush_buffer(&mut self) -> Result<Buffer> {
        let prefixes = self.prefix_lengths.flush_buffer()?;
        let suffixes = self.suffixes.flush_buffer()?;
        let mut page = Vec::with_capacity(4 + prefixes.len() + suffixes.len());
        page.extend_from_slice(&length_prefix(prefixes.len())?);
        page.extend_from_slice(prefixes.as_slice());
        page.extend_from_slice(suffixes.as_slice());
        self.previous.clear();
        Buffer::from_bytes(&page, &self.pool)
    }
}

/// Decodes prefix-compressed byte arrays into buffers owned by the decoded values.
pub struct DeltaByteArrayDecoder {
    prefix_lengths: Vec<i32>,
    next: usize,
    suffixes: DeltaLengthByteArrayDecoder,
    previous: Vec<u8>,
    num_values: usize,
    pool: PoolRef,
}

impl DeltaByteArrayDecoder {
    pub fn new(pool: &PoolRef) -> Self {
        Self {
            prefix_lengths: Vec::new(),
            next: 0,
            suffixes: DeltaLengthByteArrayDecoder::new(),
            previous: Vec::new(),
            num_values: 0,
            pool: pool.clone(),
        }
    }
}

impl Decoder<ByteArrayType> for DeltaByteArrayDecoder {
    fn set_data(&mut self, num_values: usize, data: ByteArray) -> Result<()> {
        let mut position = 0;
        let stream = prefixed_stream(&data, &mut position)?;
        self.prefix_lengths = decode_lengths(num_values, stream)?;
        self.suffixes.set_data(num_values, data.slice(position, data.len() - position))?;
        self.next = 0;
        self.previous.clear();
        self.num_values = num_values;
        Ok(())
    }

    fn values_left(&self) -> usize { self.num_values }

    fn decode(&mut self, out: &mut [ByteArray]) -> Result<usize> {
        let count = std::cmp::min(out.len(), self.num_values);
        // Values decoded by this call share one allocation.
        let mut arena = Vec::new();
        let mut spans = Vec::with_capacity(count);
        let mut suffix = [ByteArray::default()];
        for _ in 0 .. count {
            let prefix = self.prefix_lengths[self.next];
            if prefix < 0 || prefix as usize > self.previous.len() {
                return Err(Error::invalid(format!("prefix length {} exceeds the previous value's {} bytes", prefix, self.previous.len())));
            }
            if self.suffixes.decode(&mut suffix)? == 0 {
                return Err(Error::eof("suffix stream exhausted"));
            }
            self.previous.truncate(prefix as usize);
            self.previous.extend_from_slice(suffix[0].data());
            spans.push((arena.len(), self.previous.len()));
            arena.extend_from_slice(&self.previous);
            self.next += 1;
            self.num_values -= 1;
        }
        let arena = ByteArray::copy_from(&arena, &self.pool)?;
        for (slot, (start, len)) in out.iter_mut().zip(spans) {
            *slot = arena.slice(start, len);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::SystemPool;
    use crate::encoding::types::Int64Type;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn round_trip<P: DeltaType>(encoder: &mut DeltaBitPackEncoder<P>, values: &[P::T]) -> Vec<P::T> {
        encoder.put(values).unwrap();
        let page = ByteArray::new(encoder.flush_buffer().unwrap());
        let mut decoder = DeltaBitPackDecoder::<P>::new();
        decoder.set_data(values.len(), page.clone()).unwrap();
        let mut out = vec![P::T::default(); values.len()];
        assert_eq!(decoder.decode(&mut out).unwrap(), values.len());
        assert_eq!(decoder.values_left(), 0);
        out
    }

    fn strings(values: &[&str], pool: &PoolRef) -> Vec<ByteArray> {
        values.iter().map(|value| ByteArray::copy_from(value.as_bytes(), pool).unwrap()).collect()
    }

    #[test]
    fn sequence_uses_one_header() {
        let pool = SystemPool::shared();
        let values = (1 ..= 1024).collect::<Vec<i32>>();
        let mut encoder = DeltaBitPackEncoder::<Int32Type>::new(&pool);
        encoder.put(&values).unwrap();
        let page = ByteArray::new(encoder.flush_buffer().unwrap());

        assert_eq!(page.data()[.. 6], [0x80, 0x01, 4, 0x80, 0x08, 2]);
        let mut reader = BitReader::new(page.clone());
        assert_eq!(reader.get_vlq().unwrap(), 128);
        assert_eq!(reader.get_vlq().unwrap(), 4);
        assert_eq!(reader.get_vlq().unwrap(), 1024);
        assert_eq!(reader.get_zigzag_vlq().unwrap(), 1);
        // Every delta is 1: each block has minimum delta 1 and zero-width mini-blocks.
        assert_eq!(reader.get_zigzag_vlq().unwrap(), 1);
        assert_eq!([0, 0, 0, 0].map(|_| reader.get_aligned(1).unwrap()), [0; 4]);

        let mut decoder = DeltaBitPackDecoder::<Int32Type>::new();
        decoder.set_data(values.len(), page.clone()).unwrap();
        let mut out = vec![0; values.len()];
        decoder.decode(&mut out).unwrap();
        assert_eq!(out, values);
        assert_eq!(decoder.get_offset(), page.len());
    }

    #[test]
    fn decodes_in_pieces() {
        let pool = SystemPool::shared();
        let values = (0 .. 300i64).map(|v| v * v - 1000).collect::<Vec<_>>();
        let mut encoder = DeltaBitPackEncoder::<Int64Type>::with_block_size(64, 2, &pool).unwrap();
        encoder.put(&values).unwrap();
        let page = ByteArray::new(encoder.flush_buffer().unwrap());
        let mut decoder = DeltaBitPackDecoder::<Int64Type>::new();
        decoder.set_data(values.len(), page).unwrap();
        let mut out = Vec::new();
        let mut piece = [0i64; 7];
        loop {
            let count = decoder.decode(&mut piece).unwrap();
            if count == 0 {
                break;
            }
            out.extend_from_slice(&piece[.. count]);
        }
        assert_eq!(out, values);
    }

    #[test]
    fn concatenated_pages() {
        let pool = SystemPool::shared();
        let mut encoder = DeltaBitPackEncoder::<Int32Type>::new(&pool);
        encoder.put(&[5, 3, 9]).unwrap();
        let first = encoder.flush_buffer().unwrap();
        encoder.put(&[-7, -7]).unwrap();
        let second = encoder.flush_buffer().unwrap();
        let mut bytes = first.as_slice().to_vec();
        bytes.extend_from_slice(second.as_slice());

        let mut decoder = DeltaBitPackDecoder::<Int32Type>::new();
        decoder.set_data(5, ByteArray::copy_from(&bytes, &pool).unwrap()).unwrap();
        let mut out = [0; 5];
        decoder.decode(&mut out).unwrap();
        assert_eq!(out, [5, 3, 9, -7, -7]);
    }

    #[test]
    fn extremes_wrap() {
        let pool = SystemPool::shared();
        let values = [i64::MIN, i64::MAX, 0, i64::MIN, -1];
        let mut encoder = DeltaBitPackEncoder::<Int64Type>::new(&pool);
        assert_eq!(round_trip(&mut encoder, &values), values);
        let values = [i32::MAX, i32::MIN, i32::MAX];
        let mut encoder = DeltaBitPackEncoder::<Int32Type>::new(&pool);
        assert_eq!(round_trip(&mut encoder, &values), values);
    }

    #[test]
    fn geometry_is_checked() {
        let pool = SystemPool::shared();
        for (block_size, mini_blocks) in [(128, 0), (100, 4), (64, 16), (0, 1)] {
            let result = DeltaBitPackEncoder::<Int32Type>::with_block_size(block_size, mini_blocks, &pool);
            assert_eq!(result.err().map(|err| err.kind()), Some(ErrorKind::Invalid));
        }
    }

    #[test]
    fn truncated_page() {
        let pool = SystemPool::shared();
        let mut encoder = DeltaBitPackEncoder::<Int64Type>::new(&pool);
        encoder.put(&(0 .. 50).map(|v| v * 1000 + v % 7).collect::<Vec<i64>>()).unwrap();
        let page = encoder.flush_buffer().unwrap();
        let short = ByteArray::copy_from(&page.as_slice()[.. page.len() - 3], &pool).unwrap();
        let mut decoder = DeltaBitPackDecoder::<Int64Type>::new();
        decoder.set_data(50, short).unwrap();
        let mut out = vec![0; 50];
        assert_eq!(decoder.decode(&mut out).unwrap_err().kind(), ErrorKind::Eof);
    }

    #[test]
    fn delta_lengths() {
        let pool = SystemPool::shared();
        let values = strings(&["Hello", "World", "Foobar", "ABCDEF", ""], &pool);
        let mut encoder = DeltaLengthByteArrayEncoder::new(&pool);
        encoder.put(&values).unwrap();
        let page = ByteArray::new(encoder.flush_buffer().unwrap());
        assert!(page.data().ends_with(b"HelloWorldFoobarABCDEF"));

        let mut decoder = DeltaLengthByteArrayDecoder::new();
        decoder.set_data(values.len(), page.clone()).unwrap();
        let mut out = vec![ByteArray::default(); values.len()];
        decoder.decode(&mut out).unwrap();
        assert_eq!(out, values);
        assert!(out[1].buffer().ptr_eq(page.buffer()));
    }

    #[test]
    fn delta_byte_arrays() {
        let pool = SystemPool::shared();
        let values = strings(&["axis", "axle", "babble", "babyhood", "babyhood", ""], &pool);
        let mut encoder = DeltaByteArrayEncoder::new(&pool);
        encoder.put(&values).unwrap();
        let page = ByteArray::new(encoder.flush_buffer().unwrap());
        // Only the suffixes are stored.
        assert!(page.data().ends_with(b"axislebabbleyhood"));

        let mut decoder = DeltaByteArrayDecoder::new(&pool);
        decoder.set_data(values.len(), page.clone()).unwrap();
        let mut out = vec![ByteArray::default(); values.len()];
        assert_eq!(decoder.decode(&mut out[.. 2]).unwrap(), 2);
        assert_eq!(decoder.decode(&mut out[2 ..]).unwrap(), 4);
        assert_eq!(out, values);
        assert!(!out[0].buffer().ptr_eq(page.buffer()));
    }

    #[test]
    fn bad_prefix_length() {
        let pool = SystemPool::shared();
        let mut prefixes = DeltaBitPackEncoder::<Int32Type>::new(&pool);
        prefixes.put(&[3]).unwrap();
        let prefixes = prefixes.flush_buffer().unwrap();
        let mut suffixes = DeltaLengthByteArrayEncoder::new(&pool);
        suffixes.put(&strings(&["x"], &pool)).unwrap();
        let suffixes = suffixes.flush_buffer().unwrap();
        let mut page = (prefixes.len() as u32).to_le_bytes().to_vec();
        page.extend_from_slice(prefixes.as_slice());
        page.extend_from_slice(suffixes.as_slice());

        let mut decoder = DeltaByteArrayDecoder::new(&pool);
        decoder.set_data(1, ByteArray::copy_from(&page, &pool).unwrap()).unwrap();
        let err = decoder.decode(&mut [ByteArray::default()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    proptest! {
        #[test]
        fn int32_round_trip(values in prop::collection::vec(any::<i32>(), 1 .. 600)) {
            let mut encoder = DeltaBitPackEncoder::<Int32Type>::new(&SystemPool::shared());
            prop_assert_eq!(round_trip(&mut encoder, &values), values);
        }

        #[test]
        fn int64_round_trip(values in prop::collection::vec(any::<i64>(), 1 .. 600), block in 1usize .. 5) {
            let pool = SystemPool::shared();
            let mut encoder = DeltaBitPackEncoder::<Int64Type>::with_block_size(block * 32, block, &pool).unwrap();
            prop_assert_eq!(round_trip(&mut encoder, &values), values);
        }

        #[test]
        fn byte_arrays_round_trip(values in prop::collection::vec("[ab]{0,6}", 0 .. 100)) {
            let pool = SystemPool::shared();
            let values = values.iter().map(|value| ByteArray::copy_from(value.as_bytes(), &pool).unwrap()).collect::<Vec<_>>();
            let mut encoder = DeltaByteArrayEncoder::new(&pool);
            encoder.put(&values).unwrap();
            let mut decoder = DeltaByteArrayDecoder::new(&pool);
            decoder.set_data(values.len(), ByteArray::new(encoder.flush_buffer().unwrap())).unwrap();
            let mut out = vec![ByteArray::default(); values.len()];
            decoder.decode(&mut out).unwrap();
            prop_assert_eq!(out, values);
        }
    }
}
