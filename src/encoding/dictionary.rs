//! Dictionary pages and the run-length encoded index pages that refer to them.
//!
//! A dictionary page holds each distinct value once, in first-seen order, in the
//! plain layout. An index page starts with one byte giving the bit width of the
//! indices, followed by the indices as a run-length/bit-packed stream.

use crate::bit_util;
use crate::bitmap;
use crate::buffer::{Buffer, MutableBuffer, PoolRef};
use crate::error::{Error, Result};
use crate::rle::{RleDecoder, RleEncoder};

use super::types::{ByteArray, Decoder, Encoder, PhysicalType};

/// Accumulates the values of one column chunk as dictionary indices.
pub struct DictEncoder<P: PhysicalType> {
    memo: P::Memo,
    /// Dense indices of the values put since the last flush.
    indices: Vec<i32>,
    dict_encoded_size: usize,
    type_length: usize,
    pool: PoolRef,
}

impl<P: PhysicalType> DictEncoder<P> {
    /// Fails with `NotImplemented` for types without dictionary support.
    pub fn try_new(type_length: usize, pool: &PoolRef) -> Result<Self> {
        Ok(Self { memo: P::new_memo(pool)?, indices: Vec::new(), dict_encoded_size: 0, type_length, pool: pool.clone() })
    }

    pub fn put_one(&mut self, value: &P::T) -> Result<()> {
        let (index, inserted) = P::memoize(&mut self.memo, value, self.type_length)?;
        if inserted {
            self.dict_encoded_size += P::dict_entry_size(value, self.type_length);
        }
        self.indices.push(index);
        Ok(())
    }

    /// The number of distinct values.
    pub fn num_entries(&self) -> usize { P::memo_size(&self.memo) }

    /// The number of indices awaiting a flush.
    pub fn num_buffered_values(&self) -> usize { self.indices.len() }

    /// The byte length of the dictionary page.
    pub fn dict_encoded_size(&self) -> usize { self.dict_encoded_size }

    /// Bits per index: enough to address every entry, and at least one once there is an entry.
    pub fn bit_width(&self) -> usize {
        match self.num_entries() {
            0 => 0,
            1 => 1,
            entries => bit_util::log2(entries as u64),
        }
    }

    /// Writes the index page for the buffered indices into `buffer`, returning its length.
    ///
    /// A `buffer` too small for the page is a `Capacity` error.
    pub fn write_indices(&self, buffer: &mut [u8]) -> Result<usize> {
        let bit_width = self.bit_width();
        let Some((first, rest)) = buffer.split_first_mut() else {
            return Err(Error::capacity("no room for the index bit width"));
        };
        *first = bit_width as u8;
        let mut encoder = RleEncoder::new(rest, bit_width);
        for index in &self.indices {
            encoder.put(*index as u64)?;
        }
        Ok(1 + encoder.flush()?)
    }

    /// Takes the index page for the buffered indices.
    pub fn flush_values(&mut self) -> Result<Buffer> {
        let mut buffer = MutableBuffer::zeroed(self.estimated_data_encoded_size(), &self.pool)?;
        let len = self.write_indices(buffer.as_mut_slice())?;
        buffer.truncate(len);
        tracing::debug!(indices = self.indices.len(), entries = self.num_entries(), bytes = len, "flushed dictionary indices");
        self.indices.clear();
        Ok(buffer.freeze())
    }

    /// Writes the dictionary page into `buffer`, which must hold [`DictEncoder::dict_encoded_size`] bytes.
    pub fn write_dict(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.dict_encoded_size {
            return Err(Error::capacity(format!(
                "dictionary page needs {} bytes, buffer holds {}", self.dict_encoded_size, buffer.len()
            )));
        }
        let mut page = Vec::with_capacity(self.dict_encoded_size);
        P::write_memo(&self.memo, self.type_length, &mut page)?;
        buffer[.. page.len()].copy_from_slice(&page);
        Ok(())
    }

    /// The dictionary page as a fresh buffer.
    pub fn dict_page(&self) -> Result<Buffer> {
        let mut buffer = MutableBuffer::zeroed(self.dict_encoded_size, &self.pool)?;
        self.write_dict(buffer.as_mut_slice())?;
        tracing::debug!(entries = self.num_entries(), bytes = self.dict_encoded_size, "wrote dictionary page");
        Ok(buffer.freeze())
    }
}

impl<P: PhysicalType> Encoder<P> for DictEncoder<P> {
    fn put(&mut self, values: &[P::T]) -> Result<()> {
        self.indices.reserve(values.len());
        values.iter().try_for_each(|value| self.put_one(value))
    }

    fn put_spaced(&mut self, values: &[P::T], validity: &[u8], offset: usize) -> Result<usize> {
        let mut encoded = 0;
        for (index, value) in values.iter().enumerate() {
            if crate::bitmap::get_bit(validity, offset + index) {
                self.put_one(value)?;
                encoded += 1;
            }
        }
        Ok(encoded)
    }

    fn estimated_data_encoded_size(&self) -> usize {
        let bit_width = self.bit_width();
        1 + RleEncoder::max_buffer_size(bit_width, self.indices.len()) + RleEncoder::min_buffer_size(bit_width)
    }

    fn flush_buffer(&mut self) -> Result<Buffer> { self.flush_values() }
}

/// Decodes index pages against a dictionary decoded once up front.
pub struct DictDecoder<P: PhysicalType> {
    dictionary: Vec<P::T>,
    indices: RleDecoder<ByteArray>,
    num_values: usize,
    pool: PoolRef,
}

impl<P: PhysicalType> DictDecoder<P> {
    pub fn new(pool: &PoolRef) -> Self {
        Self { dictionary: Vec::new(), indices: RleDecoder::new(ByteArray::default(), 0), num_values: 0, pool: pool.clone() }
    }

    /// Decodes every remaining value of `decoder` as the dictionary.
    ///
    /// The values are copied, so they outlive the dictionary page.
    pub fn set_dict<D: Decoder<P>>(&mut self, decoder: &mut D) -> Result<()> {
        let mut dictionary = vec![P::T::default(); decoder.values_left()];
        let decoded = decoder.decode(&mut dictionary)?;
        dictionary.truncate(decoded);
        P::own_values(&mut dictionary, &self.pool)?;
        self.dictionary = dictionary;
        Ok(())
    }

    pub fn dictionary(&self) -> &[P::T] { &self.dictionary }
}

impl<P: PhysicalType> Decoder<P> for DictDecoder<P> {
    fn set_data(&mut self, num_values: usize, data: ByteArray) -> Result<()> {
        let Some(&bit_width) = data.data().first() else {
            return Err(Error::eof("index page without a bit width"));
        };
        if bit_width > 32 {
            return Err(Error::invalid(format!("index bit width {} exceeds 32", bit_width)));
        }
        let indices = data.slice(1, data.len() - 1);
        self.indices.reset(indices, bit_width as usize);
        self.num_values = num_values;
        Ok(())
    }

    fn values_left(&self) -> usize { self.num_values }

    fn decode(&mut self, out: &mut [P::T]) -> Result<usize> {
        let wanted = std::cmp::min(out.len(), self.num_values);
        let decoded = self.indices.get_batch_with_dict(&self.dictionary, &mut out[.. wanted])?;
        if decoded != wanted {
            return Err(Error::eof(format!("index page ended after {} of {} values", decoded, wanted)));
        }
        self.num_values -= wanted;
        Ok(wanted)
    }

    fn decode_spaced(&mut self, out: &mut [P::T], null_count: usize, validity: &[u8], offset: usize) -> Result<usize> {
        let wanted = bitmap::valid_count(out.len(), null_count)?;
        if wanted > self.num_values {
            return Err(Error::eof(format!("{} values requested with {} left", wanted, self.num_values)));
        }
        let produced = self.indices.get_batch_with_dict_spaced(&self.dictionary, out, null_count, validity, offset)?;
        if produced != out.len() {
            return Err(Error::eof(format!("index page ended after {} of {} slots", produced, out.len())));
        }
        self.num_values -= wanted;
        Ok(produced)
    }
}
