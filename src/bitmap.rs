//! Packed bit arrays: validity bitmaps and boolean values.
//!
//! Bit `i` lives in byte `i / 8` at position `i % 8`, least significant first.

use crate::buffer::{Buffer, MutableBuffer, PoolRef};
use crate::common::{Clear, HeapSize, Len};
use crate::error::{Error, Result};

/// Bytes needed to hold `bits` bits.
#[inline(always)]
pub fn bytes_for(bits: usize) -> usize { (bits + 7) / 8 }

#[inline(always)]
pub fn get_bit(bytes: &[u8], index: usize) -> bool {
    (bytes[index / 8] >> (index % 8)) & 1 == 1
}

#[inline(always)]
pub fn set_bit(bytes: &mut [u8], index: usize) {
    bytes[index / 8] |= 1 << (index % 8);
}

#[inline(always)]
pub fn unset_bit(bytes: &mut [u8], index: usize) {
    bytes[index / 8] &= !(1 << (index % 8));
}

#[inline(always)]
pub fn set_bit_to(bytes: &mut [u8], index: usize, value: bool) {
    if value { set_bit(bytes, index) } else { unset_bit(bytes, index) }
}

/// The number of set bits among `len` bits starting at bit `offset`.
pub fn count_set_bits(bytes: &[u8], offset: usize, len: usize) -> usize {
    let mut count = 0;
    let mut index = offset;
    let end = offset + len;
    // Unaligned head.
    while index < end && index % 8 != 0 {
        count += get_bit(bytes, index) as usize;
        index += 1;
    }
    // Whole bytes.
    let whole = (end - index) / 8;
    count += bytes[index / 8 .. index / 8 + whole].iter().map(|b| b.count_ones() as usize).sum::<usize>();
    index += whole * 8;
    while index < end {
        count += get_bit(bytes, index) as usize;
        index += 1;
    }
    count
}

/// The number of valid slots among `len` slots holding `null_count` nulls.
pub fn valid_count(len: usize, null_count: usize) -> Result<usize> {
    len.checked_sub(null_count)
        .ok_or_else(|| Error::invalid(format!("{} nulls cannot fit in {} slots", null_count, len)))
}

/// Iterates `len` bits starting at bit `offset`.
pub fn iter_bits(bytes: &[u8], offset: usize, len: usize) -> impl Iterator<Item = bool> + '_ {
    (offset .. offset + len).map(move |index| get_bit(bytes, index))
}

/// Accumulates bits into a pool accounted buffer of `ceil(len / 8)` bytes.
#[derive(Debug)]
pub struct BitmapBuilder {
    bytes: MutableBuffer,
    len: usize,
}

impl BitmapBuilder {
    pub fn new(pool: &PoolRef) -> Self {
        Self { bytes: MutableBuffer::new(pool), len: 0 }
    }

    /// `len` set bits, with room for one more.
    pub fn all_set(len: usize, pool: &PoolRef) -> Result<Self> {
        let mut bytes = MutableBuffer::with_capacity(bytes_for(len + 1), pool)?;
        bytes.resize(bytes_for(len))?;
        let slice = bytes.as_mut_slice();
        slice.fill(u8::MAX);
        if len % 8 != 0 {
            if let Some(last) = slice.last_mut() {
                *last = (1u8 << (len % 8)) - 1;
            }
        }
        Ok(Self { bytes, len })
    }

    /// Appends `bit`; fails only if the pool refuses a new byte.
    #[inline]
    pub fn push(&mut self, bit: bool) -> Result<()> {
        if self.len % 8 == 0 {
            self.bytes.push(0u8)?;
        }
        set_bit_to(self.bytes.as_mut_slice(), self.len, bit);
        self.len += 1;
        Ok(())
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> bool { get_bit(self.bytes.as_slice(), index) }

    /// Drops every bit from `len` on, clearing the unused bits of the last byte.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
            self.bytes.truncate(bytes_for(len));
            if len % 8 != 0 {
                if let Some(last) = self.bytes.as_mut_slice().last_mut() {
                    *last &= (1u8 << (len % 8)) - 1;
                }
            }
        }
    }

    pub fn finish(self) -> Buffer { self.bytes.freeze() }
}

impl Len for BitmapBuilder {
    #[inline(always)] fn len(&self) -> usize { self.len }
}

impl Clear for BitmapBuilder {
    fn clear(&mut self) { self.truncate(0) }
}

impl HeapSize for BitmapBuilder {
    fn heap_size(&self) -> (usize, usize) { (self.bytes.len(), self.bytes.capacity()) }
}
