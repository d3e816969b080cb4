//! Physical value types of the file layer, and the encoder and decoder traits.
//!
//! A [`PhysicalType`] supplies everything the generic encoders need from a value
//! type: how it is memoized, how it is laid out in a plain page, and how many bytes
//! it adds to a dictionary page.

use std::fmt;

use crate::bitmap::{self, bytes_for};
use crate::buffer::{Buffer, PoolRef};
use crate::error::{Error, Result};
use crate::memo::{BinaryMemoTable, MemoTable, ScalarMemoTable, DEFAULT_CAPACITY};

/// A byte string viewing a range of a shared [`Buffer`].
///
/// Clones and slices share the underlying allocation.
#[derive(Clone, Default)]
pub struct ByteArray {
    buffer: Buffer,
    start: usize,
    len: usize,
}

impl ByteArray {
    /// A view of all of `buffer`.
    pub fn new(buffer: Buffer) -> Self {
        let len = buffer.len();
        Self { buffer, start: 0, len }
    }
    /// A view of a fresh copy of `bytes`.
    pub fn copy_from(bytes: &[u8], pool: &PoolRef) -> Result<Self> {
        Ok(Self::new(Buffer::from_bytes(bytes, pool)?))
    }
    #[inline] pub fn data(&self) -> &[u8] { &self.buffer.as_slice()[self.start .. self.start + self.len] }
    #[inline] pub fn len(&self) -> usize { self.len }
    #[inline] pub fn is_empty(&self) -> bool { self.len == 0 }
    /// The allocation this view reads from.
    pub fn buffer(&self) -> &Buffer { &self.buffer }

    /// The `len` bytes starting at `start`, relative to this view.
    pub fn slice(&self, start: usize, len: usize) -> ByteArray {
        assert!(start + len <= self.len, "byte array slice out of bounds");
        ByteArray { buffer: self.buffer.clone(), start: self.start + start, len }
    }
}

impl From<Buffer> for ByteArray {
    fn from(buffer: Buffer) -> Self { Self::new(buffer) }
}

impl AsRef<[u8]> for ByteArray {
    fn as_ref(&self) -> &[u8] { self.data() }
}

impl PartialEq for ByteArray {
    fn eq(&self, other: &Self) -> bool { self.data() == other.data() }
}
impl Eq for ByteArray {}

impl fmt::Debug for ByteArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(self.data()) {
            Ok(text) => write!(f, "ByteArray({:?})", text),
            Err(_) => write!(f, "ByteArray({:?})", self.data()),
        }
    }
}

/// Value-type capabilities used by the generic encoders and decoders.
///
/// `type_length` is the declared width of fixed-length byte arrays, and is ignored
/// by every other type.
pub trait PhysicalType: Send + Sync + 'static {
    type T: Clone + Default + PartialEq + fmt::Debug + Send;
    type Memo: Send;
    const NAME: &'static str;

    /// An empty memo table charged to `pool`; `NotImplemented` for types without dictionary support.
    fn new_memo(pool: &PoolRef) -> Result<Self::Memo>;
    /// The dense index of `value`, and whether it was newly inserted.
    fn memoize(memo: &mut Self::Memo, value: &Self::T, type_length: usize) -> Result<(i32, bool)>;
    fn memo_size(memo: &Self::Memo) -> usize;
    /// Bytes `value` adds to a dictionary page.
    fn dict_entry_size(value: &Self::T, type_length: usize) -> usize;
    /// Appends the memoized values, in insertion order, in the plain layout.
    fn write_memo(memo: &Self::Memo, type_length: usize, out: &mut Vec<u8>) -> Result<()>;

    /// Appends `values` in the plain layout; `encoded` values precede them in `out`.
    fn encode_plain(values: &[Self::T], type_length: usize, encoded: usize, out: &mut Vec<u8>) -> Result<()>;
    /// Fills `out` from the plain layout at `position`, advancing it.
    ///
    /// The position counts bits for booleans and bytes for every other type.
    fn decode_plain(data: &ByteArray, position: &mut usize, type_length: usize, out: &mut [Self::T]) -> Result<()>;

    /// Makes `values` independent of the pages they were decoded from.
    fn own_values(_values: &mut [Self::T], _pool: &PoolRef) -> Result<()> { Ok(()) }
}

/// Integer types that the delta codecs can encode.
pub trait DeltaType: PhysicalType {
    fn to_i64(value: &Self::T) -> i64;
    /// Two's-complement truncation to the type's width.
    fn from_i64(value: i64) -> Self::T;
}

/// Encodes values of `P` into a page.
pub trait Encoder<P: PhysicalType> {
    fn put(&mut self, values: &[P::T]) -> Result<()>;

    /// Encodes the values whose bit in `validity`, read from `offset`, is set.
    ///
    /// Returns the number of values encoded.
    fn put_spaced(&mut self, values: &[P::T], validity: &[u8], offset: usize) -> Result<usize> {
        let valid = values
            .iter()
            .enumerate()
            .filter(|(index, _)| bitmap::get_bit(validity, offset + index))
            .map(|(_, value)| value.clone())
            .collect::<Vec<_>>();
        self.put(&valid)?;
        Ok(valid.len())
    }

    /// An upper bound on the bytes [`Encoder::flush_buffer`] would produce now.
    fn estimated_data_encoded_size(&self) -> usize;

    /// Takes the encoded page, leaving the encoder ready for the next one.
    fn flush_buffer(&mut self) -> Result<Buffer>;
}

/// Decodes values of `P` from a page.
pub trait Decoder<P: PhysicalType> {
    /// Starts decoding a page holding `num_values` values.
    fn set_data(&mut self, num_values: usize, data: ByteArray) -> Result<()>;

    fn values_left(&self) -> usize;

    /// Decodes up to `out.len()` values, returning how many were decoded.
    fn decode(&mut self, out: &mut [P::T]) -> Result<usize>;

    /// Decodes `out.len() - null_count` values and spreads them over the positions of
    /// `out` whose bit in `validity`, read from `offset`, is set.
    ///
    /// Null positions hold unspecified values.
    fn decode_spaced(&mut self, out: &mut [P::T], null_count: usize, validity: &[u8], offset: usize) -> Result<usize> {
        let wanted = bitmap::valid_count(out.len(), null_count)?;
        let decoded = self.decode(&mut out[.. wanted])?;
        if decoded != wanted {
            return Err(Error::eof(format!("expected {} values, decoded {}", wanted, decoded)));
        }
        // Fill from the back, where each value moves to a position at or after its own.
        let mut source = wanted;
        for index in (0 .. out.len()).rev() {
            if source == 0 {
                break;
            }
            if bitmap::get_bit(validity, offset + index) {
                source -= 1;
                out.swap(index, source);
            }
        }
        Ok(out.len())
    }
}

/// Advances `position` past `len` bytes of `data`, returning them.
pub(crate) fn take_bytes<'a>(data: &'a ByteArray, position: &mut usize, len: usize) -> Result<&'a [u8]> {
    let start = *position;
    if start + len > data.len() {
        return Err(Error::eof(format!("{} bytes requested with {} remaining", len, data.len().saturating_sub(start))));
    }
    *position += len;
    Ok(&data.data()[start .. start + len])
}

fn memoize<M: MemoTable>(memo: &mut M, value: M::Value<'_>) -> Result<(i32, bool)> {
    let mut inserted = false;
    let index = memo.get_or_insert(value, |_| {}, |_| {
        inserted = true;
        Ok(())
    })?;
    Ok((index, inserted))
}

fn length_prefix(len: usize) -> Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| Error::capacity(format!("byte array of {} bytes exceeds the length prefix", len)))
}

/// Rewrites `values` to view one fresh, contiguous buffer.
fn compact(values: &mut [ByteArray], pool: &PoolRef) -> Result<()> {
    let mut data = Vec::with_capacity(values.iter().map(ByteArray::len).sum());
    for value in values.iter() {
        data.extend_from_slice(value.data());
    }
    let buffer = Buffer::from_bytes(&data, pool)?;
    let mut start = 0;
    for value in values.iter_mut() {
        let len = value.len();
        *value = ByteArray { buffer: buffer.clone(), start, len };
        start += len;
    }
    Ok(())
}

/// Booleans, bit-packed LSB-first in plain pages.
#[derive(Copy, Clone, Debug)]
pub struct BooleanType;

impl PhysicalType for BooleanType {
    type T = bool;
    type Memo = ();
    const NAME: &'static str = "BOOLEAN";

    fn new_memo(_pool: &PoolRef) -> Result<()> {
        Err(Error::not_implemented("dictionary encoding of BOOLEAN values"))
    }
    fn memoize(_memo: &mut (), _value: &bool, _type_length: usize) -> Result<(i32, bool)> {
        Err(Error::not_implemented("dictionary encoding of BOOLEAN values"))
    }
    fn memo_size(_memo: &()) -> usize { 0 }
    fn dict_entry_size(_value: &bool, _type_length: usize) -> usize { 0 }
    fn write_memo(_memo: &(), _type_length: usize, _out: &mut Vec<u8>) -> Result<()> { Ok(()) }

    fn encode_plain(values: &[bool], _type_length: usize, encoded: usize, out: &mut Vec<u8>) -> Result<()> {
        for (index, value) in values.iter().enumerate() {
            let bit = encoded + index;
            if out.len() < bytes_for(bit + 1) {
                out.push(0);
            }
            bitmap::set_bit_to(out, bit, *value);
        }
        Ok(())
    }
    fn decode_plain(data: &ByteArray, position: &mut usize, _type_length: usize, out: &mut [bool]) -> Result<()> {
        if bytes_for(*position + out.len()) > data.len() {
            return Err(Error::eof(format!("{} booleans requested past the end of the page", out.len())));
        }
        for slot in out.iter_mut() {
            *slot = bitmap::get_bit(data.data(), *position);
            *position += 1;
        }
        Ok(())
    }
}

macro_rules! native_physical_type {
    ($(#[$attr:meta])* $name:ident, $t:ty, $label:expr) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug)]
        pub struct $name;

        impl PhysicalType for $name {
            type T = $t;
            type Memo = ScalarMemoTable<$t>;
            const NAME: &'static str = $label;

            fn new_memo(pool: &PoolRef) -> Result<Self::Memo> { ScalarMemoTable::with_pool(DEFAULT_CAPACITY, pool) }
            fn memoize(memo: &mut Self::Memo, value: &$t, _type_length: usize) -> Result<(i32, bool)> { memoize(memo, *value) }
            fn memo_size(memo: &Self::Memo) -> usize { memo.size() }
            fn dict_entry_size(_value: &$t, _type_length: usize) -> usize { std::mem::size_of::<$t>() }
            fn write_memo(memo: &Self::Memo, type_length: usize, out: &mut Vec<u8>) -> Result<()> {
                Self::encode_plain(memo.values(), type_length, 0, out)
            }

            fn encode_plain(values: &[$t], _type_length: usize, _encoded: usize, out: &mut Vec<u8>) -> Result<()> {
                out.reserve(values.len() * std::mem::size_of::<$t>());
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
                Ok(())
            }
            fn decode_plain(data: &ByteArray, position: &mut usize, _type_length: usize, out: &mut [$t]) -> Result<()> {
                const WIDTH: usize = std::mem::size_of::<$t>();
                let bytes = take_bytes(data, position, out.len() * WIDTH)?;
                for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(WIDTH)) {
                    let mut word = [0u8; WIDTH];
                    word.copy_from_slice(chunk);
                    *slot = <$t>::from_le_bytes(word);
                }
                Ok(())
            }
        }
    };
}

native_physical_type!(
    /// 32-bit signed integers.
    Int32Type, i32, "INT32"
);
native_physical_type!(
    /// 64-bit signed integers.
    Int64Type, i64, "INT64"
);
native_physical_type!(FloatType, f32, "FLOAT");
native_physical_type!(DoubleType, f64, "DOUBLE");

impl DeltaType for Int32Type {
    fn to_i64(value: &i32) -> i64 { *value as i64 }
    fn from_i64(value: i64) -> i32 { value as i32 }
}

impl DeltaType for Int64Type {
    fn to_i64(value: &i64) -> i64 { *value }
    fn from_i64(value: i64) -> i64 { value }
}

/// Variable-length byte strings, each preceded by a `u32` little-endian length in plain pages.
#[derive(Copy, Clone, Debug)]
pub struct ByteArrayType;

impl PhysicalType for ByteArrayType {
    type T = ByteArray;
    type Memo = BinaryMemoTable;
    const NAME: &'static str = "BYTE_ARRAY";

    fn new_memo(pool: &PoolRef) -> Result<BinaryMemoTable> { BinaryMemoTable::with_pool(DEFAULT_CAPACITY, pool) }
    fn memoize(memo: &mut BinaryMemoTable, value: &ByteArray, _type_length: usize) -> Result<(i32, bool)> { memoize(memo, value.data()) }
    fn memo_size(memo: &BinaryMemoTable) -> usize { memo.size() }
    fn dict_entry_size(value: &ByteArray, _type_length: usize) -> usize { 4 + value.len() }
    fn write_memo(memo: &BinaryMemoTable, _type_length: usize, out: &mut Vec<u8>) -> Result<()> {
        for index in 0 .. memo.size() {
            let value = memo.value(index as i32);
            out.extend_from_slice(&length_prefix(value.len())?);
            out.extend_from_slice(value);
        }
        Ok(())
    }

    fn encode_plain(values: &[ByteArray], _type_length: usize, _encoded: usize, out: &mut Vec<u8>) -> Result<()> {
        for value in values {
            out.extend_from_slice(&length_prefix(value.len())?);
            out.extend_from_slice(value.data());
        }
        Ok(())
    }
    fn decode_plain(data: &ByteArray, position: &mut usize, _type_length: usize, out: &mut [ByteArray]) -> Result<()> {
        for slot in out.iter_mut() {
            let prefix = take_bytes(data, position, 4)?;
            let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            let start = *position;
            take_bytes(data, position, len)?;
            *slot = data.slice(start, len);
        }
        Ok(())
    }

    fn own_values(values: &mut [ByteArray], pool: &PoolRef) -> Result<()> { compact(values, pool) }
}

/// Byte strings of one declared width, concatenated in plain pages.
#[derive(Copy, Clone, Debug)]
pub struct FixedLenByteArrayType;

impl PhysicalType for FixedLenByteArrayType {
    type T = ByteArray;
    type Memo = BinaryMemoTable;
    const NAME: &'static str = "FIXED_LEN_BYTE_ARRAY";

    fn new_memo(pool: &PoolRef) -> Result<BinaryMemoTable> { BinaryMemoTable::with_pool(DEFAULT_CAPACITY, pool) }
    fn memoize(memo: &mut BinaryMemoTable, value: &ByteArray, type_length: usize) -> Result<(i32, bool)> {
        if value.len() != type_length {
            return Err(Error::invalid(format!("expected {} bytes, found {}", type_length, value.len())));
        }
        memoize(memo, value.data())
    }
    fn memo_size(memo: &BinaryMemoTable) -> usize { memo.size() }
    fn dict_entry_size(_value: &ByteArray, type_length: usize) -> usize { type_length }
    fn write_memo(memo: &BinaryMemoTable, _type_length: usize, out: &mut Vec<u8>) -> Result<()> {
        memo.visit_values(0, |value| out.extend_from_slice(value));
        Ok(())
    }

    fn encode_plain(values: &[ByteArray], type_length: usize, _encoded: usize, out: &mut Vec<u8>) -> Result<()> {
        for value in values {
            if value.len() != type_length {
                return Err(Error::invalid(format!("expected {} bytes, found {}", type_length, value.len())));
            }
            out.extend_from_slice(value.data());
        }
        Ok(())
    }
    fn decode_plain(data: &ByteArray, position: &mut usize, type_length: usize, out: &mut [ByteArray]) -> Result<()> {
        for slot in out.iter_mut() {
            let start = *position;
            take_bytes(data, position, type_length)?;
            *slot = data.slice(start, type_length);
        }
        Ok(())
    }

    fn own_values(values: &mut [ByteArray], pool: &PoolRef) -> Result<()> { compact(values, pool) }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::SystemPool;
    use crate::error::ErrorKind;

    #[test]
    fn byte_array_views_share() {
        let pool = SystemPool::shared();
        let whole = ByteArray::copy_from(b"hello world", &pool).unwrap();
        let word = whole.slice(6, 5);
        assert_eq!(word.data(), b"world");
        assert!(word.buffer().ptr_eq(whole.buffer()));
        assert_eq!(word.slice(1, 2).data(), b"or");
        assert_eq!(format!("{:?}", word), "ByteArray(\"world\")");
    }

    #[test]
    fn booleans_pack_across_calls() {
        let mut out = Vec::new();
        BooleanType::encode_plain(&[true, false, true], 0, 0, &mut out).unwrap();
        BooleanType::encode_plain(&[true; 6], 0, 3, &mut out).unwrap();
        assert_eq!(out, vec![0b1111_1101, 0b0000_0001]);

        let page = ByteArray::copy_from(&out, &SystemPool::shared()).unwrap();
        let mut position = 0;
        let mut values = [false; 9];
        BooleanType::decode_plain(&page, &mut position, 0, &mut values).unwrap();
        assert_eq!(values, [true, false, true, true, true, true, true, true, true]);
        let err = BooleanType::decode_plain(&page, &mut position, 0, &mut [false; 8]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Eof);
    }

    #[test]
    fn booleans_have_no_dictionary() {
        assert_eq!(BooleanType::new_memo(&SystemPool::shared()).unwrap_err().kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn compacting_detaches_from_the_page() {
        let pool = SystemPool::shared();
        let page = ByteArray::copy_from(b"abcdef", &pool).unwrap();
        let mut values = vec![page.slice(4, 2), page.slice(0, 1)];
        ByteArrayType::own_values(&mut values, &pool).unwrap();
        assert_eq!(values[0].data(), b"ef");
        assert_eq!(values[1].data(), b"a");
        assert!(!values[0].buffer().ptr_eq(page.buffer()));
        assert!(values[0].buffer().ptr_eq(values[1].buffer()));
    }

    #[test]
    fn fixed_width_is_checked() {
        let pool = SystemPool::shared();
        let value = ByteArray::copy_from(b"abc", &pool).unwrap();
        let err = FixedLenByteArrayType::encode_plain(&[value], 4, 0, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}
