//! Immutable columnar arrays, chunked columns, and the datum handed to kernels.
//!
//! An [`ArrayData`] is a logical length, a logical offset into its buffers, an
//! optional validity bitmap, and the buffers its type's [`Layout`] calls for:
//!
//! * `Null`: no buffers.
//! * `Bitmap`: one buffer of packed bits.
//! * `FixedWidth(w)`: one buffer of `w` bytes per slot (dictionary indices included).
//! * `VariableBinary`: an `i32` offsets buffer of `len + 1` entries, then the data bytes.
//!
//! Slots are addressed from the logical offset, so slicing shares every buffer.

use std::sync::Arc;

use crate::bitmap::{self, bytes_for};
use crate::buffer::{Buffer, MutableBuffer, PoolRef};
use crate::datatypes::{DataType, Layout};
use crate::error::{Error, Result};
use crate::native::NativeType;

#[derive(Clone, Debug)]
pub struct ArrayData {
    pub(crate) data_type: DataType,
    pub(crate) len: usize,
    pub(crate) offset: usize,
    pub(crate) null_count: usize,
    pub(crate) validity: Option<Buffer>,
    pub(crate) buffers: Vec<Buffer>,
}

impl ArrayData {
    /// Assembles an array from its parts, checking them against the type's layout.
    pub fn try_new(data_type: DataType, len: usize, offset: usize, validity: Option<Buffer>, buffers: Vec<Buffer>) -> Result<Self> {
        let mut array = Self { data_type, len, offset, null_count: 0, validity, buffers };
        array.validate()?;
        array.null_count = array.count_nulls();
        Ok(array)
    }

    /// An array of `len` nulls of `data_type`, with zeroed value buffers.
    pub fn new_null(data_type: DataType, len: usize, pool: &PoolRef) -> Result<Self> {
        let buffers = match data_type.layout() {
            Layout::Null => Vec::new(),
            Layout::Bitmap => vec![MutableBuffer::zeroed(bytes_for(len), pool)?.freeze()],
            Layout::FixedWidth(width) => vec![MutableBuffer::zeroed(len * width, pool)?.freeze()],
            Layout::VariableBinary => vec![MutableBuffer::zeroed((len + 1) * 4, pool)?.freeze(), Buffer::empty()],
        };
        let validity = match data_type.layout() {
            Layout::Null => None,
            _ => Some(MutableBuffer::zeroed(bytes_for(len), pool)?.freeze()),
        };
        Ok(Self { data_type, len, offset: 0, null_count: len, validity, buffers })
    }

    #[inline] pub fn data_type(&self) -> &DataType { &self.data_type }
    #[inline] pub fn len(&self) -> usize { self.len }
    #[inline] pub fn is_empty(&self) -> bool { self.len == 0 }
    #[inline] pub fn offset(&self) -> usize { self.offset }
    #[inline] pub fn null_count(&self) -> usize { self.null_count }
    #[inline] pub fn validity(&self) -> Option<&Buffer> { self.validity.as_ref() }
    #[inline] pub fn buffers(&self) -> &[Buffer] { &self.buffers }
    #[inline] pub fn buffer(&self, index: usize) -> &Buffer { &self.buffers[index] }

    /// The values array of a dictionary-typed array.
    pub fn dictionary(&self) -> Option<&Arc<ArrayData>> { self.data_type.dictionary() }

    #[inline]
    pub fn is_valid(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        match (&self.data_type, &self.validity) {
            (DataType::Null, _) => false,
            (_, None) => true,
            (_, Some(bits)) => bitmap::get_bit(bits.as_slice(), self.offset + index),
        }
    }
    #[inline] pub fn is_null(&self, index: usize) -> bool { !self.is_valid(index) }

    /// The fixed-width values of the array, starting at its offset.
    pub fn values<T: NativeType>(&self) -> &[T] {
        debug_assert_eq!(self.data_type.byte_width(), Some(std::mem::size_of::<T>()));
        &self.buffers[0].typed_data::<T>()[self.offset .. self.offset + self.len]
    }

    /// The `len + 1` offsets delimiting variable-length values.
    pub fn value_offsets(&self) -> &[i32] {
        &self.buffers[0].typed_data::<i32>()[self.offset .. self.offset + self.len + 1]
    }

    pub fn binary_value(&self, index: usize) -> &[u8] {
        let offsets = self.value_offsets();
        &self.buffers[1].as_slice()[offsets[index] as usize .. offsets[index + 1] as usize]
    }

    /// The bytes of slot `index` in a fixed-width array.
    pub fn fixed_value(&self, index: usize) -> &[u8] {
        let width = self.data_type.byte_width().unwrap_or(0);
        let start = (self.offset + index) * width;
        &self.buffers[0].as_slice()[start .. start + width]
    }

    pub fn bool_value(&self, index: usize) -> bool {
        bitmap::get_bit(self.buffers[0].as_slice(), self.offset + index)
    }

    /// A zero-copy view of `len` slots starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> ArrayData {
        assert!(offset + len <= self.len, "slice out of bounds");
        let mut sliced = self.clone();
        sliced.offset = self.offset + offset;
        sliced.len = len;
        sliced.null_count = sliced.count_nulls();
        sliced
    }

    /// The same buffers reinterpreted as `data_type`, which must share the layout.
    pub(crate) fn with_data_type(mut self, data_type: DataType) -> Self {
        debug_assert_eq!(self.data_type.layout(), data_type.layout());
        self.data_type = data_type;
        self
    }

    fn count_nulls(&self) -> usize {
        match (&self.data_type, &self.validity) {
            (DataType::Null, _) => self.len,
            (_, None) => 0,
            (_, Some(bits)) => self.len - bitmap::count_set_bits(bits.as_slice(), self.offset, self.len),
        }
    }

    /// Checks buffer counts and sizes against the type's layout.
    ///
    /// Layout disagreements are a `TypeError`; malformed contents (decreasing offsets,
    /// invalid UTF-8, out-of-range dictionary indices) are `Invalid`.
    pub fn validate(&self) -> Result<()> {
        let end = self.offset + self.len;
        if let Some(bits) = &self.validity {
            if bits.len() < bytes_for(end) {
                return Err(Error::type_error(format!("validity bitmap of {} bytes too short for {} slots", bits.len(), end)));
            }
        }
        let expected = match self.data_type.layout() {
            Layout::Null => 0,
            Layout::VariableBinary => 2,
            _ => 1,
        };
        if self.buffers.len() != expected {
            return Err(Error::type_error(format!("{} expects {} buffers, found {}", self.data_type, expected, self.buffers.len())));
        }
        match self.data_type.layout() {
            Layout::Null => {}
            Layout::Bitmap => {
                if self.buffers[0].len() < bytes_for(end) {
                    return Err(Error::type_error(format!("{} values buffer too short", self.data_type)));
                }
            }
            Layout::FixedWidth(width) => {
                if self.buffers[0].len() < end * width {
                    return Err(Error::type_error(format!(
                        "{} values buffer of {} bytes too short for {} slots", self.data_type, self.buffers[0].len(), end
                    )));
                }
            }
            Layout::VariableBinary => {
                if self.buffers[0].len() < (end + 1) * 4 {
                    return Err(Error::type_error(format!("{} offsets buffer too short", self.data_type)));
                }
                let offsets = self.value_offsets();
                if offsets[0] < 0 || offsets.windows(2).any(|pair| pair[0] > pair[1]) {
                    return Err(Error::invalid("offsets must be non-negative and non-decreasing"));
                }
                if offsets[self.len] as usize > self.buffers[1].len() {
                    return Err(Error::invalid("offsets exceed the data buffer"));
                }
                if self.data_type == DataType::Utf8 {
                    for index in 0 .. self.len {
                        if std::str::from_utf8(self.binary_value(index)).is_err() {
                            return Err(Error::invalid(format!("invalid UTF-8 in slot {}", index)));
                        }
                    }
                }
            }
        }
        if let DataType::Dictionary(index_type, values) = &self.data_type {
            if !index_type.is_integer() {
                return Err(Error::type_error(format!("dictionary index type must be an integer, found {}", index_type)));
            }
            for index in 0 .. self.len {
                if self.is_valid(index) {
                    let key = self.dictionary_key(index)?;
                    if key < 0 || key as usize >= values.len() {
                        return Err(Error::invalid(format!("dictionary index {} out of bounds for {} values", key, values.len())));
                    }
                }
            }
        }
        Ok(())
    }

    /// The index stored in slot `index` of a dictionary-typed array.
    pub(crate) fn dictionary_key(&self, index: usize) -> Result<i64> {
        let DataType::Dictionary(index_type, _) = &self.data_type else {
            return Err(Error::type_error(format!("{} is not a dictionary type", self.data_type)));
        };
        let slot = self.offset + index;
        let buffer = &self.buffers[0];
        Ok(match index_type.as_ref() {
            DataType::Int8 => buffer.typed_data::<i8>()[slot] as i64,
            DataType::Int16 => buffer.typed_data::<i16>()[slot] as i64,
            DataType::Int32 => buffer.typed_data::<i32>()[slot] as i64,
            DataType::Int64 => buffer.typed_data::<i64>()[slot],
            DataType::UInt8 => buffer.typed_data::<u8>()[slot] as i64,
            DataType::UInt16 => buffer.typed_data::<u16>()[slot] as i64,
            DataType::UInt32 => buffer.typed_data::<u32>()[slot] as i64,
            DataType::UInt64 => {
                let key = buffer.typed_data::<u64>()[slot];
                i64::try_from(key).map_err(|_| Error::invalid(format!("dictionary index {} out of bounds", key)))?
            }
            other => return Err(Error::type_error(format!("dictionary index type must be an integer, found {}", other))),
        })
    }

    fn value_eq(&self, index: usize, other: &ArrayData, other_index: usize) -> bool {
        match self.data_type.layout() {
            Layout::Null => true,
            Layout::Bitmap => self.bool_value(index) == other.bool_value(other_index),
            Layout::FixedWidth(_) => self.fixed_value(index) == other.fixed_value(other_index),
            Layout::VariableBinary => self.binary_value(index) == other.binary_value(other_index),
        }
    }
}

/// Logical equality: same type and length, same null positions, equal values at valid positions.
///
/// Fixed-width values compare bitwise, so `NaN` equals an identical `NaN`.
impl PartialEq for ArrayData {
    fn eq(&self, other: &Self) -> bool {
        if self.data_type != other.data_type || self.len != other.len || self.null_count != other.null_count {
            return false;
        }
        (0 .. self.len).all(|index| {
            let valid = self.is_valid(index);
            valid == other.is_valid(index) && (!valid || self.value_eq(index, other, index))
        })
    }
}

/// An ordered sequence of arrays of one type, read as a single column.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkedArray {
    data_type: DataType,
    chunks: Vec<ArrayData>,
}

impl ChunkedArray {
    pub fn try_new(chunks: Vec<ArrayData>, data_type: DataType) -> Result<Self> {
        if let Some(chunk) = chunks.iter().find(|chunk| chunk.data_type() != &data_type) {
            return Err(Error::type_error(format!("chunk of type {} in a column of type {}", chunk.data_type(), data_type)));
        }
        Ok(Self { data_type, chunks })
    }
    pub fn data_type(&self) -> &DataType { &self.data_type }
    pub fn chunks(&self) -> &[ArrayData] { &self.chunks }
    pub fn chunk(&self, index: usize) -> &ArrayData { &self.chunks[index] }
    pub fn num_chunks(&self) -> usize { self.chunks.len() }
    pub fn len(&self) -> usize { self.chunks.iter().map(|chunk| chunk.len()).sum() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn null_count(&self) -> usize { self.chunks.iter().map(|chunk| chunk.null_count()).sum() }
}

/// The input or output of a kernel invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    Array(ArrayData),
    ChunkedArray(ChunkedArray),
}

impl Datum {
    pub fn data_type(&self) -> &DataType {
        match self {
            Datum::Array(array) => array.data_type(),
            Datum::ChunkedArray(chunked) => chunked.data_type(),
        }
    }
    pub fn len(&self) -> usize {
        match self {
            Datum::Array(array) => array.len(),
            Datum::ChunkedArray(chunked) => chunked.len(),
        }
    }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    /// The arrays of the datum in order; a single array is one chunk.
    pub fn chunks(&self) -> &[ArrayData] {
        match self {
            Datum::Array(array) => std::slice::from_ref(array),
            Datum::ChunkedArray(chunked) => chunked.chunks(),
        }
    }
    pub fn as_array(&self) -> Option<&ArrayData> {
        match self {
            Datum::Array(array) => Some(array),
            Datum::ChunkedArray(_) => None,
        }
    }
    pub fn as_chunked(&self) -> Option<&ChunkedArray> {
        match self {
            Datum::Array(_) => None,
            Datum::ChunkedArray(chunked) => Some(chunked),
        }
    }
}

impl From<ArrayData> for Datum {
    fn from(array: ArrayData) -> Self { Datum::Array(array) }
}
impl From<ChunkedArray> for Datum {
    fn from(chunked: ChunkedArray) -> Self { Datum::ChunkedArray(chunked) }
}
