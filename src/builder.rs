//! Growable builders that finish into immutable [`ArrayData`].
//!
//! Builders write straight into pool accounted buffers, so every append that grows
//! storage can fail with `OutOfMemory`. A failed append leaves the builder as it
//! was. A validity bitmap is only materialised if a null was pushed.

use std::marker::PhantomData;

use crate::array::ArrayData;
use crate::bitmap::BitmapBuilder;
use crate::buffer::{Buffer, MutableBuffer, PoolRef};
use crate::common::{Clear, HeapSize, Len};
use crate::datatypes::{DataType, Layout};
use crate::error::{Error, Result};
use crate::native::NativeType;

/// Tracks validity, deferring the bitmap until the first null.
#[derive(Debug)]
struct ValidityBuilder {
    pool: PoolRef,
    bits: Option<BitmapBuilder>,
    len: usize,
}

impl ValidityBuilder {
    fn new(pool: &PoolRef) -> Self {
        Self { pool: pool.clone(), bits: None, len: 0 }
    }
    #[inline]
    fn push(&mut self, valid: bool) -> Result<()> {
        if !valid && self.bits.is_none() {
            self.bits = Some(BitmapBuilder::all_set(self.len, &self.pool)?);
        }
        if let Some(bits) = &mut self.bits {
            bits.push(valid)?;
        }
        self.len += 1;
        Ok(())
    }
    fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
            if let Some(bits) = &mut self.bits {
                bits.truncate(len);
            }
        }
    }
    fn finish(self) -> Option<Buffer> {
        self.bits.map(BitmapBuilder::finish)
    }
    fn clear(&mut self) {
        self.bits = None;
        self.len = 0;
    }
    fn heap_size(&self) -> (usize, usize) {
        self.bits.as_ref().map(|bits| bits.heap_size()).unwrap_or((0, 0))
    }
}

/// Builds arrays of fixed-width native values.
#[derive(Debug)]
pub struct PrimitiveBuilder<T: NativeType> {
    data_type: DataType,
    values: MutableBuffer,
    validity: ValidityBuilder,
    _marker: PhantomData<T>,
}

impl<T: NativeType> PrimitiveBuilder<T> {
    /// A builder for `data_type`, whose slots must be `T`-sized.
    pub fn new(data_type: DataType, pool: &PoolRef) -> Self {
        debug_assert_eq!(data_type.byte_width(), Some(std::mem::size_of::<T>()));
        Self { data_type, values: MutableBuffer::new(pool), validity: ValidityBuilder::new(pool), _marker: PhantomData }
    }
    pub fn with_capacity(data_type: DataType, capacity: usize, pool: &PoolRef) -> Result<Self> {
        let mut builder = Self::new(data_type, pool);
        builder.reserve(capacity)?;
        Ok(builder)
    }
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.values.reserve(additional * std::mem::size_of::<T>())
    }

    fn push_slot(&mut self, value: T, valid: bool) -> Result<()> {
        let len = self.values.len();
        self.values.push(value)?;
        if let Err(err) = self.validity.push(valid) {
            self.values.truncate(len);
            return Err(err);
        }
        Ok(())
    }
    #[inline]
    pub fn append_value(&mut self, value: T) -> Result<()> { self.push_slot(value, true) }
    #[inline]
    pub fn append_null(&mut self) -> Result<()> { self.push_slot(T::default(), false) }
    pub fn append_option(&mut self, value: Option<T>) -> Result<()> {
        match value {
            Some(value) => self.append_value(value),
            None => self.append_null(),
        }
    }
    pub fn append_slice(&mut self, values: &[T]) -> Result<()> {
        self.reserve(values.len())?;
        values.iter().try_for_each(|value| self.append_value(*value))
    }

    /// Drops every slot from `len` on.
    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len * std::mem::size_of::<T>());
        self.validity.truncate(len);
    }

    pub fn finish(self) -> Result<ArrayData> {
        let len = self.len();
        let validity = self.validity.finish();
        ArrayData::try_new(self.data_type, len, 0, validity, vec![self.values.freeze()])
    }
}

impl<T: NativeType> Len for PrimitiveBuilder<T> {
    #[inline(always)] fn len(&self) -> usize { self.values.len() / std::mem::size_of::<T>() }
}
impl<T: NativeType> Clear for PrimitiveBuilder<T> {
    fn clear(&mut self) {
        self.values.clear();
        self.validity.clear();
    }
}
impl<T: NativeType> HeapSize for PrimitiveBuilder<T> {
    fn heap_size(&self) -> (usize, usize) {
        let (vl, vc) = self.validity.heap_size();
        (self.values.len() + vl, self.values.capacity() + vc)
    }
}

/// Builds boolean arrays, one bit per value.
#[derive(Debug)]
pub struct BooleanBuilder {
    values: BitmapBuilder,
    validity: ValidityBuilder,
}

impl BooleanBuilder {
    pub fn new(pool: &PoolRef) -> Self {
        Self { values: BitmapBuilder::new(pool), validity: ValidityBuilder::new(pool) }
    }

    fn push_slot(&mut self, value: bool, valid: bool) -> Result<()> {
        let len = self.values.len();
        self.values.push(value)?;
        if let Err(err) = self.validity.push(valid) {
            self.values.truncate(len);
            return Err(err);
        }
        Ok(())
    }
    pub fn append_value(&mut self, value: bool) -> Result<()> { self.push_slot(value, true) }
    pub fn append_null(&mut self) -> Result<()> { self.push_slot(false, false) }
    pub fn append_option(&mut self, value: Option<bool>) -> Result<()> {
        match value {
            Some(value) => self.append_value(value),
            None => self.append_null(),
        }
    }
    pub fn finish(self) -> Result<ArrayData> {
        let len = self.values.len();
        let validity = self.validity.finish();
        ArrayData::try_new(DataType::Boolean, len, 0, validity, vec![self.values.finish()])
    }
}

impl Len for BooleanBuilder {
    #[inline(always)] fn len(&self) -> usize { self.values.len() }
}

/// Builds `Binary` or `Utf8` arrays from an offsets buffer and a byte store.
#[derive(Debug)]
pub struct BinaryBuilder {
    data_type: DataType,
    /// Offsets container; entry `i + 1` is the end of value `i`.
    offsets: MutableBuffer,
    /// Values container; the concatenated bytes.
    data: MutableBuffer,
    validity: ValidityBuilder,
}

impl BinaryBuilder {
    pub fn new(data_type: DataType, pool: &PoolRef) -> Result<Self> {
        Self::with_capacity(data_type, 0, 0, pool)
    }
    /// A builder with room for `values` values of `bytes` bytes in total.
    pub fn with_capacity(data_type: DataType, values: usize, bytes: usize, pool: &PoolRef) -> Result<Self> {
        debug_assert_eq!(data_type.layout(), Layout::VariableBinary);
        let mut offsets = MutableBuffer::with_capacity((values + 1) * 4, pool)?;
        offsets.push(0i32)?;
        let data = MutableBuffer::with_capacity(bytes, pool)?;
        Ok(Self { data_type, offsets, data, validity: ValidityBuilder::new(pool) })
    }
    pub fn reserve(&mut self, values: usize, bytes: usize) -> Result<()> {
        self.offsets.reserve(values * 4)?;
        self.data.reserve(bytes)
    }

    fn push_slot(&mut self, value: &[u8], valid: bool) -> Result<()> {
        let end = self.data.len() + value.len();
        let end = i32::try_from(end)
            .map_err(|_| Error::capacity(format!("binary array cannot hold {} bytes", end)))?;
        self.reserve(1, value.len())?;
        self.validity.push(valid)?;
        // Both stores were reserved, so neither write reallocates.
        self.data.extend_from_slice(value)?;
        self.offsets.push(end)
    }
    /// Appends `value`, failing if the data would pass the 2 GiB offset limit.
    pub fn append_value(&mut self, value: &[u8]) -> Result<()> { self.push_slot(value, true) }
    pub fn append_null(&mut self) -> Result<()> { self.push_slot(&[], false) }
    pub fn append_option(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            Some(value) => self.append_value(value),
            None => self.append_null(),
        }
    }
    /// Bytes of value data appended so far.
    pub fn values_len(&self) -> usize { self.data.len() }

    pub fn finish(self) -> Result<ArrayData> {
        let len = self.len();
        let validity = self.validity.finish();
        ArrayData::try_new(self.data_type, len, 0, validity, vec![self.offsets.freeze(), self.data.freeze()])
    }
}

impl Len for BinaryBuilder {
    #[inline(always)] fn len(&self) -> usize { self.offsets.len() / 4 - 1 }
}
impl Clear for BinaryBuilder {
    fn clear(&mut self) {
        self.offsets.truncate(4);
        self.data.clear();
        self.validity.clear();
    }
}
impl HeapSize for BinaryBuilder {
    fn heap_size(&self) -> (usize, usize) {
        let (vl, vc) = self.validity.heap_size();
        (self.offsets.len() + self.data.len() + vl, self.offsets.capacity() + self.data.capacity() + vc)
    }
}

/// Builds fixed-size binary (or decimal) arrays of a set width.
#[derive(Debug)]
pub struct FixedSizeBinaryBuilder {
    data_type: DataType,
    width: usize,
    data: MutableBuffer,
    validity: ValidityBuilder,
}

impl FixedSizeBinaryBuilder {
    pub fn new(data_type: DataType, pool: &PoolRef) -> Self {
        let width = data_type.byte_width().unwrap_or(0);
        Self { data_type, width, data: MutableBuffer::new(pool), validity: ValidityBuilder::new(pool) }
    }

    fn push_slot(&mut self, value: Option<&[u8]>) -> Result<()> {
        self.data.reserve(self.width)?;
        self.validity.push(value.is_some())?;
        let len = self.data.len() + self.width;
        match value {
            Some(value) => self.data.extend_from_slice(value),
            None => self.data.resize(len),
        }
    }
    pub fn append_value(&mut self, value: &[u8]) -> Result<()> {
        if value.len() != self.width {
            return Err(Error::invalid(format!("value of {} bytes in a {} column", value.len(), self.data_type)));
        }
        self.push_slot(Some(value))
    }
    pub fn append_null(&mut self) -> Result<()> { self.push_slot(None) }
    pub fn finish(self) -> Result<ArrayData> {
        let len = self.validity.len;
        let validity = self.validity.finish();
        ArrayData::try_new(self.data_type, len, 0, validity, vec![self.data.freeze()])
    }
}

impl Len for FixedSizeBinaryBuilder {
    #[inline(always)] fn len(&self) -> usize { self.validity.len }
}

/// A primitive array of `data_type` from optional values.
pub fn primitive_array<T: NativeType>(data_type: DataType, values: &[Option<T>], pool: &PoolRef) -> Result<ArrayData> {
    let mut builder = PrimitiveBuilder::with_capacity(data_type, values.len(), pool)?;
    for value in values {
        builder.append_option(*value)?;
    }
    builder.finish()
}

/// A binary or utf8 array from optional byte strings.
pub fn binary_array(data_type: DataType, values: &[Option<&[u8]>], pool: &PoolRef) -> Result<ArrayData> {
    let mut builder = BinaryBuilder::with_capacity(data_type, values.len(), 0, pool)?;
    for value in values {
        builder.append_option(*value)?;
    }
    builder.finish()
}

/// A utf8 array from optional strings.
pub fn utf8_array(values: &[Option<&str>], pool: &PoolRef) -> Result<ArrayData> {
    let mut builder = BinaryBuilder::with_capacity(DataType::Utf8, values.len(), 0, pool)?;
    for value in values {
        builder.append_option(value.map(str::as_bytes))?;
    }
    builder.finish()
}
