//! Plain pages: values laid end to end.

use std::marker::PhantomData;

use crate::buffer::{Buffer, PoolRef};
use crate::error::Result;

use super::types::{ByteArray, Decoder, Encoder, PhysicalType};

pub struct PlainEncoder<P: PhysicalType> {
    buffer: Vec<u8>,
    num_values: usize,
    type_length: usize,
    pool: PoolRef,
    _marker: PhantomData<P>,
}

impl<P: PhysicalType> PlainEncoder<P> {
    pub fn new(type_length: usize, pool: &PoolRef) -> Self {
        Self { buffer: Vec::new(), num_values: 0, type_length, pool: pool.clone(), _marker: PhantomData }
    }
}

impl<P: PhysicalType> Encoder<P> for PlainEncoder<P> {
    fn put(&mut self, values: &[P::T]) -> Result<()> {
        P::encode_plain(values, self.type_length, self.num_values, &mut self.buffer)?;
        self.num_values += values.len();
        Ok(())
    }
    fn estimated_data_encoded_size(&self) -> usize { self.buffer.len() }
    fn flush_buffer(&mut self) -> Result<Buffer> {
        let page = Buffer::from_bytes(&self.buffer, &self.pool)?;
        self.buffer.clear();
        self.num_values = 0;
        Ok(page)
    }
}

pub struct PlainDecoder<P: PhysicalType> {
    data: ByteArray,
    position: usize,
    num_values: usize,
    type_length: usize,
    _marker: PhantomData<P>,
}

impl<P: PhysicalType> PlainDecoder<P> {
    pub fn new(type_length: usize) -> Self {
        Self { data: ByteArray::default(), position: 0, num_values: 0, type_length, _marker: PhantomData }
    }
}

impl<P: PhysicalType> Decoder<P> for PlainDecoder<P> {
    fn set_data(&mut self, num_values: usize, data: ByteArray) -> Result<()> {
        self.data = data;
        self.position = 0;
        self.num_values = num_values;
        Ok(())
    }
    fn values_left(&self) -> usize { self.num_values }
    fn decode(&mut self, out: &mut [P::T]) -> Result<usize> {
        let count = std::cmp::min(out.len(), self.num_values);
        P::decode_plain(&self.data, &mut self.position, self.type_length, &mut out[.. count])?;
        self.num_values -= count;
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::BitmapBuilder;
    use crate::buffer::SystemPool;
    use crate::encoding::types::{BooleanType, ByteArrayType, DoubleType, FixedLenByteArrayType, Int32Type};
    use crate::error::ErrorKind;

    #[test]
    fn primitives_are_little_endian() {
        let pool = SystemPool::shared();
        let mut encoder = PlainEncoder::<Int32Type>::new(0, &pool);
        encoder.put(&[1, -2]).unwrap();
        let page = encoder.flush_buffer().unwrap();
        assert_eq!(page.as_slice(), &[1, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encoder.estimated_data_encoded_size(), 0);

        let mut decoder = PlainDecoder::<Int32Type>::new(0);
        decoder.set_data(2, page.into()).unwrap();
        let mut out = [0; 4];
        assert_eq!(decoder.decode(&mut out).unwrap(), 2);
        assert_eq!(out[.. 2], [1, -2]);
        assert_eq!(decoder.values_left(), 0);
    }

    #[test]
    fn byte_arrays_borrow_the_page() {
        let pool = SystemPool::shared();
        let values = ["", "ab", "cde"].map(|text| ByteArray::copy_from(text.as_bytes(), &pool).unwrap());
        let mut encoder = PlainEncoder::<ByteArrayType>::new(0, &pool);
        encoder.put(&values).unwrap();
        let page = ByteArray::new(encoder.flush_buffer().unwrap());
        assert_eq!(page.len(), 3 * 4 + 5);

        let mut decoder = PlainDecoder::<ByteArrayType>::new(0);
        decoder.set_data(3, page.clone()).unwrap();
        let mut out = vec![ByteArray::default(); 3];
        decoder.decode(&mut out).unwrap();
        assert_eq!(out, values);
        assert!(out[2].buffer().ptr_eq(page.buffer()));
    }

    #[test]
    fn truncated_page() {
        let pool = SystemPool::shared();
        let page = ByteArray::copy_from(&[5, 0, 0, 0, b'a'], &pool).unwrap();
        let mut decoder = PlainDecoder::<ByteArrayType>::new(0);
        decoder.set_data(1, page).unwrap();
        let err = decoder.decode(&mut [ByteArray::default()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Eof);

        let page = ByteArray::copy_from(&[0; 12], &pool).unwrap();
        let mut decoder = PlainDecoder::<DoubleType>::new(0);
        decoder.set_data(2, page).unwrap();
        assert_eq!(decoder.decode(&mut [0.0; 2]).unwrap_err().kind(), ErrorKind::Eof);
    }

    #[test]
    fn fixed_width_and_booleans() {
        let pool = SystemPool::shared();
        let mut encoder = PlainEncoder::<FixedLenByteArrayType>::new(2, &pool);
        encoder.put(&[ByteArray::copy_from(b"xy", &pool).unwrap()]).unwrap();
        let page = encoder.flush_buffer().unwrap();
        assert_eq!(page.as_slice(), b"xy");

        let mut encoder = PlainEncoder::<BooleanType>::new(0, &pool);
        encoder.put(&[true, false]).unwrap();
        encoder.put(&[true]).unwrap();
        let page = encoder.flush_buffer().unwrap();
        assert_eq!(page.as_slice(), &[0b101]);
    }

    #[test]
    fn spaced_round_trip() {
        let pool = SystemPool::shared();
        let mut validity = BitmapBuilder::new(&pool);
        for bit in [true, false, false, true, true] {
            validity.push(bit).unwrap();
        }
        let validity = validity.finish();

        let mut encoder = PlainEncoder::<Int32Type>::new(0, &pool);
        assert_eq!(encoder.put_spaced(&[7, 0, 0, 8, 9], validity.as_slice(), 0).unwrap(), 3);
        let page = encoder.flush_buffer().unwrap();

        let mut decoder = PlainDecoder::<Int32Type>::new(0);
        decoder.set_data(3, page.into()).unwrap();
        let mut out = [0; 5];
        let err = decoder.decode_spaced(&mut out, 6, validity.as_slice(), 0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invalid);
        assert_eq!(decoder.decode_spaced(&mut out, 2, validity.as_slice(), 0).unwrap(), 5);
        assert_eq!([out[0], out[3], out[4]], [7, 8, 9]);
    }
}
