//! Page encodings for the columnar file format.
//!
//! Encoders accumulate values and hand back a page as a [`Buffer`](crate::buffer::Buffer);
//! decoders are pointed at a page with `set_data` and drain it in batches of any size.
//! Byte array values decode as views into the page whenever the layout allows it.
//!
//! * [`plain`]: values end to end; also the layout of a dictionary page.
//! * [`dictionary`]: a dictionary page plus RLE-encoded indices.
//! * [`delta`]: bit-packed integer deltas, and the byte array encodings built on them.

pub mod types;
pub mod plain;
pub mod dictionary;
pub mod delta;

pub use self::types::{
    BooleanType, ByteArray, ByteArrayType, Decoder, DeltaType, DoubleType, Encoder, FixedLenByteArrayType, FloatType,
    Int32Type, Int64Type, PhysicalType,
};
pub use self::plain::{PlainDecoder, PlainEncoder};
pub use self::dictionary::{DictDecoder, DictEncoder};
pub use self::delta::{
    DeltaBitPackDecoder, DeltaBitPackEncoder, DeltaByteArrayDecoder, DeltaByteArrayEncoder, DeltaLengthByteArrayDecoder,
    DeltaLengthByteArrayEncoder,
};

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::SystemPool;

    /// Dictionary indices survive a page of plain values being replaced by its dictionary.
    #[test]
    fn dictionary_page_through_plain_decoder() {
        let pool = SystemPool::shared();
        let values = [3i64, 1, 3, 3, 2, 1];
        let mut encoder = DictEncoder::<Int64Type>::try_new(0, &pool).unwrap();
        encoder.put(&values).unwrap();
        let indices = encoder.flush_buffer().unwrap();
        let dictionary = encoder.dict_page().unwrap();

        let mut plain = PlainDecoder::<Int64Type>::new(0);
        plain.set_data(encoder.num_entries(), dictionary.into()).unwrap();
        let mut decoder = DictDecoder::<Int64Type>::new(&pool);
        decoder.set_dict(&mut plain).unwrap();
        decoder.set_data(values.len(), indices.into()).unwrap();
        let mut out = [0; 6];
        assert_eq!(decoder.decode(&mut out).unwrap(), 6);
        assert_eq!(out, values);
    }
}
