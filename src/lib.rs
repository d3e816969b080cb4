//! Typed kernels over nullable columnar arrays, and the page codecs that share their hashing.
//!
//! Arrays are immutable [`ArrayData`]: a logical type, a length, an optional validity
//! bitmap, and reference-counted buffers laid out for that type. Two families of code
//! operate on them.
//!
//! The [`compute`] kernels transform arrays: [`compute::cast`] converts between value
//! types under explicit overflow and truncation policies, sharing buffers when the
//! physical layouts agree, while [`compute::unique`] and [`compute::dictionary_encode`]
//! hash values into a dictionary of distinct values.
//!
//! The [`encoding`] codecs write and read pages of a columnar file: plain pages,
//! dictionary pages with run-length encoded indices, and delta-bit-packed integers.
//!
//! Both families rest on the same substrate: the open-addressed [`memo`] tables that
//! assign dense indices to distinct values, and the [`bit_util`] and [`rle`] bit codecs.
//! Every allocation is charged to a [`MemoryPool`].

pub mod error;
pub mod buffer;
pub mod native;
pub mod datatypes;
pub mod bitmap;
pub mod common;
pub mod array;
pub mod builder;
pub mod bit_util;
pub mod rle;
pub mod memo;
pub mod compute;
pub mod encoding;
pub mod dictionary_memo;

pub use common::{Clear, HeapSize, Len};
pub use error::{Error, ErrorKind, Result};
pub use buffer::{Buffer, MemoryPool, MutableBuffer, PoolRef, Reservation, SystemPool};
pub use datatypes::{DataType, Field, TimeUnit};
pub use array::{ArrayData, ChunkedArray, Datum};
pub use builder::{BinaryBuilder, BooleanBuilder, FixedSizeBinaryBuilder, PrimitiveBuilder};
pub use memo::{BinaryMemoTable, MemoTable, ScalarMemoTable};
pub use compute::{CastOptions, FunctionContext};
pub use dictionary_memo::DictionaryMemo;
