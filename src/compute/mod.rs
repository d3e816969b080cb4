//! Compute kernels over arrays and chunked arrays.
//!
//! The functions here accept a [`Datum`], resolve a typed kernel for its value type,
//! and feed it one chunk at a time.

use std::sync::Arc;

use crate::array::{ArrayData, ChunkedArray, Datum};
use crate::buffer::{PoolRef, SystemPool};
use crate::datatypes::DataType;
use crate::error::{Error, Result};

pub mod cast;
pub mod hash;

pub use self::cast::{cast, get_cast_function, CastOptions, UnaryKernel};
pub use self::hash::{hash_kernel_with_action, make_hash_kernel, Action, DictEncodeAction, HashAction, HashKernel, UniqueAction};

/// State shared by the kernels of one invocation.
#[derive(Clone, Debug)]
pub struct FunctionContext {
    pool: PoolRef,
}

impl FunctionContext {
    pub fn new(pool: PoolRef) -> Self { Self { pool } }
    /// The pool every kernel allocation is charged to.
    pub fn pool(&self) -> &PoolRef { &self.pool }
}

impl Default for FunctionContext {
    fn default() -> Self { Self::new(SystemPool::shared()) }
}

/// Casts every chunk of `datum` to `to` with a single kernel.
pub fn cast_datum(ctx: &FunctionContext, datum: &Datum, to: &DataType, options: &CastOptions) -> Result<Datum> {
    let kernel = get_cast_function(ctx, datum.data_type(), to, options)?;
    let mut chunks = Vec::with_capacity(datum.chunks().len());
    for chunk in datum.chunks() {
        let mut out = ArrayData::new_null(DataType::Null, 0, ctx.pool())?;
        kernel.call(chunk, &mut out)?;
        chunks.push(out);
    }
    Ok(match datum {
        Datum::Array(_) => Datum::Array(single(chunks)?),
        Datum::ChunkedArray(_) => Datum::ChunkedArray(ChunkedArray::try_new(chunks, to.clone())?),
    })
}

fn single(chunks: Vec<ArrayData>) -> Result<ArrayData> {
    chunks.into_iter().next().ok_or_else(|| Error::invalid("expected one output chunk"))
}

/// The distinct non-null values of `datum`, in order of first appearance.
pub fn unique(ctx: &FunctionContext, datum: &Datum) -> Result<ArrayData> {
    let kernel = make_hash_kernel(ctx, datum.data_type(), HashAction::Unique)?;
    for chunk in datum.chunks() {
        kernel.append(chunk)?;
    }
    kernel.flush()?;
    kernel.get_dictionary()
}

/// `datum` as `Int32` indices into the array of its distinct values.
///
/// Every output chunk shares one dictionary. Null slots stay null in the indices;
/// the dictionary never holds a null.
pub fn dictionary_encode(ctx: &FunctionContext, datum: &Datum) -> Result<Datum> {
    let kernel = make_hash_kernel(ctx, datum.data_type(), HashAction::DictEncode)?;
    kernel.reserve(datum.len())?;
    let mut indices = Vec::with_capacity(datum.chunks().len());
    for chunk in datum.chunks() {
        kernel.append(chunk)?;
        if let Some(chunk_indices) = kernel.flush()? {
            indices.push(chunk_indices);
        }
    }
    let dictionary = Arc::new(kernel.get_dictionary()?);
    let data_type = DataType::Dictionary(Box::new(DataType::Int32), dictionary);
    let chunks = indices.into_iter().map(|chunk| chunk.with_data_type(data_type.clone())).collect::<Vec<_>>();
    Ok(match datum {
        Datum::Array(_) => Datum::Array(single(chunks)?),
        Datum::ChunkedArray(_) => Datum::ChunkedArray(ChunkedArray::try_new(chunks, data_type)?),
    })
}
