//! Hash kernels: distinct values and dictionary encoding.
//!
//! A kernel pairs a memo table over one value type with an [`Action`] deciding what
//! each observation produces. Chunks appended to one kernel share a single memo, so
//! dense indices and dictionary order follow first appearance across every chunk.

use std::fmt;

use parking_lot::Mutex;

use crate::array::ArrayData;
use crate::buffer::{Buffer, PoolRef};
use crate::builder::PrimitiveBuilder;
use crate::common::Len;
use crate::datatypes::DataType;
use crate::error::{Error, Result};
use crate::memo::{BinaryMemoTable, MemoTable, ScalarMemoTable, DEFAULT_CAPACITY};
use crate::native::NativeType;

use super::FunctionContext;

/// What a hash kernel produces for each slot it observes.
pub trait Action: Send {
    /// Whether values absent from the memo may be inserted.
    const ALLOW_EXPAND: bool = true;

    /// Room for `additional` further slots.
    fn reserve(&mut self, _additional: usize) -> Result<()> { Ok(()) }

    fn observe_null(&mut self) -> Result<()>;

    /// A slot holding the value memoized at `index`.
    fn observe_found(&mut self, index: i32) -> Result<()>;

    /// A slot holding a new value, about to be memoized at `index`.
    ///
    /// An error prevents the insertion and ends the append.
    fn observe_not_found(&mut self, index: i32) -> Result<()> {
        if Self::ALLOW_EXPAND {
            self.observe_found(index)
        } else {
            Err(Error::invalid("encountered new dictionary value"))
        }
    }

    /// Takes the output accumulated since the last flush, if the action has any.
    fn flush(&mut self, pool: &PoolRef) -> Result<Option<ArrayData>>;

    /// The number of output slots accumulated since the last flush.
    fn pending(&self) -> usize { 0 }

    /// Drops accumulated output slots from `len` on.
    fn truncate(&mut self, _len: usize) {}
}

/// Records nothing; the memo contents are the result.
#[derive(Copy, Clone, Debug, Default)]
pub struct UniqueAction;

impl Action for UniqueAction {
    fn observe_null(&mut self) -> Result<()> { Ok(()) }
    fn observe_found(&mut self, _index: i32) -> Result<()> { Ok(()) }
    fn flush(&mut self, _pool: &PoolRef) -> Result<Option<ArrayData>> { Ok(None) }
}

/// Records the dense index of each slot, or a null.
#[derive(Debug)]
pub struct DictEncodeAction {
    indices: PrimitiveBuilder<i32>,
}

impl DictEncodeAction {
    /// An action whose indices are charged to `pool`.
    pub fn new(pool: &PoolRef) -> Self {
        Self { indices: PrimitiveBuilder::new(DataType::Int32, pool) }
    }
}

impl Action for DictEncodeAction {
    fn reserve(&mut self, additional: usize) -> Result<()> { self.indices.reserve(additional) }
    fn observe_null(&mut self) -> Result<()> { self.indices.append_null() }
    fn observe_found(&mut self, index: i32) -> Result<()> { self.indices.append_value(index) }
    fn flush(&mut self, pool: &PoolRef) -> Result<Option<ArrayData>> {
        let indices = std::mem::replace(&mut self.indices, PrimitiveBuilder::new(DataType::Int32, pool));
        indices.finish().map(Some)
    }
    fn pending(&self) -> usize { self.indices.len() }
    fn truncate(&mut self, len: usize) { self.indices.truncate(len) }
}

/// The closed set of hash actions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashAction {
    Unique,
    DictEncode,
    Match,
    IsIn,
    ValueCounts,
}

impl fmt::Display for HashAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAction::Unique => "unique",
            HashAction::DictEncode => "dictionary_encode",
            HashAction::Match => "match",
            HashAction::IsIn => "is_in",
            HashAction::ValueCounts => "value_counts",
        };
        f.write_str(name)
    }
}

/// A stateful accumulator over the chunks of one column.
///
/// Calls on one kernel are serialized by an internal lock.
pub trait HashKernel: Send + Sync {
    /// The type of the arrays this kernel accepts.
    fn value_type(&self) -> &DataType;
    fn reserve(&self, additional: usize) -> Result<()>;
    /// Observes every slot of `input`.
    ///
    /// On error the output recorded for this chunk is dropped, while output from
    /// earlier unflushed chunks is kept. Values memoized before the failing slot stay
    /// in the dictionary.
    fn append(&self, input: &ArrayData) -> Result<()>;
    /// The output for the chunks appended since the last flush, if the action produces any.
    fn flush(&self) -> Result<Option<ArrayData>>;
    /// The distinct values observed so far, in order of first appearance.
    fn get_dictionary(&self) -> Result<ArrayData>;
    fn call(&self, input: &ArrayData) -> Result<Option<ArrayData>> {
        self.append(input)?;
        self.flush()
    }
}

/// A memo table specialised to the layout of one value type.
trait HashState: Send {
    fn append<A: Action>(&mut self, input: &ArrayData, action: &mut A) -> Result<()>;
    fn dictionary(&self, data_type: &DataType, pool: &PoolRef) -> Result<ArrayData>;
}

/// Memoizes `value`, reporting the outcome to `action`.
fn observe<M: MemoTable, A: Action>(memo: &mut M, value: M::Value<'_>, action: &mut A) -> Result<()> {
    let mut found = false;
    let index = memo.get_or_insert(value, |_| found = true, |index| action.observe_not_found(index))?;
    if found {
        action.observe_found(index)?;
    }
    Ok(())
}

struct PrimitiveState<T: NativeType> {
    memo: ScalarMemoTable<T>,
}

impl<T: NativeType> HashState for PrimitiveState<T> {
    fn append<A: Action>(&mut self, input: &ArrayData, action: &mut A) -> Result<()> {
        for (index, value) in input.values::<T>().iter().enumerate() {
            if input.is_null(index) {
                action.observe_null()?;
            } else {
                observe(&mut self.memo, *value, action)?;
            }
        }
        Ok(())
    }
    fn dictionary(&self, data_type: &DataType, pool: &PoolRef) -> Result<ArrayData> {
        let values = Buffer::from_slice(self.memo.values(), pool)?;
        ArrayData::try_new(data_type.clone(), self.memo.size(), 0, None, vec![values])
    }
}

/// Variable-length values: `Binary` and `Utf8`.
struct BinaryState {
    memo: BinaryMemoTable,
}

impl HashState for BinaryState {
    fn append<A: Action>(&mut self, input: &ArrayData, action: &mut A) -> Result<()> {
        for index in 0 .. input.len() {
            if input.is_null(index) {
                action.observe_null()?;
            } else {
                observe(&mut self.memo, input.binary_value(index), action)?;
            }
        }
        Ok(())
    }
    fn dictionary(&self, data_type: &DataType, pool: &PoolRef) -> Result<ArrayData> {
        let mut offsets = vec![0i32; self.memo.size() + 1];
        self.memo.copy_offsets(0, &mut offsets);
        let mut data = vec![0u8; self.memo.values_size()];
        self.memo.copy_values(0, &mut data);
        let buffers = vec![Buffer::from_slice(&offsets, pool)?, Buffer::from_bytes(&data, pool)?];
        ArrayData::try_new(data_type.clone(), self.memo.size(), 0, None, buffers)
    }
}

/// Fixed-width byte strings: `FixedSizeBinary` and `Decimal128`.
struct FixedBinaryState {
    memo: BinaryMemoTable,
}

impl HashState for FixedBinaryState {
    fn append<A: Action>(&mut self, input: &ArrayData, action: &mut A) -> Result<()> {
        for index in 0 .. input.len() {
            if input.is_null(index) {
                action.observe_null()?;
            } else {
                observe(&mut self.memo, input.fixed_value(index), action)?;
            }
        }
        Ok(())
    }
    fn dictionary(&self, data_type: &DataType, pool: &PoolRef) -> Result<ArrayData> {
        let mut data = vec![0u8; self.memo.values_size()];
        self.memo.copy_values(0, &mut data);
        ArrayData::try_new(data_type.clone(), self.memo.size(), 0, None, vec![Buffer::from_bytes(&data, pool)?])
    }
}

/// Every slot of a `Null` array is null, so the dictionary stays empty.
#[derive(Default)]
struct NullState;

impl HashState for NullState {
    fn append<A: Action>(&mut self, input: &ArrayData, action: &mut A) -> Result<()> {
        for _ in 0 .. input.len() {
            action.observe_null()?;
        }
        Ok(())
    }
    fn dictionary(&self, _data_type: &DataType, pool: &PoolRef) -> Result<ArrayData> {
        ArrayData::new_null(DataType::Null, 0, pool)
    }
}

struct Inner<S, A> {
    state: S,
    action: A,
}

struct TypedHashKernel<S, A> {
    value_type: DataType,
    pool: PoolRef,
    inner: Mutex<Inner<S, A>>,
}

impl<S: HashState, A: Action> HashKernel for TypedHashKernel<S, A> {
    fn value_type(&self) -> &DataType { &self.value_type }

    fn reserve(&self, additional: usize) -> Result<()> {
        self.inner.lock().action.reserve(additional)
    }

    fn append(&self, input: &ArrayData) -> Result<()> {
        if input.data_type() != &self.value_type {
            return Err(Error::type_error(format!("{} kernel called on {}", self.value_type, input.data_type())));
        }
        input.validate()?;
        let mut inner = self.inner.lock();
        let Inner { state, action } = &mut *inner;
        let start = action.pending();
        let result = state.append(input, action);
        if result.is_err() {
            action.truncate(start);
        }
        result
    }

    fn flush(&self) -> Result<Option<ArrayData>> {
        self.inner.lock().action.flush(&self.pool)
    }

    fn get_dictionary(&self) -> Result<ArrayData> {
        self.inner.lock().state.dictionary(&self.value_type, &self.pool)
    }
}

fn boxed<S: HashState + 'static, A: Action + 'static>(ctx: &FunctionContext, value_type: &DataType, state: S, action: A) -> Box<dyn HashKernel> {
    Box::new(TypedHashKernel {
        value_type: value_type.clone(),
        pool: ctx.pool().clone(),
        inner: Mutex::new(Inner { state, action }),
    })
}

/// Binds the Rust type memoizing fixed-width `$data_type` to `$T`.
macro_rules! primitive_memo_dispatch {
    ($data_type:expr, $T:ident => $body:expr, _ => $fallback:expr) => {
        match $data_type {
            DataType::Int8 => { type $T = i8; $body }
            DataType::Int16 => { type $T = i16; $body }
            DataType::Int32 | DataType::Date32 | DataType::Time32(_) => { type $T = i32; $body }
            DataType::Int64 | DataType::Date64 | DataType::Time64(_) | DataType::Timestamp(_) => { type $T = i64; $body }
            DataType::UInt8 => { type $T = u8; $body }
            DataType::UInt16 => { type $T = u16; $body }
            DataType::UInt32 => { type $T = u32; $body }
            DataType::UInt64 => { type $T = u64; $body }
            DataType::Float16 => { type $T = half::f16; $body }
            DataType::Float32 => { type $T = f32; $body }
            DataType::Float64 => { type $T = f64; $body }
            _ => $fallback,
        }
    };
}

/// A hash kernel for arrays of `value_type` driven by `action`.
pub fn hash_kernel_with_action<A: Action + 'static>(ctx: &FunctionContext, value_type: &DataType, action: A) -> Result<Box<dyn HashKernel>> {
    let kernel = match value_type {
        DataType::Null => boxed(ctx, value_type, NullState, action),
        DataType::Binary | DataType::Utf8 => {
            let memo = BinaryMemoTable::with_pool(DEFAULT_CAPACITY, ctx.pool())?;
            boxed(ctx, value_type, BinaryState { memo }, action)
        }
        DataType::FixedSizeBinary(_) | DataType::Decimal128(_, _) => {
            let memo = BinaryMemoTable::with_pool(DEFAULT_CAPACITY, ctx.pool())?;
            boxed(ctx, value_type, FixedBinaryState { memo }, action)
        }
        other => primitive_memo_dispatch!(other, T => {
            let memo = ScalarMemoTable::<T>::with_pool(DEFAULT_CAPACITY, ctx.pool())?;
            boxed(ctx, value_type, PrimitiveState { memo }, action)
        }, _ => {
            return Err(Error::not_implemented(format!("hashing arrays of type {}", other)));
        }),
    };
    Ok(kernel)
}

/// A hash kernel for arrays of `value_type` performing `action`.
pub fn make_hash_kernel(ctx: &FunctionContext, value_type: &DataType, action: HashAction) -> Result<Box<dyn HashKernel>> {
    tracing::debug!(%action, %value_type, "building hash kernel");
    match action {
        HashAction::Unique => hash_kernel_with_action(ctx, value_type, UniqueAction),
        HashAction::DictEncode => hash_kernel_with_action(ctx, value_type, DictEncodeAction::new(ctx.pool())),
        HashAction::Match | HashAction::IsIn | HashAction::ValueCounts => {
            Err(Error::not_implemented(format!("hash action {}", action)))
        }
    }
}
