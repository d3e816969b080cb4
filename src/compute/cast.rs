//! Element-wise casts between array types.
//!
//! [`get_cast_function`] resolves a `(from, to)` pair to a reusable [`UnaryKernel`].
//! Kernels fall into four shapes:
//!
//! * zero-copy: identical types, or integers reinterpreted as same-width temporal
//!   types (and back). The output shares every buffer of the input.
//! * from null: an all-null array of the target type.
//! * values: a per-slot numeric conversion writing one new values buffer. The
//!   input's offset and validity are kept, and checks only look at valid slots.
//! * take: a dictionary array materialised as its dense value type.
//!
//! Checked conversions validate every valid slot before writing any output, so a
//! failed call leaves caller-provided buffers untouched.

use crate::array::ArrayData;
use crate::bitmap::{self, bytes_for};
use crate::buffer::{Buffer, MutableBuffer, PoolRef};
use crate::builder::{BinaryBuilder, BooleanBuilder};
use crate::datatypes::{DataType, Layout, TimeUnit};
use crate::error::{Error, Result};
use crate::native::Numeric;

use super::FunctionContext;

/// Policies for conversions that may lose information.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default, deny_unknown_fields))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CastOptions {
    /// Permit integer conversions that change the value; the result wraps.
    pub allow_int_overflow: bool,
    /// Permit temporal conversions that discard sub-units; the result truncates toward zero.
    pub allow_time_truncate: bool,
    /// Permit float to integer conversions of fractional values; the result truncates toward zero.
    pub allow_float_truncate: bool,
}

impl Default for CastOptions {
    fn default() -> Self {
        Self { allow_int_overflow: false, allow_time_truncate: false, allow_float_truncate: true }
    }
}

impl CastOptions {
    /// Options that reject every lossy conversion.
    pub fn safe() -> Self {
        Self { allow_float_truncate: false, ..Self::default() }
    }
    /// Options that permit every lossy conversion.
    pub fn permissive() -> Self {
        Self { allow_int_overflow: true, allow_time_truncate: true, allow_float_truncate: true }
    }
}

/// A kernel transforming one array into another.
pub trait UnaryKernel: Send + Sync {
    /// Computes the output for `input` into `out`.
    ///
    /// For element-wise casts, a values buffer already in `out` is written in place and
    /// keeps its address. It must be at least as large as the result (`Capacity`
    /// otherwise) and uniquely owned by `out` (`Invalid` otherwise).
    fn call(&self, input: &ArrayData, out: &mut ArrayData) -> Result<()>;
}

/// `value * mul / div * post_mul`, applied in `i128`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Rescale {
    mul: i128,
    div: i128,
    post_mul: i128,
}

impl Rescale {
    const IDENTITY: Rescale = Rescale { mul: 1, div: 1, post_mul: 1 };
    const MILLIS_PER_DAY: i128 = 86_400_000;

    fn multiply(factor: i64) -> Self { Rescale { mul: factor as i128, ..Self::IDENTITY } }
    fn divide(factor: i64) -> Self { Rescale { div: factor as i128, ..Self::IDENTITY } }

    /// Converts values in unit `from` to values in unit `to`.
    fn units(from: TimeUnit, to: TimeUnit) -> Self {
        let (from, to) = (from.per_second(), to.per_second());
        if from <= to { Self::multiply(to / from) } else { Self::divide(from / to) }
    }
}

type ValuesFn = fn(&CastKernel, &ArrayData, &mut [u8]) -> Result<()>;

#[derive(Copy, Clone)]
enum CastRule {
    ZeroCopy,
    FromNull,
    Values(ValuesFn, Rescale),
    Take,
}

struct CastKernel {
    from: DataType,
    to: DataType,
    options: CastOptions,
    pool: PoolRef,
    rule: CastRule,
}

/// Binds the numeric Rust type of `$data_type` to `$T` within `$body`.
macro_rules! numeric_dispatch {
    ($data_type:expr, $T:ident => $body:expr, _ => $fallback:expr) => {
        match $data_type {
            DataType::Int8 => { type $T = i8; $body }
            DataType::Int16 => { type $T = i16; $body }
            DataType::Int32 => { type $T = i32; $body }
            DataType::Int64 => { type $T = i64; $body }
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

/// Binds the integer Rust type storing `$data_type`, temporal types included, to `$T`.
macro_rules! integer_dispatch {
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
            _ => $fallback,
        }
    };
}

/// An integer-stored conversion, rescaled by `rescale`.
fn integer_rule(from: &DataType, to: &DataType, rescale: Rescale) -> Option<CastRule> {
    integer_dispatch!(from, I => integer_dispatch!(to, O => Some(CastRule::Values(integer_cast::<I, O>, rescale)), _ => None), _ => None)
}

fn cast_rule(from: &DataType, to: &DataType) -> Option<CastRule> {
    use DataType::*;
    if from == to {
        return Some(CastRule::ZeroCopy);
    }
    match (from, to) {
        (Null, _) => Some(CastRule::FromNull),
        (Dictionary(_, values), _) if values.data_type() == to => Some(CastRule::Take),

        (Int32, Date32 | Time32(_)) | (Date32 | Time32(_), Int32) => Some(CastRule::ZeroCopy),
        (Int64, Date64 | Time64(_) | Timestamp(_)) | (Date64 | Time64(_) | Timestamp(_), Int64) => Some(CastRule::ZeroCopy),

        (Boolean, to) if to.is_numeric() => {
            numeric_dispatch!(to, O => Some(CastRule::Values(boolean_to_numeric::<O>, Rescale::IDENTITY)), _ => None)
        }
        (from, Boolean) if from.is_numeric() => {
            numeric_dispatch!(from, I => Some(CastRule::Values(numeric_to_boolean::<I>, Rescale::IDENTITY)), _ => None)
        }
        (from, to) if from.is_integer() && to.is_integer() => integer_rule(from, to, Rescale::IDENTITY),
        (from, to) if from.is_floating() && to.is_integer() => {
            numeric_dispatch!(from, I => integer_dispatch!(to, O => Some(CastRule::Values(float_to_integer::<I, O>, Rescale::IDENTITY)), _ => None), _ => None)
        }
        (from, to) if from.is_numeric() && to.is_floating() => {
            numeric_dispatch!(from, I => numeric_dispatch!(to, O => Some(CastRule::Values(numeric_to_float::<I, O>, Rescale::IDENTITY)), _ => None), _ => None)
        }

        (Timestamp(from_unit), Timestamp(to_unit)) => integer_rule(from, to, Rescale::units(*from_unit, *to_unit)),
        (Time32(from_unit) | Time64(from_unit), Time32(to_unit) | Time64(to_unit)) => {
            integer_rule(from, to, Rescale::units(*from_unit, *to_unit))
        }
        (Timestamp(unit), Date64) => {
            let per_day = unit.per_second() as i128 * 86_400;
            integer_rule(from, to, Rescale { mul: 1, div: per_day, post_mul: Rescale::MILLIS_PER_DAY })
        }
        (Timestamp(unit), Date32) => integer_rule(from, to, Rescale::divide(unit.per_second() * 86_400)),
        (Date32, Date64) => integer_rule(from, to, Rescale::multiply(86_400_000)),
        (Date64, Date32) => integer_rule(from, to, Rescale::divide(86_400_000)),
        _ => None,
    }
}

/// Resolves a kernel converting arrays of `from` into arrays of `to`.
///
/// Pairs without a conversion rule are `NotImplemented`.
pub fn get_cast_function(ctx: &FunctionContext, from: &DataType, to: &DataType, options: &CastOptions) -> Result<Box<dyn UnaryKernel>> {
    let rule = cast_rule(from, to)
        .ok_or_else(|| Error::not_implemented(format!("No cast implemented from {} to {}", from, to)))?;
    tracing::debug!(%from, %to, zero_copy = matches!(rule, CastRule::ZeroCopy), "selected cast kernel");
    Ok(Box::new(CastKernel { from: from.clone(), to: to.clone(), options: *options, pool: ctx.pool().clone(), rule }))
}

/// Casts `input` to `to`.
pub fn cast(ctx: &FunctionContext, input: &ArrayData, to: &DataType, options: &CastOptions) -> Result<ArrayData> {
    let kernel = get_cast_function(ctx, input.data_type(), to, options)?;
    let mut out = ArrayData::new_null(DataType::Null, 0, ctx.pool())?;
    kernel.call(input, &mut out)?;
    Ok(out)
}

impl UnaryKernel for CastKernel {
    fn call(&self, input: &ArrayData, out: &mut ArrayData) -> Result<()> {
        if input.data_type() != &self.from {
            return Err(Error::type_error(format!("cast kernel from {} called on {}", self.from, input.data_type())));
        }
        input.validate()?;
        match self.rule {
            CastRule::ZeroCopy => {
                *out = input.clone().with_data_type(self.to.clone());
            }
            CastRule::FromNull => {
                *out = ArrayData::new_null(self.to.clone(), input.len(), &self.pool)?;
            }
            CastRule::Take => {
                *out = take_dictionary(input, &self.to, &self.pool)?;
            }
            CastRule::Values(convert, _) => {
                let end = input.offset() + input.len();
                let needed = match self.to.layout() {
                    Layout::Bitmap => bytes_for(end),
                    Layout::FixedWidth(width) => end * width,
                    layout => return Err(Error::type_error(format!("no element-wise output for {:?}", layout))),
                };
                // A preallocated output is written in place and never replaced.
                let preallocated = !out.buffers.is_empty();
                let mut values = if preallocated {
                    if out.buffers.len() != 1 {
                        return Err(Error::type_error(format!("{} output expects 1 buffer, found {}", self.to, out.buffers.len())));
                    }
                    if out.buffers[0].len() < needed {
                        return Err(Error::capacity(format!(
                            "cast output buffer of {} bytes cannot hold {} bytes", out.buffers[0].len(), needed
                        )));
                    }
                    if out.buffers[0].get_mut().is_none() {
                        return Err(Error::invalid("cast output buffer is shared and cannot be written in place"));
                    }
                    std::mem::take(&mut out.buffers[0])
                } else {
                    MutableBuffer::zeroed(needed, &self.pool)?.freeze()
                };
                let result = match values.get_mut() {
                    Some(bytes) => convert(self, input, &mut bytes[.. needed]),
                    None => Err(Error::invalid("cast output buffer is shared and cannot be written in place")),
                };
                if let Err(err) = result {
                    if preallocated {
                        out.buffers[0] = values;
                    }
                    return Err(err);
                }
                out.data_type = self.to.clone();
                out.len = input.len();
                out.offset = input.offset();
                out.null_count = input.null_count();
                out.validity = input.validity().cloned();
                out.buffers = vec![values];
            }
        }
        Ok(())
    }
}

impl CastKernel {
    fn rescale(&self) -> Rescale {
        match self.rule {
            CastRule::Values(_, rescale) => rescale,
            _ => Rescale::IDENTITY,
        }
    }
}

/// Calls `f` with the buffer position of every valid slot.
fn for_each_valid(input: &ArrayData, mut f: impl FnMut(usize) -> Result<()>) -> Result<()> {
    let range = input.offset() .. input.offset() + input.len();
    match input.validity() {
        None => range.into_iter().try_for_each(f),
        Some(bits) => {
            let bits = bits.as_slice();
            for position in range {
                if bitmap::get_bit(bits, position) {
                    f(position)?;
                }
            }
            Ok(())
        }
    }
}

fn integer_cast<I: Numeric, O: Numeric>(kernel: &CastKernel, input: &ArrayData, out: &mut [u8]) -> Result<()> {
    let Rescale { mul, div, post_mul } = kernel.rescale();
    let source = input.buffer(0).typed_data::<I>();
    let options = &kernel.options;
    let narrowing = I::MIN_I128 < O::MIN_I128 || I::MAX_I128 > O::MAX_I128 || mul > 1 || post_mul > 1;

    if (div > 1 && !options.allow_time_truncate) || (narrowing && !options.allow_int_overflow) {
        for_each_valid(input, |position| {
            let scaled = source[position].as_i128() * mul;
            if div > 1 && !options.allow_time_truncate && scaled % div != 0 {
                return Err(Error::invalid(format!(
                    "Casting from {} to {} would lose data: {}", kernel.from, kernel.to, source[position].as_i128()
                )));
            }
            let value = scaled / div * post_mul;
            if !options.allow_int_overflow && (value < O::MIN_I128 || value > O::MAX_I128) {
                return Err(Error::invalid(format!(
                    "Integer value {} not in range: {} to {}", value, O::MIN_I128, O::MAX_I128
                )));
            }
            Ok(())
        })?;
    }

    let target: &mut [O] = bytemuck::cast_slice_mut(out);
    for position in input.offset() .. input.offset() + input.len() {
        target[position] = O::wrap_i128(source[position].as_i128() * mul / div * post_mul);
    }
    Ok(())
}

fn float_to_integer<I: Numeric, O: Numeric>(kernel: &CastKernel, input: &ArrayData, out: &mut [u8]) -> Result<()> {
    let source = input.buffer(0).typed_data::<I>();
    let options = &kernel.options;
    if !options.allow_float_truncate || !options.allow_int_overflow {
        // `MAX + 1` is a power of two, so it converts to `f64` exactly.
        let (lower, upper) = (O::MIN_I128 as f64, (O::MAX_I128 + 1) as f64);
        for_each_valid(input, |position| {
            let value = source[position].as_f64();
            if !options.allow_float_truncate && value.fract() != 0.0 {
                return Err(Error::invalid(format!("Float value {} was truncated converting to {}", value, kernel.to)));
            }
            let truncated = value.trunc();
            if !options.allow_int_overflow && !(truncated >= lower && truncated < upper) {
                return Err(Error::invalid(format!("Float value {} out of range for {}", value, kernel.to)));
            }
            Ok(())
        })?;
    }

    let target: &mut [O] = bytemuck::cast_slice_mut(out);
    for position in input.offset() .. input.offset() + input.len() {
        target[position] = O::from_f64(source[position].as_f64());
    }
    Ok(())
}

fn numeric_to_float<I: Numeric, O: Numeric>(_kernel: &CastKernel, input: &ArrayData, out: &mut [u8]) -> Result<()> {
    let source = input.buffer(0).typed_data::<I>();
    let target: &mut [O] = bytemuck::cast_slice_mut(out);
    for position in input.offset() .. input.offset() + input.len() {
        target[position] = O::from_f64(source[position].as_f64());
    }
    Ok(())
}

fn boolean_to_numeric<O: Numeric>(_kernel: &CastKernel, input: &ArrayData, out: &mut [u8]) -> Result<()> {
    let source = input.buffer(0).as_slice();
    let target: &mut [O] = bytemuck::cast_slice_mut(out);
    for position in input.offset() .. input.offset() + input.len() {
        target[position] = if bitmap::get_bit(source, position) { O::one() } else { O::default() };
    }
    Ok(())
}

/// Any nonzero value is `true`, `NaN` included.
fn numeric_to_boolean<I: Numeric>(_kernel: &CastKernel, input: &ArrayData, out: &mut [u8]) -> Result<()> {
    let source = input.buffer(0).typed_data::<I>();
    for position in input.offset() .. input.offset() + input.len() {
        bitmap::set_bit_to(out, position, !source[position].is_zero());
    }
    Ok(())
}

/// The dictionary slot referenced by slot `index`, or `None` where either is null.
fn dictionary_slot(input: &ArrayData, dictionary: &ArrayData, index: usize) -> Result<Option<usize>> {
    if input.is_null(index) {
        return Ok(None);
    }
    let key = input.dictionary_key(index)?;
    if key < 0 || key as usize >= dictionary.len() {
        return Err(Error::invalid(format!("dictionary index {} out of bounds for {} values", key, dictionary.len())));
    }
    let slot = key as usize;
    Ok(if dictionary.is_valid(slot) { Some(slot) } else { None })
}

/// Materialises a dictionary array as an array of its value type.
fn take_dictionary(input: &ArrayData, to: &DataType, pool: &PoolRef) -> Result<ArrayData> {
    let dictionary = input
        .dictionary()
        .ok_or_else(|| Error::type_error(format!("{} is not a dictionary type", input.data_type())))?;
    let len = input.len();
    match to.layout() {
        Layout::Null => ArrayData::new_null(to.clone(), len, pool),
        Layout::Bitmap => {
            let mut builder = BooleanBuilder::new(pool);
            for index in 0 .. len {
                builder.append_option(dictionary_slot(input, dictionary, index)?.map(|slot| dictionary.bool_value(slot)))?;
            }
            builder.finish()
        }
        Layout::FixedWidth(width) => {
            let mut values = MutableBuffer::zeroed(len * width, pool)?;
            let mut validity = MutableBuffer::zeroed(bytes_for(len), pool)?;
            let mut nulls = 0;
            for index in 0 .. len {
                match dictionary_slot(input, dictionary, index)? {
                    Some(slot) => {
                        values.as_mut_slice()[index * width .. (index + 1) * width].copy_from_slice(dictionary.fixed_value(slot));
                        bitmap::set_bit(validity.as_mut_slice(), index);
                    }
                    None => nulls += 1,
                }
            }
            let validity: Option<Buffer> = if nulls > 0 { Some(validity.freeze()) } else { None };
            ArrayData::try_new(to.clone(), len, 0, validity, vec![values.freeze()])
        }
        Layout::VariableBinary => {
            let mut builder = BinaryBuilder::with_capacity(to.clone(), len, 0, pool)?;
            for index in 0 .. len {
                let value = dictionary_slot(input, dictionary, index)?.map(|slot| dictionary.binary_value(slot));
                builder.append_option(value)?;
            }
            builder.finish()
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::bitmap::BitmapBuilder;
    use crate::buffer::SystemPool;
    use crate::builder::{binary_array, primitive_array, utf8_array, FixedSizeBinaryBuilder};
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn ctx() -> FunctionContext { FunctionContext::new(SystemPool::shared()) }

    /// An array whose null slots hold the given (arbitrary) values.
    fn with_validity<T: crate::native::NativeType>(data_type: DataType, values: &[T], valid: &[bool], ctx: &FunctionContext) -> ArrayData {
        let values = Buffer::from_slice(values, ctx.pool()).unwrap();
        let mut bits = BitmapBuilder::new(ctx.pool());
        for bit in valid {
            bits.push(*bit).unwrap();
        }
        let validity = bits.finish();
        ArrayData::try_new(data_type, valid.len(), 0, Some(validity), vec![values]).unwrap()
    }

    #[test]
    fn same_type_is_zero_copy() {
        let ctx = ctx();
        let input = primitive_array(DataType::Int32, &[Some(0), None, Some(2), Some(3), Some(4)], ctx.pool()).unwrap();
        let output = cast(&ctx, &input, &DataType::Int32, &CastOptions::default()).unwrap();
        assert_eq!(output, input);
        assert_eq!(output.validity().unwrap().as_ptr(), input.validity().unwrap().as_ptr());
        assert_eq!(output.buffer(0).as_ptr(), input.buffer(0).as_ptr());
    }

    #[test]
    fn downcast_overflow_rejected() {
        let ctx = ctx();
        let input = primitive_array(DataType::Int32, &[Some(0), None, Some(2000), Some(70000), Some(0)], ctx.pool()).unwrap();
        let err = cast(&ctx, &input, &DataType::Int16, &CastOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let wrapped = cast(&ctx, &input, &DataType::Int16, &CastOptions { allow_int_overflow: true, ..CastOptions::default() }).unwrap();
        assert_eq!(wrapped.values::<i16>()[3], 70000i32 as i16);
    }

    #[test]
    fn downcast_overflow_in_null_slot_ignored() {
        let ctx = ctx();
        let input = with_validity(DataType::Int32, &[0i32, 70000, 2000, 1000, 0], &[true, false, true, true, true], &ctx);
        let output = cast(&ctx, &input, &DataType::Int16, &CastOptions::default()).unwrap();
        let expected = primitive_array(DataType::Int16, &[Some(0i16), None, Some(2000), Some(1000), Some(0)], ctx.pool()).unwrap();
        assert_eq!(output, expected);
        // Validity is shared with the input.
        assert!(output.validity().unwrap().ptr_eq(input.validity().unwrap()));
    }

    #[test]
    fn timestamp_coarsening() {
        let ctx = ctx();
        let ms = DataType::Timestamp(TimeUnit::Millisecond);
        let s = DataType::Timestamp(TimeUnit::Second);
        let input = primitive_array(ms, &[Some(0i64), None, Some(100123), Some(200456), Some(1123), Some(2456)], ctx.pool()).unwrap();

        let truncate = CastOptions { allow_time_truncate: true, ..CastOptions::default() };
        let output = cast(&ctx, &input, &s, &truncate).unwrap();
        let expected = primitive_array(s.clone(), &[Some(0i64), None, Some(100), Some(200), Some(1), Some(2)], ctx.pool()).unwrap();
        assert_eq!(output, expected);

        let err = cast(&ctx, &input, &s, &CastOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn timestamp_refinement_multiplies() {
        let ctx = ctx();
        let input = primitive_array(DataType::Timestamp(TimeUnit::Second), &[Some(1i64), None, Some(-3)], ctx.pool()).unwrap();
        let output = cast(&ctx, &input, &DataType::Timestamp(TimeUnit::Microsecond), &CastOptions::default()).unwrap();
        assert_eq!(output.values::<i64>()[0], 1_000_000);
        assert_eq!(output.values::<i64>()[2], -3_000_000);
        assert!(output.is_null(1));

        let huge = primitive_array(DataType::Timestamp(TimeUnit::Second), &[Some(i64::MAX / 10)], ctx.pool()).unwrap();
        let err = cast(&ctx, &huge, &DataType::Timestamp(TimeUnit::Nanosecond), &CastOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn time_widths_and_units() {
        let ctx = ctx();
        let input = primitive_array(DataType::Time32(TimeUnit::Millisecond), &[Some(1500i32), None], ctx.pool()).unwrap();
        let output = cast(&ctx, &input, &DataType::Time64(TimeUnit::Microsecond), &CastOptions::default()).unwrap();
        assert_eq!(output.data_type(), &DataType::Time64(TimeUnit::Microsecond));
        assert_eq!(output.values::<i64>()[0], 1_500_000);

        let back = cast(&ctx, &output, &DataType::Time32(TimeUnit::Second), &CastOptions::permissive()).unwrap();
        assert_eq!(back.values::<i32>()[0], 1);
        assert!(cast(&ctx, &output, &DataType::Time32(TimeUnit::Second), &CastOptions::default()).is_err());
    }

    #[test]
    fn timestamp_to_date32_exact_days() {
        let ctx = ctx();
        let s = DataType::Timestamp(TimeUnit::Second);
        let input = with_validity(s.clone(), &[946684800i64, 946771200, 0], &[true, true, false], &ctx);
        let output = cast(&ctx, &input, &DataType::Date32, &CastOptions::default()).unwrap();
        assert_eq!(output.values::<i32>(), &[10957, 10958, 0]);
        assert!(output.is_valid(0) && output.is_valid(1) && output.is_null(2));

        let off_by_one = with_validity(s, &[946684801i64, 946771200, 0], &[true, true, false], &ctx);
        let err = cast(&ctx, &off_by_one, &DataType::Date32, &CastOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn timestamp_to_date64() {
        let ctx = ctx();
        let input = primitive_array(DataType::Timestamp(TimeUnit::Millisecond), &[Some(86_400_000i64 * 2 + 5)], ctx.pool()).unwrap();
        assert!(cast(&ctx, &input, &DataType::Date64, &CastOptions::default()).is_err());
        let truncate = CastOptions { allow_time_truncate: true, ..CastOptions::default() };
        let output = cast(&ctx, &input, &DataType::Date64, &truncate).unwrap();
        assert_eq!(output.values::<i64>(), &[86_400_000 * 2]);
    }

    #[test]
    fn dates() {
        let ctx = ctx();
        let days = primitive_array(DataType::Date32, &[Some(1i32), None, Some(-2)], ctx.pool()).unwrap();
        let millis = cast(&ctx, &days, &DataType::Date64, &CastOptions::default()).unwrap();
        assert_eq!(millis.values::<i64>()[0], 86_400_000);
        assert_eq!(millis.values::<i64>()[2], -172_800_000);
        let round = cast(&ctx, &millis, &DataType::Date32, &CastOptions::default()).unwrap();
        assert_eq!(round, days);

        let partial = primitive_array(DataType::Date64, &[Some(86_400_001i64)], ctx.pool()).unwrap();
        assert!(cast(&ctx, &partial, &DataType::Date32, &CastOptions::default()).is_err());
    }

    #[test]
    fn integer_temporal_zero_copy() {
        let ctx = ctx();
        let input = primitive_array(DataType::Int64, &[Some(5i64), None], ctx.pool()).unwrap();
        let output = cast(&ctx, &input, &DataType::Timestamp(TimeUnit::Nanosecond), &CastOptions::default()).unwrap();
        assert!(output.buffer(0).ptr_eq(input.buffer(0)));
        let back = cast(&ctx, &output, &DataType::Int64, &CastOptions::default()).unwrap();
        assert_eq!(back, input);

        let int32 = primitive_array(DataType::Int32, &[Some(7i32)], ctx.pool()).unwrap();
        let date = cast(&ctx, &int32, &DataType::Date32, &CastOptions::default()).unwrap();
        assert!(date.buffer(0).ptr_eq(int32.buffer(0)));
    }

    #[test]
    fn floats_to_integers() {
        let ctx = ctx();
        let input = primitive_array(DataType::Float64, &[Some(1.5f64), None, Some(-2.7)], ctx.pool()).unwrap();
        let output = cast(&ctx, &input, &DataType::Int32, &CastOptions::default()).unwrap();
        assert_eq!(output.values::<i32>()[0], 1);
        assert_eq!(output.values::<i32>()[2], -2);

        let err = cast(&ctx, &input, &DataType::Int32, &CastOptions::safe()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let large = primitive_array(DataType::Float32, &[Some(300.0f32)], ctx.pool()).unwrap();
        assert!(cast(&ctx, &large, &DataType::UInt8, &CastOptions::default()).is_err());
        let nan = primitive_array(DataType::Float64, &[Some(f64::NAN)], ctx.pool()).unwrap();
        assert!(cast(&ctx, &nan, &DataType::Int64, &CastOptions::default()).is_err());
        let edge = primitive_array(DataType::Float64, &[Some(9_223_372_036_854_775_808.0f64)], ctx.pool()).unwrap();
        assert!(cast(&ctx, &edge, &DataType::Int64, &CastOptions::default()).is_err());
    }

    #[test]
    fn numbers_to_floats() {
        let ctx = ctx();
        let input = primitive_array(DataType::Int64, &[Some(-3i64), Some(1 << 40)], ctx.pool()).unwrap();
        let output = cast(&ctx, &input, &DataType::Float64, &CastOptions::default()).unwrap();
        assert_eq!(output.values::<f64>(), &[-3.0, (1u64 << 40) as f64]);

        let halves = cast(&ctx, &output, &DataType::Float16, &CastOptions::default()).unwrap();
        assert_eq!(halves.values::<half::f16>()[0], half::f16::from_f32(-3.0));
    }

    #[test]
    fn booleans_and_numbers() {
        let ctx = ctx();
        let floats = primitive_array(DataType::Float32, &[Some(0.0f32), Some(f32::NAN), None, Some(-0.5)], ctx.pool()).unwrap();
        let bools = cast(&ctx, &floats, &DataType::Boolean, &CastOptions::default()).unwrap();
        assert!(!bools.bool_value(0) && bools.bool_value(1) && bools.bool_value(3));
        assert!(bools.is_null(2));

        let ints = cast(&ctx, &bools, &DataType::UInt16, &CastOptions::default()).unwrap();
        assert_eq!(ints.values::<u16>()[.. 2], [0, 1]);
        assert_eq!(ints.values::<u16>()[3], 1);
    }

    #[test]
    fn null_to_anything() {
        let ctx = ctx();
        let nulls = ArrayData::new_null(DataType::Null, 4, ctx.pool()).unwrap();
        for to in [DataType::Int8, DataType::Utf8, DataType::Boolean, DataType::FixedSizeBinary(3)] {
            let output = cast(&ctx, &nulls, &to, &CastOptions::default()).unwrap();
            assert_eq!(output.data_type(), &to);
            assert_eq!(output.len(), 4);
            assert_eq!(output.null_count(), 4);
        }
    }

    #[test]
    fn unsupported_pairs() {
        let ctx = ctx();
        let err = get_cast_function(&ctx, &DataType::Utf8, &DataType::Int32, &CastOptions::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
        let err = get_cast_function(&ctx, &DataType::Date32, &DataType::Timestamp(TimeUnit::Second), &CastOptions::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn mismatched_input_is_type_error() {
        let ctx = ctx();
        let kernel = get_cast_function(&ctx, &DataType::Int32, &DataType::Int64, &CastOptions::default()).unwrap();
        let input = primitive_array(DataType::Int16, &[Some(1i16)], ctx.pool()).unwrap();
        let mut out = ArrayData::new_null(DataType::Null, 0, ctx.pool()).unwrap();
        assert_eq!(kernel.call(&input, &mut out).unwrap_err().kind(), ErrorKind::TypeError);

        let short = Buffer::from_slice(&[1i16, 2], ctx.pool()).unwrap();
        let lying = ArrayData { data_type: DataType::Int32, len: 2, offset: 0, null_count: 0, validity: None, buffers: vec![short] };
        assert_eq!(kernel.call(&lying, &mut out).unwrap_err().kind(), ErrorKind::TypeError);
    }

    #[test]
    fn preallocated_output_keeps_address() {
        let ctx = ctx();
        let input = primitive_array(DataType::Int8, &[Some(1i8), None, Some(-1)], ctx.pool()).unwrap();
        let kernel = get_cast_function(&ctx, &DataType::Int8, &DataType::Int64, &CastOptions::default()).unwrap();
        let values = MutableBuffer::zeroed(3 * 8, ctx.pool()).unwrap().freeze();
        let address = values.as_ptr();
        let mut out = ArrayData::try_new(DataType::Int64, 3, 0, None, vec![values]).unwrap();
        kernel.call(&input, &mut out).unwrap();
        assert_eq!(out.buffer(0).as_ptr(), address);
        assert_eq!(out.values::<i64>()[2], -1);
        assert!(out.is_null(1));
    }

    #[test]
    fn preallocated_output_is_never_replaced() {
        let ctx = ctx();
        let input = primitive_array(DataType::Int32, &[Some(0i32), None, Some(2000)], ctx.pool()).unwrap();
        let kernel = get_cast_function(&ctx, &DataType::Int32, &DataType::Int64, &CastOptions::default()).unwrap();

        let values = MutableBuffer::zeroed(3 * 8, ctx.pool()).unwrap().freeze();
        let held = values.clone();
        let mut out = ArrayData::try_new(DataType::Int64, 3, 0, None, vec![values]).unwrap();
        assert_eq!(kernel.call(&input, &mut out).unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(out.buffer(0).as_ptr(), held.as_ptr());
        assert_eq!(held.typed_data::<i64>(), &[0, 0, 0]);

        let address = held.as_ptr();
        drop(held);
        kernel.call(&input, &mut out).unwrap();
        assert_eq!(out.buffer(0).as_ptr(), address);
        assert_eq!(out.values::<i64>()[2], 2000);

        let small = MutableBuffer::zeroed(8, ctx.pool()).unwrap().freeze();
        let address = small.as_ptr();
        let mut out = ArrayData::try_new(DataType::Int64, 1, 0, None, vec![small]).unwrap();
        assert_eq!(kernel.call(&input, &mut out).unwrap_err().kind(), ErrorKind::Capacity);
        assert_eq!(out.buffer(0).as_ptr(), address);
    }

    #[test]
    fn failed_call_leaves_output_untouched() {
        let ctx = ctx();
        let input = primitive_array(DataType::Int32, &[Some(1i32), Some(1 << 20)], ctx.pool()).unwrap();
        let kernel = get_cast_function(&ctx, &DataType::Int32, &DataType::Int8, &CastOptions::default()).unwrap();
        let values = Buffer::from_slice(&[7i8, 7], ctx.pool()).unwrap();
        let mut out = ArrayData::try_new(DataType::Int8, 2, 0, None, vec![values]).unwrap();
        assert!(kernel.call(&input, &mut out).is_err());
        assert_eq!(out.values::<i8>(), &[7, 7]);
    }

    #[test]
    fn sliced_input_keeps_offset() {
        let ctx = ctx();
        let input = primitive_array(DataType::UInt32, &[Some(1u32), Some(u32::MAX), None, Some(4)], ctx.pool()).unwrap();
        let sliced = input.slice(2, 2);
        let output = cast(&ctx, &sliced, &DataType::UInt8, &CastOptions::default()).unwrap();
        assert_eq!(output.offset(), 2);
        assert!(output.is_null(0));
        assert_eq!(output.values::<u8>()[1], 4);
    }

    #[test]
    fn dictionary_to_dense() {
        let ctx = ctx();
        let values = Arc::new(utf8_array(&[Some("a"), Some("bc"), None], ctx.pool()).unwrap());
        let data_type = DataType::Dictionary(Box::new(DataType::Int16), values);
        let indices = with_validity(data_type, &[1i16, 0, 2, 9], &[true, true, true, false], &ctx);
        let output = cast(&ctx, &indices, &DataType::Utf8, &CastOptions::default()).unwrap();
        let expected = utf8_array(&[Some("bc"), Some("a"), None, None], ctx.pool()).unwrap();
        assert_eq!(output, expected);

        let values = Arc::new(primitive_array(DataType::Float64, &[Some(0.5f64), Some(1.5)], ctx.pool()).unwrap());
        let data_type = DataType::Dictionary(Box::new(DataType::UInt8), values);
        let indices = ArrayData::try_new(data_type, 3, 0, None, vec![Buffer::from_slice(&[1u8, 1, 0], ctx.pool()).unwrap()]).unwrap();
        let output = cast(&ctx, &indices, &DataType::Float64, &CastOptions::default()).unwrap();
        assert_eq!(output.values::<f64>(), &[1.5, 1.5, 0.5]);

        let mut builder = FixedSizeBinaryBuilder::new(DataType::FixedSizeBinary(2), ctx.pool());
        builder.append_value(b"xy").unwrap();
        let values = Arc::new(builder.finish().unwrap());
        let bad = ArrayData {
            data_type: DataType::Dictionary(Box::new(DataType::Int32), values),
            len: 1,
            offset: 0,
            null_count: 0,
            validity: None,
            buffers: vec![Buffer::from_slice(&[3i32], ctx.pool()).unwrap()],
        };
        assert_eq!(cast(&ctx, &bad, &DataType::FixedSizeBinary(2), &CastOptions::default()).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn identity_for_variable_and_decimal() {
        let ctx = ctx();
        let input = binary_array(DataType::Binary, &[Some(b"x".as_slice()), None], ctx.pool()).unwrap();
        let output = cast(&ctx, &input, &DataType::Binary, &CastOptions::default()).unwrap();
        assert!(output.buffer(1).ptr_eq(input.buffer(1)));
        let decimal = ArrayData::new_null(DataType::Decimal128(10, 2), 2, ctx.pool()).unwrap();
        assert!(cast(&ctx, &decimal, &DataType::Decimal128(10, 2), &CastOptions::default()).is_ok());
        assert!(cast(&ctx, &decimal, &DataType::Decimal128(12, 2), &CastOptions::default()).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn options_reject_unknown_fields() {
        let options: CastOptions = serde_json::from_str(r#"{"allow_int_overflow": true}"#).unwrap();
        assert_eq!(options, CastOptions { allow_int_overflow: true, ..CastOptions::default() });
        assert!(serde_json::from_str::<CastOptions>(r#"{"allow_overflow": true}"#).is_err());
    }

    proptest! {
        #[test]
        fn narrowing_succeeds_iff_values_fit(values in prop::collection::vec(any::<i32>(), 0 .. 64), valid in prop::collection::vec(any::<bool>(), 64), noise in any::<i32>()) {
            let ctx = ctx();
            let valid = &valid[.. values.len()];
            let input = with_validity(DataType::Int32, &values, valid, &ctx);
            // The same valid values with different garbage in the null slots.
            let scrambled = values.iter().zip(valid).map(|(v, ok)| if *ok { *v } else { noise }).collect::<Vec<_>>();
            let other = with_validity(DataType::Int32, &scrambled, valid, &ctx);

            let fits = values.iter().zip(valid).all(|(v, ok)| !*ok || i16::try_from(*v).is_ok());
            let result = cast(&ctx, &input, &DataType::Int16, &CastOptions::default());
            let other_result = cast(&ctx, &other, &DataType::Int16, &CastOptions::default());
            prop_assert_eq!(result.is_ok(), fits);
            prop_assert_eq!(other_result.is_ok(), fits);
            if let (Ok(output), Ok(other_output)) = (result, other_result) {
                prop_assert_eq!(&output, &other_output);
                prop_assert_eq!(output.len(), input.len());
                let back = cast(&ctx, &output, &DataType::Int32, &CastOptions::default()).unwrap();
                prop_assert_eq!(back, input);
            }
        }

        #[test]
        fn casts_preserve_nulls(values in prop::collection::vec(any::<i16>(), 0 .. 64), valid in prop::collection::vec(any::<bool>(), 64)) {
            let ctx = ctx();
            let input = with_validity(DataType::Int16, &values, &valid[.. values.len()], &ctx);
            for to in [DataType::Int64, DataType::Float32, DataType::Boolean, DataType::Int16] {
                let output = cast(&ctx, &input, &to, &CastOptions::default()).unwrap();
                prop_assert_eq!(output.len(), input.len());
                for index in 0 .. input.len() {
                    prop_assert_eq!(output.is_null(index), input.is_null(index));
                }
            }
        }

        #[test]
        fn timestamp_division_exactness(values in prop::collection::vec(-1_000_000i64 .. 1_000_000, 1 .. 32)) {
            let ctx = ctx();
            let input = primitive_array(DataType::Timestamp(TimeUnit::Microsecond), &values.iter().map(|v| Some(*v)).collect::<Vec<_>>(), ctx.pool()).unwrap();
            let exact = values.iter().all(|v| v % 1000 == 0);
            let result = cast(&ctx, &input, &DataType::Timestamp(TimeUnit::Millisecond), &CastOptions::default());
            prop_assert_eq!(result.is_ok(), exact);
            let coarse = cast(&ctx, &input, &DataType::Timestamp(TimeUnit::Millisecond), &CastOptions::permissive()).unwrap();
            let finer = cast(&ctx, &coarse, &DataType::Timestamp(TimeUnit::Microsecond), &CastOptions::default()).unwrap();
            for (index, value) in values.iter().enumerate() {
                prop_assert_eq!(coarse.values::<i64>()[index], value / 1000);
                prop_assert_eq!(finer.values::<i64>()[index], value / 1000 * 1000);
            }
        }
    }
}
