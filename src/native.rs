//! Rust types that back fixed-width primitive columns.
//!
//! Every native type is `bytemuck::Pod`, so buffers can be viewed as typed slices
//! without copying, and so memo tables can hash and compare the raw bytes.

use half::f16;

/// A fixed-width element type that can live in a [`Buffer`](crate::buffer::Buffer).
pub trait NativeType: bytemuck::Pod + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Conversions used by element-wise casts between numeric types.
///
/// Integer conversions travel through `i128`, which holds every value of every
/// supported integer type, so range checks are exact comparisons.
pub trait Numeric: NativeType {
    const IS_FLOAT: bool;
    /// The smallest and largest representable integers (unused for floats).
    const MIN_I128: i128;
    const MAX_I128: i128;

    /// Integers widen exactly; floats truncate toward zero, saturating.
    fn as_i128(self) -> i128;
    fn as_f64(self) -> f64;
    /// Two's-complement truncation for integers; nearest value for floats.
    fn wrap_i128(value: i128) -> Self;
    /// Truncation toward zero, saturating at the bounds, for integers.
    fn from_f64(value: f64) -> Self;
    fn is_zero(self) -> bool;
    fn one() -> Self;
}

macro_rules! implement_integer {
    ($($t:ty),*) => { $(
        impl NativeType for $t {
            const NAME: &'static str = stringify!($t);
        }
        impl Numeric for $t {
            const IS_FLOAT: bool = false;
            const MIN_I128: i128 = <$t>::MIN as i128;
            const MAX_I128: i128 = <$t>::MAX as i128;
            #[inline(always)] fn as_i128(self) -> i128 { self as i128 }
            #[inline(always)] fn as_f64(self) -> f64 { self as f64 }
            #[inline(always)] fn wrap_i128(value: i128) -> Self { value as $t }
            #[inline(always)] fn from_f64(value: f64) -> Self { value as $t }
            #[inline(always)] fn is_zero(self) -> bool { self == 0 }
            #[inline(always)] fn one() -> Self { 1 }
        }
    )* }
}

implement_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! implement_float {
    ($($t:ty),*) => { $(
        impl NativeType for $t {
            const NAME: &'static str = stringify!($t);
        }
        impl Numeric for $t {
            const IS_FLOAT: bool = true;
            const MIN_I128: i128 = i128::MIN;
            const MAX_I128: i128 = i128::MAX;
            #[inline(always)] fn as_i128(self) -> i128 { self as i128 }
            #[inline(always)] fn as_f64(self) -> f64 { self as f64 }
            #[inline(always)] fn wrap_i128(value: i128) -> Self { value as $t }
            #[inline(always)] fn from_f64(value: f64) -> Self { value as $t }
            #[inline(always)] fn is_zero(self) -> bool { self == 0.0 }
            #[inline(always)] fn one() -> Self { 1.0 }
        }
    )* }
}

implement_float!(f32, f64);

impl NativeType for f16 {
    const NAME: &'static str = "f16";
}

impl Numeric for f16 {
    const IS_FLOAT: bool = true;
    const MIN_I128: i128 = i128::MIN;
    const MAX_I128: i128 = i128::MAX;
    #[inline(always)] fn as_i128(self) -> i128 { self.to_f64() as i128 }
    #[inline(always)] fn as_f64(self) -> f64 { self.to_f64() }
    #[inline(always)] fn wrap_i128(value: i128) -> Self { f16::from_f64(value as f64) }
    #[inline(always)] fn from_f64(value: f64) -> Self { f16::from_f64(value) }
    #[inline(always)] fn is_zero(self) -> bool { self.to_f64() == 0.0 }
    #[inline(always)] fn one() -> Self { f16::ONE }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn integer_wrapping() {
        assert_eq!(i16::wrap_i128(70000), 4464);
        assert_eq!(u8::wrap_i128(-1), 255);
        assert_eq!(i8::MIN_I128, -128);
        assert_eq!(u64::MAX_I128, u64::MAX as i128);
    }

    #[test]
    fn float_conversions() {
        assert_eq!(i32::from_f64(-1.9), -1);
        assert_eq!(u8::from_f64(300.0), 255);
        assert!(!f64::NAN.is_zero());
        assert!((-0.0f32).is_zero());
        assert_eq!(f16::from_f64(2.5).as_f64(), 2.5);
    }
}
