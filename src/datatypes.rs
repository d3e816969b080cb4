//! Logical element types and their physical layouts.

use std::fmt;
use std::sync::Arc;

use crate::array::ArrayData;

/// Granularity of a temporal value.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl TimeUnit {
    /// Units of `self` in one second.
    pub fn per_second(&self) -> i64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Millisecond => 1_000,
            TimeUnit::Microsecond => 1_000_000,
            TimeUnit::Nanosecond => 1_000_000_000,
        }
    }
    fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Second => "s",
            TimeUnit::Millisecond => "ms",
            TimeUnit::Microsecond => "us",
            TimeUnit::Nanosecond => "ns",
        }
    }
}

/// The closed universe of element types.
///
/// A dictionary type carries its values array, so two dictionary types are equal
/// only when their index types and dictionaries are equal.
#[derive(Clone, Debug, PartialEq)]
pub enum DataType {
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    /// Days since the epoch.
    Date32,
    /// Milliseconds since the epoch, a whole number of days.
    Date64,
    /// Time of day in seconds or milliseconds.
    Time32(TimeUnit),
    /// Time of day in microseconds or nanoseconds.
    Time64(TimeUnit),
    Timestamp(TimeUnit),
    Binary,
    Utf8,
    FixedSizeBinary(i32),
    Decimal128(u8, i8),
    Dictionary(Box<DataType>, Arc<ArrayData>),
}

/// How the values of a type are laid out in buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// No buffers; every slot is null.
    Null,
    /// One bit per slot.
    Bitmap,
    /// One buffer of `width` bytes per slot.
    FixedWidth(usize),
    /// An `i32` offsets buffer of `len + 1` entries and a data buffer.
    VariableBinary,
}

impl DataType {
    pub fn layout(&self) -> Layout {
        use DataType::*;
        match self {
            Null => Layout::Null,
            Boolean => Layout::Bitmap,
            Int8 | UInt8 => Layout::FixedWidth(1),
            Int16 | UInt16 | Float16 => Layout::FixedWidth(2),
            Int32 | UInt32 | Float32 | Date32 | Time32(_) => Layout::FixedWidth(4),
            Int64 | UInt64 | Float64 | Date64 | Time64(_) | Timestamp(_) => Layout::FixedWidth(8),
            Binary | Utf8 => Layout::VariableBinary,
            FixedSizeBinary(width) => Layout::FixedWidth(*width as usize),
            Decimal128(_, _) => Layout::FixedWidth(16),
            Dictionary(index, _) => index.layout(),
        }
    }

    /// Bytes per slot for fixed-width layouts.
    pub fn byte_width(&self) -> Option<usize> {
        match self.layout() {
            Layout::FixedWidth(width) => Some(width),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        use DataType::*;
        matches!(self, Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64)
    }
    pub fn is_signed_integer(&self) -> bool {
        use DataType::*;
        matches!(self, Int8 | Int16 | Int32 | Int64)
    }
    pub fn is_floating(&self) -> bool {
        matches!(self, DataType::Float16 | DataType::Float32 | DataType::Float64)
    }
    pub fn is_numeric(&self) -> bool { self.is_integer() || self.is_floating() }
    pub fn is_temporal(&self) -> bool {
        use DataType::*;
        matches!(self, Date32 | Date64 | Time32(_) | Time64(_) | Timestamp(_))
    }
    pub fn is_dictionary(&self) -> bool { matches!(self, DataType::Dictionary(_, _)) }

    /// The values array of a dictionary type.
    pub fn dictionary(&self) -> Option<&Arc<ArrayData>> {
        match self {
            DataType::Dictionary(_, values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DataType::*;
        match self {
            Null => write!(f, "null"),
            Boolean => write!(f, "bool"),
            Int8 => write!(f, "int8"),
            Int16 => write!(f, "int16"),
            Int32 => write!(f, "int32"),
            Int64 => write!(f, "int64"),
            UInt8 => write!(f, "uint8"),
            UInt16 => write!(f, "uint16"),
            UInt32 => write!(f, "uint32"),
            UInt64 => write!(f, "uint64"),
            Float16 => write!(f, "halffloat"),
            Float32 => write!(f, "float"),
            Float64 => write!(f, "double"),
            Date32 => write!(f, "date32[day]"),
            Date64 => write!(f, "date64[ms]"),
            Time32(unit) => write!(f, "time32[{}]", unit.suffix()),
            Time64(unit) => write!(f, "time64[{}]", unit.suffix()),
            Timestamp(unit) => write!(f, "timestamp[{}]", unit.suffix()),
            Binary => write!(f, "binary"),
            Utf8 => write!(f, "string"),
            FixedSizeBinary(width) => write!(f, "fixed_size_binary[{}]", width),
            Decimal128(precision, scale) => write!(f, "decimal({}, {})", precision, scale),
            Dictionary(index, values) => write!(f, "dictionary<values={}, indices={}>", values.data_type(), index),
        }
    }
}

/// A named, typed column slot, as referenced by stream dictionary bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self { name: name.into(), data_type, nullable }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn layouts() {
        assert_eq!(DataType::Timestamp(TimeUnit::Nanosecond).byte_width(), Some(8));
        assert_eq!(DataType::Time32(TimeUnit::Second).byte_width(), Some(4));
        assert_eq!(DataType::Decimal128(38, 2).byte_width(), Some(16));
        assert_eq!(DataType::Utf8.layout(), Layout::VariableBinary);
        assert_eq!(DataType::Boolean.byte_width(), None);
    }

    #[test]
    fn display() {
        assert_eq!(DataType::Timestamp(TimeUnit::Millisecond).to_string(), "timestamp[ms]");
        assert_eq!(DataType::FixedSizeBinary(3).to_string(), "fixed_size_binary[3]");
    }
}
