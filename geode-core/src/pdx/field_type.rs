//! PDX field type tags.

use crate::error::{GeodeError, Result};
use crate::serialization::Value;

/// Supported field types in PDX serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PdxFieldType {
    /// Boolean value.
    Boolean = 0,
    /// Signed 8-bit integer.
    Byte = 1,
    /// 16-bit UTF-16 character.
    Char = 2,
    /// Signed 16-bit integer.
    Short = 3,
    /// Signed 32-bit integer.
    Int = 4,
    /// Signed 64-bit integer.
    Long = 5,
    /// 32-bit floating point.
    Float = 6,
    /// 64-bit floating point.
    Double = 7,
    /// Date stored as epoch milliseconds.
    Date = 8,
    /// Tagged string.
    String = 9,
    /// Any tagged object, including nested PDX objects.
    Object = 10,
    /// Array of booleans.
    BooleanArray = 11,
    /// Array of chars.
    CharArray = 12,
    /// Array of bytes.
    ByteArray = 13,
    /// Array of shorts.
    ShortArray = 14,
    /// Array of ints.
    IntArray = 15,
    /// Array of longs.
    LongArray = 16,
    /// Array of floats.
    FloatArray = 17,
    /// Array of doubles.
    DoubleArray = 18,
    /// Array of strings.
    StringArray = 19,
    /// Array of tagged objects.
    ObjectArray = 20,
    /// Array of byte arrays.
    ArrayOfByteArrays = 21,
}

impl PdxFieldType {
    /// Creates a field type from its wire representation.
    pub fn from_id(id: u8) -> Result<Self> {
        let ty = match id {
            0 => Self::Boolean,
            1 => Self::Byte,
            2 => Self::Char,
            3 => Self::Short,
            4 => Self::Int,
            5 => Self::Long,
            6 => Self::Float,
            7 => Self::Double,
            8 => Self::Date,
            9 => Self::String,
            10 => Self::Object,
            11 => Self::BooleanArray,
            12 => Self::CharArray,
            13 => Self::ByteArray,
            14 => Self::ShortArray,
            15 => Self::IntArray,
            16 => Self::LongArray,
            17 => Self::FloatArray,
            18 => Self::DoubleArray,
            19 => Self::StringArray,
            20 => Self::ObjectArray,
            21 => Self::ArrayOfByteArrays,
            _ => {
                return Err(GeodeError::Serialization(format!(
                    "unknown PDX field type id: {}",
                    id
                )))
            }
        };
        Ok(ty)
    }

    /// Returns the wire representation of this field type.
    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Returns the encoded width of fixed-size types, `None` for variable-length ones.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Byte => Some(1),
            Self::Char | Self::Short => Some(2),
            Self::Int | Self::Float => Some(4),
            Self::Long | Self::Double | Self::Date => Some(8),
            _ => None,
        }
    }

    /// Returns true if the field's encoded width depends on its value.
    pub fn is_variable_length(&self) -> bool {
        self.fixed_size().is_none()
    }

    /// Returns the value a reader substitutes when the field is absent.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Boolean => Value::Bool(false),
            Self::Byte => Value::Byte(0),
            Self::Char => Value::Char('\0'),
            Self::Short => Value::Short(0),
            Self::Int => Value::Int(0),
            Self::Long => Value::Long(0),
            Self::Float => Value::Float(0.0),
            Self::Double => Value::Double(0.0),
            _ => Value::Null,
        }
    }
}
