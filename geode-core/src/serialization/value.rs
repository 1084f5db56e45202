//! Dynamically typed cacheable values and the tagged object codec.

use super::{ds_code, DataInput, DataOutput};
use crate::error::{GeodeError, Result};
use crate::pdx::PdxInstance;
use chrono::{DateTime, Utc};

const OBJECT_ARRAY_ELEMENT_CLASS: &str = "java.lang.Object";

/// A value that can travel through `write_object`/`read_object`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null reference.
    Null,
    /// Boolean.
    Bool(bool),
    /// Single UTF-16 character.
    Char(char),
    /// Signed byte.
    Byte(i8),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Date with millisecond precision.
    Date(DateTime<Utc>),
    /// String.
    String(String),
    /// Byte array.
    ByteArray(Vec<u8>),
    /// Boolean array.
    BoolArray(Vec<bool>),
    /// Char array.
    CharArray(Vec<char>),
    /// Short array.
    ShortArray(Vec<i16>),
    /// Int array.
    IntArray(Vec<i32>),
    /// Long array.
    LongArray(Vec<i64>),
    /// Float array.
    FloatArray(Vec<f32>),
    /// Double array.
    DoubleArray(Vec<f64>),
    /// String array.
    StringArray(Vec<String>),
    /// Array of byte arrays.
    ArrayOfByteArrays(Vec<Vec<u8>>),
    /// Heterogeneous object array.
    ObjectArray(Vec<Value>),
    /// Ordered list.
    List(Vec<Value>),
    /// Nested PDX object kept in serialized form.
    Pdx(PdxInstance),
}

impl Value {
    /// Returns the type tag written before this value.
    pub fn ds_code(&self) -> u8 {
        match self {
            Value::Null => ds_code::NULL_OBJ,
            Value::Bool(_) => ds_code::BOOLEAN,
            Value::Char(_) => ds_code::CHARACTER,
            Value::Byte(_) => ds_code::BYTE,
            Value::Short(_) => ds_code::SHORT,
            Value::Int(_) => ds_code::INTEGER,
            Value::Long(_) => ds_code::LONG,
            Value::Float(_) => ds_code::FLOAT,
            Value::Double(_) => ds_code::DOUBLE,
            Value::Date(_) => ds_code::DATE,
            Value::String(s) if s.is_ascii() => ds_code::ASCII_STRING,
            Value::String(_) => ds_code::STRING,
            Value::ByteArray(_) => ds_code::BYTE_ARRAY,
            Value::BoolArray(_) => ds_code::BOOLEAN_ARRAY,
            Value::CharArray(_) => ds_code::CHAR_ARRAY,
            Value::ShortArray(_) => ds_code::SHORT_ARRAY,
            Value::IntArray(_) => ds_code::INT_ARRAY,
            Value::LongArray(_) => ds_code::LONG_ARRAY,
            Value::FloatArray(_) => ds_code::FLOAT_ARRAY,
            Value::DoubleArray(_) => ds_code::DOUBLE_ARRAY,
            Value::StringArray(_) => ds_code::STRING_ARRAY,
            Value::ArrayOfByteArrays(_) => ds_code::ARRAY_OF_BYTE_ARRAYS,
            Value::ObjectArray(_) => ds_code::OBJECT_ARRAY,
            Value::List(_) => ds_code::ARRAY_LIST,
            Value::Pdx(_) => ds_code::PDX,
        }
    }

    /// Returns true for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the contained int, if this is an `Int`.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained long, if this is a `Long`.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained string slice, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested PDX instance, if this is a `Pdx`.
    pub fn as_pdx(&self) -> Option<&PdxInstance> {
        match self {
            Value::Pdx(p) => Some(p),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    char => Char,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<u8> => ByteArray,
    Vec<bool> => BoolArray,
    Vec<char> => CharArray,
    Vec<i16> => ShortArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Vec<f32> => FloatArray,
    Vec<f64> => DoubleArray,
    Vec<String> => StringArray,
    Vec<Vec<u8>> => ArrayOfByteArrays,
    DateTime<Utc> => Date,
    PdxInstance => Pdx,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Converts wire milliseconds to a date.
pub fn date_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| GeodeError::Serialization(format!("date out of range: {} ms", millis)))
}

/// Reads one tagged object.
pub fn read_object<R: DataInput + ?Sized>(input: &mut R) -> Result<Value> {
    let code = input.read_ubyte()?;
    read_object_body(input, code)
}

fn nullable<T>(v: Option<T>, wrap: fn(T) -> Value) -> Value {
    v.map(wrap).unwrap_or(Value::Null)
}

/// Reads the body of an object whose tag has already been consumed.
pub fn read_object_body<R: DataInput + ?Sized>(input: &mut R, code: u8) -> Result<Value> {
    let value = match code {
        ds_code::NULL_OBJ => Value::Null,
        ds_code::BOOLEAN => Value::Bool(input.read_bool()?),
        ds_code::CHARACTER => Value::Char(input.read_char()?),
        ds_code::BYTE => Value::Byte(input.read_byte()?),
        ds_code::SHORT => Value::Short(input.read_short()?),
        ds_code::INTEGER => Value::Int(input.read_int()?),
        ds_code::LONG => Value::Long(input.read_long()?),
        ds_code::FLOAT => Value::Float(input.read_float()?),
        ds_code::DOUBLE => Value::Double(input.read_double()?),
        ds_code::DATE => Value::Date(date_from_millis(input.read_long()?)?),
        c if ds_code::is_string_code(c) => nullable(input.read_string_body(c)?, Value::String),
        ds_code::BYTE_ARRAY => nullable(input.read_byte_array()?, Value::ByteArray),
        ds_code::BOOLEAN_ARRAY => nullable(input.read_bool_array()?, Value::BoolArray),
        ds_code::CHAR_ARRAY => nullable(input.read_char_array()?, Value::CharArray),
        ds_code::SHORT_ARRAY => nullable(input.read_short_array()?, Value::ShortArray),
        ds_code::INT_ARRAY => nullable(input.read_int_array()?, Value::IntArray),
        ds_code::LONG_ARRAY => nullable(input.read_long_array()?, Value::LongArray),
        ds_code::FLOAT_ARRAY => nullable(input.read_float_array()?, Value::FloatArray),
        ds_code::DOUBLE_ARRAY => nullable(input.read_double_array()?, Value::DoubleArray),
        ds_code::STRING_ARRAY => nullable(input.read_string_array()?, Value::StringArray),
        ds_code::ARRAY_OF_BYTE_ARRAYS => {
            nullable(input.read_array_of_byte_arrays()?, Value::ArrayOfByteArrays)
        }
        ds_code::OBJECT_ARRAY => nullable(read_object_array(input)?, Value::ObjectArray),
        ds_code::ARRAY_LIST => {
            let len = input.read_array_len()?;
            if len < 0 {
                Value::Null
            } else {
                let mut items = Vec::with_capacity((len as usize).min(4096));
                for _ in 0..len {
                    items.push(read_object(input)?);
                }
                Value::List(items)
            }
        }
        ds_code::PDX => Value::Pdx(PdxInstance::read_body(input)?),
        other => {
            return Err(GeodeError::Serialization(format!(
                "unknown DSCode: {}",
                other
            )))
        }
    };
    Ok(value)
}

/// Reads an object array body: length, element class marker, elements.
pub fn read_object_array<R: DataInput + ?Sized>(input: &mut R) -> Result<Option<Vec<Value>>> {
    let len = input.read_array_len()?;
    if len < 0 {
        return Ok(None);
    }
    let marker = input.read_ubyte()?;
    if marker != ds_code::CLASS {
        return Err(GeodeError::Serialization(format!(
            "expected class marker in object array, found {}",
            marker
        )));
    }
    let _element_class = input.read_string()?;
    let mut items = Vec::with_capacity((len as usize).min(4096));
    for _ in 0..len {
        items.push(read_object(input)?);
    }
    Ok(Some(items))
}

/// Writes one tagged object.
pub fn write_object<W: DataOutput + ?Sized>(out: &mut W, value: &Value) -> Result<()> {
    match value {
        Value::String(s) => return out.write_string(Some(s.as_str())),
        Value::Pdx(p) => return p.write_to(out),
        _ => {}
    }
    out.write_ubyte(value.ds_code())?;
    match value {
        Value::Null => Ok(()),
        Value::Bool(v) => out.write_bool(*v),
        Value::Char(v) => out.write_char(*v),
        Value::Byte(v) => out.write_byte(*v),
        Value::Short(v) => out.write_short(*v),
        Value::Int(v) => out.write_int(*v),
        Value::Long(v) => out.write_long(*v),
        Value::Float(v) => out.write_float(*v),
        Value::Double(v) => out.write_double(*v),
        Value::Date(v) => out.write_long(v.timestamp_millis()),
        Value::ByteArray(v) => out.write_byte_array(Some(v.as_slice())),
        Value::BoolArray(v) => out.write_bool_array(Some(v.as_slice())),
        Value::CharArray(v) => out.write_char_array(Some(v.as_slice())),
        Value::ShortArray(v) => out.write_short_array(Some(v.as_slice())),
        Value::IntArray(v) => out.write_int_array(Some(v.as_slice())),
        Value::LongArray(v) => out.write_long_array(Some(v.as_slice())),
        Value::FloatArray(v) => out.write_float_array(Some(v.as_slice())),
        Value::DoubleArray(v) => out.write_double_array(Some(v.as_slice())),
        Value::StringArray(v) => out.write_string_array(Some(v.as_slice())),
        Value::ArrayOfByteArrays(v) => out.write_array_of_byte_arrays(Some(v.as_slice())),
        Value::ObjectArray(v) => write_object_array_body(out, Some(v.as_slice())),
        Value::List(items) => {
            out.write_array_len(items.len() as i32)?;
            for item in items {
                write_object(out, item)?;
            }
            Ok(())
        }
        Value::String(_) | Value::Pdx(_) => Ok(()),
    }
}

/// Writes an object array body without its leading tag.
pub fn write_object_array_body<W: DataOutput + ?Sized>(
    out: &mut W,
    items: Option<&[Value]>,
) -> Result<()> {
    let items = match items {
        Some(items) => items,
        None => return out.write_array_len(-1),
    };
    out.write_array_len(items.len() as i32)?;
    out.write_ubyte(ds_code::CLASS)?;
    out.write_string(Some(OBJECT_ARRAY_ELEMENT_CLASS))?;
    for item in items {
        write_object(out, item)?;
    }
    Ok(())
}
