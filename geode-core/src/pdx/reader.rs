//! PDX reader trait and the reader for data written with the local schema.

use super::{
    PdxFieldType, PdxInstance, PdxSerializable, PdxType, PdxTypeRegistry, TypeDefinitionSource,
};
use crate::error::{GeodeError, Result};
use crate::serialization::value::{date_from_millis, read_object_array};
use crate::serialization::{DataInput, ObjectDataInput, Value};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Trait for reading PDX fields during deserialization.
///
/// Fields missing from the serialized data read as their type's default:
/// zero, `false`, `'\0'`, `None` or [`Value::Null`].
pub trait PdxReader {
    /// Returns the registry nested objects are resolved against.
    fn registry(&self) -> &PdxTypeRegistry;

    /// Returns the source consulted for nested type ids the registry does not know.
    fn type_source(&self) -> Option<&dyn TypeDefinitionSource>;

    /// Returns the class name recorded with the data.
    fn class_name(&self) -> &str;

    /// Returns true if the serialized data contains the named field.
    fn has_field(&self, name: &str) -> bool;

    /// Returns true if the named field is part of the object's identity.
    fn is_identity_field(&self, name: &str) -> bool;

    /// Reads a char field.
    fn read_char(&mut self, name: &str) -> Result<char>;

    /// Reads a boolean field.
    fn read_boolean(&mut self, name: &str) -> Result<bool>;

    /// Reads a byte field.
    fn read_byte(&mut self, name: &str) -> Result<i8>;

    /// Reads a short field.
    fn read_short(&mut self, name: &str) -> Result<i16>;

    /// Reads an int field.
    fn read_int(&mut self, name: &str) -> Result<i32>;

    /// Reads a long field.
    fn read_long(&mut self, name: &str) -> Result<i64>;

    /// Reads a float field.
    fn read_float(&mut self, name: &str) -> Result<f32>;

    /// Reads a double field.
    fn read_double(&mut self, name: &str) -> Result<f64>;

    /// Reads a date field.
    fn read_date(&mut self, name: &str) -> Result<Option<DateTime<Utc>>>;

    /// Reads a string field.
    fn read_string(&mut self, name: &str) -> Result<Option<String>>;

    /// Reads an arbitrary tagged object.
    fn read_object(&mut self, name: &str) -> Result<Value>;

    /// Reads a boolean array field.
    fn read_boolean_array(&mut self, name: &str) -> Result<Option<Vec<bool>>>;

    /// Reads a char array field.
    fn read_char_array(&mut self, name: &str) -> Result<Option<Vec<char>>>;

    /// Reads a byte array field.
    fn read_byte_array(&mut self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Reads a short array field.
    fn read_short_array(&mut self, name: &str) -> Result<Option<Vec<i16>>>;

    /// Reads an int array field.
    fn read_int_array(&mut self, name: &str) -> Result<Option<Vec<i32>>>;

    /// Reads a long array field.
    fn read_long_array(&mut self, name: &str) -> Result<Option<Vec<i64>>>;

    /// Reads a float array field.
    fn read_float_array(&mut self, name: &str) -> Result<Option<Vec<f32>>>;

    /// Reads a double array field.
    fn read_double_array(&mut self, name: &str) -> Result<Option<Vec<f64>>>;

    /// Reads a string array field.
    fn read_string_array(&mut self, name: &str) -> Result<Option<Vec<String>>>;

    /// Reads an object array field.
    fn read_object_array(&mut self, name: &str) -> Result<Option<Vec<Value>>>;

    /// Reads an array of byte arrays.
    fn read_array_of_byte_arrays(&mut self, name: &str) -> Result<Option<Vec<Vec<u8>>>>;
}

/// Typed helpers layered over [`PdxReader`].
pub trait PdxReaderExt: PdxReader {
    /// Reads a nested PDX object written with `write_pdx`.
    fn read_pdx<T: PdxSerializable>(&mut self, name: &str) -> Result<Option<T>> {
        match self.read_object(name)? {
            Value::Null => Ok(None),
            Value::Pdx(instance) => {
                super::serializer::decode_instance(self.registry(), &instance, self.type_source())
                    .map(Some)
            }
            other => Err(GeodeError::Serialization(format!(
                "field {} holds DSCode {}, not a PDX object",
                name,
                other.ds_code()
            ))),
        }
    }
}

impl<R: PdxReader + ?Sized> PdxReaderExt for R {}

/// Reads a PDX date, where -1 stands for a missing date.
pub(crate) fn read_date<R: DataInput + ?Sized>(input: &mut R) -> Result<Option<DateTime<Utc>>> {
    match input.read_long()? {
        -1 => Ok(None),
        millis => date_from_millis(millis).map(Some),
    }
}

/// Decodes one field of the given type into a dynamic value.
pub(crate) fn read_field_value<R: DataInput + ?Sized>(
    input: &mut R,
    field_type: PdxFieldType,
) -> Result<Value> {
    fn opt<T>(v: Option<T>, wrap: fn(T) -> Value) -> Value {
        v.map(wrap).unwrap_or(Value::Null)
    }

    let value = match field_type {
        PdxFieldType::Boolean => Value::Bool(input.read_bool()?),
        PdxFieldType::Byte => Value::Byte(input.read_byte()?),
        PdxFieldType::Char => Value::Char(input.read_char()?),
        PdxFieldType::Short => Value::Short(input.read_short()?),
        PdxFieldType::Int => Value::Int(input.read_int()?),
        PdxFieldType::Long => Value::Long(input.read_long()?),
        PdxFieldType::Float => Value::Float(input.read_float()?),
        PdxFieldType::Double => Value::Double(input.read_double()?),
        PdxFieldType::Date => opt(read_date(input)?, Value::Date),
        PdxFieldType::String => opt(input.read_string()?, Value::String),
        PdxFieldType::Object => input.read_object()?,
        PdxFieldType::BooleanArray => opt(input.read_bool_array()?, Value::BoolArray),
        PdxFieldType::CharArray => opt(input.read_char_array()?, Value::CharArray),
        PdxFieldType::ByteArray => opt(input.read_byte_array()?, Value::ByteArray),
        PdxFieldType::ShortArray => opt(input.read_short_array()?, Value::ShortArray),
        PdxFieldType::IntArray => opt(input.read_int_array()?, Value::IntArray),
        PdxFieldType::LongArray => opt(input.read_long_array()?, Value::LongArray),
        PdxFieldType::FloatArray => opt(input.read_float_array()?, Value::FloatArray),
        PdxFieldType::DoubleArray => opt(input.read_double_array()?, Value::DoubleArray),
        PdxFieldType::StringArray => opt(input.read_string_array()?, Value::StringArray),
        PdxFieldType::ObjectArray => opt(read_object_array(input)?, Value::ObjectArray),
        PdxFieldType::ArrayOfByteArrays => {
            opt(input.read_array_of_byte_arrays()?, Value::ArrayOfByteArrays)
        }
    };
    Ok(value)
}

/// Splits an instance body into its field area and offset table.
pub(crate) fn split_body<'a>(
    instance: &'a PdxInstance,
    pdx_type: &PdxType,
) -> Result<(ObjectDataInput<'a>, &'a [u8], usize)> {
    let layout = instance.layout(pdx_type)?;
    let (area, offsets) = instance.body().split_at(layout.field_area_len);
    Ok((ObjectDataInput::new(area), offsets, layout.offset_size))
}

/// Reads data whose type id is the local type of the class.
///
/// Fields requested in declaration order are read straight from the cursor;
/// anything else is located through the offset table.
pub struct PdxLocalReader<'a> {
    registry: &'a PdxTypeRegistry,
    source: Option<&'a dyn TypeDefinitionSource>,
    pdx_type: Arc<PdxType>,
    input: ObjectDataInput<'a>,
    offsets: &'a [u8],
    offset_size: usize,
    next_index: usize,
}

impl<'a> PdxLocalReader<'a> {
    /// Creates a reader over `instance`, which must have been written with `pdx_type`.
    pub fn new(
        registry: &'a PdxTypeRegistry,
        instance: &'a PdxInstance,
        pdx_type: Arc<PdxType>,
    ) -> Result<Self> {
        let (input, offsets, offset_size) = split_body(instance, &pdx_type)?;
        Ok(Self {
            registry,
            source: None,
            pdx_type,
            input,
            offsets,
            offset_size,
            next_index: 0,
        })
    }

    /// Sets the source used when a nested object has an unknown type id.
    pub fn with_type_source(mut self, source: Option<&'a dyn TypeDefinitionSource>) -> Self {
        self.source = source;
        self
    }

    fn read_field<T: Default>(
        &mut self,
        name: &str,
        field_type: PdxFieldType,
        read: impl FnOnce(&mut ObjectDataInput<'a>) -> Result<T>,
    ) -> Result<T> {
        let (index, actual) = match self.pdx_type.field(name) {
            Some(field) => (field.index(), field.field_type()),
            None => {
                tracing::trace!(field = name, class_name = %self.pdx_type.class_name(), "field not in local type");
                return Ok(T::default());
            }
        };
        if actual != field_type {
            return Err(GeodeError::Serialization(format!(
                "field {} of {} is {:?}, read as {:?}",
                name,
                self.pdx_type.class_name(),
                actual,
                field_type
            )));
        }

        if index != self.next_index {
            let position = self.pdx_type.get_field_position(
                index,
                self.offsets,
                self.offset_size,
                self.input.len(),
            );
            match position {
                Some(pos) => self.input.set_position(pos)?,
                None => return Ok(T::default()),
            }
        } else if self.input.remaining() == 0 {
            return Ok(T::default());
        }
        let value = read(&mut self.input)?;
        self.next_index = index + 1;
        Ok(value)
    }
}

impl PdxReader for PdxLocalReader<'_> {
    fn registry(&self) -> &PdxTypeRegistry {
        self.registry
    }

    fn type_source(&self) -> Option<&dyn TypeDefinitionSource> {
        self.source
    }

    fn class_name(&self) -> &str {
        self.pdx_type.class_name()
    }

    fn has_field(&self, name: &str) -> bool {
        self.pdx_type.has_field(name)
    }

    fn is_identity_field(&self, name: &str) -> bool {
        self.pdx_type
            .field(name)
            .map(|f| f.is_identity())
            .unwrap_or(false)
    }

    pdx_read_methods!();
}
