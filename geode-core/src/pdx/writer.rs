//! PDX writer trait and the local writer that produces serialized objects.

use super::pdx_type::{encode_offset, offset_size_for};
use super::{PdxField, PdxFieldType, PdxInstance, PdxSerializable, PdxTypeRegistry};
use crate::error::{GeodeError, Result};
use crate::serialization::value::write_object_array_body;
use crate::serialization::{DataOutput, ObjectDataOutput, Value};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Trait for writing PDX fields during serialization.
///
/// Fields are written in declaration order; that order becomes the schema.
pub trait PdxWriter {
    /// Returns the registry nested objects are serialized against.
    fn registry(&self) -> &PdxTypeRegistry;

    /// Writes a char field.
    fn write_char(&mut self, name: &str, value: char) -> Result<()>;

    /// Writes a boolean field.
    fn write_boolean(&mut self, name: &str, value: bool) -> Result<()>;

    /// Writes a byte field.
    fn write_byte(&mut self, name: &str, value: i8) -> Result<()>;

    /// Writes a short field.
    fn write_short(&mut self, name: &str, value: i16) -> Result<()>;

    /// Writes an int field.
    fn write_int(&mut self, name: &str, value: i32) -> Result<()>;

    /// Writes a long field.
    fn write_long(&mut self, name: &str, value: i64) -> Result<()>;

    /// Writes a float field.
    fn write_float(&mut self, name: &str, value: f32) -> Result<()>;

    /// Writes a double field.
    fn write_double(&mut self, name: &str, value: f64) -> Result<()>;

    /// Writes a date field.
    fn write_date(&mut self, name: &str, value: Option<DateTime<Utc>>) -> Result<()>;

    /// Writes a string field.
    fn write_string(&mut self, name: &str, value: Option<&str>) -> Result<()>;

    /// Writes an arbitrary tagged object, including nested PDX instances.
    fn write_object(&mut self, name: &str, value: &Value) -> Result<()>;

    /// Writes a boolean array field.
    fn write_boolean_array(&mut self, name: &str, value: Option<&[bool]>) -> Result<()>;

    /// Writes a char array field.
    fn write_char_array(&mut self, name: &str, value: Option<&[char]>) -> Result<()>;

    /// Writes a byte array field.
    fn write_byte_array(&mut self, name: &str, value: Option<&[u8]>) -> Result<()>;

    /// Writes a short array field.
    fn write_short_array(&mut self, name: &str, value: Option<&[i16]>) -> Result<()>;

    /// Writes an int array field.
    fn write_int_array(&mut self, name: &str, value: Option<&[i32]>) -> Result<()>;

    /// Writes a long array field.
    fn write_long_array(&mut self, name: &str, value: Option<&[i64]>) -> Result<()>;

    /// Writes a float array field.
    fn write_float_array(&mut self, name: &str, value: Option<&[f32]>) -> Result<()>;

    /// Writes a double array field.
    fn write_double_array(&mut self, name: &str, value: Option<&[f64]>) -> Result<()>;

    /// Writes a string array field.
    fn write_string_array(&mut self, name: &str, value: Option<&[String]>) -> Result<()>;

    /// Writes an object array field.
    fn write_object_array(&mut self, name: &str, value: Option<&[Value]>) -> Result<()>;

    /// Writes an array of byte arrays.
    fn write_array_of_byte_arrays(&mut self, name: &str, value: Option<&[Vec<u8>]>)
        -> Result<()>;

    /// Marks an already written field as part of the object's identity.
    fn mark_identity_field(&mut self, name: &str) -> Result<()>;
}

/// Typed helpers layered over [`PdxWriter`].
pub trait PdxWriterExt: PdxWriter {
    /// Writes a nested PDX object.
    fn write_pdx<T: PdxSerializable>(&mut self, name: &str, value: Option<&T>) -> Result<()> {
        let value = match value {
            Some(v) => Value::Pdx(PdxInstance::from_object(self.registry(), v)?),
            None => Value::Null,
        };
        self.write_object(name, &value)
    }
}

impl<W: PdxWriter + ?Sized> PdxWriterExt for W {}

/// Writes fields in declaration order, recording where each
/// variable-length field starts so the offset table can be appended.
pub struct PdxLocalWriter<'r> {
    registry: &'r PdxTypeRegistry,
    class_name: String,
    fields: Vec<PdxField>,
    field_indices: HashMap<String, usize>,
    var_offsets: Vec<usize>,
    out: ObjectDataOutput,
}

impl<'r> PdxLocalWriter<'r> {
    /// Creates a writer for one instance of `class_name`.
    pub fn new(registry: &'r PdxTypeRegistry, class_name: impl Into<String>) -> Self {
        Self {
            registry,
            class_name: class_name.into(),
            fields: Vec::new(),
            field_indices: HashMap::new(),
            var_offsets: Vec::new(),
            out: ObjectDataOutput::new(),
        }
    }

    /// Returns the class being written.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    fn begin_field(&mut self, name: &str, field_type: PdxFieldType) -> Result<()> {
        if self.field_indices.contains_key(name) {
            return Err(GeodeError::Serialization(format!(
                "field {} of {} written twice",
                name, self.class_name
            )));
        }
        if field_type.is_variable_length() {
            self.var_offsets.push(self.out.len());
        }
        self.field_indices
            .insert(name.to_string(), self.fields.len());
        self.fields.push(PdxField::new(name, field_type));
        Ok(())
    }

    /// Registers the written schema and assembles the serialized object.
    pub fn finish(self) -> Result<PdxInstance> {
        let pdx_type = self.registry.register_local(&self.class_name, self.fields);
        let field_area_len = self.out.len();
        let offset_size = offset_size_for(field_area_len, pdx_type.offset_count());

        let mut body = self.out.into_bytes();
        for &offset in self.var_offsets.iter().skip(1).rev() {
            encode_offset(offset, offset_size, &mut body);
        }

        let instance = PdxInstance::new(pdx_type.type_id(), body);
        let hash = instance.compute_identity_hash(&pdx_type)?;
        Ok(instance.with_identity_hash(hash))
    }
}

impl PdxWriter for PdxLocalWriter<'_> {
    fn registry(&self) -> &PdxTypeRegistry {
        self.registry
    }

    fn write_char(&mut self, name: &str, value: char) -> Result<()> {
        self.begin_field(name, PdxFieldType::Char)?;
        self.out.write_char(value)
    }

    fn write_boolean(&mut self, name: &str, value: bool) -> Result<()> {
        self.begin_field(name, PdxFieldType::Boolean)?;
        self.out.write_bool(value)
    }

    fn write_byte(&mut self, name: &str, value: i8) -> Result<()> {
        self.begin_field(name, PdxFieldType::Byte)?;
        self.out.write_byte(value)
    }

    fn write_short(&mut self, name: &str, value: i16) -> Result<()> {
        self.begin_field(name, PdxFieldType::Short)?;
        self.out.write_short(value)
    }

    fn write_int(&mut self, name: &str, value: i32) -> Result<()> {
        self.begin_field(name, PdxFieldType::Int)?;
        self.out.write_int(value)
    }

    fn write_long(&mut self, name: &str, value: i64) -> Result<()> {
        self.begin_field(name, PdxFieldType::Long)?;
        self.out.write_long(value)
    }

    fn write_float(&mut self, name: &str, value: f32) -> Result<()> {
        self.begin_field(name, PdxFieldType::Float)?;
        self.out.write_float(value)
    }

    fn write_double(&mut self, name: &str, value: f64) -> Result<()> {
        self.begin_field(name, PdxFieldType::Double)?;
        self.out.write_double(value)
    }

    fn write_date(&mut self, name: &str, value: Option<DateTime<Utc>>) -> Result<()> {
        self.begin_field(name, PdxFieldType::Date)?;
        self.out
            .write_long(value.map(|d| d.timestamp_millis()).unwrap_or(-1))
    }

    fn write_string(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        self.begin_field(name, PdxFieldType::String)?;
        self.out.write_string(value)
    }

    fn write_object(&mut self, name: &str, value: &Value) -> Result<()> {
        self.begin_field(name, PdxFieldType::Object)?;
        self.out.write_object(value)
    }

    fn write_boolean_array(&mut self, name: &str, value: Option<&[bool]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::BooleanArray)?;
        self.out.write_bool_array(value)
    }

    fn write_char_array(&mut self, name: &str, value: Option<&[char]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::CharArray)?;
        self.out.write_char_array(value)
    }

    fn write_byte_array(&mut self, name: &str, value: Option<&[u8]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::ByteArray)?;
        self.out.write_byte_array(value)
    }

    fn write_short_array(&mut self, name: &str, value: Option<&[i16]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::ShortArray)?;
        self.out.write_short_array(value)
    }

    fn write_int_array(&mut self, name: &str, value: Option<&[i32]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::IntArray)?;
        self.out.write_int_array(value)
    }

    fn write_long_array(&mut self, name: &str, value: Option<&[i64]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::LongArray)?;
        self.out.write_long_array(value)
    }

    fn write_float_array(&mut self, name: &str, value: Option<&[f32]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::FloatArray)?;
        self.out.write_float_array(value)
    }

    fn write_double_array(&mut self, name: &str, value: Option<&[f64]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::DoubleArray)?;
        self.out.write_double_array(value)
    }

    fn write_string_array(&mut self, name: &str, value: Option<&[String]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::StringArray)?;
        self.out.write_string_array(value)
    }

    fn write_object_array(&mut self, name: &str, value: Option<&[Value]>) -> Result<()> {
        self.begin_field(name, PdxFieldType::ObjectArray)?;
        write_object_array_body(&mut self.out, value)
    }

    fn write_array_of_byte_arrays(
        &mut self,
        name: &str,
        value: Option<&[Vec<u8>]>,
    ) -> Result<()> {
        self.begin_field(name, PdxFieldType::ArrayOfByteArrays)?;
        self.out.write_array_of_byte_arrays(value)
    }

    fn mark_identity_field(&mut self, name: &str) -> Result<()> {
        let index = *self.field_indices.get(name).ok_or_else(|| {
            GeodeError::Serialization(format!(
                "cannot mark {} as identity: field not written yet",
                name
            ))
        })?;
        self.fields[index].set_identity(true);
        Ok(())
    }
}
