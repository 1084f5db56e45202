//! PDX: Geode's portable, schema-evolving object format.
//!
//! A PDX object is written field by field through a [`PdxWriter`]; the
//! sequence of field names and types forms a [`PdxType`] which the
//! [`PdxTypeRegistry`] assigns an id. Readers locate fields through the
//! type, so data written by an older or newer version of a class can still
//! be read: fields unknown to the reader are skipped and fields missing
//! from the data read as defaults.

/// Expands to the typed `read_*` methods of [`PdxReader`], each delegating
/// to the implementing reader's `read_field`.
macro_rules! pdx_read_methods {
    () => {
        fn read_char(&mut self, name: &str) -> Result<char> {
            self.read_field(name, PdxFieldType::Char, |input| input.read_char())
        }

        fn read_boolean(&mut self, name: &str) -> Result<bool> {
            self.read_field(name, PdxFieldType::Boolean, |input| input.read_bool())
        }

        fn read_byte(&mut self, name: &str) -> Result<i8> {
            self.read_field(name, PdxFieldType::Byte, |input| input.read_byte())
        }

        fn read_short(&mut self, name: &str) -> Result<i16> {
            self.read_field(name, PdxFieldType::Short, |input| input.read_short())
        }

        fn read_int(&mut self, name: &str) -> Result<i32> {
            self.read_field(name, PdxFieldType::Int, |input| input.read_int())
        }

        fn read_long(&mut self, name: &str) -> Result<i64> {
            self.read_field(name, PdxFieldType::Long, |input| input.read_long())
        }

        fn read_float(&mut self, name: &str) -> Result<f32> {
            self.read_field(name, PdxFieldType::Float, |input| input.read_float())
        }

        fn read_double(&mut self, name: &str) -> Result<f64> {
            self.read_field(name, PdxFieldType::Double, |input| input.read_double())
        }

        fn read_date(&mut self, name: &str) -> Result<Option<DateTime<Utc>>> {
            self.read_field(name, PdxFieldType::Date, |input| {
                $crate::pdx::reader::read_date(input)
            })
        }

        fn read_string(&mut self, name: &str) -> Result<Option<String>> {
            self.read_field(name, PdxFieldType::String, |input| input.read_string())
        }

        fn read_object(&mut self, name: &str) -> Result<Value> {
            self.read_field(name, PdxFieldType::Object, |input| input.read_object())
        }

        fn read_boolean_array(&mut self, name: &str) -> Result<Option<Vec<bool>>> {
            self.read_field(name, PdxFieldType::BooleanArray, |input| {
                input.read_bool_array()
            })
        }

        fn read_char_array(&mut self, name: &str) -> Result<Option<Vec<char>>> {
            self.read_field(name, PdxFieldType::CharArray, |input| {
                input.read_char_array()
            })
        }

        fn read_byte_array(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
            self.read_field(name, PdxFieldType::ByteArray, |input| {
                input.read_byte_array()
            })
        }

        fn read_short_array(&mut self, name: &str) -> Result<Option<Vec<i16>>> {
            self.read_field(name, PdxFieldType::ShortArray, |input| {
                input.read_short_array()
            })
        }

        fn read_int_array(&mut self, name: &str) -> Result<Option<Vec<i32>>> {
            self.read_field(name, PdxFieldType::IntArray, |input| input.read_int_array())
        }

        fn read_long_array(&mut self, name: &str) -> Result<Option<Vec<i64>>> {
            self.read_field(name, PdxFieldType::LongArray, |input| {
                input.read_long_array()
            })
        }

        fn read_float_array(&mut self, name: &str) -> Result<Option<Vec<f32>>> {
            self.read_field(name, PdxFieldType::FloatArray, |input| {
                input.read_float_array()
            })
        }

        fn read_double_array(&mut self, name: &str) -> Result<Option<Vec<f64>>> {
            self.read_field(name, PdxFieldType::DoubleArray, |input| {
                input.read_double_array()
            })
        }

        fn read_string_array(&mut self, name: &str) -> Result<Option<Vec<String>>> {
            self.read_field(name, PdxFieldType::StringArray, |input| {
                input.read_string_array()
            })
        }

        fn read_object_array(&mut self, name: &str) -> Result<Option<Vec<Value>>> {
            self.read_field(name, PdxFieldType::ObjectArray, |input| {
                $crate::serialization::value::read_object_array(input)
            })
        }

        fn read_array_of_byte_arrays(&mut self, name: &str) -> Result<Option<Vec<Vec<u8>>>> {
            self.read_field(name, PdxFieldType::ArrayOfByteArrays, |input| {
                input.read_array_of_byte_arrays()
            })
        }
    };
}

mod field_type;
mod instance;
mod pdx_type;
mod reader;
mod registry;
mod remote_reader;
mod serializer;
mod writer;

pub use field_type::PdxFieldType;
pub use instance::{BodyLayout, PdxInstance};
pub use pdx_type::{offset_size_for, offset_size_from_len, PdxField, PdxType};
pub use reader::{PdxLocalReader, PdxReader, PdxReaderExt};
pub use registry::{PdxTypeRegistry, TypeDefinitionSource, FIRST_LOCAL_TYPE_ID};
pub use remote_reader::{FieldChoice, PdxRemoteReader};
pub use serializer::{decode_instance, encode_instance, PdxSerializer};
pub use writer::{PdxLocalWriter, PdxWriter, PdxWriterExt};

use crate::error::Result;

/// Trait for types that serialize themselves as PDX objects.
///
/// `to_data` must write the same fields in the same order every time;
/// that sequence is the schema registered for [`CLASS_NAME`](Self::CLASS_NAME).
/// `from_data` should read by name and tolerate missing fields, which
/// the readers report as defaults.
pub trait PdxSerializable: Sized {
    /// Class name shared with other members of the distributed system.
    const CLASS_NAME: &'static str;

    /// Writes this object's fields.
    fn to_data(&self, writer: &mut dyn PdxWriter) -> Result<()>;

    /// Reconstructs an object from its fields.
    fn from_data(reader: &mut dyn PdxReader) -> Result<Self>;
}
